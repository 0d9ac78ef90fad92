use aternos_controller::error::{Error, Result};
use aternos_controller::queue::{ActionKind, ActionOutcome, ActionQueue, Requester};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const REQUESTER: Requester = Requester {
    guild_id: 10,
    user_id: 20,
};

#[tokio::test]
async fn test_cooldown_separates_actions() -> Result<()> {
    let cooldown = Duration::from_millis(50);
    let queue = ActionQueue::new(cooldown);

    let (first, second) = tokio::join!(
        queue.submit(ActionKind::Start, REQUESTER, || async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok("first")
        }),
        queue.submit(ActionKind::Stop, REQUESTER, || async { Ok("second") }),
    );
    queue.wait_idle().await;

    assert_eq!(first?, "first");
    assert_eq!(second?, "second");

    let history = queue.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].kind, ActionKind::Start);
    assert_eq!(history[1].kind, ActionKind::Stop);

    let first_done = history[0].completed_at.expect("first action has no completion time");
    let second_started = history[1].started_at.expect("second action never started");
    // Allow for wall clock granularity against the monotonic timer.
    assert!(second_started - first_done >= chrono::Duration::milliseconds(48));

    Ok(())
}

#[tokio::test]
async fn test_at_most_one_action_in_flight() {
    let queue = ActionQueue::new(Duration::ZERO);
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let jobs = (0..5).map(|_| {
        let running = running.clone();
        let peak = peak.clone();
        queue.submit(ActionKind::Select, REQUESTER, move || async move {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        })
    });
    let results = futures::future::join_all(jobs).await;

    assert!(results.iter().all(|result| result.is_ok()));
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    queue.wait_idle().await;
    assert_eq!(queue.history().len(), 5);
}

#[tokio::test]
async fn test_failure_is_recorded() {
    let queue = ActionQueue::new(Duration::ZERO);

    let result: Result<()> = queue
        .submit(ActionKind::Start, REQUESTER, || async {
            Err(Error::Other("remote said no".to_string()))
        })
        .await;
    queue.wait_idle().await;

    assert!(matches!(result, Err(Error::Other(_))));
    let history = queue.history();
    assert_eq!(history[0].outcome, Some(ActionOutcome::Failure));
    assert_eq!(history[0].requester, REQUESTER);
    assert!(history[0].error.as_deref().unwrap_or_default().contains("remote said no"));
    assert!(history[0].completed_at.is_some());
}

#[tokio::test]
async fn test_queue_survives_panicking_job() -> Result<()> {
    let queue = ActionQueue::new(Duration::ZERO);

    let panicked: Result<()> = queue
        .submit(ActionKind::Stop, REQUESTER, || async {
            let control: Option<()> = None;
            control.expect("selector exploded");
            Ok(())
        })
        .await;
    let after = queue
        .submit(ActionKind::Select, REQUESTER, || async { Ok(7) })
        .await?;
    queue.wait_idle().await;

    assert!(matches!(panicked, Err(Error::Queue(_))));
    assert_eq!(after, 7);

    let history = queue.history();
    assert_eq!(history[0].outcome, Some(ActionOutcome::Failure));
    assert!(history[0].error.as_deref().unwrap_or_default().contains("selector exploded"));
    assert_eq!(history[1].outcome, Some(ActionOutcome::Success));

    Ok(())
}

#[tokio::test]
async fn test_marker_actions_keep_fifo_order() -> Result<()> {
    let queue = ActionQueue::new(Duration::ZERO);

    let tickets = vec![
        queue.enqueue(ActionKind::Select, REQUESTER)?,
        queue.enqueue(ActionKind::Start, REQUESTER)?,
        queue.enqueue(ActionKind::Stop, REQUESTER)?,
    ];
    let ids: Vec<_> = tickets.iter().map(|ticket| ticket.id()).collect();
    for ticket in tickets {
        ticket.completed().await?;
    }
    queue.wait_idle().await;

    let history: Vec<_> = queue.history().iter().map(|action| action.id).collect();
    assert_eq!(history, ids);
    assert!(!queue.is_draining());
    assert_eq!(queue.pending(), 0);

    Ok(())
}
