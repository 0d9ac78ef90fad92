use anyhow::{Context, bail};
use aternos_controller::{Config, ControlPanel, Requester, ServerController};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

// Usage: control_panel <status|start|stop> [server name]
//
// Credentials come from ATERNOS_USERNAME / ATERNOS_PASSWORD, or from the
// JSON/YAML file named by ATERNOS_CONFIG.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Log to stdout and to a daily file under ./logs
    let file_appender = tracing_appender::rolling::daily("logs", "aternos-controller.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(true))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    let mut args = std::env::args().skip(1);
    let command = args.next().unwrap_or_else(|| "status".to_string());
    let server = args.next();

    let config = match std::env::var("ATERNOS_CONFIG") {
        Ok(path) => Config::from_file(&path).with_context(|| format!("loading {}", path))?,
        Err(_) => Config::from_env().context("reading credentials from the environment")?,
    };

    let mut controller = ServerController::new(config)?;
    controller.initialize().await?;
    controller.login().await?;

    let panel = ControlPanel::new(controller);
    let requester = Requester::new(0, 0);

    if server.is_some() {
        let selection = panel.select(requester, server).await?;
        if let Some(missing) = &selection.fallback_from {
            println!("Server '{}' not found, using the first server instead", missing);
        }
        println!("Selected server: {}", selection.server.display_name);
    }

    match command.as_str() {
        "status" => {
            let report = panel.status_report().await?;
            println!("Server Status: {}", report.state);
            if let Some(address) = &report.address {
                println!("Server Address: {}", address);
            }
            if let Some(players) = &report.players {
                println!("{}", players);
            }
            if let Some(queue) = &report.queue {
                println!("{}", queue);
            }
        }
        "start" => {
            if panel.start(requester).await? {
                println!("Server start initiated");
            } else {
                println!("Server might be already running or in queue");
            }
        }
        "stop" => {
            if panel.stop(requester).await? {
                println!("Server stop initiated");
            } else {
                println!("Server might be already stopped");
            }
        }
        other => bail!("unknown command '{}', expected status, start or stop", other),
    }

    panel.queue().wait_idle().await;
    panel.controller().lock().await.cleanup();
    Ok(())
}
