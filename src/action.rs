//! Start/stop sequencing.
//!
//! One transition runs `CheckCurrent -> LocateControl -> Invoke ->
//! AwaitConfirmation -> Done`. A transition that is already satisfied, or a
//! control that is not on the page, ends early with `false`.

use crate::directory::ServerRecord;
use crate::error::{Error, Result};
use crate::resolver::{ElementResolver, Role};
use crate::session::{Session, absolutize};
use crate::status::{ServerState, StatusInspector};
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Requested change of a server's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    Start,
    Stop,
}

impl Transition {
    fn control_role(&self) -> Role {
        match self {
            Transition::Start => Role::StartControl,
            Transition::Stop => Role::StopControl,
        }
    }

    fn is_satisfied_by(&self, state: ServerState) -> bool {
        match self {
            Transition::Start => state.is_effectively_started(),
            Transition::Stop => state.is_effectively_stopped(),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Transition::Start => "start",
            Transition::Stop => "stop",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the control page says about a requested transition.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Plan {
    AlreadyThere(ServerState),
    NoControl(ServerState),
    Invoke(String),
}

/// Drives start/stop transitions on control pages.
#[derive(Debug, Clone)]
pub struct ActionSequencer {
    base_url: String,
    resolver: Arc<ElementResolver>,
    inspector: StatusInspector,
    action_delay: Duration,
}

impl ActionSequencer {
    pub fn new(
        base_url: impl Into<String>,
        resolver: Arc<ElementResolver>,
        inspector: StatusInspector,
        action_delay: Duration,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            resolver,
            inspector,
            action_delay,
        }
    }

    /// Start the server. `Ok(false)` when it already runs or no start
    /// control is shown.
    pub async fn start(&self, session: &Session, record: &ServerRecord) -> Result<bool> {
        self.run(Transition::Start, session, record).await
    }

    /// Stop the server. `Ok(false)` when it is already down or no stop
    /// control is shown.
    pub async fn stop(&self, session: &Session, record: &ServerRecord) -> Result<bool> {
        self.run(Transition::Stop, session, record).await
    }

    #[tracing::instrument(skip(self, session, record), fields(server_id = %record.identifier))]
    async fn run(&self, transition: Transition, session: &Session, record: &ServerRecord) -> Result<bool> {
        let page = session.fetch_page(&record.control_url).await?;

        let activation_url = match self.plan(transition, &page.body, &record.control_url) {
            Ok(Plan::AlreadyThere(state)) => {
                tracing::info!(%state, "Nothing to do");
                return Ok(false);
            }
            Ok(Plan::NoControl(state)) => {
                tracing::warn!(%state, "Control not found");
                return Ok(false);
            }
            Ok(Plan::Invoke(url)) => url,
            Err(e) => return Err(Error::action(transition, e)),
        };

        self.invoke(session, record, &activation_url)
            .await
            .map_err(|e| Error::action(transition, e))?;

        tracing::info!("Transition initiated");
        Ok(true)
    }

    fn plan(&self, transition: Transition, body: &str, control_url: &str) -> Result<Plan> {
        let document = Html::parse_document(body);
        let state = self.inspector.classify(&document);
        if transition.is_satisfied_by(state) {
            return Ok(Plan::AlreadyThere(state));
        }

        let Some(control) = self
            .resolver
            .find_element(document.root_element(), transition.control_role())
        else {
            return Ok(Plan::NoControl(state));
        };

        let raw = activation_target(control)
            .unwrap_or_else(|| format!("{}/{}", control_url.trim_end_matches('/'), transition));
        let url = absolutize(&self.base_url, &raw)
            .ok_or_else(|| Error::Other(format!("Invalid control URL '{}'", raw)))?;
        Ok(Plan::Invoke(url))
    }

    async fn invoke(&self, session: &Session, record: &ServerRecord, url: &str) -> Result<()> {
        tracing::info!(%url, "Following control");
        session.fetch_page(url).await?;

        tokio::time::sleep(self.action_delay).await;

        let page = session.fetch_page(&record.control_url).await?;
        if let Some(confirm_url) = self.confirm_target(&page.body) {
            tracing::info!(url = %confirm_url, "Confirming");
            session.fetch_page(&confirm_url).await?;
        }
        Ok(())
    }

    fn confirm_target(&self, body: &str) -> Option<String> {
        let document = Html::parse_document(body);
        let hits = self
            .resolver
            .resolve_all(document.root_element(), Role::ConfirmControl)
            .ok()?;
        let href = hits
            .iter()
            .filter_map(|hit| hit.element())
            .find_map(|element| element.value().attr("href"))?;
        absolutize(&self.base_url, href)
    }
}

/// Where a control leads, as written in the markup.
fn activation_target(control: ElementRef<'_>) -> Option<String> {
    let element = control.value();
    let non_empty = |value: &&str| !value.trim().is_empty();

    if element.name() == "a" {
        if let Some(href) = element.attr("href").filter(non_empty) {
            return Some(href.to_string());
        }
    }

    if let Some(onclick) = element.attr("onclick") {
        if onclick.contains("window.location") && onclick.contains("http") {
            if let Some(url) = first_quoted(onclick) {
                return Some(url.to_string());
            }
        }
    }

    if let Some(url) = element
        .attr("data-href")
        .filter(non_empty)
        .or_else(|| element.attr("data-url").filter(non_empty))
    {
        return Some(url.to_string());
    }

    control
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| ancestor.value().name() == "form")
        .and_then(|form| form.value().attr("action"))
        .filter(non_empty)
        .map(str::to_string)
}

fn first_quoted(text: &str) -> Option<&str> {
    let start = text.find(['\'', '"'])?;
    let quote = text[start..].chars().next()?;
    let rest = &text[start + 1..];
    let end = rest.find(quote)?;
    Some(&rest[..end])
}
