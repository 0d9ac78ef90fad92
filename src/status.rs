//! Server state classification.

use crate::directory::ServerRecord;
use crate::error::Result;
use crate::resolver::{ElementResolver, Role, collapse_whitespace, text_of};
use crate::session::Session;
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Operational state shown on a server's control page.
///
/// Read fresh on every request; never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServerState {
    Online,
    Offline,
    Starting,
    Stopping,
    InQueue,
    Unknown,
}

impl ServerState {
    /// Map a status token to a state. Anything unrecognized is `Unknown`.
    ///
    /// ```
    /// use aternos_controller::ServerState;
    ///
    /// assert_eq!(ServerState::from_token("  In\n Queue "), ServerState::InQueue);
    /// assert_eq!(ServerState::from_token("online"), ServerState::Unknown);
    /// ```
    pub fn from_token(token: &str) -> Self {
        match collapse_whitespace(token).as_str() {
            "Online" => ServerState::Online,
            "Offline" => ServerState::Offline,
            "Starting" => ServerState::Starting,
            "Stopping" => ServerState::Stopping,
            "In Queue" => ServerState::InQueue,
            _ => ServerState::Unknown,
        }
    }

    /// The token the console uses for this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerState::Online => "Online",
            ServerState::Offline => "Offline",
            ServerState::Starting => "Starting",
            ServerState::Stopping => "Stopping",
            ServerState::InQueue => "In Queue",
            ServerState::Unknown => "Unknown",
        }
    }

    /// Running, or already on its way up. Starting again would be a no-op.
    pub fn is_effectively_started(&self) -> bool {
        matches!(
            self,
            ServerState::Online | ServerState::Starting | ServerState::InQueue
        )
    }

    /// Stopped, or already on its way down.
    pub fn is_effectively_stopped(&self) -> bool {
        matches!(self, ServerState::Offline | ServerState::Stopping)
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State plus the extra details a control page shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub state: ServerState,
    /// Connect address (`*.aternos.me`).
    pub address: Option<String>,
    /// Player count line, e.g. `Players 0/20`.
    pub players: Option<String>,
    /// Queue position line. Only filled while the server is in queue.
    pub queue: Option<String>,
}

/// Reads server state from control pages.
#[derive(Debug, Clone)]
pub struct StatusInspector {
    resolver: Arc<ElementResolver>,
}

impl StatusInspector {
    pub fn new(resolver: Arc<ElementResolver>) -> Self {
        Self { resolver }
    }

    /// Classify a parsed control page.
    ///
    /// A page without any status indicator is `Unknown`, not an error.
    pub fn classify(&self, document: &Html) -> ServerState {
        match self.resolver.resolve(document.root_element(), Role::StatusText) {
            Ok(hit) => {
                let token = collapse_whitespace(&hit.text());
                let state = ServerState::from_token(&token);
                tracing::debug!(%token, %state, "Classified status");
                state
            }
            Err(_) => {
                tracing::warn!("Status element not found");
                ServerState::Unknown
            }
        }
    }

    /// Classify a control page body.
    pub fn classify_body(&self, body: &str) -> ServerState {
        self.classify(&Html::parse_document(body))
    }

    /// Build the full report for a control page body.
    pub fn report_body(&self, body: &str) -> StatusReport {
        let document = Html::parse_document(body);
        let state = self.classify(&document);
        let root = document.root_element();

        StatusReport {
            state,
            address: find_address(root),
            players: find_text_node(root, |text| text.contains("Players") && text.contains('/'))
                .map(|(_, parent)| text_of(parent)),
            queue: (state == ServerState::InQueue)
                .then(|| {
                    find_text_node(root, |text| {
                        text.to_lowercase().contains("queue") && text.contains('#')
                    })
                    .map(|(text, _)| text.trim().to_string())
                })
                .flatten(),
        }
    }

    /// Fetch the server's control page and classify it.
    #[tracing::instrument(skip(self, session), fields(server_id = %record.identifier))]
    pub async fn read_status(&self, session: &Session, record: &ServerRecord) -> Result<ServerState> {
        let page = session.fetch_page(&record.control_url).await?;
        let state = self.classify_body(&page.body);
        tracing::info!(%state, "Server status");
        Ok(state)
    }

    /// Fetch the server's control page and extract the full report.
    #[tracing::instrument(skip(self, session), fields(server_id = %record.identifier))]
    pub async fn report(&self, session: &Session, record: &ServerRecord) -> Result<StatusReport> {
        let page = session.fetch_page(&record.control_url).await?;
        Ok(self.report_body(&page.body))
    }
}

// Prefer the element whose own text carries the address over its wrappers.
fn find_address(root: ElementRef<'_>) -> Option<String> {
    let selector = Selector::parse("div, span").ok()?;
    let candidates: Vec<_> = root.select(&selector).collect();

    let own = candidates.iter().find_map(|element| {
        let text: String = element
            .children()
            .filter_map(|child| match child.value() {
                Node::Text(text) => Some(text.trim()),
                _ => None,
            })
            .collect();
        text.contains(".aternos.me").then_some(text)
    });

    own.or_else(|| {
        candidates
            .iter()
            .map(|element| text_of(*element))
            .find(|text| text.contains(".aternos.me"))
    })
}

fn find_text_node<'a>(
    root: ElementRef<'a>,
    predicate: impl Fn(&str) -> bool,
) -> Option<(&'a str, ElementRef<'a>)> {
    root.descendants().find_map(|node| match node.value() {
        Node::Text(text) if predicate(&**text) => {
            let parent = node.parent().and_then(ElementRef::wrap)?;
            Some((&**text, parent))
        }
        _ => None,
    })
}
