/*!
 # Aternos Controller

 A Rust library for driving the Aternos web console the way a browser would.

 ## Overview

 The console has no API. Aternos Controller provides functionality to:
 - Log in with account credentials and keep the session cookies
 - Find a managed server on the account's server list
 - Read the server's state from its control page
 - Start and stop the server through the page's own controls
 - Serialize start/stop/select requests through a single-flight queue with a
   cooldown between actions

 Element lookup on the uncontrolled markup goes through ordered fallback
 chains (see [`resolver`]), so small layout changes degrade gracefully
 instead of breaking every operation.

 ## Basic Usage

 ```no_run
 use aternos_controller::{Config, Result, ServerController};

 #[tokio::main]
 async fn main() -> Result<()> {
     // Credentials from ATERNOS_USERNAME / ATERNOS_PASSWORD
     let config = Config::from_env()?;
     let mut controller = ServerController::new(config)?;

     // Log in and pick a server by name
     controller.login().await?;
     let server = controller.select_server(Some("survival")).await?;
     println!("Selected {}", server.display_name);

     // Read the state and start the server if needed
     let state = controller.get_status().await?;
     println!("Server is {}", state);
     if controller.start().await? {
         println!("Start initiated");
     }

     controller.cleanup();
     Ok(())
 }
 ```

 ## Queued Usage

 Front ends that receive requests from many users should go through
 [`ControlPanel`], which runs every mutating operation on the
 [`ActionQueue`](queue::ActionQueue) so only one action hits the console at a
 time.

 ## Features

 - **Browser Session**: Retrying HTTP transport with a browser header profile and cookie store
 - **Heuristic Resolution**: Ordered strategy chains per page element
 - **Server Control**: Status, start and stop with confirmation handling
 - **Action Queue**: Single consumer FIFO with enforced cooldown and history
 - **Configuration**: JSON/YAML files or environment variables
 - **Error Handling**: One error type with a re-authentication hint
*/

pub mod action;
pub mod config;
pub mod directory;
pub mod error;
pub mod panel;
pub mod queue;
pub mod resolver;
pub mod session;
pub mod status;
pub mod transport;

pub use action::Transition;
pub use config::Config;
pub use directory::ServerRecord;
pub use error::{Error, Result};
pub use panel::ControlPanel;
pub use queue::{ActionKind, ActionQueue, Requester};
pub use resolver::{ElementResolver, Role};
pub use session::SessionState;
pub use status::{ServerState, StatusReport};

use action::ActionSequencer;
use config::validate_config;
use directory::ServerDirectory;
use scraper::Html;
use serde::{Deserialize, Serialize};
use session::Session;
use status::StatusInspector;
use std::sync::Arc;
use transport::{HttpTransport, Transport};

/// Outcome of a lenient server selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSelection {
    /// The server now selected.
    pub server: ServerRecord,
    /// Name that was asked for but not found, when the default was used instead.
    pub fallback_from: Option<String>,
}

/// Control one Aternos account.
///
/// This struct is the main entry point. It owns the session, remembers the
/// selected server and composes the directory, status and action
/// components. All public async methods are instrumented with `tracing`
/// spans.
pub struct ServerController {
    /// Configuration
    config: Config,
    /// Authenticated session
    session: Session,
    /// Server list parsing
    directory: ServerDirectory,
    /// Status classification
    inspector: StatusInspector,
    /// Start/stop sequencing
    sequencer: ActionSequencer,
    /// Server used by status/start/stop
    selected: Option<ServerRecord>,
}

impl ServerController {
    /// Create a controller with the default HTTP transport.
    ///
    /// The configuration is validated first.
    #[tracing::instrument(skip(config), fields(username = %config.credentials.username))]
    pub fn new(config: Config) -> Result<Self> {
        tracing::info!("Creating new ServerController");
        validate_config(&config)?;
        let transport = Arc::new(HttpTransport::new(&config.transport)?);
        Ok(Self::with_transport(config, transport))
    }

    /// Create a controller on top of an existing transport.
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Self {
        Self::with_resolver(config, transport, ElementResolver::new())
    }

    /// Create a controller with custom strategy chains.
    pub fn with_resolver(config: Config, transport: Arc<dyn Transport>, resolver: ElementResolver) -> Self {
        let resolver = Arc::new(resolver);
        let base_url = config.endpoints.base_url.clone();
        let inspector = StatusInspector::new(resolver.clone());

        Self {
            session: Session::new(
                transport,
                config.endpoints.clone(),
                config.credentials.clone(),
                config.timing.settle_delay(),
                resolver.clone(),
            ),
            directory: ServerDirectory::new(base_url.clone(), resolver.clone()),
            sequencer: ActionSequencer::new(
                base_url,
                resolver,
                inspector.clone(),
                config.timing.action_delay(),
            ),
            inspector,
            config,
            selected: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Server used by status/start/stop, if one was selected.
    pub fn selected_server(&self) -> Option<&ServerRecord> {
        self.selected.as_ref()
    }

    /// Check that the login entry point is reachable and unchanged.
    #[tracing::instrument(skip(self))]
    pub async fn initialize(&mut self) -> Result<()> {
        self.session.initialize().await
    }

    /// Run the full login flow.
    #[tracing::instrument(skip(self))]
    pub async fn login(&mut self) -> Result<()> {
        self.session.login().await.map_err(|e| {
            tracing::error!(error = %e, "Login failed");
            e
        })
    }

    /// Log in unless the session is already authenticated.
    pub async fn ensure_authenticated(&mut self) -> Result<()> {
        if self.session.is_authenticated() {
            return Ok(());
        }
        tracing::debug!("Session not authenticated, logging in");
        self.login().await
    }

    /// Select a server by name, or the first listed server when `name` is
    /// `None`.
    ///
    /// Fails with [`Error::ServerNotFound`] when no card matches.
    #[tracing::instrument(skip(self))]
    pub async fn select_server(&mut self, name: Option<&str>) -> Result<ServerRecord> {
        let result = self.select_inner(name).await;
        self.settle(result)
    }

    async fn select_inner(&mut self, name: Option<&str>) -> Result<ServerRecord> {
        self.ensure_authenticated().await?;
        let page = self
            .session
            .fetch_page(&self.config.endpoints.server_list_url)
            .await?;

        let record = self.pick_server(&page.body, name)?;
        tracing::info!(server_id = %record.identifier, name = %record.display_name, "Selected server");
        self.selected = Some(record.clone());
        Ok(record)
    }

    fn pick_server(&self, body: &str, name: Option<&str>) -> Result<ServerRecord> {
        let document = Html::parse_document(body);
        match name {
            Some(name) => self.directory.find_server(&document, name),
            None => self.directory.select_default(&document),
        }
    }

    /// Like [`select_server`](Self::select_server), but falls back to the
    /// first listed server when the named one does not exist.
    #[tracing::instrument(skip(self))]
    pub async fn select_server_or_default(&mut self, name: Option<&str>) -> Result<ServerSelection> {
        match self.select_server(name).await {
            Ok(server) => Ok(ServerSelection {
                server,
                fallback_from: None,
            }),
            Err(Error::ServerNotFound(missing)) => {
                tracing::warn!(name = %missing, "Server not found, selecting the first server");
                let server = self.select_server(None).await?;
                Ok(ServerSelection {
                    server,
                    fallback_from: Some(missing),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn current_server(&mut self) -> Result<ServerRecord> {
        match &self.selected {
            Some(record) => Ok(record.clone()),
            None => {
                tracing::debug!("No server selected, selecting the first one");
                self.select_inner(None).await
            }
        }
    }

    /// Read the selected server's state.
    #[tracing::instrument(skip(self))]
    pub async fn get_status(&mut self) -> Result<ServerState> {
        let result = self.get_status_inner().await;
        self.settle(result)
    }

    /// Read the selected server's state with address, players and queue
    /// details.
    #[tracing::instrument(skip(self))]
    pub async fn status_report(&mut self) -> Result<StatusReport> {
        let result = self.status_report_inner().await;
        self.settle(result)
    }

    /// Start the selected server.
    ///
    /// Returns `false` when the server already runs (or is starting or
    /// queued) or no start control is shown.
    #[tracing::instrument(skip(self))]
    pub async fn start(&mut self) -> Result<bool> {
        let result = self.start_inner().await;
        self.settle(result)
    }

    /// Stop the selected server.
    ///
    /// Returns `false` when the server is already offline (or stopping) or
    /// no stop control is shown.
    #[tracing::instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<bool> {
        let result = self.stop_inner().await;
        self.settle(result)
    }

    async fn get_status_inner(&mut self) -> Result<ServerState> {
        let record = self.prepare().await?;
        self.inspector.read_status(&self.session, &record).await
    }

    async fn status_report_inner(&mut self) -> Result<StatusReport> {
        let record = self.prepare().await?;
        self.inspector.report(&self.session, &record).await
    }

    async fn start_inner(&mut self) -> Result<bool> {
        let record = self.prepare().await?;
        self.sequencer.start(&self.session, &record).await
    }

    async fn stop_inner(&mut self) -> Result<bool> {
        let record = self.prepare().await?;
        self.sequencer.stop(&self.session, &record).await
    }

    async fn prepare(&mut self) -> Result<ServerRecord> {
        self.ensure_authenticated().await?;
        self.current_server().await
    }

    /// Log in again if `error` calls for it.
    ///
    /// Returns `true` when a fresh login succeeded, `false` when the error
    /// is unrelated to the session.
    #[tracing::instrument(skip(self, error), fields(error = %error))]
    pub async fn recover(&mut self, error: &Error) -> Result<bool> {
        if !error.requires_reauthentication() {
            return Ok(false);
        }
        tracing::info!("Attempting to re-login");
        self.session.invalidate();
        self.login().await?;
        tracing::info!("Re-login successful");
        Ok(true)
    }

    /// Close the HTTP session and forget the selected server.
    #[tracing::instrument(skip(self))]
    pub fn cleanup(&mut self) {
        tracing::info!("Cleaning up controller");
        self.session.close();
        self.selected = None;
    }

    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if session_expired(e) {
                self.session.invalidate();
            }
            tracing::error!(error = %e, "Operation failed");
        }
        result
    }
}

fn session_expired(error: &Error) -> bool {
    match error {
        Error::RequiresReauthentication(_) => true,
        Error::Action { source, .. } => session_expired(source),
        _ => false,
    }
}
