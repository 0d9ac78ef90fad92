/// Error handling module for the Aternos controller.
///
/// This module defines the error types used throughout the library.
/// Hard failures (an element that must exist could not be found, a login
/// that did not verify) are errors; semantic no-ops such as a start control
/// that is absent because the server already runs are reported through
/// boolean results instead and never show up here.
///
/// # Example
///
/// ```
/// use aternos_controller::error::{Error, Result};
///
/// fn handle_error(result: Result<bool>) {
///     match result {
///         Ok(true) => println!("Transition initiated"),
///         Ok(false) => println!("Nothing to do"),
///         Err(Error::ServerNotFound(name)) => println!("No server matches '{}'", name),
///         Err(e) if e.requires_reauthentication() => println!("Log in again: {}", e),
///         Err(e) => println!("Other error: {}", e),
///     }
/// }
/// ```
use crate::action::Transition;
use crate::resolver::Role;
use thiserror::Error;

/// Errors that can occur in the aternos-controller library.
///
/// Each variant carries enough context to explain the failure to a user or
/// to decide on a recovery strategy (see [`Error::requires_reauthentication`]).
#[derive(Error, Debug)]
pub enum Error {
    /// Network or HTTP failure after every retry attempt was used.
    ///
    /// The last underlying `reqwest` error is preserved as the source.
    #[error("Request to {url} failed after {attempts} attempt(s): {source}")]
    Transport {
        /// URL that was requested
        url: String,
        /// Number of attempts made
        attempts: u32,
        /// Last underlying failure
        #[source]
        source: reqwest::Error,
    },

    /// The request could not be built (bad header name or value).
    ///
    /// Never retried.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The HTTP session was closed with `cleanup()`.
    #[error("Session is closed")]
    SessionClosed,

    /// The login entry point did not land where expected.
    ///
    /// This is the canary for navigation changes on the remote side.
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// Login form, its inputs, or post-login verification failed.
    #[error("Login failed: {0}")]
    Login(String),

    /// The remote side ended the session (a page redirected to the login page).
    #[error("Session requires re-authentication: {0}")]
    RequiresReauthentication(String),

    /// Every strategy in a role's chain came up empty.
    #[error("Element not found: {0}")]
    ElementNotFound(Role),

    /// The server list page contained no usable server card.
    #[error("No servers found")]
    NoServersFound,

    /// No server card matched the requested name.
    #[error("Server not found: {0}")]
    ServerNotFound(String),

    /// A server card matched but no identifier could be extracted from it.
    #[error("Could not find server ID for '{0}'")]
    ServerIdentifierMissing(String),

    /// Failure while locating or invoking a start/stop control.
    #[error("Failed to {transition} server: {source}")]
    Action {
        /// Transition being attempted
        transition: Transition,
        /// Underlying failure
        #[source]
        source: Box<Error>,
    },

    /// Failed to parse configuration from a file or string.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration parsed but contains invalid values.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// The action queue could not accept or complete an action.
    #[error("Action queue error: {0}")]
    Queue(String),

    /// Any other error not covered by the above categories.
    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    /// Whether a fresh `login()` is the sensible recovery for this error.
    ///
    /// True for explicit re-authentication requests and for login or
    /// initialization failures, including when they surface wrapped inside
    /// an [`Error::Action`].
    pub fn requires_reauthentication(&self) -> bool {
        match self {
            Error::RequiresReauthentication(_) | Error::Login(_) | Error::Initialization(_) => true,
            Error::Action { source, .. } => source.requires_reauthentication(),
            _ => false,
        }
    }

    pub(crate) fn action(transition: Transition, source: Error) -> Self {
        Error::Action {
            transition,
            source: Box::new(source),
        }
    }
}

/// Result type for aternos-controller operations.
pub type Result<T> = std::result::Result<T, Error>;
