//! Heuristic element resolution.
//!
//! The console's markup is not under our control and changes without notice.
//! Instead of one selector per element, every semantic [`Role`] carries an
//! ordered [`StrategyChain`]. The first strategy that produces a match wins,
//! so older or newer page layouts keep resolving as long as any strategy in
//! the chain still fits.
//!
//! # Example
//!
//! ```
//! use aternos_controller::resolver::{ElementResolver, Role};
//! use scraper::Html;
//!
//! let html = Html::parse_document(r#"<div class="status-label">Offline</div>"#);
//! let resolver = ElementResolver::new();
//! let hit = resolver.resolve(html.root_element(), Role::StatusText).unwrap();
//! assert_eq!(hit.text(), "Offline");
//! ```
mod strategy;

pub use strategy::{STATUS_TOKENS, Strategy, StrategyChain};

use crate::error::{Error, Result};
use scraper::{ElementRef, Node};
use std::collections::HashMap;
use std::fmt;

/// Semantic element the controller needs to find on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    LoginLink,
    LoginForm,
    UsernameInput,
    PasswordInput,
    ServerCard,
    StatusText,
    StartControl,
    StopControl,
    ConfirmControl,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::LoginLink => "login link",
            Role::LoginForm => "login form",
            Role::UsernameInput => "username input",
            Role::PasswordInput => "password input",
            Role::ServerCard => "server card",
            Role::StatusText => "status text",
            Role::StartControl => "start control",
            Role::StopControl => "stop control",
            Role::ConfirmControl => "confirm control",
        };
        write!(f, "{}", name)
    }
}

/// A single match produced by a strategy.
#[derive(Debug, Clone, Copy)]
pub enum Hit<'a> {
    /// An element of the document.
    Element(ElementRef<'a>),
    /// A literal token, produced by text search or inference.
    Token(&'static str),
}

impl<'a> Hit<'a> {
    pub fn element(&self) -> Option<ElementRef<'a>> {
        match self {
            Hit::Element(element) => Some(*element),
            Hit::Token(_) => None,
        }
    }

    /// Visible text of the element, or the token itself.
    pub fn text(&self) -> String {
        match self {
            Hit::Element(element) => text_of(*element),
            Hit::Token(token) => token.to_string(),
        }
    }
}

/// Resolves roles to elements using the default chains, with optional
/// per-role overrides.
#[derive(Debug, Clone, Default)]
pub struct ElementResolver {
    overrides: HashMap<Role, StrategyChain>,
}

impl ElementResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the chain used for `chain.role()`.
    pub fn with_chain(mut self, chain: StrategyChain) -> Self {
        self.overrides.insert(chain.role(), chain);
        self
    }

    /// The chain currently used for `role`.
    pub fn chain(&self, role: Role) -> StrategyChain {
        self.overrides
            .get(&role)
            .cloned()
            .unwrap_or_else(|| StrategyChain::default_for(role))
    }

    /// Every match of the first successful strategy, in document order.
    pub fn resolve_all<'a>(&self, scope: ElementRef<'a>, role: Role) -> Result<Vec<Hit<'a>>> {
        match self.chain(role).run(scope) {
            Some((index, hits)) => {
                tracing::trace!(%role, strategy = index, matches = hits.len(), "Resolved");
                Ok(hits)
            }
            None => {
                tracing::debug!(%role, "No strategy matched");
                Err(Error::ElementNotFound(role))
            }
        }
    }

    /// First match of the first successful strategy.
    pub fn resolve<'a>(&self, scope: ElementRef<'a>, role: Role) -> Result<Hit<'a>> {
        self.resolve_all(scope, role)?
            .into_iter()
            .next()
            .ok_or(Error::ElementNotFound(role))
    }

    /// Like [`resolve`](Self::resolve) but only accepts element matches.
    pub fn resolve_element<'a>(&self, scope: ElementRef<'a>, role: Role) -> Result<ElementRef<'a>> {
        self.resolve_all(scope, role)?
            .into_iter()
            .find_map(|hit| hit.element())
            .ok_or(Error::ElementNotFound(role))
    }

    /// Element match for `role`, or `None` when the chain comes up empty.
    pub fn find_element<'a>(&self, scope: ElementRef<'a>, role: Role) -> Option<ElementRef<'a>> {
        self.resolve_element(scope, role).ok()
    }
}

/// Visible text of an element: trimmed text nodes joined by single spaces.
pub fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the element's direct text children only.
pub fn own_text(element: ElementRef<'_>) -> String {
    element
        .children()
        .filter_map(|child| match child.value() {
            Node::Text(text) => Some(text.trim()),
            _ => None,
        })
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collapse runs of whitespace to one space and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn test_first_matching_strategy_wins() {
        let html = Html::parse_document(
            r#"<div class="server-status">Online</div><div class="status">Offline</div>"#,
        );
        let resolver = ElementResolver::new();

        let hit = resolver.resolve(html.root_element(), Role::StatusText).unwrap();

        // `.status` comes before `.server-status` in the chain.
        assert_eq!(hit.text(), "Offline");
    }

    #[test]
    fn test_matches_are_in_document_order() {
        let html = Html::parse_document(
            r#"<div class="server" data-id="a"></div><div class="server" data-id="b"></div>"#,
        );
        let resolver = ElementResolver::new();

        let hits = resolver.resolve_all(html.root_element(), Role::ServerCard).unwrap();
        let ids: Vec<_> = hits
            .iter()
            .filter_map(|hit| hit.element())
            .filter_map(|element| element.value().attr("data-id"))
            .collect();

        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_empty_chain_is_element_not_found() {
        let html = Html::parse_document("<p>nothing here</p>");
        let resolver = ElementResolver::new();

        let result = resolver.resolve(html.root_element(), Role::LoginForm);

        assert!(matches!(result, Err(Error::ElementNotFound(Role::LoginForm))));
    }

    #[test]
    fn test_status_literal_token() {
        let html = Html::parse_document("<main><p>Your server is  In Queue  right now</p></main>");
        let resolver = ElementResolver::new();

        let hit = resolver.resolve(html.root_element(), Role::StatusText).unwrap();

        assert!(matches!(hit, Hit::Token("In Queue")));
    }

    #[test]
    fn test_status_literal_prefers_list_order() {
        let html = Html::parse_document("<main><p>Starting soon</p><p>Offline</p></main>");
        let resolver = ElementResolver::new();

        let hit = resolver.resolve(html.root_element(), Role::StatusText).unwrap();

        assert!(matches!(hit, Hit::Token("Offline")));
    }

    #[test]
    fn test_status_inferred_from_controls() {
        let html = Html::parse_document(r#"<a class="btn-stop" href="/stop">Halt</a>"#);
        let resolver = ElementResolver::new();

        let hit = resolver.resolve(html.root_element(), Role::StatusText).unwrap();

        assert!(matches!(hit, Hit::Token("Online")));
    }

    #[test]
    fn test_start_control_case_insensitive_href() {
        let html = Html::parse_document(r#"<a href="/server/x/START">go</a>"#);
        let resolver = ElementResolver::new();

        let element = resolver
            .resolve_element(html.root_element(), Role::StartControl)
            .unwrap();

        assert_eq!(element.value().attr("href"), Some("/server/x/START"));
    }

    #[test]
    fn test_chain_override() {
        let html = Html::parse_document(r#"<b class="state">Starting</b><div class="status">Offline</div>"#);
        let resolver = ElementResolver::new().with_chain(StrategyChain::new(
            Role::StatusText,
            vec![Strategy::Css("b.state")],
        ));

        let hit = resolver.resolve(html.root_element(), Role::StatusText).unwrap();

        assert_eq!(hit.text(), "Starting");
    }

    #[test]
    fn test_scoped_resolution() {
        let html = Html::parse_document(
            r#"<input type="text" name="outside">
               <div class="login-form"><input type="text" name="inside"></div>"#,
        );
        let resolver = ElementResolver::new();
        let form = resolver
            .resolve_element(html.root_element(), Role::LoginForm)
            .unwrap();

        let input = resolver.resolve_element(form, Role::UsernameInput).unwrap();

        assert_eq!(input.value().attr("name"), Some("inside"));
    }

    #[test]
    fn test_own_text_ignores_children() {
        let html = Html::parse_document(r#"<div id="c">Confirm <span>later</span></div>"#);
        let resolver = ElementResolver::new();

        let element = resolver
            .resolve_element(html.root_element(), Role::ConfirmControl)
            .unwrap();

        assert_eq!(element.value().attr("id"), Some("c"));
        assert_eq!(own_text(element), "Confirm");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  In \n  Queue "), "In Queue");
    }
}
