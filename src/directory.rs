//! Server list parsing.
//!
//! Turns the account's server list page into [`ServerRecord`]s. Cards are
//! found through the [`Role::ServerCard`] chain; identifiers and names are
//! pulled from whatever the card happens to carry.

use crate::error::{Error, Result};
use crate::resolver::{ElementResolver, Role, text_of};
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const UNKNOWN_NAME: &str = "Unknown";

/// A managed server as listed on the console.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    /// Stable identifier used in the control page URL.
    pub identifier: String,
    /// Human readable name.
    pub display_name: String,
    /// `base_url + "/server/" + identifier`.
    pub control_url: String,
}

/// Lists and finds servers on a server list page.
///
/// # Example
///
/// ```
/// use aternos_controller::directory::ServerDirectory;
/// use aternos_controller::resolver::ElementResolver;
/// use scraper::Html;
/// use std::sync::Arc;
///
/// let directory = ServerDirectory::new("https://aternos.org", Arc::new(ElementResolver::new()));
/// let page = Html::parse_document(r#"<div data-id="abc123" title="Survival"></div>"#);
///
/// let server = directory.find_server(&page, "survival").unwrap();
/// assert_eq!(server.control_url, "https://aternos.org/server/abc123");
/// ```
#[derive(Debug, Clone)]
pub struct ServerDirectory {
    base_url: String,
    resolver: Arc<ElementResolver>,
}

impl ServerDirectory {
    pub fn new(base_url: impl Into<String>, resolver: Arc<ElementResolver>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            resolver,
        }
    }

    /// Control page of a server.
    pub fn control_url(&self, identifier: &str) -> String {
        format!("{}/server/{}", self.base_url, identifier)
    }

    fn cards<'a>(&self, document: &'a Html) -> Result<Vec<ElementRef<'a>>> {
        let cards: Vec<_> = self
            .resolver
            .resolve_all(document.root_element(), Role::ServerCard)
            .map_err(|_| Error::NoServersFound)?
            .into_iter()
            .filter_map(|hit| hit.element())
            .collect();

        if cards.is_empty() {
            return Err(Error::NoServersFound);
        }
        tracing::debug!(count = cards.len(), "Found server cards");
        Ok(cards)
    }

    fn record(&self, card: ElementRef<'_>) -> Option<ServerRecord> {
        let identifier = card_identifier(card)?;
        Some(ServerRecord {
            control_url: self.control_url(&identifier),
            display_name: display_name(card),
            identifier,
        })
    }

    /// Every card with an extractable identifier, in document order.
    pub fn list_servers(&self, document: &Html) -> Result<Vec<ServerRecord>> {
        let mut servers = Vec::new();
        for card in self.cards(document)? {
            match self.record(card) {
                Some(record) => servers.push(record),
                None => tracing::debug!(name = %display_name(card), "Skipping card without identifier"),
            }
        }

        if servers.is_empty() {
            return Err(Error::NoServersFound);
        }
        Ok(servers)
    }

    /// First card whose title, text, `data-name` or `id` contains `name`,
    /// ignoring case.
    pub fn find_server(&self, document: &Html, name: &str) -> Result<ServerRecord> {
        let needle = name.to_lowercase();
        let card = self
            .cards(document)?
            .into_iter()
            .find(|card| {
                candidate_names(*card)
                    .iter()
                    .any(|candidate| candidate.to_lowercase().contains(&needle))
            })
            .ok_or_else(|| Error::ServerNotFound(name.to_string()))?;

        let record = self
            .record(card)
            .ok_or_else(|| Error::ServerIdentifierMissing(display_name(card)))?;
        tracing::debug!(server_id = %record.identifier, name = %record.display_name, "Found matching server");
        Ok(record)
    }

    /// The first listed server.
    pub fn select_default(&self, document: &Html) -> Result<ServerRecord> {
        self.list_servers(document)?
            .into_iter()
            .next()
            .ok_or(Error::NoServersFound)
    }
}

fn candidate_names(card: ElementRef<'_>) -> Vec<String> {
    let element = card.value();
    [
        element.attr("title").map(str::trim).map(str::to_string),
        Some(text_of(card)),
        element.attr("data-name").map(str::to_string),
        element.attr("id").map(str::to_string),
    ]
    .into_iter()
    .flatten()
    .filter(|name| !name.is_empty())
    .collect()
}

fn display_name(card: ElementRef<'_>) -> String {
    let element = card.value();
    element
        .attr("title")
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .map(str::to_string)
        .or_else(|| Some(text_of(card)).filter(|text| !text.is_empty()))
        .or_else(|| element.attr("data-name").map(str::to_string))
        .unwrap_or_else(|| UNKNOWN_NAME.to_string())
}

fn card_identifier(card: ElementRef<'_>) -> Option<String> {
    let element = card.value();

    if let Some(id) = element.attr("data-id").filter(|id| !id.is_empty()) {
        return Some(id.to_string());
    }

    if element.name() == "a" {
        if let Some(id) = element.attr("href").and_then(trailing_segment) {
            return Some(id);
        }
    }

    if let Some(id) = hash_token(&text_of(card)) {
        return Some(id);
    }

    card.descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .find_map(|child| {
            let child = child.value();
            if let Some(id) = child.attr("data-id").filter(|id| !id.is_empty()) {
                return Some(id.to_string());
            }
            child
                .attr("href")
                .filter(|href| href.contains("/server/"))
                .and_then(trailing_segment)
        })
}

fn trailing_segment(href: &str) -> Option<String> {
    href.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty() && *segment != "server")
        .map(str::to_string)
}

fn hash_token(text: &str) -> Option<String> {
    let (_, rest) = text.split_once('#')?;
    let token: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::StrategyChain;

    fn directory() -> ServerDirectory {
        ServerDirectory::new("https://aternos.org/", Arc::new(ElementResolver::new()))
    }

    #[test]
    fn test_find_server_by_title() {
        let page = Html::parse_document(
            r#"<div data-id="zzz" title="Creative"></div>
               <div data-id="abc123" title="Survival"></div>"#,
        );

        let server = directory().find_server(&page, "survival").unwrap();

        assert_eq!(
            server,
            ServerRecord {
                identifier: "abc123".to_string(),
                display_name: "Survival".to_string(),
                control_url: "https://aternos.org/server/abc123".to_string(),
            }
        );
    }

    #[test]
    fn test_identifier_from_anchor_href() {
        let page = Html::parse_document(r#"<a href="/server/Xy9_ab/">Friends</a>"#);

        let servers = directory().list_servers(&page).unwrap();

        assert_eq!(servers[0].identifier, "Xy9_ab");
        assert_eq!(servers[0].display_name, "Friends");
    }

    #[test]
    fn test_identifier_from_hash_text() {
        let page = Html::parse_document(
            r#"<div class="servercardlist"><div><h3>Friends</h3><span>#NXQg3wb6 Online</span></div></div>"#,
        );

        let servers = directory().list_servers(&page).unwrap();

        assert_eq!(servers[0].identifier, "NXQg3wb6");
    }

    #[test]
    fn test_identifier_from_descendant() {
        let page = Html::parse_document(
            r#"<div class="server"><span>Modded</span><a class="link" href="https://aternos.org/server/m0d">open</a></div>"#,
        );

        let servers = directory().list_servers(&page).unwrap();

        assert_eq!(servers[0].identifier, "m0d");
        assert_eq!(servers[0].display_name, "Modded open");
    }

    #[test]
    fn test_cards_without_identifier_are_skipped() {
        let page = Html::parse_document(
            r#"<div class="server">Ghost</div><div class="server" data-id="real">Real</div>"#,
        );

        let servers = directory().list_servers(&page).unwrap();

        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].identifier, "real");
    }

    #[test]
    fn test_matched_card_without_identifier() {
        let page = Html::parse_document(r#"<div class="server">Ghost</div>"#);

        let result = directory().find_server(&page, "ghost");

        assert!(matches!(result, Err(Error::ServerIdentifierMissing(name)) if name == "Ghost"));
    }

    #[test]
    fn test_no_match_is_server_not_found() {
        let page = Html::parse_document(r#"<div data-id="abc123" title="Survival"></div>"#);

        let result = directory().find_server(&page, "creative");

        assert!(matches!(result, Err(Error::ServerNotFound(name)) if name == "creative"));
    }

    #[test]
    fn test_empty_page_has_no_servers() {
        let page = Html::parse_document("<p>Create your first server</p>");

        let result = directory().select_default(&page);

        assert!(matches!(result, Err(Error::NoServersFound)));
    }

    #[test]
    fn test_select_default_is_first_card() {
        let page = Html::parse_document(
            r#"<div class="server" data-id="one"></div><div class="server" data-id="two"></div>"#,
        );

        let server = directory().select_default(&page).unwrap();

        assert_eq!(server.identifier, "one");
        assert_eq!(server.display_name, UNKNOWN_NAME);
    }

    fn winning_strategy(page: &Html) -> Option<usize> {
        StrategyChain::default_for(Role::ServerCard)
            .run(page.root_element())
            .map(|(index, _)| index)
    }

    #[test]
    fn test_cards_from_headings() {
        let page = Html::parse_document(
            r#"<main><h3>Survival #abc123</h3><h3>Creative #def456</h3></main>"#,
        );

        let servers = directory().list_servers(&page).unwrap();

        assert_eq!(winning_strategy(&page), Some(4));
        let found: Vec<_> = servers
            .iter()
            .map(|s| (s.identifier.as_str(), s.display_name.as_str()))
            .collect();
        assert_eq!(
            found,
            vec![("abc123", "Survival #abc123"), ("def456", "Creative #def456")]
        );
    }

    #[test]
    fn test_cards_from_inline_scan() {
        let page = Html::parse_document(
            r#"<main><p><span>Survival #abc123</span></p><p><a>Creative #def456</a></p></main>"#,
        );

        let servers = directory().list_servers(&page).unwrap();

        assert_eq!(winning_strategy(&page), Some(5));
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].identifier, "abc123");
        assert_eq!(servers[1].identifier, "def456");
        assert_eq!(servers[1].control_url, "https://aternos.org/server/def456");
    }
}
