use super::{Hit, Role, own_text, text_of};
use scraper::{ElementRef, Selector};

/// Status literals the console renders, in the order they are searched for.
pub const STATUS_TOKENS: &[&str] = &["Offline", "Online", "Starting", "Stopping", "In Queue"];

/// One extraction heuristic.
///
/// Strategies only read the document. Every strategy returns its matches in
/// document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Elements matching a CSS selector.
    Css(&'static str),
    /// Elements matching `selector` whose full text contains `needle`.
    Text {
        selector: &'static str,
        needle: &'static str,
        ignore_case: bool,
    },
    /// Elements matching `selector` whose own text nodes contain `needle`.
    OwnText {
        selector: &'static str,
        needle: &'static str,
    },
    /// Elements matching `selector` whose `attr` value or text contains
    /// `needle`, ignoring case.
    LinkOrText {
        selector: &'static str,
        attr: &'static str,
        needle: &'static str,
    },
    /// Elements matching `selector` that carry `attr` or whose text contains
    /// `needle`.
    AttrOrText {
        selector: &'static str,
        attr: &'static str,
        needle: &'static str,
    },
    /// The first of the literals found anywhere in the scope's text.
    ///
    /// When several literals appear, the earliest in the list wins, not the
    /// earliest in the document. This strategy yields a single token hit.
    Literal(&'static [&'static str]),
    /// `Online` when only the stop control is present, `Offline` when only
    /// the start control is.
    InferFromControls {
        start: &'static str,
        stop: &'static str,
    },
}

impl Strategy {
    /// Run the strategy inside `scope`.
    pub fn apply<'a>(&self, scope: ElementRef<'a>) -> Vec<Hit<'a>> {
        match *self {
            Strategy::Css(selector) => select(scope, selector).into_iter().map(Hit::Element).collect(),
            Strategy::Text {
                selector,
                needle,
                ignore_case,
            } => select(scope, selector)
                .into_iter()
                .filter(|element| contains(&text_of(*element), needle, ignore_case))
                .map(Hit::Element)
                .collect(),
            Strategy::OwnText { selector, needle } => select(scope, selector)
                .into_iter()
                .filter(|element| own_text(*element).contains(needle))
                .map(Hit::Element)
                .collect(),
            Strategy::LinkOrText {
                selector,
                attr,
                needle,
            } => select(scope, selector)
                .into_iter()
                .filter(|element| {
                    let target = element.value().attr(attr).unwrap_or_default();
                    contains(target, needle, true) || contains(&text_of(*element), needle, true)
                })
                .map(Hit::Element)
                .collect(),
            Strategy::AttrOrText {
                selector,
                attr,
                needle,
            } => select(scope, selector)
                .into_iter()
                .filter(|element| {
                    element.value().attr(attr).is_some() || text_of(*element).contains(needle)
                })
                .map(Hit::Element)
                .collect(),
            Strategy::Literal(tokens) => {
                let texts: Vec<&str> = scope.text().collect();
                tokens
                    .iter()
                    .copied()
                    .find(|token| texts.iter().any(|text| text.contains(token)))
                    .map(|token| vec![Hit::Token(token)])
                    .unwrap_or_default()
            }
            Strategy::InferFromControls { start, stop } => {
                let has_start = !select(scope, start).is_empty();
                let has_stop = !select(scope, stop).is_empty();
                match (has_start, has_stop) {
                    (false, true) => vec![Hit::Token("Online")],
                    (true, false) => vec![Hit::Token("Offline")],
                    _ => Vec::new(),
                }
            }
        }
    }
}

fn select<'a>(scope: ElementRef<'a>, selector: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(selector) {
        Ok(parsed) => scope.select(&parsed).collect(),
        Err(e) => {
            tracing::debug!(selector, error = ?e, "Selector failed");
            Vec::new()
        }
    }
}

fn contains(haystack: &str, needle: &str, ignore_case: bool) -> bool {
    if ignore_case {
        haystack.to_lowercase().contains(&needle.to_lowercase())
    } else {
        haystack.contains(needle)
    }
}

/// Ordered strategy list for one role.
///
/// The first strategy producing at least one match wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyChain {
    role: Role,
    strategies: Vec<Strategy>,
}

impl StrategyChain {
    pub fn new(role: Role, strategies: Vec<Strategy>) -> Self {
        Self { role, strategies }
    }

    /// The built-in chain for `role`.
    pub fn default_for(role: Role) -> Self {
        Self::new(role, default_strategies(role).to_vec())
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    /// Matches of the first strategy that found anything, with its position.
    pub fn run<'a>(&self, scope: ElementRef<'a>) -> Option<(usize, Vec<Hit<'a>>)> {
        self.strategies.iter().enumerate().find_map(|(index, strategy)| {
            let hits = strategy.apply(scope);
            if hits.is_empty() {
                None
            } else {
                Some((index, hits))
            }
        })
    }
}

fn default_strategies(role: Role) -> &'static [Strategy] {
    match role {
        Role::LoginLink => LOGIN_LINK,
        Role::LoginForm => LOGIN_FORM,
        Role::UsernameInput => USERNAME_INPUT,
        Role::PasswordInput => PASSWORD_INPUT,
        Role::ServerCard => SERVER_CARD,
        Role::StatusText => STATUS_TEXT,
        Role::StartControl => START_CONTROL,
        Role::StopControl => STOP_CONTROL,
        Role::ConfirmControl => CONFIRM_CONTROL,
    }
}

const LOGIN_LINK: &[Strategy] = &[Strategy::LinkOrText {
    selector: ".mod-signup a",
    attr: "href",
    needle: "login",
}];

const LOGIN_FORM: &[Strategy] = &[Strategy::Css("div.login-form"), Strategy::Css(".login-form")];

const USERNAME_INPUT: &[Strategy] = &[
    Strategy::Css("input.username"),
    Strategy::Css("input[name=\"user\"]"),
    Strategy::Css("input[type=\"email\"]"),
    Strategy::Css("input[type=\"text\"]"),
];

const PASSWORD_INPUT: &[Strategy] = &[
    Strategy::Css("input.password"),
    Strategy::Css("input[type=\"password\"]"),
];

const SERVER_CARD: &[Strategy] = &[
    Strategy::Css("div.server"),
    Strategy::Css(".servercardlist > div"),
    Strategy::Css("a[href^=\"/server/\"]"),
    Strategy::Css("[data-id]"),
    Strategy::OwnText {
        selector: "h2, h3, div",
        needle: "#",
    },
    Strategy::AttrOrText {
        selector: "div, a, span",
        attr: "data-id",
        needle: "#",
    },
];

const STATUS_TEXT: &[Strategy] = &[
    Strategy::Css(".status"),
    Strategy::Css(".server-status"),
    Strategy::Css(".statuslabel-label"),
    Strategy::Css(".status-label"),
    Strategy::Css("div[class*=\"status\"]"),
    Strategy::Css(".statusicon"),
    Strategy::Literal(STATUS_TOKENS),
    Strategy::InferFromControls {
        start: "a.btn-start, a.start",
        stop: "a.btn-stop, a.stop",
    },
];

const START_CONTROL: &[Strategy] = &[
    Strategy::Css("a.btn-start"),
    Strategy::Css("a.start"),
    Strategy::Css("div.start"),
    Strategy::Css("button.start"),
    Strategy::Text {
        selector: "a",
        needle: "Start",
        ignore_case: false,
    },
    Strategy::Text {
        selector: "button",
        needle: "Start",
        ignore_case: false,
    },
    Strategy::LinkOrText {
        selector: "a",
        attr: "href",
        needle: "start",
    },
    Strategy::Text {
        selector: "button, input, div",
        needle: "start",
        ignore_case: true,
    },
];

const STOP_CONTROL: &[Strategy] = &[
    Strategy::Css("a.btn-stop"),
    Strategy::Css("a.stop"),
    Strategy::Css("div.stop"),
    Strategy::Css("button.stop"),
    Strategy::Text {
        selector: "a",
        needle: "Stop",
        ignore_case: false,
    },
    Strategy::Text {
        selector: "button",
        needle: "Stop",
        ignore_case: false,
    },
    Strategy::LinkOrText {
        selector: "a",
        attr: "href",
        needle: "stop",
    },
    Strategy::Text {
        selector: "button, input, div",
        needle: "stop",
        ignore_case: true,
    },
];

const CONFIRM_CONTROL: &[Strategy] = &[Strategy::OwnText {
    selector: "*",
    needle: "Confirm",
}];
