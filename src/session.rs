//! Authenticated browser session.
//!
//! A [`Session`] drives the console's login pages the way a person would:
//! load the home page, follow the login link, fill the form (forwarding every
//! hidden token), submit it and check that the server list now shows an
//! account. Cookies live in the transport's cookie store, so a successful
//! login carries over to every later request made through the same
//! transport.

use crate::config::{Credentials, Endpoints};
use crate::error::{Error, Result};
use crate::resolver::{ElementResolver, Role};
use crate::transport::{Method, PageResponse, RequestOptions, Transport};
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing has been requested yet.
    Uninitialized,
    /// The login entry point answered where expected.
    Initialized,
    /// Credentials were accepted and verified.
    Authenticated,
}

/// Owns the authenticated context for one account.
pub struct Session {
    transport: Arc<dyn Transport>,
    endpoints: Endpoints,
    credentials: Credentials,
    settle_delay: Duration,
    resolver: Arc<ElementResolver>,
    state: SessionState,
}

/// Form fields and target of a login submission.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LoginSubmission {
    action_url: String,
    fields: Vec<(String, String)>,
}

impl Session {
    pub fn new(
        transport: Arc<dyn Transport>,
        endpoints: Endpoints,
        credentials: Credentials,
        settle_delay: Duration,
        resolver: Arc<ElementResolver>,
    ) -> Self {
        Self {
            transport,
            endpoints,
            credentials,
            settle_delay,
            resolver,
            state: SessionState::Uninitialized,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Load the login entry point and check that we landed on it.
    ///
    /// A different final path means the console's navigation changed and
    /// nothing else can be trusted.
    #[tracing::instrument(skip(self), fields(url = %self.endpoints.login_url))]
    pub async fn initialize(&mut self) -> Result<()> {
        tracing::info!("Initializing session");
        let page = self
            .transport
            .request(Method::Get, &self.endpoints.login_url, RequestOptions::new())
            .await?;

        let expected = url_path(&self.endpoints.login_url)
            .ok_or_else(|| Error::Initialization(format!("Invalid login URL '{}'", self.endpoints.login_url)))?;
        let actual = url_path(&page.url)
            .ok_or_else(|| Error::Initialization(format!("Invalid final URL '{}'", page.url)))?;

        if expected != actual {
            tracing::error!(final_url = %page.url, "Login entry point redirected elsewhere");
            return Err(Error::Initialization(format!(
                "Expected to land on '{}' but landed on '{}'",
                expected, actual
            )));
        }

        if self.state == SessionState::Uninitialized {
            self.state = SessionState::Initialized;
        }
        tracing::info!("Session initialized");
        Ok(())
    }

    /// Run the full login flow.
    ///
    /// Safe to call again after a failure; every call starts from the home
    /// page and the session counts as unauthenticated until verification
    /// succeeds.
    #[tracing::instrument(skip(self), fields(username = %self.credentials.username))]
    pub async fn login(&mut self) -> Result<()> {
        if self.state == SessionState::Uninitialized {
            self.initialize().await?;
        }
        self.invalidate();
        tracing::info!("Logging in");

        let home = self
            .transport
            .request(Method::Get, &self.endpoints.home_url, RequestOptions::new())
            .await?;
        let login_url = find_login_link(&home.body, &self.endpoints.base_url, &self.resolver)
            .unwrap_or_else(|| {
                tracing::debug!("No login link on home page, using configured login URL");
                self.endpoints.login_url.clone()
            });
        tracing::debug!(%login_url, "Resolved login page");

        let login_page = self
            .transport
            .request(Method::Get, &login_url, RequestOptions::new())
            .await?;
        let submission = build_submission(
            &login_page.body,
            &self.endpoints,
            &self.credentials,
            &self.resolver,
        )?;
        tracing::debug!(
            action_url = %submission.action_url,
            keys = ?submission.fields.iter().map(|(key, _)| key.as_str()).collect::<Vec<_>>(),
            "Submitting login form"
        );

        let options = RequestOptions::new()
            .header("Origin", self.endpoints.base_url.clone())
            .header("Referer", login_page.url.clone())
            .form(submission.fields);
        self.transport
            .request(Method::Post, &submission.action_url, options)
            .await?;

        tokio::time::sleep(self.settle_delay).await;

        let list = self
            .transport
            .request(Method::Get, &self.endpoints.server_list_url, RequestOptions::new())
            .await?;
        let login_path = url_path(&self.endpoints.login_url);
        if login_path.is_some() && url_path(&list.url) == login_path {
            tracing::error!(final_url = %list.url, "Login verification landed on the login page");
            return Err(Error::Login("Redirected to the login page".to_string()));
        }
        if !shows_account(&list.body) {
            tracing::error!(final_url = %list.url, "Login could not be verified");
            return Err(Error::Login(
                "Server list does not show a logged-in account".to_string(),
            ));
        }

        self.state = SessionState::Authenticated;
        tracing::info!("Login successful");
        Ok(())
    }

    /// GET a page within the authenticated session.
    ///
    /// Fails with [`Error::RequiresReauthentication`] when the console sent
    /// us back to the login page.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_page(&self, url: &str) -> Result<PageResponse> {
        let page = self
            .transport
            .request(Method::Get, url, RequestOptions::new())
            .await?;

        let login_path = url_path(&self.endpoints.login_url);
        let requested = url_path(url);
        let landed = url_path(&page.url);
        if login_path.is_some() && landed == login_path && requested != login_path {
            tracing::warn!(final_url = %page.url, "Redirected to login page");
            return Err(Error::RequiresReauthentication(format!(
                "'{}' redirected to the login page",
                url
            )));
        }

        Ok(page)
    }

    /// Forget the authentication after the remote side ended it.
    pub fn invalidate(&mut self) {
        if self.state == SessionState::Authenticated {
            tracing::info!("Session invalidated");
            self.state = SessionState::Initialized;
        }
    }

    /// Release the HTTP client. The session cannot be used afterwards.
    pub fn close(&mut self) {
        self.transport.close();
        if self.state == SessionState::Authenticated {
            self.state = SessionState::Initialized;
        }
    }
}

fn url_path(url: &str) -> Option<String> {
    Url::parse(url).ok().map(|parsed| parsed.path().to_string())
}

/// Resolve `href` against `base`, leaving absolute URLs untouched.
pub(crate) fn absolutize(base: &str, href: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    base.join(href).ok().map(|url| url.to_string())
}

fn find_login_link(body: &str, base_url: &str, resolver: &ElementResolver) -> Option<String> {
    let document = Html::parse_document(body);
    let link = resolver.find_element(document.root_element(), Role::LoginLink)?;
    let href = link.value().attr("href")?;
    absolutize(base_url, href)
}

fn build_submission(
    body: &str,
    endpoints: &Endpoints,
    credentials: &Credentials,
    resolver: &ElementResolver,
) -> Result<LoginSubmission> {
    let document = Html::parse_document(body);
    let form = resolver
        .resolve_element(document.root_element(), Role::LoginForm)
        .map_err(|_| Error::Login("Login form not found".to_string()))?;
    let username = resolver
        .resolve_element(form, Role::UsernameInput)
        .map_err(|_| Error::Login("Username input not found".to_string()))?;
    let password = resolver
        .resolve_element(form, Role::PasswordInput)
        .map_err(|_| Error::Login("Password input not found".to_string()))?;

    let mut fields = Vec::new();
    if let Ok(hidden) = Selector::parse("input[type=\"hidden\"]") {
        for input in form.select(&hidden) {
            if let Some(name) = input.value().attr("name").filter(|name| !name.is_empty()) {
                let value = input.value().attr("value").unwrap_or_default();
                tracing::debug!(name, "Found hidden input");
                set_field(&mut fields, name, value);
            }
        }
    }

    let username_key = username.value().attr("name").unwrap_or("user");
    let password_key = password.value().attr("name").unwrap_or("password");
    set_field(&mut fields, username_key, &credentials.username);
    set_field(&mut fields, password_key, &credentials.password);
    set_field(&mut fields, "remember", "true");

    let action_url = form
        .value()
        .attr("action")
        .filter(|action| !action.trim().is_empty())
        .and_then(|action| absolutize(&endpoints.base_url, action))
        .unwrap_or_else(|| endpoints.login_url.clone());

    Ok(LoginSubmission { action_url, fields })
}

// Later values replace earlier ones in place.
fn set_field(fields: &mut Vec<(String, String)>, name: &str, value: &str) {
    match fields.iter_mut().find(|(key, _)| key == name) {
        Some(field) => field.1 = value.to_string(),
        None => fields.push((name.to_string(), value.to_string())),
    }
}

fn shows_account(body: &str) -> bool {
    let body = body.to_lowercase();
    body.contains("logout") || body.contains("account")
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_PAGE: &str = r#"
        <html><body>
          <div class="login-form" action="/panel/ajax/account/login.php">
            <input type="hidden" name="csrf" value="xyz">
            <input type="hidden" name="remember" value="false">
            <input type="text" class="username" name="user">
            <input type="password" class="password" name="password">
          </div>
        </body></html>"#;

    #[test]
    fn test_submission_forwards_hidden_fields() {
        let endpoints = Endpoints::for_base("https://example.test");
        let credentials = Credentials::new("steve", "hunter2");

        let submission =
            build_submission(LOGIN_PAGE, &endpoints, &credentials, &ElementResolver::new()).unwrap();

        assert_eq!(
            submission.action_url,
            "https://example.test/panel/ajax/account/login.php"
        );
        assert_eq!(
            submission.fields,
            vec![
                ("csrf".to_string(), "xyz".to_string()),
                ("remember".to_string(), "true".to_string()),
                ("user".to_string(), "steve".to_string()),
                ("password".to_string(), "hunter2".to_string()),
            ]
        );
    }

    #[test]
    fn test_submission_defaults() {
        let page = r#"<form class="login-form">
            <input type="email">
            <input type="password">
        </form>"#;
        let endpoints = Endpoints::for_base("https://example.test");
        let credentials = Credentials::new("steve", "hunter2");

        let submission =
            build_submission(page, &endpoints, &credentials, &ElementResolver::new()).unwrap();

        assert_eq!(submission.action_url, endpoints.login_url);
        assert_eq!(submission.fields[0], ("user".to_string(), "steve".to_string()));
        assert_eq!(submission.fields[1], ("password".to_string(), "hunter2".to_string()));
    }

    #[test]
    fn test_missing_form_is_login_error() {
        let endpoints = Endpoints::default();
        let credentials = Credentials::new("steve", "hunter2");

        let result = build_submission("<p>maintenance</p>", &endpoints, &credentials, &ElementResolver::new());

        assert!(matches!(result, Err(Error::Login(_))));
    }

    #[test]
    fn test_login_link_in_signup_section() {
        let home = r#"<div class="mod-signup"><a href="/register/">Sign up</a><a href="/go/">Login</a></div>"#;

        let link = find_login_link(home, "https://example.test", &ElementResolver::new());

        assert_eq!(link.as_deref(), Some("https://example.test/go/"));
    }

    #[test]
    fn test_login_link_absent() {
        let link = find_login_link("<a href=\"/go/\">Login</a>", "https://example.test", &ElementResolver::new());
        assert!(link.is_none());
    }

    #[test]
    fn test_shows_account() {
        assert!(shows_account("<a href=\"/logout\">LogOut</a>"));
        assert!(shows_account("My Account"));
        assert!(!shows_account("Please sign in"));
    }
}
