#![allow(dead_code)]

use async_trait::async_trait;
use aternos_controller::config::{Config, Credentials, Endpoints, TimingConfig, TransportConfig};
use aternos_controller::error::{Error, Result};
use aternos_controller::transport::{Method, PageResponse, RequestOptions, Transport};
use mockall::mock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const BASE: &str = "https://aternos.test";
pub const LOGIN_URL: &str = "https://aternos.test/go/";
pub const HOME_URL: &str = "https://aternos.test/:en/";
pub const SERVER_LIST_URL: &str = "https://aternos.test/server/";
pub const LOGIN_ACTION_URL: &str = "https://aternos.test/panel/ajax/account/login.php";
pub const CONTROL_URL: &str = "https://aternos.test/server/abc123";

pub const HOME_PAGE: &str = r#"<html><body>
  <div class="mod-signup"><a href="/go/signup/">Sign up</a><a href="/go/">Login</a></div>
</body></html>"#;

pub const LOGIN_PAGE: &str = r#"<html><body>
  <form class="login-form" action="/panel/ajax/account/login.php" method="post">
    <input type="hidden" name="csrf" value="xyz">
    <input type="text" class="username" name="user">
    <input type="password" class="password" name="password">
  </form>
</body></html>"#;

pub const SERVER_LIST_PAGE: &str = r#"<html><body>
  <a href="/logout/">Logout</a>
  <div class="servercardlist">
    <div data-id="abc123" title="Survival">Survival</div>
    <div data-id="def456" title="Creative">Creative</div>
  </div>
</body></html>"#;

// Define a mock for the Transport trait
mock! {
    pub Console {}

    #[async_trait]
    impl Transport for Console {
        async fn request(&self, method: Method, url: &str, options: RequestOptions) -> Result<PageResponse>;
        fn close(&self);
    }
}

/// Config pointing at the fake site with every delay set to zero.
pub fn test_config() -> Config {
    Config::new(Credentials::new("steve", "hunter2"))
        .with_endpoints(Endpoints::for_base(BASE))
        .with_transport(TransportConfig {
            max_retries: 1,
            retry_delay_ms: 0,
            ..TransportConfig::default()
        })
        .with_timing(TimingConfig::immediate())
}

pub fn page(url: &str, body: &str) -> PageResponse {
    PageResponse {
        status: 200,
        url: url.to_string(),
        headers: Vec::new(),
        body: body.to_string(),
    }
}

/// A request seen by the fake site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seen {
    pub method: Method,
    pub url: String,
    pub options: RequestOptions,
}

/// In-memory site served through a [`MockConsole`].
///
/// Pages can be replaced while a test runs; every request is recorded.
#[derive(Clone, Default)]
pub struct Site {
    pages: Arc<Mutex<HashMap<String, PageResponse>>>,
    seen: Arc<Mutex<Vec<Seen>>>,
    triggers: Arc<Mutex<Vec<(String, String, String)>>>,
}

impl Site {
    /// The login flow pages plus the server list.
    pub fn logged_in_flow() -> Self {
        let site = Self::default();
        site.serve(LOGIN_URL, LOGIN_PAGE);
        site.serve(HOME_URL, HOME_PAGE);
        site.serve(LOGIN_ACTION_URL, "{\"success\":true}");
        site.serve(SERVER_LIST_URL, SERVER_LIST_PAGE);
        site
    }

    pub fn serve(&self, url: &str, body: &str) {
        self.serve_page(url, page(url, body));
    }

    /// Serve `url` as a redirect that ends on `final_url`.
    pub fn redirect(&self, url: &str, final_url: &str, body: &str) {
        self.serve_page(url, page(final_url, body));
    }

    fn serve_page(&self, url: &str, response: PageResponse) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    /// Once `trigger_url` is requested, serve `body` at `url`.
    pub fn on_request(&self, trigger_url: &str, url: &str, body: &str) {
        self.triggers.lock().unwrap().push((
            trigger_url.to_string(),
            url.to_string(),
            body.to_string(),
        ));
    }

    fn fire(&self, requested: &str) {
        let fired: Vec<_> = self
            .triggers
            .lock()
            .unwrap()
            .iter()
            .filter(|(trigger, _, _)| trigger == requested)
            .cloned()
            .collect();
        for (_, url, body) in fired {
            self.serve(&url, &body);
        }
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    pub fn requested(&self, method: Method, url: &str) -> bool {
        self.seen()
            .iter()
            .any(|seen| seen.method == method && seen.url == url)
    }

    pub fn count(&self, url: &str) -> usize {
        self.seen().iter().filter(|seen| seen.url == url).count()
    }

    /// A mock transport answering from this site.
    pub fn transport(&self) -> MockConsole {
        let mut transport = MockConsole::new();
        let site = self.clone();
        transport
            .expect_request()
            .returning(move |method, url, options| {
                site.seen.lock().unwrap().push(Seen {
                    method,
                    url: url.to_string(),
                    options,
                });
                let response = site
                    .pages
                    .lock()
                    .unwrap()
                    .get(url)
                    .cloned()
                    .ok_or_else(|| Error::Other(format!("unexpected request to {}", url)));
                site.fire(url);
                response
            });
        transport.expect_close().returning(|| ());
        transport
    }
}
