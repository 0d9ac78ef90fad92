use super::{Method, PageResponse, RequestOptions, Transport};
use crate::config::TransportConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::sync::RwLock;
use std::time::Duration;

/// Headers sent with every request so the console sees a regular desktop
/// Firefox. They win over caller-supplied headers with the same name.
pub const BROWSER_HEADERS: [(&str, &str); 6] = [
    (
        "user-agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:123.0) Gecko/20100101 Firefox/123.0",
    ),
    (
        "accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
    ),
    ("accept-language", "en-US,en;q=0.9"),
    ("accept-encoding", "gzip, deflate, br"),
    ("connection", "keep-alive"),
    ("upgrade-insecure-requests", "1"),
];

const LOGGED_BODY_CHARS: usize = 500;

/// `reqwest`-backed transport with a persistent cookie store.
///
/// The cookie store is the session's cookie jar: cookies set by any response
/// (redirect hops included) are replayed on every later request until
/// [`Transport::close`] drops the client.
///
/// # Example
///
/// ```no_run
/// use aternos_controller::config::TransportConfig;
/// use aternos_controller::transport::{HttpTransport, Method, RequestOptions, Transport};
///
/// # async fn example() -> aternos_controller::Result<()> {
/// let transport = HttpTransport::new(&TransportConfig::default())?;
/// let page = transport
///     .request(Method::Get, "https://aternos.org/go/", RequestOptions::new())
///     .await?;
/// println!("Landed on {}", page.url);
/// # Ok(())
/// # }
/// ```
pub struct HttpTransport {
    client: RwLock<Option<Client>>,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpTransport {
    /// Build a transport from configuration.
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| Error::Other(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client: RwLock::new(Some(client)),
            max_retries: config.max_retries.max(1),
            retry_delay: config.retry_delay(),
        })
    }

    /// Total attempts made per request.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn client(&self) -> Result<Client> {
        let guard = self
            .client
            .read()
            .map_err(|_| Error::Other("Failed to lock HTTP client".to_string()))?;
        guard.clone().ok_or(Error::SessionClosed)
    }

    /// Merge caller headers with the fixed browser set, the latter winning.
    pub fn merge_headers(extra: &[(String, String)]) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        for (name, value) in extra {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::InvalidRequest(format!("Invalid header name '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::InvalidRequest(format!("Invalid value for header '{}': {}", name, e)))?;
            headers.insert(name, value);
        }

        for (name, value) in BROWSER_HEADERS {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }

        Ok(headers)
    }

    async fn attempt(
        client: &Client,
        method: Method,
        url: &str,
        headers: HeaderMap,
        form: Option<&Vec<(String, String)>>,
    ) -> std::result::Result<PageResponse, reqwest::Error> {
        let mut builder = match method {
            Method::Get => client.get(url),
            Method::Post => client.post(url),
        };
        builder = builder.headers(headers);
        if let Some(fields) = form {
            builder = builder.form(fields);
        }

        let response = builder.send().await?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let response_headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or("<non-ascii>").to_string(),
                )
            })
            .collect();
        let status_error = response.error_for_status_ref().err();

        let body = response.text().await?;

        tracing::debug!(%url, "Request URL");
        tracing::debug!(status, "Response status");
        tracing::debug!(final_url = %final_url, "Response URL");
        tracing::debug!(headers = ?response_headers, "Response headers");
        tracing::debug!(
            "Response content: {}...",
            body.chars().take(LOGGED_BODY_CHARS).collect::<String>()
        );

        if let Some(error) = status_error {
            return Err(error);
        }

        Ok(PageResponse {
            status,
            url: final_url,
            headers: response_headers,
            body,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[tracing::instrument(skip(self, options))]
    async fn request(&self, method: Method, url: &str, options: RequestOptions) -> Result<PageResponse> {
        url::Url::parse(url)
            .map_err(|e| Error::InvalidRequest(format!("Invalid URL '{}': {}", url, e)))?;
        let headers = Self::merge_headers(&options.headers)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let client = self.client()?;

            match Self::attempt(&client, method, url, headers.clone(), options.form.as_ref()).await {
                Ok(page) => return Ok(page),
                Err(e) if attempt < self.max_retries => {
                    tracing::warn!(attempt, error = %e, "Request attempt failed");
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Request attempt failed, giving up");
                    return Err(Error::Transport {
                        url: url.to_string(),
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }

    fn close(&self) {
        match self.client.write() {
            Ok(mut guard) => {
                if guard.take().is_some() {
                    tracing::info!("HTTP session closed");
                }
            }
            Err(_) => tracing::error!("Failed to lock HTTP client during cleanup"),
        }
    }
}
