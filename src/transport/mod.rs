//! HTTP transport layer.
//!
//! Everything the controller does on the remote console goes through the
//! [`Transport`] trait. [`HttpTransport`] is the production implementation;
//! tests substitute mocks.
mod http;

pub use http::{BROWSER_HEADERS, HttpTransport};

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;

/// HTTP method used for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// Per-request options supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Extra headers. Keys also present in [`BROWSER_HEADERS`] are overwritten.
    pub headers: Vec<(String, String)>,
    /// Form fields sent as `application/x-www-form-urlencoded`, in order.
    pub form: Option<Vec<(String, String)>>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a form-encoded body.
    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.form = Some(fields);
        self
    }

    /// Value of a form field, if present.
    pub fn form_value(&self, name: &str) -> Option<&str> {
        self.form
            .as_ref()?
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// A fully read response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResponse {
    /// HTTP status code.
    pub status: u16,
    /// Final URL after redirects.
    pub url: String,
    /// Response headers, in the order received.
    pub headers: Vec<(String, String)>,
    /// Response body as text.
    pub body: String,
}

impl PageResponse {
    /// First header with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Transport abstraction over the remote console.
///
/// Implementations retry internally and only fail once their retry budget is
/// spent.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a request and return the final response.
    async fn request(&self, method: Method, url: &str, options: RequestOptions) -> Result<PageResponse>;

    /// Release the underlying client. Later requests fail.
    fn close(&self);
}
