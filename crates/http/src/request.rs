//! Outgoing request model.

use std::fmt;
use std::time::Instant;

use url::Url;

/// HTTP method of an outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outgoing HTTP request.
///
/// Interceptors mutate the request in place before every send attempt; the
/// executor itself never edits headers or body. The optional `deadline`
/// bounds the whole logical call including retries and recovery work.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub content_type: Option<String>,
    pub deadline: Option<Instant>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url, headers: Vec::new(), body: None, content_type: None, deadline: None }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(Method::Post, url)
    }

    /// Set a header, replacing any existing value (header names are
    /// case-insensitive).
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }

    /// Remove a header if present.
    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Get the first value of a header, if set.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All headers in insertion order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Set a form-encoded body with the matching content type.
    pub fn set_form_body(&mut self, body: String) {
        self.body = Some(body.into_bytes());
        self.content_type = Some("application/x-www-form-urlencoded".to_string());
    }

    /// Builder-style deadline for the whole logical call.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Per-logical-call bookkeeping shared between the executor and
/// unsuccessful-response handlers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestContext {
    /// Number of attempts sent so far (monotonically increasing).
    pub attempt_count: u32,
    /// Latched true once a handler-triggered retry has been granted.
    /// A second unauthorized response after that is terminal.
    pub refresh_attempted: bool,
}
