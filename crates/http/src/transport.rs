//! Low-level transport seam.
//!
//! The executor never embeds a specific HTTP implementation; callers inject
//! anything implementing [`HttpTransport`]. A reqwest-backed default is
//! provided behind the `reqwest-transport` feature.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::request::{Method, Request};
use crate::response::Response;

/// Low-level HTTP transport: one send, no retries, no recovery.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send the request and buffer the response.
    ///
    /// # Errors
    /// Returns [`TransportError`] for connection, timeout, and I/O failures.
    /// Any received HTTP status, including errors, is a successful send.
    async fn send(&self, request: &Request) -> Result<Response, TransportError>;
}

/// Default transport over a caller-constructed [`reqwest::Client`].
#[cfg(feature = "reqwest-transport")]
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

#[cfg(feature = "reqwest-transport")]
impl ReqwestTransport {
    /// Wrap an existing client. The client carries connection pooling and
    /// TLS configuration; construct it once at the application boundary.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "reqwest-transport")]
#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &Request) -> Result<Response, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
            Method::Head => reqwest::Method::HEAD,
        };

        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in request.headers() {
            builder = builder.header(name, value);
        }
        if let Some(content_type) = &request.content_type {
            builder = builder.header("Content-Type", content_type.clone());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Io { message: e.to_string() })?;

        Ok(Response::new(status, headers, body.to_vec()))
    }
}

#[cfg(feature = "reqwest-transport")]
fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect { message: err.to_string() }
    } else if err.is_builder() || err.is_request() {
        TransportError::InvalidRequest { message: err.to_string() }
    } else {
        TransportError::Io { message: err.to_string() }
    }
}
