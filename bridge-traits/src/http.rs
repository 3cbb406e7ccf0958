//! HTTP Client Abstraction
//!
//! Provides the network side of every audio request. Responses are fully
//! buffered so they can be duplicated cheaply: one copy for the cache store,
//! one for the caller.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// HTTP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
}

/// HTTP request builder
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            timeout: None,
        }
    }

    /// Shorthand for a plain `GET`.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

/// HTTP response
///
/// `Clone` is cheap: the body is reference-counted.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    /// Build a `200 OK` response around `body`.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Get response body as UTF-8 string
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| BridgeError::OperationFailed(format!("Invalid UTF-8: {}", e)))
    }

    /// Check if response status is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Check if response status indicates a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Check if response status indicates a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    /// Value of the `Content-Type` header, matched case-insensitively.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .map(|(_, v)| v.as_str())
    }
}

/// Async HTTP client trait
///
/// Implementations perform exactly one attempt per call. Retrying is left to
/// whoever issued the request (the audio element, or the user pressing
/// "download" again).
///
/// # Errors
///
/// A transport failure (DNS, connect, TLS, timeout) is reported as
/// [`BridgeError::Network`]. A completed exchange with a non-2xx status is
/// NOT an error at this layer; callers inspect [`HttpResponse::is_success`].
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Execute an HTTP request
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_request_builder() {
        let request = HttpRequest::get("https://media.example.net/t1.mp3")
            .header("Range", "bytes=0-")
            .timeout(Duration::from_secs(30));

        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.url, "https://media.example.net/t1.mp3");
        assert_eq!(request.headers.get("Range"), Some(&"bytes=0-".to_string()));
        assert_eq!(request.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_http_response_status_checks() {
        let response = HttpResponse::ok("test");
        assert!(response.is_success());
        assert!(!response.is_client_error());
        assert!(!response.is_server_error());

        let missing = HttpResponse {
            status: 404,
            headers: HashMap::new(),
            body: Bytes::new(),
        };
        assert!(!missing.is_success());
        assert!(missing.is_client_error());
    }

    #[test]
    fn test_content_type_is_case_insensitive() {
        let response = HttpResponse::ok("x").with_header("content-type", "audio/mpeg");
        assert_eq!(response.content_type(), Some("audio/mpeg"));
    }

    #[test]
    fn test_clone_shares_body() {
        let original = HttpResponse::ok(vec![1u8, 2, 3]);
        let copy = original.clone();
        assert_eq!(original, copy);
        assert_eq!(copy.body.as_ref(), &[1, 2, 3]);
    }
}
