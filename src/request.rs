//! The request as seen by matchers and response producers.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use url::Url;

/// An outgoing test request captured by the interception engine.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    /// Uppercase HTTP verb
    pub method: String,
    /// Absolute URL the client asked for
    pub url: Url,
    /// Headers keyed by lowercase name (first value wins)
    pub headers: HashMap<String, String>,
    /// Raw request body
    pub body: Bytes,
}

impl InterceptedRequest {
    /// Build a request with no headers and an empty body.
    pub fn new(method: &str, url: Url) -> Self {
        Self {
            method: method.to_uppercase(),
            url,
            headers: HashMap::new(),
            body: Bytes::new(),
        }
    }

    /// Parse `url` and build a request for it.
    pub fn parse(method: &str, url: &str) -> crate::Result<Self> {
        let parsed = Url::parse(url).map_err(|source| crate::StubError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        Ok(Self::new(method, parsed))
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_lowercase(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Raw query string without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        self.url.query()
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Body as UTF-8 text, if it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let request = InterceptedRequest::parse("post", "http://api.test/users?page=2")
            .unwrap()
            .with_header("Content-Type", "application/json")
            .with_body(r#"{"name":"Ada"}"#);

        assert_eq!(request.method, "POST");
        assert_eq!(request.path(), "/users");
        assert_eq!(request.query(), Some("page=2"));
        assert_eq!(request.header("content-type"), Some("application/json"));

        let body: serde_json::Value = request.json().unwrap();
        assert_eq!(body["name"], "Ada");
    }

    #[test]
    fn test_invalid_url() {
        let err = InterceptedRequest::parse("GET", "not a url").unwrap_err();
        assert!(matches!(err, crate::StubError::InvalidUrl { .. }));
    }
}
