//! Canned responses returned for matched requests.

use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// A response produced by a stub.
#[derive(Debug, Clone, PartialEq)]
pub struct StubResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HashMap<String, String>,
    /// Response body
    pub body: Bytes,
    /// Wait this long before answering
    pub delay: Option<Duration>,
    /// Misbehave instead of answering normally
    pub fault: Option<Fault>,
}

/// Ways a stub can fail instead of returning its response.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// Close the connection without writing a response
    ConnectionReset,
    /// Hold the request, then answer 504
    Timeout { after: Duration },
    /// Answer 200 with an empty body
    Empty,
    /// Answer 200 with random bytes
    Corrupt,
}

impl StubResponse {
    /// An empty-bodied response with the given status.
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Bytes::new(),
            delay: None,
            fault: None,
        }
    }

    /// Encode `value` as a JSON body.
    pub fn json<T: Serialize + ?Sized>(value: &T, status: u16) -> crate::Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::bytes(body, status).with_header("Content-Type", "application/json"))
    }

    pub fn text(text: impl Into<String>, status: u16) -> Self {
        Self::bytes(text.into(), status).with_header("Content-Type", "text/plain")
    }

    /// Raw bytes with no content type.
    pub fn bytes(body: impl Into<Bytes>, status: u16) -> Self {
        Self {
            body: body.into(),
            ..Self::empty(status)
        }
    }

    /// A response that drops the connection, simulating a network failure.
    pub fn network_error() -> Self {
        Self::empty(0).with_fault(Fault::ConnectionReset)
    }

    /// Set a header, replacing any existing value of the same name
    /// regardless of case.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.retain(|k, _| !k.eq_ignore_ascii_case(name));
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.fault = Some(fault);
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_response() {
        let response = StubResponse::json(&json!({"objectId": "1234"}), 201).unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(&response.body[..], br#"{"objectId":"1234"}"#);
    }

    #[test]
    fn test_unserializable_body() {
        let mut map = HashMap::new();
        map.insert(vec![1u8], "value");
        assert!(StubResponse::json(&map, 200).is_err());
    }

    #[test]
    fn test_with_header_replaces_case_insensitively() {
        let response = StubResponse::text("hi", 200).with_header("content-type", "text/html");
        assert_eq!(response.headers.len(), 1);
        assert_eq!(response.header("Content-Type"), Some("text/html"));
    }

    #[test]
    fn test_network_error() {
        let response = StubResponse::network_error();
        assert_eq!(response.fault, Some(Fault::ConnectionReset));
    }
}
