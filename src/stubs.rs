//! Convenience entry points for registering canned responses.
//!
//! [`Stubs`] installs into the process-wide registry that
//! [`StubServer::start`](crate::StubServer::start) serves. The same calls are
//! available on any [`StubRegistry`] for tests that want an isolated one.
//!
//! ```no_run
//! use http_stub_kit::{StubResponse, Stubs};
//! use serde_json::json;
//!
//! Stubs::json("POST", "/objects/notes", &json!({"sysObjectId": "1234"}), 200)?;
//! Stubs::query_responding("GET", "/objects/notes", "filter=mine", |_| {
//!     StubResponse::empty(204)
//! });
//! # Ok::<(), http_stub_kit::StubError>(())
//! ```

use crate::matcher::RequestPattern;
use crate::registry::{Responder, StubId, StubRegistry};
use crate::request::InterceptedRequest;
use crate::response::StubResponse;
use crate::Result;
use serde::Serialize;

impl StubRegistry {
    /// Answer `method path` with `status` and `body` encoded as JSON.
    pub fn stub_json<T>(&self, method: &str, path: &str, body: &T, status: u16) -> Result<StubId>
    where
        T: Serialize + ?Sized,
    {
        let response = StubResponse::json(body, status)?;
        Ok(self.register(RequestPattern::path(method, path), response))
    }

    /// Answer `method path` with whatever `producer` returns.
    pub fn stub_responding<F>(&self, method: &str, path: &str, producer: F) -> StubId
    where
        F: Fn(&InterceptedRequest) -> StubResponse + Send + Sync + 'static,
    {
        self.register(RequestPattern::path(method, path), Responder::dynamic(producer))
    }

    /// Like [`stub_responding`](Self::stub_responding), but the query string
    /// must equal `query`.
    pub fn stub_query_responding<F>(
        &self,
        method: &str,
        path: &str,
        query: &str,
        producer: F,
    ) -> StubId
    where
        F: Fn(&InterceptedRequest) -> StubResponse + Send + Sync + 'static,
    {
        let pattern = RequestPattern::path(method, path).with_query(query);
        self.register(pattern, Responder::dynamic(producer))
    }

    /// Like [`stub_json`](Self::stub_json), but the query string must equal
    /// `query`.
    pub fn stub_query_json<T>(
        &self,
        method: &str,
        path: &str,
        query: &str,
        body: &T,
        status: u16,
    ) -> Result<StubId>
    where
        T: Serialize + ?Sized,
    {
        let response = StubResponse::json(body, status)?;
        let pattern = RequestPattern::path(method, path).with_query(query);
        Ok(self.register(pattern, response))
    }

    /// Answer requests for the full URL `url` with whatever `producer`
    /// returns.
    pub fn stub_url_responding<F>(&self, method: &str, url: &str, producer: F) -> Result<StubId>
    where
        F: Fn(&InterceptedRequest) -> StubResponse + Send + Sync + 'static,
    {
        let pattern = RequestPattern::url(method, url)?;
        Ok(self.register(pattern, Responder::dynamic(producer)))
    }
}

/// Registers stubs in the process-wide registry.
pub struct Stubs;

impl Stubs {
    pub fn json<T>(method: &str, path: &str, body: &T, status: u16) -> Result<StubId>
    where
        T: Serialize + ?Sized,
    {
        StubRegistry::global().stub_json(method, path, body, status)
    }

    pub fn responding<F>(method: &str, path: &str, producer: F) -> StubId
    where
        F: Fn(&InterceptedRequest) -> StubResponse + Send + Sync + 'static,
    {
        StubRegistry::global().stub_responding(method, path, producer)
    }

    pub fn query_responding<F>(method: &str, path: &str, query: &str, producer: F) -> StubId
    where
        F: Fn(&InterceptedRequest) -> StubResponse + Send + Sync + 'static,
    {
        StubRegistry::global().stub_query_responding(method, path, query, producer)
    }

    pub fn query_json<T>(
        method: &str,
        path: &str,
        query: &str,
        body: &T,
        status: u16,
    ) -> Result<StubId>
    where
        T: Serialize + ?Sized,
    {
        StubRegistry::global().stub_query_json(method, path, query, body, status)
    }

    pub fn url_responding<F>(method: &str, url: &str, producer: F) -> Result<StubId>
    where
        F: Fn(&InterceptedRequest) -> StubResponse + Send + Sync + 'static,
    {
        StubRegistry::global().stub_url_responding(method, url, producer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(method: &str, url: &str) -> InterceptedRequest {
        InterceptedRequest::parse(method, url).unwrap()
    }

    #[test]
    fn test_static_json_stub() {
        let registry = StubRegistry::new();
        let body = json!({"sysObjectId": "1234", "tags": ["a", "b"]});
        registry.stub_json("POST", "/objects/notes", &body, 201).unwrap();

        let response = registry
            .respond(&request("POST", "http://api.test/objects/notes"))
            .unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.body, serde_json::to_vec(&body).unwrap());
        assert_eq!(response.header("content-type"), Some("application/json"));

        assert!(registry
            .respond(&request("GET", "http://api.test/objects/notes"))
            .is_none());
    }

    #[test]
    fn test_serializable_struct_body() {
        #[derive(Serialize)]
        struct Session {
            #[serde(rename = "sysSessionId")]
            id: String,
        }

        let registry = StubRegistry::new();
        let session = Session {
            id: "s-1".to_string(),
        };
        registry.stub_json("POST", "/sessions", &session, 200).unwrap();

        let response = registry.respond(&request("POST", "http://h/sessions")).unwrap();
        assert_eq!(&response.body[..], br#"{"sysSessionId":"s-1"}"#);
    }

    #[test]
    fn test_responding_stub_sees_request() {
        let registry = StubRegistry::new();
        registry.stub_responding("PUT", "/objects/notes/:id", |req| {
            let body: serde_json::Value = req.json().unwrap_or_default();
            StubResponse::json(&json!({"echo": body["title"]}), 200)
                .unwrap_or_else(|_| StubResponse::empty(500))
        });

        let req = request("PUT", "http://h/objects/notes/1").with_body(r#"{"title":"hi"}"#);
        let response = registry.respond(&req).unwrap();
        assert_eq!(&response.body[..], br#"{"echo":"hi"}"#);
    }

    #[test]
    fn test_query_stubs() {
        let registry = StubRegistry::new();
        registry
            .stub_query_json("GET", "/objects/notes", "filter=x", &json!({"objects": []}), 200)
            .unwrap();
        registry.stub_query_responding("GET", "/objects/notes", "filter=y", |_| {
            StubResponse::empty(404)
        });

        let x = registry
            .respond(&request("GET", "http://h/objects/notes?filter=x"))
            .unwrap();
        assert_eq!(x.status, 200);

        let y = registry
            .respond(&request("GET", "http://h/objects/notes?filter=y"))
            .unwrap();
        assert_eq!(y.status, 404);

        assert!(registry
            .respond(&request("GET", "http://h/objects/notes?filter=z"))
            .is_none());
        assert!(registry
            .respond(&request("GET", "http://h/objects/notes"))
            .is_none());
    }

    #[test]
    fn test_url_stub_matches_equivalent_request() {
        let registry = StubRegistry::new();
        registry
            .stub_url_responding("GET", "http://api.test/files?name=a", |_| {
                StubResponse::text("url", 200)
            })
            .unwrap();

        let response = registry
            .respond(&request("GET", "http://api.test/files?name=a"))
            .unwrap();
        assert_eq!(&response.body[..], b"url");

        assert!(registry
            .stub_url_responding("GET", "http://[bad", |_| StubResponse::empty(200))
            .is_err());
    }

    #[test]
    fn test_later_stub_shadows_earlier() {
        let registry = StubRegistry::new();
        registry.stub_json("GET", "/me", &json!({"v": 1}), 200).unwrap();
        registry.stub_json("GET", "/me", &json!({"v": 2}), 200).unwrap();

        let response = registry.respond(&request("GET", "http://h/me")).unwrap();
        assert_eq!(&response.body[..], br#"{"v":2}"#);
    }

    #[test]
    fn test_global_entry_points() {
        let global = StubRegistry::global();

        Stubs::json("GET", "/stubs-test/json", &json!({"ok": true}), 200).unwrap();
        Stubs::responding("GET", "/stubs-test/dynamic", |_| StubResponse::empty(202));
        Stubs::query_responding("GET", "/stubs-test/query", "a=1", |_| StubResponse::empty(203));
        Stubs::query_json("GET", "/stubs-test/query", "a=2", &json!([1, 2]), 206).unwrap();
        let url_id = Stubs::url_responding("DELETE", "http://api.test/stubs-test/url", |_| {
            StubResponse::empty(204)
        })
        .unwrap();

        let status = |method: &str, url: &str| global.respond(&request(method, url)).map(|r| r.status);
        assert_eq!(status("GET", "http://h/stubs-test/json"), Some(200));
        assert_eq!(status("GET", "http://h/stubs-test/dynamic"), Some(202));
        assert_eq!(status("GET", "http://h/stubs-test/query?a=1"), Some(203));
        assert_eq!(status("GET", "http://h/stubs-test/query?a=2"), Some(206));
        assert_eq!(status("DELETE", "http://api.test/stubs-test/url"), Some(204));

        assert!(global.remove(url_id));
    }
}
