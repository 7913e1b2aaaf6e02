//! HTTP Stub Kit
//!
//! Canned HTTP responses for unit-testing code that talks to an HTTP API.
//! Tests register stubs (a request matcher plus a response) and point their
//! client at an in-process [`StubServer`], which answers from the registered
//! stubs instead of reaching the network.
//!
//! # Features
//!
//! - **Registration shortcuts**: [`Stubs`] covers method + path, optional
//!   exact query string, or a full URL, answered by a static JSON body or a
//!   per-request closure
//! - **Precedence**: the most recently registered stub wins
//! - **Path templates**: `/users/{id}` and `/users/:id`
//! - **Fixtures**: YAML stub files with templated bodies, delays and faults
//! - **Proxy mode**: use the server as an HTTP proxy to match on full URLs
//!
//! # Example
//!
//! ```no_run
//! use http_stub_kit::{StubServer, Stubs};
//! use serde_json::json;
//!
//! # async fn run() -> http_stub_kit::Result<()> {
//! let server = StubServer::start().await?;
//! Stubs::json("GET", "/users/me", &json!({"username": "ada"}), 200)?;
//! // Send requests to server.url("/users/me")
//! # Ok(())
//! # }
//! ```
//!
//! # Example Fixture
//!
//! ```yaml
//! stubs:
//!   - id: current-user
//!     request:
//!       method: [GET]
//!       path:
//!         type: exact
//!         value: /users/me
//!     response:
//!       status: 200
//!       body:
//!         type: json
//!         content:
//!           username: ada
//! ```

pub mod config;
pub mod error;
pub mod matcher;
pub mod registry;
pub mod request;
pub mod response;
pub mod server;
pub mod stubs;
pub mod template;

pub use config::StubFile;
pub use error::{Result, StubError};
pub use matcher::{PathPattern, RequestPattern};
pub use registry::{Responder, Stub, StubId, StubRegistry};
pub use request::InterceptedRequest;
pub use response::{Fault, StubResponse};
pub use server::StubServer;
pub use stubs::Stubs;
