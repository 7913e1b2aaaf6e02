//! YAML stub fixtures.
//!
//! Defines request matchers, canned responses, and server settings that can
//! be loaded from a file and installed into a [`StubRegistry`].

use crate::matcher::{MatchContext, RequestPattern};
use crate::registry::{Responder, Stub, StubId, StubRegistry};
use crate::request::InterceptedRequest;
use crate::response::{Fault, StubResponse};
use crate::template::TemplateEngine;
use crate::{Result, StubError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// A fixture file: stubs plus server settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct StubFile {
    /// List of stub definitions
    #[serde(default)]
    pub stubs: Vec<StubDefinition>,

    /// Server settings
    #[serde(default)]
    pub settings: ServerSettings,

    /// Response when no stub matches
    #[serde(default)]
    pub default_response: Option<ResponseDefinition>,
}

impl StubFile {
    /// Load fixtures from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate fixtures from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: Self = serde_yaml::from_str(yaml)?;
        file.validate()?;
        Ok(file)
    }

    pub fn validate(&self) -> Result<()> {
        for stub in &self.stubs {
            stub.validate()?;
        }
        if let Some(default) = &self.default_response {
            default.validate("default_response")?;
        }
        Ok(())
    }

    /// Register every enabled stub in file order.
    ///
    /// Later stubs take precedence over earlier ones at equal priority.
    pub fn install(&self, registry: &StubRegistry) -> Result<Vec<StubId>> {
        let engine = Arc::new(TemplateEngine::new());
        self.stubs
            .iter()
            .filter(|stub| stub.enabled)
            .map(|stub| {
                let compiled = stub.compile(&engine, &self.settings.default_content_type)?;
                Ok(registry.register_stub(compiled))
            })
            .collect()
    }

    /// The response for unmatched requests, if one is configured.
    pub fn fallback_response(&self) -> Result<Option<StubResponse>> {
        self.default_response
            .as_ref()
            .map(|def| def.to_response(&self.settings.default_content_type))
            .transpose()
    }
}

/// A single stub definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StubDefinition {
    /// Identifier used in logs
    pub id: String,

    /// Optional description
    #[serde(default)]
    pub name: Option<String>,

    /// Request matcher
    pub request: RequestMatcher,

    /// Response to return
    pub response: ResponseDefinition,

    /// Priority (higher = matched first)
    #[serde(default)]
    pub priority: i32,

    /// Whether this stub is installed
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum number of times this stub can be matched (0 = unlimited)
    #[serde(default)]
    pub max_matches: u32,

    /// Latency simulation
    #[serde(default)]
    pub delay: Option<DelayConfig>,

    /// Failure simulation
    #[serde(default)]
    pub fault: Option<FaultConfig>,
}

fn default_true() -> bool {
    true
}

impl StubDefinition {
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(StubError::Invalid {
                stub: "<unnamed>".to_string(),
                reason: "stub id cannot be empty".to_string(),
            });
        }
        if self.request.path.is_some() && self.request.url.is_some() {
            return Err(StubError::Invalid {
                stub: self.id.clone(),
                reason: "request cannot set both `path` and `url`".to_string(),
            });
        }
        if self.request.query.is_some() && self.request.url.is_some() {
            return Err(StubError::Invalid {
                stub: self.id.clone(),
                reason: "request cannot set both `query` and `url`; put the query in the URL"
                    .to_string(),
            });
        }
        // Compiling surfaces bad regexes, globs and URLs.
        RequestPattern::from_definition(&self.request)?;
        self.response.validate(&self.id)?;
        if let Some(FaultConfig::Error { status, .. }) = &self.fault {
            validate_status(&self.id, *status)?;
        }
        Ok(())
    }

    fn compile(&self, engine: &Arc<TemplateEngine>, default_content_type: &str) -> Result<Stub> {
        let pattern = RequestPattern::from_definition(&self.request)?;
        let fixture = FixtureResponder {
            stub_id: self.id.clone(),
            response: self.response.clone(),
            static_response: self.response.to_response(default_content_type)?,
            delay: self.delay.clone(),
            fault: self.fault.clone(),
            engine: Arc::clone(engine),
        };

        Ok(Stub::new(
            pattern,
            Responder::contextual(move |request, context| fixture.respond(request, context)),
        )
        .with_name(self.name.clone().unwrap_or_else(|| self.id.clone()))
        .with_priority(self.priority)
        .with_max_matches(self.max_matches))
    }
}

/// Request matching configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RequestMatcher {
    /// HTTP method(s) to match (empty = any)
    #[serde(default)]
    pub method: Vec<String>,

    /// Path matching
    #[serde(default)]
    pub path: Option<PathMatcher>,

    /// Exact raw query string
    #[serde(default)]
    pub query: Option<String>,

    /// Full URL, instead of `path`
    #[serde(default)]
    pub url: Option<String>,
}

/// Path matching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PathMatcher {
    /// Exact path match
    Exact { value: String },
    /// Path prefix match
    Prefix { value: String },
    /// Regex pattern match
    Regex { pattern: String },
    /// Glob pattern match
    Glob { pattern: String },
    /// Path with parameters (e.g., /users/{id} or /users/:id)
    Template { template: String },
}

/// Response definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseDefinition {
    /// HTTP status code
    #[serde(default = "default_status")]
    pub status: u16,

    /// Response headers
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Response body
    #[serde(default)]
    pub body: Option<ResponseBody>,

    /// Render the body through the template engine
    #[serde(default)]
    pub template: bool,
}

fn default_status() -> u16 {
    200
}

fn validate_status(stub: &str, status: u16) -> Result<()> {
    if !(100..=599).contains(&status) {
        return Err(StubError::Invalid {
            stub: stub.to_string(),
            reason: format!("invalid status code: {status}"),
        });
    }
    Ok(())
}

impl ResponseDefinition {
    pub fn validate(&self, stub: &str) -> Result<()> {
        validate_status(stub, self.status)
    }

    /// Build the static response, reading file and base64 bodies now.
    pub fn to_response(&self, default_content_type: &str) -> Result<StubResponse> {
        let body = match &self.body {
            Some(body) => body.to_bytes()?,
            None => Vec::new(),
        };
        Ok(self.finish(StubResponse::bytes(body, self.status), default_content_type))
    }

    /// Apply headers and a content type to `response`.
    fn finish(&self, mut response: StubResponse, default_content_type: &str) -> StubResponse {
        let content_type = self
            .body
            .as_ref()
            .map(ResponseBody::content_type)
            .unwrap_or(default_content_type);
        response = response.with_header("Content-Type", content_type);

        for (name, value) in &self.headers {
            response = response.with_header(name, value);
        }
        response
    }
}

/// Response body configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBody {
    /// Plain text body
    Text { content: String },
    /// JSON body
    Json { content: serde_json::Value },
    /// Base64 encoded binary
    Base64 { content: String },
    /// Load from file
    File { path: String },
}

impl ResponseBody {
    /// Get the body content as bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            ResponseBody::Text { content } => Ok(content.as_bytes().to_vec()),
            ResponseBody::Json { content } => Ok(serde_json::to_vec(content)?),
            ResponseBody::Base64 { content } => {
                use base64::Engine;
                Ok(base64::engine::general_purpose::STANDARD.decode(content)?)
            }
            ResponseBody::File { path } => Ok(std::fs::read(path)?),
        }
    }

    /// Get content type for this body.
    pub fn content_type(&self) -> &'static str {
        match self {
            ResponseBody::Text { .. } => "text/plain",
            ResponseBody::Json { .. } => "application/json",
            ResponseBody::Base64 { .. } => "application/octet-stream",
            ResponseBody::File { .. } => "application/octet-stream",
        }
    }
}

/// Delay/latency simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelayConfig {
    /// Fixed delay in milliseconds
    #[serde(default)]
    pub fixed_ms: u64,

    /// Minimum delay for random range (ms)
    #[serde(default)]
    pub min_ms: u64,

    /// Maximum delay for random range (ms)
    #[serde(default)]
    pub max_ms: u64,
}

impl DelayConfig {
    /// Calculate the actual delay to apply.
    pub fn calculate(&self) -> u64 {
        if self.fixed_ms > 0 {
            return self.fixed_ms;
        }
        if self.max_ms > self.min_ms {
            use rand::Rng;
            let mut rng = rand::thread_rng();
            return rng.gen_range(self.min_ms..=self.max_ms);
        }
        self.min_ms
    }
}

/// Fault injection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FaultConfig {
    /// Return an error response
    Error {
        status: u16,
        #[serde(default)]
        message: Option<String>,
    },
    /// Hold the request, then answer 504
    Timeout { duration_ms: u64 },
    /// Return an empty body
    Empty,
    /// Return a garbage body
    Corrupt {
        /// Corruption probability (0.0 - 1.0)
        #[serde(default = "default_probability")]
        probability: f64,
    },
    /// Drop the connection
    Reset,
}

fn default_probability() -> f64 {
    1.0
}

/// Interception server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    /// Log all matched stubs
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log unmatched requests
    #[serde(default = "default_true")]
    pub log_unmatched: bool,

    /// Content type for fixture responses without a typed body
    #[serde(default = "default_content_type")]
    pub default_content_type: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            log_matches: true,
            log_unmatched: true,
            default_content_type: default_content_type(),
        }
    }
}

fn default_content_type() -> String {
    "application/json".to_string()
}

/// Produces responses for one fixture stub.
struct FixtureResponder {
    stub_id: String,
    response: ResponseDefinition,
    static_response: StubResponse,
    delay: Option<DelayConfig>,
    fault: Option<FaultConfig>,
    engine: Arc<TemplateEngine>,
}

impl FixtureResponder {
    fn respond(&self, request: &InterceptedRequest, context: &MatchContext) -> StubResponse {
        let mut response = match &self.fault {
            Some(FaultConfig::Error { status, message }) => StubResponse::text(
                message.clone().unwrap_or_else(|| "Error".to_string()),
                *status,
            ),
            Some(FaultConfig::Timeout { duration_ms }) => {
                StubResponse::empty(504).with_fault(Fault::Timeout {
                    after: Duration::from_millis(*duration_ms),
                })
            }
            Some(FaultConfig::Empty) => StubResponse::empty(200).with_fault(Fault::Empty),
            Some(FaultConfig::Reset) => StubResponse::network_error(),
            Some(FaultConfig::Corrupt { probability }) if should_corrupt(*probability) => {
                StubResponse::empty(200).with_fault(Fault::Corrupt)
            }
            Some(FaultConfig::Corrupt { .. }) | None => self.render(request, context),
        };

        if let Some(delay) = &self.delay {
            let delay_ms = delay.calculate();
            if delay_ms > 0 {
                response = response.with_delay(Duration::from_millis(delay_ms));
            }
        }
        response
    }

    fn render(&self, request: &InterceptedRequest, context: &MatchContext) -> StubResponse {
        if !self.response.template {
            return self.static_response.clone();
        }

        let rendered = match &self.response.body {
            Some(ResponseBody::Text { content }) => self
                .engine
                .render(content, context, request)
                .map(String::into_bytes)
                .map_err(|e| e.to_string()),
            Some(ResponseBody::Json { content }) => self
                .engine
                .render_json(content, context, request)
                .map_err(|e| e.to_string())
                .and_then(|value| serde_json::to_vec(&value).map_err(|e| e.to_string())),
            _ => return self.static_response.clone(),
        };

        match rendered {
            Ok(body) => StubResponse {
                body: body.into(),
                ..self.static_response.clone()
            },
            Err(e) => {
                warn!(stub_id = %self.stub_id, error = %e, "Template rendering failed");
                StubResponse::text(format!("template error: {e}"), 500)
            }
        }
    }
}

fn should_corrupt(probability: f64) -> bool {
    use rand::Rng;
    rand::thread_rng().gen::<f64>() < probability
}
