//! Request matching logic.
//!
//! A [`RequestPattern`] decides whether an intercepted request belongs to a
//! stub, and records what it captured along the way for templates.

use crate::config::{PathMatcher, RequestMatcher};
use crate::request::InterceptedRequest;
use crate::{Result, StubError};
use regex::Regex;
use std::collections::HashMap;
use url::Url;

/// Context captured during matching (for template variables).
#[derive(Debug, Clone, Default)]
pub struct MatchContext {
    /// Path parameters extracted from template matching
    pub path_params: HashMap<String, String>,
    /// Decoded query parameters
    pub query_params: HashMap<String, String>,
    /// Regex capture groups
    pub captures: HashMap<String, String>,
}

/// Which requests a stub applies to.
#[derive(Debug, Clone)]
pub struct RequestPattern {
    /// Uppercase verbs (empty = any)
    methods: Vec<String>,
    /// Lowercase host, for full-URL patterns
    host: Option<String>,
    /// Port, when a full-URL pattern names one explicitly
    port: Option<u16>,
    path: Option<PathPattern>,
    query: QueryPattern,
}

/// How the raw query string is compared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPattern {
    /// Query is not inspected
    Any,
    /// Query must equal this string
    Exact(String),
    /// Request must carry no query
    Absent,
}

/// How the request path is compared.
#[derive(Debug, Clone)]
pub enum PathPattern {
    Exact(String),
    Prefix(String),
    Regex(Regex),
    Glob(globset::GlobMatcher),
    Template(PathTemplate),
}

/// A path with `{name}` or `:name` segments.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    segments: Vec<TemplateSegment>,
}

#[derive(Debug, Clone)]
enum TemplateSegment {
    Literal(String),
    Param(String),
}

impl PathTemplate {
    /// Returns `None` when `template` has no parameter segments.
    fn parse(template: &str) -> Option<Self> {
        let segments: Vec<_> = template
            .split('/')
            .map(|segment| match param_name(segment) {
                Some(name) => TemplateSegment::Param(name.to_string()),
                None => TemplateSegment::Literal(segment.to_string()),
            })
            .collect();

        segments
            .iter()
            .any(|s| matches!(s, TemplateSegment::Param(_)))
            .then_some(Self { segments })
    }

    fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                TemplateSegment::Literal(lit) if lit == part => {}
                TemplateSegment::Literal(_) => return None,
                TemplateSegment::Param(_) if part.is_empty() => return None,
                TemplateSegment::Param(name) => {
                    params.insert(name.clone(), part.to_string());
                }
            }
        }
        Some(params)
    }
}

/// Base for encoding paths and queries the way request URLs are encoded.
const ENCODING_BASE: &str = "http://localhost/";

/// Percent-encode `path` as `Url::path` would, keeping template braces.
fn encode_path(path: &str) -> String {
    match Url::parse(ENCODING_BASE) {
        Ok(mut url) => {
            url.set_path(path);
            restore_braces(url.path())
        }
        Err(_) => path.to_string(),
    }
}

/// Percent-encode `query` as `Url::query` would.
fn encode_query(query: &str) -> String {
    match Url::parse(ENCODING_BASE) {
        Ok(mut url) => {
            url.set_query(Some(query));
            url.query().unwrap_or(query).to_string()
        }
        Err(_) => query.to_string(),
    }
}

// The url crate percent-encodes braces; templates need them back.
fn restore_braces(path: &str) -> String {
    path.replace("%7B", "{").replace("%7D", "}")
}

fn param_name(segment: &str) -> Option<&str> {
    if let Some(name) = segment.strip_prefix(':') {
        return (!name.is_empty()).then_some(name);
    }
    segment
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .filter(|name| !name.is_empty())
}

impl PathPattern {
    /// A literal path, or a template if it has parameter segments.
    ///
    /// The path is percent-encoded like a request URL's path, so
    /// `/my file` matches a request for `/my%20file`.
    pub fn parse(path: &str) -> Self {
        let path = encode_path(path);
        match PathTemplate::parse(&path) {
            Some(template) => PathPattern::Template(template),
            None => PathPattern::Exact(path),
        }
    }

    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(PathPattern::Regex)
            .map_err(|e| StubError::InvalidPattern {
                kind: "regex",
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn glob(pattern: &str) -> Result<Self> {
        globset::Glob::new(pattern)
            .map(|glob| PathPattern::Glob(glob.compile_matcher()))
            .map_err(|e| StubError::InvalidPattern {
                kind: "glob",
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    fn from_definition(matcher: &PathMatcher) -> Result<Self> {
        Ok(match matcher {
            PathMatcher::Exact { value } => PathPattern::Exact(encode_path(value)),
            PathMatcher::Prefix { value } => PathPattern::Prefix(encode_path(value)),
            PathMatcher::Regex { pattern } => Self::regex(pattern)?,
            PathMatcher::Glob { pattern } => Self::glob(pattern)?,
            PathMatcher::Template { template } => Self::parse(template),
        })
    }

    fn matches(&self, path: &str, context: &mut MatchContext) -> bool {
        match self {
            PathPattern::Exact(value) => path == value,
            PathPattern::Prefix(value) => path.starts_with(value.as_str()),
            PathPattern::Regex(regex) => {
                let Some(captures) = regex.captures(path) else {
                    return false;
                };
                for (i, cap) in captures.iter().enumerate().skip(1) {
                    if let Some(m) = cap {
                        context.captures.insert(i.to_string(), m.as_str().to_string());
                    }
                }
                for name in regex.capture_names().flatten() {
                    if let Some(m) = captures.name(name) {
                        context.captures.insert(name.to_string(), m.as_str().to_string());
                    }
                }
                true
            }
            PathPattern::Glob(glob) => glob.is_match(path),
            PathPattern::Template(template) => match template.matches(path) {
                Some(params) => {
                    context.path_params = params;
                    true
                }
                None => false,
            },
        }
    }
}

impl RequestPattern {
    /// Match `method` and `path`, ignoring the query string.
    pub fn path(method: &str, path: &str) -> Self {
        Self {
            methods: vec![method.to_uppercase()],
            host: None,
            port: None,
            path: Some(PathPattern::parse(path)),
            query: QueryPattern::Any,
        }
    }

    /// Additionally require the query string to equal `query`, once
    /// percent-encoded like a request URL's query.
    pub fn with_query(mut self, query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        self.query = QueryPattern::Exact(encode_query(query));
        self
    }

    pub fn with_path_pattern(mut self, path: PathPattern) -> Self {
        self.path = Some(path);
        self
    }

    /// Match a full URL string. Relative URLs (`/path?x=1`) match on path
    /// and query only; absolute ones also pin the host, and the port when
    /// it is written out.
    pub fn url(method: &str, url: &str) -> Result<Self> {
        let (parsed, absolute) = match Url::parse(url) {
            Ok(parsed) => (parsed, true),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = Url::parse("http://localhost/").map_err(|source| {
                    StubError::InvalidUrl {
                        url: url.to_string(),
                        source,
                    }
                })?;
                let joined = base.join(url).map_err(|source| StubError::InvalidUrl {
                    url: url.to_string(),
                    source,
                })?;
                (joined, false)
            }
            Err(source) => {
                return Err(StubError::InvalidUrl {
                    url: url.to_string(),
                    source,
                })
            }
        };

        let path = restore_braces(parsed.path());

        Ok(Self {
            methods: vec![method.to_uppercase()],
            host: if absolute {
                parsed.host_str().map(str::to_lowercase)
            } else {
                None
            },
            port: if absolute { parsed.port() } else { None },
            path: Some(PathPattern::parse(&path)),
            query: match parsed.query() {
                Some(query) => QueryPattern::Exact(query.to_string()),
                None => QueryPattern::Absent,
            },
        })
    }

    /// Compile a fixture request matcher.
    pub fn from_definition(matcher: &RequestMatcher) -> Result<Self> {
        let mut pattern = match &matcher.url {
            Some(url) => Self::url("GET", url)?,
            None => Self {
                methods: Vec::new(),
                host: None,
                port: None,
                path: matcher
                    .path
                    .as_ref()
                    .map(PathPattern::from_definition)
                    .transpose()?,
                query: QueryPattern::Any,
            },
        };

        pattern.methods = matcher.method.iter().map(|m| m.to_uppercase()).collect();
        if let Some(query) = &matcher.query {
            pattern = pattern.with_query(query);
        }
        Ok(pattern)
    }

    pub fn query(&self) -> &QueryPattern {
        &self.query
    }

    /// Check `request` against this pattern, returning what was captured.
    pub fn matches(&self, request: &InterceptedRequest) -> Option<MatchContext> {
        let mut context = MatchContext::default();

        // Check method
        if !self.methods.is_empty() && !self.methods.iter().any(|m| *m == request.method) {
            return None;
        }

        // Check host and port
        if let Some(host) = &self.host {
            if request.url.host_str().map(str::to_lowercase).as_deref() != Some(host.as_str()) {
                return None;
            }
            if let Some(port) = self.port {
                if request.url.port_or_known_default() != Some(port) {
                    return None;
                }
            }
        }

        // Check path
        if let Some(path) = &self.path {
            if !path.matches(request.path(), &mut context) {
                return None;
            }
        }

        // Check query
        let matches_query = match &self.query {
            QueryPattern::Any => true,
            QueryPattern::Exact(expected) => request.query() == Some(expected.as_str()),
            QueryPattern::Absent => request.query().is_none(),
        };
        if !matches_query {
            return None;
        }

        context.query_params = request.url.query_pairs().into_owned().collect();
        Some(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(url: &str) -> InterceptedRequest {
        InterceptedRequest::parse("GET", url).unwrap()
    }

    #[test]
    fn test_exact_path_matching() {
        let pattern = RequestPattern::path("GET", "/api/users");

        assert!(pattern.matches(&get("http://h/api/users")).is_some());
        assert!(pattern.matches(&get("http://h/api/users?page=1")).is_some());
        assert!(pattern.matches(&get("http://h/api/posts")).is_none());
    }

    #[test]
    fn test_method_matching() {
        let pattern = RequestPattern::path("post", "/objects/notes");

        let post = InterceptedRequest::parse("POST", "http://h/objects/notes").unwrap();
        assert!(pattern.matches(&post).is_some());
        assert!(pattern.matches(&get("http://h/objects/notes")).is_none());
    }

    #[test]
    fn test_template_path_matching() {
        let pattern = RequestPattern::path("GET", "/objects/notes/:objectId");

        let ctx = pattern.matches(&get("http://h/objects/notes/1234")).unwrap();
        assert_eq!(ctx.path_params.get("objectId"), Some(&"1234".to_string()));

        assert!(pattern.matches(&get("http://h/objects/notes/")).is_none());
        assert!(pattern.matches(&get("http://h/objects/notes/1/extra")).is_none());

        let braces = RequestPattern::path("GET", "/users/{id}/files");
        let ctx = braces.matches(&get("http://h/users/7/files")).unwrap();
        assert_eq!(ctx.path_params.get("id"), Some(&"7".to_string()));
    }

    #[test]
    fn test_query_matching() {
        let pattern = RequestPattern::path("GET", "/objects/notes").with_query("filter=x");

        assert!(pattern.matches(&get("http://h/objects/notes?filter=x")).is_some());
        assert!(pattern.matches(&get("http://h/objects/notes?filter=y")).is_none());
        assert!(pattern.matches(&get("http://h/objects/notes")).is_none());
    }

    #[test]
    fn test_query_leading_question_mark() {
        let pattern = RequestPattern::path("GET", "/a").with_query("?b=c");
        assert_eq!(pattern.query(), &QueryPattern::Exact("b=c".to_string()));
    }

    #[test]
    fn test_url_matching() {
        let pattern = RequestPattern::url("GET", "http://api.test/objects/notes?filter=x").unwrap();

        assert!(pattern.matches(&get("http://api.test/objects/notes?filter=x")).is_some());
        assert!(pattern.matches(&get("http://API.test/objects/notes?filter=x")).is_some());
        assert!(pattern.matches(&get("http://other.test/objects/notes?filter=x")).is_none());
        assert!(pattern.matches(&get("http://api.test/objects/notes")).is_none());
    }

    #[test]
    fn test_url_and_path_query_are_equivalent() {
        let by_url = RequestPattern::url("GET", "http://api.test/files?name=a").unwrap();
        let by_parts = RequestPattern::path("GET", "/files").with_query("name=a");

        for url in [
            "http://api.test/files?name=a",
            "http://api.test/files?name=b",
            "http://api.test/files",
        ] {
            let request = get(url);
            assert_eq!(
                by_url.matches(&request).is_some(),
                by_parts.matches(&request).is_some(),
                "{url}"
            );
        }
    }

    #[test]
    fn test_paths_and_queries_match_encoded_requests() {
        let spaced = RequestPattern::path("GET", "/files/my file.txt");
        assert!(spaced.matches(&get("http://h/files/my file.txt")).is_some());
        assert!(spaced.matches(&get("http://h/files/my%20file.txt")).is_some());

        let accented = RequestPattern::path("GET", "/caf\u{e9}");
        assert!(accented.matches(&get("http://h/caf\u{e9}")).is_some());

        let query = RequestPattern::path("GET", "/search").with_query("name=John Doe");
        assert!(query.matches(&get("http://h/search?name=John Doe")).is_some());
        assert!(query.matches(&get("http://h/search?name=Jane Doe")).is_none());

        let template = RequestPattern::path("GET", "/dirs/{name}/my file");
        let ctx = template.matches(&get("http://h/dirs/a/my file")).unwrap();
        assert_eq!(ctx.path_params.get("name"), Some(&"a".to_string()));
    }

    #[test]
    fn test_url_and_parts_agree_on_encoded_characters() {
        let by_url = RequestPattern::url("GET", "http://api.test/caf\u{e9} menu?q=cr\u{e8}me br\u{fb}l\u{e9}e").unwrap();
        let by_parts =
            RequestPattern::path("GET", "/caf\u{e9} menu").with_query("q=cr\u{e8}me br\u{fb}l\u{e9}e");

        for url in [
            "http://api.test/caf\u{e9} menu?q=cr\u{e8}me br\u{fb}l\u{e9}e",
            "http://api.test/caf%C3%A9%20menu?q=cr%C3%A8me%20br%C3%BBl%C3%A9e",
            "http://api.test/caf\u{e9} menu?q=other",
        ] {
            let request = get(url);
            assert_eq!(
                by_url.matches(&request).is_some(),
                by_parts.matches(&request).is_some(),
                "{url}"
            );
        }
        assert!(by_parts
            .matches(&get("http://api.test/caf\u{e9} menu?q=cr\u{e8}me br\u{fb}l\u{e9}e"))
            .is_some());
    }

    #[test]
    fn test_url_port_and_relative() {
        let with_port = RequestPattern::url("GET", "http://api.test:8080/x").unwrap();
        assert!(with_port.matches(&get("http://api.test:8080/x")).is_some());
        assert!(with_port.matches(&get("http://api.test:9090/x")).is_none());

        let relative = RequestPattern::url("GET", "/x?y=1").unwrap();
        assert!(relative.matches(&get("http://anything.test/x?y=1")).is_some());
        assert!(relative.matches(&get("http://anything.test/x")).is_none());
    }

    #[test]
    fn test_url_template() {
        let pattern = RequestPattern::url("GET", "http://api.test/users/{id}").unwrap();
        let ctx = pattern.matches(&get("http://api.test/users/42")).unwrap();
        assert_eq!(ctx.path_params.get("id"), Some(&"42".to_string()));
    }

    #[test]
    fn test_invalid_url() {
        assert!(RequestPattern::url("GET", "http://[::1").is_err());
    }

    #[test]
    fn test_regex_captures() {
        let pattern = RequestPattern::path("GET", "/")
            .with_path_pattern(PathPattern::regex(r"^/files/(?P<name>\w+)\.json$").unwrap());

        let ctx = pattern.matches(&get("http://h/files/report.json")).unwrap();
        assert_eq!(ctx.captures.get("name"), Some(&"report".to_string()));
        assert_eq!(ctx.captures.get("1"), Some(&"report".to_string()));
    }

    #[test]
    fn test_glob_and_prefix() {
        let glob = RequestPattern::path("GET", "/")
            .with_path_pattern(PathPattern::glob("/static/**/*.png").unwrap());
        assert!(glob.matches(&get("http://h/static/img/a.png")).is_some());
        assert!(glob.matches(&get("http://h/static/img/a.jpg")).is_none());

        let prefix = RequestPattern::path("GET", "/")
            .with_path_pattern(PathPattern::Prefix("/api/".to_string()));
        assert!(prefix.matches(&get("http://h/api/posts/123")).is_some());
        assert!(prefix.matches(&get("http://h/other")).is_none());

        assert!(PathPattern::regex("(").is_err());
    }

    #[test]
    fn test_query_params_decoded() {
        let pattern = RequestPattern::path("GET", "/search");
        let ctx = pattern.matches(&get("http://h/search?name=John%20Doe&page=2")).unwrap();
        assert_eq!(ctx.query_params.get("name"), Some(&"John Doe".to_string()));
        assert_eq!(ctx.query_params.get("page"), Some(&"2".to_string()));
    }
}
