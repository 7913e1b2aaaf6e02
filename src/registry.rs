//! The interceptor list consulted for every intercepted request.
//!
//! Stubs are evaluated by priority (highest first) and, within a priority,
//! newest first: registering a stub for an already-stubbed request shadows
//! the older one.

use crate::matcher::{MatchContext, RequestPattern};
use crate::request::InterceptedRequest;
use crate::response::StubResponse;
use lazy_static::lazy_static;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::debug;

lazy_static! {
    static ref GLOBAL_REGISTRY: Arc<StubRegistry> = Arc::new(StubRegistry::new());
}

type ProducerFn = dyn Fn(&InterceptedRequest) -> StubResponse + Send + Sync;
type ContextualFn = dyn Fn(&InterceptedRequest, &MatchContext) -> StubResponse + Send + Sync;

/// Handle to a registered stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StubId(u64);

impl fmt::Display for StubId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stub-{}", self.0)
    }
}

/// How a stub produces its response.
#[derive(Clone)]
pub enum Responder {
    /// The same response every time
    Static(StubResponse),
    /// Computed per request
    Dynamic(Arc<ProducerFn>),
    /// Computed per request, with what the matcher captured
    Contextual(Arc<ContextualFn>),
}

impl Responder {
    pub fn dynamic<F>(producer: F) -> Self
    where
        F: Fn(&InterceptedRequest) -> StubResponse + Send + Sync + 'static,
    {
        Responder::Dynamic(Arc::new(producer))
    }

    pub fn contextual<F>(producer: F) -> Self
    where
        F: Fn(&InterceptedRequest, &MatchContext) -> StubResponse + Send + Sync + 'static,
    {
        Responder::Contextual(Arc::new(producer))
    }

    fn respond(&self, request: &InterceptedRequest, context: &MatchContext) -> StubResponse {
        match self {
            Responder::Static(response) => response.clone(),
            Responder::Dynamic(producer) => producer(request),
            Responder::Contextual(producer) => producer(request, context),
        }
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Responder::Static(response) => f.debug_tuple("Static").field(response).finish(),
            Responder::Dynamic(_) => f.write_str("Dynamic(..)"),
            Responder::Contextual(_) => f.write_str("Contextual(..)"),
        }
    }
}

impl From<StubResponse> for Responder {
    fn from(response: StubResponse) -> Self {
        Responder::Static(response)
    }
}

/// A matcher paired with a responder.
#[derive(Debug, Clone)]
pub struct Stub {
    pattern: RequestPattern,
    responder: Responder,
    name: Option<String>,
    priority: i32,
    max_matches: u32,
}

impl Stub {
    pub fn new(pattern: RequestPattern, responder: impl Into<Responder>) -> Self {
        Self {
            pattern,
            responder: responder.into(),
            name: None,
            priority: 0,
            max_matches: 0,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Higher priorities are tried first.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Stop matching after `max_matches` hits (0 = unlimited).
    pub fn with_max_matches(mut self, max_matches: u32) -> Self {
        self.max_matches = max_matches;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

struct Entry {
    id: StubId,
    stub: Arc<Stub>,
    hits: AtomicU32,
}

impl Entry {
    /// Count a hit unless the stub is exhausted.
    fn claim(&self) -> bool {
        let max = self.stub.max_matches;
        self.hits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |hits| {
                (max == 0 || hits < max).then_some(hits.saturating_add(1))
            })
            .is_ok()
    }
}

#[derive(Default)]
struct Entries {
    /// Sorted by evaluation order
    list: Vec<Entry>,
    next_id: u64,
}

/// Ordered set of active stubs.
#[derive(Default)]
pub struct StubRegistry {
    entries: RwLock<Entries>,
}

/// A stub that answered a request.
#[derive(Debug)]
pub struct Matched {
    pub id: StubId,
    pub name: Option<String>,
    pub response: StubResponse,
}

impl StubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> Arc<StubRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Register a pattern with a responder at default priority.
    pub fn register(&self, pattern: RequestPattern, responder: impl Into<Responder>) -> StubId {
        self.register_stub(Stub::new(pattern, responder))
    }

    pub fn register_stub(&self, stub: Stub) -> StubId {
        let mut entries = self.entries.write();
        entries.next_id += 1;
        let id = StubId(entries.next_id);

        // Newest first within a priority: insert ahead of equal priorities.
        let position = entries
            .list
            .iter()
            .position(|e| e.stub.priority <= stub.priority)
            .unwrap_or(entries.list.len());

        debug!(stub_id = %id, name = ?stub.name, priority = stub.priority, "Registered stub");
        entries.list.insert(
            position,
            Entry {
                id,
                stub: Arc::new(stub),
                hits: AtomicU32::new(0),
            },
        );
        id
    }

    /// Find the stub answering `request` and produce its response.
    ///
    /// The responder runs after the registry lock is released, so it may
    /// register further stubs.
    pub fn find(&self, request: &InterceptedRequest) -> Option<Matched> {
        let (id, stub, context) = {
            let entries = self.entries.read();
            entries.list.iter().find_map(|entry| {
                let context = entry.stub.pattern.matches(request)?;
                entry
                    .claim()
                    .then(|| (entry.id, Arc::clone(&entry.stub), context))
            })?
        };

        Some(Matched {
            id,
            name: stub.name.clone(),
            response: stub.responder.respond(request, &context),
        })
    }

    /// Response for `request`, if any stub matches.
    pub fn respond(&self, request: &InterceptedRequest) -> Option<StubResponse> {
        self.find(request).map(|matched| matched.response)
    }

    /// How many requests `id` has answered.
    pub fn hits(&self, id: StubId) -> Option<u32> {
        self.entries
            .read()
            .list
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.hits.load(Ordering::Acquire))
    }

    /// Remove one stub. Returns `false` if it was not registered.
    pub fn remove(&self, id: StubId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.list.len();
        entries.list.retain(|e| e.id != id);
        before != entries.list.len()
    }

    /// Remove every stub.
    pub fn reset(&self) {
        let mut entries = self.entries.write();
        debug!(count = entries.list.len(), "Removing all stubs");
        entries.list.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for StubRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StubRegistry")
            .field("stubs", &self.len())
            .finish()
    }
}
