use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Caller identity
// =============================================================================

/// Display name used when no session identity could be resolved.
pub const ANONYMOUS_DISPLAY_NAME: &str = "Usuário";

/// The caller on whose behalf a request runs.
///
/// Resolved once per request from the session token and never mutated
/// afterwards. `id` is passed through to downstream business APIs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub id: i64,
    pub display_name: String,
}

impl CallerIdentity {
    pub fn new(id: i64, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }

    /// The identity used when the session is absent or malformed.
    pub fn anonymous() -> Self {
        Self::new(0, ANONYMOUS_DISPLAY_NAME)
    }

    pub fn is_anonymous(&self) -> bool {
        self.id == 0
    }
}

impl Default for CallerIdentity {
    fn default() -> Self {
        Self::anonymous()
    }
}

// =============================================================================
// Records and sources
// =============================================================================

/// A loosely-typed business record as returned by an upstream collaborator.
///
/// Upstream shapes are outside our control, so fields are looked up by name
/// and coerced on read instead of being deserialized into a fixed schema.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(pub Map<String, Value>);

impl Record {
    /// Build a record from a JSON value. Non-object values yield `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Displayable text for a field.
    ///
    /// Strings are returned trimmed, numbers and booleans are rendered with
    /// their JSON representation. Missing, null, empty, array and object
    /// values yield `None`.
    pub fn text(&self, field: &str) -> Option<String> {
        match self.0.get(field)? {
            Value::String(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Numeric value of a field, defaulting to zero.
    ///
    /// Accepts JSON numbers and strings that parse as a finite number.
    pub fn number(&self, field: &str) -> f64 {
        let parsed = match self.0.get(field) {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        parsed.filter(|n| n.is_finite()).unwrap_or(0.0)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// The four business-data sources aggregated into a context snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Leads,
    Partners,
    Products,
    Orders,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Leads,
        SourceKind::Partners,
        SourceKind::Products,
        SourceKind::Orders,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SourceKind::Leads => "leads",
            SourceKind::Partners => "partners",
            SourceKind::Products => "products",
            SourceKind::Orders => "orders",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one fetch attempt against one source.
///
/// `total` is the untruncated record count. When `ok` is false the source
/// failed or timed out, and `items` is empty.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceResult {
    pub items: Vec<Record>,
    pub total: usize,
    pub ok: bool,
}

impl SourceResult {
    /// A successful result holding every record the source returned.
    pub fn from_items(items: Vec<Record>) -> Self {
        Self {
            total: items.len(),
            items,
            ok: true,
        }
    }

    /// A successful result with no records (e.g. a cache miss).
    pub fn empty() -> Self {
        Self::from_items(Vec::new())
    }

    /// The result of a failed or timed-out fetch.
    pub fn failed() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            ok: false,
        }
    }

    /// Cut `items` down to `cap` entries. `total` is left untouched.
    pub fn truncate(&mut self, cap: usize) {
        self.items.truncate(cap);
    }
}

/// Bounded aggregate of all business-data sources for one request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub leads: SourceResult,
    pub partners: SourceResult,
    pub products: SourceResult,
    pub orders: SourceResult,
}

impl ContextSnapshot {
    /// True iff at least one source reported a nonzero total.
    pub fn has_any_data(&self) -> bool {
        SourceKind::ALL.iter().any(|kind| self.get(*kind).total > 0)
    }

    pub fn get(&self, kind: SourceKind) -> &SourceResult {
        match kind {
            SourceKind::Leads => &self.leads,
            SourceKind::Partners => &self.partners,
            SourceKind::Products => &self.products,
            SourceKind::Orders => &self.orders,
        }
    }

    pub fn set(&mut self, kind: SourceKind, result: SourceResult) {
        match kind {
            SourceKind::Leads => self.leads = result,
            SourceKind::Partners => self.partners = result,
            SourceKind::Products => self.products = result,
            SourceKind::Orders => self.orders = result,
        }
    }

    /// Number of sources whose fetch failed.
    pub fn failed_sources(&self) -> usize {
        SourceKind::ALL
            .iter()
            .filter(|kind| !self.get(**kind).ok)
            .count()
    }
}

// =============================================================================
// Conversation turns
// =============================================================================

/// A prior turn as supplied by the caller.
///
/// The role label is kept verbatim; only `"assistant"` is meaningful, any
/// other label is treated as a user turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: String,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.role == "assistant"
    }
}

/// Role vocabulary of the generative-model provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderRole {
    User,
    Model,
}

impl ProviderRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderRole::User => "user",
            ProviderRole::Model => "model",
        }
    }
}

/// A turn expressed in the provider's vocabulary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTurn {
    pub role: ProviderRole,
    pub text: String,
}

impl ProviderTurn {
    pub fn new(role: ProviderRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

// =============================================================================
// Stream events
// =============================================================================

/// One event of an incrementally delivered reply.
///
/// Every stream is zero or more `Chunk`s followed by exactly one `Done` or
/// one `Error`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Chunk { text: String },
    Done,
    Error { message: String },
}

impl StreamEvent {
    pub fn chunk(text: impl Into<String>) -> Self {
        StreamEvent::Chunk { text: text.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error {
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Chunk { .. })
    }
}
