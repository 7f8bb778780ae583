//! Source failure taxonomy.

use pulse_core::SourceKind;

/// Why a single source produced no data.
///
/// These never fail a request: the fetcher logs them and reports the source
/// as `ok = false`.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("{kind} timed out after {after_ms} ms")]
    Timeout { kind: SourceKind, after_ms: u128 },
    #[error("{kind} unavailable: {reason}")]
    Unavailable { kind: SourceKind, reason: String },
}

impl SourceError {
    pub fn unavailable(kind: SourceKind, reason: impl Into<String>) -> Self {
        SourceError::Unavailable {
            kind,
            reason: reason.into(),
        }
    }

    pub fn source_kind(&self) -> SourceKind {
        match self {
            SourceError::Timeout { kind, .. } | SourceError::Unavailable { kind, .. } => {
                *kind
            }
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SourceError::Timeout { .. })
    }
}
