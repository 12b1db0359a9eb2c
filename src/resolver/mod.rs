mod wikidata;

use crate::types::{EntityId, SportId};
use async_trait::async_trait;

pub use wikidata::WikidataResolver;

/// Result type for resolver operations
pub type ResolverResult<T> = Result<T, ResolverError>;

/// Errors that can occur while talking to the entity authority
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Outcome of resolving a submitted name against the entity authority.
///
/// Failure is a separate `ResolverError`, not a variant, so callers handle
/// the service-down case explicitly.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Exactly one entity matched (possibly after hint narrowing)
    Resolved {
        entity_id: EntityId,
        /// Authority's display name, when a label lookup succeeded
        canonical_name: Option<String>,
    },
    /// Several entities match and the hint (if any) did not narrow to one.
    /// `candidates` is the full matching set, for availability checks.
    Ambiguous { candidates: Vec<EntityId> },
    /// No matching athlete at all
    NotFound,
    /// A real athlete, but not in the requested sport
    WrongSport { sports: Vec<String> },
}

/// The external entity authority, seen from the submission pipeline.
#[async_trait]
pub trait EntityResolver: Send + Sync {
    /// Resolve a sanitized name within a sport, optionally narrowed by a
    /// user-supplied disambiguation hint.
    async fn resolve(
        &self,
        name: &str,
        sport: &SportId,
        hint: Option<&str>,
    ) -> ResolverResult<Resolution>;
}
