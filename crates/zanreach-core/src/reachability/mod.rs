mod compiler;
mod entrypoint;
mod graph;

pub use compiler::{EntrypointSet, RelationReachability, compute_reachability};
pub use entrypoint::{EntrypointKind, ReachabilityEntrypoint, ResultStatus};
pub use graph::ReachabilityGraph;

use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::schema::types::TypeDefinition;
use crate::typesystem::{NamespaceResolver, ResolveError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReachabilityError {
    #[error("resource type namespace '{given}' does not match graph namespace '{expected}'")]
    MismatchedNamespace { expected: String, given: String },

    #[error("unknown namespace: {0}")]
    UnknownNamespace(String),

    #[error("unknown relation '{relation}' under namespace '{namespace}' for reachability")]
    UnknownRelation { namespace: String, relation: String },

    #[error("malformed schema: {0}")]
    MalformedSchema(String),

    #[error("namespace resolver error: {0}")]
    Resolver(String),

    #[error("reachability traversal cancelled")]
    Cancelled,

    #[error("reachability traversal exceeded {0} relations")]
    RelationLimitExceeded(usize),
}

impl From<ResolveError> for ReachabilityError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound(name) => Self::UnknownNamespace(name),
            ResolveError::Internal(msg) => Self::Resolver(msg),
        }
    }
}

/// Traversal mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ReachabilityMode {
    /// Walk every branch of every rewrite.
    #[default]
    Full,
    /// Walk only the first operand of intersections and the base of exclusions.
    Optimized,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReachabilityConfig {
    /// Upper bound on distinct relations compiled by one traversal.
    pub max_relations: usize,
}

impl Default for ReachabilityConfig {
    fn default() -> Self {
        Self {
            max_relations: 1024,
        }
    }
}

impl ReachabilityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_relations == 0 {
            return Err(ConfigError::Validation(
                "max_relations must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("reachability config validation failed: {0}")]
    Validation(String),
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<(), ReachabilityError> {
    if cancel.is_cancelled() {
        return Err(ReachabilityError::Cancelled);
    }
    Ok(())
}

async fn resolve_namespace<R: NamespaceResolver>(
    cancel: &CancellationToken,
    resolver: &R,
    name: &str,
) -> Result<Arc<TypeDefinition>, ReachabilityError> {
    ensure_not_cancelled(cancel)?;
    Ok(resolver.lookup_namespace(name).await?)
}
