use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::schema::types::RelationReference;
use crate::typesystem::{NamespaceResolver, TypeSystem};

use super::compiler::compute_reachability;
use super::entrypoint::ReachabilityEntrypoint;
use super::{ConfigError, ReachabilityConfig, ReachabilityError, ReachabilityMode, resolve_namespace};

/// Finds the entrypoints by which subjects of a given type reach relations of one
/// namespace, following subject relations into other namespaces as needed.
pub struct ReachabilityGraph<R: NamespaceResolver> {
    type_system: Arc<TypeSystem>,
    resolver: Arc<R>,
    config: ReachabilityConfig,
}

impl<R: NamespaceResolver> ReachabilityGraph<R> {
    pub fn new(type_system: Arc<TypeSystem>, resolver: Arc<R>) -> Self {
        Self {
            type_system,
            resolver,
            config: ReachabilityConfig::default(),
        }
    }

    pub fn with_config(
        type_system: Arc<TypeSystem>,
        resolver: Arc<R>,
        config: ReachabilityConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            type_system,
            resolver,
            config,
        })
    }

    pub fn namespace(&self) -> &str {
        self.type_system.name()
    }

    /// Every entrypoint from `subject_type` into `resource_type`.
    pub async fn all_entrypoints(
        &self,
        cancel: &CancellationToken,
        subject_type: &RelationReference,
        resource_type: &RelationReference,
    ) -> Result<Vec<ReachabilityEntrypoint>, ReachabilityError> {
        self.entrypoints(cancel, subject_type, resource_type, ReachabilityMode::Full)
            .await
    }

    /// Entrypoints from `subject_type` into `resource_type`, skipping all but the first
    /// operand of intersections and the excluded side of exclusions.
    pub async fn optimized_entrypoints(
        &self,
        cancel: &CancellationToken,
        subject_type: &RelationReference,
        resource_type: &RelationReference,
    ) -> Result<Vec<ReachabilityEntrypoint>, ReachabilityError> {
        self.entrypoints(
            cancel,
            subject_type,
            resource_type,
            ReachabilityMode::Optimized,
        )
        .await
    }

    pub async fn entrypoints(
        &self,
        cancel: &CancellationToken,
        subject_type: &RelationReference,
        resource_type: &RelationReference,
        mode: ReachabilityMode,
    ) -> Result<Vec<ReachabilityEntrypoint>, ReachabilityError> {
        if resource_type.namespace != self.namespace() {
            return Err(ReachabilityError::MismatchedNamespace {
                expected: self.namespace().to_string(),
                given: resource_type.namespace.clone(),
            });
        }

        tracing::debug!(
            subject = %subject_type,
            resource = %resource_type,
            ?mode,
            "collecting reachability entrypoints"
        );

        let mut visited = HashSet::new();
        let mut collected = Vec::new();
        // Pending relations, popped depth first. Children are pushed in reverse so they
        // are visited in discovery order.
        let mut pending = vec![resource_type.clone()];

        while let Some(relation) = pending.pop() {
            if visited.contains(&relation) {
                tracing::trace!(resource = %relation, "relation already visited");
                continue;
            }
            if visited.len() >= self.config.max_relations {
                return Err(ReachabilityError::RelationLimitExceeded(
                    self.config.max_relations,
                ));
            }
            visited.insert(relation.clone());

            let type_system = self.type_system_for(cancel, &relation.namespace).await?;
            let index = compute_reachability(
                cancel,
                &type_system,
                &*self.resolver,
                &relation.relation,
                mode,
            )
            .await?;
            tracing::debug!(
                resource = %relation,
                entrypoints = index.entrypoint_count(),
                "compiled relation reachability"
            );

            if let Some(set) = index.entrypoints_for_subject_type(&subject_type.namespace) {
                collected.extend(set.entrypoints.iter().cloned());
            }
            if let Some(set) = index.entrypoints_for_subject_relation(subject_type) {
                collected.extend(set.entrypoints.iter().cloned());
            }

            let next: Vec<&RelationReference> = index
                .subject_relations()
                .filter(|r| !r.is_ellipsis() && !visited.contains(*r))
                .collect();
            pending.extend(next.into_iter().rev().cloned());
        }

        tracing::debug!(
            subject = %subject_type,
            resource = %resource_type,
            relations = visited.len(),
            entrypoints = collected.len(),
            "collected reachability entrypoints"
        );
        Ok(collected)
    }

    async fn type_system_for(
        &self,
        cancel: &CancellationToken,
        namespace: &str,
    ) -> Result<Arc<TypeSystem>, ReachabilityError> {
        if namespace == self.namespace() {
            super::ensure_not_cancelled(cancel)?;
            return Ok(Arc::clone(&self.type_system));
        }
        let definition = resolve_namespace(cancel, &*self.resolver, namespace).await?;
        Ok(Arc::new(TypeSystem::new(definition)?))
    }
}
