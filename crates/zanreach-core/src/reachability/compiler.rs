use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use crate::schema::types::{RelationDef, RelationReference, RewriteRule, TupleToUserset};
use crate::schema::{OperationPath, find_operation};
use crate::typesystem::{NamespaceResolver, RelationInfo, TypeSystem};

use super::entrypoint::{ReachabilityEntrypoint, ResultStatus};
use super::{ReachabilityError, ReachabilityMode, ensure_not_cancelled, resolve_namespace};

/// Entrypoints reached from one subject type or subject relation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntrypointSet {
    /// `None` for wildcard subjects; otherwise the subject relation, which is an
    /// ellipsis reference when the subject is the object itself.
    pub subject_relation: Option<RelationReference>,
    pub entrypoints: Vec<ReachabilityEntrypoint>,
}

/// Reachability index of a single relation or permission.
#[derive(Debug, Clone, Default)]
pub struct RelationReachability {
    by_subject_type: HashMap<String, EntrypointSet>,
    by_subject_relation: HashMap<RelationReference, EntrypointSet>,
    // Discovery order of `by_subject_relation` keys, so recursion is deterministic.
    subject_relations: Vec<RelationReference>,
}

impl RelationReachability {
    pub fn entrypoints_for_subject_type(&self, subject_type: &str) -> Option<&EntrypointSet> {
        self.by_subject_type.get(subject_type)
    }

    pub fn entrypoints_for_subject_relation(
        &self,
        subject_relation: &RelationReference,
    ) -> Option<&EntrypointSet> {
        self.by_subject_relation.get(subject_relation)
    }

    /// Subject relations in the order they were discovered.
    pub fn subject_relations(&self) -> impl Iterator<Item = &RelationReference> {
        self.subject_relations.iter()
    }

    pub fn entrypoint_count(&self) -> usize {
        self.by_subject_type
            .values()
            .chain(self.by_subject_relation.values())
            .map(|set| set.entrypoints.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entrypoint_count() == 0
    }

    fn add_subject_type(&mut self, subject_type: &str, entrypoint: ReachabilityEntrypoint) {
        self.by_subject_type
            .entry(subject_type.to_string())
            .or_default()
            .entrypoints
            .push(entrypoint);
    }

    fn add_subject_relation(
        &mut self,
        subject_relation: RelationReference,
        entrypoint: ReachabilityEntrypoint,
    ) {
        if let Some(set) = self.by_subject_relation.get_mut(&subject_relation) {
            set.entrypoints.push(entrypoint);
            return;
        }
        self.subject_relations.push(subject_relation.clone());
        self.by_subject_relation.insert(
            subject_relation.clone(),
            EntrypointSet {
                subject_relation: Some(subject_relation),
                entrypoints: vec![entrypoint],
            },
        );
    }
}

/// Compiles the reachability index of `relation` on `type_system`'s namespace.
///
/// Arrows are expanded against every subject type allowed on their tupleset, which
/// requires resolving those namespaces through `resolver`.
pub async fn compute_reachability<R: NamespaceResolver>(
    cancel: &CancellationToken,
    type_system: &TypeSystem,
    resolver: &R,
    relation: &str,
    mode: ReachabilityMode,
) -> Result<RelationReachability, ReachabilityError> {
    ensure_not_cancelled(cancel)?;

    let info = type_system
        .relation(relation)
        .ok_or_else(|| ReachabilityError::UnknownRelation {
            namespace: type_system.name().to_string(),
            relation: relation.to_string(),
        })?;
    let containing = RelationReference::new(type_system.name(), relation);

    match info {
        RelationInfo::Direct(def) => Ok(direct_reachability(&containing, def)),
        RelationInfo::Rewrite(permission) => {
            let mut compiler = Compiler {
                cancel,
                type_system,
                resolver,
                mode,
                root: &permission.rule,
                containing,
                index: RelationReachability::default(),
            };
            compiler
                .walk(&permission.rule, ResultStatus::Direct, OperationPath::root())
                .await?;
            Ok(compiler.index)
        }
    }
}

fn direct_reachability(containing: &RelationReference, def: &RelationDef) -> RelationReachability {
    let mut index = RelationReachability::default();
    for subject in &def.subject_types {
        let entrypoint = ReachabilityEntrypoint::relation(containing.clone(), ResultStatus::Direct);
        match subject.subject_relation() {
            Some(subject_relation) => index.add_subject_relation(subject_relation, entrypoint),
            None => index.add_subject_type(&subject.type_name, entrypoint),
        }
    }
    index
}

struct Compiler<'a, R> {
    cancel: &'a CancellationToken,
    type_system: &'a TypeSystem,
    resolver: &'a R,
    mode: ReachabilityMode,
    root: &'a RewriteRule,
    containing: RelationReference,
    index: RelationReachability,
}

impl<'a, R: NamespaceResolver> Compiler<'a, R> {
    fn walk<'s>(
        &'s mut self,
        rule: &'a RewriteRule,
        status: ResultStatus,
        path: OperationPath,
    ) -> Pin<Box<dyn Future<Output = Result<(), ReachabilityError>> + Send + 's>> {
        Box::pin(async move {
            match rule {
                RewriteRule::Union(children) => {
                    for (i, child) in children.iter().enumerate() {
                        self.walk(child, status, path.child(i)).await?;
                    }
                }
                RewriteRule::Intersection(children) => {
                    let walked = match self.mode {
                        ReachabilityMode::Full => children.len(),
                        ReachabilityMode::Optimized => children.len().min(1),
                    };
                    for (i, child) in children.iter().take(walked).enumerate() {
                        self.walk(child, ResultStatus::Conditional, path.child(i))
                            .await?;
                    }
                }
                RewriteRule::Exclusion(base, excluded) => {
                    self.walk(base, ResultStatus::Conditional, path.child(0))
                        .await?;
                    if self.mode == ReachabilityMode::Full {
                        self.walk(excluded, ResultStatus::Conditional, path.child(1))
                            .await?;
                    }
                }
                RewriteRule::ComputedUserset(relation) => {
                    let computed = RelationReference::new(self.type_system.name(), relation);
                    let entrypoint = ReachabilityEntrypoint::computed_userset(
                        self.containing.clone(),
                        computed.clone(),
                        status,
                    );
                    self.index.add_subject_relation(computed, entrypoint);
                }
                RewriteRule::TupleToUserset(ttu) => {
                    self.add_arrow(ttu, status, path).await?;
                }
            }
            Ok(())
        })
    }

    async fn add_arrow(
        &mut self,
        ttu: &'a TupleToUserset,
        status: ResultStatus,
        path: OperationPath,
    ) -> Result<(), ReachabilityError> {
        match find_operation(self.root, &path) {
            Some(RewriteRule::TupleToUserset(found)) if found == ttu => {}
            _ => {
                return Err(ReachabilityError::MalformedSchema(format!(
                    "operation path {path} does not address arrow {ttu} in {}",
                    self.containing
                )));
            }
        }

        let tupleset = match self.type_system.relation(&ttu.tupleset) {
            Some(RelationInfo::Direct(def)) => def,
            Some(RelationInfo::Rewrite(_)) => {
                return Err(ReachabilityError::MalformedSchema(format!(
                    "arrow {ttu} in {} walks a permission",
                    self.containing
                )));
            }
            None => {
                return Err(ReachabilityError::UnknownRelation {
                    namespace: self.type_system.name().to_string(),
                    relation: ttu.tupleset.clone(),
                });
            }
        };

        let mut seen = HashSet::new();
        for subject in &tupleset.subject_types {
            if !seen.insert(subject.type_name.as_str()) {
                continue;
            }

            let target = resolve_namespace(self.cancel, self.resolver, &subject.type_name).await?;
            if !target.defines(&ttu.computed_relation) {
                tracing::trace!(
                    arrow = %ttu,
                    subject_type = %subject.type_name,
                    "arrow target does not define computed relation"
                );
                continue;
            }

            let entrypoint = ReachabilityEntrypoint::tupleset_to_userset(
                self.containing.clone(),
                path.clone(),
                status,
            );
            self.index.add_subject_relation(
                RelationReference::new(&subject.type_name, &ttu.computed_relation),
                entrypoint,
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::reachability::EntrypointKind;
    use crate::schema::parse_schema;
    use crate::schema::types::TypeDefinition;
    use crate::typesystem::{ResolveError, SchemaResolver};

    async fn compile(
        input: &str,
        namespace: &str,
        relation: &str,
        mode: ReachabilityMode,
    ) -> Result<RelationReachability, ReachabilityError> {
        let schema = parse_schema(input).unwrap();
        let resolver = SchemaResolver::new(&schema);
        let definition = schema.get_type(namespace).unwrap().clone();
        let type_system = TypeSystem::new(Arc::new(definition)).unwrap();
        compute_reachability(
            &CancellationToken::new(),
            &type_system,
            &resolver,
            relation,
            mode,
        )
        .await
    }

    fn statuses(set: &EntrypointSet) -> Vec<ResultStatus> {
        set.entrypoints.iter().map(|e| e.result_status()).collect()
    }

    const NESTED: &str = r#"
        definition user {}
        definition document {
            relation r: user
            relation x: user
            relation y: user
            relation banned: user
            permission p = r + (x & y)
            permission q = (r + x) - banned
        }
    "#;

    #[tokio::test]
    async fn direct_relation_indexes_each_subject_kind() {
        let index = compile(
            "definition user {} definition group { relation member: user | user:* | group#member }",
            "group",
            "member",
            ReachabilityMode::Full,
        )
        .await
        .unwrap();

        let by_type = index.entrypoints_for_subject_type("user").unwrap();
        assert_eq!(by_type.subject_relation, None);
        assert_eq!(by_type.entrypoints.len(), 1);

        let ellipsis = RelationReference::ellipsis("user");
        let by_ellipsis = index.entrypoints_for_subject_relation(&ellipsis).unwrap();
        assert_eq!(by_ellipsis.subject_relation, Some(ellipsis.clone()));

        let member = RelationReference::new("group", "member");
        let by_member = index.entrypoints_for_subject_relation(&member).unwrap();
        let entrypoint = &by_member.entrypoints[0];
        assert_eq!(entrypoint.kind(), EntrypointKind::Relation);
        assert_eq!(entrypoint.direct_relation(), &member);
        assert!(entrypoint.is_direct_result());

        assert_eq!(
            index.subject_relations().cloned().collect::<Vec<_>>(),
            vec![ellipsis, member]
        );
        assert_eq!(index.entrypoint_count(), 3);
    }

    #[tokio::test]
    async fn union_keeps_direct_and_intersection_marks_conditional() {
        let index = compile(NESTED, "document", "p", ReachabilityMode::Full)
            .await
            .unwrap();

        let r = index
            .entrypoints_for_subject_relation(&RelationReference::new("document", "r"))
            .unwrap();
        assert_eq!(statuses(r), vec![ResultStatus::Direct]);
        assert_eq!(r.entrypoints[0].kind(), EntrypointKind::ComputedUserset);

        for name in ["x", "y"] {
            let set = index
                .entrypoints_for_subject_relation(&RelationReference::new("document", name))
                .unwrap();
            assert_eq!(statuses(set), vec![ResultStatus::Conditional], "for {name}");
        }
    }

    #[tokio::test]
    async fn exclusion_marks_both_sides_conditional() {
        let index = compile(NESTED, "document", "q", ReachabilityMode::Full)
            .await
            .unwrap();

        for name in ["r", "x", "banned"] {
            let set = index
                .entrypoints_for_subject_relation(&RelationReference::new("document", name))
                .unwrap();
            assert_eq!(statuses(set), vec![ResultStatus::Conditional], "for {name}");
        }
    }

    #[tokio::test]
    async fn optimized_skips_later_intersection_operands_and_excluded_side() {
        let p = compile(NESTED, "document", "p", ReachabilityMode::Optimized)
            .await
            .unwrap();
        assert!(
            p.entrypoints_for_subject_relation(&RelationReference::new("document", "x"))
                .is_some()
        );
        assert!(
            p.entrypoints_for_subject_relation(&RelationReference::new("document", "y"))
                .is_none()
        );

        let q = compile(NESTED, "document", "q", ReachabilityMode::Optimized)
            .await
            .unwrap();
        assert!(
            q.entrypoints_for_subject_relation(&RelationReference::new("document", "banned"))
                .is_none()
        );
        assert_eq!(q.entrypoint_count(), 2);
    }

    #[tokio::test]
    async fn arrow_expands_per_tupleset_subject_type() {
        let input = r#"
            definition user {}
            definition folder { relation viewer: user }
            definition team { relation viewer: user }
            definition tag {}
            definition document {
                relation parent: folder | team | tag | folder#viewer
                permission view = parent->viewer
            }
        "#;
        let index = compile(input, "document", "view", ReachabilityMode::Full)
            .await
            .unwrap();

        assert_eq!(
            index.subject_relations().cloned().collect::<Vec<_>>(),
            vec![
                RelationReference::new("folder", "viewer"),
                RelationReference::new("team", "viewer"),
            ]
        );
        let folder = index
            .entrypoints_for_subject_relation(&RelationReference::new("folder", "viewer"))
            .unwrap();
        assert_eq!(folder.entrypoints.len(), 1);
        let entrypoint = &folder.entrypoints[0];
        assert_eq!(entrypoint.kind(), EntrypointKind::TuplesetToUserset);
        assert!(entrypoint.operation_path().is_root());
        assert_eq!(
            entrypoint.containing_relation(),
            &RelationReference::new("document", "view")
        );
    }

    #[tokio::test]
    async fn arrow_records_distinct_operation_paths() {
        let input = r#"
            definition user {}
            definition folder { relation viewer: user relation editor: user }
            definition document {
                relation parent: folder
                permission view = parent->viewer + parent->editor
            }
        "#;
        let index = compile(input, "document", "view", ReachabilityMode::Full)
            .await
            .unwrap();

        let viewer = index
            .entrypoints_for_subject_relation(&RelationReference::new("folder", "viewer"))
            .unwrap();
        let editor = index
            .entrypoints_for_subject_relation(&RelationReference::new("folder", "editor"))
            .unwrap();
        assert_eq!(viewer.entrypoints[0].operation_path().indices(), &[0]);
        assert_eq!(editor.entrypoints[0].operation_path().indices(), &[1]);
    }

    #[tokio::test]
    async fn unknown_relation_is_rejected() {
        let err = compile(NESTED, "document", "missing", ReachabilityMode::Full)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ReachabilityError::UnknownRelation {
                namespace: "document".to_string(),
                relation: "missing".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn arrow_to_unknown_namespace_is_rejected() {
        let input = r#"
            definition document {
                relation parent: folder
                permission view = parent->viewer
            }
        "#;
        let err = compile(input, "document", "view", ReachabilityMode::Full)
            .await
            .unwrap_err();

        assert_eq!(err, ReachabilityError::UnknownNamespace("folder".to_string()));
    }

    #[tokio::test]
    async fn cancelled_compilation_aborts() {
        let schema = parse_schema(NESTED).unwrap();
        let resolver = SchemaResolver::new(&schema);
        let definition = schema.get_type("document").unwrap().clone();
        let type_system = TypeSystem::new(Arc::new(definition)).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = compute_reachability(&cancel, &type_system, &resolver, "p", ReachabilityMode::Full)
            .await
            .unwrap_err();

        assert_eq!(err, ReachabilityError::Cancelled);
    }

    struct CancelOnLookup {
        inner: SchemaResolver,
        cancel: CancellationToken,
    }

    impl NamespaceResolver for CancelOnLookup {
        async fn lookup_namespace(&self, name: &str) -> Result<Arc<TypeDefinition>, ResolveError> {
            self.cancel.cancel();
            self.inner.lookup_namespace(name).await
        }
    }

    #[tokio::test]
    async fn cancellation_between_arrow_targets_aborts() {
        let schema = parse_schema(
            r#"
            definition user {}
            definition folder { relation viewer: user }
            definition team { relation viewer: user }
            definition document {
                relation parent: folder | team
                permission view = parent->viewer
            }
        "#,
        )
        .unwrap();
        let definition = schema.get_type("document").unwrap().clone();
        let type_system = TypeSystem::new(Arc::new(definition)).unwrap();
        let cancel = CancellationToken::new();
        let resolver = CancelOnLookup {
            inner: SchemaResolver::new(&schema),
            cancel: cancel.clone(),
        };

        let err = compute_reachability(&cancel, &type_system, &resolver, "view", ReachabilityMode::Full)
            .await
            .unwrap_err();

        assert_eq!(err, ReachabilityError::Cancelled);
    }
}
