use std::fmt;

use crate::schema::types::{RelationReference, RewriteRule, TupleToUserset, TypeDefinition};
use crate::schema::{OperationPath, find_operation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntrypointKind {
    /// A relationship tuple written directly on the relation.
    Relation,
    /// A reference to another relation on the same object.
    ComputedUserset,
    /// An arrow: walk the tupleset, then evaluate a relation on the object found.
    TuplesetToUserset,
}

impl fmt::Display for EntrypointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Relation => "relation",
            Self::ComputedUserset => "computed_userset",
            Self::TuplesetToUserset => "tupleset_to_userset",
        };
        f.write_str(name)
    }
}

/// Whether reaching the entrypoint is enough to satisfy its containing relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultStatus {
    Direct,
    /// Nested under an intersection or exclusion; other branches decide the outcome.
    Conditional,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Target {
    Relation(RelationReference),
    ComputedUserset(RelationReference),
    TuplesetToUserset(OperationPath),
}

/// One structural path by which a subject can influence its containing relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReachabilityEntrypoint {
    target: Target,
    containing: RelationReference,
    status: ResultStatus,
}

impl ReachabilityEntrypoint {
    pub(crate) fn relation(containing: RelationReference, status: ResultStatus) -> Self {
        Self {
            target: Target::Relation(containing.clone()),
            containing,
            status,
        }
    }

    pub(crate) fn computed_userset(
        containing: RelationReference,
        computed: RelationReference,
        status: ResultStatus,
    ) -> Self {
        Self {
            target: Target::ComputedUserset(computed),
            containing,
            status,
        }
    }

    pub(crate) fn tupleset_to_userset(
        containing: RelationReference,
        path: OperationPath,
        status: ResultStatus,
    ) -> Self {
        Self {
            target: Target::TuplesetToUserset(path),
            containing,
            status,
        }
    }

    pub fn kind(&self) -> EntrypointKind {
        match self.target {
            Target::Relation(_) => EntrypointKind::Relation,
            Target::ComputedUserset(_) => EntrypointKind::ComputedUserset,
            Target::TuplesetToUserset(_) => EntrypointKind::TuplesetToUserset,
        }
    }

    /// The relation or permission whose definition produced this entrypoint.
    pub fn containing_relation(&self) -> &RelationReference {
        &self.containing
    }

    pub fn result_status(&self) -> ResultStatus {
        self.status
    }

    /// True unless the entrypoint sits under an intersection or exclusion.
    pub fn is_direct_result(&self) -> bool {
        self.status == ResultStatus::Direct
    }

    /// The relation holding the tuple.
    ///
    /// # Panics
    ///
    /// Panics unless the kind is [`EntrypointKind::Relation`].
    pub fn direct_relation(&self) -> &RelationReference {
        match &self.target {
            Target::Relation(relation) => relation,
            _ => panic!("cannot call direct_relation for kind {}", self.kind()),
        }
    }

    /// The same-object relation referenced by the rewrite.
    ///
    /// # Panics
    ///
    /// Panics unless the kind is [`EntrypointKind::ComputedUserset`].
    pub fn computed_userset_relation(&self) -> &RelationReference {
        match &self.target {
            Target::ComputedUserset(relation) => relation,
            _ => panic!(
                "cannot call computed_userset_relation for kind {}",
                self.kind()
            ),
        }
    }

    /// Address of the arrow inside the containing permission's rewrite.
    ///
    /// # Panics
    ///
    /// Panics unless the kind is [`EntrypointKind::TuplesetToUserset`].
    pub fn operation_path(&self) -> &OperationPath {
        match &self.target {
            Target::TuplesetToUserset(path) => path,
            _ => panic!("cannot call operation_path for kind {}", self.kind()),
        }
    }

    /// Recovers the arrow that produced this entrypoint from the definition of the
    /// containing namespace.
    ///
    /// # Panics
    ///
    /// Panics unless the kind is [`EntrypointKind::TuplesetToUserset`], or if
    /// `definition` is not the containing relation's namespace.
    pub fn tuple_to_userset<'d>(&self, definition: &'d TypeDefinition) -> Option<&'d TupleToUserset> {
        let path = match &self.target {
            Target::TuplesetToUserset(path) => path,
            _ => panic!("cannot call tuple_to_userset for kind {}", self.kind()),
        };
        if definition.name != self.containing.namespace {
            panic!(
                "invalid type definition '{}' given to tuple_to_userset for {}",
                definition.name, self.containing
            );
        }

        let permission = definition.get_permission(&self.containing.relation)?;
        match find_operation(&permission.rule, path)? {
            RewriteRule::TupleToUserset(ttu) => Some(ttu),
            _ => None,
        }
    }
}

impl fmt::Display for ReachabilityEntrypoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} entrypoint in {}", self.kind(), self.containing)?;
        match &self.target {
            Target::Relation(_) => {}
            Target::ComputedUserset(relation) => write!(f, " via {relation}")?,
            Target::TuplesetToUserset(path) => write!(f, " at {path}")?,
        }
        if self.status == ResultStatus::Conditional {
            write!(f, " (conditional)")?;
        }
        Ok(())
    }
}
