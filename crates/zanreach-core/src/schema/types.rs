use std::fmt;

/// Relation name reserved for "the subject itself".
pub const ELLIPSIS: &str = "...";

/// Identifies a relation or permission: `namespace#relation`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationReference {
    pub namespace: String,
    pub relation: String,
}

impl RelationReference {
    pub fn new(namespace: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            relation: relation.into(),
        }
    }

    pub fn ellipsis(namespace: impl Into<String>) -> Self {
        Self::new(namespace, ELLIPSIS)
    }

    pub fn is_ellipsis(&self) -> bool {
        self.relation == ELLIPSIS
    }
}

impl fmt::Display for RelationReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.namespace, self.relation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub types: Vec<TypeDefinition>,
}

impl Schema {
    pub fn get_type(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.iter().find(|t| t.name == name)
    }
}

/// A namespace: one `definition` block of a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDefinition {
    pub name: String,
    pub relations: Vec<RelationDef>,
    pub permissions: Vec<PermissionDef>,
}

impl TypeDefinition {
    pub fn get_relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn get_permission(&self, name: &str) -> Option<&PermissionDef> {
        self.permissions.iter().find(|p| p.name == name)
    }

    /// Whether `name` is declared as either a relation or a permission.
    pub fn defines(&self, name: &str) -> bool {
        self.get_relation(name).is_some() || self.get_permission(name).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDef {
    pub name: String,
    pub subject_types: Vec<SubjectTypeRef>,
}

/// An allowed subject on a relation: `user`, `group#member` or `user:*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectTypeRef {
    pub type_name: String,
    pub relation: Option<String>,
    pub wildcard: bool,
}

impl SubjectTypeRef {
    pub fn direct(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            relation: None,
            wildcard: false,
        }
    }

    pub fn userset(type_name: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            relation: Some(relation.into()),
            wildcard: false,
        }
    }

    pub fn wildcard(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            relation: None,
            wildcard: true,
        }
    }

    /// The subject relation this reference reaches through, or `None` for a wildcard.
    pub fn subject_relation(&self) -> Option<RelationReference> {
        if self.wildcard {
            return None;
        }
        Some(match self.relation {
            Some(ref rel) => RelationReference::new(&self.type_name, rel),
            None => RelationReference::ellipsis(&self.type_name),
        })
    }
}

impl fmt::Display for SubjectTypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name)?;
        if self.wildcard {
            write!(f, ":*")?;
        } else if let Some(ref rel) = self.relation {
            write!(f, "#{rel}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionDef {
    pub name: String,
    pub rule: RewriteRule,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteRule {
    ComputedUserset(String),
    Union(Vec<RewriteRule>),
    Intersection(Vec<RewriteRule>),
    Exclusion(Box<RewriteRule>, Box<RewriteRule>),
    TupleToUserset(TupleToUserset),
}

impl RewriteRule {
    pub fn computed(relation: impl Into<String>) -> Self {
        Self::ComputedUserset(relation.into())
    }

    pub fn arrow(tupleset: impl Into<String>, computed_relation: impl Into<String>) -> Self {
        Self::TupleToUserset(TupleToUserset {
            tupleset: tupleset.into(),
            computed_relation: computed_relation.into(),
        })
    }
}

/// `tupleset->computed_relation`: follow `tupleset` to another object, then evaluate
/// `computed_relation` there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleToUserset {
    pub tupleset: String,
    pub computed_relation: String,
}

impl fmt::Display for TupleToUserset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.tupleset, self.computed_relation)
    }
}
