mod resolver;

pub use resolver::{CachingResolver, NamespaceResolver, ResolveError, SchemaResolver};

use std::collections::HashMap;
use std::sync::Arc;

use crate::reachability::ReachabilityError;
use crate::schema::types::{PermissionDef, RelationDef, RewriteRule, TypeDefinition};

/// What a name on a namespace resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationInfo<'a> {
    /// A stored relation; subjects are written as relationship tuples.
    Direct(&'a RelationDef),
    /// A permission computed from a rewrite tree.
    Rewrite(&'a PermissionDef),
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Relation(usize),
    Permission(usize),
}

/// Validated view of a single namespace.
#[derive(Debug, Clone)]
pub struct TypeSystem {
    definition: Arc<TypeDefinition>,
    relations: HashMap<String, Slot>,
}

impl TypeSystem {
    pub fn new(definition: Arc<TypeDefinition>) -> Result<Self, ReachabilityError> {
        let mut relations = HashMap::new();

        for (i, relation) in definition.relations.iter().enumerate() {
            if relations
                .insert(relation.name.clone(), Slot::Relation(i))
                .is_some()
            {
                return Err(malformed(&definition.name, &relation.name, "declared twice"));
            }
        }
        for (i, permission) in definition.permissions.iter().enumerate() {
            if relations
                .insert(permission.name.clone(), Slot::Permission(i))
                .is_some()
            {
                return Err(malformed(
                    &definition.name,
                    &permission.name,
                    "declared as both a relation and a permission",
                ));
            }
        }

        let type_system = Self {
            definition,
            relations,
        };
        for permission in &type_system.definition.permissions {
            type_system.validate_rule(&permission.name, &permission.rule)?;
        }

        Ok(type_system)
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &Arc<TypeDefinition> {
        &self.definition
    }

    pub fn relation(&self, name: &str) -> Option<RelationInfo<'_>> {
        match self.relations.get(name)? {
            Slot::Relation(i) => self.definition.relations.get(*i).map(RelationInfo::Direct),
            Slot::Permission(i) => self
                .definition
                .permissions
                .get(*i)
                .map(RelationInfo::Rewrite),
        }
    }

    pub fn has_relation(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    fn validate_rule(&self, permission: &str, rule: &RewriteRule) -> Result<(), ReachabilityError> {
        match rule {
            RewriteRule::Union(children) | RewriteRule::Intersection(children) => {
                if children.is_empty() {
                    return Err(malformed(self.name(), permission, "has an empty operation"));
                }
                for child in children {
                    self.validate_rule(permission, child)?;
                }
                Ok(())
            }
            RewriteRule::Exclusion(base, excluded) => {
                self.validate_rule(permission, base)?;
                self.validate_rule(permission, excluded)
            }
            RewriteRule::ComputedUserset(target) => {
                if self.has_relation(target) {
                    Ok(())
                } else {
                    Err(malformed(
                        self.name(),
                        permission,
                        &format!("references unknown relation '{target}'"),
                    ))
                }
            }
            RewriteRule::TupleToUserset(ttu) => match self.relation(&ttu.tupleset) {
                Some(RelationInfo::Direct(_)) => Ok(()),
                Some(RelationInfo::Rewrite(_)) => Err(malformed(
                    self.name(),
                    permission,
                    &format!("uses permission '{}' as an arrow tupleset", ttu.tupleset),
                )),
                None => Err(malformed(
                    self.name(),
                    permission,
                    &format!("references unknown tupleset relation '{}'", ttu.tupleset),
                )),
            },
        }
    }
}

fn malformed(namespace: &str, relation: &str, problem: &str) -> ReachabilityError {
    ReachabilityError::MalformedSchema(format!("{namespace}#{relation} {problem}"))
}
