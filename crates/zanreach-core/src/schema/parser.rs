use std::collections::HashSet;

use pest::Parser;
use pest::iterators::{Pair, Pairs};
use pest_derive::Parser;

use super::types::{
    PermissionDef, RelationDef, RewriteRule, Schema, SubjectTypeRef, TypeDefinition,
};

#[derive(Parser)]
#[grammar = "schema/grammar.pest"]
struct SchemaParser;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("mixed operators in permission expression: parenthesize to combine +, & and -")]
    MixedOperators,
    #[error("exclusion (-) supports exactly two operands: base - excluded")]
    MultipleExclusions,
    #[error("duplicate type: {0}")]
    DuplicateType(String),
    #[error("duplicate relation '{relation}' in type '{type_name}'")]
    DuplicateRelation { type_name: String, relation: String },
    #[error("duplicate permission '{permission}' in type '{type_name}'")]
    DuplicatePermission {
        type_name: String,
        permission: String,
    },
}

/// Parses schema text into namespace definitions.
///
/// Only syntax and duplicate names are checked here; references between relations
/// are validated when a [`crate::typesystem::TypeSystem`] is built.
pub fn parse_schema(input: &str) -> Result<Schema, ParseError> {
    let root = SchemaParser::parse(Rule::schema, input)
        .map_err(|e| ParseError::Syntax(e.to_string()))?
        .next()
        .ok_or_else(|| syntax("empty parse tree"))?;

    let mut types: Vec<TypeDefinition> = Vec::new();
    for pair in root.into_inner().filter(|p| p.as_rule() == Rule::definition) {
        let definition = parse_definition(pair)?;
        if types.iter().any(|t| t.name == definition.name) {
            return Err(ParseError::DuplicateType(definition.name));
        }
        types.push(definition);
    }

    Ok(Schema { types })
}

fn syntax(message: impl std::fmt::Display) -> ParseError {
    ParseError::Syntax(message.to_string())
}

fn expect<'i>(pairs: &mut Pairs<'i, Rule>, what: &str) -> Result<Pair<'i, Rule>, ParseError> {
    pairs.next().ok_or_else(|| syntax(format!("expected {what}")))
}

fn parse_definition(pair: Pair<'_, Rule>) -> Result<TypeDefinition, ParseError> {
    let mut parts = pair.into_inner();
    let name = expect(&mut parts, "definition name")?.as_str().to_string();
    let body = expect(&mut parts, "definition body")?;

    let mut definition = TypeDefinition {
        name,
        relations: Vec::new(),
        permissions: Vec::new(),
    };
    let mut relation_names = HashSet::new();
    let mut permission_names = HashSet::new();

    for member in body.into_inner() {
        match member.as_rule() {
            Rule::relation_def => {
                let relation = parse_relation(member)?;
                if !relation_names.insert(relation.name.clone()) {
                    return Err(ParseError::DuplicateRelation {
                        type_name: definition.name,
                        relation: relation.name,
                    });
                }
                definition.relations.push(relation);
            }
            Rule::permission_def => {
                let permission = parse_permission(member)?;
                if !permission_names.insert(permission.name.clone()) {
                    return Err(ParseError::DuplicatePermission {
                        type_name: definition.name,
                        permission: permission.name,
                    });
                }
                definition.permissions.push(permission);
            }
            other => return Err(syntax(format!("unexpected {other:?} in definition"))),
        }
    }

    Ok(definition)
}

fn parse_relation(pair: Pair<'_, Rule>) -> Result<RelationDef, ParseError> {
    let mut parts = pair.into_inner();
    let name = expect(&mut parts, "relation name")?.as_str().to_string();
    let subject_types = expect(&mut parts, "allowed subject types")?
        .into_inner()
        .map(parse_subject_type)
        .collect::<Result<_, _>>()?;

    Ok(RelationDef {
        name,
        subject_types,
    })
}

// `user`, `user:*` or `group#member`
fn parse_subject_type(pair: Pair<'_, Rule>) -> Result<SubjectTypeRef, ParseError> {
    let mut parts = pair.into_inner();
    let type_name = expect(&mut parts, "subject type")?.as_str();

    let Some(suffix) = parts.next() else {
        return Ok(SubjectTypeRef::direct(type_name));
    };
    match suffix.as_rule() {
        Rule::wildcard => Ok(SubjectTypeRef::wildcard(type_name)),
        Rule::identifier => Ok(SubjectTypeRef::userset(type_name, suffix.as_str())),
        other => Err(syntax(format!("unexpected {other:?} after subject type"))),
    }
}

fn parse_permission(pair: Pair<'_, Rule>) -> Result<PermissionDef, ParseError> {
    let mut parts = pair.into_inner();
    let name = expect(&mut parts, "permission name")?.as_str().to_string();
    let rule = parse_expression(expect(&mut parts, "permission expression")?)?;

    Ok(PermissionDef { name, rule })
}

fn parse_expression(pair: Pair<'_, Rule>) -> Result<RewriteRule, ParseError> {
    let mut parts = pair.into_inner();
    let mut operands = vec![parse_term(expect(&mut parts, "operand")?)?];
    let mut combinator = None;

    while let Some(op) = parts.next() {
        match combinator {
            None => combinator = Some(op.as_rule()),
            Some(previous) if previous != op.as_rule() => return Err(ParseError::MixedOperators),
            Some(_) => {}
        }
        operands.push(parse_term(expect(&mut parts, "operand after operator")?)?);
    }

    let Some(kind) = combinator else {
        return Ok(operands.remove(0));
    };
    match kind {
        Rule::union_op => Ok(RewriteRule::Union(operands)),
        Rule::intersection_op => Ok(RewriteRule::Intersection(operands)),
        Rule::exclusion_op => match <[RewriteRule; 2]>::try_from(operands) {
            Ok([base, excluded]) => Ok(RewriteRule::Exclusion(Box::new(base), Box::new(excluded))),
            Err(_) => Err(ParseError::MultipleExclusions),
        },
        other => Err(syntax(format!("unexpected operator {other:?}"))),
    }
}

fn parse_term(pair: Pair<'_, Rule>) -> Result<RewriteRule, ParseError> {
    let term = expect(&mut pair.into_inner(), "term")?;
    match term.as_rule() {
        Rule::identifier => Ok(RewriteRule::computed(term.as_str())),
        Rule::permission_expr => parse_expression(term),
        Rule::arrow_expr => {
            let mut sides = term.into_inner();
            let tupleset = expect(&mut sides, "arrow tupleset")?.as_str();
            let computed = expect(&mut sides, "arrow target relation")?.as_str();
            Ok(RewriteRule::arrow(tupleset, computed))
        }
        other => Err(syntax(format!("unexpected {other:?} in permission"))),
    }
}
