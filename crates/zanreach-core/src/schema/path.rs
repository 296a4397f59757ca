use std::fmt;

use super::types::RewriteRule;

/// Positional address of a node inside a rewrite tree.
///
/// Each element is a child index taken from the root: the `i`th operand of a union or
/// intersection, `0` for the base of an exclusion and `1` for the excluded side. The
/// empty path addresses the root itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct OperationPath(Vec<usize>);

impl OperationPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn child(&self, index: usize) -> Self {
        let mut indices = Vec::with_capacity(self.0.len() + 1);
        indices.extend_from_slice(&self.0);
        indices.push(index);
        Self(indices)
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<usize>> for OperationPath {
    fn from(indices: Vec<usize>) -> Self {
        Self(indices)
    }
}

impl fmt::Display for OperationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, index) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{index}")?;
        }
        write!(f, "]")
    }
}

/// Locates the node addressed by `path`, or `None` if the path walks off the tree.
pub fn find_operation<'a>(rule: &'a RewriteRule, path: &OperationPath) -> Option<&'a RewriteRule> {
    let mut current = rule;
    for &index in path.indices() {
        current = match current {
            RewriteRule::Union(children) | RewriteRule::Intersection(children) => {
                children.get(index)?
            }
            RewriteRule::Exclusion(base, excluded) => match index {
                0 => &**base,
                1 => &**excluded,
                _ => return None,
            },
            RewriteRule::ComputedUserset(_) | RewriteRule::TupleToUserset(_) => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rule() -> RewriteRule {
        RewriteRule::Union(vec![
            RewriteRule::computed("owner"),
            RewriteRule::Exclusion(
                Box::new(RewriteRule::arrow("parent", "view")),
                Box::new(RewriteRule::computed("banned")),
            ),
        ])
    }

    #[test]
    fn root_path_finds_root() {
        let rule = sample_rule();

        assert_eq!(find_operation(&rule, &OperationPath::root()), Some(&rule));
    }

    #[test]
    fn nested_path_finds_exclusion_base() {
        let rule = sample_rule();
        let path = OperationPath::root().child(1).child(0);

        assert_eq!(
            find_operation(&rule, &path),
            Some(&RewriteRule::arrow("parent", "view"))
        );
    }

    #[test]
    fn out_of_range_index_returns_none() {
        let rule = sample_rule();

        assert_eq!(find_operation(&rule, &OperationPath::from(vec![5])), None);
        assert_eq!(find_operation(&rule, &OperationPath::from(vec![1, 2])), None);
    }

    #[test]
    fn path_through_leaf_returns_none() {
        let rule = sample_rule();

        assert_eq!(find_operation(&rule, &OperationPath::from(vec![0, 0])), None);
    }

    #[test]
    fn child_does_not_mutate_parent() {
        let parent = OperationPath::root().child(2);
        let child = parent.child(1);

        assert_eq!(parent.indices(), &[2]);
        assert_eq!(child.indices(), &[2, 1]);
        assert_eq!(child.to_string(), "[2.1]");
    }
}
