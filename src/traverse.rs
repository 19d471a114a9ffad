// Depth-first traversal and pruning rewrite of filter trees.

use crate::filter::Filter;

impl Filter {
    /// Visit every node depth-first, children before their parent.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Filter),
    {
        self.walk(&mut f);
    }

    fn walk<F>(&self, f: &mut F)
    where
        F: FnMut(&Filter),
    {
        for clause in self.clauses() {
            clause.walk(f);
        }
        f(self);
    }

    /// Rebuild the tree bottom-up. `f` sees each node after its children have
    /// been rewritten and returns the replacement, or `None` to prune it.
    ///
    /// A Not whose child is pruned is pruned too, as is an And/Or left with
    /// no clauses. That includes an And/Or that had none to begin with.
    pub fn map<F>(self, mut f: F) -> Option<Filter>
    where
        F: FnMut(Filter) -> Option<Filter>,
    {
        self.rewrite(&mut f)
    }

    fn rewrite<F>(self, f: &mut F) -> Option<Filter>
    where
        F: FnMut(Filter) -> Option<Filter>,
    {
        let node = match self {
            Filter::Not(inner) => Filter::Not(Box::new((*inner).rewrite(f)?)),
            Filter::And(clauses) => Filter::And(rewrite_clauses(clauses, f)?),
            Filter::Or(clauses) => Filter::Or(rewrite_clauses(clauses, f)?),
            leaf => leaf,
        };
        f(node)
    }

    /// Nesting depth; a leaf has depth 1.
    pub fn depth(&self) -> usize {
        1 + self.clauses().iter().map(Filter::depth).max().unwrap_or(0)
    }
}

fn rewrite_clauses<F>(clauses: Vec<Filter>, f: &mut F) -> Option<Vec<Filter>>
where
    F: FnMut(Filter) -> Option<Filter>,
{
    let kept: Vec<Filter> = clauses.into_iter().filter_map(|c| c.rewrite(f)).collect();
    (!kept.is_empty()).then_some(kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Filter {
        Filter::parse("(&(objectClass=person)(!(uid=admin))(|(cn=a*)(sn=b)))").unwrap()
    }

    #[test]
    fn test_for_each_order() {
        let mut seen = Vec::new();
        sample().for_each(|f| seen.push(f.kind().name()));
        assert_eq!(
            seen,
            vec![
                "EqualityFilter",
                "EqualityFilter",
                "NotFilter",
                "SubstringFilter",
                "EqualityFilter",
                "OrFilter",
                "AndFilter",
            ]
        );
    }

    #[test]
    fn test_map_identity() {
        let f = sample();
        assert_eq!(f.clone().map(Some), Some(f));
    }

    #[test]
    fn test_map_prunes_clauseless_and_or() {
        assert_eq!(Filter::and(vec![]).map(Some), None);
        assert_eq!(Filter::or(vec![]).map(Some), None);
        let f = Filter::and(vec![Filter::presence("cn").unwrap(), Filter::or(vec![])]);
        assert_eq!(f.map(Some), Some(Filter::and(vec![Filter::presence("cn").unwrap()])));
        assert_eq!(Filter::not(Filter::and(vec![])).map(Some), None);
    }

    #[test]
    fn test_map_rewrites_leaves() {
        let f = sample().map(|node| match node {
            Filter::Equality(mut ava) if ava.attribute == "uid" => {
                ava.attribute = "userid".to_string();
                Some(Filter::Equality(ava))
            }
            other => Some(other),
        });
        assert_eq!(
            f.unwrap().to_string(),
            "(&(objectClass=person)(!(userid=admin))(|(cn=a*)(sn=b)))"
        );
    }

    #[test]
    fn test_map_prunes_not() {
        let f = sample().map(|node| {
            let prune = node.attribute() == Some("uid");
            (!prune).then_some(node)
        });
        assert_eq!(
            f.unwrap().to_string(),
            "(&(objectClass=person)(|(cn=a*)(sn=b)))"
        );
    }

    #[test]
    fn test_map_prunes_emptied_or() {
        let f = sample().map(|node| {
            let prune = matches!(node.attribute(), Some("cn") | Some("sn"));
            (!prune).then_some(node)
        });
        assert_eq!(
            f.unwrap().to_string(),
            "(&(objectClass=person)(!(uid=admin)))"
        );
    }

    #[test]
    fn test_map_prunes_everything() {
        assert_eq!(sample().map(|node| node.attribute().is_none().then_some(node)), None);
    }

    #[test]
    fn test_depth() {
        assert_eq!(Filter::presence("cn").unwrap().depth(), 1);
        assert_eq!(Filter::and(vec![]).depth(), 1);
        assert_eq!(sample().depth(), 3);
    }
}
