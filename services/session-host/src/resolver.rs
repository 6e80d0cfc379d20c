//! `#role` path resolution.
//!
//! `#` and `#context` resolve to the `context` binding. `#name.sub.path`
//! looks `name` up in the peer map first and then in the context bindings;
//! nested binding maps are descended segment by segment. A missing name is
//! an error naming that key, never a partial path.

use crate::context::{Binding, NodeContext};
use crate::error::PathError;
use crate::path::{ActorPath, PathResolver};

const CONTEXT_KEY: &str = "context";

/// Resolves `#`-queries against peers and context bindings.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleResolver;

impl PathResolver for RoleResolver {
    fn name(&self) -> &'static str {
        "role"
    }

    fn resolve(
        &self,
        _from: &ActorPath,
        query: &str,
        context: &NodeContext,
    ) -> Option<Result<ActorPath, PathError>> {
        let rest = query.strip_prefix('#')?;
        Some(resolve_symbolic(query, rest, context))
    }
}

fn resolve_symbolic(query: &str, rest: &str, context: &NodeContext) -> Result<ActorPath, PathError> {
    let mut parts = rest.split('.');
    let head = match parts.next() {
        Some("") | None => CONTEXT_KEY,
        Some(head) => head,
    };
    let unknown = |key: &str| PathError::UnknownName {
        query: query.to_string(),
        key: key.to_string(),
    };

    if let Some(peer) = context.peers.get(head) {
        return append(peer, parts);
    }

    let mut binding = context.bindings.get(head).ok_or_else(|| unknown(head))?;
    let mut key = head;
    loop {
        match binding {
            Binding::Path(path) => return append(path, parts),
            Binding::Map(map) => {
                let Some(next) = parts.next() else {
                    return Err(PathError::NotAPath {
                        query: query.to_string(),
                        key: key.to_string(),
                    });
                };
                binding = map.get(next).ok_or_else(|| unknown(next))?;
                key = next;
            }
        }
    }
}

fn append<'a>(
    path: &ActorPath,
    rest: impl Iterator<Item = &'a str>,
) -> Result<ActorPath, PathError> {
    let suffix: Vec<&str> = rest.collect();
    if suffix.is_empty() {
        Ok(path.clone())
    } else {
        path.join(&suffix.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use rstest::{fixture, rstest};

    fn path(s: &str) -> ActorPath {
        ActorPath::parse(s).unwrap()
    }

    #[fixture]
    fn context() -> NodeContext {
        let mut widgets = BTreeMap::new();
        widgets.insert("grid".to_string(), Binding::Path(path("a.path.to.the.grid")));

        let mut context = NodeContext::new()
            .with_binding("controller", path("a.path.to.the.controller"))
            .with_binding("view", path("a.path.to.the.view"))
            .with_binding("context", path("a.path.to.the.controller"))
            .with_binding("widgets", Binding::Map(widgets));
        context.ensure_role_resolver();
        context
    }

    #[rstest]
    #[case("#controller", "a.path.to.the.controller")]
    #[case("#view", "a.path.to.the.view")]
    #[case("#view.foo", "a.path.to.the.view.foo")]
    #[case("#", "a.path.to.the.controller")]
    #[case("#context", "a.path.to.the.controller")]
    #[case("#widgets.grid.cell", "a.path.to.the.grid.cell")]
    fn test_resolves_bindings(context: NodeContext, #[case] query: &str, #[case] expected: &str) {
        let from = path("com.example");
        assert_eq!(from.resolve(query, Some(&context)).unwrap().to_string(), expected);
    }

    #[rstest]
    fn test_peers_take_precedence(mut context: NodeContext) {
        context.peers.insert("view".to_string(), path("a.b.view"));
        let from = path("com.example");

        assert_eq!(from.resolve("#view", Some(&context)).unwrap(), path("a.b.view"));
        assert_eq!(
            from.resolve("#view.sub", Some(&context)).unwrap(),
            path("a.b.view.sub")
        );
    }

    #[rstest]
    #[case("#other.foo", "other")]
    #[case("#widgets.missing", "missing")]
    fn test_unknown_name_fails(context: NodeContext, #[case] query: &str, #[case] key: &str) {
        let err = path("com.example").resolve(query, Some(&context)).unwrap_err();
        assert_eq!(
            err,
            PathError::UnknownName {
                query: query.to_string(),
                key: key.to_string()
            }
        );
    }

    #[rstest]
    fn test_mapping_is_not_a_path(context: NodeContext) {
        let err = path("com.example").resolve("#widgets", Some(&context)).unwrap_err();
        assert!(matches!(err, PathError::NotAPath { .. }));
    }

    #[test]
    fn test_hash_without_resolver_fails() {
        let context = NodeContext::new();
        let err = path("com.example").resolve("#pippo", Some(&context)).unwrap_err();
        assert_eq!(err, PathError::NoResolver("#pippo".to_string()));
    }

    #[rstest]
    fn test_non_symbolic_queries_fall_through(context: NodeContext) {
        let from = path("com.example");
        assert_eq!(from.resolve(".child", Some(&context)).unwrap(), path("com.example.child"));
        assert_eq!(from.resolve("x.y", Some(&context)).unwrap(), path("x.y"));
    }
}
