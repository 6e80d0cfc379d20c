//! Dotted actor paths.
//!
//! A path is a non-empty sequence of segments rendered as `a.b.c`. Paths
//! bound inside a session also carry a *base*: the path of the session root,
//! used to resolve `@`-queries. The base never takes part in equality.
//!
//! Query syntax understood by [`ActorPath::resolve`]:
//!
//! | Query        | Meaning                                  |
//! |--------------|------------------------------------------|
//! | `a.b`        | absolute path                            |
//! | `.x.y`       | relative to the resolving path           |
//! | `@` / `@x.y` | the base, or relative to it              |
//! | `#...`       | handled only by an installed resolver    |

use std::fmt::Debug;
use std::hash::{Hash, Hasher};

use crate::context::NodeContext;
use crate::error::PathError;

/// A dotted absolute path with an optional base.
#[derive(Clone)]
pub struct ActorPath {
    segments: Vec<String>,
    base: Option<Vec<String>>,
}

impl ActorPath {
    /// Parses an absolute dotted path.
    pub fn parse(s: &str) -> Result<Self, PathError> {
        Ok(Self {
            segments: split_segments(s)?,
            base: None,
        })
    }

    /// Builds a path from segments.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        Self::parse(&segments.join("."))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The last segment.
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// The base, if the path lives inside a session.
    pub fn base(&self) -> Option<ActorPath> {
        self.base.as_ref().map(|b| ActorPath {
            segments: b.clone(),
            base: Some(b.clone()),
        })
    }

    /// The same path, used as its own base.
    pub fn as_base(&self) -> ActorPath {
        ActorPath {
            segments: self.segments.clone(),
            base: Some(self.segments.clone()),
        }
    }

    /// The same path carrying `base`.
    pub fn with_base(&self, base: &ActorPath) -> ActorPath {
        ActorPath {
            segments: self.segments.clone(),
            base: Some(base.segments.clone()),
        }
    }

    /// The same path without a base.
    pub fn without_base(&self) -> ActorPath {
        ActorPath {
            segments: self.segments.clone(),
            base: None,
        }
    }

    /// A direct child. The base is inherited.
    pub fn child(&self, name: &str) -> Result<ActorPath, PathError> {
        self.join(name)
    }

    /// Appends a dotted suffix. The base is inherited.
    pub fn join(&self, suffix: &str) -> Result<ActorPath, PathError> {
        let mut segments = self.segments.clone();
        segments.extend(split_segments(suffix)?);
        Ok(ActorPath {
            segments,
            base: self.base.clone(),
        })
    }

    /// The parent path, `None` for single-segment paths.
    pub fn parent(&self) -> Option<ActorPath> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(ActorPath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
            base: self.base.clone(),
        })
    }

    /// True if `self` equals `other` or is one of its ancestors.
    pub fn contains(&self, other: &ActorPath) -> bool {
        other.segments.starts_with(&self.segments)
    }

    /// Resolves `query` from this path.
    ///
    /// Resolvers installed in `context` are consulted first; the built-in
    /// rules apply only when none of them handles the query.
    pub fn resolve(
        &self,
        query: &str,
        context: Option<&NodeContext>,
    ) -> Result<ActorPath, PathError> {
        if let Some(context) = context {
            for resolver in &context.resolvers {
                if let Some(resolved) = resolver.resolve(self, query, context) {
                    return resolved;
                }
            }
        }

        if query.starts_with('#') {
            return Err(PathError::NoResolver(query.to_string()));
        }
        if let Some(rest) = query.strip_prefix('@') {
            let base = self
                .base()
                .ok_or_else(|| PathError::NoBase(query.to_string()))?;
            return if rest.is_empty() {
                Ok(base)
            } else {
                base.join(rest)
            };
        }
        if let Some(rest) = query.strip_prefix('.') {
            return if rest.is_empty() {
                Ok(self.clone())
            } else {
                self.join(rest)
            };
        }

        let mut resolved = ActorPath::parse(query)?;
        resolved.base = self.base.clone();
        Ok(resolved)
    }
}

fn split_segments(s: &str) -> Result<Vec<String>, PathError> {
    if s.is_empty() {
        return Err(PathError::Empty);
    }
    s.split('.')
        .map(|segment| {
            let valid = !segment.is_empty()
                && !segment.starts_with(['#', '@'])
                && !segment.contains(char::is_whitespace);
            if valid {
                Ok(segment.to_string())
            } else {
                Err(PathError::InvalidSegment {
                    path: s.to_string(),
                    segment: segment.to_string(),
                })
            }
        })
        .collect()
}

impl PartialEq for ActorPath {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}

impl Eq for ActorPath {}

impl Hash for ActorPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.segments.hash(state);
    }
}

impl PartialOrd for ActorPath {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ActorPath {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.segments.cmp(&other.segments)
    }
}

impl std::fmt::Display for ActorPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl Debug for ActorPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.base {
            Some(base) => write!(f, "ActorPath({} @ {})", self, base.join(".")),
            None => write!(f, "ActorPath({})", self),
        }
    }
}

impl std::str::FromStr for ActorPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for ActorPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for ActorPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Extension point of path resolution.
///
/// A resolver returns `None` for queries it does not handle, letting the
/// next resolver (and finally the built-in rules) try.
pub trait PathResolver: Send + Sync + Debug {
    /// Name used to avoid installing the same resolver twice.
    fn name(&self) -> &'static str;

    fn resolve(
        &self,
        from: &ActorPath,
        query: &str,
        context: &NodeContext,
    ) -> Option<Result<ActorPath, PathError>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn session_member() -> ActorPath {
        let session = ActorPath::parse("pairwise.appservice.1").unwrap().as_base();
        session.child("server").unwrap()
    }

    #[rstest]
    #[case("a.b.c", "a.b.c")]
    #[case(".sub", "pairwise.appservice.1.server.sub")]
    #[case(".", "pairwise.appservice.1.server")]
    #[case("@", "pairwise.appservice.1")]
    #[case("@pairing_request", "pairwise.appservice.1.pairing_request")]
    #[case("@client.view", "pairwise.appservice.1.client.view")]
    fn test_base_rules(#[case] query: &str, #[case] expected: &str) {
        let resolved = session_member().resolve(query, None).unwrap();
        assert_eq!(resolved.to_string(), expected);
        assert_eq!(
            resolved.base().map(|b| b.to_string()).as_deref(),
            Some("pairwise.appservice.1")
        );
    }

    #[rstest]
    #[case("#pippo", PathError::NoResolver("#pippo".to_string()))]
    #[case("@pippo", PathError::NoBase("@pippo".to_string()))]
    fn test_unresolvable_without_context(#[case] query: &str, #[case] expected: PathError) {
        let path = ActorPath::parse("com.example").unwrap();
        assert_eq!(path.resolve(query, None), Err(expected));
    }

    #[rstest]
    #[case("")]
    #[case("a..b")]
    #[case("a.#b")]
    #[case("a.b c")]
    fn test_parse_rejects(#[case] input: &str) {
        assert!(ActorPath::parse(input).is_err());
    }

    #[test]
    fn test_equality_ignores_base() {
        let plain = ActorPath::parse("pairwise.appservice.1.server").unwrap();
        assert_eq!(plain, session_member());
        assert!(plain.base().is_none());
    }

    #[test]
    fn test_parent_and_contains() {
        let member = session_member();
        let session = member.parent().unwrap();
        assert_eq!(session.to_string(), "pairwise.appservice.1");
        assert!(session.contains(&member));
        assert!(!member.contains(&session));
        assert!(ActorPath::parse("root").unwrap().parent().is_none());
        assert_eq!(member.name(), "server");
    }

    #[test]
    fn test_serializes_as_string() {
        let path = session_member();
        let json = serde_json::to_value(&path).unwrap();
        assert_eq!(json, serde_json::json!("pairwise.appservice.1.server"));
        let back: ActorPath = serde_json::from_value(json).unwrap();
        assert_eq!(back, path);
    }
}
