use thiserror::Error;

/// Why a string did not parse as an id.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("empty id")]
    Empty,

    /// A prefixed id of another kind, or no prefix at all.
    #[error("{input:?} is not a `{kind}` id")]
    WrongKind { kind: &'static str, input: String },

    /// Right kind, unparseable body.
    #[error("malformed id {input:?}: {reason}")]
    Malformed { input: String, reason: String },
}

impl IdError {
    pub(crate) fn malformed(input: &str, reason: impl ToString) -> Self {
        IdError::Malformed {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Splits `{prefix}_{ulid}` and checks the prefix.
#[doc(hidden)]
pub fn parse_prefixed(s: &str, prefix: &'static str) -> Result<ulid::Ulid, IdError> {
    if s.is_empty() {
        return Err(IdError::Empty);
    }
    match s.split_once('_') {
        Some((found, body)) if found == prefix => {
            body.parse().map_err(|e| IdError::malformed(s, e))
        }
        _ => Err(IdError::WrongKind {
            kind: prefix,
            input: s.to_string(),
        }),
    }
}

/// Parses the decimal wire form of a counter id.
pub(crate) fn parse_counter(s: &str) -> Result<u64, IdError> {
    if s.is_empty() {
        return Err(IdError::Empty);
    }
    s.parse().map_err(|e| IdError::malformed(s, e))
}
