//! Error types for query derivation and binding.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Finder '{finder}' on kind '{kind}': unrecognized token '{token}'")]
    UnsupportedToken {
        kind: String,
        finder: String,
        token: String,
    },

    #[error("Finder '{finder}' must start with 'by_'")]
    BadFinderName { finder: String },

    #[error("Query declares {expected} positional parameter(s) but {got} were bound")]
    Arity { expected: usize, got: usize },

    #[error("Query placeholders must be contiguous $1..$n; ${missing} is missing")]
    NonContiguousPlaceholders { missing: usize },

    #[error("Unknown entity kind '{kind}'")]
    UnknownKind { kind: String },

    #[error("Kind '{kind}' is a relationship entity; finders target node kinds")]
    NotANodeKind { kind: String },

    #[error("Parameter conversion failed: {0}")]
    Convert(#[from] relish_core::ConvertError),
}
