//! Error types for comment construction.

use thiserror::Error;

/// Errors raised while rendering a tag mapping into a SQL comment.
///
/// These are local to comment construction and never carry partial state;
/// callers that cannot surface them should log and issue the statement
/// without a comment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommentError {
    /// Tag names must be lower-snake-case: `[a-z0-9_]`, with `.` and `-`
    /// permitted after the first character.
    #[error("invalid tag name `{0}`")]
    InvalidTagName(String),

    /// The tag value cannot be rendered into a SQL comment.
    #[error("invalid value for tag `{tag}`: {reason}")]
    InvalidTagValue {
        tag: String,
        reason: &'static str,
    },
}
