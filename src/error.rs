//! Filter error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// Malformed RFC 4515 text.
    #[error("invalid filter string: {0}")]
    Parse(String),

    /// Malformed BER content (truncation, bad lengths, bad field order).
    #[error("invalid BER filter: {0}")]
    Ber(String),

    #[error("expected {context} tag 0x{expected:02x}, got 0x{found:02x}")]
    TagMismatch {
        context: &'static str,
        expected: u8,
        found: u8,
    },

    /// A node that cannot be built from the given fields.
    #[error("invalid filter: {0}")]
    Invalid(String),

    /// Evaluation of a match kind that needs a schema-aware evaluator.
    #[error("{0} match is not implemented")]
    NotImplemented(&'static str),
}

impl FilterError {
    pub(crate) fn parse(msg: impl Into<String>) -> Self {
        FilterError::Parse(msg.into())
    }

    pub(crate) fn ber(msg: impl Into<String>) -> Self {
        FilterError::Ber(msg.into())
    }

    /// True for failures caused by the input (text or binary), as opposed to
    /// construction or evaluation failures.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            FilterError::Parse(_) | FilterError::Ber(_) | FilterError::TagMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FilterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = FilterError::parse("unbalanced parens");
        assert_eq!(err.to_string(), "invalid filter string: unbalanced parens");
    }

    #[test]
    fn test_tag_mismatch_display() {
        let err = FilterError::TagMismatch {
            context: "and filter",
            expected: 0xa0,
            found: 0xa1,
        };
        assert_eq!(err.to_string(), "expected and filter tag 0xa0, got 0xa1");
    }

    #[test]
    fn test_not_implemented_display() {
        let err = FilterError::NotImplemented("approximate");
        assert_eq!(err.to_string(), "approximate match is not implemented");
        assert!(!err.is_malformed_input());
    }

    #[test]
    fn test_malformed_input_classification() {
        assert!(FilterError::parse("x").is_malformed_input());
        assert!(FilterError::ber("x").is_malformed_input());
        assert!(!FilterError::Invalid("x".to_string()).is_malformed_input());
    }
}
