//! Codec error types.
//!
//! Compilation of a format string is deliberately *not* represented here:
//! callers probe compiled schemas speculatively, so [`crate::Schema::compile`]
//! reports failure through `valid()`/`empty()` plus a log line instead of an
//! error value. Everything that happens at runtime — text conversion, binary
//! decoding, column bridging — surfaces as a [`CodecError`].

use thiserror::Error;

/// Runtime errors raised by the codec.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// A value was present in the input but had the wrong shape for its field
    /// (e.g. `5.5` for an integer). `annotated` echoes the offending input
    /// with a caret under the bad token.
    #[error("error converting argument at position {position} [fmt={format}]\n{annotated}")]
    Conversion {
        /// Zero-based index of the argument that failed to convert.
        position: usize,
        /// The cleaned format string of the schema.
        format: String,
        /// The input line followed by a caret marking the failure.
        annotated: String,
    },

    /// Input was exhausted before every field received a value.
    #[error("not enough arguments [fmt={format}]\n{annotated}")]
    NotEnoughArguments { format: String, annotated: String },

    /// Well-formed input remained after all fields were consumed.
    #[error("more arguments than expected [fmt={format}]\n{annotated}")]
    TooManyArguments { format: String, annotated: String },

    /// A binary blob's size is inconsistent with its schema.
    #[error("data block size ({actual}) doesn't fit format description [fmt={format}|size={expected}]")]
    SizeMismatch {
        /// Byte size the schema describes.
        expected: usize,
        /// Byte size actually supplied.
        actual: usize,
        format: String,
    },

    /// An encode/decode operation was attempted on a schema whose
    /// compilation failed.
    #[error("compiled format [fmt={format}] is invalid")]
    InvalidSchema { format: String },

    /// The schema cannot be expressed in the external column layout
    /// (e.g. it contains console-only word fields or an unbounded tail).
    #[error("format [fmt={format}] has no column layout: {reason}")]
    UnsupportedColumn { format: String, reason: String },
}

/// Build the `input + caret` annotation used by the conversion errors.
///
/// `column` is a byte offset into `input`; the caret is placed underneath it.
pub(crate) fn annotate(input: &str, column: usize) -> String {
    let mut out = String::with_capacity(input.len() + column + 2);
    out.push_str(input);
    out.push('\n');
    for _ in 0..column {
        out.push(' ');
    }
    out.push('^');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotate_places_caret() {
        let a = annotate("1 2 x", 4);
        assert_eq!(a, "1 2 x\n    ^");
    }

    #[test]
    fn size_mismatch_names_both_sizes() {
        let err = CodecError::SizeMismatch {
            expected: 4,
            actual: 1,
            format: "I:1".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("(1)"));
        assert!(msg.contains("size=4"));
        assert!(msg.contains("fmt=I:1"));
    }
}
