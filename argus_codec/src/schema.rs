//! Format-string compilation.
//!
//! A schema is compiled once from a textual format string and is immutable
//! afterwards. The grammar is `TYPE[:COUNT][;TYPE[:COUNT]]*[;TYPE]` with
//! TYPE ∈ {B,C,S,I,L,F,D,X}, plus {O,W} when compiling in non-strict mode:
//!
//! | code | field            | wire width |
//! |------|------------------|------------|
//! | `B`  | bool             | 1 byte     |
//! | `C`  | byte             | 1 byte     |
//! | `S`  | short (i16)      | 2 bytes    |
//! | `I`  | int (i32)        | 4 bytes    |
//! | `L`  | long (i32)       | 4 bytes    |
//! | `F`  | float (f32)      | 4 bytes    |
//! | `D`  | double (f64)     | 8 bytes    |
//! | `X`  | long long (i64)  | 8 bytes    |
//! | `W`  | word (console)   | text + NUL |
//! | `O`  | optional word    | text + NUL |
//!
//! COUNT defaults to 1. A bare trailing numeric TYPE repeats for all
//! remaining input. A bare trailing `C` is a NUL-terminated string and must
//! be the physically last field; a string field anywhere else is a
//! compile-time rejection.
//!
//! Compilation never fails with an error value: a malformed format string
//! yields an *invalid* schema (probed via [`Schema::valid`]) and a warning
//! in the log, because callers test candidate formats speculatively.

use tracing::warn;

/// Scalar type of a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// `B` — boolean, 1 byte on the wire.
    Bool,
    /// `C:n` — raw byte(s).
    Byte,
    /// `S` — 16-bit signed integer.
    Short,
    /// `I` — 32-bit signed integer.
    Int,
    /// `L` — 32-bit signed integer (network "long").
    Long,
    /// `F` — 32-bit IEEE float.
    Float,
    /// `D` — 64-bit IEEE float.
    Double,
    /// `X` — 64-bit signed integer.
    Int64,
    /// `W`/`O` — console-only word; carries text + NUL on the wire but has
    /// no declared width. `optional` words may be omitted at end of input.
    Word {
        /// True for `O`, false for `W`.
        optional: bool,
    },
    /// Bare trailing `C` — NUL-terminated string, always physically last.
    Str,
}

impl FieldKind {
    /// Fixed wire width of one element, in bytes. Words and strings have no
    /// declared width and report 0.
    pub const fn width(self) -> usize {
        match self {
            Self::Bool | Self::Byte => 1,
            Self::Short => 2,
            Self::Int | Self::Long | Self::Float => 4,
            Self::Double | Self::Int64 => 8,
            Self::Word { .. } | Self::Str => 0,
        }
    }

    /// The format-grammar letter for this kind.
    pub const fn code(self) -> char {
        match self {
            Self::Bool => 'B',
            Self::Byte | Self::Str => 'C',
            Self::Short => 'S',
            Self::Int => 'I',
            Self::Long => 'L',
            Self::Float => 'F',
            Self::Double => 'D',
            Self::Int64 => 'X',
            Self::Word { optional: true } => 'O',
            Self::Word { optional: false } => 'W',
        }
    }
}

/// Element count of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    /// Exactly `n` elements.
    Fixed(usize),
    /// A bare trailing numeric type: as many elements as the remaining
    /// input (or remaining buffer) holds.
    Remainder,
}

/// One compiled field: scalar type, repeat count and cumulative byte offset
/// of its first element.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub kind: FieldKind,
    pub repeat: Repeat,
    /// Byte offset of this field within the fixed part of a record.
    pub offset: usize,
}

impl Field {
    /// Total fixed wire width of this field, 0 for variable-length fields.
    pub fn fixed_width(&self) -> usize {
        match self.repeat {
            Repeat::Fixed(n) => self.kind.width() * n,
            Repeat::Remainder => 0,
        }
    }
}

/// A compiled, immutable format description.
///
/// Invariants: a schema is *valid* iff its format string compiled cleanly
/// (the empty format "" compiles to a valid schema with no fields); it is
/// *empty* iff it is valid and has no fields. Operations on an invalid
/// schema return [`CodecError::InvalidSchema`](crate::CodecError).
#[derive(Debug, Clone)]
pub struct Schema {
    format: String,
    fields: Vec<Field>,
    valid: bool,
}

impl Schema {
    /// Compile `fmt` into a schema. Whitespace in the format string is
    /// ignored. With `strict` set, the console-only word types `O` and `W`
    /// are rejected (services use strict formats, commands need not).
    ///
    /// On any malformed token this logs a warning and returns an invalid
    /// schema — it never panics or returns an error value.
    pub fn compile(fmt: &str, strict: bool) -> Self {
        let cleaned: String = fmt.chars().filter(|c| !c.is_whitespace()).collect();

        match Self::parse(&cleaned, strict) {
            Ok(fields) => Self {
                format: cleaned,
                fields,
                valid: true,
            },
            Err(reason) => {
                warn!(format = %cleaned, %reason, "format string rejected");
                Self {
                    format: cleaned,
                    fields: Vec::new(),
                    valid: false,
                }
            }
        }
    }

    fn parse(cleaned: &str, strict: bool) -> Result<Vec<Field>, String> {
        let mut fields: Vec<(FieldKind, Option<usize>)> = Vec::new();

        if !cleaned.is_empty() {
            for token in cleaned.split(';') {
                if token.is_empty() {
                    return Err("empty token".to_string());
                }

                if let Some((kind, _)) = fields.last() {
                    if *kind == FieldKind::Str {
                        return Err("string field must be the last field".to_string());
                    }
                }

                let (kind, count) = Self::parse_token(token, strict)?;
                fields.push((kind, count));
            }
        }

        // Resolve repeat counts: a count-less token is one element, except
        // for the trailing field where it means "repeat for all remaining".
        let last = fields.len().wrapping_sub(1);
        let mut out = Vec::with_capacity(fields.len());
        let mut offset = 0usize;

        for (idx, (kind, count)) in fields.into_iter().enumerate() {
            let repeat = match (count, kind) {
                (Some(n), _) => Repeat::Fixed(n),
                (None, FieldKind::Str) => Repeat::Fixed(1),
                (None, FieldKind::Word { .. }) => Repeat::Fixed(1),
                (None, _) if idx == last => Repeat::Remainder,
                (None, _) => Repeat::Fixed(1),
            };

            let field = Field {
                kind,
                repeat,
                offset,
            };
            offset += field.fixed_width();
            out.push(field);
        }

        Ok(out)
    }

    fn parse_token(token: &str, strict: bool) -> Result<(FieldKind, Option<usize>), String> {
        let mut chars = token.chars();
        let letter = chars.next().ok_or_else(|| "empty token".to_string())?;
        let rest = chars.as_str();

        let count = if rest.is_empty() {
            None
        } else {
            let digits = rest
                .strip_prefix(':')
                .ok_or_else(|| format!("wrong format token '{token}'"))?;
            if digits.is_empty() || digits.starts_with('0') {
                return Err(format!("wrong count in token '{token}'"));
            }
            let n: usize = digits
                .parse()
                .map_err(|_| format!("wrong count in token '{token}'"))?;
            Some(n)
        };

        // A bare C denotes the trailing NUL-terminated string.
        if letter == 'C' && count.is_none() {
            return Ok((FieldKind::Str, None));
        }

        let kind = match letter {
            'B' => FieldKind::Bool,
            'C' => FieldKind::Byte,
            'S' => FieldKind::Short,
            'I' => FieldKind::Int,
            'L' => FieldKind::Long,
            'F' => FieldKind::Float,
            'D' => FieldKind::Double,
            'X' => FieldKind::Int64,
            'O' | 'W' if strict => {
                return Err(format!("type '{letter}' not allowed in strict mode"));
            }
            'O' => FieldKind::Word { optional: true },
            'W' => FieldKind::Word { optional: false },
            _ => return Err(format!("unknown type '{letter}'")),
        };

        Ok((kind, count))
    }

    /// Whether the format string compiled cleanly.
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Whether this is the (valid) empty format "".
    pub fn empty(&self) -> bool {
        self.valid && self.fields.is_empty()
    }

    /// The cleaned format string this schema was compiled from.
    pub fn format(&self) -> &str {
        &self.format
    }

    /// The compiled fields, in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Total byte size of the fixed part of a record. Trailing strings,
    /// words and unbounded tails contribute nothing.
    pub fn fixed_size(&self) -> usize {
        self.fields.iter().map(Field::fixed_width).sum()
    }

    /// Whether any field has a variable wire length (string, word or
    /// unbounded numeric tail), i.e. the record size is not fully
    /// determined by the schema alone.
    pub fn has_variable_tail(&self) -> bool {
        self.fields
            .iter()
            .any(|f| f.kind.width() == 0 || f.repeat == Repeat::Remainder)
    }

    pub(crate) fn require_valid(&self) -> Result<(), crate::CodecError> {
        if self.valid {
            Ok(())
        } else {
            Err(crate::CodecError::InvalidSchema {
                format: self.format.clone(),
            })
        }
    }
}

// The wire layout relies on the usual scalar widths.
static_assertions::const_assert_eq!(std::mem::size_of::<f32>(), 4);
static_assertions::const_assert_eq!(std::mem::size_of::<f64>(), 8);
static_assertions::const_assert_eq!(std::mem::size_of::<i16>(), 2);
static_assertions::const_assert_eq!(std::mem::size_of::<i64>(), 8);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_format_is_valid_and_empty() {
        let s = Schema::compile("", true);
        assert!(s.valid());
        assert!(s.empty());
        assert_eq!(s.fixed_size(), 0);
    }

    #[test]
    fn non_empty_schema_is_valid_not_empty() {
        let s = Schema::compile("I:1", true);
        assert!(s.valid());
        assert!(!s.empty());
        assert_eq!(s.fixed_size(), 4);
    }

    #[test]
    fn offsets_are_cumulative() {
        let s = Schema::compile("I:3;F:2;C", true);
        assert!(s.valid());
        let f = s.fields();
        assert_eq!(f.len(), 3);
        assert_eq!(f[0].offset, 0);
        assert_eq!(f[1].offset, 12);
        assert_eq!(f[2].offset, 20);
        assert_eq!(f[2].kind, FieldKind::Str);
        assert_eq!(s.fixed_size(), 20);
    }

    #[test]
    fn whitespace_is_cleaned() {
        let s = Schema::compile(" I:2 ; D ", true);
        assert!(s.valid());
        assert_eq!(s.format(), "I:2;D");
    }

    #[test]
    fn bare_trailing_numeric_repeats() {
        let s = Schema::compile("I:2;F", true);
        assert_eq!(s.fields()[1].repeat, Repeat::Remainder);
        assert!(s.has_variable_tail());
    }

    #[test]
    fn bare_non_trailing_numeric_is_one() {
        let s = Schema::compile("I;F:2", true);
        assert!(s.valid());
        assert_eq!(s.fields()[0].repeat, Repeat::Fixed(1));
    }

    #[test]
    fn string_must_be_last() {
        assert!(!Schema::compile("C;I:2", true).valid());
        assert!(Schema::compile("I:2;C", true).valid());
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert!(!Schema::compile("Q:1", true).valid());
        assert!(!Schema::compile("I:0", true).valid());
        assert!(!Schema::compile("I:-2", true).valid());
        assert!(!Schema::compile("I;;F", true).valid());
        assert!(!Schema::compile("I4", true).valid());
    }

    #[test]
    fn words_only_in_non_strict_mode() {
        assert!(!Schema::compile("W:1", true).valid());
        assert!(Schema::compile("W:1", false).valid());
        assert!(Schema::compile("I:1;O", false).valid());
    }

    #[test]
    fn long_is_four_bytes() {
        let s = Schema::compile("L:2", true);
        assert_eq!(s.fixed_size(), 8);
    }
}
