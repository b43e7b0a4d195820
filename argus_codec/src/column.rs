//! Bridge between wire records and external column files.
//!
//! Scientific file writers store numeric columns big-endian while the wire
//! carries native little-endian records, so the bridge reverses the byte
//! order of every multi-byte element. Console-only word fields have no
//! column representation at all.

use crate::error::CodecError;
use crate::schema::{FieldKind, Repeat, Schema};

/// Column descriptor for one field: external type code plus element count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    /// External column type code (`L`, `B`, `I`, `J`, `E`, `D`, `K`).
    pub code: char,
    /// Number of elements in the column.
    pub count: usize,
}

impl FieldKind {
    /// External column type code for this kind. Words and strings have no
    /// column form.
    fn column_code(self) -> Option<char> {
        match self {
            Self::Bool => Some('L'),
            Self::Byte => Some('B'),
            Self::Short => Some('I'),
            Self::Int | Self::Long => Some('J'),
            Self::Float => Some('E'),
            Self::Double => Some('D'),
            Self::Int64 => Some('K'),
            Self::Word { .. } | Self::Str => None,
        }
    }
}

impl Schema {
    /// Rewrite a wire record into column byte order.
    ///
    /// Every multi-byte numeric element has its bytes reversed; single-byte
    /// elements are copied verbatim; a trailing string is dropped (columns
    /// have fixed width, the string has none). Word fields make the schema
    /// unrepresentable and fail with [`CodecError::UnsupportedColumn`].
    pub fn to_column_layout(&self, src: &[u8]) -> Result<Vec<u8>, CodecError> {
        self.require_valid()?;

        let mut out = Vec::with_capacity(src.len());
        let mut pos = 0usize;

        let mismatch = || CodecError::SizeMismatch {
            expected: self.fixed_size(),
            actual: src.len(),
            format: self.format().to_string(),
        };

        for field in self.fields() {
            match field.kind {
                FieldKind::Str => {
                    // Consumes the rest of the record, emits nothing.
                    pos = src.len();
                }
                FieldKind::Word { .. } => {
                    return Err(CodecError::UnsupportedColumn {
                        format: self.format().to_string(),
                        reason: "word fields have no column layout".to_string(),
                    });
                }
                kind => {
                    let width = kind.width();
                    let count = match field.repeat {
                        Repeat::Fixed(n) => n,
                        Repeat::Remainder => {
                            let rest = src.len() - pos;
                            if rest % width != 0 {
                                return Err(mismatch());
                            }
                            rest / width
                        }
                    };
                    for _ in 0..count {
                        if pos + width > src.len() {
                            return Err(mismatch());
                        }
                        out.extend(src[pos..pos + width].iter().rev());
                        pos += width;
                    }
                }
            }
        }

        if pos != src.len() {
            return Err(mismatch());
        }

        Ok(out)
    }

    /// External column descriptors for this schema, one per numeric field,
    /// strings omitted. Word fields and unbounded tails have no fixed column
    /// count and fail with [`CodecError::UnsupportedColumn`].
    pub fn column_format(&self) -> Result<Vec<ColumnSpec>, CodecError> {
        self.require_valid()?;

        let mut out = Vec::with_capacity(self.fields().len());
        for field in self.fields() {
            if field.kind == FieldKind::Str {
                continue;
            }
            let code = field.kind.column_code().ok_or_else(|| {
                CodecError::UnsupportedColumn {
                    format: self.format().to_string(),
                    reason: "word fields have no column layout".to_string(),
                }
            })?;
            let count = match field.repeat {
                Repeat::Fixed(n) => n,
                Repeat::Remainder => {
                    return Err(CodecError::UnsupportedColumn {
                        format: self.format().to_string(),
                        reason: "unbounded tail has no column count".to_string(),
                    });
                }
            };
            out.push(ColumnSpec { code, count });
        }
        Ok(out)
    }

    /// Build a format string from external column descriptors such as
    /// `["10A", "2J", "E"]` (count defaults to 1). The reverse of
    /// [`Schema::column_format`], used when reading column files back.
    pub fn from_column_spec(columns: &[&str]) -> Result<String, CodecError> {
        let mut out = String::new();

        for col in columns {
            let trimmed = col.trim();
            let (digits, letter) = trimmed.split_at(
                trimmed
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(trimmed.len()),
            );

            let unsupported = || CodecError::UnsupportedColumn {
                format: trimmed.to_string(),
                reason: "unknown column descriptor".to_string(),
            };

            let mut letters = letter.chars();
            let code = letters.next().ok_or_else(unsupported)?;
            if letters.next().is_some() {
                return Err(unsupported());
            }

            let count: usize = if digits.is_empty() {
                1
            } else {
                digits.parse().map_err(|_| unsupported())?
            };

            let kind = match code {
                'A' | 'L' | 'B' => 'C',
                'J' => 'I',
                'I' => 'S',
                'K' => 'X',
                'E' => 'F',
                'D' => 'D',
                _ => return Err(unsupported()),
            };

            if !out.is_empty() {
                out.push(';');
            }
            out.push(kind);
            out.push(':');
            out.push_str(&count.to_string());
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    #[test]
    fn multi_byte_elements_are_reversed() {
        let s = Schema::compile("S:1;I:1", true);
        let src = [0x01, 0x02, 0x0a, 0x0b, 0x0c, 0x0d];
        let out = s.to_column_layout(&src).unwrap();
        assert_eq!(out, vec![0x02, 0x01, 0x0d, 0x0c, 0x0b, 0x0a]);
    }

    #[test]
    fn single_byte_elements_pass_through() {
        let s = Schema::compile("C:3", true);
        assert_eq!(s.to_column_layout(&[7, 8, 9]).unwrap(), vec![7, 8, 9]);
    }

    #[test]
    fn trailing_string_is_dropped() {
        let s = Schema::compile("I:1;C", true);
        let blob = s.encode("258 tail").unwrap();
        let out = s.to_column_layout(&blob).unwrap();
        assert_eq!(out, vec![0, 0, 1, 2]);
    }

    #[test]
    fn words_are_unrepresentable() {
        let s = Schema::compile("W:1", false);
        assert!(matches!(
            s.to_column_layout(b"x\0"),
            Err(CodecError::UnsupportedColumn { .. })
        ));
        assert!(s.column_format().is_err());
    }

    #[test]
    fn column_codes_and_counts() {
        let s = Schema::compile("B:1;C:2;S:3;I:4;L:5;F:6;D:7;X:8", true);
        let cols = s.column_format().unwrap();
        let rendered: Vec<(char, usize)> = cols.iter().map(|c| (c.code, c.count)).collect();
        assert_eq!(
            rendered,
            vec![
                ('L', 1),
                ('B', 2),
                ('I', 3),
                ('J', 4),
                ('J', 5),
                ('E', 6),
                ('D', 7),
                ('K', 8),
            ]
        );
    }

    #[test]
    fn unbounded_tail_has_no_column_count() {
        let s = Schema::compile("I:1;F", true);
        assert!(matches!(
            s.column_format(),
            Err(CodecError::UnsupportedColumn { .. })
        ));
    }

    #[test]
    fn column_spec_round_trips_to_format() {
        let fmt = Schema::from_column_spec(&["10A", "2J", "E", "3I", "K", "4D"]).unwrap();
        assert_eq!(fmt, "C:10;I:2;F:1;S:3;X:1;D:4");
        assert!(Schema::compile(&fmt, true).valid());
    }

    #[test]
    fn unknown_column_descriptor_is_rejected() {
        assert!(Schema::from_column_spec(&["2Q"]).is_err());
        assert!(Schema::from_column_spec(&["J2"]).is_err());
    }
}
