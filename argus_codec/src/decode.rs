//! Binary-to-value conversion.
//!
//! The inverse of [`Schema::encode`]: a byte blob is split according to the
//! schema into typed [`Value`]s, or rendered back into a console line. Size
//! checking is strict: the blob must be consumed exactly, anything else is a
//! [`CodecError::SizeMismatch`].

use std::fmt;

use crate::error::CodecError;
use crate::schema::{FieldKind, Repeat, Schema};

/// One decoded field element.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Byte(u8),
    Short(i16),
    Int(i32),
    Float(f32),
    Double(f64),
    Int64(i64),
    /// Word or trailing string payload, NUL stripped.
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", *v as u8),
            Value::Byte(v) => write!(f, "{v}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v}"),
        }
    }
}

impl Schema {
    /// Decode a binary record into one [`Value`] per field element.
    ///
    /// The blob must match the schema exactly: a short or oversized buffer,
    /// or an unbounded tail whose byte count is not a multiple of the element
    /// width, yields [`CodecError::SizeMismatch`].
    pub fn decode_values(&self, data: &[u8]) -> Result<Vec<Value>, CodecError> {
        self.require_valid()?;

        let mismatch = || CodecError::SizeMismatch {
            expected: self.fixed_size(),
            actual: data.len(),
            format: self.format().to_string(),
        };

        let mut values = Vec::new();
        let mut pos = 0usize;

        for field in self.fields() {
            match field.kind {
                FieldKind::Str => {
                    // NUL-terminated; the terminator is the last byte we
                    // accept, trailing garbage is a size error.
                    let rest = &data[pos..];
                    let text_len = rest.iter().position(|&b| b == 0).ok_or_else(mismatch)?;
                    if text_len + 1 != rest.len() {
                        return Err(mismatch());
                    }
                    values.push(Value::Text(
                        String::from_utf8_lossy(&rest[..text_len]).into_owned(),
                    ));
                    pos = data.len();
                }
                FieldKind::Word { .. } => {
                    let n = match field.repeat {
                        Repeat::Fixed(n) => n,
                        Repeat::Remainder => 1,
                    };
                    for _ in 0..n {
                        let rest = &data[pos..];
                        let len = rest.iter().position(|&b| b == 0).ok_or_else(mismatch)?;
                        values.push(Value::Text(
                            String::from_utf8_lossy(&rest[..len]).into_owned(),
                        ));
                        pos += len + 1;
                    }
                }
                kind => {
                    let width = kind.width();
                    let count = match field.repeat {
                        Repeat::Fixed(n) => n,
                        Repeat::Remainder => {
                            let rest = data.len() - pos;
                            if rest % width != 0 {
                                return Err(mismatch());
                            }
                            rest / width
                        }
                    };
                    for _ in 0..count {
                        if pos + width > data.len() {
                            return Err(mismatch());
                        }
                        values.push(read_scalar(kind, &data[pos..pos + width]));
                        pos += width;
                    }
                }
            }
        }

        if pos != data.len() {
            return Err(mismatch());
        }

        Ok(values)
    }

    /// Decode a binary record into a console line, one space-prefixed token
    /// per element (the inverse presentation of [`Schema::encode`]).
    pub fn decode(&self, data: &[u8]) -> Result<String, CodecError> {
        let values = self.decode_values(data)?;
        let mut out = String::new();
        for v in values {
            out.push(' ');
            out.push_str(&v.to_string());
        }
        Ok(out)
    }
}

fn read_scalar(kind: FieldKind, bytes: &[u8]) -> Value {
    match kind {
        FieldKind::Bool => Value::Bool(bytes[0] != 0),
        FieldKind::Byte => Value::Byte(bytes[0]),
        FieldKind::Short => Value::Short(i16::from_ne_bytes(bytes.try_into().unwrap())),
        FieldKind::Int | FieldKind::Long => {
            Value::Int(i32::from_ne_bytes(bytes.try_into().unwrap()))
        }
        FieldKind::Float => Value::Float(f32::from_ne_bytes(bytes.try_into().unwrap())),
        FieldKind::Double => Value::Double(f64::from_ne_bytes(bytes.try_into().unwrap())),
        FieldKind::Int64 => Value::Int64(i64::from_ne_bytes(bytes.try_into().unwrap())),
        FieldKind::Word { .. } | FieldKind::Str => unreachable!("handled by caller"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_inverts_encode() {
        let s = Schema::compile("I:3;F:2;C", true);
        let blob = s.encode("1 2 3 4.5 6.25 hello").unwrap();
        let values = s.decode_values(&blob).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Int(1),
                Value::Int(2),
                Value::Int(3),
                Value::Float(4.5),
                Value::Float(6.25),
                Value::Text("hello".to_string()),
            ]
        );
        assert_eq!(s.decode(&blob).unwrap(), " 1 2 3 4.5 6.25 hello");
    }

    #[test]
    fn short_buffer_names_both_sizes() {
        let s = Schema::compile("I:1", true);
        let err = s.decode_values(&[0]).unwrap_err();
        match err {
            CodecError::SizeMismatch {
                expected, actual, ..
            } => {
                assert_eq!(expected, 4);
                assert_eq!(actual, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn oversized_buffer_is_rejected() {
        let s = Schema::compile("S:1", true);
        assert!(matches!(
            s.decode_values(&[0, 0, 0]),
            Err(CodecError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn unbounded_tail_takes_whole_multiples() {
        let s = Schema::compile("I:1;S", true);
        let v = s.decode_values(&[1, 0, 0, 0, 2, 0, 3, 0]).unwrap();
        assert_eq!(v, vec![Value::Int(1), Value::Short(2), Value::Short(3)]);

        // 5 tail bytes is not a whole number of i16.
        assert!(s.decode_values(&[1, 0, 0, 0, 2, 0, 3, 0, 9]).is_err());
    }

    #[test]
    fn words_split_on_nul() {
        let s = Schema::compile("W:2", false);
        let v = s.decode_values(b"alpha\0beta\0").unwrap();
        assert_eq!(
            v,
            vec![
                Value::Text("alpha".to_string()),
                Value::Text("beta".to_string())
            ]
        );
    }

    #[test]
    fn string_requires_terminator() {
        let s = Schema::compile("C", true);
        assert!(s.decode_values(b"no terminator").is_err());
        assert_eq!(
            s.decode_values(b"ok\0").unwrap(),
            vec![Value::Text("ok".to_string())]
        );
    }

    #[test]
    fn empty_schema_decodes_empty_blob_only() {
        let s = Schema::compile("", true);
        assert!(s.decode_values(&[]).unwrap().is_empty());
        assert!(s.decode_values(&[1]).is_err());
    }
}
