//! Text-to-binary conversion.
//!
//! [`Schema::encode`] turns a whitespace-separated argument line into the
//! byte-exact record described by the schema. The three failure shapes are
//! kept distinct: a present-but-malformed value, too few values, or leftover
//! input, each with a caret-annotated echo of the offending line.

use crate::error::{annotate, CodecError};
use crate::schema::{FieldKind, Repeat, Schema};

/// Tokenizing cursor over an argument line. Tracks byte positions so error
/// messages can point at the offending token.
struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn skip_ws(&mut self) {
        let rest = &self.input[self.pos..];
        let trimmed = rest.trim_start();
        self.pos += rest.len() - trimmed.len();
    }

    fn at_end(&mut self) -> bool {
        self.skip_ws();
        self.pos >= self.input.len()
    }

    /// Next whitespace-delimited token and its starting byte offset.
    fn next_token(&mut self) -> Option<(usize, &'a str)> {
        if self.at_end() {
            return None;
        }
        let start = self.pos;
        let rest = &self.input[start..];
        let len = rest
            .find(|c: char| c.is_whitespace())
            .unwrap_or(rest.len());
        self.pos = start + len;
        Some((start, &rest[..len]))
    }

    /// Next word, honoring double-quoted spans. Quotes cannot nest; an
    /// unterminated quote is accepted only if it runs to the end of input.
    fn next_word(&mut self) -> Option<(usize, &'a str)> {
        if self.at_end() {
            return None;
        }
        let start = self.pos;
        let rest = &self.input[start..];
        if let Some(quoted) = rest.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => {
                    self.pos = start + 1 + end + 1;
                    Some((start, &quoted[..end]))
                }
                None => {
                    // Unterminated quote swallows the rest of the line.
                    self.pos = self.input.len();
                    Some((start, quoted))
                }
            }
        } else {
            self.next_token()
        }
    }

    /// Everything from the cursor to the end of input, trimmed, with one
    /// matching pair of outer quotes stripped. Consumes the input.
    fn take_remainder(&mut self) -> &'a str {
        let rest = self.input[self.pos..].trim();
        self.pos = self.input.len();
        if rest.len() >= 2 {
            let b = rest.as_bytes();
            let (first, last) = (b[0], b[b.len() - 1]);
            if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
                return &rest[1..rest.len() - 1];
            }
        }
        rest
    }
}

/// Parse an integer literal with the console radix rules: `0x` selects hex,
/// a leading `0` followed by more digits selects octal, a bare `0` is zero,
/// anything else is decimal. A sign forces decimal.
fn parse_int(token: &str) -> Option<i64> {
    let (negative, body) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token.strip_prefix('+').unwrap_or(token)),
    };
    if body.is_empty() {
        return None;
    }

    let magnitude = if negative || token.starts_with('+') {
        // Signed literals are always decimal.
        body.parse::<i64>().ok()?
    } else if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else if body.len() > 1 && body.starts_with('0') {
        i64::from_str_radix(&body[1..], 8).ok()?
    } else {
        body.parse::<i64>().ok()?
    };

    Some(if negative { -magnitude } else { magnitude })
}

/// Parse a boolean literal: yes/true/on/1 and no/false/off/0, any case.
fn parse_bool(token: &str) -> Option<bool> {
    match token.to_ascii_lowercase().as_str() {
        "yes" | "true" | "on" | "1" => Some(true),
        "no" | "false" | "off" | "0" => Some(false),
        _ => None,
    }
}

impl Schema {
    /// Encode a whitespace-separated argument line into a binary record.
    ///
    /// Exactly one value is consumed per field element; a trailing string
    /// field consumes the (trimmed) remainder of the line and receives an
    /// appended NUL. See [`CodecError`] for the three failure shapes.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>, CodecError> {
        self.require_valid()?;

        let mut cur = Cursor::new(text);
        let mut out = Vec::with_capacity(self.fixed_size() + 16);
        let mut arg = 0usize;

        for field in self.fields() {
            match field.kind {
                FieldKind::Str => {
                    let s = cur.take_remainder();
                    out.extend_from_slice(s.as_bytes());
                    out.push(0);
                }
                FieldKind::Word { optional } => {
                    let n = match field.repeat {
                        Repeat::Fixed(n) => n,
                        Repeat::Remainder => 1,
                    };
                    for _ in 0..n {
                        match cur.next_word() {
                            Some((_, word)) => {
                                out.extend_from_slice(word.as_bytes());
                                out.push(0);
                            }
                            None if optional => out.push(0),
                            None => return Err(self.not_enough(text)),
                        }
                        arg += 1;
                    }
                }
                kind => match field.repeat {
                    Repeat::Fixed(n) => {
                        for _ in 0..n {
                            self.encode_scalar(kind, &mut cur, &mut out, &mut arg, text)?;
                        }
                    }
                    Repeat::Remainder => {
                        while !cur.at_end() {
                            self.encode_scalar(kind, &mut cur, &mut out, &mut arg, text)?;
                        }
                    }
                },
            }
        }

        if !cur.at_end() {
            return Err(CodecError::TooManyArguments {
                format: self.format().to_string(),
                annotated: annotate(text, cur.pos),
            });
        }

        Ok(out)
    }

    fn encode_scalar(
        &self,
        kind: FieldKind,
        cur: &mut Cursor<'_>,
        out: &mut Vec<u8>,
        arg: &mut usize,
        text: &str,
    ) -> Result<(), CodecError> {
        let (start, token) = cur.next_token().ok_or_else(|| self.not_enough(text))?;

        let bad = |pos: usize| CodecError::Conversion {
            position: *arg,
            format: self.format().to_string(),
            annotated: annotate(text, pos),
        };

        match kind {
            FieldKind::Bool => {
                let v = parse_bool(token).ok_or_else(|| bad(start))?;
                out.push(v as u8);
            }
            FieldKind::Byte => {
                let v = parse_int(token).ok_or_else(|| bad(start))?;
                let v = u8::try_from(v).map_err(|_| bad(start))?;
                out.push(v);
            }
            FieldKind::Short => {
                let v = parse_int(token).ok_or_else(|| bad(start))?;
                let v = i16::try_from(v).map_err(|_| bad(start))?;
                out.extend_from_slice(&v.to_ne_bytes());
            }
            FieldKind::Int | FieldKind::Long => {
                let v = parse_int(token).ok_or_else(|| bad(start))?;
                let v = i32::try_from(v).map_err(|_| bad(start))?;
                out.extend_from_slice(&v.to_ne_bytes());
            }
            FieldKind::Int64 => {
                let v = parse_int(token).ok_or_else(|| bad(start))?;
                out.extend_from_slice(&v.to_ne_bytes());
            }
            FieldKind::Float => {
                let v: f32 = token.parse().map_err(|_| bad(start))?;
                out.extend_from_slice(&v.to_ne_bytes());
            }
            FieldKind::Double => {
                let v: f64 = token.parse().map_err(|_| bad(start))?;
                out.extend_from_slice(&v.to_ne_bytes());
            }
            FieldKind::Word { .. } | FieldKind::Str => unreachable!("handled by caller"),
        }

        *arg += 1;
        Ok(())
    }

    fn not_enough(&self, text: &str) -> CodecError {
        CodecError::NotEnoughArguments {
            format: self.format().to_string(),
            annotated: annotate(text, text.len()),
        }
    }
}
