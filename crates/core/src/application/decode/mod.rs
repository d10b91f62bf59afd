// Response decoding
//
// Replies are tried against each decoder in turn; the first success wins and
// a reply no decoder understands is handed back as raw text.

mod loose;
mod typed;

pub use loose::LooseDecoder;
pub use typed::TypedDecoder;

use crate::domain::Response;
use crate::port::{DecodeError, ResponseDecoder};
use serde_json::{Number, Value};
use tracing::warn;

/// Ordered decoder fallback chain
pub struct DecoderChain {
    decoders: Vec<Box<dyn ResponseDecoder>>,
}

impl DecoderChain {
    pub fn new(decoders: Vec<Box<dyn ResponseDecoder>>) -> Self {
        Self { decoders }
    }

    /// Strict grammar first, then the bracket-only decoder
    pub fn standard() -> Self {
        Self::new(vec![Box::new(TypedDecoder), Box::new(LooseDecoder)])
    }

    /// Never fails; degrades to [`Response::Raw`]
    pub fn decode(&self, raw: &str) -> Response {
        for decoder in &self.decoders {
            match decoder.decode(raw) {
                Ok(value) => return Response::Value(value),
                Err(e) => warn!(
                    decoder = decoder.name(),
                    error = %e,
                    "Failed to decode engine reply, falling back"
                ),
            }
        }
        Response::Raw(raw.to_string())
    }
}

impl Default for DecoderChain {
    fn default() -> Self {
        Self::standard()
    }
}

/// Byte cursor shared by both decoders
pub(crate) struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    pub(crate) fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Consume `byte` if it comes next (after whitespace)
    pub(crate) fn eat(&mut self, byte: u8) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, byte: u8) -> Result<(), DecodeError> {
        if self.eat(byte) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", byte as char)))
        }
    }

    pub(crate) fn error(&self, message: impl Into<String>) -> DecodeError {
        DecodeError::new(self.pos, message)
    }

    /// Double-quoted string with backslash escapes; cursor must be on the quote
    pub(crate) fn string(&mut self) -> Result<String, DecodeError> {
        let start = self.pos;
        let src = self.src;
        let mut out = String::new();
        let mut chars = src[start + 1..].char_indices();

        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos = start + 1 + i + 1;
                    return Ok(out);
                }
                '\\' => match chars.next() {
                    Some((_, escaped)) => out.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        'a' => '\u{07}',
                        'b' => '\u{08}',
                        'f' => '\u{0c}',
                        'v' => '\u{0b}',
                        other => other,
                    }),
                    None => break,
                },
                c => out.push(c),
            }
        }
        Err(DecodeError::new(start, "unterminated string"))
    }

    /// Consume bytes while `accept` holds and return them
    pub(crate) fn take_while(&mut self, accept: impl Fn(u8) -> bool) -> &'a str {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if accept(b)) {
            self.pos += 1;
        }
        &self.src[start..self.pos]
    }
}

/// Number literal as a JSON number; integers stay integers
pub(crate) fn parse_number(text: &str) -> Option<Number> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(Number::from(i));
    }
    let is_float_syntax = text
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'));
    if !is_float_syntax {
        return None;
    }
    text.parse::<f64>().ok().and_then(Number::from_f64)
}

/// `true`/`false`/number, otherwise the text itself
pub(crate) fn scalar(word: &str) -> Value {
    match word {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => parse_number(word)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(word.to_string())),
    }
}
