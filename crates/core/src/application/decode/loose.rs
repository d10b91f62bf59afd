// Lenient decoder: bracket structure only

use super::{scalar, Cursor};
use crate::port::{DecodeError, ResponseDecoder};
use serde_json::Value;

/// Keeps `{}`/`()` nesting and strings, turns every other token into a scalar
///
/// Fails only on unbalanced brackets or an unterminated string. Several
/// top-level items become an array.
pub struct LooseDecoder;

impl ResponseDecoder for LooseDecoder {
    fn name(&self) -> &'static str {
        "loose"
    }

    fn decode(&self, raw: &str) -> Result<Value, DecodeError> {
        let mut cursor = Cursor::new(raw);
        let mut items = items(&mut cursor, None)?;

        Ok(match items.len() {
            0 => Value::Null,
            1 => items.remove(0),
            _ => Value::Array(items),
        })
    }
}

/// Items up to `close`, or to the end of input when `close` is `None`
fn items(cursor: &mut Cursor<'_>, close: Option<u8>) -> Result<Vec<Value>, DecodeError> {
    let mut items = Vec::new();
    loop {
        cursor.skip_whitespace();
        match cursor.peek() {
            None => {
                return match close {
                    None => Ok(items),
                    Some(c) => Err(cursor.error(format!("missing '{}'", c as char))),
                }
            }
            Some(b) if Some(b) == close => {
                cursor.eat(b);
                return Ok(items);
            }
            Some(b'}') | Some(b')') => return Err(cursor.error("unbalanced closing bracket")),
            Some(b',') => {
                cursor.eat(b',');
            }
            Some(b'"') => items.push(Value::String(cursor.string()?)),
            Some(b'{') => {
                cursor.eat(b'{');
                items.push(Value::Array(self::items(cursor, Some(b'}'))?));
            }
            Some(b'(') => {
                cursor.eat(b'(');
                items.push(Value::Array(self::items(cursor, Some(b')'))?));
            }
            Some(_) => {
                let word = cursor.take_while(|b| {
                    !b.is_ascii_whitespace() && !matches!(b, b',' | b'{' | b'}' | b'(' | b')' | b'"')
                });
                items.push(scalar(word));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(raw: &str) -> Result<Value, DecodeError> {
        LooseDecoder.decode(raw)
    }

    #[test]
    fn test_keeps_unknown_tokens() {
        assert_eq!(
            decode("{x := 1.5, \"s\"}").unwrap(),
            json!(["x", ":=", 1.5, "s"])
        );
        assert_eq!(decode("Error: something").unwrap(), json!(["Error:", "something"]));
    }

    #[test]
    fn test_single_and_empty() {
        assert_eq!(decode("42").unwrap(), json!(42));
        assert_eq!(decode("").unwrap(), Value::Null);
        assert_eq!(decode("(a, {b, false})").unwrap(), json!(["a", ["b", false]]));
    }

    #[test]
    fn test_unbalanced() {
        assert!(decode("{a, (b}").is_err());
        assert!(decode("a}").is_err());
        assert!(decode("{a").is_err());
        assert!(decode("\"open").is_err());
    }
}
