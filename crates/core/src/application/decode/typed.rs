// Strict decoder for engine values

use super::{parse_number, Cursor};
use crate::port::{DecodeError, ResponseDecoder};
use serde_json::{Map, Value};

/// Decodes the engine's value syntax and rejects anything else
///
/// | Engine text                     | Value                  |
/// |---------------------------------|------------------------|
/// | `true`, `false`                 | bool                   |
/// | `1`, `-2.5e3`                   | number                 |
/// | `"a\"b"`                        | string                 |
/// | `{1, 2}`, `(1, "a")`            | array                  |
/// | `NONE()` / `SOME(x)`            | null / x               |
/// | `record R a = 1, b = 2 end R;`  | object                 |
/// | `Modelica.Blocks`, `'q id'`     | string                 |
/// | empty reply                     | null                   |
pub struct TypedDecoder;

impl ResponseDecoder for TypedDecoder {
    fn name(&self) -> &'static str {
        "typed"
    }

    fn decode(&self, raw: &str) -> Result<Value, DecodeError> {
        let mut cursor = Cursor::new(raw);
        cursor.skip_whitespace();
        if cursor.at_end() {
            return Ok(Value::Null);
        }

        let value = value(&mut cursor)?;
        cursor.skip_whitespace();
        if !cursor.at_end() {
            return Err(cursor.error("unexpected trailing input"));
        }
        Ok(value)
    }
}

fn value(cursor: &mut Cursor<'_>) -> Result<Value, DecodeError> {
    cursor.skip_whitespace();
    match cursor.peek() {
        None => Err(cursor.error("unexpected end of input")),
        Some(b'"') => cursor.string().map(Value::String),
        Some(b'{') => sequence(cursor, b'{', b'}'),
        Some(b'(') => sequence(cursor, b'(', b')'),
        Some(b) if b == b'-' || b.is_ascii_digit() => number(cursor),
        Some(b) if is_ident_start(b) => word_value(cursor),
        Some(b) => Err(cursor.error(format!("unexpected character '{}'", b as char))),
    }
}

fn sequence(cursor: &mut Cursor<'_>, open: u8, close: u8) -> Result<Value, DecodeError> {
    cursor.expect(open)?;
    let mut items = Vec::new();
    if cursor.eat(close) {
        return Ok(Value::Array(items));
    }
    loop {
        items.push(value(cursor)?);
        if cursor.eat(close) {
            return Ok(Value::Array(items));
        }
        cursor.expect(b',')?;
    }
}

fn number(cursor: &mut Cursor<'_>) -> Result<Value, DecodeError> {
    let start = cursor.pos();
    let text = cursor.take_while(|b| {
        b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-')
    });
    parse_number(text)
        .map(Value::Number)
        .ok_or_else(|| DecodeError::new(start, format!("invalid number '{}'", text)))
}

fn word_value(cursor: &mut Cursor<'_>) -> Result<Value, DecodeError> {
    let start = cursor.pos();
    let word = identifier(cursor)?;
    match word.as_str() {
        "true" => Ok(Value::Bool(true)),
        "false" => Ok(Value::Bool(false)),
        "NONE" => {
            cursor.expect(b'(')?;
            cursor.expect(b')')?;
            Ok(Value::Null)
        }
        "SOME" => {
            cursor.expect(b'(')?;
            let inner = value(cursor)?;
            cursor.expect(b')')?;
            Ok(inner)
        }
        "record" => record(cursor),
        "end" => Err(DecodeError::new(start, "unexpected 'end'")),
        _ => Ok(Value::String(word)),
    }
}

/// `record Name field = value, ... end Name;`, cursor after the keyword
fn record(cursor: &mut Cursor<'_>) -> Result<Value, DecodeError> {
    let name = identifier(cursor)?;
    let mut fields = Map::new();

    loop {
        let field = identifier(cursor)?;
        if field == "end" {
            break;
        }
        cursor.expect(b'=')?;
        fields.insert(field, value(cursor)?);
        cursor.eat(b',');
    }

    let end_name = identifier(cursor)?;
    if end_name != name {
        return Err(cursor.error(format!(
            "record '{}' closed by 'end {}'",
            name, end_name
        )));
    }
    cursor.expect(b';')?;
    Ok(Value::Object(fields))
}

/// Dotted name, parts optionally single-quoted
fn identifier(cursor: &mut Cursor<'_>) -> Result<String, DecodeError> {
    cursor.skip_whitespace();
    let start = cursor.pos();
    let mut name = String::new();

    loop {
        if cursor.peek() == Some(b'\'') {
            cursor.eat(b'\'');
            let quoted = cursor.take_while(|b| b != b'\'');
            if !cursor.eat(b'\'') {
                return Err(DecodeError::new(start, "unterminated quoted identifier"));
            }
            name.push('\'');
            name.push_str(quoted);
            name.push('\'');
        } else {
            let part = cursor.take_while(|b| b.is_ascii_alphanumeric() || b == b'_');
            if part.is_empty() {
                return Err(cursor.error("expected identifier"));
            }
            name.push_str(part);
        }

        if cursor.peek() == Some(b'.') {
            cursor.eat(b'.');
            name.push('.');
        } else {
            return Ok(name);
        }
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'\''
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(raw: &str) -> Result<Value, DecodeError> {
        TypedDecoder.decode(raw)
    }

    #[test]
    fn test_scalars() {
        assert_eq!(decode("true\n").unwrap(), json!(true));
        assert_eq!(decode("-3").unwrap(), json!(-3));
        assert_eq!(decode("1.5e-3").unwrap(), json!(0.0015));
        assert_eq!(decode("\"1.22.0\"\n").unwrap(), json!("1.22.0"));
        assert_eq!(decode("").unwrap(), Value::Null);
        assert_eq!(decode("  \n").unwrap(), Value::Null);
    }

    #[test]
    fn test_collections() {
        assert_eq!(
            decode("{{1, 2}, {3}}").unwrap(),
            json!([[1, 2], [3]])
        );
        assert_eq!(decode("(true, \"x\")").unwrap(), json!([true, "x"]));
        assert_eq!(decode("{}").unwrap(), json!([]));
    }

    #[test]
    fn test_option_values() {
        assert_eq!(decode("NONE()").unwrap(), Value::Null);
        assert_eq!(decode("SOME({1})").unwrap(), json!([1]));
    }

    #[test]
    fn test_identifiers() {
        assert_eq!(
            decode("{Modelica.Blocks, 'a b'.c}").unwrap(),
            json!(["Modelica.Blocks", "'a b'.c"])
        );
    }

    #[test]
    fn test_record() {
        let raw = "record SimulationResult\n    resultFile = \"/tmp/M_res.mat\",\n    \
                   timeTotal = 0.5,\n    messages = \"\"\nend SimulationResult;\n";
        assert_eq!(
            decode(raw).unwrap(),
            json!({"resultFile": "/tmp/M_res.mat", "timeTotal": 0.5, "messages": ""})
        );
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(decode("{1, 2").is_err());
        assert!(decode("1 2").is_err());
        assert!(decode("record R a = 1 end S;").is_err());
        assert!(decode("a = 1").is_err());
        assert!(decode("\"open").is_err());
    }
}
