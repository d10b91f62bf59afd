// Engine reply as returned to callers

use serde_json::Value;
use std::fmt;

/// One reply of the engine
///
/// `Raw` is returned when decoding was disabled or every decoder failed.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Value(Value),
    Raw(String),
}

impl Response {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Response::Value(v) => Some(v),
            Response::Raw(_) => None,
        }
    }

    pub fn as_raw(&self) -> Option<&str> {
        match self {
            Response::Value(_) => None,
            Response::Raw(raw) => Some(raw),
        }
    }

    /// Raw text becomes a JSON string
    pub fn into_value(self) -> Value {
        match self {
            Response::Value(v) => v,
            Response::Raw(raw) => Value::String(raw),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Value(Value::String(s)) => f.write_str(s),
            Response::Value(v) => write!(f, "{}", v),
            Response::Raw(raw) => f.write_str(raw),
        }
    }
}
