// Argument Model for compiled model executables
//
// Keys are unique and kept sorted so that the serialized command line is
// reproducible. The reserved `override` key holds a second-level map that is
// merged across calls instead of being replaced.

use crate::error::{AppError, Result};
use serde_json::Number;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Reserved key for variable substitutions
pub const OVERRIDE_KEY: &str = "override";

/// Key of the result-file argument
pub const RESULT_FILE_KEY: &str = "r";

/// Literal value of a single override entry
#[derive(Debug, Clone, PartialEq)]
pub enum OverrideValue {
    Text(String),
    Bool(bool),
    Number(Number),
}

impl OverrideValue {
    /// Render as the model executable expects it (`true`/`false`, plain numbers).
    ///
    /// Strings that denote a number or boolean literal are rendered as that literal.
    pub fn render(&self) -> String {
        match self {
            OverrideValue::Text(text) => match probe_literal(text) {
                Some(literal) => literal.render(),
                None => text.trim().to_string(),
            },
            OverrideValue::Bool(true) => "true".to_string(),
            OverrideValue::Bool(false) => "false".to_string(),
            OverrideValue::Number(n) => n.to_string(),
        }
    }
}

/// Best-effort literal detection for string input
fn probe_literal(text: &str) -> Option<OverrideValue> {
    let text = text.trim();
    match text {
        "true" | "True" => return Some(OverrideValue::Bool(true)),
        "false" | "False" => return Some(OverrideValue::Bool(false)),
        _ => {}
    }

    if let Ok(int) = text.parse::<i64>() {
        return Some(OverrideValue::Number(int.into()));
    }

    // f64 parsing also accepts "inf" and "NaN"; those stay strings
    let numeric = text.chars().any(|c| c.is_ascii_digit())
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if numeric {
        if let Some(n) = text.parse::<f64>().ok().and_then(Number::from_f64) {
            return Some(OverrideValue::Number(n));
        }
    }

    None
}

impl From<&str> for OverrideValue {
    fn from(value: &str) -> Self {
        OverrideValue::Text(value.to_string())
    }
}

impl From<String> for OverrideValue {
    fn from(value: String) -> Self {
        OverrideValue::Text(value)
    }
}

impl From<bool> for OverrideValue {
    fn from(value: bool) -> Self {
        OverrideValue::Bool(value)
    }
}

impl From<i32> for OverrideValue {
    fn from(value: i32) -> Self {
        OverrideValue::Number(value.into())
    }
}

impl From<i64> for OverrideValue {
    fn from(value: i64) -> Self {
        OverrideValue::Number(value.into())
    }
}

impl From<f64> for OverrideValue {
    fn from(value: f64) -> Self {
        match Number::from_f64(value) {
            Some(n) => OverrideValue::Number(n),
            None => OverrideValue::Text(value.to_string()),
        }
    }
}

/// Value handed to [`ArgumentSet::set`]
#[derive(Debug, Clone, PartialEq)]
pub enum ArgInput {
    /// Flag without value (`-key`)
    Flag,
    Text(String),
    Number(Number),
    /// Override entries; `None` removes the entry
    Override(Vec<(String, Option<OverrideValue>)>),
}

impl ArgInput {
    /// Build an override input from `(name, value)` pairs
    ///
    /// # Example
    /// ```text
    /// ArgInput::overrides([("a", Some(4.into())), ("b", None)])
    /// ```
    pub fn overrides<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<OverrideValue>)>,
        K: Into<String>,
    {
        ArgInput::Override(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<&str> for ArgInput {
    fn from(value: &str) -> Self {
        ArgInput::Text(value.to_string())
    }
}

impl From<String> for ArgInput {
    fn from(value: String) -> Self {
        ArgInput::Text(value)
    }
}

impl From<i32> for ArgInput {
    fn from(value: i32) -> Self {
        ArgInput::Number(value.into())
    }
}

impl From<i64> for ArgInput {
    fn from(value: i64) -> Self {
        ArgInput::Number(value.into())
    }
}

impl From<f64> for ArgInput {
    fn from(value: f64) -> Self {
        match Number::from_f64(value) {
            Some(n) => ArgInput::Number(n),
            None => ArgInput::Text(value.to_string()),
        }
    }
}

impl<T: Into<ArgInput>> From<Option<T>> for ArgInput {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ArgInput::Flag)
    }
}

/// Stored form of an argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Flag,
    Value(String),
}

impl ArgValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Flag => None,
            ArgValue::Value(v) => Some(v),
        }
    }
}

/// Command line arguments of a compiled model executable
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgumentSet {
    args: BTreeMap<String, ArgValue>,
    // name -> rendered "name=value"
    overrides: BTreeMap<String, String>,
}

impl ArgumentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one argument
    ///
    /// # Errors
    /// `AppError::InvalidArgument` for an empty key, a mapping on a key other than
    /// `override`, or a flag/number on `override`. Stored arguments stay untouched.
    pub fn set(&mut self, key: &str, value: impl Into<ArgInput>) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            return Err(AppError::InvalidArgument(
                "argument key must not be empty".to_string(),
            ));
        }

        let value = value.into();
        if key == OVERRIDE_KEY {
            return self.set_override(value);
        }

        let stored = match value {
            ArgInput::Flag => ArgValue::Flag,
            ArgInput::Text(text) => ArgValue::Value(text.trim().to_string()),
            ArgInput::Number(n) => ArgValue::Value(n.to_string()),
            ArgInput::Override(_) => {
                return Err(AppError::InvalidArgument(format!(
                    "mapping input is only possible for key '{}', not '{}'",
                    OVERRIDE_KEY, key
                )));
            }
        };

        if let Some(previous) = self.args.get(key) {
            warn!(
                key = %key,
                value = ?stored,
                previous = ?previous,
                "Overwriting model executable argument"
            );
        }
        self.args.insert(key.to_string(), stored);

        Ok(())
    }

    /// Set several arguments in order
    pub fn set_all<I, K, V>(&mut self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<ArgInput>,
    {
        for (key, value) in args {
            self.set(key.as_ref(), value)?;
        }
        Ok(())
    }

    fn set_override(&mut self, value: ArgInput) -> Result<()> {
        let entries = match value {
            ArgInput::Override(entries) => entries,
            ArgInput::Text(text) => parse_override_text(&text)?,
            other => {
                return Err(AppError::InvalidArgument(format!(
                    "invalid value for '{}': {:?}",
                    OVERRIDE_KEY, other
                )));
            }
        };

        // Validate everything before touching the stored map
        let mut checked = Vec::with_capacity(entries.len());
        for (name, value) in entries {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(AppError::InvalidArgument(format!(
                    "empty variable name in '{}'",
                    OVERRIDE_KEY
                )));
            }
            checked.push((name, value));
        }

        for (name, value) in checked {
            match value {
                None => match self.overrides.remove(&name) {
                    Some(previous) => {
                        info!(previous = %previous, "Removed model executable override argument")
                    }
                    None => debug!(name = %name, "Override to remove was not set"),
                },
                Some(value) => {
                    let rendered = format!("{}={}", name, value.render());
                    if let Some(previous) = self.overrides.get(&name) {
                        info!(
                            value = %rendered,
                            previous = %previous,
                            "Updating model executable override argument"
                        );
                    }
                    self.overrides.insert(name, rendered);
                }
            }
        }

        if self.overrides.is_empty() {
            self.args.remove(OVERRIDE_KEY);
        } else {
            let joined = self
                .overrides
                .values()
                .cloned()
                .collect::<Vec<_>>()
                .join(",");
            self.args
                .insert(OVERRIDE_KEY.to_string(), ArgValue::Value(joined));
        }

        Ok(())
    }

    /// Currently stored value, `None` if not set
    pub fn get(&self, key: &str) -> Option<&ArgValue> {
        self.args.get(key.trim())
    }

    /// Stored string value, `None` for flags and missing keys
    pub fn value(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ArgValue::as_str)
    }

    /// Live override entries as rendered `name=value`, sorted by name
    pub fn overrides(&self) -> impl Iterator<Item = &str> {
        self.overrides.values().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Command line tokens, sorted by key
    pub fn serialize(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|(key, value)| match value {
                ArgValue::Flag => format!("-{}", key),
                ArgValue::Value(v) => format!("-{}={}", key, v),
            })
            .collect()
    }
}

/// Parse `a=1,b=2` into override entries
fn parse_override_text(text: &str) -> Result<Vec<(String, Option<OverrideValue>)>> {
    text.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.split_once('=')
                .map(|(name, value)| (name.to_string(), Some(OverrideValue::from(value))))
                .ok_or_else(|| {
                    AppError::InvalidArgument(format!(
                        "invalid value for '{}': {}",
                        OVERRIDE_KEY, text
                    ))
                })
        })
        .collect()
}
