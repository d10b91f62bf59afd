// Response Decoder Port
// Turns the engine's textual reply into a structured value

use serde_json::Value;
use thiserror::Error;

/// Decoding failure at a byte offset of the reply
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} at offset {offset}")]
pub struct DecodeError {
    pub offset: usize,
    pub message: String,
}

impl DecodeError {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

/// Response decoder trait
///
/// Implementations:
/// - TypedDecoder: strict grammar of engine values
/// - LooseDecoder: bracket structure only, unknown tokens kept as text
pub trait ResponseDecoder: Send + Sync {
    /// Name used in fallback warnings
    fn name(&self) -> &'static str;

    fn decode(&self, raw: &str) -> Result<Value, DecodeError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;

    /// Decoder that rejects every reply
    pub struct FailingDecoder;

    impl ResponseDecoder for FailingDecoder {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn decode(&self, _raw: &str) -> Result<Value, DecodeError> {
            Err(DecodeError::new(0, "always fails"))
        }
    }
}
