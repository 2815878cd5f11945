//! Token Counter
//!
//! Deterministic text-to-token-count mapping under a fixed BPE encoding
//! chosen at startup.

use std::fmt;
use std::sync::Arc;

use sdk::errors::EngineError;
use tiktoken_rs::CoreBPE;

/// Encodings that can be selected in `[context] encoding`
pub const SUPPORTED_ENCODINGS: &[&str] = &["cl100k_base", "o200k_base"];

/// Counts tokens for budget accounting.
///
/// Cloning is cheap; the BPE tables are shared.
#[derive(Clone)]
pub struct TokenCounter {
    encoding: String,
    bpe: Arc<CoreBPE>,
}

impl TokenCounter {
    /// Build a counter for the named encoding.
    pub fn new(encoding: &str) -> Result<Self, EngineError> {
        let bpe = match encoding {
            "cl100k_base" => tiktoken_rs::cl100k_base(),
            "o200k_base" => tiktoken_rs::o200k_base(),
            other => {
                return Err(EngineError::Config(format!(
                    "Unknown token encoding '{}'. Must be one of: {}",
                    other,
                    SUPPORTED_ENCODINGS.join(", ")
                )))
            }
        }
        .map_err(|e| EngineError::Config(format!("Failed to load encoding {}: {}", encoding, e)))?;

        Ok(Self {
            encoding: encoding.to_string(),
            bpe: Arc::new(bpe),
        })
    }

    /// Counter with the default `cl100k_base` encoding.
    pub fn cl100k() -> Result<Self, EngineError> {
        Self::new("cl100k_base")
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    /// Number of tokens in `text`. Special-token markup is counted as plain text.
    pub fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.bpe.encode_ordinary(text).len()
    }
}

impl fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCounter")
            .field("encoding", &self.encoding)
            .finish()
    }
}
