//! Token-counting seam.
//!
//! The engine only sees [`TokenCounter`]; [`TiktokenCounter`] is the local
//! encoder backend shipped with the binary.

use std::fmt;

use tiktoken_rs::CoreBPE;
use tracing::warn;

use crate::classify;

/// Default model used when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o";
/// Encoding used when the model is not in tiktoken's model table.
pub const FALLBACK_ENCODING: &str = "cl100k_base";

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("failed to initialize tokenizer for '{model}': {message}")]
    Init { model: String, message: String },

    #[error("token counting failed: {0}")]
    Count(String),
}

/// Result of counting one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenCount {
    pub tokens: u64,
    /// `false` when the backend declined to count (e.g. non-text input).
    pub counted: bool,
}

/// Counts tokens for a file's bytes.
pub trait TokenCounter: Send + Sync {
    /// Model name attached to counted entries.
    fn model(&self) -> &str;

    fn count(&self, bytes: &[u8]) -> Result<TokenCount, TokenError>;
}

/// tiktoken-backed counter.
pub struct TiktokenCounter {
    bpe: CoreBPE,
    model: String,
}

impl fmt::Debug for TiktokenCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TiktokenCounter")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl TiktokenCounter {
    /// Resolve `model` through tiktoken's model table, falling back to
    /// `cl100k_base` (and reporting that as the model) when it is unknown.
    pub fn new(model: &str) -> Result<Self, TokenError> {
        let model = match model.trim() {
            "" => DEFAULT_MODEL.to_string(),
            m => m.to_lowercase(),
        };
        match tiktoken_rs::get_bpe_from_model(&model) {
            Ok(bpe) => Ok(Self { bpe, model }),
            Err(e) => {
                warn!(%model, error = %e, "unknown tokenizer model, falling back to cl100k_base");
                let bpe = tiktoken_rs::cl100k_base().map_err(|e| TokenError::Init {
                    model: FALLBACK_ENCODING.to_string(),
                    message: e.to_string(),
                })?;
                Ok(Self {
                    bpe,
                    model: FALLBACK_ENCODING.to_string(),
                })
            }
        }
    }
}

impl TokenCounter for TiktokenCounter {
    fn model(&self) -> &str {
        &self.model
    }

    fn count(&self, bytes: &[u8]) -> Result<TokenCount, TokenError> {
        if bytes.is_empty() {
            return Ok(TokenCount {
                tokens: 0,
                counted: true,
            });
        }
        if classify::is_binary(bytes, false) {
            return Ok(TokenCount::default());
        }
        let text = std::str::from_utf8(bytes).map_err(|e| TokenError::Count(e.to_string()))?;
        Ok(TokenCount {
            tokens: self.bpe.encode_ordinary(text).len() as u64,
            counted: true,
        })
    }
}
