//! Error taxonomy for the knowledge-base engine.
//!
//! Every fallible core operation returns [`KbError`]. Ownership failures and
//! missing records are deliberately collapsed into a single
//! [`KbError::NotFoundOrForbidden`] variant so callers cannot distinguish
//! "does not exist" from "belongs to someone else".

use thiserror::Error;

/// Whether an embedding failure happened on a single-text or batch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedContext {
    Single,
    Batch,
}

impl std::fmt::Display for EmbedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbedContext::Single => write!(f, "single"),
            EmbedContext::Batch => write!(f, "batch"),
        }
    }
}

#[derive(Debug, Error)]
pub enum KbError {
    /// The uploaded bytes could not be turned into text for the declared type.
    #[error("document parsing failed: {0}")]
    DocumentParsing(String),

    /// The embedding provider call failed, for a single or batch request.
    #[error("embedding generation failed ({context}): {message}")]
    EmbeddingGeneration {
        context: EmbedContext,
        message: String,
    },

    /// Two vectors of different lengths were compared. Data-integrity error;
    /// never coerced by padding or truncation.
    #[error("vector dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    /// The record is absent or owned by another user.
    #[error("knowledge base or document not found")]
    NotFoundOrForbidden,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored embedding could not be serialized or decoded.
    #[error("invalid vector encoding: {0}")]
    VectorFormat(#[from] serde_json::Error),

    /// Provider construction or configuration problem.
    #[error("embedding provider error: {0}")]
    Provider(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl KbError {
    /// Wrap any error into an [`KbError::EmbeddingGeneration`] with call context.
    pub fn embedding(context: EmbedContext, err: impl std::fmt::Display) -> Self {
        KbError::EmbeddingGeneration {
            context,
            message: err.to_string(),
        }
    }
}

pub type Result<T, E = KbError> = std::result::Result<T, E>;
