// error.rs - Error taxonomy shared by every analysis engine

use thiserror::Error;

/// Errors raised by the analysis core
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A single sequence could not be encoded; callers exclude it and continue
    #[error("Encoding skipped for sequence '{id}': {reason}")]
    EncodingSkipped { id: String, reason: String },

    /// No trained model is loaded and none could be trained on demand
    #[error("Model not ready: {0}")]
    ModelNotReady(String),

    /// Too few sequences for alignment or phylogeny
    #[error("{operation} requires at least {required} sequences, got {actual}")]
    InsufficientInput {
        operation: &'static str,
        required: usize,
        actual: usize,
    },

    /// Too few points to build a neighbour graph
    #[error("Projection requires at least {required} feature vectors, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// External tool missing or failing; recovered by a fallback
    #[error("External tool unavailable: {0}")]
    ExternalToolUnavailable(String),

    /// Aligned rows that violate the equal-length invariant
    #[error("Invalid alignment: {0}")]
    InvalidAlignment(String),

    #[error("Training failed: {0}")]
    Training(String),

    #[error("Failed to persist model: {0}")]
    Persistence(String),

    #[error("Attribution failed: {0}")]
    Attribution(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AnalysisError {
    /// Short machine-readable kind, used in failure responses
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::EncodingSkipped { .. } => "encoding_skipped",
            AnalysisError::ModelNotReady(_) => "model_not_ready",
            AnalysisError::InsufficientInput { .. } => "insufficient_input",
            AnalysisError::InsufficientData { .. } => "insufficient_data",
            AnalysisError::ExternalToolUnavailable(_) => "external_tool_unavailable",
            AnalysisError::InvalidAlignment(_) => "invalid_alignment",
            AnalysisError::Training(_) => "training",
            AnalysisError::Persistence(_) => "persistence",
            AnalysisError::Attribution(_) => "attribution",
            AnalysisError::Config(_) => "config",
            AnalysisError::Io(_) => "io",
            AnalysisError::Serialization(_) => "serialization",
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
