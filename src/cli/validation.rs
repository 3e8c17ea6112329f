// validation.rs - Input validation utilities

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use crate::cli::merge::Settings;
use crate::core::{
    AlignmentConfig, AlignmentEngine, ExternalAligner, ForestConfig, OrchestratorConfig,
    ProjectionConfig,
};
use crate::core::external::{DEFAULT_PROGRAM, DEFAULT_TIMEOUT};
use crate::encoders::{EncoderRegistry, SequenceEncoder};
use crate::error::{AnalysisError, Result};

const FORMATS: &[&str] = &["tsv", "csv", "phylip", "nexus"];

pub struct ValidationResult {
    pub encoder: Arc<dyn SequenceEncoder>,
    pub model_path: PathBuf,
    pub data_dir: PathBuf,
    pub forest: ForestConfig,
    pub orchestrator: OrchestratorConfig,
    pub aligner: AlignmentEngine,
}

fn invalid(message: impl Into<String>) -> AnalysisError {
    AnalysisError::Config(message.into())
}

/// Validate merged settings and build the engine configurations
pub fn validate_settings(settings: &Settings) -> Result<ValidationResult> {
    let registry = EncoderRegistry::new();
    let encoder = registry.get_encoder(&settings.encoder).ok_or_else(|| {
        invalid(format!(
            "Invalid encoder '{}'. Available: {}",
            settings.encoder,
            registry.get_encoder_names().join(", ")
        ))
    })?;

    if settings.threads == Some(0) {
        return Err(invalid("Thread count must be at least 1"));
    }

    if !FORMATS.contains(&settings.format.to_lowercase().as_str()) {
        return Err(invalid(format!(
            "Unsupported output format: {}. Use: {}",
            settings.format,
            FORMATS.join(", ")
        )));
    }

    // Forest
    let mut forest = ForestConfig::default();
    if let Some(n) = settings.n_trees {
        if n == 0 {
            return Err(invalid("Number of trees must be at least 1"));
        }
        forest.n_estimators = n;
    }
    if let Some(depth) = settings.max_depth {
        if depth == 0 {
            return Err(invalid("Maximum depth must be at least 1"));
        }
        forest.max_depth = Some(depth);
    }
    if let Some(seed) = settings.seed {
        forest.seed = seed;
    }

    // Projection
    let mut projection = ProjectionConfig::default();
    if let Some(k) = settings.n_neighbors {
        if k < 2 {
            return Err(invalid("n_neighbors must be at least 2"));
        }
        projection.n_neighbors = k;
    }
    if let Some(min_dist) = settings.min_dist {
        if !min_dist.is_finite() || min_dist < 0.0 || min_dist > projection.spread {
            return Err(invalid(format!(
                "min_dist must be between 0.0 and {}",
                projection.spread
            )));
        }
        projection.min_dist = min_dist;
    }
    if let Some(epochs) = settings.n_epochs {
        if epochs == 0 {
            return Err(invalid("n_epochs must be at least 1"));
        }
        projection.n_epochs = Some(epochs);
    }
    if let Some(seed) = settings.seed {
        projection.seed = seed;
    }

    let mut orchestrator = OrchestratorConfig {
        projection,
        ..OrchestratorConfig::default()
    };
    if let Some(min_len) = settings.min_projection_length {
        orchestrator.min_projection_length = min_len;
    }

    // Alignment
    let flags = &settings.alignment;
    let alignment_config = if flags.match_score.is_some()
        || flags.mismatch_penalty.is_some()
        || flags.gap_open.is_some()
        || flags.gap_extend.is_some()
    {
        let base = match &flags.alignment_mode {
            Some(mode) => AlignmentConfig::from_mode(mode)?,
            None => AlignmentConfig::default(),
        };
        AlignmentConfig::custom(
            flags.match_score.unwrap_or(base.match_score),
            flags.mismatch_penalty.unwrap_or(base.mismatch_penalty),
            flags.gap_open.unwrap_or(base.gap_open),
            flags.gap_extend.unwrap_or(base.gap_extend),
        )
    } else {
        AlignmentConfig::from_mode(flags.alignment_mode.as_deref().unwrap_or("protein"))?
    };
    if alignment_config.gap_open < 0 || alignment_config.gap_extend < 0 {
        return Err(invalid("Gap penalties must be non-negative"));
    }

    let external = if flags.no_external {
        None
    } else {
        let timeout = match flags.aligner_timeout {
            Some(0) => return Err(invalid("Aligner timeout must be at least 1 second")),
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_TIMEOUT,
        };
        let program = flags.aligner.as_deref().unwrap_or(DEFAULT_PROGRAM);
        Some(ExternalAligner::new(program, timeout))
    };

    Ok(ValidationResult {
        encoder,
        model_path: PathBuf::from(&settings.model),
        data_dir: PathBuf::from(&settings.data_dir),
        forest,
        orchestrator,
        aligner: AlignmentEngine::new(alignment_config, external),
    })
}
