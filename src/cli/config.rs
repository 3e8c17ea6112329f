// config.rs - Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;
use crate::error::{AnalysisError, Result};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    // Model
    pub model: Option<String>,
    pub data_dir: Option<String>,
    pub encoder: Option<String>,

    // Training
    pub n_trees: Option<usize>,
    pub max_depth: Option<usize>,
    pub seed: Option<u64>,

    // Projection
    pub min_projection_length: Option<usize>,
    pub n_neighbors: Option<usize>,
    pub min_dist: Option<f64>,
    pub n_epochs: Option<usize>,

    // Alignment
    pub alignment_mode: Option<String>,
    pub match_score: Option<i32>,
    pub mismatch_penalty: Option<i32>,
    pub gap_open: Option<i32>,
    pub gap_extend: Option<i32>,
    pub aligner: Option<String>,
    pub aligner_timeout: Option<u64>,
    pub no_external: Option<bool>,

    // Output and performance
    pub format: Option<String>,
    pub threads: Option<usize>,
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AnalysisError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| {
            AnalysisError::Config(format!("Failed to parse config file '{}': {}", path.display(), e))
        })?;

        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Generate a sample configuration file with comments
    pub fn generate_sample() -> String {
        r#"# bacscope.toml - Configuration file for bacscope
# Command line arguments will override these settings

# =============================================================================
# MODEL
# =============================================================================

# Persisted model; trained from data_dir when missing
model = "models/bacteriocin_model.lz4"

# Directory holding positive_datasets.fasta and negative_datasets.fasta
data_dir = "data"

# Feature encoder: bacpred (433 features), composition (420 features)
encoder = "bacpred"

# =============================================================================
# TRAINING
# =============================================================================

n_trees = 100
# max_depth = 20
seed = 42

# =============================================================================
# PROJECTION
# =============================================================================

# Sequences shorter than this are left out of the projection
min_projection_length = 5

n_neighbors = 15
min_dist = 0.1
# n_epochs = 500

# =============================================================================
# ALIGNMENT
# =============================================================================

# Alignment mode: protein, protein-strict, protein-permissive
alignment_mode = "protein"

# Custom alignment scores (overrides preset mode)
# match_score = 20
# mismatch_penalty = -10
# gap_open = 5
# gap_extend = 1

# External aligner and its timeout in seconds
aligner = "clustalo"
aligner_timeout = 120

# Always use the built-in star alignment
no_external = false

# =============================================================================
# OUTPUT AND PERFORMANCE
# =============================================================================

# Distance matrix format: tsv, csv, phylip, nexus
format = "tsv"

# Number of threads (omit for auto-detection)
# threads = 8
"#
        .to_string()
    }
}
