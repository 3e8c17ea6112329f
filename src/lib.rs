// lib.rs - bacscope library root

//! # bacscope - Bacteriocin detection and comparative analysis of protein sequences
//!
//! This library classifies short protein sequences as bacteriocins with a
//! random forest over composition and physicochemical features, and places
//! candidates next to known references for comparison.
//!
//! ## Features
//!
//! - **Classification**: 433-feature encoding, standardisation and a persisted forest
//! - **Projection**: 2D and 3D UMAP embeddings of references and candidates
//! - **Explainability**: exact TreeSHAP with a sampling fallback
//! - **Alignment**: Clustal Omega when installed, parasail star alignment otherwise
//! - **Phylogeny**: identity distances, UPGMA, Newick and dendrogram layout
//! - **Motifs**: catalogue of known bacteriocin sequence motifs
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bacscope::prelude::*;
//!
//! let encoder: Arc<dyn SequenceEncoder> = Arc::new(BacteriocinEncoder);
//! let store = Arc::new(
//!     ModelStore::new(Arc::clone(&encoder))
//!         .with_model_path("models/bacteriocin_model.lz4")
//!         .with_data_dir("data"),
//! );
//! let orchestrator = AnalysisOrchestrator::new(
//!     encoder,
//!     store,
//!     AlignmentEngine::default(),
//!     OrchestratorConfig::default(),
//! )?;
//!
//! let candidates = load_fasta(std::path::Path::new("candidates.fasta"), Origin::Candidate)?;
//! match orchestrator.classify(&candidates) {
//!     AnalysisResponse::Success { payload, .. } => {
//!         for p in payload {
//!             println!("{}\t{:?}\t{:.3}", p.sequence_id, p.label, p.probability);
//!         }
//!     }
//!     AnalysisResponse::Failure { message, .. } => eprintln!("{}", message),
//! }
//! # Ok::<(), bacscope::AnalysisError>(())
//! ```

// Re-export all main modules
pub mod cli;
pub mod core;
pub mod data;
pub mod encoders;
pub mod error;
pub mod output;

// Convenience prelude for common imports
pub mod prelude {
    pub use crate::core::{AlignmentConfig, AlignmentEngine, ExternalAligner};
    pub use crate::core::{AnalysisOrchestrator, AnalysisResponse, OrchestratorConfig};
    pub use crate::core::{ClassifierService, Label, PredictionResult};
    pub use crate::core::{ExplainabilityEngine, PhylogenyEngine, ProjectionEngine};
    pub use crate::core::{ForestConfig, ModelStore, MotifScanner};
    pub use crate::data::{load_fasta, Origin, Sequence};
    pub use crate::encoders::{BacteriocinEncoder, CompositionEncoder, SequenceEncoder};
    pub use crate::error::{AnalysisError, Result};
    pub use crate::output::{write_json, write_matrix, ChartSpec};
}

// Re-export main types at the root level for convenience
pub use core::{AnalysisOrchestrator, AnalysisResponse, ModelStore};
pub use data::{Origin, Sequence};
pub use error::{AnalysisError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn get_info() -> String {
    format!(
        "bacscope v{} - Bacteriocin detection and comparative sequence analysis",
        VERSION
    )
}
