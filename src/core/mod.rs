// mod.rs - Core logic module

pub mod alignment;
pub mod classifier;
pub mod explain;
pub mod external;
pub mod forest;
pub mod model;
pub mod motifs;
pub mod orchestrator;
pub mod phylogeny;
pub mod projection;
pub mod scaler;

// Re-export main types for convenience
pub use alignment::{Alignment, AlignmentConfig, AlignmentEngine, AlignmentMethod, AlignmentOutcome};
pub use classifier::{ClassifierService, Confidence, Label, PredictionResult};
pub use explain::{ExampleExplanation, ExplainConfig, ExplainabilityEngine, GlobalExplanation};
pub use external::ExternalAligner;
pub use forest::{ForestConfig, ProbabilisticClassifier, RandomForest};
pub use model::{ModelStore, TrainedModel};
pub use motifs::{MotifHit, MotifScan, MotifScanner};
pub use orchestrator::{AnalysisOrchestrator, AnalysisResponse, OrchestratorConfig};
pub use phylogeny::{DistanceMatrix, PhylogeneticTree, PhylogenyEngine, PhylogenyResult};
pub use projection::{Embedding, ProjectionConfig, ProjectionEngine};
pub use scaler::StandardScaler;
