// mod.rs - Feature encoders module root

pub mod bacpred;
pub mod composition;
pub mod registry;
pub mod traits;

// Re-export main types for convenience
pub use bacpred::{BacteriocinEncoder, BACPRED_WIDTH};
pub use composition::{CompositionEncoder, AMINO_ACIDS, COMPOSITION_WIDTH};
pub use registry::EncoderRegistry;
pub use traits::{FeatureVector, SequenceEncoder};
