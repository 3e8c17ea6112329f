// mod.rs - Data structures module

pub mod fasta;
pub mod sequence;

// Re-export main types for convenience
pub use fasta::load_fasta;
pub use sequence::{Origin, Sequence};
