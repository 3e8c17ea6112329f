// traits.rs - Core traits and types for the feature encoding system

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use crate::data::Sequence;
use crate::error::{AnalysisError, Result};

/// Fixed-order numeric encoding of one sequence
///
/// Ordering matches `SequenceEncoder::feature_names()` 1:1. Never mutated
/// after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

/// Trait for sequence-to-feature encoders
///
/// Implementations are pure: the same residue string always yields the same
/// vector. They are injected into the classifier, model store and
/// orchestrator instead of living in process-wide state.
pub trait SequenceEncoder: Send + Sync + Debug {
    /// Encode an upper-cased residue string; never fails
    fn encode(&self, residues: &str) -> FeatureVector;

    /// Feature names in output order
    fn feature_names(&self) -> Vec<String>;

    /// Get a short registry name for this encoder
    fn name(&self) -> &'static str;

    /// Get a description of this encoder
    fn description(&self) -> &'static str;

    /// Raw output width
    fn width(&self) -> usize {
        self.feature_names().len()
    }

    /// Validate that a sequence can be encoded in a batch
    ///
    /// Letters outside the 20 standard residues are tolerated (they simply
    /// contribute zero); anything that is not a letter or a stop marker is a
    /// malformed record.
    fn validate_sequence(&self, sequence: &Sequence) -> Result<()> {
        if let Some(bad) = sequence
            .residues()
            .chars()
            .find(|c| !(c.is_ascii_alphabetic() || *c == '*'))
        {
            return Err(AnalysisError::EncodingSkipped {
                id: sequence.id().to_string(),
                reason: format!("invalid residue character {:?}", bad),
            });
        }
        Ok(())
    }

    /// Validate then encode
    fn try_encode(&self, sequence: &Sequence) -> Result<FeatureVector> {
        self.validate_sequence(sequence)?;
        Ok(self.encode(sequence.residues()))
    }
}
