// classifier.rs - Batch bacteriocin classification

use std::sync::Arc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use crate::core::forest::ProbabilisticClassifier;
use crate::core::model::{ModelStore, TrainedModel};
use crate::data::Sequence;
use crate::encoders::SequenceEncoder;
use crate::error::Result;

/// Probability at or above which a sequence is called a bacteriocin
pub const DECISION_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Bacteriocin,
    NonBacteriocin,
}

impl Label {
    pub fn from_probability(p: f64) -> Self {
        if p >= DECISION_THRESHOLD {
            Label::Bacteriocin
        } else {
            Label::NonBacteriocin
        }
    }
}

/// Distance of the probability from the decision threshold, banded
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn from_probability(p: f64) -> Self {
        let margin = (p - DECISION_THRESHOLD).abs();
        if margin > 0.30 {
            Confidence::High
        } else if margin > 0.15 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub sequence_id: String,
    pub name: String,
    pub label: Label,
    pub probability: f64,
    pub confidence: Confidence,
}

/// Bring every row to `expected` columns: extra trailing columns are
/// dropped, missing ones are zero-filled
pub fn reconcile_width(matrix: &mut [Vec<f64>], expected: usize) {
    let mut adjusted = 0;
    for row in matrix.iter_mut() {
        if row.len() != expected {
            row.resize(expected, 0.0);
            adjusted += 1;
        }
    }
    if adjusted > 0 {
        warn!(
            "Adjusted {} feature vectors to the model width of {}",
            adjusted, expected
        );
    }
}

/// Encode a batch, dropping sequences whose encoding is rejected
///
/// Returns the kept sequences' indices alongside their raw vectors.
pub fn encode_batch(
    encoder: &dyn SequenceEncoder,
    sequences: &[Sequence],
) -> (Vec<usize>, Vec<Vec<f64>>) {
    let encoded: Vec<_> = sequences
        .par_iter()
        .enumerate()
        .filter_map(|(i, seq)| match encoder.try_encode(seq) {
            Ok(v) => Some((i, v.into_inner())),
            Err(e) => {
                warn!("{}", e);
                None
            }
        })
        .collect();
    encoded.into_iter().unzip()
}

/// Raw vectors to model-ready rows: width reconciliation then scaling
pub fn prepare_matrix(model: &TrainedModel, mut raw: Vec<Vec<f64>>) -> Vec<Vec<f64>> {
    reconcile_width(&mut raw, model.expected_width());
    model.scaler().transform(&raw)
}

/// Scores sequences against the store's current model
#[derive(Debug, Clone)]
pub struct ClassifierService {
    encoder: Arc<dyn SequenceEncoder>,
    store: Arc<ModelStore>,
}

impl ClassifierService {
    pub fn new(encoder: Arc<dyn SequenceEncoder>, store: Arc<ModelStore>) -> Self {
        Self { encoder, store }
    }

    /// Classify a batch; malformed sequences are excluded, not fatal
    pub fn predict(&self, sequences: &[Sequence]) -> Result<Vec<PredictionResult>> {
        let model = self.store.ensure_ready()?;
        let (kept, raw) = encode_batch(self.encoder.as_ref(), sequences);
        if kept.len() < sequences.len() {
            warn!(
                "{} of {} sequences skipped during encoding",
                sequences.len() - kept.len(),
                sequences.len()
            );
        }
        let rows = prepare_matrix(&model, raw);
        let forest = model.classifier();

        let results: Vec<PredictionResult> = kept
            .par_iter()
            .zip(rows.par_iter())
            .map(|(&i, row)| {
                let seq = &sequences[i];
                let probability = forest.predict_proba(row).clamp(0.0, 1.0);
                PredictionResult {
                    sequence_id: seq.id().to_string(),
                    name: seq.name().to_string(),
                    label: Label::from_probability(probability),
                    probability,
                    confidence: Confidence::from_probability(probability),
                }
            })
            .collect();

        debug!("Classified {} sequences", results.len());
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forest::ForestConfig;
    use crate::encoders::{BacteriocinEncoder, CompositionEncoder};

    fn trained_store(encoder: Arc<dyn SequenceEncoder>) -> Arc<ModelStore> {
        let store = ModelStore::new(encoder).with_forest_config(ForestConfig {
            n_estimators: 15,
            ..Default::default()
        });
        let positives: Vec<Sequence> = [
            "KYYGNGVTCGKHSCSVDWGKATTCIINNGAMAWATGGHQGNHKC",
            "KYYGNGLSCSKKGCTVNWGQAFSCGVNRVATAGHGK",
            "ITSISLCTPGCKTGALMGCNMKTATCHCSIHVSK",
        ]
        .iter()
        .enumerate()
        .map(|(i, s)| Sequence::reference(format!("p{}", i), s))
        .collect();
        let negatives: Vec<Sequence> = [
            "MSDEEKLLEQAEELLKRAEELLKEAEKRGD",
            "MDPNLEEAWKKAHEELLKDPELAEEIAR",
            "MAEEEQKRLEELLRKAQE",
        ]
        .iter()
        .enumerate()
        .map(|(i, s)| Sequence::reference(format!("n{}", i), s))
        .collect();
        store.train(&positives, &negatives).unwrap();
        Arc::new(store)
    }

    #[test]
    fn test_confidence_bands() {
        assert_eq!(Confidence::from_probability(0.95), Confidence::High);
        assert_eq!(Confidence::from_probability(0.05), Confidence::High);
        assert_eq!(Confidence::from_probability(0.70), Confidence::Medium);
        assert_eq!(Confidence::from_probability(0.60), Confidence::Low);
        assert_eq!(Confidence::from_probability(0.5), Confidence::Low);
        assert_eq!(Label::from_probability(0.5), Label::Bacteriocin);
        assert_eq!(Label::from_probability(0.49), Label::NonBacteriocin);
    }

    #[test]
    fn test_reconcile_width() {
        let mut m = vec![vec![1.0; 433], vec![1.0; 10]];
        reconcile_width(&mut m, 420);
        assert_eq!(m[0].len(), 420);
        assert_eq!(m[1].len(), 420);
        assert_eq!(m[1][9], 1.0);
        assert_eq!(m[1][10], 0.0);
    }

    #[test]
    fn test_predict_without_model() {
        let encoder: Arc<dyn SequenceEncoder> = Arc::new(BacteriocinEncoder);
        let store = Arc::new(ModelStore::new(Arc::clone(&encoder)));
        let service = ClassifierService::new(encoder, store);
        let err = service.predict(&[Sequence::candidate("a", "MKAIS")]).unwrap_err();
        assert_eq!(err.kind(), "model_not_ready");
    }

    #[test]
    fn test_malformed_sequence_is_excluded() {
        let encoder: Arc<dyn SequenceEncoder> = Arc::new(BacteriocinEncoder);
        let service = ClassifierService::new(Arc::clone(&encoder), trained_store(encoder));
        let batch = vec![
            Sequence::candidate("a", "KYYGNGVTCGKHSCSVDWGKATTCIINNGAMAW"),
            Sequence::candidate("b", "MSDEEKLLEQAEELLKRAEE"),
            Sequence::candidate("bad", "MK1@#"),
            Sequence::candidate("c", "GSSGSCGSCG"),
        ];
        let results = service.predict(&batch).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.sequence_id != "bad"));
        for r in &results {
            assert!((0.0..=1.0).contains(&r.probability));
            assert_eq!(r.label, Label::from_probability(r.probability));
            assert_eq!(r.confidence, Confidence::from_probability(r.probability));
        }
    }

    #[test]
    fn test_legacy_width_model_accepts_wider_vectors() {
        // model trained on 420-wide vectors, scored with the 433-wide encoder
        let store = trained_store(Arc::new(CompositionEncoder));
        let service = ClassifierService::new(Arc::new(BacteriocinEncoder), store);
        let results = service
            .predict(&[Sequence::candidate("x", "KYYGNGVTCGKHSCSVDWGKATTC")])
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!((0.0..=1.0).contains(&results[0].probability));
    }
}
