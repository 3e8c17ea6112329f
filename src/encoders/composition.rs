// composition.rs - Amino-acid and dipeptide composition encoder

use super::traits::{FeatureVector, SequenceEncoder};

/// The 20 standard residues in canonical (alphabetical) order
pub const AMINO_ACIDS: &[u8; 20] = b"ACDEFGHIKLMNPQRSTVWY";

/// Width of the composition block: 20 single residues + 400 dipeptides
pub const COMPOSITION_WIDTH: usize = 20 + 20 * 20;

/// Index of a residue in `AMINO_ACIDS`
#[inline]
pub fn residue_index(residue: u8) -> Option<usize> {
    AMINO_ACIDS.iter().position(|&aa| aa == residue)
}

/// Fraction helper: `count / windows`, or 0 when there are no windows
#[inline]
pub(crate) fn fraction(count: usize, windows: usize) -> f64 {
    if windows > 0 {
        count as f64 / windows as f64
    } else {
        0.0
    }
}

/// Composition block shared by every encoder
///
/// 20 single-residue fractions over L, then 400 ordered-pair fractions over
/// the L-1 overlapping windows.
pub(crate) fn composition_features(seq: &[u8]) -> Vec<f64> {
    let len = seq.len();
    let mut aa_counts = [0usize; 20];
    let mut pair_counts = [0usize; 400];

    for &residue in seq {
        if let Some(i) = residue_index(residue) {
            aa_counts[i] += 1;
        }
    }

    for window in seq.windows(2) {
        if let (Some(a), Some(b)) = (residue_index(window[0]), residue_index(window[1])) {
            pair_counts[a * 20 + b] += 1;
        }
    }

    let pair_windows = len.saturating_sub(1);
    let mut features = Vec::with_capacity(COMPOSITION_WIDTH);
    features.extend(aa_counts.iter().map(|&c| fraction(c, len)));
    features.extend(pair_counts.iter().map(|&c| fraction(c, pair_windows)));
    features
}

/// Names of the composition block: `A`..`Y` then `AA`..`YY`
pub(crate) fn composition_feature_names() -> Vec<String> {
    let mut names: Vec<String> = AMINO_ACIDS.iter().map(|&aa| (aa as char).to_string()).collect();
    for &a in AMINO_ACIDS {
        for &b in AMINO_ACIDS {
            names.push(format!("{}{}", a as char, b as char));
        }
    }
    names
}

/// Composition-only encoder (420 features)
///
/// The feature set of legacy 420-wide models.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompositionEncoder;

impl SequenceEncoder for CompositionEncoder {
    fn encode(&self, residues: &str) -> FeatureVector {
        FeatureVector::new(composition_features(residues.as_bytes()))
    }

    fn feature_names(&self) -> Vec<String> {
        composition_feature_names()
    }

    fn name(&self) -> &'static str {
        "composition"
    }

    fn description(&self) -> &'static str {
        "Amino-acid (20) and dipeptide (400) composition"
    }

    fn width(&self) -> usize {
        COMPOSITION_WIDTH
    }
}
