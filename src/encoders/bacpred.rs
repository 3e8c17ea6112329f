// bacpred.rs - Bacteriocin feature encoder (composition + pseudofeatures)

use super::composition::{
    composition_feature_names, composition_features, fraction, COMPOSITION_WIDTH,
};
use super::traits::{FeatureVector, SequenceEncoder};

/// Names of the pseudofeature block, in output order
pub const PSEUDOFEATURE_NAMES: [&str; 13] = [
    "Cysteine_Fraction",
    "Cysteine_Pair_Density",
    "Avg_Hydrophobicity",
    "Charge_Density",
    "Positive_AA_Fraction",
    "Negative_AA_Fraction",
    "Amphipathicity",
    "Size_Factor",
    "Motif_CXC",
    "Motif_CXXC",
    "Motif_GG",
    "Motif_PGP",
    "Motif_LSXX",
];

/// Full width: 20 + 400 + 13
pub const BACPRED_WIDTH: usize = COMPOSITION_WIDTH + PSEUDOFEATURE_NAMES.len();

/// Typical bacteriocin length range (inclusive)
const BACTERIOCIN_LENGTH: std::ops::RangeInclusive<usize> = 20..=60;

/// Kyte & Doolittle hydropathy; unknown residues score 0
fn kyte_doolittle(residue: u8) -> f64 {
    match residue {
        b'A' => 1.8,
        b'R' => -4.5,
        b'N' => -3.5,
        b'D' => -3.5,
        b'C' => 2.5,
        b'Q' => -3.5,
        b'E' => -3.5,
        b'G' => -0.4,
        b'H' => -3.0,
        b'I' => 4.5,
        b'L' => 3.8,
        b'K' => -3.9,
        b'M' => 1.9,
        b'F' => 2.8,
        b'P' => -1.6,
        b'S' => -0.8,
        b'T' => -0.7,
        b'W' => -0.9,
        b'Y' => -1.3,
        b'V' => 4.2,
        _ => 0.0,
    }
}

#[inline]
fn is_hydrophobic(residue: u8) -> bool {
    matches!(residue, b'A' | b'C' | b'F' | b'I' | b'L' | b'M' | b'V' | b'W' | b'Y')
}

/// Occurrences of a fixed-width window predicate, normalised by window count
fn motif_density(seq: &[u8], width: usize, hit: impl Fn(&[u8]) -> bool) -> f64 {
    if seq.len() <= width.saturating_sub(1) {
        return 0.0;
    }
    let windows = seq.len() + 1 - width;
    let count = seq.windows(width).filter(|w| hit(w)).count();
    fraction(count, windows)
}

/// Bacteriocin-oriented pseudofeatures
fn pseudofeatures(seq: &[u8]) -> [f64; 13] {
    let len = seq.len();
    let pair_windows = len.saturating_sub(1);

    let cysteines = seq.iter().filter(|&&r| r == b'C').count();
    let cysteine_pairs = seq.windows(2).filter(|w| w[0] == b'C' && w[1] == b'C').count();
    let positive = seq.iter().filter(|&&r| matches!(r, b'K' | b'R' | b'H')).count();
    let negative = seq.iter().filter(|&&r| matches!(r, b'D' | b'E')).count();

    let hydrophobicity = if len > 0 {
        seq.iter().map(|&r| kyte_doolittle(r)).sum::<f64>() / len as f64
    } else {
        0.0
    };

    let charge_density = if len > 0 {
        (positive as f64 - negative as f64) / len as f64
    } else {
        0.0
    };

    let transitions = seq
        .windows(2)
        .filter(|w| is_hydrophobic(w[0]) != is_hydrophobic(w[1]))
        .count();

    let size_factor = if BACTERIOCIN_LENGTH.contains(&len) { 1.0 } else { 0.5 };

    [
        fraction(cysteines, len),
        fraction(cysteine_pairs, pair_windows),
        hydrophobicity,
        charge_density,
        fraction(positive, len),
        fraction(negative, len),
        fraction(transitions, pair_windows),
        size_factor,
        motif_density(seq, 3, |w| w[0] == b'C' && w[2] == b'C'),
        motif_density(seq, 4, |w| w[0] == b'C' && w[3] == b'C'),
        motif_density(seq, 2, |w| w == b"GG"),
        motif_density(seq, 3, |w| w == b"PGP"),
        motif_density(seq, 4, |w| &w[..2] == b"LS"),
    ]
}

/// Default encoder: composition block followed by 13 pseudofeatures
#[derive(Debug, Clone, Copy, Default)]
pub struct BacteriocinEncoder;

impl SequenceEncoder for BacteriocinEncoder {
    fn encode(&self, residues: &str) -> FeatureVector {
        let seq = residues.as_bytes();
        let mut features = composition_features(seq);
        features.extend_from_slice(&pseudofeatures(seq));
        FeatureVector::new(features)
    }

    fn feature_names(&self) -> Vec<String> {
        let mut names = composition_feature_names();
        names.extend(PSEUDOFEATURE_NAMES.iter().map(|s| s.to_string()));
        names
    }

    fn name(&self) -> &'static str {
        "bacpred"
    }

    fn description(&self) -> &'static str {
        "Composition, dipeptides and bacteriocin pseudofeatures"
    }

    fn width(&self) -> usize {
        BACPRED_WIDTH
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pseudo(seq: &str) -> Vec<f64> {
        BacteriocinEncoder.encode(seq).as_slice()[COMPOSITION_WIDTH..].to_vec()
    }

    #[test]
    fn test_width_matches_names() {
        let encoder = BacteriocinEncoder;
        assert_eq!(encoder.width(), 433);
        assert_eq!(encoder.feature_names().len(), 433);
        assert_eq!(encoder.encode("MKAIS").len(), 433);
        assert_eq!(encoder.feature_names()[420], "Cysteine_Fraction");
        assert_eq!(encoder.feature_names()[432], "Motif_LSXX");
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let seq = "KYYGNGVTCGKHSCSVDWGKATTCIINNGAMAWATGGHQGNHKC";
        let a = BacteriocinEncoder.encode(seq);
        let b = BacteriocinEncoder.encode(seq);
        assert_eq!(a, b);
    }

    #[test]
    fn test_composition_sums_to_one() {
        let v = BacteriocinEncoder.encode("ITSISLCTPGCKTGALMGCNMKTATCHCSIHVSK");
        let aac: f64 = v.as_slice()[..20].iter().sum();
        let dpc: f64 = v.as_slice()[20..420].iter().sum();
        assert!((aac - 1.0).abs() < 1e-9);
        assert!((dpc - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_sequence_is_zero_heavy() {
        let v = BacteriocinEncoder.encode("");
        assert_eq!(v.len(), 433);
        let p = &v.as_slice()[COMPOSITION_WIDTH..];
        // only the size factor is non-zero
        assert_eq!(p[7], 0.5);
        assert_eq!(p.iter().filter(|&&x| x != 0.0).count(), 1);
        assert!(v.as_slice()[..COMPOSITION_WIDTH].iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_cysteine_features() {
        let p = pseudo("CC");
        assert_eq!(p[0], 1.0);
        assert_eq!(p[1], 1.0);
        assert!((p[2] - 2.5).abs() < 1e-12);
        // too short for C.C and C..C windows
        assert_eq!(p[8], 0.0);
        assert_eq!(p[9], 0.0);

        let p = pseudo("CACAC");
        assert!((p[8] - 2.0 / 3.0).abs() < 1e-12);
        assert!((p[9] - 0.0).abs() < 1e-12);
        let p = pseudo("CAACAAC");
        assert!((p[9] - 2.0 / 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_charge_and_amphipathicity() {
        let p = pseudo("KKDE");
        assert_eq!(p[3], 0.0);
        assert_eq!(p[4], 0.5);
        assert_eq!(p[5], 0.5);

        assert_eq!(pseudo("AKAK")[6], 1.0);
        assert_eq!(pseudo("ACCA")[6], 0.0);
    }

    #[test]
    fn test_size_factor_and_motifs() {
        let short = pseudo("GGPGP");
        assert_eq!(short[7], 0.5);
        assert!((short[10] - 1.0 / 4.0).abs() < 1e-12);
        assert!((short[11] - 1.0 / 3.0).abs() < 1e-12);

        let typical = "A".repeat(30);
        assert_eq!(pseudo(&typical)[7], 1.0);

        let lsxx = pseudo("LSAALS");
        // LS at window starts 0 only (window at 4 would overrun)
        assert!((lsxx[12] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_residues_tolerated() {
        let v = BacteriocinEncoder.encode("XXXX");
        assert!(v.as_slice()[..COMPOSITION_WIDTH].iter().all(|&x| x == 0.0));
        assert_eq!(v.as_slice()[COMPOSITION_WIDTH + 2], 0.0);
    }
}
