// alignment.rs - Multiple sequence alignment with an external tool and a star fallback

use parasail_rs::{Aligner, Matrix};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use crate::core::external::ExternalAligner;
use crate::data::Sequence;
use crate::error::{AnalysisError, Result};

/// Residues understood by the scoring matrix; anything else scores as a wildcard
const PROTEIN_ALPHABET: &[u8] = b"ARNDCQEGHILKMFPSTWYVBZX";

pub const GAP: u8 = b'-';

/// Scoring parameters for pairwise global alignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentConfig {
    pub match_score: i32,
    pub mismatch_penalty: i32,
    pub gap_open: i32,
    pub gap_extend: i32,
    pub description: Option<String>,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            match_score: 20,
            mismatch_penalty: -10,
            gap_open: 5,
            gap_extend: 1,
            description: Some("Default protein alignment parameters".to_string()),
        }
    }
}

impl AlignmentConfig {
    /// Create configuration from mode string
    pub fn from_mode(mode: &str) -> Result<Self> {
        match mode {
            "protein" => Ok(Self {
                description: Some("Standard protein alignment".to_string()),
                ..Self::default()
            }),
            "protein-strict" => Ok(Self {
                match_score: 30,
                mismatch_penalty: -20,
                gap_open: 10,
                gap_extend: 2,
                description: Some("Strict protein alignment (higher penalties)".to_string()),
            }),
            "protein-permissive" => Ok(Self {
                match_score: 10,
                mismatch_penalty: 0,
                gap_open: 3,
                gap_extend: 1,
                description: Some("Permissive protein alignment (lower penalties)".to_string()),
            }),
            _ => Err(AnalysisError::Config(format!(
                "Unknown alignment mode: {}. Use: protein, protein-strict, protein-permissive, custom",
                mode
            ))),
        }
    }

    /// Create custom configuration
    pub fn custom(match_score: i32, mismatch_penalty: i32, gap_open: i32, gap_extend: i32) -> Self {
        Self {
            match_score,
            mismatch_penalty,
            gap_open,
            gap_extend,
            description: Some("Custom alignment parameters".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignedRow {
    pub sequence_id: String,
    pub name: String,
    pub gapped: String,
}

impl AlignedRow {
    /// Display label: the id, or `id_name` when a distinct name is known
    pub fn label(&self) -> String {
        if self.name.is_empty() || self.name == self.sequence_id {
            self.sequence_id.clone()
        } else {
            format!("{}_{}", self.sequence_id, self.name)
        }
    }
}

/// Rows of equal length L
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alignment {
    rows: Vec<AlignedRow>,
}

impl Alignment {
    pub fn new(rows: Vec<AlignedRow>) -> Result<Self> {
        if let Some(first) = rows.first() {
            let len = first.gapped.len();
            if let Some(bad) = rows.iter().find(|r| r.gapped.len() != len) {
                return Err(AnalysisError::InvalidAlignment(format!(
                    "row '{}' has length {}, expected {}",
                    bad.sequence_id,
                    bad.gapped.len(),
                    len
                )));
            }
        }
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[AlignedRow] {
        &self.rows
    }

    /// Number of columns
    pub fn length(&self) -> usize {
        self.rows.first().map_or(0, |r| r.gapped.len())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Aligned FASTA with sequence ids as headers
    pub fn to_fasta(&self) -> String {
        let mut out = String::new();
        for row in &self.rows {
            out.push('>');
            out.push_str(&row.sequence_id);
            out.push('\n');
            out.push_str(&row.gapped);
            out.push('\n');
        }
        out
    }

    /// Per-column conservation and overall identity
    pub fn stats(&self) -> AlignmentStats {
        let length = self.length();
        let n = self.rows.len();
        let bytes: Vec<&[u8]> = self.rows.iter().map(|r| r.gapped.as_bytes()).collect();

        let mut conservation = Vec::with_capacity(length);
        let mut identical_columns = 0;
        let mut gaps = 0;

        for col in 0..length {
            let mut counts = [0usize; 256];
            for row in &bytes {
                if row[col] == GAP {
                    gaps += 1;
                } else {
                    counts[row[col] as usize] += 1;
                }
            }
            let top = counts.iter().copied().max().unwrap_or(0);
            if n > 0 && top == n {
                identical_columns += 1;
            }
            conservation.push(if n > 0 { top as f64 / n as f64 } else { 0.0 });
        }

        let cells = (length * n).max(1) as f64;
        AlignmentStats {
            length,
            n_rows: n,
            identical_columns,
            percent_identity: if length > 0 {
                100.0 * identical_columns as f64 / length as f64
            } else {
                0.0
            },
            mean_conservation: if length > 0 {
                conservation.iter().sum::<f64>() / length as f64
            } else {
                0.0
            },
            gap_fraction: gaps as f64 / cells,
            conservation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentStats {
    pub length: usize,
    pub n_rows: usize,
    pub identical_columns: usize,
    pub percent_identity: f64,
    pub mean_conservation: f64,
    pub gap_fraction: f64,
    /// Fraction of rows carrying the column's most common residue
    pub conservation: Vec<f64>,
}

/// Which path produced an alignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlignmentMethod {
    External { tool: String },
    Fallback { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentOutcome {
    pub alignment: Alignment,
    pub method: AlignmentMethod,
}

/// Global pairwise alignment with affine gaps; returns the two gapped strings
pub fn align_pair(config: &AlignmentConfig, query: &[u8], reference: &[u8]) -> (String, String) {
    if let Some(pair) = parasail_pair(config, query, reference) {
        return pair;
    }
    // parasail refused the input (e.g. an empty sequence): end-pad instead
    debug!("Pairwise alignment unavailable, end-padding {} vs {}", query.len(), reference.len());
    let len = query.len().max(reference.len());
    (pad_right(query, len), pad_right(reference, len))
}

fn parasail_pair(config: &AlignmentConfig, query: &[u8], reference: &[u8]) -> Option<(String, String)> {
    if query.is_empty() || reference.is_empty() {
        return None;
    }
    let matrix = Matrix::create(PROTEIN_ALPHABET, config.match_score, config.mismatch_penalty).ok()?;
    let aligner = Aligner::new()
        .matrix(matrix)
        .gap_open(config.gap_open)
        .gap_extend(config.gap_extend)
        .global()
        .use_trace()
        .build();

    let query = query.to_vec();
    let reference = reference.to_vec();
    let result = aligner.align(Some(&query), &reference).ok()?;
    let traceback = result.get_traceback_strings(&query, &reference).ok()?;
    Some((traceback.query, traceback.reference))
}

fn pad_right(residues: &[u8], len: usize) -> String {
    let mut s = String::from_utf8_lossy(residues).into_owned();
    while s.len() < len {
        s.push(GAP as char);
    }
    s
}

/// Star alignment against the first sequence
///
/// Gap placement is not reconciled across pairs; rows are only padded to a
/// common length.
pub fn star_align(config: &AlignmentConfig, sequences: &[Sequence]) -> Result<Alignment> {
    if sequences.len() < 2 {
        return Err(AnalysisError::InsufficientInput {
            operation: "Alignment",
            required: 2,
            actual: sequences.len(),
        });
    }
    let center = sequences[0].residues().as_bytes();

    let pairs: Vec<(String, String)> = sequences[1..]
        .par_iter()
        .map(|seq| align_pair(config, center, seq.residues().as_bytes()))
        .collect();

    let mut gapped: Vec<String> = Vec::with_capacity(sequences.len());
    gapped.push(pairs[0].0.clone());
    gapped.extend(pairs.into_iter().map(|(_, other)| other));

    let width = gapped.iter().map(|g| g.len()).max().unwrap_or(0);
    let rows = sequences
        .iter()
        .zip(gapped)
        .map(|(seq, g)| AlignedRow {
            sequence_id: seq.id().to_string(),
            name: seq.name().to_string(),
            gapped: pad_right(g.as_bytes(), width),
        })
        .collect();
    Alignment::new(rows)
}

/// External MSA first, star alignment when the tool cannot deliver
#[derive(Debug, Clone)]
pub struct AlignmentEngine {
    config: AlignmentConfig,
    external: Option<ExternalAligner>,
}

impl AlignmentEngine {
    pub fn new(config: AlignmentConfig, external: Option<ExternalAligner>) -> Self {
        Self { config, external }
    }

    pub fn config(&self) -> &AlignmentConfig {
        &self.config
    }

    pub fn align(&self, sequences: &[Sequence]) -> Result<AlignmentOutcome> {
        if sequences.len() < 2 {
            return Err(AnalysisError::InsufficientInput {
                operation: "Alignment",
                required: 2,
                actual: sequences.len(),
            });
        }

        let reason = match &self.external {
            Some(tool) => match tool.align(sequences) {
                Ok(alignment) => {
                    info!("Aligned {} sequences with {}", sequences.len(), tool.name());
                    return Ok(AlignmentOutcome {
                        alignment,
                        method: AlignmentMethod::External { tool: tool.name() },
                    });
                }
                Err(e) => {
                    warn!("{}; using star alignment", e);
                    e.to_string()
                }
            },
            None => "no external aligner configured".to_string(),
        };

        let alignment = star_align(&self.config, sequences)?;
        info!(
            "Star-aligned {} sequences ({} columns)",
            alignment.len(),
            alignment.length()
        );
        Ok(AlignmentOutcome {
            alignment,
            method: AlignmentMethod::Fallback { reason },
        })
    }
}

impl Default for AlignmentEngine {
    fn default() -> Self {
        Self::new(AlignmentConfig::default(), Some(ExternalAligner::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn missing_tool() -> Option<ExternalAligner> {
        Some(ExternalAligner::new("bacscope-no-such-aligner", Duration::from_secs(5)))
    }

    #[test]
    fn test_alignment_config_modes() {
        assert!(AlignmentConfig::from_mode("protein").is_ok());
        assert!(AlignmentConfig::from_mode("protein-strict").is_ok());
        assert!(AlignmentConfig::from_mode("protein-permissive").is_ok());
        assert!(AlignmentConfig::from_mode("dna").is_err());

        let custom = AlignmentConfig::custom(5, -4, 10, 1);
        assert_eq!(custom.match_score, 5);
        assert_eq!(custom.gap_open, 10);
    }

    #[test]
    fn test_alignment_rejects_ragged_rows() {
        let rows = vec![
            AlignedRow { sequence_id: "a".into(), name: "a".into(), gapped: "MK-".into() },
            AlignedRow { sequence_id: "b".into(), name: "b".into(), gapped: "MK".into() },
        ];
        assert_eq!(Alignment::new(rows).unwrap_err().kind(), "invalid_alignment");
    }

    #[test]
    fn test_too_few_sequences() {
        let engine = AlignmentEngine::new(AlignmentConfig::default(), None);
        let err = engine.align(&[Sequence::candidate("a", "MKAIS")]).unwrap_err();
        assert_eq!(err.kind(), "insufficient_input");
    }

    #[test]
    fn test_fallback_rows_have_equal_length() {
        let engine = AlignmentEngine::new(AlignmentConfig::default(), missing_tool());
        let seqs = vec![
            Sequence::candidate("a", "MKAISLLVAG"),
            Sequence::candidate("b", "MKAIS"),
        ];
        let outcome = engine.align(&seqs).unwrap();
        assert!(matches!(outcome.method, AlignmentMethod::Fallback { .. }));

        let aln = outcome.alignment;
        assert_eq!(aln.len(), 2);
        assert!(aln.length() >= 10);
        assert!(aln.rows().iter().all(|r| r.gapped.len() == aln.length()));
        for (row, seq) in aln.rows().iter().zip(&seqs) {
            assert_eq!(row.gapped.replace('-', ""), seq.residues());
        }
    }

    #[test]
    fn test_star_alignment_with_empty_member() {
        let seqs = vec![
            Sequence::candidate("a", "MKAIS"),
            Sequence::candidate("b", "MKTIS"),
            Sequence::candidate("c", ""),
        ];
        let aln = star_align(&AlignmentConfig::default(), &seqs).unwrap();
        assert_eq!(aln.len(), 3);
        assert_eq!(aln.rows()[2].gapped, "-".repeat(aln.length()));
    }

    #[test]
    fn test_alignment_stats() {
        let aln = Alignment::new(vec![
            AlignedRow { sequence_id: "a".into(), name: "a".into(), gapped: "MKA-".into() },
            AlignedRow { sequence_id: "b".into(), name: "b".into(), gapped: "MKT-".into() },
        ])
        .unwrap();
        let stats = aln.stats();
        assert_eq!(stats.length, 4);
        assert_eq!(stats.identical_columns, 2);
        assert_eq!(stats.percent_identity, 50.0);
        assert_eq!(stats.conservation, vec![1.0, 1.0, 0.5, 0.0]);
        assert_eq!(stats.gap_fraction, 0.25);
        assert!(aln.to_fasta().starts_with(">a\nMKA-\n"));
    }
}
