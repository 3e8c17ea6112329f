// motifs.rs - Known bacteriocin motif scanning

use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use crate::data::Sequence;
use crate::error::{AnalysisError, Result};

/// One catalogue entry; `pattern` is the human-readable form of `regex`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotifDefinition {
    pub name: &'static str,
    pub pattern: &'static str,
    pub regex: &'static str,
    pub class: &'static str,
    pub description: &'static str,
}

pub const MOTIF_CATALOGUE: &[MotifDefinition] = &[
    MotifDefinition {
        name: "Leader Peptide FNLD Motif",
        pattern: "FNLD",
        regex: "FNLD",
        class: "I",
        description: "Leader peptide segment guiding lantibiotic modification and cleavage",
    },
    MotifDefinition {
        name: "Lanthionine Ring Formation Motif",
        pattern: "SxxxC",
        regex: "S[A-Z]{3}C",
        class: "I",
        description: "Serine and cysteine pair that closes a thioether ring",
    },
    MotifDefinition {
        name: "Hinge Region",
        pattern: "NMK",
        regex: "NMK",
        class: "I",
        description: "Flexible linker between the lipid II binding and pore-forming parts",
    },
    MotifDefinition {
        name: "Pediocin Box YGNGV Motif",
        pattern: "YGNGV",
        regex: "YGNGV",
        class: "IIa",
        description: "N-terminal receptor binding box of pediocin-like bacteriocins",
    },
    MotifDefinition {
        name: "Disulfide-Bridge Motif",
        pattern: "CxxC",
        regex: "C[A-Z]{2}C",
        class: "IIa",
        description: "Cysteine pair forming a stabilising disulfide bond",
    },
    MotifDefinition {
        name: "C-Terminal Hydrophobic Helix/Tail",
        pattern: "xxALxxVLxx",
        regex: "[A-Z]{2}AL[A-Z]{2}VL[A-Z]{2}",
        class: "IIa",
        description: "Amphipathic hydrophobic stretch used for membrane insertion",
    },
    MotifDefinition {
        name: "GxxxG Helix-Helix Interaction Motif",
        pattern: "GxxxG",
        regex: "G[A-Z]{3}G",
        class: "IIb",
        description: "Glycine zipper packing the helices of two-peptide bacteriocins",
    },
    MotifDefinition {
        name: "Signal Peptide Motif (Sec-Dependent)",
        pattern: "MKxxLLLLLLLLLLLAxA",
        regex: "M[KR][A-Z]{2}[LIVF]{8,15}A[A-Z]A",
        class: "III",
        description: "Basic N-region, hydrophobic core and AxA cleavage site",
    },
    MotifDefinition {
        name: "Catalytic HxH Motif",
        pattern: "HxH",
        regex: "H[A-Z]H",
        class: "III",
        description: "Zinc-coordinating histidines of metallopeptidase bacteriolysins",
    },
    MotifDefinition {
        name: "Catalytic HxxH Motif",
        pattern: "HxxH",
        regex: "H[A-Z]{2}H",
        class: "III",
        description: "Zinc-coordinating histidines of metallopeptidase bacteriolysins",
    },
    MotifDefinition {
        name: "LysM Motif",
        pattern: "xxGxxDxx",
        regex: "[A-Z]{2}G[A-Z]{2}D[A-Z]{2}",
        class: "III",
        description: "LysM fragment binding peptidoglycan",
    },
    MotifDefinition {
        name: "SH3b Motif",
        pattern: "xxYxxPxx",
        regex: "[A-Z]{2}Y[A-Z]{2}P[A-Z]{2}",
        class: "III",
        description: "SH3b fragment binding cell wall components",
    },
];

/// Half-open residue range `[start, end)` matched by a motif
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotifHit {
    pub motif: String,
    pub class: String,
    pub start: usize,
    pub end: usize,
    pub matched: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotifScan {
    pub sequence_id: String,
    pub hits: Vec<MotifHit>,
}

#[derive(Debug, Clone)]
pub struct MotifScanner {
    motifs: Vec<(MotifDefinition, Regex)>,
}

impl MotifScanner {
    pub fn new() -> Result<Self> {
        Self::with_catalogue(MOTIF_CATALOGUE)
    }

    /// Longer patterns are tried first and claim their residues
    pub fn with_catalogue(catalogue: &[MotifDefinition]) -> Result<Self> {
        let mut motifs = catalogue
            .iter()
            .map(|def| {
                Regex::new(def.regex)
                    .map(|re| (*def, re))
                    .map_err(|e| AnalysisError::Config(format!("invalid motif '{}': {}", def.name, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        motifs.sort_by(|a, b| b.0.pattern.len().cmp(&a.0.pattern.len()));
        Ok(Self { motifs })
    }

    /// Non-overlapping hits ordered by start position
    pub fn scan(&self, residues: &str) -> Vec<MotifHit> {
        let mut hits: Vec<MotifHit> = Vec::new();
        for (def, re) in &self.motifs {
            for m in re.find_iter(residues) {
                let overlaps = hits.iter().any(|h| m.start() < h.end && h.start < m.end());
                if !overlaps {
                    hits.push(MotifHit {
                        motif: def.name.to_string(),
                        class: def.class.to_string(),
                        start: m.start(),
                        end: m.end(),
                        matched: m.as_str().to_string(),
                    });
                }
            }
        }
        hits.sort_by_key(|h| h.start);
        hits
    }

    pub fn scan_sequences(&self, sequences: &[Sequence]) -> Vec<MotifScan> {
        sequences
            .par_iter()
            .map(|seq| MotifScan {
                sequence_id: seq.id().to_string(),
                hits: self.scan(seq.residues()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_compiles() {
        let scanner = MotifScanner::new().unwrap();
        assert_eq!(scanner.motifs.len(), MOTIF_CATALOGUE.len());
    }

    #[test]
    fn test_pediocin_box() {
        let scanner = MotifScanner::new().unwrap();
        let hits = scanner.scan("KYYGNGVTC");
        let box_hit = hits.iter().find(|h| h.matched == "YGNGV").unwrap();
        assert_eq!(box_hit.start, 2);
        assert_eq!(box_hit.end, 7);
        assert_eq!(box_hit.class, "IIa");
    }

    #[test]
    fn test_hits_do_not_overlap() {
        let scanner = MotifScanner::new().unwrap();
        // CxxC and HxxH candidates share residues
        let hits = scanner.scan("ACKHCHAAHWW");
        for (i, a) in hits.iter().enumerate() {
            for b in &hits[i + 1..] {
                assert!(a.end <= b.start);
            }
        }
    }

    #[test]
    fn test_longer_motif_wins() {
        let scanner = MotifScanner::new().unwrap();
        // CALC sits inside the hydrophobic tail
        let hits = scanner.scan("KCALCKVLKK");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].motif, "C-Terminal Hydrophobic Helix/Tail");
        assert_eq!((hits[0].start, hits[0].end), (0, 10));
    }

    #[test]
    fn test_scan_sequences_keeps_order() {
        let scanner = MotifScanner::new().unwrap();
        let scans = scanner.scan_sequences(&[
            Sequence::candidate("a", "FNLDAAA"),
            Sequence::candidate("b", "AAAA"),
        ]);
        assert_eq!(scans[0].sequence_id, "a");
        assert_eq!(scans[0].hits[0].motif, "Leader Peptide FNLD Motif");
        assert!(scans[1].hits.is_empty());
    }
}
