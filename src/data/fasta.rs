// fasta.rs - FASTA loading for training corpora and analysis inputs

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use bio::io::fasta;
use tracing::{info, warn};
use crate::data::sequence::{Origin, Sequence};
use crate::error::{AnalysisError, Result};

/// Load every record of a FASTA file as a `Sequence` of the given origin
///
/// The record id becomes the sequence id and the description (if any) the
/// display name. Records with an empty sequence are skipped.
pub fn load_fasta(path: &Path, origin: Origin) -> Result<Vec<Sequence>> {
    let file = File::open(path).map_err(|e| {
        AnalysisError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to open FASTA file {}: {}", path.display(), e),
        ))
    })?;

    let reader = fasta::Reader::new(BufReader::new(file));
    let mut sequences = Vec::new();

    for record_result in reader.records() {
        let record = record_result.map_err(|e| {
            AnalysisError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Invalid FASTA record in {}: {}", path.display(), e),
            ))
        })?;

        if record.seq().is_empty() {
            warn!("Skipping empty record '{}' in {}", record.id(), path.display());
            continue;
        }

        let residues = String::from_utf8_lossy(record.seq());
        let name = record.desc().unwrap_or(record.id());
        sequences.push(Sequence::new(record.id(), name, &residues, origin));
    }

    info!("Loaded {} sequences from {}", sequences.len(), path.display());
    Ok(sequences)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_fasta_with_descriptions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refs.fasta");
        let mut file = File::create(&path).unwrap();
        writeln!(file, ">bac1 nisin A").unwrap();
        writeln!(file, "ITSISLCTPG").unwrap();
        writeln!(file, "CKTGALMGCN").unwrap();
        writeln!(file, ">bac2").unwrap();
        writeln!(file, "kyygngv").unwrap();

        let seqs = load_fasta(&path, Origin::Reference).unwrap();
        assert_eq!(seqs.len(), 2);
        assert_eq!(seqs[0].id(), "bac1");
        assert_eq!(seqs[0].name(), "nisin A");
        assert_eq!(seqs[0].residues(), "ITSISLCTPGCKTGALMGCN");
        assert_eq!(seqs[1].name(), "bac2");
        assert_eq!(seqs[1].residues(), "KYYGNGV");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_fasta(Path::new("/nonexistent/x.fasta"), Origin::Candidate).unwrap_err();
        assert_eq!(err.kind(), "io");
    }
}
