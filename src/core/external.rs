// external.rs - Clustal Omega invocation in a scratch directory

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use bio::io::fasta;
use tempfile::TempDir;
use tracing::debug;
use crate::core::alignment::{AlignedRow, Alignment};
use crate::data::Sequence;
use crate::error::{AnalysisError, Result};

pub const DEFAULT_PROGRAM: &str = "clustalo";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// External multiple-sequence aligner speaking FASTA in and out
#[derive(Debug, Clone)]
pub struct ExternalAligner {
    program: PathBuf,
    timeout: Duration,
}

impl Default for ExternalAligner {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM, DEFAULT_TIMEOUT)
    }
}

impl ExternalAligner {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the tool; the scratch directory is removed on every exit path
    pub fn align(&self, sequences: &[Sequence]) -> Result<Alignment> {
        let scratch = TempDir::new()?;
        let input = scratch.path().join("input.fasta");
        let output = scratch.path().join("output.fasta");

        let mut file = File::create(&input)?;
        for (i, seq) in sequences.iter().enumerate() {
            writeln!(file, ">seq{}\n{}", i, seq.residues())?;
        }
        file.flush()?;
        drop(file);

        self.run(&input, &output)?;
        parse_alignment(&output, sequences)
    }

    fn run(&self, input: &Path, output: &Path) -> Result<()> {
        let unavailable = |msg: String| AnalysisError::ExternalToolUnavailable(msg);

        let mut child = Command::new(&self.program)
            .arg("-i")
            .arg(input)
            .arg("-o")
            .arg(output)
            .args(["--outfmt=fa", "--force", "--auto"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => unavailable(format!("{} not found", self.name())),
                _ => unavailable(format!("failed to start {}: {}", self.name(), e)),
            })?;

        let start = Instant::now();
        let status = loop {
            let failure = match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if start.elapsed() < self.timeout => None,
                Ok(None) => Some(format!(
                    "{} timed out after {}s",
                    self.name(),
                    self.timeout.as_secs_f64()
                )),
                Err(e) => Some(format!("lost track of {}: {}", self.name(), e)),
            };
            if let Some(reason) = failure {
                // never leave the tool running past the scratch directory
                let _ = child.kill();
                let _ = child.wait();
                return Err(unavailable(reason));
            }
            thread::sleep(POLL_INTERVAL);
        };
        debug!("{} finished in {:.2}s with {}", self.name(), start.elapsed().as_secs_f64(), status);

        if !status.success() {
            return Err(unavailable(format!("{} exited with {}", self.name(), status)));
        }
        Ok(())
    }
}

/// Read the tool's aligned FASTA back into input order
///
/// Every `seq{i}` record must appear exactly once and rows must share one length.
pub fn parse_alignment(path: &Path, sequences: &[Sequence]) -> Result<Alignment> {
    let unusable = |msg: String| AnalysisError::ExternalToolUnavailable(format!("unusable alignment: {}", msg));

    if !path.is_file() || fs::metadata(path)?.len() == 0 {
        return Err(unusable("no output produced".to_string()));
    }
    let reader = fasta::Reader::new(BufReader::new(File::open(path)?));

    let mut gapped: HashMap<usize, String> = HashMap::new();
    for record in reader.records() {
        let record = record.map_err(|e| unusable(e.to_string()))?;
        let index = record
            .id()
            .strip_prefix("seq")
            .and_then(|i| i.parse::<usize>().ok())
            .filter(|&i| i < sequences.len())
            .ok_or_else(|| unusable(format!("unexpected record '{}'", record.id())))?;
        let row = String::from_utf8_lossy(record.seq()).to_ascii_uppercase().replace('.', "-");
        if gapped.insert(index, row).is_some() {
            return Err(unusable(format!("duplicate record 'seq{}'", index)));
        }
    }
    if gapped.len() != sequences.len() {
        return Err(unusable(format!(
            "{} of {} sequences returned",
            gapped.len(),
            sequences.len()
        )));
    }

    let mut rows = Vec::with_capacity(sequences.len());
    for (i, seq) in sequences.iter().enumerate() {
        let row = gapped
            .remove(&i)
            .ok_or_else(|| unusable(format!("missing record 'seq{}'", i)))?;
        rows.push(AlignedRow {
            sequence_id: seq.id().to_string(),
            name: seq.name().to_string(),
            gapped: row,
        });
    }
    Alignment::new(rows).map_err(|e| unusable(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seqs() -> Vec<Sequence> {
        vec![Sequence::candidate("a", "MKAIS"), Sequence::candidate("b", "MKIS")]
    }

    #[test]
    fn test_missing_program() {
        let tool = ExternalAligner::new("bacscope-no-such-aligner", Duration::from_secs(1));
        let err = tool.align(&seqs()).unwrap_err();
        assert_eq!(err.kind(), "external_tool_unavailable");
        assert!(err.to_string().contains("not found"));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_program() {
        // `false` ignores its arguments and exits non-zero
        let tool = ExternalAligner::new("false", Duration::from_secs(5));
        let err = tool.align(&seqs()).unwrap_err();
        assert_eq!(err.kind(), "external_tool_unavailable");
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_program_is_killed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let script = dir.path().join("hang.sh");
        fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let tool = ExternalAligner::new(&script, Duration::from_millis(300));
        let start = Instant::now();
        let err = tool.align(&seqs()).unwrap_err();
        assert_eq!(err.kind(), "external_tool_unavailable");
        assert!(err.to_string().contains("timed out"));
        // kill and reap return long before the script would have finished
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_parse_alignment_reorders_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.fasta");
        fs::write(&path, ">seq1\nMK-IS\n>seq0\nmkais\n").unwrap();
        let aln = parse_alignment(&path, &seqs()).unwrap();
        assert_eq!(aln.rows()[0].sequence_id, "a");
        assert_eq!(aln.rows()[0].gapped, "MKAIS");
        assert_eq!(aln.rows()[1].gapped, "MK-IS");
    }

    #[test]
    fn test_parse_alignment_rejects_unusable_output() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.fasta");

        fs::write(&path, ">seq0\nMKAIS\n").unwrap();
        assert!(parse_alignment(&path, &seqs()).is_err());

        fs::write(&path, ">seq0\nMKAIS\n>seq1\nMKIS\n").unwrap();
        assert!(parse_alignment(&path, &seqs()).is_err());

        fs::write(&path, ">seq0\nMKAIS\n>seq7\nMK-IS\n").unwrap();
        assert!(parse_alignment(&path, &seqs()).is_err());

        assert!(parse_alignment(&dir.path().join("absent.fasta"), &seqs()).is_err());
    }
}
