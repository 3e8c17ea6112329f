// mod.rs - Output formatters module

pub mod chart;

pub use chart::{finite_or_zero, ChartSpec};

use std::fs::{create_dir_all, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use serde::Serialize;
use tracing::info;
use crate::core::phylogeny::DistanceMatrix;
use crate::error::{AnalysisError, Result};

/// Ensure parent directory exists before creating file
fn ensure_parent_dir(file_path: &Path) -> Result<()> {
    if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent)?;
    }
    Ok(())
}

fn create(file_path: &Path) -> Result<BufWriter<File>> {
    ensure_parent_dir(file_path)?;
    let file = File::create(file_path).map_err(|e| {
        AnalysisError::Io(io::Error::new(
            e.kind(),
            format!("Failed to create output file '{}': {}", file_path.display(), e),
        ))
    })?;
    Ok(BufWriter::new(file))
}

fn write_comment_header(writer: &mut impl Write, command_line: &str) -> io::Result<()> {
    writeln!(writer, "# Command: {}", command_line)?;
    writeln!(writer, "# Generated: {}", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"))?;
    writeln!(writer, "# bacscope v{}", crate::VERSION)
}

#[inline]
fn cell(d: f64) -> String {
    format!("{:.6}", finite_or_zero(d))
}

/// Write distance matrix in TSV format
pub fn write_tsv(file_path: &Path, matrix: &DistanceMatrix, command_line: &str) -> Result<()> {
    let mut writer = create(file_path)?;
    write_comment_header(&mut writer, command_line)?;

    write!(writer, "Sequence")?;
    for label in matrix.labels() {
        write!(writer, "\t{}", label)?;
    }
    writeln!(writer)?;

    for (i, label) in matrix.labels().iter().enumerate() {
        write!(writer, "{}", label)?;
        for j in 0..matrix.len() {
            write!(writer, "\t{}", cell(matrix.get(i, j)))?;
        }
        writeln!(writer)?;
    }

    writer.flush()?;
    info!("Distance matrix written to: {}", file_path.display());
    Ok(())
}

/// Write distance matrix in CSV format
pub fn write_csv(file_path: &Path, matrix: &DistanceMatrix, command_line: &str) -> Result<()> {
    let mut writer = create(file_path)?;
    write_comment_header(&mut writer, command_line)?;

    let csv_err = |e: csv::Error| AnalysisError::Io(io::Error::new(io::ErrorKind::Other, e.to_string()));
    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut header = vec!["Sequence".to_string()];
    header.extend(matrix.labels().iter().cloned());
    csv_writer.write_record(&header).map_err(csv_err)?;

    for (i, label) in matrix.labels().iter().enumerate() {
        let mut record = vec![label.clone()];
        record.extend((0..matrix.len()).map(|j| cell(matrix.get(i, j))));
        csv_writer.write_record(&record).map_err(csv_err)?;
    }

    csv_writer.flush()?;
    info!("Distance matrix written to: {}", file_path.display());
    Ok(())
}

/// Write distance matrix in PHYLIP format (lower triangle)
pub fn write_phylip(file_path: &Path, matrix: &DistanceMatrix, command_line: &str) -> Result<()> {
    let mut writer = create(file_path)?;

    writeln!(writer, "    {}", matrix.len())?;
    for (i, label) in matrix.labels().iter().enumerate() {
        write!(writer, "{:<10}", label)?;
        for j in 0..=i {
            write!(writer, "  {}", cell(matrix.get(i, j)))?;
        }
        writeln!(writer)?;
    }

    // PHYLIP has no comment syntax; trailing lines are ignored by most parsers
    writeln!(writer)?;
    write_comment_header(&mut writer, command_line)?;

    writer.flush()?;
    info!("Distance matrix written to: {} (PHYLIP format)", file_path.display());
    Ok(())
}

/// Write distance matrix in NEXUS format
pub fn write_nexus(file_path: &Path, matrix: &DistanceMatrix, command_line: &str) -> Result<()> {
    let mut writer = create(file_path)?;

    writeln!(writer, "#NEXUS")?;
    writeln!(writer, "[Command: {}]", command_line)?;
    writeln!(writer, "[Generated: {}]", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"))?;
    writeln!(writer, "[bacscope v{}]", crate::VERSION)?;
    writeln!(writer, "BEGIN DISTANCES;")?;
    writeln!(writer, "    DIMENSIONS NTAX={};", matrix.len())?;
    writeln!(writer, "    FORMAT LABELS LOWER DIAGONAL;")?;
    writeln!(writer, "    MATRIX")?;

    for (i, label) in matrix.labels().iter().enumerate() {
        write!(writer, "        {}", label)?;
        for j in 0..i {
            write!(writer, " {}", cell(matrix.get(i, j)))?;
        }
        writeln!(writer)?;
    }

    writeln!(writer, "    ;")?;
    writeln!(writer, "END;")?;

    writer.flush()?;
    info!("Distance matrix written to: {} (NEXUS format)", file_path.display());
    Ok(())
}

/// Write distance matrix in the specified format
pub fn write_matrix(
    file_path: &Path,
    format: &str,
    matrix: &DistanceMatrix,
    command_line: &str,
) -> Result<()> {
    match format.to_lowercase().as_str() {
        "tsv" => write_tsv(file_path, matrix, command_line),
        "csv" => write_csv(file_path, matrix, command_line),
        "phylip" => write_phylip(file_path, matrix, command_line),
        "nexus" => write_nexus(file_path, matrix, command_line),
        _ => Err(AnalysisError::Config(format!(
            "Unsupported output format: {}. Use: tsv, csv, phylip, nexus",
            format
        ))),
    }
}

pub fn write_newick(file_path: &Path, newick: &str) -> Result<()> {
    let mut writer = create(file_path)?;
    writeln!(writer, "{}", newick)?;
    writer.flush()?;
    info!("Newick tree written to: {}", file_path.display());
    Ok(())
}

/// Pretty JSON to a file, or to stdout when no path is given
pub fn write_json<T: Serialize>(file_path: Option<&Path>, value: &T) -> Result<()> {
    match file_path {
        Some(path) => {
            let mut writer = create(path)?;
            serde_json::to_writer_pretty(&mut writer, value)?;
            writeln!(writer)?;
            writer.flush()?;
            info!("Results written to: {}", path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            serde_json::to_writer_pretty(&mut handle, value)?;
            writeln!(handle)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alignment::{AlignedRow, Alignment};
    use tempfile::TempDir;

    fn matrix() -> DistanceMatrix {
        let aln = Alignment::new(vec![
            AlignedRow { sequence_id: "a".into(), name: "a".into(), gapped: "MKAIS".into() },
            AlignedRow { sequence_id: "b".into(), name: "b".into(), gapped: "MKAIT".into() },
        ])
        .unwrap();
        DistanceMatrix::from_alignment(&aln)
    }

    #[test]
    fn test_write_formats() {
        let dir = TempDir::new().unwrap();
        for format in ["tsv", "csv", "phylip", "nexus"] {
            let path = dir.path().join("out").join(format!("matrix.{}", format));
            write_matrix(&path, format, &matrix(), "bacscope phylogeny").unwrap();
            let text = std::fs::read_to_string(&path).unwrap();
            assert!(text.contains("0.200000"), "{}: {}", format, text);
        }
        let tsv = std::fs::read_to_string(dir.path().join("out/matrix.tsv")).unwrap();
        assert!(tsv.contains("Sequence\ta\tb"));
        assert!(write_matrix(&dir.path().join("x"), "xml", &matrix(), "").is_err());
    }

    #[test]
    fn test_write_json_and_newick() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m.json");
        write_json(Some(&path), &matrix()).unwrap();
        let back: DistanceMatrix =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, matrix());

        let nwk = dir.path().join("tree.nwk");
        write_newick(&nwk, "(a:0.10000,b:0.10000);").unwrap();
        assert_eq!(std::fs::read_to_string(&nwk).unwrap(), "(a:0.10000,b:0.10000);\n");
    }
}
