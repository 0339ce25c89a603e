use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

const LINE_WIDTH: usize = 60;

/// Read a consensus sequence from a FASTA file (plain or gzipped). The file
/// is expected to hold a single record; if it holds several, the last one
/// wins.
pub fn read_consensus(path: &Path) -> Result<(String, Vec<u8>)> {
    let mut reader = needletail::parse_fastx_file(path)
        .with_context(|| format!("Failed to open FASTA file: {}", path.display()))?;

    let mut last: Option<(String, Vec<u8>)> = None;
    while let Some(record) = reader.next() {
        let record = record.with_context(|| format!("Failed to read FASTA record from {}", path.display()))?;
        let id = String::from_utf8_lossy(record.id()).to_string();
        last = Some((id, record.seq().into_owned()));
    }

    last.with_context(|| format!("No FASTA records found in {}", path.display()))
}

/// Write one FASTA record, wrapped at 60 columns.
pub fn write_fasta(path: &Path, id: &str, seq: &[u8]) -> Result<()> {
    let mut out = std::io::BufWriter::new(
        std::fs::File::create(path)
            .with_context(|| format!("Failed to create FASTA file: {}", path.display()))?,
    );
    writeln!(out, ">{}", id)?;
    for chunk in seq.chunks(LINE_WIDTH) {
        out.write_all(chunk)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("consensus.fasta");
        let seq: Vec<u8> = b"ACGT".iter().cycle().take(150).copied().collect();
        write_fasta(&path, "sample-1", &seq).unwrap();

        let (id, read_back) = read_consensus(&path).unwrap();
        assert_eq!(id, "sample-1");
        assert_eq!(read_back, seq);
    }

    #[test]
    fn test_last_record_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multi.fasta");
        std::fs::write(&path, ">first\nAAAA\n>second\nCCCC\n").unwrap();

        let (id, seq) = read_consensus(&path).unwrap();
        assert_eq!(id, "second");
        assert_eq!(seq, b"CCCC".to_vec());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(read_consensus(Path::new("/nonexistent/consensus.fasta")).is_err());
    }
}
