use thiserror::Error;

/// Errors raised while configuring or running a scan.
///
/// Row-level numeric anomalies are recovered inside the scan (zero-fill plus
/// a warning) and never surface here; stream truncation is reported through
/// the scan result's `complete` flag, not as an error.
#[derive(Error, Debug, PartialEq)]
pub enum ScanError {
    #[error("positions must be 1-indexed; position 0 was supplied for region {roi}")]
    ZeroPosition { roi: String },

    #[error("expected error rate must be a probability in (0, 1), got {rate}")]
    InvalidErrorRate { rate: f64 },

    #[error("expected tag {tag} in the {section} column, but it was not there; keys present: {present:?}")]
    MissingTag {
        tag: String,
        section: &'static str,
        present: Vec<String>,
    },

    #[error("expected tag {tag} to contain {expected} depths at position {pos}, but {found} found")]
    TagShape {
        tag: String,
        pos: u64,
        expected: usize,
        found: usize,
    },

    #[error("malformed VCF row: expected 10 whitespace-separated columns, found {found}: {line}")]
    MalformedLine { found: usize, line: String },

    #[error("could not parse depth value {value:?} at position {pos}")]
    BadDepthValue { pos: u64, value: String },
}
