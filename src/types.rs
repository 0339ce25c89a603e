use anyhow::{bail, Result};

/// Per-base read depths at one position, always held in fixed A,C,G,T order
/// regardless of how the source file stored them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BaseDepths {
    pub a: u32,
    pub c: u32,
    pub g: u32,
    pub t: u32,
}

impl BaseDepths {
    pub fn new(a: u32, c: u32, g: u32, t: u32) -> Self {
        BaseDepths { a, c, g, t }
    }

    /// Total depth: the sum of the four base depths.
    pub fn total(&self) -> u32 {
        self.a + self.c + self.g + self.t
    }

    /// The four depths sorted descending.
    pub fn sorted_desc(&self) -> [u32; 4] {
        let mut d = [self.a, self.c, self.g, self.t];
        d.sort_unstable_by(|x, y| y.cmp(x));
        d
    }

    /// Depth of everything except the single most common base.
    pub fn nonmajor(&self) -> u32 {
        self.total() - self.sorted_desc()[0]
    }

    /// Mutable slot for a base symbol; `None` for anything outside A,C,G,T.
    pub fn slot_mut(&mut self, base: u8) -> Option<&mut u32> {
        match base {
            b'A' => Some(&mut self.a),
            b'C' => Some(&mut self.c),
            b'G' => Some(&mut self.g),
            b'T' => Some(&mut self.t),
            _ => None,
        }
    }
}

/// One reported base call: a matched position seen through one of the regions
/// that reference it. `maf` and `mlp` are undefined when depth is zero or the
/// significance test was disabled.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseCallRow {
    pub roi_name: String,
    pub pos: u64,
    pub ref_base: String,
    pub depth: u32,
    pub depths: BaseDepths,
    pub maf: Option<f64>,
    pub mlp: Option<f64>,
}

/// Summary of all base calls within one region of interest.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionSummary {
    pub roi_name: String,
    pub mean_depth: f64,
    pub min_depth: u32,
    pub max_depth: u32,
    pub start: u64,
    pub stop: u64,
    pub length: u64,
    /// Mean maf over rows where maf is defined; None if no row in the region
    /// has one.
    pub mean_maf: Option<f64>,
    pub total_depth: u64,
    pub total_nonmajor_depth: u64,
}

/// A mixed-base candidate recorded by the annotator: 0-indexed sequence
/// position and the character assigned there (an IUPAC two-base code, or 'N'
/// when the call was suppressed by clustering).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixtureCall {
    pub pos: usize,
    pub base: u8,
}

/// Overall mixture quality of a lineage scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixtureQuality {
    Ok,
    Bad,
}

impl std::fmt::Display for MixtureQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MixtureQuality::Ok => write!(f, "OK"),
            MixtureQuality::Bad => write!(f, "bad"),
        }
    }
}

/// F2/F47 mixture statistics over the lineage-defining regions. Both scores
/// are undefined whenever quality is `Bad` (too few regions, or no reads).
#[derive(Debug, Clone, PartialEq)]
pub struct FStatistics {
    pub mixture_quality: MixtureQuality,
    pub f2: Option<f64>,
    pub f47: Option<f64>,
}

/// Maximum length of a sample identifier used to key persisted tables.
pub const MAX_SAMPLE_ID_LEN: usize = 36;

/// Validate a sample identifier: at most 36 characters and safe as a
/// filesystem path component.
pub fn validate_sample_id(sample_id: &str) -> Result<()> {
    if sample_id.is_empty() {
        bail!("sample id must not be empty");
    }
    if sample_id.len() > MAX_SAMPLE_ID_LEN {
        bail!(
            "sample id '{}' is {} characters; at most {} allowed",
            sample_id,
            sample_id.len(),
            MAX_SAMPLE_ID_LEN
        );
    }
    if let Some(bad) = sample_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        bail!(
            "sample id '{}' contains character '{}'; only alphanumerics, '-', '_' and '.' are allowed",
            sample_id,
            bad
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_depths_derived() {
        let d = BaseDepths::new(10, 3, 7, 0);
        assert_eq!(d.total(), 20);
        assert_eq!(d.sorted_desc(), [10, 7, 3, 0]);
        assert_eq!(d.nonmajor(), 10);
    }

    #[test]
    fn test_slot_mut_rejects_unknown_base() {
        let mut d = BaseDepths::default();
        assert!(d.slot_mut(b'N').is_none());
        *d.slot_mut(b'G').unwrap() = 5;
        assert_eq!(d.g, 5);
    }

    #[test]
    fn test_sample_id_validation() {
        assert!(validate_sample_id("52858be2-7020-4b7f-acb4-95e00019a7d7").is_ok());
        assert!(validate_sample_id("").is_err());
        assert!(validate_sample_id(&"x".repeat(37)).is_err());
        assert!(validate_sample_id("has/slash").is_err());
        assert!(validate_sample_id("has space").is_err());
    }
}
