use crate::errors::ScanError;
use crate::types::BaseDepths;
use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Default info tag holding the four high-quality per-base depths, as written
/// by GATK VariantAnnotator.
pub const DEFAULT_COUNTS_TAG: &str = "BaseCounts4";

/// The allele-depth tag written by samtools mpileup (`-t AD` / `-t INFO/AD`):
/// reference depth first, then one depth per listed alternate.
pub const ALLELE_DEPTH_TAG: &str = "AD";

/// Open a VCF file for line-by-line reading, transparently decompressing
/// `.gz` inputs.
pub fn open_vcf_reader(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open VCF file: {}", path.display()))?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// One data line of the variant stream. The id, quality and filter columns
/// are carried in the split but not consumed; info, format and sample fields
/// are kept raw and parsed on demand, so unmatched lines cost only the
/// column split.
#[derive(Debug, Clone)]
pub struct VariantRecord {
    pub chrom: String,
    pub pos: u64,
    pub ref_base: String,
    alt_field: String,
    info_field: String,
    format_field: String,
    sample_field: String,
}

impl VariantRecord {
    /// Split one line into the 10 fixed columns. Any other column count is a
    /// structural error that aborts the scan.
    pub fn parse(line: &str) -> Result<Self, ScanError> {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() != 10 {
            return Err(ScanError::MalformedLine {
                found: cols.len(),
                line: line.trim_end().to_string(),
            });
        }
        let pos = cols[1].parse::<u64>().map_err(|_| ScanError::MalformedLine {
            found: cols.len(),
            line: line.trim_end().to_string(),
        })?;
        Ok(VariantRecord {
            chrom: cols[0].to_string(),
            pos,
            ref_base: cols[3].to_string(),
            alt_field: cols[4].to_string(),
            info_field: cols[7].to_string(),
            format_field: cols[8].to_string(),
            sample_field: cols[9].to_string(),
        })
    }

    /// Alternate alleles, filtered to single-nucleotide symbols.
    pub fn alts(&self) -> Vec<&str> {
        self.alt_field
            .split(',')
            .filter(|a| matches!(*a, "A" | "C" | "G" | "T"))
            .collect()
    }

    /// The semicolon-separated key=value info bag. Flag-style entries with no
    /// value map to the empty string.
    pub fn info(&self) -> HashMap<&str, &str> {
        self.info_field
            .split(';')
            .filter(|item| !item.is_empty())
            .map(|item| match item.split_once('=') {
                Some((k, v)) => (k, v),
                None => (item, ""),
            })
            .collect()
    }

    /// Colon-separated genotype format keys.
    pub fn format_keys(&self) -> Vec<&str> {
        self.format_field.split(':').collect()
    }

    /// Colon-separated per-sample values, positionally matching the format
    /// keys.
    pub fn sample_values(&self) -> Vec<&str> {
        self.sample_field.split(':').collect()
    }
}

/// Where the four per-base depths come from. Resolved once per scan (`Auto`
/// rewrites itself to a concrete strategy at the first matched record) and
/// reused for every subsequent record without re-detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagStrategy {
    /// Detect on first use: per-sample AD, then info AD, then the explicit
    /// counts tag.
    Auto,
    /// A 4-integer comma-separated depth list stored directly in the info
    /// bag, already in A,C,G,T order.
    InfoCounts(String),
    /// AD convention in the info bag: reference depth first, then alternate
    /// depths in listed order.
    InfoAlleleDepth,
    /// AD convention in the per-sample genotype column.
    SampleAlleleDepth,
}

impl TagStrategy {
    /// Interpret a tag name from configuration the way the scan does:
    /// `auto` detects, `AD` selects the info-bag allele-depth convention,
    /// and anything else is an explicit 4-count tag.
    pub fn from_tag_name(tag: &str) -> Self {
        match tag {
            "auto" => TagStrategy::Auto,
            ALLELE_DEPTH_TAG => TagStrategy::InfoAlleleDepth,
            other => TagStrategy::InfoCounts(other.to_string()),
        }
    }

    /// Resolve `Auto` against one record, preferring the per-sample AD
    /// convention, then info-bag AD, then the explicit counts tag.
    pub fn detect(record: &VariantRecord) -> Result<Self, ScanError> {
        if record.format_keys().contains(&ALLELE_DEPTH_TAG) {
            return Ok(TagStrategy::SampleAlleleDepth);
        }
        let info = record.info();
        if info.contains_key(ALLELE_DEPTH_TAG) {
            Ok(TagStrategy::InfoAlleleDepth)
        } else if info.contains_key(DEFAULT_COUNTS_TAG) {
            Ok(TagStrategy::InfoCounts(DEFAULT_COUNTS_TAG.to_string()))
        } else {
            Err(ScanError::MissingTag {
                tag: format!("{} or {}", ALLELE_DEPTH_TAG, DEFAULT_COUNTS_TAG),
                section: "info/format",
                present: info.keys().map(|k| k.to_string()).collect(),
            })
        }
    }
}

/// Extract the fixed-order base depths from one record under a resolved
/// strategy. A missing required tag or a wrong element count aborts the
/// scan; an unparseable integer in an info-bag tag is recovered locally by
/// zero-filling, with a warning.
pub fn extract_base_depths(
    record: &VariantRecord,
    strategy: &TagStrategy,
) -> Result<BaseDepths, ScanError> {
    match strategy {
        TagStrategy::Auto => unreachable!("strategy is resolved before extraction"),
        TagStrategy::InfoCounts(tag) => {
            let raw = info_tag_value(record, tag)?;
            let counts = match parse_depth_list(raw) {
                Some(counts) => counts,
                None => {
                    log::warn!(
                        "Integer conversion failed at VCF position {}: applied to {:?}; assigning zero depths.",
                        record.pos,
                        raw
                    );
                    vec![0, 0, 0, 0]
                }
            };
            if counts.len() != 4 {
                return Err(ScanError::TagShape {
                    tag: tag.clone(),
                    pos: record.pos,
                    expected: 4,
                    found: counts.len(),
                });
            }
            Ok(BaseDepths::new(counts[0], counts[1], counts[2], counts[3]))
        }
        TagStrategy::InfoAlleleDepth => {
            let raw = info_tag_value(record, ALLELE_DEPTH_TAG)?;
            let counts = match parse_depth_list(raw) {
                Some(counts) => counts,
                None => {
                    log::warn!(
                        "Integer conversion failed at VCF position {}: applied to {:?}; assigning zero depths.",
                        record.pos,
                        raw
                    );
                    vec![0, 0, 0, 0]
                }
            };
            scatter_allele_depths(record, &counts)
        }
        TagStrategy::SampleAlleleDepth => {
            let keys = record.format_keys();
            let values = record.sample_values();
            let idx = keys.iter().position(|k| *k == ALLELE_DEPTH_TAG).ok_or_else(|| {
                ScanError::MissingTag {
                    tag: ALLELE_DEPTH_TAG.to_string(),
                    section: "format",
                    present: keys.iter().map(|k| k.to_string()).collect(),
                }
            })?;
            let raw = values.get(idx).copied().unwrap_or("");
            let counts = parse_depth_list(raw).ok_or_else(|| ScanError::BadDepthValue {
                pos: record.pos,
                value: raw.to_string(),
            })?;
            scatter_allele_depths(record, &counts)
        }
    }
}

fn info_tag_value<'a>(record: &'a VariantRecord, tag: &str) -> Result<&'a str, ScanError> {
    let info = record.info();
    match info.get(tag) {
        Some(v) => Ok(*v),
        None => Err(ScanError::MissingTag {
            tag: tag.to_string(),
            section: "info",
            present: info.keys().map(|k| k.to_string()).collect(),
        }),
    }
}

fn parse_depth_list(raw: &str) -> Option<Vec<u32>> {
    raw.split(',').map(|v| v.parse::<u32>().ok()).collect()
}

/// Scatter reference-first allele depths into the fixed A,C,G,T slots: the
/// reference base takes element 0, each single-nucleotide alternate takes
/// the next element in listed order. Unmentioned bases stay 0; repeats
/// overwrite. Bases outside A,C,G,T are dropped.
fn scatter_allele_depths(record: &VariantRecord, counts: &[u32]) -> Result<BaseDepths, ScanError> {
    let alts = record.alts();
    if counts.len() < alts.len() + 1 {
        return Err(ScanError::TagShape {
            tag: ALLELE_DEPTH_TAG.to_string(),
            pos: record.pos,
            expected: alts.len() + 1,
            found: counts.len(),
        });
    }

    let mut depths = BaseDepths::default();
    if let [ref_base] = record.ref_base.as_bytes() {
        if let Some(slot) = depths.slot_mut(*ref_base) {
            *slot = counts[0];
        }
    }
    for (i, alt) in alts.iter().enumerate() {
        if let Some(slot) = depths.slot_mut(alt.as_bytes()[0]) {
            *slot = counts[i + 1];
        }
    }
    Ok(depths)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(line: &str) -> VariantRecord {
        VariantRecord::parse(line).unwrap()
    }

    const BASECOUNTS_LINE: &str =
        "NC_000962 100 . G A,T 228 . DP=120;BaseCounts4=2,0,110,8 GT:PL 1/1:255,255,0";
    const SAMPLE_AD_LINE: &str =
        "NC_000962 100 . G A 228 . DP=120;AD=110,10 GT:AD:PL 1/1:110,10:255";

    #[test]
    fn test_parse_splits_ten_columns() {
        let rec = record(BASECOUNTS_LINE);
        assert_eq!(rec.chrom, "NC_000962");
        assert_eq!(rec.pos, 100);
        assert_eq!(rec.ref_base, "G");
        assert_eq!(rec.alts(), vec!["A", "T"]);
        assert_eq!(rec.info().get("DP"), Some(&"120"));
    }

    #[test]
    fn test_parse_rejects_wrong_column_count() {
        let err = VariantRecord::parse("NC_000962 100 . G A").unwrap_err();
        assert!(matches!(err, ScanError::MalformedLine { found: 5, .. }));
    }

    #[test]
    fn test_alts_filtered_to_single_nucleotides() {
        let rec = record("chr 5 . G A,GT,<DEL>,C 0 . DP=1 GT 0/1");
        assert_eq!(rec.alts(), vec!["A", "C"]);
    }

    #[test]
    fn test_info_tolerates_flag_entries() {
        let rec = record("chr 5 . G A 0 . DP=9;SOMEFLAG;AD=5,4 GT 0/1");
        let info = rec.info();
        assert_eq!(info.get("SOMEFLAG"), Some(&""));
        assert_eq!(info.get("AD"), Some(&"5,4"));
    }

    #[test]
    fn test_explicit_counts_extraction() {
        let rec = record(BASECOUNTS_LINE);
        let strategy = TagStrategy::from_tag_name(DEFAULT_COUNTS_TAG);
        let depths = extract_base_depths(&rec, &strategy).unwrap();
        assert_eq!(depths, BaseDepths::new(2, 0, 110, 8));
    }

    #[test]
    fn test_explicit_counts_missing_tag_is_an_error() {
        let rec = record(BASECOUNTS_LINE);
        let strategy = TagStrategy::from_tag_name("missing");
        let err = extract_base_depths(&rec, &strategy).unwrap_err();
        assert!(matches!(err, ScanError::MissingTag { .. }));
    }

    #[test]
    fn test_explicit_counts_wrong_count_is_an_error() {
        let rec = record("chr 5 . G A 0 . BaseCounts4=1,2,3 GT 0/1");
        let strategy = TagStrategy::from_tag_name(DEFAULT_COUNTS_TAG);
        let err = extract_base_depths(&rec, &strategy).unwrap_err();
        assert!(matches!(err, ScanError::TagShape { found: 3, .. }));
    }

    #[test]
    fn test_explicit_counts_parse_failure_zero_fills() {
        let rec = record("chr 5 . G A 0 . BaseCounts4=1,x,3,4 GT 0/1");
        let strategy = TagStrategy::from_tag_name(DEFAULT_COUNTS_TAG);
        let depths = extract_base_depths(&rec, &strategy).unwrap();
        assert_eq!(depths, BaseDepths::default());
    }

    #[test]
    fn test_info_allele_depth_scatter() {
        // ref G gets 110, alt A gets 8, alt T gets 2; C untouched
        let rec = record("chr 5 . G A,T 0 . AD=110,8,2 GT 0/1");
        let strategy = TagStrategy::from_tag_name(ALLELE_DEPTH_TAG);
        let depths = extract_base_depths(&rec, &strategy).unwrap();
        assert_eq!(depths, BaseDepths::new(8, 0, 110, 2));
    }

    #[test]
    fn test_allele_depth_too_few_elements_is_an_error() {
        let rec = record("chr 5 . G A,T 0 . AD=110,8 GT 0/1");
        let strategy = TagStrategy::from_tag_name(ALLELE_DEPTH_TAG);
        let err = extract_base_depths(&rec, &strategy).unwrap_err();
        assert!(matches!(err, ScanError::TagShape { expected: 3, found: 2, .. }));
    }

    #[test]
    fn test_sample_allele_depth_extraction() {
        let rec = record(SAMPLE_AD_LINE);
        let depths = extract_base_depths(&rec, &TagStrategy::SampleAlleleDepth).unwrap();
        assert_eq!(depths, BaseDepths::new(10, 0, 110, 0));
    }

    #[test]
    fn test_detection_prefers_sample_allele_depth() {
        // AD present in both the format keys and the info bag
        let rec = record(SAMPLE_AD_LINE);
        assert_eq!(
            TagStrategy::detect(&rec).unwrap(),
            TagStrategy::SampleAlleleDepth
        );
    }

    #[test]
    fn test_detection_falls_back_to_info() {
        let rec = record("chr 5 . G A 0 . AD=5,4 GT 0/1");
        assert_eq!(
            TagStrategy::detect(&rec).unwrap(),
            TagStrategy::InfoAlleleDepth
        );

        let rec = record(BASECOUNTS_LINE);
        assert_eq!(
            TagStrategy::detect(&rec).unwrap(),
            TagStrategy::InfoCounts(DEFAULT_COUNTS_TAG.to_string())
        );
    }

    #[test]
    fn test_detection_fails_without_known_tags() {
        let rec = record("chr 5 . G A 0 . DP=9 GT 0/1");
        assert!(matches!(
            TagStrategy::detect(&rec).unwrap_err(),
            ScanError::MissingTag { .. }
        ));
    }
}
