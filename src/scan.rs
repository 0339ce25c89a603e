use crate::regions::RegionIndex;
use crate::significance::BinomialTest;
use crate::statistics;
use crate::types::{BaseCallRow, RegionSummary};
use crate::vcf_parser::{extract_base_depths, open_vcf_reader, TagStrategy, VariantRecord};
use anyhow::Result;
use std::collections::VecDeque;
use std::io::BufRead;
use std::path::Path;

macro_rules! progress {
    ($quiet:expr, $($arg:tt)*) => {
        if !$quiet {
            eprintln!($($arg)*);
        }
    };
}

/// Sentinel sought position used once the queue is exhausted mid-recovery:
/// larger than any legal genome coordinate, so no further record can match.
const UNREACHABLE_POS: u64 = u64::MAX;

/// Outcome of one scan. `complete` is false when the stream was truncated or
/// corrupted mid-read, which is distinct from a complete scan that simply
/// matched nothing; in that case no rows or summaries are reported.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub bases: Vec<BaseCallRow>,
    pub region_stats: Option<Vec<RegionSummary>>,
    pub complete: bool,
}

/// Configuration for a position-synchronized scan.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Expected per-base background error rate.
    pub expected_error_rate: f64,
    /// Source of the per-base depths; `Auto` resolves at the first match.
    pub tag: TagStrategy,
    /// Rows with maf below this are not reported; when greater than zero,
    /// rows with undefined maf are not reported either.
    pub report_minimum_maf: f64,
    /// Run the exact binomial test per matched position.
    pub compute_pvalue: bool,
    pub quiet: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            expected_error_rate: 0.001,
            tag: TagStrategy::from_tag_name(crate::vcf_parser::DEFAULT_COUNTS_TAG),
            report_minimum_maf: 0.0,
            compute_pvalue: true,
            quiet: true,
        }
    }
}

/// Scans a variant stream for the positions of a region index, advancing a
/// cursor over the sorted sought positions in lock-step with the sorted
/// stream of records. Owns the live scan state for the duration of one file
/// scan; the resolved tag strategy is memoized across scans.
pub struct VcfScanner {
    regions: RegionIndex,
    config: ScanConfig,
    tester: BinomialTest,
}

impl VcfScanner {
    pub fn new(regions: RegionIndex, config: ScanConfig) -> Result<Self> {
        let tester = BinomialTest::new(config.expected_error_rate)?;
        Ok(VcfScanner {
            regions,
            config,
            tester,
        })
    }

    pub fn regions(&self) -> &RegionIndex {
        &self.regions
    }

    /// Scan one VCF file. Structural faults (malformed lines, missing or
    /// misshapen tags) abort with an error; mid-read stream corruption is
    /// reported through `ScanResult::complete` instead.
    pub fn scan(&mut self, path: &Path) -> Result<ScanResult> {
        let reader = std::io::BufReader::new(open_vcf_reader(path)?);

        let mut sought: VecDeque<u64> = self.regions.sorted_positions().into();
        let mut rows: Vec<BaseCallRow> = Vec::new();
        let mut complete = true;
        let mut gap_warned = false;
        let mut lines_seen: u64 = 0;

        // With nothing sought, the stream is not read at all.
        if let Some(mut sought_now) = sought.pop_front() {
            if sought_now == 0 {
                // cannot happen through RegionIndex, handled defensively
                log::warn!("Asked to scan base 0; positions should be 1-indexed.");
            }

            'lines: for line in reader.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        // truncated or corrupt stream; report rather than raise
                        log::warn!("VCF stream ended abnormally: {}", e);
                        complete = false;
                        break;
                    }
                };
                lines_seen += 1;
                if lines_seen % 100_000 == 0 {
                    progress!(self.config.quiet, "Processed {} lines...", lines_seen);
                }

                if line.starts_with('#') {
                    continue;
                }
                // indel records carry no usable base depths
                if line.contains("INDEL") {
                    continue;
                }

                let record = VariantRecord::parse(&line)?;

                // If the stream has overtaken the sought position, not every
                // base was called: discard sought positions at or before the
                // current record and carry on. Warned once per scan.
                if record.pos > sought_now {
                    if !gap_warned {
                        log::warn!(
                            "Not all positions are called in the VCF: gap observed near bases {}..{}; adjusting scan. Subsequent gaps will not be reported.",
                            sought_now,
                            record.pos
                        );
                        gap_warned = true;
                    }
                    while sought_now <= record.pos {
                        match sought.pop_front() {
                            Some(next) => sought_now = next,
                            None => {
                                sought_now = UNREACHABLE_POS;
                                break;
                            }
                        }
                    }
                }

                if record.pos == sought_now {
                    self.report_match(&record, &mut rows)?;
                    match sought.pop_front() {
                        Some(next) => sought_now = next,
                        // all positions consumed; the rest of the file is not read
                        None => break 'lines,
                    }
                }
            }
        }

        progress!(
            self.config.quiet,
            "Scan finished: {} lines read, {} base calls reported",
            lines_seen,
            rows.len()
        );

        if !complete {
            return Ok(ScanResult {
                bases: Vec::new(),
                region_stats: None,
                complete: false,
            });
        }

        let region_stats = statistics::summarize_regions(&rows);
        Ok(ScanResult {
            bases: rows,
            region_stats,
            complete: true,
        })
    }

    /// A record at the sought position: resolve the tag strategy if still
    /// automatic, extract depths, derive maf and significance, and emit one
    /// row per region referencing the position (subject to the minimum-maf
    /// filter).
    fn report_match(&mut self, record: &VariantRecord, rows: &mut Vec<BaseCallRow>) -> Result<()> {
        if self.config.tag == TagStrategy::Auto {
            self.config.tag = TagStrategy::detect(record)?;
            progress!(
                self.config.quiet,
                "Depth tag auto-detection resolved to {:?}",
                self.config.tag
            );
        }

        let depths = extract_base_depths(record, &self.config.tag)?;
        let depth = depths.total();
        let sorted = depths.sorted_desc();

        let maf = if depth > 0 {
            Some(f64::from(sorted[1]) / f64::from(depth))
        } else {
            None
        };

        let mlp = if self.config.compute_pvalue {
            let minor_count = u64::from(depth - sorted[0]);
            self.tester.compute(minor_count, u64::from(depth)).1
        } else {
            None
        };

        let Some(rois) = self.regions.regions_at(record.pos) else {
            return Ok(());
        };
        for roi_name in rois {
            let report_base = match maf {
                None => self.config.report_minimum_maf <= 0.0,
                Some(maf) => maf >= self.config.report_minimum_maf,
            };
            if report_base {
                rows.push(BaseCallRow {
                    roi_name: roi_name.clone(),
                    pos: record.pos,
                    ref_base: record.ref_base.clone(),
                    depth,
                    depths,
                    maf,
                    mlp,
                });
            }
        }
        Ok(())
    }
}
