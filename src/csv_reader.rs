use crate::types::{BaseCallRow, BaseDepths, RegionSummary};
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::Path;

fn parse_opt_f64(field: &str) -> Option<f64> {
    if field.is_empty() {
        return None;
    }
    field.parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Read a persisted base-call table, e.g. for marking a consensus sequence
/// from a previous scan. Empty (or NaN) maf/mlp fields read back as
/// undefined. An entirely empty file yields an empty table.
pub fn load_base_calls(path: &Path) -> Result<Vec<BaseCallRow>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open base-call file: {}", path.display()))?;

    let mut rows = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Failed to parse base-call row {}", i + 1))?;
        let ctx = || format!("base-call row {}", i + 1);

        let depths = BaseDepths::new(
            record.get(4).with_context(ctx)?.parse().with_context(ctx)?,
            record.get(5).with_context(ctx)?.parse().with_context(ctx)?,
            record.get(6).with_context(ctx)?.parse().with_context(ctx)?,
            record.get(7).with_context(ctx)?.parse().with_context(ctx)?,
        );
        rows.push(BaseCallRow {
            roi_name: record.get(0).with_context(ctx)?.to_string(),
            pos: record.get(1).with_context(ctx)?.parse().with_context(ctx)?,
            ref_base: record.get(2).with_context(ctx)?.to_string(),
            depth: record.get(3).with_context(ctx)?.parse().with_context(ctx)?,
            depths,
            maf: parse_opt_f64(record.get(8).with_context(ctx)?),
            mlp: parse_opt_f64(record.get(9).with_context(ctx)?),
        });
    }
    Ok(rows)
}

const REGION_STATS_COLUMNS: [&str; 11] = [
    "roi_name",
    "mean_depth",
    "min_depth",
    "max_depth",
    "start",
    "stop",
    "length",
    "mean_maf",
    "total_depth",
    "total_nonmajor_depth",
    "sample_id",
];

/// Read a persisted region-summary table, as written by a lineage scan. The
/// column set must match the expected schema exactly; anything else fails,
/// listing the differences.
pub fn load_region_stats(path: &Path) -> Result<Vec<RegionSummary>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open region summary file: {}", path.display()))?;

    let headers = rdr.headers()?.clone();
    let existing: BTreeSet<&str> = headers.iter().collect();
    let expected: BTreeSet<&str> = REGION_STATS_COLUMNS.into_iter().collect();
    if existing != expected {
        let missing: Vec<&&str> = expected.difference(&existing).collect();
        let surplus: Vec<&&str> = existing.difference(&expected).collect();
        anyhow::bail!(
            "region summary file {} has columns {:?}, expected {:?}; missing: {:?}; surplus: {:?}",
            path.display(),
            existing,
            expected,
            missing,
            surplus
        );
    }

    let col = |name: &str| headers.iter().position(|h| h == name).unwrap();
    let (c_roi, c_mean, c_min, c_max) = (
        col("roi_name"),
        col("mean_depth"),
        col("min_depth"),
        col("max_depth"),
    );
    let (c_start, c_stop, c_len, c_maf) =
        (col("start"), col("stop"), col("length"), col("mean_maf"));
    let (c_total, c_nonmajor) = (col("total_depth"), col("total_nonmajor_depth"));

    let mut summaries = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record =
            record.with_context(|| format!("Failed to parse region summary row {}", i + 1))?;
        let ctx = || format!("region summary row {}", i + 1);

        summaries.push(RegionSummary {
            roi_name: record.get(c_roi).with_context(ctx)?.to_string(),
            mean_depth: record.get(c_mean).with_context(ctx)?.parse().with_context(ctx)?,
            min_depth: record.get(c_min).with_context(ctx)?.parse().with_context(ctx)?,
            max_depth: record.get(c_max).with_context(ctx)?.parse().with_context(ctx)?,
            start: record.get(c_start).with_context(ctx)?.parse().with_context(ctx)?,
            stop: record.get(c_stop).with_context(ctx)?.parse().with_context(ctx)?,
            length: record.get(c_len).with_context(ctx)?.parse().with_context(ctx)?,
            mean_maf: parse_opt_f64(record.get(c_maf).with_context(ctx)?),
            total_depth: record.get(c_total).with_context(ctx)?.parse().with_context(ctx)?,
            total_nonmajor_depth: record
                .get(c_nonmajor)
                .with_context(ctx)?
                .parse()
                .with_context(ctx)?,
        });
    }
    Ok(summaries)
}
