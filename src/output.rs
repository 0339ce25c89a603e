use crate::types::{BaseCallRow, RegionSummary};
use anyhow::Result;
use csv::Writer;
use std::path::Path;

fn opt_f64(value: Option<f64>) -> String {
    value.map(|v| format!("{:.6}", v)).unwrap_or_default()
}

/// Write the base-call table. Undefined maf/mlp serialize as empty fields.
pub fn write_base_calls(rows: &[BaseCallRow], path: &Path) -> Result<()> {
    let mut wtr = Writer::from_path(path)?;

    wtr.write_record([
        "roi_name", "pos", "ref", "depth", "base_a", "base_c", "base_g", "base_t", "maf", "mlp",
    ])?;

    for row in rows {
        wtr.write_record([
            &row.roi_name,
            &row.pos.to_string(),
            &row.ref_base,
            &row.depth.to_string(),
            &row.depths.a.to_string(),
            &row.depths.c.to_string(),
            &row.depths.g.to_string(),
            &row.depths.t.to_string(),
            &opt_f64(row.maf),
            &opt_f64(row.mlp),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Write the per-region summary table. The lineage use case appends a
/// sample identifier column keying the persisted table.
pub fn write_region_stats(
    summaries: &[RegionSummary],
    sample_id: Option<&str>,
    path: &Path,
) -> Result<()> {
    let mut wtr = Writer::from_path(path)?;

    let mut header = vec![
        "roi_name", "mean_depth", "min_depth", "max_depth", "start", "stop", "length", "mean_maf",
        "total_depth", "total_nonmajor_depth",
    ];
    if sample_id.is_some() {
        header.push("sample_id");
    }
    wtr.write_record(&header)?;

    for s in summaries {
        let mut record = vec![
            s.roi_name.clone(),
            format!("{:.6}", s.mean_depth),
            s.min_depth.to_string(),
            s.max_depth.to_string(),
            s.start.to_string(),
            s.stop.to_string(),
            s.length.to_string(),
            opt_f64(s.mean_maf),
            s.total_depth.to_string(),
            s.total_nonmajor_depth.to_string(),
        ];
        if let Some(sample_id) = sample_id {
            record.push(sample_id.to_string());
        }
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}
