use crate::errors::ScanError;
use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Bidirectional mapping between named regions of interest and the 1-indexed
/// genomic positions that define them. The inverse map is maintained on every
/// insertion, so the two views never disagree.
#[derive(Debug, Clone, Default)]
pub struct RegionIndex {
    roi2psn: BTreeMap<String, BTreeSet<u64>>,
    psn2roi: BTreeMap<u64, BTreeSet<String>>,
}

impl RegionIndex {
    pub fn new() -> Self {
        RegionIndex::default()
    }

    /// Add a region of interest. Positions must be 1-indexed; re-adding a
    /// position a region already holds is a no-op. No operation removes a
    /// region.
    pub fn add_region(
        &mut self,
        roi_name: &str,
        positions: impl IntoIterator<Item = u64>,
    ) -> Result<(), ScanError> {
        let entry = self.roi2psn.entry(roi_name.to_string()).or_default();
        for pos in positions {
            if pos == 0 {
                return Err(ScanError::ZeroPosition {
                    roi: roi_name.to_string(),
                });
            }
            entry.insert(pos);
            self.psn2roi
                .entry(pos)
                .or_default()
                .insert(roi_name.to_string());
        }
        Ok(())
    }

    /// Positions belonging to one region, if registered.
    pub fn positions_of(&self, roi_name: &str) -> Option<&BTreeSet<u64>> {
        self.roi2psn.get(roi_name)
    }

    /// Regions referencing one position.
    pub fn regions_at(&self, pos: u64) -> Option<&BTreeSet<String>> {
        self.psn2roi.get(&pos)
    }

    /// All distinct sought positions in ascending order.
    pub fn sorted_positions(&self) -> Vec<u64> {
        self.psn2roi.keys().copied().collect()
    }

    pub fn region_names(&self) -> impl Iterator<Item = &str> {
        self.roi2psn.keys().map(|s| s.as_str())
    }

    pub fn num_regions(&self) -> usize {
        self.roi2psn.len()
    }

    pub fn num_positions(&self) -> usize {
        self.psn2roi.len()
    }
}

/// One row of a lineage-definition table.
#[derive(Debug, Clone)]
pub struct LineageDefinition {
    pub lineage: String,
    pub position: u64,
}

/// Load a lineage-definition table (CSV with `lineage` and `position`
/// columns, e.g. the Coll et al. lineage-defining SNPs).
pub fn load_lineage_definitions(path: &Path) -> Result<Vec<LineageDefinition>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open lineage definition file: {}", path.display()))?;

    let headers = rdr.headers()?.clone();
    let lineage_idx = headers
        .iter()
        .position(|h| h == "lineage")
        .context("lineage definition file has no 'lineage' column")?;
    let position_idx = headers
        .iter()
        .position(|h| h == "position")
        .context("lineage definition file has no 'position' column")?;

    let mut defs = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Failed to parse lineage row {}", i + 1))?;
        let lineage = record
            .get(lineage_idx)
            .with_context(|| format!("lineage row {}", i + 1))?
            .to_string();
        let position: u64 = record
            .get(position_idx)
            .with_context(|| format!("lineage row {}", i + 1))?
            .parse()
            .with_context(|| format!("lineage row {}: bad position", i + 1))?;
        defs.push(LineageDefinition { lineage, position });
    }
    Ok(defs)
}

/// Load an exclusion list (CSV with a `pos` column) of positions never to
/// call, e.g. high-variation repeat regions.
pub fn load_exclusions(path: &Path) -> Result<BTreeSet<u64>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open exclusion file: {}", path.display()))?;

    let headers = rdr.headers()?.clone();
    let pos_idx = headers
        .iter()
        .position(|h| h == "pos")
        .context("exclusion file has no 'pos' column")?;

    let mut excluded = BTreeSet::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Failed to parse exclusion row {}", i + 1))?;
        let pos: u64 = record
            .get(pos_idx)
            .with_context(|| format!("exclusion row {}", i + 1))?
            .parse()
            .with_context(|| format!("exclusion row {}: bad position", i + 1))?;
        excluded.insert(pos);
    }
    Ok(excluded)
}

/// Build a region index with one region per lineage, excluding any position
/// in the exclusion set.
pub fn lineage_region_index(
    definitions: &[LineageDefinition],
    excluded: &BTreeSet<u64>,
) -> Result<RegionIndex> {
    let mut by_lineage: BTreeMap<&str, BTreeSet<u64>> = BTreeMap::new();
    for def in definitions {
        by_lineage
            .entry(def.lineage.as_str())
            .or_default()
            .insert(def.position);
    }

    let mut index = RegionIndex::new();
    for (lineage, positions) in by_lineage {
        index.add_region(
            lineage,
            positions.into_iter().filter(|p| !excluded.contains(p)),
        )?;
    }
    Ok(index)
}
