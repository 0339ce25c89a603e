use crate::types::{BaseCallRow, FStatistics, MixtureQuality, RegionSummary};
use std::collections::BTreeMap;

/// Number of lineage-defining regions required before F statistics are
/// meaningful.
pub const MIN_SCORED_REGIONS: usize = 58;
/// F2 is taken over the regions with the two highest mean mafs.
pub const F2_REGIONS: usize = 2;
/// F47 is taken over the 47 regions with the lowest mean mafs.
pub const F47_REGIONS: usize = 47;

/// Reduce the base-call table into one summary row per region. Returns None
/// when there are no rows at all; a region whose rows all lack maf gets a
/// present-but-undefined mean maf, not an error.
pub fn summarize_regions(rows: &[BaseCallRow]) -> Option<Vec<RegionSummary>> {
    if rows.is_empty() {
        return None;
    }

    let mut groups: BTreeMap<&str, Vec<&BaseCallRow>> = BTreeMap::new();
    for row in rows {
        groups.entry(row.roi_name.as_str()).or_default().push(row);
    }

    let summaries = groups
        .into_iter()
        .map(|(roi_name, group)| {
            let n = group.len() as f64;
            let total_depth: u64 = group.iter().map(|r| u64::from(r.depth)).sum();
            let total_nonmajor_depth: u64 =
                group.iter().map(|r| u64::from(r.depths.nonmajor())).sum();

            let mafs: Vec<f64> = group.iter().filter_map(|r| r.maf).collect();
            let mean_maf = if mafs.is_empty() {
                None
            } else {
                Some(mafs.iter().sum::<f64>() / mafs.len() as f64)
            };

            RegionSummary {
                roi_name: roi_name.to_string(),
                mean_depth: total_depth as f64 / n,
                min_depth: group.iter().map(|r| r.depth).min().unwrap_or(0),
                max_depth: group.iter().map(|r| r.depth).max().unwrap_or(0),
                start: group.iter().map(|r| r.pos).min().unwrap_or(0),
                stop: group.iter().map(|r| r.pos).max().unwrap_or(0),
                length: group.len() as u64,
                mean_maf,
                total_depth,
                total_nonmajor_depth,
            }
        })
        .collect();

    Some(summaries)
}

/// F2 and F47 mixture statistics over lineage-defining region summaries.
///
/// Regions are ranked by mean maf, highest first (undefined last). F2 is the
/// nonmajor fraction of the top two regions; F47 the nonmajor fraction of the
/// bottom 47. Fewer than 58 summaries, or a zero read total on either side,
/// yields quality `bad` with both scores undefined.
pub fn f_statistics(summaries: &[RegionSummary]) -> FStatistics {
    if summaries.len() < MIN_SCORED_REGIONS {
        return FStatistics {
            mixture_quality: MixtureQuality::Bad,
            f2: None,
            f47: None,
        };
    }

    let mut sorted: Vec<&RegionSummary> = summaries.iter().collect();
    sorted.sort_by(|a, b| match (a.mean_maf, b.mean_maf) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(std::cmp::Ordering::Equal),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    let top = &sorted[..F2_REGIONS];
    let bottom = &sorted[sorted.len() - F47_REGIONS..];

    let depth_sum = |group: &[&RegionSummary]| -> u64 {
        group.iter().map(|s| s.total_depth).sum()
    };
    let nonmajor_sum = |group: &[&RegionSummary]| -> u64 {
        group.iter().map(|s| s.total_nonmajor_depth).sum()
    };

    let f2_denominator = depth_sum(top);
    let f47_denominator = depth_sum(bottom);

    // with no reads there is nothing to divide by
    if f2_denominator == 0 || f47_denominator == 0 {
        return FStatistics {
            mixture_quality: MixtureQuality::Bad,
            f2: None,
            f47: None,
        };
    }

    FStatistics {
        mixture_quality: MixtureQuality::Ok,
        f2: Some(nonmajor_sum(top) as f64 / f2_denominator as f64),
        f47: Some(nonmajor_sum(bottom) as f64 / f47_denominator as f64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BaseDepths;
    use approx::assert_relative_eq;

    fn row(roi: &str, pos: u64, depths: BaseDepths, maf: Option<f64>) -> BaseCallRow {
        BaseCallRow {
            roi_name: roi.to_string(),
            pos,
            ref_base: "G".to_string(),
            depth: depths.total(),
            depths,
            maf,
            mlp: None,
        }
    }

    #[test]
    fn test_summarize_empty_is_none() {
        assert!(summarize_regions(&[]).is_none());
    }

    #[test]
    fn test_summarize_single_region() {
        let rows = vec![
            row("One", 10, BaseDepths::new(80, 0, 20, 0), Some(0.2)),
            row("One", 12, BaseDepths::new(50, 0, 0, 0), Some(0.0)),
        ];
        let summaries = summarize_regions(&rows).unwrap();
        assert_eq!(summaries.len(), 1);
        let s = &summaries[0];
        assert_eq!(s.roi_name, "One");
        assert_relative_eq!(s.mean_depth, 75.0);
        assert_eq!((s.min_depth, s.max_depth), (50, 100));
        assert_eq!((s.start, s.stop, s.length), (10, 12, 2));
        assert_relative_eq!(s.mean_maf.unwrap(), 0.1);
        assert_eq!(s.total_depth, 150);
        // nonmajor: (100 - 80) + (50 - 50)
        assert_eq!(s.total_nonmajor_depth, 20);
    }

    #[test]
    fn test_summarize_mean_maf_ignores_undefined() {
        let rows = vec![
            row("One", 1, BaseDepths::new(80, 0, 20, 0), Some(0.2)),
            row("One", 2, BaseDepths::default(), None),
        ];
        let summaries = summarize_regions(&rows).unwrap();
        assert_relative_eq!(summaries[0].mean_maf.unwrap(), 0.2);
    }

    #[test]
    fn test_summarize_all_undefined_maf_is_present_but_null() {
        let rows = vec![
            row("One", 1, BaseDepths::default(), None),
            row("Two", 2, BaseDepths::default(), None),
        ];
        let summaries = summarize_regions(&rows).unwrap();
        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().all(|s| s.mean_maf.is_none()));
    }

    fn summary(roi: &str, mean_maf: Option<f64>, total: u64, nonmajor: u64) -> RegionSummary {
        RegionSummary {
            roi_name: roi.to_string(),
            mean_depth: total as f64,
            min_depth: 0,
            max_depth: 0,
            start: 1,
            stop: 1,
            length: 1,
            mean_maf,
            total_depth: total,
            total_nonmajor_depth: nonmajor,
        }
    }

    fn lineage_summaries(n: usize) -> Vec<RegionSummary> {
        (0..n)
            .map(|i| {
                summary(
                    &format!("lineage{}", i),
                    Some(i as f64 / n as f64),
                    1000,
                    10,
                )
            })
            .collect()
    }

    #[test]
    fn test_f_statistics_too_few_regions_is_bad() {
        let fs = f_statistics(&lineage_summaries(MIN_SCORED_REGIONS - 1));
        assert_eq!(fs.mixture_quality, MixtureQuality::Bad);
        assert!(fs.f2.is_none() && fs.f47.is_none());
    }

    #[test]
    fn test_f_statistics_scores_in_unit_interval() {
        let fs = f_statistics(&lineage_summaries(64));
        assert_eq!(fs.mixture_quality, MixtureQuality::Ok);
        let (f2, f47) = (fs.f2.unwrap(), fs.f47.unwrap());
        assert!((0.0..=1.0).contains(&f2));
        assert!((0.0..=1.0).contains(&f47));
        assert_relative_eq!(f2, 0.01);
        assert_relative_eq!(f47, 0.01);
    }

    #[test]
    fn test_f_statistics_uses_top_and_bottom_by_maf() {
        let mut summaries = lineage_summaries(58);
        // make the two highest-maf regions heavily mixed
        summaries[56] = summary("hi1", Some(0.99), 100, 50);
        summaries[57] = summary("hi2", Some(1.0), 100, 30);
        let fs = f_statistics(&summaries);
        assert_relative_eq!(fs.f2.unwrap(), 80.0 / 200.0);
    }

    #[test]
    fn test_f_statistics_zero_denominator_is_bad() {
        let summaries: Vec<RegionSummary> = (0..58)
            .map(|i| summary(&format!("l{}", i), Some(0.0), 0, 0))
            .collect();
        let fs = f_statistics(&summaries);
        assert_eq!(fs.mixture_quality, MixtureQuality::Bad);
        assert!(fs.f2.is_none() && fs.f47.is_none());
    }

    #[test]
    fn test_f_statistics_undefined_maf_sorts_last() {
        let mut summaries = lineage_summaries(58);
        summaries[0] = summary("nodata", None, 0, 0);
        // the undefined region lands in the bottom 47, zeroing nothing but
        // still counted there; denominators stay nonzero
        let fs = f_statistics(&summaries);
        assert_eq!(fs.mixture_quality, MixtureQuality::Ok);
    }
}
