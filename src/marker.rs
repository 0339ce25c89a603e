use crate::significance::BinomialTest;
use crate::types::{BaseCallRow, MixtureCall};
use anyhow::{bail, Result};
use std::collections::BTreeMap;

/// IUPAC code for an ordered pair of distinct bases, listed by depth with the
/// more common base first. Capitalisation encodes which way round the
/// frequencies are: lower case means the first base alphabetically is the
/// more common one, upper case means the second is.
fn iupac_code(first: u8, second: u8) -> Option<u8> {
    Some(match (first, second) {
        (b'A', b'G') => b'r',
        (b'G', b'A') => b'R',
        (b'A', b'T') => b'w',
        (b'T', b'A') => b'W',
        (b'C', b'T') => b'y',
        (b'T', b'C') => b'Y',
        (b'A', b'C') => b'm',
        (b'C', b'A') => b'M',
        (b'C', b'G') => b's',
        (b'G', b'C') => b'S',
        (b'G', b'T') => b'k',
        (b'T', b'G') => b'K',
        _ => return None,
    })
}

/// Writes mixed base calls into a consensus sequence using IUPAC codes.
///
/// Candidates are positions whose minor-allele frequency and significance
/// score clear the configured cutoffs. With a clustering cutoff set, calls
/// too close to a neighbouring call are downgraded to 'N': clustered mixed
/// bases tend to reflect an underlying genomic feature such as an indel
/// rather than a genuine mix of sequences.
pub struct FastaMixtureMarker {
    mlp_cutoff: f64,
    min_maf: f64,
    clustering_cutoff: Option<usize>,
    tester: BinomialTest,
}

impl FastaMixtureMarker {
    pub fn new(
        expected_error_rate: f64,
        mlp_cutoff: f64,
        min_maf: f64,
        clustering_cutoff: Option<usize>,
    ) -> Result<Self> {
        Ok(FastaMixtureMarker {
            mlp_cutoff,
            min_maf,
            clustering_cutoff,
            tester: BinomialTest::new(expected_error_rate)?,
        })
    }

    /// Annotate `seq` (0-indexed consensus bases) with the qualifying calls
    /// of `rows` (1-indexed table positions). Returns the accepted-call
    /// table, sorted by position, excluding suppressed calls and 0-indexed
    /// position 0.
    pub fn mark_mixed(
        &mut self,
        seq: &mut Vec<u8>,
        rows: &[BaseCallRow],
    ) -> Result<Vec<MixtureCall>> {
        let mut candidates: BTreeMap<usize, u8> = BTreeMap::new();

        for row in rows {
            let Some(maf) = row.maf else { continue };
            if maf.is_nan() || maf < self.min_maf {
                continue;
            }

            let mlp = match row.mlp {
                Some(mlp) if !mlp.is_nan() => mlp,
                _ => {
                    let nonmajor = u64::from(row.depths.nonmajor());
                    match self.tester.compute(nonmajor, u64::from(row.depth)).1 {
                        Some(mlp) => mlp,
                        None => continue,
                    }
                }
            };
            if mlp < self.mlp_cutoff {
                continue;
            }

            if row.pos == 0 {
                log::warn!("Ignoring mixed-base row at position 0; positions are 1-indexed.");
                continue;
            }
            let pos = (row.pos - 1) as usize;
            if pos >= seq.len() {
                bail!(
                    "mixed-base position {} lies beyond the consensus sequence (length {})",
                    row.pos,
                    seq.len()
                );
            }

            // stable sort keeps A,C,G,T order on depth ties
            let mut by_depth = [
                (b'A', row.depths.a),
                (b'C', row.depths.c),
                (b'G', row.depths.g),
                (b'T', row.depths.t),
            ];
            by_depth.sort_by_key(|&(_, depth)| std::cmp::Reverse(depth));
            let code = iupac_code(by_depth[0].0, by_depth[1].0)
                .expect("top two of four distinct bases always map");
            candidates.insert(pos, code);
        }

        let positions: Vec<usize> = candidates.keys().copied().collect();

        // Downgrade interior calls within the clustering cutoff of either
        // neighbour. The first and last candidates are never examined.
        if let Some(cutoff) = self.clustering_cutoff {
            for i in 1..positions.len().saturating_sub(1) {
                if positions[i] - positions[i - 1] <= cutoff
                    || positions[i + 1] - positions[i] <= cutoff
                {
                    candidates.insert(positions[i], b'N');
                }
            }
        }

        // Only interior candidates are written into the sequence; the first
        // and last are collected but never applied. Possible off-by-one in
        // the reference behavior, reproduced as observed.
        for i in 1..positions.len().saturating_sub(1) {
            seq[positions[i]] = candidates[&positions[i]];
        }

        Ok(candidates
            .into_iter()
            .filter(|&(pos, base)| base != b'N' && pos > 0)
            .map(|(pos, base)| MixtureCall { pos, base })
            .collect())
    }
}
