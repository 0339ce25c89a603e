use crate::errors::ScanError;
use statrs::distribution::{Binomial, Discrete, DiscreteCDF};
use std::collections::HashMap;

/// Minus-log-p reported when the p-value underflows to zero in float format.
pub const MLP_SATURATION: f64 = 250.0;

/// Exact two-sided binomial test of a minor-variant count against an
/// expected background error rate, with per-instance memoization: each
/// distinct (minor_count, depth) pair is tested once and the p-value reused
/// for the remainder of the tester's lifetime.
#[derive(Debug, Clone)]
pub struct BinomialTest {
    expected_error_rate: f64,
    p_values: HashMap<(u64, u64), f64>,
}

impl BinomialTest {
    /// Create a tester for a given background error rate, a probability
    /// strictly between 0 and 1.
    pub fn new(expected_error_rate: f64) -> Result<Self, ScanError> {
        if !expected_error_rate.is_finite()
            || expected_error_rate <= 0.0
            || expected_error_rate >= 1.0
        {
            return Err(ScanError::InvalidErrorRate {
                rate: expected_error_rate,
            });
        }
        Ok(BinomialTest {
            expected_error_rate,
            p_values: HashMap::new(),
        })
    }

    pub fn expected_error_rate(&self) -> f64 {
        self.expected_error_rate
    }

    /// Compute the test for `minor_count` nonmajor reads out of `depth`.
    /// Returns (p-value, -log10 p). Both are undefined at zero depth. When
    /// the nonmajor count equals the full depth the result is exactly (1, 0)
    /// without running the test; this mirrors the reference behavior at that
    /// boundary and is kept as-is.
    pub fn compute(&mut self, minor_count: u64, depth: u64) -> (Option<f64>, Option<f64>) {
        if depth == 0 {
            return (None, None);
        }
        if minor_count == depth {
            return (Some(1.0), Some(0.0));
        }

        let rate = self.expected_error_rate;
        let p_value = *self
            .p_values
            .entry((minor_count, depth))
            .or_insert_with(|| two_sided_binomial_test(minor_count, depth, rate));

        let mlp = if p_value == 0.0 {
            MLP_SATURATION
        } else {
            -p_value.log10()
        };
        (Some(p_value), Some(mlp))
    }

    /// Number of distinct (minor_count, depth) pairs tested so far.
    pub fn cache_len(&self) -> usize {
        self.p_values.len()
    }
}

/// Exact two-sided binomial test: the probability, under Binomial(n, p), of
/// any outcome at most as likely as observing `x` successes. Sums the
/// observed tail plus every outcome on the far side of the mean whose point
/// probability does not exceed pmf(x), with the customary relative-error
/// guard on the comparison.
fn two_sided_binomial_test(x: u64, n: u64, p: f64) -> f64 {
    let dist = Binomial::new(p, n).expect("error rate validated on construction");
    let d = dist.pmf(x);
    let d_star = d * (1.0 + 1e-7);
    let mean = n as f64 * p;

    let p_value = if (x as f64) == mean {
        1.0
    } else if (x as f64) < mean {
        // pmf is nonincreasing on [ceil(mean), n]: find the smallest j there
        // with pmf(j) <= d_star and take everything from j upward.
        let lo = mean.ceil() as u64;
        match smallest_with_pmf_at_most(&dist, lo, n, d_star) {
            Some(j) if j == 0 => 1.0,
            Some(j) => dist.cdf(x) + (1.0 - dist.cdf(j - 1)),
            None => dist.cdf(x),
        }
    } else {
        // pmf is nondecreasing on [0, floor(mean)]: find the largest j there
        // with pmf(j) <= d_star and take everything up to j.
        let hi = mean.floor() as u64;
        let head = match largest_with_pmf_at_most(&dist, hi, d_star) {
            Some(j) => dist.cdf(j),
            None => 0.0,
        };
        let tail = if x == 0 { 1.0 } else { 1.0 - dist.cdf(x - 1) };
        head + tail
    };

    p_value.min(1.0)
}

/// Smallest j in [lo, hi] with pmf(j) <= limit, given pmf nonincreasing on
/// the range.
fn smallest_with_pmf_at_most(dist: &Binomial, lo: u64, hi: u64, limit: f64) -> Option<u64> {
    if lo > hi || dist.pmf(hi) > limit {
        return None;
    }
    let (mut lo, mut hi) = (lo, hi);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if dist.pmf(mid) <= limit {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    Some(lo)
}

/// Largest j in [0, hi] with pmf(j) <= limit, given pmf nondecreasing on the
/// range.
fn largest_with_pmf_at_most(dist: &Binomial, hi: u64, limit: f64) -> Option<u64> {
    if dist.pmf(0) > limit {
        return None;
    }
    let (mut lo, mut hi) = (0u64, hi);
    while lo < hi {
        let mid = lo + (hi - lo).div_ceil(2);
        if dist.pmf(mid) <= limit {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    Some(lo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_invalid_error_rate_rejected() {
        assert!(BinomialTest::new(0.0).is_err());
        assert!(BinomialTest::new(1.0).is_err());
        assert!(BinomialTest::new(-0.5).is_err());
        assert!(BinomialTest::new(f64::NAN).is_err());
        assert!(BinomialTest::new(0.001).is_ok());
    }

    #[test]
    fn test_zero_depth_undefined() {
        let mut bt = BinomialTest::new(0.001).unwrap();
        assert_eq!(bt.compute(0, 0), (None, None));
    }

    #[test]
    fn test_minor_equals_depth_boundary() {
        let mut bt = BinomialTest::new(0.001).unwrap();
        assert_eq!(bt.compute(1, 1), (Some(1.0), Some(0.0)));
        assert_eq!(bt.compute(50, 50), (Some(1.0), Some(0.0)));
        // the boundary short-circuit never touches the cache
        assert_eq!(bt.cache_len(), 0);
    }

    #[test]
    fn test_no_minor_variation_is_not_significant() {
        let mut bt = BinomialTest::new(0.001).unwrap();
        let (p, mlp) = bt.compute(0, 1);
        assert_relative_eq!(p.unwrap(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(mlp.unwrap(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_strong_mixture_is_significant() {
        let mut bt = BinomialTest::new(0.001).unwrap();
        let (p, mlp) = bt.compute(20, 100);
        assert!(p.unwrap() < 1e-10);
        assert!(mlp.unwrap() > 10.0);
    }

    #[test]
    fn test_mlp_saturates_at_250() {
        let mut bt = BinomialTest::new(0.001).unwrap();
        // p underflows to zero in float format for an extreme mixture
        let (p, mlp) = bt.compute(900, 1000);
        assert_eq!(p.unwrap(), 0.0);
        assert_eq!(mlp.unwrap(), MLP_SATURATION);
    }

    #[test]
    fn test_repeated_calls_hit_the_cache() {
        let mut bt = BinomialTest::new(0.001).unwrap();
        let first = bt.compute(3, 120);
        assert_eq!(bt.cache_len(), 1);
        let second = bt.compute(3, 120);
        assert_eq!(bt.cache_len(), 1);
        // byte-identical, not merely approximately equal
        assert_eq!(first.0.unwrap().to_bits(), second.0.unwrap().to_bits());
        assert_eq!(first.1.unwrap().to_bits(), second.1.unwrap().to_bits());
    }

    #[test]
    fn test_two_sided_matches_reference_values() {
        // reference values from scipy.stats.binom_test
        assert_relative_eq!(
            two_sided_binomial_test(2, 10, 0.5),
            0.109375,
            epsilon = 1e-9
        );
        assert_relative_eq!(
            two_sided_binomial_test(5, 10, 0.5),
            1.0,
            epsilon = 1e-9
        );
        // p(0 successes) exceeds pmf(1), so the whole mass is the upper tail
        assert_relative_eq!(
            two_sided_binomial_test(1, 100, 0.001),
            1.0 - 0.999f64.powi(100),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_p_values_within_range() {
        let mut bt = BinomialTest::new(0.01).unwrap();
        for depth in [1u64, 5, 50, 500] {
            for minor in 0..=depth.min(10) {
                let (p, mlp) = bt.compute(minor, depth);
                let p = p.unwrap();
                assert!((0.0..=1.0).contains(&p), "p out of range: {}", p);
                assert!(mlp.unwrap() >= 0.0);
            }
        }
    }
}
