//! Robust statistics over small timing samples
//!
//! The outlier test uses the median and the median absolute deviation (MAD)
//! instead of mean/stddev: a single extreme sample in the archive shifts
//! neither statistic much.

/// Median of `samples`, 0 for an empty slice
///
/// Sorted ascending, 0-based: odd length takes element `n / 2`, even length
/// averages elements `n / 2 - 1` and `n / 2`.
pub fn median(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

/// Median of absolute deviations from `center`
pub fn median_absolute_deviation(samples: &[f64], center: f64) -> f64 {
    let deviations: Vec<f64> = samples.iter().map(|s| (s - center).abs()).collect();
    median(&deviations)
}

/// `|value - median| / mad`, or `None` when the MAD is zero
pub fn robust_z_score(value: f64, median: f64, mad: f64) -> Option<f64> {
    if mad == 0.0 {
        return None;
    }
    Some((value - median).abs() / mad)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_length() {
        assert_eq!(median(&[1.0, 3.0, 5.0, 7.0, 9.0]), 5.0);
        assert_eq!(median(&[11.0, 10.0, 12.0]), 11.0);
    }

    #[test]
    fn test_median_even_length() {
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), 2.5);
        assert_eq!(median(&[4.0, 1.0]), 2.5);
    }

    #[test]
    fn test_median_single_and_empty() {
        assert_eq!(median(&[42.0]), 42.0);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn test_median_does_not_reorder_input() {
        let samples = [3.0, 1.0, 2.0];
        median(&samples);
        assert_eq!(samples, [3.0, 1.0, 2.0]);
    }

    #[test]
    fn test_mad() {
        // deviations from 11: [0, 1, 1]
        assert_eq!(median_absolute_deviation(&[11.0, 10.0, 12.0], 11.0), 1.0);
        assert_eq!(median_absolute_deviation(&[5.0, 5.0, 5.0], 5.0), 0.0);
    }

    #[test]
    fn test_robust_z_score() {
        assert_eq!(robust_z_score(13.0, 11.0, 1.0), Some(2.0));
        assert_eq!(robust_z_score(9.0, 11.0, 1.0), Some(2.0));
        assert_eq!(robust_z_score(13.0, 11.0, 0.0), None);
    }
}
