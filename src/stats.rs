//! Null-skipping aggregates over `f64` series.
//!
//! Non-finite values are treated as missing, so an aggregate over no
//! usable values is `None` rather than NaN.

pub fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Median with the two middle values averaged for even-length input.
pub fn median<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let mut sorted: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

pub fn sum<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let mut total = None;
    for v in values.into_iter().filter(|v| v.is_finite()) {
        total = Some(total.unwrap_or(0.0) + v);
    }
    total
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_skips_non_finite_values() {
        assert_eq!(mean(vec![1.0, f64::NAN, 3.0]), Some(2.0));
        assert_eq!(mean(Vec::new()), None);
        assert_eq!(mean(vec![f64::INFINITY]), None);
    }

    #[test]
    fn median_handles_odd_and_even_lengths() {
        assert_eq!(median(vec![3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(vec![4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(Vec::new()), None);
    }

    #[test]
    fn sum_distinguishes_zero_from_missing() {
        assert_eq!(sum(vec![0.0, 0.0]), Some(0.0));
        assert_eq!(sum(Vec::new()), None);
        assert_eq!(sum(vec![f64::NAN]), None);
    }

    #[test]
    fn round_to_decimal_places() {
        assert_eq!(round_to(1.23456, 3), 1.235);
        assert_eq!(round_to(-0.0049, 2), -0.0);
        assert_eq!(round_to(76.666666, 2), 76.67);
    }
}
