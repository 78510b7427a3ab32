//! Small numeric helpers shared by the percentile and peer-average code.

/// Arithmetic mean, or `None` for an empty slice.
pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

/// Percent of `samples` strictly below `value` (0.0 to 100.0).
///
/// Ties are not counted, so a value equal to every sample ranks at 0.
/// Returns `None` when there is nothing to rank against.
pub fn percentile_below(samples: &[f64], value: f64) -> Option<f64> {
    if samples.is_empty() || !value.is_finite() {
        return None;
    }
    let count_below = samples.iter().filter(|&&x| x < value).count();
    Some(count_below as f64 / samples.len() as f64 * 100.0)
}

/// Keep only finite values greater than zero.
pub fn positive_finite(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
    values
        .into_iter()
        .filter(|v| v.is_finite() && *v > 0.0)
        .collect()
}
