//! Vector utility functions like cdf(), locate_clip()

/// Builds the normalized cumulative distribution of `n` non-negative weights.
///
/// The result has `n + 1` entries starting at 0 and ending at 1. Returns the
/// unnormalized total alongside. If the total is zero, the cumulative values are
/// left unnormalized (all zero) so that callers can detect the degenerate case.
pub fn cdf<F>(n: usize, weight: F) -> (Vec<f64>, f64)
where
    F: Fn(usize) -> f64,
{
    let mut cumulative = Vec::with_capacity(n + 1);
    cumulative.push(0.0);
    let mut sum = 0.0;
    for i in 0..n {
        sum += weight(i);
        cumulative.push(sum);
    }
    if sum > 0.0 {
        for c in cumulative.iter_mut() {
            *c /= sum;
        }
    }
    (cumulative, sum)
}

/// Returns the index `i` of the bin `[xv[i], xv[i+1])` containing `x`, clipped
/// to the valid range `[0, xv.len() - 2]`.
///
/// `xv` must be sorted in ascending order and contain at least two elements.
pub fn locate_clip(xv: &[f64], x: f64) -> usize {
    debug_assert!(xv.len() >= 2);
    let upper = xv.partition_point(|&v| v <= x);
    upper.saturating_sub(1).min(xv.len() - 2)
}

/// Checks if two arrays or vectors are almost equal.
///
/// Elements in both containers must be in the same order.
pub fn almost_equal(a: &[f64], b: &[f64], eps: f64) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).all(|(&x, &y)| (x - y).abs() <= eps)
}
