//! Vectorised reductions used when scoring candidate features.

use wide::f64x4;

#[inline(always)]
fn lanes(chunk: &[f64]) -> f64x4 {
    f64x4::from([chunk[0], chunk[1], chunk[2], chunk[3]])
}

/// Sum of a slice, four lanes at a time.
pub fn sum(x: &[f64]) -> f64 {
    let mut acc = f64x4::splat(0.0);
    let chunks = x.chunks_exact(4);
    let tail: f64 = chunks.remainder().iter().sum();
    for c in chunks {
        acc += lanes(c);
    }
    acc.to_array().iter().sum::<f64>() + tail
}

/// Dot product of two equally long slices.
pub fn dot(x: &[f64], y: &[f64]) -> f64 {
    debug_assert_eq!(x.len(), y.len());
    let mut acc = f64x4::splat(0.0);
    let xs = x.chunks_exact(4);
    let ys = y.chunks_exact(4);
    let tail: f64 = xs.remainder().iter().zip(ys.remainder()).map(|(a, b)| a * b).sum();
    for (a, b) in xs.zip(ys) {
        acc += lanes(a) * lanes(b);
    }
    acc.to_array().iter().sum::<f64>() + tail
}

pub fn mean(x: &[f64]) -> f64 {
    if x.is_empty() { 0.0 } else { sum(x) / x.len() as f64 }
}

/// Pearson correlation with missing values read as `0`.
/// Returns `0` when either side has no variance.
pub fn correlation(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len();
    if n < 2 || y.len() != n { return 0.0; }
    let x: Vec<f64> = x.iter().map(|v| if v.is_finite() { *v } else { 0.0 }).collect();
    let mx = mean(&x);
    let my = mean(y);
    let xc: Vec<f64> = x.iter().map(|v| v - mx).collect();
    let yc: Vec<f64> = y.iter().map(|v| v - my).collect();
    let sxx = dot(&xc, &xc);
    let syy = dot(&yc, &yc);
    if sxx <= f64::EPSILON * n as f64 || syy <= f64::EPSILON * n as f64 { return 0.0; }
    (dot(&xc, &yc) / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
}

/// Midpoints between distinct values at `n` evenly spaced quantiles.
/// No finite input value ever equals a returned split point.
pub fn split_points(values: impl Iterator<Item = f64>, n: usize) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup();
    if sorted.len() < 2 || n == 0 { return Vec::new(); }

    let last = (sorted.len() - 1) as f64;
    let mut out: Vec<f64> = (1..=n)
        .map(|k| {
            let idx = ((k as f64 / (n + 1) as f64) * last).floor() as usize;
            0.5 * (sorted[idx] + sorted[idx + 1])
        })
        .collect();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_and_dot_with_tail() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(sum(&x), 21.0);
        assert_eq!(dot(&x, &x), 91.0);
    }

    #[test]
    fn test_correlation() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [2.0, 4.0, 6.0, 8.0];
        assert!((correlation(&x, &y) - 1.0).abs() < 1e-12);
        let neg: Vec<f64> = y.iter().map(|v| -v).collect();
        assert!((correlation(&x, &neg) + 1.0).abs() < 1e-12);
        assert_eq!(correlation(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(correlation(&[f64::NAN, 1.0], &[0.0, 1.0]), 1.0);
    }

    #[test]
    fn test_split_points_are_midpoints() {
        assert_eq!(split_points([1.0, 2.0, 3.0, 4.0, 5.0].into_iter(), 1), vec![3.5]);
        assert_eq!(split_points([1.0, 1.0, 2.0].into_iter(), 3), vec![1.5]);
        assert!(split_points([1.0, 1.0, f64::NAN].into_iter(), 3).is_empty());
    }
}
