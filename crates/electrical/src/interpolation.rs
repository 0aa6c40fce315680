//! Shape-preserving monotone cubic (PCHIP) curves over state of charge.

use serde::{Deserialize, Serialize};
use simcore::{ModelError, Result};

/// Behaviour outside the sampled SoC range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Extrapolation {
    /// Continue the end cubic segments
    #[default]
    Extrapolate,
    /// Hold the end values
    Clamp,
}

/// Piecewise cubic Hermite interpolant with Fritsch-Carlson style slopes:
/// no overshoot between knots, local monotonicity preserved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterCurve {
    x: Vec<f64>,
    y: Vec<f64>,
    slopes: Vec<f64>,
    extrapolation: Extrapolation,
}

/// Median of a non-empty slice (mean of the two middle values for even lengths).
pub fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let n = values.len();
    if n == 0 {
        return f64::NAN;
    }
    if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}

/// Sort by `x` and collapse repeated `x` into the median of their `y`.
/// Pairs with a non-finite coordinate are dropped.
pub fn merge_duplicates(points: impl IntoIterator<Item = (f64, f64)>) -> (Vec<f64>, Vec<f64>) {
    let mut points: Vec<(f64, f64)> = points
        .into_iter()
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .collect();
    points.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut xs = Vec::with_capacity(points.len());
    let mut ys = Vec::with_capacity(points.len());
    let mut i = 0;
    while i < points.len() {
        let mut j = i + 1;
        while j < points.len() && points[j].0 == points[i].0 {
            j += 1;
        }
        let mut group: Vec<f64> = points[i..j].iter().map(|p| p.1).collect();
        xs.push(points[i].0);
        ys.push(median(&mut group));
        i = j;
    }
    (xs, ys)
}

fn sign(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// One-sided three-point slope at an end knot, limited to keep the shape
fn edge_slope(h0: f64, h1: f64, m0: f64, m1: f64) -> f64 {
    let d = ((2.0 * h0 + h1) * m0 - h0 * m1) / (h0 + h1);
    if sign(d) != sign(m0) {
        0.0
    } else if sign(m0) != sign(m1) && d.abs() > 3.0 * m0.abs() {
        3.0 * m0
    } else {
        d
    }
}

fn pchip_slopes(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    let m: Vec<f64> = (0..n - 1).map(|k| (y[k + 1] - y[k]) / h[k]).collect();

    if n == 2 {
        return vec![m[0], m[0]];
    }

    let mut d = vec![0.0; n];
    for k in 1..n - 1 {
        if m[k - 1] == 0.0 || m[k] == 0.0 || sign(m[k - 1]) != sign(m[k]) {
            d[k] = 0.0;
        } else {
            // weighted harmonic mean
            let w1 = 2.0 * h[k] + h[k - 1];
            let w2 = h[k] + 2.0 * h[k - 1];
            d[k] = (w1 + w2) / (w1 / m[k - 1] + w2 / m[k]);
        }
    }
    d[0] = edge_slope(h[0], h[1], m[0], m[1]);
    d[n - 1] = edge_slope(h[n - 2], h[n - 3], m[n - 2], m[n - 3]);
    d
}

impl ParameterCurve {
    /// Fit a curve to `(x, y)` points in any order.
    ///
    /// Duplicate `x` values are merged by median before fitting; at least two
    /// distinct finite `x` values are required.
    pub fn fit(points: impl IntoIterator<Item = (f64, f64)>, extrapolation: Extrapolation) -> Result<Self> {
        let (x, y) = merge_duplicates(points);
        if x.len() < 2 {
            return Err(ModelError::insufficient(
                "monotone cubic fit",
                format!("{} distinct sample point(s), at least 2 required", x.len()),
            ));
        }
        let slopes = pchip_slopes(&x, &y);
        Ok(ParameterCurve {
            x,
            y,
            slopes,
            extrapolation,
        })
    }

    pub fn knots(&self) -> (&[f64], &[f64]) {
        (&self.x, &self.y)
    }

    pub fn domain(&self) -> (f64, f64) {
        (self.x[0], self.x[self.x.len() - 1])
    }

    /// Evaluate with the curve's own extrapolation mode
    pub fn evaluate(&self, x: f64) -> f64 {
        self.evaluate_with(x, self.extrapolation)
    }

    pub fn evaluate_with(&self, x: f64, extrapolation: Extrapolation) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }
        let n = self.x.len();
        let x = match extrapolation {
            Extrapolation::Clamp => x.clamp(self.x[0], self.x[n - 1]),
            Extrapolation::Extrapolate => x,
        };

        let k = self.x.partition_point(|&knot| knot <= x).saturating_sub(1).min(n - 2);
        let h = self.x[k + 1] - self.x[k];
        let t = (x - self.x[k]) / h;
        let t2 = t * t;
        let t3 = t2 * t;

        // Hermite basis
        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;

        h00 * self.y[k] + h10 * h * self.slopes[k] + h01 * self.y[k + 1] + h11 * h * self.slopes[k + 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_passes_through_knots() {
        let points = vec![(0.0, 3.0), (50.0, 3.6), (100.0, 4.2)];
        let curve = ParameterCurve::fit(points, Extrapolation::Extrapolate).unwrap();
        assert_eq!(curve.domain(), (0.0, 100.0));
        assert_relative_eq!(curve.evaluate(0.0), 3.0, epsilon = 1e-12);
        assert_relative_eq!(curve.evaluate(50.0), 3.6, epsilon = 1e-12);
        assert_relative_eq!(curve.evaluate(100.0), 4.2, epsilon = 1e-12);
    }

    #[test]
    fn test_no_overshoot_between_increasing_samples() {
        let points = vec![(10.0, 3.40), (40.0, 3.65), (90.0, 4.15)];
        let curve = ParameterCurve::fit(points.clone(), Extrapolation::Extrapolate).unwrap();
        for pair in points.windows(2) {
            let (x0, y0) = pair[0];
            let (x1, y1) = pair[1];
            for step in 0..=100 {
                let x = x0 + (x1 - x0) * step as f64 / 100.0;
                let y = curve.evaluate(x);
                assert!(y >= y0.min(y1) - 1e-12 && y <= y0.max(y1) + 1e-12, "overshoot at {x}: {y}");
            }
        }
    }

    #[test]
    fn test_flat_segment_stays_flat() {
        let points = vec![(0.0, 1.0), (1.0, 2.0), (2.0, 2.0), (3.0, 3.0)];
        let curve = ParameterCurve::fit(points, Extrapolation::Clamp).unwrap();
        assert_relative_eq!(curve.evaluate(1.5), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_two_points_are_linear() {
        let curve = ParameterCurve::fit(vec![(0.0, 0.0), (10.0, 5.0)], Extrapolation::Extrapolate).unwrap();
        assert_relative_eq!(curve.evaluate(4.0), 2.0, epsilon = 1e-12);
        assert_relative_eq!(curve.evaluate(20.0), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_clamped_evaluation_holds_end_values() {
        let curve = ParameterCurve::fit(vec![(0.0, 0.0), (10.0, 5.0)], Extrapolation::Extrapolate).unwrap();
        assert_relative_eq!(curve.evaluate_with(20.0, Extrapolation::Clamp), 5.0, epsilon = 1e-12);
        assert_relative_eq!(curve.evaluate_with(-3.0, Extrapolation::Clamp), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_duplicate_x_is_merged_by_median() {
        let curve = ParameterCurve::fit(
            vec![(20.0, 0.010), (50.0, 0.002), (50.0, 0.004), (80.0, 0.001)],
            Extrapolation::Extrapolate,
        )
        .unwrap();
        let (x, y) = curve.knots();
        assert_eq!(x, &[20.0, 50.0, 80.0]);
        assert_relative_eq!(y[1], 0.003, epsilon = 1e-15);
        assert_relative_eq!(curve.evaluate(50.0), 0.003, epsilon = 1e-15);
    }

    #[test]
    fn test_two_identical_points_are_insufficient() {
        let err = ParameterCurve::fit(vec![(50.0, 1.0), (50.0, 2.0)], Extrapolation::Extrapolate).unwrap_err();
        assert!(matches!(err, ModelError::InsufficientData { .. }));
    }

    #[test]
    fn test_nan_points_are_dropped() {
        let curve = ParameterCurve::fit(
            vec![(0.0, 1.0), (f64::NAN, 2.0), (5.0, f64::NAN), (10.0, 3.0)],
            Extrapolation::Extrapolate,
        )
        .unwrap();
        assert_eq!(curve.knots().0.len(), 2);
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut [4.0, 1.0, 2.0, 3.0]), 2.5);
    }
}
