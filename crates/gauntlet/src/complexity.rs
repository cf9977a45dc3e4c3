//! Empirical complexity estimation
//!
//! Fits `ln(time) = slope * ln(size) + intercept` by ordinary least squares
//! over stress-test samples and buckets the slope into a complexity class.

use std::fmt;

use serde::Serialize;

use crate::types::StressSample;

/// Minimum number of usable samples for a fit
pub const MIN_SAMPLES: usize = 3;

/// Result of a log-log linear regression
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegressionFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,

    /// Largest candidate time among all samples, in milliseconds
    pub max_observed_ms: u64,

    /// Number of samples used for the fit (those with a positive size)
    pub sample_count: usize,

    /// False when there were too few samples or all sizes were equal
    pub valid: bool,
}

impl RegressionFit {
    fn invalid(max_observed_ms: u64, sample_count: usize) -> Self {
        Self {
            slope: 0.0,
            intercept: 0.0,
            r_squared: 0.0,
            max_observed_ms,
            sample_count,
            valid: false,
        }
    }
}

/// Fit a power law to the given samples
///
/// Samples with a zero input size are skipped. Elapsed times below 1ms are
/// floored to 1ms before taking the logarithm.
pub fn fit(samples: &[StressSample]) -> RegressionFit {
    let max_observed_ms = samples
        .iter()
        .map(|s| s.candidate_elapsed_ms)
        .max()
        .unwrap_or(0);

    let points: Vec<(f64, f64)> = samples
        .iter()
        .filter(|s| s.input_size > 0)
        .map(|s| {
            let x = (s.input_size as f64).ln();
            let y = (s.candidate_elapsed_ms.max(1) as f64).ln();
            (x, y)
        })
        .collect();

    let n = points.len();
    if n < MIN_SAMPLES {
        return RegressionFit::invalid(max_observed_ms, n);
    }

    let count = n as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / count;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / count;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (x, y) in &points {
        sxx += (x - mean_x) * (x - mean_x);
        sxy += (x - mean_x) * (y - mean_y);
    }

    if sxx <= f64::EPSILON {
        return RegressionFit::invalid(max_observed_ms, n);
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;

    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for (x, y) in &points {
        let predicted = slope * x + intercept;
        ss_res += (y - predicted) * (y - predicted);
        ss_tot += (y - mean_y) * (y - mean_y);
    }
    let r_squared = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else {
        0.0
    };

    RegressionFit {
        slope,
        intercept,
        r_squared,
        max_observed_ms,
        sample_count: n,
        valid: true,
    }
}

/// Named growth class, ordered from slowest to fastest growing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ComplexityClass {
    Constant,
    Logarithmic,
    Linear,
    Linearithmic,
    Quadratic,
    Cubic,
    Exponential,
}

/// Slope thresholds (exclusive upper bounds) for each class
const SLOPE_TABLE: [(f64, ComplexityClass); 6] = [
    (0.15, ComplexityClass::Constant),
    (0.5, ComplexityClass::Logarithmic),
    (1.15, ComplexityClass::Linear),
    (1.6, ComplexityClass::Linearithmic),
    (2.4, ComplexityClass::Quadratic),
    (3.2, ComplexityClass::Cubic),
];

impl ComplexityClass {
    /// Bucket a fitted log-log slope
    pub fn from_slope(slope: f64) -> Self {
        SLOPE_TABLE
            .iter()
            .find(|(upper, _)| slope < *upper)
            .map(|(_, class)| *class)
            .unwrap_or(ComplexityClass::Exponential)
    }

    /// Big-O notation for the class
    pub fn notation(&self) -> &'static str {
        match self {
            ComplexityClass::Constant => "O(1)",
            ComplexityClass::Logarithmic => "O(log n)",
            ComplexityClass::Linear => "O(n)",
            ComplexityClass::Linearithmic => "O(n log n)",
            ComplexityClass::Quadratic => "O(n^2)",
            ComplexityClass::Cubic => "O(n^3)",
            ComplexityClass::Exponential => "O(2^n) or worse",
        }
    }
}

impl fmt::Display for ComplexityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.notation())
    }
}

/// A regression fit together with its classification
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComplexityEstimate {
    pub fit: RegressionFit,

    /// `None` when the fit is invalid
    pub class: Option<ComplexityClass>,
}

impl ComplexityEstimate {
    pub fn from_fit(fit: RegressionFit) -> Self {
        let class = fit.valid.then(|| ComplexityClass::from_slope(fit.slope));
        Self { fit, class }
    }

    /// Fit and classify in one step
    pub fn estimate(samples: &[StressSample]) -> Self {
        Self::from_fit(fit(samples))
    }
}

impl fmt::Display for ComplexityEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.class {
            Some(class) => write!(
                f,
                "{class} (slope {:.2}, R² {:.2}, max {} ms)",
                self.fit.slope, self.fit.r_squared, self.fit.max_observed_ms
            ),
            None => f.write_str("insufficient timing data"),
        }
    }
}
