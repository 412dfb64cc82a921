/// Ordinary least-squares fit of values on depth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Squared correlation coefficient. A constant series is an exact fit.
    pub r_squared: f64,
}

impl LinearFit {
    /// Fit `ys` against `xs`.
    ///
    /// Returns `None` when the slope is undefined (fewer than two points or
    /// all `xs` identical).
    pub fn fit(xs: &[f64], ys: &[f64]) -> Option<Self> {
        let n_vals = xs.len().min(ys.len());
        if n_vals < 2 {
            return None;
        }
        let (xs, ys) = (&xs[..n_vals], &ys[..n_vals]);

        let x_mean = compute_mean(xs);
        let y_mean = compute_mean(ys);

        let mut sxx = 0.0;
        let mut sxy = 0.0;
        let mut syy = 0.0;
        for (&x, &y) in xs.iter().zip(ys) {
            let dx = x - x_mean;
            let dy = y - y_mean;
            sxx += dx * dx;
            sxy += dx * dy;
            syy += dy * dy;
        }

        if sxx == 0.0 {
            return None;
        }
        let slope = sxy / sxx;
        if !slope.is_finite() {
            return None;
        }
        let intercept = y_mean - slope * x_mean;

        let constant = ys.iter().all(|&y| y == ys[0]);
        let r_squared = if constant {
            1.0
        } else {
            ((sxy * sxy) / (sxx * syy)).clamp(0.0, 1.0)
        };

        Some(Self {
            slope,
            intercept,
            r_squared,
        })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

pub fn compute_mean(vals: &[f64]) -> f64 {
    if vals.is_empty() {
        return f64::NAN;
    }
    vals.iter().sum::<f64>() / vals.len() as f64
}

/// Population standard deviation (divides by `n`).
pub fn compute_std_dev(vals: &[f64]) -> f64 {
    if vals.is_empty() {
        return f64::NAN;
    }
    let mean = compute_mean(vals);
    let var = vals.iter().map(|&val| (val - mean).powi(2)).sum::<f64>() / vals.len() as f64;
    var.sqrt()
}

/// R squared adjusted for the two fitted parameters.
pub fn corrected_r_squared(r_squared: f64, n_vals: usize) -> f64 {
    let n = n_vals as f64;
    1.0 - (1.0 - r_squared) * (n - 1.0) / (n - 2.0)
}

/// Standard error of the estimate derived from the corrected R squared.
///
/// Rounding can push the corrected R squared of an exact fit slightly above
/// one; the radicand is clamped at zero.
pub fn std_err_estimate(r_squared: f64, n_vals: usize, std_dev: f64) -> f64 {
    let r_squared_cor = corrected_r_squared(r_squared, n_vals);
    (1.0 - r_squared_cor).max(0.0).sqrt() * std_dev
}
