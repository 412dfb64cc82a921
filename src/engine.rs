use crate::error::ProfileError;
use crate::model::Sample;
use crate::stats::{LinearFit, compute_mean, compute_std_dev, std_err_estimate};
use crate::tables::{Quantile, t_for};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Fewest valid samples a profile is computed from.
const MIN_SAMPLES: usize = 5;
/// Two-sided 95% multiplier used to reject outliers.
const REJECTION_Z: f64 = 1.96;
/// Relative slack on the rejection band so exact fits keep every point.
const REJECTION_TOL: f64 = 1e-9;

/// Outlier model requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelChoice {
    Dependent,
    Independent,
    #[default]
    Auto,
}

impl FromStr for ModelChoice {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dependent" | "dep" => Ok(Self::Dependent),
            "independent" | "ind" => Ok(Self::Independent),
            "auto" | "automatic" => Ok(Self::Auto),
            _ => Err(ProfileError::invalid(format!(
                "model must be dependent, independent or auto, but is {s:?}"
            ))),
        }
    }
}

/// Outlier model a profile was actually computed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    Dependent,
    Independent,
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dependent => write!(f, "Depth Dependent"),
            Self::Independent => write!(f, "Independent of Depth"),
        }
    }
}

/// Pair of values evaluated at the shallowest and deepest window depth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub top: f64,
    pub bottom: f64,
}

impl Bounds {
    fn uniform(val: f64) -> Self {
        Self {
            top: val,
            bottom: val,
        }
    }

    fn is_finite(&self) -> bool {
        self.top.is_finite() && self.bottom.is_finite()
    }
}

/// Design profile of one sample set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub best_estimate: Bounds,
    pub lower_bound: Bounds,
    pub upper_bound: Bounds,
    pub mean_ci95_upper: Bounds,
    pub mean_ci95_lower: Bounds,

    pub std_dev_before: f64,
    pub std_dev_after: f64,
    pub mean_before: f64,
    pub mean_after: f64,

    pub model_used: Model,
    pub quantile: Quantile,

    /// Shallowest depth of the sample set (m).
    pub depth_top: f64,
    /// Deepest depth of the sample set (m).
    pub depth_bottom: f64,
    /// Valid samples before outlier rejection.
    pub n_samples: usize,
    /// Samples kept by the chosen model.
    pub n_retained: usize,
}

impl Profile {
    fn is_finite(&self) -> bool {
        [
            self.best_estimate,
            self.lower_bound,
            self.upper_bound,
            self.mean_ci95_upper,
            self.mean_ci95_lower,
        ]
        .iter()
        .all(Bounds::is_finite)
            && [
                self.std_dev_before,
                self.std_dev_after,
                self.mean_before,
                self.mean_after,
            ]
            .iter()
            .all(|val| val.is_finite())
    }
}

/// Statistics of the full sample set, shared by both outlier models.
struct Initial {
    depths: Vec<f64>,
    values: Vec<f64>,
    fit: LinearFit,
    mean: f64,
    std_dev: f64,
    std_err: f64,
}

/// Regression refitted after rejecting points far from the initial line.
struct DependentFit {
    fit: LinearFit,
    mean: f64,
    std_dev: f64,
    std_err: f64,
    n_retained: usize,
}

/// Mean and spread after rejecting points far from the initial mean.
struct IndependentFit {
    mean: f64,
    std_dev: f64,
    n_retained: usize,
}

enum Fitted {
    Dependent(DependentFit),
    Independent(IndependentFit),
}

/// Compute the design profile of `samples`.
///
/// # Errors
/// Returns [`ProfileError::InsufficientData`] for fewer than five valid
/// samples, a degenerate regression, too few samples surviving outlier
/// rejection or any non-finite result.
pub fn bound(
    samples: &[Sample],
    choice: ModelChoice,
    quantile: Quantile,
) -> Result<Profile, ProfileError> {
    let initial = fit_initial(samples)?;
    let n = initial.values.len();

    let fitted = match choice {
        ModelChoice::Dependent => Fitted::Dependent(reject_dependent(&initial)?),
        ModelChoice::Independent => Fitted::Independent(reject_independent(&initial)?),
        ModelChoice::Auto => {
            let dependent = reject_dependent(&initial)?;
            let independent = reject_independent(&initial)?;
            log::debug!(
                "dependent std dev {}, independent std dev {}",
                dependent.std_dev,
                independent.std_dev
            );
            if independent.std_dev < dependent.std_dev {
                Fitted::Independent(independent)
            } else {
                Fitted::Dependent(dependent)
            }
        }
    };

    let depth_top = initial.depths.iter().copied().fold(f64::INFINITY, f64::min);
    let depth_bottom = initial
        .depths
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);

    let z = quantile.z();
    let t = t_for(n);
    let n_f = n as f64;

    let profile = match fitted {
        Fitted::Dependent(dependent) => {
            let at = |offset: f64| Bounds {
                top: dependent.fit.predict(depth_top) + offset,
                bottom: dependent.fit.predict(depth_bottom) + offset,
            };
            let band = dependent.std_err * z;
            let ci = t * initial.std_dev * (1.0 / n_f + 3.0 * n_f / (n_f * n_f - 1.0)).sqrt();
            Profile {
                best_estimate: at(0.0),
                lower_bound: at(-band),
                upper_bound: at(band),
                mean_ci95_upper: at(ci),
                mean_ci95_lower: at(-ci),
                std_dev_before: initial.std_dev,
                std_dev_after: dependent.std_dev,
                mean_before: initial.mean,
                mean_after: dependent.mean,
                model_used: Model::Dependent,
                quantile,
                depth_top,
                depth_bottom,
                n_samples: n,
                n_retained: dependent.n_retained,
            }
        }
        Fitted::Independent(independent) => {
            let mean = independent.mean;
            let band = independent.std_dev * z;
            let ci = t * initial.std_dev / n_f.sqrt();
            Profile {
                best_estimate: Bounds::uniform(mean),
                lower_bound: Bounds::uniform(mean - band),
                upper_bound: Bounds::uniform(mean + band),
                mean_ci95_upper: Bounds::uniform(mean + ci),
                mean_ci95_lower: Bounds::uniform(mean - ci),
                std_dev_before: initial.std_dev,
                std_dev_after: independent.std_dev,
                mean_before: initial.mean,
                mean_after: mean,
                model_used: Model::Independent,
                quantile,
                depth_top,
                depth_bottom,
                n_samples: n,
                n_retained: independent.n_retained,
            }
        }
    };

    if !profile.is_finite() {
        return Err(ProfileError::insufficient("profile is not finite"));
    }
    Ok(profile)
}

fn fit_initial(samples: &[Sample]) -> Result<Initial, ProfileError> {
    let (depths, values): (Vec<f64>, Vec<f64>) = samples
        .iter()
        .filter(|sample| sample.is_valid())
        .filter_map(|sample| Some((sample.depth, sample.valid_value()?)))
        .unzip();

    let n = values.len();
    if n < MIN_SAMPLES {
        return Err(ProfileError::insufficient(format!(
            "{n} valid samples, at least {MIN_SAMPLES} required"
        )));
    }

    let fit = LinearFit::fit(&depths, &values)
        .ok_or_else(|| ProfileError::insufficient("regression slope is undefined"))?;
    if fit.r_squared == 0.0 {
        return Err(ProfileError::insufficient("values do not correlate with depth"));
    }

    let mean = compute_mean(&values);
    let std_dev = compute_std_dev(&values);
    let std_err = std_err_estimate(fit.r_squared, n, std_dev);
    if !std_err.is_finite() {
        return Err(ProfileError::insufficient("standard error is not finite"));
    }

    Ok(Initial {
        depths,
        values,
        fit,
        mean,
        std_dev,
        std_err,
    })
}

fn within(val: f64, centre: f64, half_width: f64) -> bool {
    (val - centre).abs() <= half_width + REJECTION_TOL * (1.0 + centre.abs())
}

fn reject_dependent(initial: &Initial) -> Result<DependentFit, ProfileError> {
    let half_width = REJECTION_Z * initial.std_err;
    let (depths, values): (Vec<f64>, Vec<f64>) = initial
        .depths
        .iter()
        .zip(&initial.values)
        .filter(|&(&depth, &val)| within(val, initial.fit.predict(depth), half_width))
        .map(|(&depth, &val)| (depth, val))
        .unzip();

    let n_retained = values.len();
    if n_retained < 3 {
        return Err(ProfileError::insufficient(format!(
            "{n_retained} samples left after dependent outlier rejection"
        )));
    }

    let fit = LinearFit::fit(&depths, &values)
        .ok_or_else(|| ProfileError::insufficient("refitted regression slope is undefined"))?;
    let std_dev = compute_std_dev(&values);
    let std_err = std_err_estimate(fit.r_squared, n_retained, std_dev);

    Ok(DependentFit {
        fit,
        mean: compute_mean(&values),
        std_dev,
        std_err,
        n_retained,
    })
}

fn reject_independent(initial: &Initial) -> Result<IndependentFit, ProfileError> {
    let half_width = REJECTION_Z * initial.std_dev;
    let values: Vec<f64> = initial
        .values
        .iter()
        .copied()
        .filter(|&val| within(val, initial.mean, half_width))
        .collect();

    if values.is_empty() {
        return Err(ProfileError::insufficient(
            "no samples left after independent outlier rejection",
        ));
    }

    Ok(IndependentFit {
        mean: compute_mean(&values),
        std_dev: compute_std_dev(&values),
        n_retained: values.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;
    use rand_distr::{Distribution, Normal};

    const TOL: f64 = 1e-9;

    fn samples(depths: &[f64], values: &[f64]) -> Vec<Sample> {
        depths
            .iter()
            .zip(values)
            .map(|(&depth, &val)| Sample::new(depth, val))
            .collect()
    }

    fn quantile(percent: u32) -> Quantile {
        Quantile::new(percent).unwrap()
    }

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() <= tol, "{a} != {b} (tolerance {tol})");
    }

    /// Linear trend with one off-trend value at mid depth.
    fn trend_with_outlier() -> Vec<Sample> {
        let depths: Vec<_> = (0..=20).map(|i| i as f64 / 10.0).collect();
        let mut values: Vec<_> = depths.iter().map(|d| 100.0 * d).collect();
        values[10] = 210.0;
        samples(&depths, &values)
    }

    /// Flat values with one high value at the top.
    fn cluster_with_outlier() -> Vec<Sample> {
        let depths: Vec<_> = (10..=16).map(|i| i as f64 / 10.0).collect();
        let values = [10.75, 10.1, 9.9, 10.1, 9.9, 10.1, 9.9];
        samples(&depths, &values)
    }

    #[test]
    fn exact_fit_reproduces_line() {
        let depths: Vec<_> = (10..20).map(|i| i as f64 / 2.0).collect();
        let values: Vec<_> = depths.iter().map(|d| 2.5 * d + 4.0).collect();
        let profile = bound(&samples(&depths, &values), ModelChoice::Dependent, quantile(75)).unwrap();

        assert_eq!(profile.model_used, Model::Dependent);
        assert_eq!(profile.n_samples, 10);
        assert_eq!(profile.n_retained, 10);
        assert_eq!(profile.depth_top, 5.0);
        assert_eq!(profile.depth_bottom, 9.5);
        assert_close(profile.best_estimate.top, 2.5 * 5.0 + 4.0, TOL);
        assert_close(profile.best_estimate.bottom, 2.5 * 9.5 + 4.0, TOL);
        assert_close(profile.lower_bound.top, profile.best_estimate.top, 1e-6);
        assert_close(profile.upper_bound.bottom, profile.best_estimate.bottom, 1e-6);
    }

    #[test]
    fn noisy_fit_bounds_bracket_best_estimate() {
        let mut rng = ChaCha12Rng::seed_from_u64(17);
        let noise = Normal::new(0.0, 0.5).unwrap();
        let depths: Vec<_> = (0..60).map(|i| 2.0 + i as f64 * 0.05).collect();
        let values: Vec<_> = depths
            .iter()
            .map(|d| 3.0 * d + 1.0 + noise.sample(&mut rng))
            .collect();
        let profile = bound(&samples(&depths, &values), ModelChoice::Dependent, quantile(90)).unwrap();

        for bounds in [profile.lower_bound, profile.mean_ci95_lower] {
            assert!(bounds.top < profile.best_estimate.top);
            assert!(bounds.bottom < profile.best_estimate.bottom);
        }
        for bounds in [profile.upper_bound, profile.mean_ci95_upper] {
            assert!(bounds.top > profile.best_estimate.top);
            assert!(bounds.bottom > profile.best_estimate.bottom);
        }
        assert!(profile.best_estimate.bottom > profile.best_estimate.top);
        assert_close(profile.best_estimate.top, 7.0, 0.5);
        assert_close(profile.best_estimate.bottom, 3.0 * 4.95 + 1.0, 0.5);
    }

    #[test]
    fn constant_series_models_agree() {
        let depths: Vec<_> = (0..8).map(|i| 3.0 + i as f64 * 0.25).collect();
        let values = vec![5.0; depths.len()];
        let sounding = samples(&depths, &values);

        let dependent = bound(&sounding, ModelChoice::Dependent, quantile(80)).unwrap();
        let independent = bound(&sounding, ModelChoice::Independent, quantile(80)).unwrap();

        assert_eq!(dependent.std_dev_before, 0.0);
        for (dep, ind) in [
            (dependent.best_estimate, independent.best_estimate),
            (dependent.lower_bound, independent.lower_bound),
            (dependent.upper_bound, independent.upper_bound),
        ] {
            assert_close(dep.top, ind.top, TOL);
            assert_close(dep.bottom, ind.bottom, TOL);
            assert_close(dep.top, 5.0, TOL);
        }
    }

    #[test]
    fn auto_selects_dependent_for_trend() {
        let profile = bound(&trend_with_outlier(), ModelChoice::Auto, quantile(75)).unwrap();
        assert_eq!(profile.model_used, Model::Dependent);
        assert_eq!(profile.n_samples, 21);
        assert_eq!(profile.n_retained, 20);
        assert_close(profile.std_dev_after, (77_000.0_f64 / 20.0).sqrt(), 1e-6);
        assert_close(profile.best_estimate.top, 0.0, 1e-6);
        assert_close(profile.best_estimate.bottom, 200.0, 1e-6);
    }

    #[test]
    fn auto_selects_independent_for_cluster() {
        let profile = bound(&cluster_with_outlier(), ModelChoice::Auto, quantile(75)).unwrap();
        assert_eq!(profile.model_used, Model::Independent);
        assert_eq!(profile.n_retained, 6);
        assert_close(profile.mean_after, 10.0, 1e-9);
        assert_close(profile.std_dev_after, 0.1, 1e-9);
        assert_close(profile.lower_bound.top, 10.0 - 0.1 * 0.68, 1e-9);
        assert_close(profile.upper_bound.bottom, 10.0 + 0.1 * 0.68, 1e-9);

        let ci = 1.895 * profile.std_dev_before / 7.0_f64.sqrt();
        assert_close(profile.mean_ci95_upper.top, 10.0 + ci, 1e-9);
        assert_close(profile.mean_ci95_lower.bottom, 10.0 - ci, 1e-9);
    }

    #[test]
    fn explicit_model_skips_comparison() {
        let profile = bound(&cluster_with_outlier(), ModelChoice::Dependent, quantile(75)).unwrap();
        assert_eq!(profile.model_used, Model::Dependent);
        assert_eq!(profile.n_retained, 7);

        let profile = bound(&trend_with_outlier(), ModelChoice::Independent, quantile(75)).unwrap();
        assert_eq!(profile.model_used, Model::Independent);
        assert_eq!(profile.best_estimate.top, profile.best_estimate.bottom);
    }

    #[test]
    fn dependent_mean_interval() {
        let sounding = trend_with_outlier();
        let profile = bound(&sounding, ModelChoice::Dependent, quantile(75)).unwrap();
        let n = 21.0_f64;
        let ci = 1.721 * profile.std_dev_before * (1.0 / n + 3.0 * n / (n * n - 1.0)).sqrt();
        assert_close(profile.mean_ci95_upper.top - profile.best_estimate.top, ci, 1e-9);
        assert_close(profile.best_estimate.bottom - profile.mean_ci95_lower.bottom, ci, 1e-9);
    }

    #[test]
    fn too_few_valid_samples() {
        let mut sounding = samples(&[1.0, 1.1, 1.2, 1.3, 1.4], &[1.0, 2.0, 4.0, 3.0, 5.0]);
        sounding.push(Sample::missing(1.5));
        sounding.push(Sample::new(1.6, f64::NAN));
        sounding[0].value = None;

        for choice in [ModelChoice::Dependent, ModelChoice::Independent, ModelChoice::Auto] {
            assert!(matches!(
                bound(&sounding, choice, quantile(75)),
                Err(ProfileError::InsufficientData { .. })
            ));
        }
        assert!(bound(&[], ModelChoice::Auto, quantile(75)).is_err());
    }

    #[test]
    fn degenerate_regression() {
        let same_depth = samples(&[2.0; 6], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(matches!(
            bound(&same_depth, ModelChoice::Auto, quantile(75)),
            Err(ProfileError::InsufficientData { .. })
        ));

        let uncorrelated = samples(&[1.0, 2.0, 3.0, 4.0, 5.0], &[1.0, 3.0, 2.0, 3.0, 1.0]);
        assert!(matches!(
            bound(&uncorrelated, ModelChoice::Auto, quantile(75)),
            Err(ProfileError::InsufficientData { .. })
        ));
    }

    #[test]
    fn infinite_values_are_not_samples() {
        let mut sounding = cluster_with_outlier();
        sounding.push(Sample::new(1.7, f64::INFINITY));
        sounding.push(Sample::new(1.8, f64::NEG_INFINITY));
        let profile = bound(&sounding, ModelChoice::Auto, quantile(75)).unwrap();
        assert_eq!(profile, bound(&cluster_with_outlier(), ModelChoice::Auto, quantile(75)).unwrap());
        assert_eq!(profile.n_samples, 7);

        let mut sounding = samples(&[1.0, 1.1, 1.2, 1.3], &[1.0, 2.0, 4.0, 3.0]);
        sounding.push(Sample::new(1.4, f64::INFINITY));
        assert_eq!(
            bound(&sounding, ModelChoice::Auto, quantile(75)),
            Err(ProfileError::insufficient("4 valid samples, at least 5 required"))
        );
    }

    #[test]
    fn overflowing_values_are_insufficient() {
        let depths = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let values: Vec<_> = [1.0, 3.0, 2.0, 5.0, 4.0, 6.0].iter().map(|v| v * 1e200).collect();
        let sounding = samples(&depths, &values);
        for choice in [ModelChoice::Dependent, ModelChoice::Independent, ModelChoice::Auto] {
            assert!(matches!(
                bound(&sounding, choice, quantile(75)),
                Err(ProfileError::InsufficientData { .. })
            ));
        }
    }

    #[test]
    fn model_names() {
        assert_eq!("DEP".parse::<ModelChoice>(), Ok(ModelChoice::Dependent));
        assert_eq!("Independent".parse::<ModelChoice>(), Ok(ModelChoice::Independent));
        assert_eq!("automatic".parse::<ModelChoice>(), Ok(ModelChoice::Auto));
        assert!("median".parse::<ModelChoice>().is_err());
        assert_eq!(Model::Independent.to_string(), "Independent of Depth");
    }
}
