//! Frozen statistical lookup tables.

use crate::error::ProfileError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normal distribution z-multipliers per upper quantile (in percent).
const Z_TABLE: [(u32, f64); 8] = [
    (60, 0.26),
    (65, 0.39),
    (70, 0.53),
    (75, 0.68),
    (80, 0.85),
    (85, 1.04),
    (90, 1.29),
    (95, 1.65),
];

/// Two-tailed 95% Student-t critical values for sample counts 6 to 30.
const T_TABLE_EXACT: [f64; 25] = [
    1.943, 1.895, 1.86, 1.833, 1.812, 1.796, 1.782, 1.771, 1.761, 1.753, 1.746, 1.74, 1.734,
    1.729, 1.725, 1.721, 1.717, 1.714, 1.711, 1.708, 1.706, 1.703, 1.701, 1.699, 1.697,
];

/// Banded critical values above 30 samples, keyed by inclusive upper count.
const T_TABLE_BANDS: [(usize, f64); 8] = [
    (35, 1.69),
    (40, 1.684),
    (45, 1.679),
    (50, 1.676),
    (60, 1.671),
    (70, 1.667),
    (80, 1.664),
    (100, 1.66),
];

const T_SMALL: f64 = 2.015;
const T_LARGE: f64 = 1.645;

/// Look up the z-multiplier for a quantile given in percent.
///
/// # Errors
/// Returns [`ProfileError::InvalidConfiguration`] for quantiles outside the table.
pub fn z_for(quantile: u32) -> Result<f64, ProfileError> {
    Z_TABLE
        .iter()
        .find(|&&(q, _)| q == quantile)
        .map(|&(_, z)| z)
        .ok_or_else(|| {
            ProfileError::invalid(format!(
                "quantile must be one of 60, 65, ..., 95, but is {quantile}"
            ))
        })
}

/// Look up the 95% Student-t critical value for `n` samples.
pub fn t_for(n: usize) -> f64 {
    match n {
        0..=5 => T_SMALL,
        6..=30 => T_TABLE_EXACT[n - 6],
        _ => T_TABLE_BANDS
            .iter()
            .find(|&&(upper, _)| n <= upper)
            .map_or(T_LARGE, |&(_, t)| t),
    }
}

/// Confidence quantile used for the lower and upper bounds.
///
/// Only the tabulated values are representable, so a constructed
/// [`Quantile`] always has a z-multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantile(u32);

impl Quantile {
    pub fn new(percent: u32) -> Result<Self, ProfileError> {
        z_for(percent)?;
        Ok(Self(percent))
    }

    pub fn percent(self) -> u32 {
        self.0
    }

    pub fn z(self) -> f64 {
        Z_TABLE
            .iter()
            .find(|&&(q, _)| q == self.0)
            .map_or(f64::NAN, |&(_, z)| z)
    }

    /// Label of the upper bound quantile, e.g. `"75%"`.
    pub fn upper_label(self) -> String {
        format!("{}%", self.0)
    }

    /// Label of the lower bound quantile, e.g. `"25%"`.
    pub fn lower_label(self) -> String {
        format!("{}%", 100 - self.0)
    }
}

impl Default for Quantile {
    fn default() -> Self {
        Self(75)
    }
}

impl TryFrom<u32> for Quantile {
    type Error = ProfileError;

    fn try_from(percent: u32) -> Result<Self, Self::Error> {
        Self::new(percent)
    }
}

impl From<Quantile> for u32 {
    fn from(quantile: Quantile) -> Self {
        quantile.0
    }
}

impl fmt::Display for Quantile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.upper_label(), self.lower_label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn z_table_covers_all_quantiles() {
        assert_eq!(z_for(60), Ok(0.26));
        assert_eq!(z_for(75), Ok(0.68));
        assert_eq!(z_for(95), Ok(1.65));
        assert!(matches!(
            z_for(50),
            Err(ProfileError::InvalidConfiguration { .. })
        ));
        assert!(Quantile::new(77).is_err());
    }

    #[test]
    fn t_table_breakpoints() {
        assert_eq!(t_for(0), 2.015);
        assert_eq!(t_for(5), 2.015);
        assert_eq!(t_for(6), 1.943);
        assert_eq!(t_for(10), 1.812);
        assert_eq!(t_for(20), 1.725);
        assert_eq!(t_for(30), 1.697);
        assert_eq!(t_for(31), 1.69);
        assert_eq!(t_for(35), 1.69);
        assert_eq!(t_for(36), 1.684);
        assert_eq!(t_for(60), 1.671);
        assert_eq!(t_for(100), 1.66);
        assert_eq!(t_for(101), 1.645);
    }

    #[test]
    fn t_table_is_monotonic() {
        for n in 1..200 {
            assert!(t_for(n + 1) <= t_for(n), "t increases at n = {n}");
        }
    }

    #[test]
    fn quantile_labels() {
        let quantile = Quantile::new(90).unwrap();
        assert_eq!(quantile.upper_label(), "90%");
        assert_eq!(quantile.lower_label(), "10%");
        assert_eq!(quantile.z(), 1.29);
        assert_eq!(quantile.to_string(), "90%/10%");
    }
}
