use crate::engine::{ModelChoice, Profile, bound};
use crate::error::ProfileError;
use crate::model::{Layer, Sounding, find_layer};
use crate::tables::Quantile;
use crate::window::{Window, select};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::BTreeMap, thread};

/// Engine parameters shared by every profile of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub quantile: Quantile,
    pub model: ModelChoice,
}

/// Identifies one profile within a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileKey {
    pub borehole: String,
    pub layer_top: f64,
    pub layer_bottom: f64,
    pub channel: String,
}

impl ProfileKey {
    pub fn new(borehole: &str, layer: &Layer, channel: &str) -> Self {
        Self {
            borehole: borehole.to_string(),
            layer_top: layer.top,
            layer_bottom: layer.bottom,
            channel: channel.to_string(),
        }
    }
}

impl Ord for ProfileKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.borehole
            .cmp(&other.borehole)
            .then(self.layer_top.total_cmp(&other.layer_top))
            .then(self.layer_bottom.total_cmp(&other.layer_bottom))
            .then_with(|| self.channel.cmp(&other.channel))
    }
}

impl PartialOrd for ProfileKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ProfileKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ProfileKey {}

/// Outcome of a single depth query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryReport {
    pub borehole: String,
    pub channel: String,
    pub query_depth: f64,
    pub layer: Layer,
    pub window: Window,
    /// Value recorded exactly at the query depth.
    pub actual_value: Option<f64>,
    /// Plain average of the window.
    pub average: Option<f64>,
    pub profile: Result<Profile, ProfileError>,
}

impl QueryReport {
    /// Recompute average and profile after the window was trimmed by hand.
    pub fn recompute(&mut self, settings: &Settings) {
        self.average = self.window.mean();
        self.profile = bound(self.window.samples(), settings.model, settings.quantile);
    }
}

/// Select the window around `query_depth` and profile it.
///
/// # Errors
/// Fails if the channel is unknown, no layer encloses the query depth or the
/// query depth sits in a data gap. Insufficient data for a profile is
/// reported inside the [`QueryReport`].
pub fn query(
    sounding: &Sounding,
    channel: &str,
    query_depth: f64,
    layers: &[Layer],
    settings: &Settings,
) -> Result<QueryReport, ProfileError> {
    let samples = sounding
        .channel(channel)
        .ok_or_else(|| ProfileError::UnknownChannel {
            channel: channel.to_string(),
        })?;
    let layer = find_layer(layers, query_depth)
        .ok_or(ProfileError::NoLayer { depth: query_depth })?;
    log::info!(
        "{} m in {} layer {}-{} m, unit {}",
        query_depth,
        layer.label,
        layer.top,
        layer.bottom,
        layer.unit_or_default()
    );

    let window = select(&samples, query_depth, layer)?;
    if window.is_empty() {
        log::warn!("no {channel} data at {query_depth} m in {}", sounding.borehole);
    }

    let mut report = QueryReport {
        borehole: sounding.borehole.clone(),
        channel: channel.to_string(),
        query_depth,
        layer: layer.clone(),
        actual_value: window.value_at(query_depth),
        average: None,
        profile: Err(ProfileError::insufficient("not computed")),
        window,
    };
    report.recompute(settings);
    Ok(report)
}

/// Profile every channel over the full depth range of every layer.
///
/// Keys without a profile (missing channel, insufficient data) are logged
/// and left out of the result.
pub fn profile_layers(
    sounding: &Sounding,
    layers: &[Layer],
    channels: &[String],
    settings: &Settings,
) -> BTreeMap<ProfileKey, Profile> {
    let mut profiles = BTreeMap::new();

    for channel in channels {
        let Some(samples) = sounding.channel(channel) else {
            log::warn!("{} has no {channel} channel", sounding.borehole);
            continue;
        };

        for layer in layers {
            let in_layer: Vec<_> = samples
                .iter()
                .copied()
                .filter(|sample| layer.contains(sample.depth))
                .collect();

            let key = ProfileKey::new(&sounding.borehole, layer, channel);
            match bound(&in_layer, settings.model, settings.quantile) {
                Ok(profile) => {
                    log::debug!("{key:?}: {}", profile.model_used);
                    profiles.insert(key, profile);
                }
                Err(error) => log::warn!("skipping {key:?}: {error}"),
            }
        }
    }

    profiles
}

/// Profile many soundings in parallel, one worker per sounding.
///
/// `layers` maps borehole identifiers to their layers; soundings without
/// layers produce no profiles.
pub fn profile_project(
    soundings: &[Sounding],
    layers: &BTreeMap<String, Vec<Layer>>,
    channels: &[String],
    settings: &Settings,
) -> BTreeMap<ProfileKey, Profile> {
    thread::scope(|scope| {
        let handles: Vec<_> = soundings
            .iter()
            .map(|sounding| {
                let bh_layers = layers
                    .get(&sounding.borehole)
                    .map_or(&[][..], Vec::as_slice);
                if bh_layers.is_empty() {
                    log::warn!("no layers for {}", sounding.borehole);
                }
                scope.spawn(move || profile_layers(sounding, bh_layers, channels, settings))
            })
            .collect();

        let mut profiles = BTreeMap::new();
        for handle in handles {
            match handle.join() {
                Ok(part) => profiles.extend(part),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        profiles
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Model;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;
    use rand_distr::{Distribution, Normal};

    /// Stiffening clay over a uniform sand, sampled every 5 cm.
    fn synthetic_sounding(borehole: &str, seed: u64) -> Sounding {
        let mut rng = ChaCha12Rng::seed_from_u64(seed);
        let noise = Normal::new(0.0, 0.05).unwrap();

        let depths: Vec<f64> = (0..=400).map(|i| i as f64 * 0.05).collect();
        let qc = depths
            .iter()
            .map(|&d| {
                let trend = if d <= 10.0 { 0.5 + 0.2 * d } else { 12.0 };
                Some(trend + noise.sample(&mut rng))
            })
            .collect();
        let fs = depths.iter().map(|_| None).collect();

        Sounding {
            borehole: borehole.to_string(),
            depths,
            channels: BTreeMap::from([("qc".to_string(), qc), ("fs".to_string(), fs)]),
        }
    }

    fn layers() -> Vec<Layer> {
        vec![
            Layer {
                top: 0.0,
                bottom: 10.0,
                label: "CLAY".to_string(),
                unit: Some("U1".to_string()),
            },
            Layer {
                top: 10.0,
                bottom: 20.0,
                label: "SAND".to_string(),
                unit: None,
            },
        ]
    }

    fn channels() -> Vec<String> {
        vec!["qc".to_string(), "fs".to_string(), "u".to_string()]
    }

    #[test]
    fn query_reports_window_and_profile() {
        let sounding = synthetic_sounding("BH01", 1);
        let report = query(&sounding, "qc", 5.0, &layers(), &Settings::default()).unwrap();

        assert_eq!(report.layer.label, "CLAY");
        assert_eq!(report.window.len(), 21);
        assert_eq!(report.actual_value, sounding.channels["qc"][100]);
        let average = report.average.unwrap();
        assert!((average - 1.5).abs() < 0.1, "average {average}");

        let profile = report.profile.as_ref().unwrap();
        assert_eq!(profile.n_samples, 21);
        assert!((profile.best_estimate.top - 1.4).abs() < 0.2);
    }

    #[test]
    fn query_errors() {
        let sounding = synthetic_sounding("BH01", 2);
        let settings = Settings::default();
        assert!(matches!(
            query(&sounding, "u", 5.0, &layers(), &settings),
            Err(ProfileError::UnknownChannel { .. })
        ));
        assert_eq!(
            query(&sounding, "qc", 25.0, &layers(), &settings).unwrap_err(),
            ProfileError::NoLayer { depth: 25.0 }
        );

        let report = query(&sounding, "fs", 5.0, &layers(), &settings).unwrap();
        assert!(report.window.is_empty());
        assert!(report.profile.is_err());
    }

    #[test]
    fn query_on_layer_boundary_uses_deeper_layer() {
        let sounding = synthetic_sounding("BH01", 7);
        let report = query(&sounding, "qc", 10.0, &layers(), &Settings::default()).unwrap();

        assert_eq!(report.layer.label, "SAND");
        assert_eq!(report.actual_value, sounding.channels["qc"][200]);
        assert!(report.actual_value.is_some());
        assert_eq!(report.window.len(), 21);
        assert!(report.window.depths().iter().all(|&d| d >= 10.0 - 1e-9));
    }

    #[test]
    fn trimming_and_recompute() {
        let sounding = synthetic_sounding("BH01", 3);
        let settings = Settings::default();
        let mut report = query(&sounding, "qc", 5.0, &layers(), &settings).unwrap();

        let cursor = report.window.position_of(5.0).unwrap();
        report.window.drop_above(cursor);
        report.recompute(&settings);

        assert_eq!(report.window.len(), 11);
        assert_eq!(report.profile.as_ref().unwrap().n_samples, 11);
        assert_eq!(report.average, report.window.mean());
    }

    #[test]
    fn layer_profiles_follow_trend() {
        let sounding = synthetic_sounding("BH01", 4);
        let settings = Settings {
            quantile: Quantile::new(95).unwrap(),
            model: ModelChoice::Dependent,
        };
        let profiles = profile_layers(&sounding, &layers(), &channels(), &settings);

        assert_eq!(profiles.len(), 2);
        let clay = &profiles[&ProfileKey::new("BH01", &layers()[0], "qc")];
        assert_eq!(clay.model_used, Model::Dependent);
        assert_eq!(clay.n_samples, 201);
        assert!((clay.best_estimate.top - 0.5).abs() < 0.1);
        assert!((clay.best_estimate.bottom - 2.5).abs() < 0.1);

        let sand = &profiles[&ProfileKey::new("BH01", &layers()[1], "qc")];
        assert!((sand.mean_after - 12.0).abs() < 0.05);
        assert!(sand.lower_bound.top < sand.best_estimate.top);
    }

    #[test]
    fn project_profiles_are_merged() {
        let soundings = vec![synthetic_sounding("BH01", 5), synthetic_sounding("BH02", 6)];
        let layers = BTreeMap::from([("BH01".to_string(), layers()), ("BH02".to_string(), layers())]);
        let profiles = profile_project(&soundings, &layers, &channels(), &Settings::default());

        let boreholes: Vec<_> = profiles.keys().map(|key| key.borehole.as_str()).collect();
        assert_eq!(boreholes, vec!["BH01", "BH01", "BH02", "BH02"]);
    }

    #[test]
    fn keys_order_by_borehole_then_depth() {
        let shallow = ProfileKey::new("BH01", &Layer::new(0.0, 2.0), "qc");
        let deep = ProfileKey::new("BH01", &Layer::new(2.0, 4.0), "fs");
        let other = ProfileKey::new("BH02", &Layer::new(0.0, 2.0), "fs");
        assert!(shallow < deep);
        assert!(deep < other);
        assert_eq!(shallow, ProfileKey::new("BH01", &Layer::new(0.0, 2.0), "qc"));
    }
}
