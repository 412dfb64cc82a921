use crate::config::Config;
use crate::data::{load_layers, load_sounding, save_profiles};
use anyhow::{Context, Result, bail};
use cptprofile::analysis::{QueryReport, profile_project, query};
use cptprofile::engine::ModelChoice;
use cptprofile::model::{Layer, Sounding};
use cptprofile::tables::Quantile;
use glob::glob;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

/// Command line overrides of the configured engine parameters.
#[derive(Debug, Default, Clone, Copy)]
pub struct Overrides {
    pub quantile: Option<Quantile>,
    pub model: Option<ModelChoice>,
}

/// Manual window edits applied before a query is reported.
#[derive(Debug, Default, Clone)]
pub struct Trim {
    /// Drop every sample shallower than this depth.
    pub drop_above: Option<f64>,
    /// Drop every sample deeper than this depth.
    pub drop_below: Option<f64>,
    /// Drop the samples at these depths.
    pub remove: Vec<f64>,
}

pub struct Manager {
    project_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(project_dir: P, overrides: Overrides) -> Result<Self> {
        let project_dir = project_dir.as_ref().to_path_buf();

        let mut cfg =
            Config::from_file(project_dir.join("config.toml")).context("failed to construct cfg")?;
        if let Some(quantile) = overrides.quantile {
            cfg.profile.quantile = quantile;
        }
        if let Some(model) = overrides.model {
            cfg.profile.model = model;
        }
        log::info!("{cfg:#?}");

        Ok(Self { project_dir, cfg })
    }

    pub fn profile_project(&self) -> Result<()> {
        let layers = self.load_layers().context("failed to load layers")?;

        let files = self.sounding_files().context("failed to list sounding files")?;
        if files.is_empty() {
            bail!("no sounding files in {:?}", self.soundings_dir());
        }

        let mut soundings = Vec::with_capacity(files.len());
        for file in files {
            let borehole = borehole_name(&file)?;
            let sounding = load_sounding(&file, &borehole, &self.cfg.data)
                .with_context(|| format!("failed to load {file:?}"))?;
            log::info!("loaded {file:?} ({} rows)", sounding.depths.len());
            soundings.push(sounding);
        }

        let profiles = profile_project(
            &soundings,
            &layers,
            &self.cfg.data.channels,
            &self.cfg.profile,
        );
        log::info!("computed {} profiles", profiles.len());

        let profiles_file = self.profiles_file();
        save_profiles(&profiles_file, &profiles)
            .with_context(|| format!("failed to save {profiles_file:?}"))?;
        log::info!("saved {profiles_file:?}");

        Ok(())
    }

    pub fn query_depth(&self, borehole: &str, channel: &str, depth: f64, trim: &Trim) -> Result<()> {
        let layers = self.load_layers().context("failed to load layers")?;
        let bh_layers = layers
            .get(borehole)
            .with_context(|| format!("no layers for {borehole}"))?;
        let sounding = self
            .load_sounding(borehole)
            .with_context(|| format!("failed to load sounding {borehole}"))?;

        let mut report = query(&sounding, channel, depth, bh_layers, &self.cfg.profile)
            .with_context(|| format!("failed to query {borehole} {channel} at {depth} m"))?;

        if apply_trim(&mut report, trim).context("failed to trim window")? {
            report.recompute(&self.cfg.profile);
        }

        log_report(&report);

        Ok(())
    }

    pub fn clean_project(&self) -> Result<()> {
        let profiles_file = self.profiles_file();
        if profiles_file.exists() {
            fs::remove_file(&profiles_file)
                .with_context(|| format!("failed to remove {profiles_file:?}"))?;
            log::info!("removed {profiles_file:?}");
        }

        Ok(())
    }

    fn load_layers(&self) -> Result<BTreeMap<String, Vec<Layer>>> {
        let layers_file = self.project_dir.join("layers.csv");
        load_layers(&layers_file).with_context(|| format!("failed to load {layers_file:?}"))
    }

    fn load_sounding(&self, borehole: &str) -> Result<Sounding> {
        let file = self.soundings_dir().join(format!("{borehole}.csv"));
        load_sounding(&file, borehole, &self.cfg.data)
    }

    fn sounding_files(&self) -> Result<Vec<PathBuf>> {
        let pattern = self.soundings_dir().join("*.csv");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        let mut files: Vec<_> = glob(pattern)
            .context("failed to glob sounding files")?
            .filter_map(Result::ok)
            .collect();
        files.sort();
        Ok(files)
    }

    fn soundings_dir(&self) -> PathBuf {
        self.project_dir.join("soundings")
    }

    fn profiles_file(&self) -> PathBuf {
        self.project_dir.join("profiles.msgpack")
    }
}

fn borehole_name(file: &Path) -> Result<String> {
    let stem = file
        .file_stem()
        .and_then(|stem| stem.to_str())
        .with_context(|| format!("invalid file name {file:?}"))?;
    Ok(stem.to_string())
}

fn apply_trim(report: &mut QueryReport, trim: &Trim) -> Result<bool> {
    let window = &mut report.window;
    let mut trimmed = false;

    if let Some(depth) = trim.drop_above {
        let idx = window
            .position_of(depth)
            .with_context(|| format!("no sample at {depth} m"))?;
        window.drop_above(idx);
        trimmed = true;
    }
    if let Some(depth) = trim.drop_below {
        let idx = window
            .position_of(depth)
            .with_context(|| format!("no sample at {depth} m"))?;
        window.drop_below(idx);
        trimmed = true;
    }
    for &depth in &trim.remove {
        let idx = window
            .position_of(depth)
            .with_context(|| format!("no sample at {depth} m"))?;
        window.remove(idx);
        trimmed = true;
    }

    Ok(trimmed)
}

fn log_report(report: &QueryReport) {
    let layer = &report.layer;
    log::info!(
        "{} {} at {} m, layer {} {}-{} m, unit {}",
        report.borehole,
        report.channel,
        report.query_depth,
        layer.label,
        layer.top,
        layer.bottom,
        layer.unit_or_default()
    );

    let window = report.window.samples();
    match (window.first(), window.last()) {
        (Some(first), Some(last)) => log::info!(
            "window {}-{} m, {} samples",
            first.depth,
            last.depth,
            window.len()
        ),
        _ => log::info!("window is empty"),
    }
    log::info!(
        "actual value {:?}, average {:?}",
        report.actual_value,
        report.average
    );

    match &report.profile {
        Ok(profile) => {
            let quantile = profile.quantile;
            log::info!(
                "{} model, {} of {} samples retained",
                profile.model_used,
                profile.n_retained,
                profile.n_samples
            );
            log::info!(
                "best estimate {:.3} at {} m, {:.3} at {} m",
                profile.best_estimate.top,
                profile.depth_top,
                profile.best_estimate.bottom,
                profile.depth_bottom
            );
            log::info!(
                "{} bound {:.3}-{:.3}, {} bound {:.3}-{:.3}",
                quantile.upper_label(),
                profile.upper_bound.top,
                profile.upper_bound.bottom,
                quantile.lower_label(),
                profile.lower_bound.top,
                profile.lower_bound.bottom
            );
            log::info!(
                "mean 95% interval {:.3}-{:.3} to {:.3}-{:.3}",
                profile.mean_ci95_lower.top,
                profile.mean_ci95_lower.bottom,
                profile.mean_ci95_upper.top,
                profile.mean_ci95_upper.bottom
            );
            log::info!(
                "std dev {:.3} before, {:.3} after rejection",
                profile.std_dev_before,
                profile.std_dev_after
            );
        }
        Err(error) => log::warn!("no profile: {error}"),
    }
}
