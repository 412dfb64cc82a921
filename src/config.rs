use anyhow::{Context, Result, bail};
use cptprofile::analysis::Settings;
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Project configuration.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Engine parameters.
    #[serde(default)]
    pub profile: Settings,
    /// Input data layout.
    pub data: DataConfig,
}

/// Input data layout parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Channels to profile, named as the sounding CSV columns.
    pub channels: Vec<String>,
    /// Name of the depth column.
    #[serde(default = "default_depth_column")]
    pub depth_column: String,
    /// Name of the optional push depth offset column.
    #[serde(default = "default_push_column")]
    pub push_column: String,
}

fn default_depth_column() -> String {
    "depth".to_string()
}

fn default_push_column() -> String {
    "push_depth".to_string()
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded. Quantile and model values are checked
    /// while deserializing, the rest by [`Config::validate`].
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: Config = toml::from_str(&contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        check_num(self.data.channels.len(), 1..100).context("invalid number of channels")?;
        for (i_chan, channel) in self.data.channels.iter().enumerate() {
            check_name(channel).with_context(|| format!("invalid channel {i_chan}"))?;
            if self.data.channels[..i_chan].contains(channel) {
                bail!("channel {channel:?} is listed twice");
            }
        }
        check_name(&self.data.depth_column).context("invalid depth column")?;
        check_name(&self.data.push_column).context("invalid push depth column")?;
        if self.data.channels.contains(&self.data.depth_column) {
            bail!("depth column cannot be profiled as a channel");
        }

        Ok(())
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

fn check_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        bail!("name must not be empty");
    }
    if name.trim() != name {
        bail!("name {name:?} must not have surrounding whitespace");
    }
    Ok(())
}
