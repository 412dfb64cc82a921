//! Project file formats: sounding and layer CSV input, MessagePack output.

use crate::config::DataConfig;
use anyhow::{Context, Result, bail};
use cptprofile::analysis::ProfileKey;
use cptprofile::engine::Profile;
use cptprofile::model::{Layer, Sounding};
use rmp_serde::encode;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

/// One row of the layers file.
#[derive(Debug, Deserialize)]
struct LayerRecord {
    borehole: String,
    top: f64,
    bottom: f64,
    label: String,
    unit: Option<String>,
}

/// One entry of the profiles file.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub key: ProfileKey,
    pub profile: Profile,
}

/// Load a sounding from a CSV file with one column per channel.
///
/// The depth of each row is the depth column plus the push depth column (if
/// present), rounded to the centimetre. Rows are sorted by depth. Empty
/// cells are missing values; configured channels absent from the file are
/// skipped.
pub fn load_sounding<P: AsRef<Path>>(file: P, borehole: &str, cfg: &DataConfig) -> Result<Sounding> {
    let file = file.as_ref();
    let mut reader =
        csv::Reader::from_path(file).with_context(|| format!("failed to open {file:?}"))?;
    let headers = reader.headers().context("failed to read headers")?.clone();

    let depth_idx = headers
        .iter()
        .position(|h| h == cfg.depth_column)
        .with_context(|| format!("missing {:?} column", cfg.depth_column))?;
    let push_idx = headers.iter().position(|h| h == cfg.push_column);

    let mut chan_idxs = Vec::new();
    for channel in &cfg.channels {
        match headers.iter().position(|h| h == channel) {
            Some(idx) => chan_idxs.push((channel.clone(), idx)),
            None => log::warn!("{file:?} has no {channel:?} column"),
        }
    }

    let mut rows = Vec::new();
    for (i_row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("failed to read row {i_row}"))?;

        let depth = parse_cell(record.get(depth_idx))
            .with_context(|| format!("invalid depth in row {i_row}"))?
            .with_context(|| format!("missing depth in row {i_row}"))?;
        let push = match push_idx {
            Some(idx) => parse_cell(record.get(idx))
                .with_context(|| format!("invalid push depth in row {i_row}"))?
                .unwrap_or(0.0),
            None => 0.0,
        };

        let mut vals = Vec::with_capacity(chan_idxs.len());
        for (channel, idx) in &chan_idxs {
            let val = parse_cell(record.get(*idx))
                .with_context(|| format!("invalid {channel} in row {i_row}"))?;
            vals.push(val);
        }

        rows.push((round_depth(depth + push), vals));
    }

    rows.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut depths = Vec::with_capacity(rows.len());
    let mut channels: BTreeMap<String, Vec<Option<f64>>> = chan_idxs
        .iter()
        .map(|(channel, _)| (channel.clone(), Vec::with_capacity(rows.len())))
        .collect();
    for (depth, vals) in rows {
        depths.push(depth);
        for ((channel, _), val) in chan_idxs.iter().zip(vals) {
            if let Some(col) = channels.get_mut(channel) {
                col.push(val);
            }
        }
    }

    Ok(Sounding {
        borehole: borehole.to_string(),
        depths,
        channels,
    })
}

/// Load all layers from a CSV file with `borehole,top,bottom,label,unit`
/// columns, grouped by borehole and sorted by top depth.
pub fn load_layers<P: AsRef<Path>>(file: P) -> Result<BTreeMap<String, Vec<Layer>>> {
    let file = file.as_ref();
    let mut reader =
        csv::Reader::from_path(file).with_context(|| format!("failed to open {file:?}"))?;

    let mut layers: BTreeMap<String, Vec<Layer>> = BTreeMap::new();
    for (i_row, record) in reader.deserialize::<LayerRecord>().enumerate() {
        let record = record.with_context(|| format!("failed to read row {i_row}"))?;
        if !(record.top < record.bottom) {
            bail!(
                "layer top must be above its bottom, but is {} >= {} in row {i_row}",
                record.top,
                record.bottom
            );
        }
        let unit = record.unit.filter(|unit| !unit.trim().is_empty());
        layers.entry(record.borehole).or_default().push(Layer {
            top: record.top,
            bottom: record.bottom,
            label: record.label,
            unit,
        });
    }

    for bh_layers in layers.values_mut() {
        bh_layers.sort_by(|a, b| a.top.total_cmp(&b.top));
    }

    Ok(layers)
}

/// Save profiles to a MessagePack-encoded file.
pub fn save_profiles<P: AsRef<Path>>(file: P, profiles: &BTreeMap<ProfileKey, Profile>) -> Result<()> {
    let file = file.as_ref();
    let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
    let mut writer = BufWriter::new(file);

    let entries: Vec<_> = profiles
        .iter()
        .map(|(key, profile)| ProfileEntry {
            key: key.clone(),
            profile: profile.clone(),
        })
        .collect();
    encode::write_named(&mut writer, &entries).context("failed to serialize profiles")?;

    writer.flush().context("failed to flush writer stream")?;

    Ok(())
}

fn parse_cell(cell: Option<&str>) -> Result<Option<f64>> {
    let cell = cell.unwrap_or("").trim();
    if cell.is_empty() {
        return Ok(None);
    }
    let val = cell
        .parse::<f64>()
        .with_context(|| format!("{cell:?} is not a number"))?;
    Ok(Some(val))
}

fn round_depth(depth: f64) -> f64 {
    (depth * 100.0).round() / 100.0
}
