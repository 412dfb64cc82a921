//! Sounding data types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Single depth-tagged measurement of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Depth below ground level (m).
    pub depth: f64,

    /// Measured value, `None` where the channel was not recorded.
    pub value: Option<f64>,
}

impl Sample {
    pub fn new(depth: f64, value: f64) -> Self {
        Self {
            depth,
            value: Some(value),
        }
    }

    pub fn missing(depth: f64) -> Self {
        Self { depth, value: None }
    }

    /// Value if present and finite.
    pub fn valid_value(&self) -> Option<f64> {
        self.value.filter(|val| val.is_finite())
    }

    pub fn is_valid(&self) -> bool {
        !self.depth.is_nan() && self.valid_value().is_some()
    }
}

/// Depth interval classified as one geological unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// Top depth (m).
    pub top: f64,
    /// Bottom depth (m).
    pub bottom: f64,
    /// Soil description, e.g. `"CLAY"`.
    pub label: String,
    /// Geological unit, absent when the layer has not been unitised.
    pub unit: Option<String>,
}

impl Layer {
    pub fn new(top: f64, bottom: f64) -> Self {
        Self {
            top,
            bottom,
            label: String::new(),
            unit: None,
        }
    }

    pub fn thickness(&self) -> f64 {
        self.bottom - self.top
    }

    /// Whether `depth` lies inside the layer, both ends included.
    pub fn contains(&self, depth: f64) -> bool {
        self.top <= depth && depth <= self.bottom
    }

    pub fn unit_or_default(&self) -> &str {
        self.unit.as_deref().unwrap_or("un-unitised")
    }
}

/// Find the layer containing `depth`.
///
/// `layers` are ordered top down; a depth on a shared boundary belongs to the
/// deeper layer.
pub fn find_layer(layers: &[Layer], depth: f64) -> Option<&Layer> {
    layers.iter().rev().find(|layer| layer.contains(depth))
}

/// Full record of one CPT push.
///
/// Depths are ascending; every channel holds one optional value per depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sounding {
    pub borehole: String,
    pub depths: Vec<f64>,
    pub channels: BTreeMap<String, Vec<Option<f64>>>,
}

impl Sounding {
    /// Samples of a single channel, `None` if the channel does not exist.
    pub fn channel(&self, name: &str) -> Option<Vec<Sample>> {
        let vals = self.channels.get(name)?;
        Some(
            self.depths
                .iter()
                .zip(vals)
                .map(|(&depth, &value)| Sample { depth, value })
                .collect(),
        )
    }
}
