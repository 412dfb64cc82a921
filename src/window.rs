//! Depth-window sample selection around a query depth.
//!
//! The nominal window spans half a metre above and below the query depth.
//! Where that window runs past the top of the hole, the bottom of the hole or
//! the edge of the enclosing layer, the missing rows are made up by shifting
//! the window away from the boundary, so that the number of samples matches
//! an unclipped window whenever the sounding allows it.

use crate::error::ProfileError;
use crate::model::{Layer, Sample};
use crate::stats::compute_mean;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Nominal half-width of the window (m).
const HALF_WIDTH: f64 = 0.5;
/// Reach beyond which samples never belong to the window (m).
const REACH: f64 = 0.51;
/// Depth step between consecutive samples that counts as a data gap (m).
const GAP_STEP: f64 = 0.15;
/// Samples shallower than this are never checked for gaps (m).
const GAP_MIN_DEPTH: f64 = 0.15;
/// Layers thinner than this cannot support a shifted window (m).
const THIN_LAYER: f64 = 0.999;
/// Tolerance for depth comparisons (m).
const DEPTH_TOL: f64 = 1e-9;

/// Ordered samples selected for one query.
///
/// Holds only samples with a valid value, ascending by depth, one sample per
/// depth.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Window {
    samples: Vec<Sample>,
}

impl Window {
    /// Build a window from arbitrary samples.
    ///
    /// Invalid samples are dropped, the rest sorted by depth; of several
    /// samples at the same depth the first one is kept.
    pub fn from_samples(samples: impl IntoIterator<Item = Sample>) -> Self {
        let mut samples: Vec<_> = samples.into_iter().filter(Sample::is_valid).collect();
        samples.sort_by(|a, b| a.depth.total_cmp(&b.depth));
        samples.dedup_by(|b, a| (b.depth - a.depth).abs() <= DEPTH_TOL);
        Self { samples }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn depths(&self) -> Vec<f64> {
        self.samples.iter().map(|sample| sample.depth).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples
            .iter()
            .filter_map(Sample::valid_value)
            .collect()
    }

    /// Index of the sample recorded at `depth`.
    pub fn position_of(&self, depth: f64) -> Option<usize> {
        self.samples
            .iter()
            .position(|sample| (sample.depth - depth).abs() <= DEPTH_TOL)
    }

    /// Value recorded exactly at `depth`, if the window holds that depth.
    pub fn value_at(&self, depth: f64) -> Option<f64> {
        self.position_of(depth)
            .and_then(|idx| self.samples[idx].valid_value())
    }

    /// Average of all values in the window, `None` when empty.
    pub fn mean(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        Some(compute_mean(&self.values()))
    }

    /// Drop every sample shallower than the one at `idx`.
    pub fn drop_above(&mut self, idx: usize) {
        let idx = idx.min(self.samples.len());
        self.samples.drain(..idx);
    }

    /// Drop every sample deeper than the one at `idx`.
    ///
    /// The sample at `idx` itself is kept; follow with [`Window::remove`] to
    /// cut from the cursor onward.
    pub fn drop_below(&mut self, idx: usize) {
        self.samples.truncate(idx.saturating_add(1));
    }

    /// Remove the sample at `idx`, returning it.
    pub fn remove(&mut self, idx: usize) -> Option<Sample> {
        (idx < self.samples.len()).then(|| self.samples.remove(idx))
    }
}

/// Select the samples representative of `query_depth` inside `layer`.
///
/// `sounding` must be sorted ascending by depth.
///
/// # Errors
/// Returns [`ProfileError::Gap`] when the query depth is the last measured
/// depth before a hole in the sounding.
pub fn select(sounding: &[Sample], query_depth: f64, layer: &Layer) -> Result<Window, ProfileError> {
    let bounds = scan(sounding, query_depth)?;
    let len = sounding.len() as isize;

    // Drop rows left over from a sparse stretch above the window.
    let mut start = bounds.start;
    while start >= 0
        && start < bounds.end
        && start < len
        && sounding[start as usize].depth < query_depth - REACH - DEPTH_TOL
    {
        start += 1;
    }
    let end = bounds.end;

    let mut rows = BTreeSet::new();
    let mut zero_count = 0;
    let mut min_count = 0;
    let mut max_count = 0;

    for pos in start..end {
        if pos < 0 {
            zero_count += 1;
            continue;
        }
        if pos >= len {
            max_count += 1;
            continue;
        }
        let sample = &sounding[pos as usize];
        if !sample.is_valid() {
            continue;
        }
        let depth = sample.depth;
        if depth >= layer.bottom - DEPTH_TOL && depth <= query_depth + REACH + DEPTH_TOL {
            max_count += 1;
        } else if depth < layer.top - DEPTH_TOL && depth >= query_depth - REACH - DEPTH_TOL {
            min_count += 1;
        } else {
            rows.insert(pos as usize);
        }
    }

    log::debug!(
        "window {start}..{end} at {query_depth} m: {} rows, zero_count = {zero_count}, min_count = {min_count}, max_count = {max_count}",
        rows.len()
    );

    if layer.thickness() < THIN_LAYER {
        zero_count = 0;
        min_count = 0;
        max_count = 0;
    }

    let collect_range = |rows: &mut BTreeSet<usize>, from: isize, to: isize| {
        for pos in from.max(0)..to.min(len) {
            if sounding[pos as usize].is_valid() {
                rows.insert(pos as usize);
            }
        }
    };

    // Window started above the first sample: borrow rows from below.
    if zero_count != 0 {
        collect_range(&mut rows, start + zero_count, end + zero_count);
    }

    // Rows cut at the top of the layer: borrow rows from below.
    if min_count != 0 {
        collect_range(&mut rows, start + min_count, end + min_count);
    }

    // Rows cut at the bottom of the layer or of the hole: borrow rows from above.
    if max_count != 0 {
        for pos in (start - max_count..start).rev() {
            if pos < 0 {
                break;
            }
            if pos < len && sounding[pos as usize].is_valid() {
                rows.insert(pos as usize);
            }
        }
    }

    Ok(Window::from_samples(rows.into_iter().map(|idx| sounding[idx])))
}

/// Index range of the nominal window, possibly extending past either end of
/// the sounding.
#[derive(Debug, PartialEq)]
struct WindowBounds {
    start: isize,
    end: isize,
}

fn scan(sounding: &[Sample], query_depth: f64) -> Result<WindowBounds, ProfileError> {
    let low = query_depth - HALF_WIDTH;
    let high = query_depth + HALF_WIDTH;
    let reach = query_depth + REACH;

    let mut min_index = None;
    let mut max_index = None;
    let mut stop_index = None;
    let mut query_index = None;

    for (idx, sample) in sounding.iter().enumerate() {
        let depth = sample.depth;
        if depth.is_nan() {
            continue;
        }
        if depth <= query_depth + DEPTH_TOL {
            query_index = Some(idx);
        }

        if depth <= low + DEPTH_TOL {
            min_index = Some(idx);
        } else if depth >= high - DEPTH_TOL && depth <= reach + DEPTH_TOL {
            max_index.get_or_insert(idx);
        } else if depth > reach + DEPTH_TOL {
            stop_index = Some(idx);
            break;
        } else if max_index.is_none() && idx + 1 < sounding.len() && depth >= GAP_MIN_DEPTH {
            let next = sounding[idx + 1].depth;
            if next - depth > GAP_STEP + DEPTH_TOL {
                if (depth - query_depth).abs() <= DEPTH_TOL {
                    return Err(ProfileError::Gap { depth: query_depth });
                }
                log::debug!("data gap below {depth} m, truncating window");
                stop_index = Some(idx + 1);
                break;
            }
        }
    }

    let len = sounding.len() as isize;
    let start = match (min_index, query_index, max_index) {
        (Some(idx), _, _) => idx as isize,
        // Hole starts inside the window: mirror the lower half upwards.
        (None, Some(centre), Some(max)) => (2 * centre as isize - max as isize).min(0),
        _ => 0,
    };
    let end = match (max_index, stop_index, min_index, query_index) {
        (Some(idx), _, _, _) => idx as isize + 1,
        (None, Some(idx), _, _) => idx as isize,
        // Hole ends inside the window: mirror the upper half downwards.
        (None, None, Some(min), Some(centre)) => (2 * centre as isize - min as isize + 1).max(len),
        _ => len,
    };

    Ok(WindowBounds { start, end })
}
