//! Logical frame assembly and per frame low pass filtering.
//!
//! Detections arrive as one flat sequence per turntable step. The
//! [`FrameAssembler`] splits that sequence into logical frames (contiguous
//! runs captured from the same camera frame with the same laser) and
//! [`FrameFilter`] reduces each logical frame to at most one averaged sample
//! per row bin.

use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use turnscan_data::{ColoredPoint, DataPoint, PixelLocation};

/// Partition of image rows into equal height bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowBinning {
    pub max_num_rows: u32,
    pub num_row_bins: u32,
}

impl RowBinning {
    pub fn new(max_num_rows: u32, num_row_bins: u32) -> Self {
        Self {
            max_num_rows: max_num_rows.max(1),
            num_row_bins: num_row_bins.clamp(1, max_num_rows.max(1)),
        }
    }

    /// Bin containing row coordinate `y`, `None` outside the image.
    pub fn bin_of(&self, y: f32) -> Option<u32> {
        let y = y as f64;
        if !(y >= 0.0 && y < self.max_num_rows as f64) {
            return None;
        }
        let bin = (y * self.num_row_bins as f64 / self.max_num_rows as f64).floor() as u32;
        Some(bin.min(self.num_row_bins - 1))
    }
}

/// Finds the end of the logical frame starting at `*cursor` and advances the
/// cursor past it. Returns `false` once `results` is exhausted.
pub fn skip_next_frame(results: &[DataPoint], cursor: &mut usize) -> bool {
    let start = *cursor;
    let Some(first) = results.get(start) else {
        return false;
    };
    let len = results[start..]
        .iter()
        .take_while(|p| p.frame == first.frame && p.laser_side == first.laser_side)
        .count();
    *cursor = start + len;
    true
}

/// Assigns monotonically increasing pseudo frame ids across a scan.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    next_pseudo_frame: u16,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next logical frame will receive.
    pub fn next_pseudo_frame(&self) -> u16 {
        self.next_pseudo_frame
    }

    /// Tag the logical frame starting at `*cursor` and return its range in
    /// `results`. `None` when no samples remain.
    pub fn read_next_frame(
        &mut self,
        results: &mut [DataPoint],
        cursor: &mut usize,
    ) -> Option<Range<usize>> {
        let start = *cursor;
        if !skip_next_frame(results, cursor) {
            return None;
        }
        let range = start..*cursor;
        let id = self.next_pseudo_frame;
        for point in &mut results[range.clone()] {
            point.pseudo_frame = Some(id);
        }
        self.next_pseudo_frame = id.saturating_add(1);
        Some(range)
    }

    /// Tag every logical frame in `results`, returning their ranges in order.
    pub fn assemble(&mut self, results: &mut [DataPoint]) -> Vec<Range<usize>> {
        let mut cursor = 0;
        let mut frames = Vec::new();
        while let Some(range) = self.read_next_frame(results, &mut cursor) {
            frames.push(range);
        }
        frames
    }
}

/// Low pass filter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Row bins per image height.
    pub num_row_bins: u32,
    /// Drop samples further than this many pixels from the bin's median
    /// column before averaging.
    pub outlier_tolerance: Option<f32>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            num_row_bins: 240,
            outlier_tolerance: None,
        }
    }
}

/// Per logical frame row bin filter.
#[derive(Debug, Clone)]
pub struct FrameFilter {
    binning: RowBinning,
    outlier_tolerance: Option<f32>,
}

impl FrameFilter {
    pub fn new(config: &FilterConfig, max_num_rows: u32) -> Self {
        Self {
            binning: RowBinning::new(max_num_rows, config.num_row_bins),
            outlier_tolerance: config.outlier_tolerance,
        }
    }

    pub fn binning(&self) -> RowBinning {
        self.binning
    }

    pub fn filter(&self, frame: &mut [DataPoint]) -> Vec<DataPoint> {
        match self.outlier_tolerance {
            None => lowpass_filter(frame, self.binning),
            Some(tolerance) => filter_bins(frame, self.binning, |bin| {
                compute_average(&reject_outliers(bin, tolerance))
            }),
        }
    }
}

/// Reduce one logical frame to at most one averaged sample per row bin,
/// ordered by bin. Samples outside the image rows are dropped.
///
/// Reorders `frame` by row. Applying the filter to its own output is a no-op.
pub fn lowpass_filter(frame: &mut [DataPoint], binning: RowBinning) -> Vec<DataPoint> {
    filter_bins(frame, binning, compute_average)
}

fn filter_bins(
    frame: &mut [DataPoint],
    binning: RowBinning,
    reduce: impl Fn(&[DataPoint]) -> Option<DataPoint>,
) -> Vec<DataPoint> {
    frame.sort_by(|a, b| a.pixel.y.total_cmp(&b.pixel.y));

    let mut output = Vec::new();
    let mut start = 0;
    while start < frame.len() {
        let bin = binning.bin_of(frame[start].pixel.y);
        let len = frame[start..]
            .iter()
            .take_while(|p| binning.bin_of(p.pixel.y) == bin)
            .count();
        if bin.is_some() {
            output.extend(reduce(&frame[start..start + len]));
        }
        start += len;
    }
    output
}

fn reject_outliers(bin: &[DataPoint], tolerance: f32) -> Vec<DataPoint> {
    if bin.len() < 3 {
        return bin.to_vec();
    }
    let mut columns: Vec<f32> = bin.iter().map(|p| p.pixel.x).collect();
    columns.sort_by(f32::total_cmp);
    let median = columns[columns.len() / 2];
    bin.iter()
        .filter(|p| (p.pixel.x - median).abs() <= tolerance)
        .copied()
        .collect()
}

/// Average the pixel location, color, rotation and resolved point of a row
/// bin. Frame, laser side, pseudo frame and index come from the first member.
pub fn compute_average(bin: &[DataPoint]) -> Option<DataPoint> {
    let first = bin.first()?;
    let n = bin.len() as f64;

    let (mut x, mut y, mut rotation) = (0.0f64, 0.0f64, 0.0f64);
    let mut color = [0u32; 3];
    for p in bin {
        x += p.pixel.x as f64;
        y += p.pixel.y as f64;
        rotation += p.rotation;
        for (sum, c) in color.iter_mut().zip(p.color) {
            *sum += c as u32;
        }
    }
    let count = bin.len() as u32;
    let color = color.map(|sum| ((sum + count / 2) / count) as u8);

    let resolved: Vec<&ColoredPoint> = bin.iter().filter_map(|p| p.point.as_ref()).collect();
    let point = if resolved.is_empty() {
        None
    } else {
        let sum = resolved.iter().map(|p| p.position()).sum::<DVec3>();
        let mut averaged = ColoredPoint::new(sum / resolved.len() as f64, color);
        averaged.normal = resolved[0].normal;
        Some(averaged)
    };

    Some(DataPoint {
        pixel: PixelLocation::new((x / n) as f32, (y / n) as f32),
        color,
        point,
        rotation: rotation / n,
        ..*first
    })
}
