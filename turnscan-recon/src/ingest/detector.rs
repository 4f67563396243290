//! Laser stripe detection in raw frames.

use image::RgbImage;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{debug, warn};
use turnscan_capture::{ExposureKind, RawFrame};
use turnscan_data::{DataPoint, PixelLocation, hue_distance, rgb_to_hsv};

/// How a pixel's stripe likelihood is scored, on a 0..=255 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StripeScoring {
    /// Brightest channel.
    Value,
    /// Brightest channel, counted only when the hue is within
    /// `hue_tolerance` degrees of `hue`.
    LaserHue { hue: f32, hue_tolerance: f32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Minimum score for a pixel to belong to a stripe run.
    pub threshold: f32,
    /// Pixels either side of the peak used for the centroid.
    pub window_half_width: u32,
    pub scoring: StripeScoring,
    /// Only scan these rows (half open), all rows when `None`.
    pub row_range: Option<(u32, u32)>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: 60.0,
            window_half_width: 5,
            scoring: StripeScoring::Value,
            row_range: None,
        }
    }
}

/// Finds the sub-pixel stripe column on every row of a laser frame.
pub struct StripeDetector {
    config: DetectorConfig,
}

impl StripeDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Detect the stripe in `frame`, subtracting `ambient` first when given.
    ///
    /// Emits at most one sample per row, in ascending row order, numbered
    /// from `next_index`. Ambient frames yield nothing.
    pub fn detect(
        &self,
        frame: &RawFrame,
        ambient: Option<&RgbImage>,
        next_index: &mut u32,
    ) -> Vec<DataPoint> {
        let ExposureKind::Laser(side) = frame.tag.kind else {
            return Vec::new();
        };
        let image = &frame.image;
        let ambient = ambient.filter(|a| {
            let matches = a.dimensions() == image.dimensions();
            if !matches {
                warn!(
                    "Ambient frame is {:?} but laser frame {} is {:?}, not subtracting",
                    a.dimensions(),
                    frame.tag.frame,
                    image.dimensions()
                );
            }
            matches
        });

        let rows = self.rows(image.height());
        let mut scores = Vec::with_capacity(image.width() as usize);
        let mut points = Vec::new();
        for row in rows {
            self.score_row(image, ambient, row, &mut scores);
            let Some(column) = self.stripe_column(&scores) else {
                continue;
            };
            let color = sample_color(image, column, row);
            points.push(DataPoint::detection(
                PixelLocation::new(column, row as f32),
                color,
                frame.tag.rotation,
                frame.tag.frame,
                side,
                *next_index,
            ));
            *next_index = next_index.wrapping_add(1);
        }

        debug!(
            "Frame {} ({} laser): {} stripe rows",
            frame.tag.frame,
            side,
            points.len()
        );
        points
    }

    fn rows(&self, height: u32) -> Range<u32> {
        match self.config.row_range {
            Some((first, end)) => first.min(height)..end.min(height),
            None => 0..height,
        }
    }

    fn score_row(&self, image: &RgbImage, ambient: Option<&RgbImage>, row: u32, out: &mut Vec<f32>) {
        out.clear();
        for x in 0..image.width() {
            let mut rgb = image.get_pixel(x, row).0;
            if let Some(ambient) = ambient {
                let reference = ambient.get_pixel(x, row).0;
                for (c, r) in rgb.iter_mut().zip(reference) {
                    *c = c.saturating_sub(r);
                }
            }
            out.push(score_pixel(self.config.scoring, rgb));
        }
    }

    /// Pick the strongest run above threshold and return the intensity
    /// weighted centroid of the window around its peak.
    fn stripe_column(&self, scores: &[f32]) -> Option<f32> {
        let threshold = self.config.threshold;
        let best = runs_above(scores, threshold)
            .max_by_key(|run| OrderedFloat(scores[run.clone()].iter().sum::<f32>()))?;

        // First maximum wins on ties.
        let mut peak = best.start;
        for x in best.clone() {
            if scores[x] > scores[peak] {
                peak = x;
            }
        }

        let half = self.config.window_half_width as usize;
        let lo = peak.saturating_sub(half).max(best.start);
        let hi = (peak + half + 1).min(best.end);
        let (mut weight, mut moment) = (0.0f64, 0.0f64);
        for x in lo..hi {
            let w = scores[x] as f64;
            weight += w;
            moment += w * x as f64;
        }
        if weight <= 0.0 {
            return None;
        }
        Some((moment / weight) as f32)
    }
}

fn score_pixel(scoring: StripeScoring, [r, g, b]: [u8; 3]) -> f32 {
    let value = r.max(g).max(b) as f32;
    match scoring {
        StripeScoring::Value => value,
        StripeScoring::LaserHue { hue, hue_tolerance } => {
            let hsv = rgb_to_hsv(r, g, b);
            if hsv.s > 0.0 && hue_distance(hsv.h, hue) <= hue_tolerance {
                value
            } else {
                0.0
            }
        }
    }
}

/// Maximal runs of consecutive scores at or above `threshold`.
fn runs_above(scores: &[f32], threshold: f32) -> impl Iterator<Item = Range<usize>> + '_ {
    let mut x = 0;
    std::iter::from_fn(move || {
        while x < scores.len() && scores[x] < threshold {
            x += 1;
        }
        if x >= scores.len() {
            return None;
        }
        let start = x;
        while x < scores.len() && scores[x] >= threshold {
            x += 1;
        }
        Some(start..x)
    })
}

fn sample_color(image: &RgbImage, column: f32, row: u32) -> [u8; 3] {
    let x = (column.round().max(0.0) as u32).min(image.width().saturating_sub(1));
    image.get_pixel(x, row).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use turnscan_capture::FrameTag;
    use turnscan_data::LaserSide;

    fn laser_frame(image: RgbImage, frame: u16) -> RawFrame {
        RawFrame::new(
            image,
            FrameTag {
                step: 0,
                rotation: 0.25,
                frame,
                kind: ExposureKind::Laser(LaserSide::Left),
            },
        )
    }

    fn row_image(values: &[u8]) -> RgbImage {
        let mut image = RgbImage::new(values.len() as u32, 1);
        for (x, &v) in values.iter().enumerate() {
            image.put_pixel(x as u32, 0, Rgb([v, v, v]));
        }
        image
    }

    #[test]
    fn test_single_pixel_stripe() {
        let mut image = RgbImage::new(100, 100);
        image.put_pixel(50, 50, Rgb([255, 255, 255]));
        let detector = StripeDetector::new(DetectorConfig::default());
        let mut next = 7;
        let points = detector.detect(&laser_frame(image, 3), None, &mut next);

        assert_eq!(points.len(), 1);
        let p = &points[0];
        assert_eq!(p.pixel, PixelLocation::new(50.0, 50.0));
        assert_eq!(p.color, [255, 255, 255]);
        assert_eq!(p.frame, 3);
        assert_eq!(p.rotation, 0.25);
        assert_eq!(p.laser_side, LaserSide::Left);
        assert_eq!(p.index, 7);
        assert!(p.point.is_none());
        assert_eq!(next, 8);
    }

    #[test]
    fn test_centroid_is_subpixel() {
        let image = row_image(&[0, 0, 100, 200, 100, 0, 0, 0]);
        let detector = StripeDetector::new(DetectorConfig::default());
        let points = detector.detect(&laser_frame(image, 0), None, &mut 0);
        assert!((points[0].pixel.x - 3.0).abs() < 1e-6);

        let image = row_image(&[0, 0, 100, 200, 200, 0, 0, 0]);
        let points = detector.detect(&laser_frame(image, 0), None, &mut 0);
        assert!(points[0].pixel.x > 3.0 && points[0].pixel.x < 3.5);
    }

    #[test]
    fn test_strongest_run_wins_over_reflection() {
        let image = row_image(&[90, 90, 0, 0, 0, 250, 255, 250, 0, 0]);
        let detector = StripeDetector::new(DetectorConfig::default());
        let points = detector.detect(&laser_frame(image, 0), None, &mut 0);
        assert_eq!(points.len(), 1);
        assert!((points[0].pixel.x - 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_below_threshold_row_is_empty() {
        let image = row_image(&[10, 20, 30, 20, 10]);
        let detector = StripeDetector::new(DetectorConfig::default());
        assert!(detector.detect(&laser_frame(image, 0), None, &mut 0).is_empty());
    }

    #[test]
    fn test_ambient_subtraction_removes_background() {
        let ambient = row_image(&[120, 120, 120, 120, 120, 120]);
        let image = row_image(&[120, 120, 120, 255, 120, 120]);
        let detector = StripeDetector::new(DetectorConfig {
            threshold: 100.0,
            ..DetectorConfig::default()
        });

        let without = detector.detect(&laser_frame(image.clone(), 0), None, &mut 0);
        assert!((without[0].pixel.x - 3.0).abs() > 0.1);

        let with = detector.detect(&laser_frame(image, 0), Some(&ambient), &mut 0);
        assert!((with[0].pixel.x - 3.0).abs() < 1e-6);
        assert_eq!(with[0].color, [255, 255, 255]);
    }

    #[test]
    fn test_hue_scoring_ignores_off_color_light() {
        let mut image = RgbImage::new(6, 1);
        image.put_pixel(1, 0, Rgb([0, 0, 250]));
        image.put_pixel(4, 0, Rgb([200, 10, 10]));
        let detector = StripeDetector::new(DetectorConfig {
            scoring: StripeScoring::LaserHue {
                hue: 0.0,
                hue_tolerance: 20.0,
            },
            ..DetectorConfig::default()
        });
        let points = detector.detect(&laser_frame(image, 0), None, &mut 0);
        assert!((points[0].pixel.x - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_row_range_limits_rows() {
        let image = RgbImage::from_pixel(4, 10, Rgb([255, 255, 255]));
        let detector = StripeDetector::new(DetectorConfig {
            row_range: Some((2, 5)),
            ..DetectorConfig::default()
        });
        let rows: Vec<f32> = detector
            .detect(&laser_frame(image, 0), None, &mut 0)
            .iter()
            .map(|p| p.pixel.y)
            .collect();
        assert_eq!(rows, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_ambient_frame_yields_nothing() {
        let image = RgbImage::from_pixel(4, 4, Rgb([255, 255, 255]));
        let frame = RawFrame::new(
            image,
            FrameTag {
                step: 0,
                rotation: 0.0,
                frame: 0,
                kind: ExposureKind::Ambient,
            },
        );
        let detector = StripeDetector::new(DetectorConfig::default());
        assert!(detector.detect(&frame, None, &mut 0).is_empty());
    }
}
