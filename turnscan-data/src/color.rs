//! RGB to HSV conversion used when scoring laser stripe intensity.

/// Color in the hue, saturation, value format.
///
/// `h` is in degrees `[0, 360)`, `s` and `v` are in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsv {
    pub h: f32,
    pub s: f32,
    pub v: f32,
}

/// Convert an 8-bit RGB triple to HSV.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> Hsv {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max > 0.0 { delta / max } else { 0.0 };

    let h = if delta <= 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };

    Hsv { h, s, v: max }
}

/// Angular distance between two hues in degrees, in `[0, 180]`.
pub fn hue_distance(a: f32, b: f32) -> f32 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_colors() {
        let red = rgb_to_hsv(255, 0, 0);
        assert_eq!((red.h, red.s, red.v), (0.0, 1.0, 1.0));

        let green = rgb_to_hsv(0, 255, 0);
        assert!((green.h - 120.0).abs() < 1e-4);

        let blue = rgb_to_hsv(0, 0, 255);
        assert!((blue.h - 240.0).abs() < 1e-4);
    }

    #[test]
    fn test_grey_has_no_saturation() {
        let grey = rgb_to_hsv(128, 128, 128);
        assert_eq!(grey.s, 0.0);
        assert_eq!(grey.h, 0.0);
        assert!((grey.v - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_magenta_red_wraps() {
        // Slightly blue red sits just below 360 degrees.
        let hsv = rgb_to_hsv(255, 0, 20);
        assert!(hsv.h > 350.0);
        assert!(hue_distance(hsv.h, 0.0) < 10.0);
    }

    #[test]
    fn test_hue_distance() {
        assert_eq!(hue_distance(10.0, 350.0), 20.0);
        assert_eq!(hue_distance(0.0, 180.0), 180.0);
    }
}
