//! Conversions between pixels, centimetres and degrees of visual angle, and
//! between the two screen coordinate systems in use.
//!
//! The eye tracker reports gaze with the origin at a screen corner and y
//! growing downwards; the presentation code places stimuli relative to the
//! screen center with y growing upwards.

use serde::{Deserialize, Serialize};

pub type Point = (f64, f64);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenGeometry {
    /// Eye to screen distance
    pub eye_screen_cm: f64,
    pub screen_width_cm: f64,
    pub screen_height_cm: f64,
    pub resolution: (u32, u32),
}

impl Default for ScreenGeometry {
    fn default() -> Self {
        Self {
            eye_screen_cm: 147.5,
            screen_width_cm: 70.3,
            screen_height_cm: 39.5,
            resolution: (1920, 1080),
        }
    }
}

impl ScreenGeometry {
    fn half_res(&self) -> Point {
        (
            self.resolution.0 as f64 / 2.0,
            self.resolution.1 as f64 / 2.0,
        )
    }

    pub fn pix2cm(&self, x: f64) -> f64 {
        x * self.screen_width_cm / self.resolution.0 as f64
    }

    pub fn cm2pix(&self, x: f64) -> f64 {
        x * self.resolution.0 as f64 / self.screen_width_cm
    }

    pub fn deg2cm(&self, theta: f64) -> f64 {
        self.eye_screen_cm * theta.to_radians().tan()
    }

    pub fn cm2deg(&self, x: f64) -> f64 {
        (x / self.eye_screen_cm).atan().to_degrees()
    }

    pub fn pix2deg(&self, x: f64) -> f64 {
        self.cm2deg(self.pix2cm(x))
    }

    pub fn deg2pix(&self, theta: f64) -> f64 {
        self.cm2pix(self.deg2cm(theta))
    }

    /// Eye-tracker coordinates to screen-centered coordinates (y up).
    pub fn origin_eyelink_to_centered(&self, pos: Point) -> Point {
        let (hw, hh) = self.half_res();
        (pos.0 - hw, hh - pos.1)
    }

    /// Screen-centered coordinates (y up) to eye-tracker coordinates.
    pub fn origin_centered_to_eyelink(&self, pos: Point) -> Point {
        let (hw, hh) = self.half_res();
        (pos.0 + hw, hh - pos.1)
    }

    /// Centers of the left, center and right stimulus slots in
    /// screen-centered coordinates. The distance is truncated to whole pixels.
    pub fn slot_centers(&self, stim_dist_deg: f64) -> [Point; 3] {
        let d = self.deg2pix(stim_dist_deg).trunc();
        [(-d, 0.0), (0.0, 0.0), (d, 0.0)]
    }

    /// Slot centers converted once into eye-tracker coordinates.
    pub fn slot_centers_eyelink(&self, stim_dist_deg: f64) -> [Point; 3] {
        self.slot_centers(stim_dist_deg)
            .map(|p| self.origin_centered_to_eyelink(p))
    }
}

pub fn euclidean(a: Point, b: Point) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn degree_conversion_round_trips() {
        let g = ScreenGeometry::default();
        for deg in [0.5, 1.0, 2.0, 5.0] {
            assert!((g.pix2deg(g.deg2pix(deg)) - deg).abs() < EPS);
        }
    }

    #[test]
    fn five_degrees_at_default_viewing_distance() {
        let g = ScreenGeometry::default();
        // 147.5 * tan(5°) = 12.9046 cm, at 1920 px / 70.3 cm
        let px = g.deg2pix(5.0);
        assert!((px - 352.44).abs() < 0.01, "got {px}");
        assert_eq!(g.slot_centers(5.0)[2], (352.0, 0.0));
    }

    #[test]
    fn origin_conversions_are_inverse() {
        let g = ScreenGeometry::default();
        let centered = (-120.0, 45.5);
        let eye = g.origin_centered_to_eyelink(centered);
        assert_eq!(eye, (840.0, 494.5));
        assert_eq!(g.origin_eyelink_to_centered(eye), centered);
    }

    #[test]
    fn screen_center_maps_to_half_resolution() {
        let g = ScreenGeometry::default();
        assert_eq!(g.origin_centered_to_eyelink((0.0, 0.0)), (960.0, 540.0));
        let eye = g.slot_centers_eyelink(5.0);
        assert_eq!(eye, [(608.0, 540.0), (960.0, 540.0), (1312.0, 540.0)]);
    }

    #[test]
    fn euclidean_distance() {
        assert!((euclidean((0.0, 0.0), (3.0, 4.0)) - 5.0).abs() < EPS);
    }
}
