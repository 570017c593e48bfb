//! Robot tool-center-point pose.
//!
//! The robot streams `actual_TCP_pose` as six big-endian doubles in meters and
//! radians. Operators and the product database work in millimeters and degrees.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Translation factor from protocol meters to millimeters
pub const METERS_TO_MILLIMETERS: f64 = 1000.0;

/// Rotation factor from protocol radians to degrees
pub const RADIANS_TO_DEGREES: f64 = 180.0 / std::f64::consts::PI;

/// Largest plausible translation on any axis, in millimeters
const MAX_TRANSLATION_MM: f64 = 2000.0;

/// Largest plausible rotation on any axis, in degrees
const MAX_ROTATION_DEG: f64 = 360.0;

/// Ordered 6-tuple `(x, y, z, rx, ry, rz)`.
///
/// The struct itself carries no unit tag. Values produced by the codec are in
/// meters/radians; [`Pose::to_millimeters_degrees`] yields the operator view.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
}

impl Pose {
    pub const fn new(x: f64, y: f64, z: f64, rx: f64, ry: f64, rz: f64) -> Self {
        Self { x, y, z, rx, ry, rz }
    }

    pub const fn from_array(values: [f64; 6]) -> Self {
        Self::new(values[0], values[1], values[2], values[3], values[4], values[5])
    }

    pub const fn to_array(&self) -> [f64; 6] {
        [self.x, self.y, self.z, self.rx, self.ry, self.rz]
    }

    /// Convert a meters/radians pose to millimeters/degrees
    pub fn to_millimeters_degrees(&self) -> Self {
        Self::new(
            self.x * METERS_TO_MILLIMETERS,
            self.y * METERS_TO_MILLIMETERS,
            self.z * METERS_TO_MILLIMETERS,
            self.rx * RADIANS_TO_DEGREES,
            self.ry * RADIANS_TO_DEGREES,
            self.rz * RADIANS_TO_DEGREES,
        )
    }

    /// Convert a millimeters/degrees pose back to meters/radians
    pub fn to_meters_radians(&self) -> Self {
        Self::new(
            self.x / METERS_TO_MILLIMETERS,
            self.y / METERS_TO_MILLIMETERS,
            self.z / METERS_TO_MILLIMETERS,
            self.rx / RADIANS_TO_DEGREES,
            self.ry / RADIANS_TO_DEGREES,
            self.rz / RADIANS_TO_DEGREES,
        )
    }

    /// Range check for a meters/radians reading.
    ///
    /// A UR arm cannot reach beyond ±2 m, and rotation vectors never exceed one
    /// full turn. Anything outside indicates a misparsed reply.
    pub fn is_plausible(&self) -> bool {
        let display = self.to_millimeters_degrees();
        let translation_ok = [display.x, display.y, display.z]
            .iter()
            .all(|v| v.is_finite() && v.abs() <= MAX_TRANSLATION_MM);
        let rotation_ok = [display.rx, display.ry, display.rz]
            .iter()
            .all(|v| v.is_finite() && v.abs() <= MAX_ROTATION_DEG);
        translation_ok && rotation_ok
    }
}

impl From<[f64; 6]> for Pose {
    fn from(values: [f64; 6]) -> Self {
        Self::from_array(values)
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "X: {:.3}, Y: {:.3}, Z: {:.3}, RX: {:.3}, RY: {:.3}, RZ: {:.3}",
            self.x, self.y, self.z, self.rx, self.ry, self.rz
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_conversion_factors() {
        let pose = Pose::new(0.1, -0.25, 1.0, std::f64::consts::PI, 0.0, -std::f64::consts::FRAC_PI_2);
        let display = pose.to_millimeters_degrees();

        assert!((display.x - 100.0).abs() < 1e-9);
        assert!((display.y + 250.0).abs() < 1e-9);
        assert!((display.z - 1000.0).abs() < 1e-9);
        assert!((display.rx - 180.0).abs() < 1e-9);
        assert_eq!(display.ry, 0.0);
        assert!((display.rz + 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_conversion_is_reversible() {
        let pose = Pose::new(0.4, 0.5, 0.6, 0.1, 0.2, 0.3);
        let back = pose.to_millimeters_degrees().to_meters_radians();
        for (a, b) in pose.to_array().iter().zip(back.to_array().iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_plausibility_bounds() {
        assert!(Pose::new(0.1, 0.2, 0.3, 0.4, 0.5, 0.6).is_plausible());
        assert!(!Pose::new(2.5, 0.0, 0.0, 0.0, 0.0, 0.0).is_plausible());
        assert!(!Pose::new(0.0, 0.0, 0.0, 7.0, 0.0, 0.0).is_plausible());
        assert!(!Pose::new(f64::NAN, 0.0, 0.0, 0.0, 0.0, 0.0).is_plausible());
    }

    #[test]
    fn test_array_roundtrip() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(Pose::from(values).to_array(), values);
    }
}
