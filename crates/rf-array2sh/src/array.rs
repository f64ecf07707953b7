//! Sensor array geometry
//!
//! Sensor directions are stored in radians only; degrees are converted at the
//! setter/getter boundary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Array2ShError, Array2ShResult};

/// Minimum sensor/baffle radius (m)
pub const RADIUS_MIN: f32 = 0.001;
/// Maximum sensor/baffle radius (m)
pub const RADIUS_MAX: f32 = 0.4;

/// Geometric model of the array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArrayType {
    /// Sensors on (or around) a sphere
    Spherical,
    /// Sensors on (or around) a cylinder, horizontal plane only
    Cylindrical,
}

/// Sensor directivity and baffle combination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightType {
    /// Omni sensors flush-mounted on a rigid baffle
    RigidOmni,
    /// Cardioid sensors on a rigid baffle
    RigidCardioid,
    /// Dipole sensors on a rigid baffle
    RigidDipole,
    /// Omni sensors, open (acoustically transparent) array
    OpenOmni,
    /// Cardioid sensors, open array
    OpenCardioid,
    /// Dipole sensors, open array
    OpenDipole,
}

impl ArrayType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Cylindrical,
            _ => Self::Spherical,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Spherical => "spherical",
            Self::Cylindrical => "cylindrical",
        }
    }
}

impl WeightType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::RigidCardioid,
            2 => Self::RigidDipole,
            3 => Self::OpenOmni,
            4 => Self::OpenCardioid,
            5 => Self::OpenDipole,
            _ => Self::RigidOmni,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RigidOmni => "rigid-omni",
            Self::RigidCardioid => "rigid-cardioid",
            Self::RigidDipole => "rigid-dipole",
            Self::OpenOmni => "open-omni",
            Self::OpenCardioid => "open-cardioid",
            Self::OpenDipole => "open-dipole",
        }
    }
}

impl fmt::Display for ArrayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for WeightType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArrayType {
    type Err = Array2ShError;

    fn from_str(s: &str) -> Array2ShResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "spherical" | "sphere" => Ok(Self::Spherical),
            "cylindrical" | "cylinder" => Ok(Self::Cylindrical),
            _ => Err(Array2ShError::UnknownVariant {
                kind: "array type",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for WeightType {
    type Err = Array2ShError;

    fn from_str(s: &str) -> Array2ShResult<Self> {
        let all = [
            Self::RigidOmni,
            Self::RigidCardioid,
            Self::RigidDipole,
            Self::OpenOmni,
            Self::OpenCardioid,
            Self::OpenDipole,
        ];
        let lower = s.to_ascii_lowercase();
        all.into_iter()
            .find(|w| w.as_str() == lower)
            .ok_or_else(|| Array2ShError::UnknownVariant {
                kind: "weight type",
                value: s.to_string(),
            })
    }
}

/// Direction of a single sensor
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorDirection {
    /// Azimuth in radians (positive = left)
    pub azimuth: f32,
    /// Elevation in radians (positive = up)
    pub elevation: f32,
}

impl SensorDirection {
    pub fn from_radians(azimuth: f32, elevation: f32) -> Self {
        Self { azimuth, elevation }
    }

    pub fn from_degrees(azimuth: f32, elevation: f32) -> Self {
        Self {
            azimuth: azimuth.to_radians(),
            elevation: elevation.to_radians(),
        }
    }

    pub fn azimuth_deg(&self) -> f32 {
        self.azimuth.to_degrees()
    }

    pub fn elevation_deg(&self) -> f32 {
        self.elevation.to_degrees()
    }

    /// Unit vector (x front, y left, z up)
    pub fn unit_vector(&self) -> [f64; 3] {
        let (az, el) = (self.azimuth as f64, self.elevation as f64);
        [el.cos() * az.cos(), el.cos() * az.sin(), el.sin()]
    }
}

/// Snapshot of the array description handed to the filter designer
#[derive(Debug, Clone, PartialEq)]
pub struct ArraySpecs {
    pub array_type: ArrayType,
    pub weight_type: WeightType,
    /// Sensor radius (m)
    pub r: f32,
    /// Baffle radius (m)
    pub baffle_r: f32,
    /// Active sensor directions, length = Q
    pub sensors: Vec<SensorDirection>,
}

impl ArraySpecs {
    /// Number of sensors
    pub fn num_sensors(&self) -> usize {
        self.sensors.len()
    }
}

/// Clamp a radius to the supported range
#[inline]
pub fn clamp_radius(value: f32) -> f32 {
    value.clamp(RADIUS_MIN, RADIUS_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_degree_conversion() {
        let dir = SensorDirection::from_degrees(90.0, -45.0);
        assert_abs_diff_eq!(dir.azimuth, std::f32::consts::FRAC_PI_2, epsilon = 1e-6);
        assert_abs_diff_eq!(dir.elevation_deg(), -45.0, epsilon = 1e-4);

        let v = SensorDirection::from_degrees(90.0, 0.0).unit_vector();
        assert_abs_diff_eq!(v[1], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_enum_round_trip() {
        for v in 0..6u8 {
            assert_eq!(WeightType::from_u8(v).as_u8(), v);
            let w = WeightType::from_u8(v);
            assert_eq!(w.as_str().parse::<WeightType>().unwrap(), w);
        }
        assert_eq!("cylinder".parse::<ArrayType>().unwrap(), ArrayType::Cylindrical);
        assert!("cube".parse::<ArrayType>().is_err());
    }

    #[test]
    fn test_radius_clamp() {
        assert_eq!(clamp_radius(0.0), RADIUS_MIN);
        assert_eq!(clamp_radius(10.0), RADIUS_MAX);
        assert_eq!(clamp_radius(0.042), 0.042);
    }
}
