//! Encoding filter design
//!
//! The encoder treats filter design as a pluggable collaborator: any
//! [`EncodingFilterDesigner`] can supply the per-band complex encoding
//! matrix. [`ModalDesigner`] is the built-in theoretical designer for
//! spherical and cylindrical arrays.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rf_array2sh::{Array2Sh, design::ModalDesigner};
//!
//! let encoder = Array2Sh::with_designer(48000, Box::new(ModalDesigner::default()));
//! ```

pub mod bessel;
mod modal;

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, Array3};
use num_complex::Complex32;
use serde::{Deserialize, Serialize};

use crate::array::ArraySpecs;
use crate::error::{Array2ShError, Array2ShResult};

pub use modal::{ModalDesigner, array_kernel, modal_coefficients};
pub(crate) use modal::{SIMULATION_ORDER, cos_angle};

/// Minimum regularization / max gain (dB)
pub const REG_PAR_MIN: f32 = 0.0;
/// Maximum regularization / max gain (dB)
pub const REG_PAR_MAX: f32 = 80.0;

/// Regularization strategy for the radial (modal) inversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterType {
    /// Bernschütz soft limiting
    SoftLimiting,
    /// Tikhonov regularization with bounded gain
    Tikhonov,
    /// Tikhonov + per-band diffuse-field energy normalization
    ZStyle,
    /// As `ZStyle`, with max-rE order weighting
    ZStyleMaxRE,
}

impl FilterType {
    pub const ALL: [FilterType; 4] = [
        Self::SoftLimiting,
        Self::Tikhonov,
        Self::ZStyle,
        Self::ZStyleMaxRE,
    ];

    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::SoftLimiting,
            2 => Self::ZStyle,
            3 => Self::ZStyleMaxRE,
            _ => Self::Tikhonov,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SoftLimiting => "soft-limiting",
            Self::Tikhonov => "tikhonov",
            Self::ZStyle => "z-style",
            Self::ZStyleMaxRE => "z-style-max-re",
        }
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterType {
    type Err = Array2ShError;

    fn from_str(s: &str) -> Array2ShResult<Self> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == lower)
            .ok_or_else(|| Array2ShError::UnknownVariant {
                kind: "filter type",
                value: s.to_string(),
            })
    }
}

/// Everything a designer needs to produce an encoding matrix
#[derive(Debug, Clone)]
pub struct DesignRequest<'a> {
    /// Encoding order
    pub order: usize,
    /// Array geometry, `array.sensors.len()` == Q
    pub array: ArraySpecs,
    pub filter_type: FilterType,
    /// Regularization / max gain (dB)
    pub reg_par: f32,
    /// Speed of sound (m/s)
    pub speed_of_sound: f32,
    /// Equalize past the spatial aliasing frequency for a diffuse field
    pub diffuse_eq: bool,
    /// Band centre frequencies (Hz)
    pub freq_vector: &'a [f32],
}

impl DesignRequest<'_> {
    /// Number of SH channels
    pub fn num_sh(&self) -> usize {
        crate::sh::num_sh_channels(self.order)
    }
}

/// Result of a filter design
#[derive(Debug, Clone)]
pub struct DesignOutput {
    /// Encoding matrix `[bands, nSH, Q]`
    pub matrix: Array3<Complex32>,
    /// Modal magnitude response (dB) `[bands, order + 1]`
    pub modal_db: Array2<f32>,
    /// Regularized inverse magnitude response (dB) `[bands, order + 1]`
    pub inverse_db: Array2<f32>,
}

/// Filter-design engine
pub trait EncodingFilterDesigner: Send {
    /// Design the encoding matrix for the given configuration
    fn design(&self, request: &DesignRequest<'_>) -> Array2ShResult<DesignOutput>;

    /// Short name for logging
    fn name(&self) -> &str {
        "custom"
    }
}

/// Decibels from a linear magnitude, floored to avoid `-inf`
#[inline]
pub(crate) fn magnitude_db(value: f64) -> f32 {
    (20.0 * value.max(1e-10).log10()) as f32
}
