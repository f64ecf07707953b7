//! Microphone array presets

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::array::{ArrayType, WeightType};
use crate::error::{Array2ShError, Array2ShResult};

/// Speed of sound in air (m/s)
pub const SPEED_OF_SOUND_AIR: f32 = 343.0;
/// Speed of sound in water (m/s)
pub const SPEED_OF_SOUND_WATER: f32 = 1484.0;

/// Tetrahedral layout (azimuth, elevation) in degrees: FLU, FRD, BLD, BRU
static TETRAHEDRAL_DIRS_DEG: [(f32, f32); 4] = [
    (45.0, 35.264),
    (-45.0, -35.264),
    (135.0, -35.264),
    (-135.0, 35.264),
];

/// mh Acoustics Eigenmike32 capsule directions (azimuth, elevation) in degrees
static EIGENMIKE32_DIRS_DEG: [(f32, f32); 32] = [
    (0.0, 21.0),
    (32.0, 0.0),
    (0.0, -21.0),
    (328.0, 0.0),
    (0.0, 58.0),
    (45.0, 35.0),
    (69.0, 0.0),
    (45.0, -35.0),
    (0.0, -58.0),
    (315.0, -35.0),
    (291.0, 0.0),
    (315.0, 35.0),
    (91.0, 69.0),
    (90.0, 32.0),
    (90.0, -31.0),
    (89.0, -69.0),
    (180.0, 21.0),
    (212.0, 0.0),
    (180.0, -21.0),
    (148.0, 0.0),
    (180.0, 58.0),
    (225.0, 35.0),
    (249.0, 0.0),
    (225.0, -35.0),
    (180.0, -58.0),
    (135.0, -35.0),
    (111.0, 0.0),
    (135.0, 35.0),
    (269.0, 69.0),
    (270.0, 32.0),
    (270.0, -32.0),
    (271.0, -69.0),
];

/// Built-in microphone array presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MicArrayPreset {
    /// Generic first-order tetrahedral array on a 42 mm rigid sphere
    Default,
    /// Aalto tetrahedral hydrophone array (underwater)
    AaltoHydrophone,
    /// Sennheiser Ambeo VR
    SennheiserAmbeo,
    /// Core Sound TetraMic
    CoreSoundTetramic,
    /// SoundField SPS200
    SoundFieldSps200,
    /// mh Acoustics Eigenmike32
    Eigenmike32,
}

/// Geometry and defaults carried by a preset
#[derive(Debug, Clone, Copy)]
pub struct PresetGeometry {
    /// Sensor directions in degrees
    pub dirs_deg: &'static [(f32, f32)],
    pub r: f32,
    pub baffle_r: f32,
    pub array_type: ArrayType,
    pub weight_type: WeightType,
    /// Highest order the array supports
    pub order: usize,
    pub speed_of_sound: f32,
}

impl MicArrayPreset {
    pub const ALL: [MicArrayPreset; 6] = [
        Self::Default,
        Self::AaltoHydrophone,
        Self::SennheiserAmbeo,
        Self::CoreSoundTetramic,
        Self::SoundFieldSps200,
        Self::Eigenmike32,
    ];

    pub fn geometry(self) -> PresetGeometry {
        let tetra = |r: f32, weight_type: WeightType, speed_of_sound: f32| PresetGeometry {
            dirs_deg: &TETRAHEDRAL_DIRS_DEG,
            r,
            baffle_r: r,
            array_type: ArrayType::Spherical,
            weight_type,
            order: 1,
            speed_of_sound,
        };

        match self {
            Self::Default => tetra(0.042, WeightType::RigidOmni, SPEED_OF_SOUND_AIR),
            Self::AaltoHydrophone => tetra(0.173, WeightType::OpenOmni, SPEED_OF_SOUND_WATER),
            Self::SennheiserAmbeo => tetra(0.014, WeightType::OpenCardioid, SPEED_OF_SOUND_AIR),
            Self::CoreSoundTetramic => tetra(0.02, WeightType::OpenCardioid, SPEED_OF_SOUND_AIR),
            Self::SoundFieldSps200 => tetra(0.02, WeightType::OpenCardioid, SPEED_OF_SOUND_AIR),
            Self::Eigenmike32 => PresetGeometry {
                dirs_deg: &EIGENMIKE32_DIRS_DEG,
                r: 0.042,
                baffle_r: 0.042,
                array_type: ArrayType::Spherical,
                weight_type: WeightType::RigidOmni,
                order: 4,
                speed_of_sound: SPEED_OF_SOUND_AIR,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AaltoHydrophone => "aalto-hydrophone",
            Self::SennheiserAmbeo => "sennheiser-ambeo",
            Self::CoreSoundTetramic => "core-sound-tetramic",
            Self::SoundFieldSps200 => "soundfield-sps200",
            Self::Eigenmike32 => "eigenmike32",
        }
    }
}

impl fmt::Display for MicArrayPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MicArrayPreset {
    type Err = Array2ShError;

    fn from_str(s: &str) -> Array2ShResult<Self> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == lower)
            .ok_or_else(|| Array2ShError::UnknownVariant {
                kind: "array preset",
                value: s.to_string(),
            })
    }
}
