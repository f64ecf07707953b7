//! Serializable encoder settings
//!
//! A plain snapshot of everything the host can configure, captured from and
//! applied to [`EncoderParams`], stored as JSON.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::array::{ArrayType, WeightType};
use crate::design::FilterType;
use crate::error::Array2ShResult;
use crate::format::{ChannelOrdering, Normalization};
use crate::params::EncoderParams;
use crate::presets::MicArrayPreset;

/// Sensor direction in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSetting {
    pub azimuth_deg: f32,
    pub elevation_deg: f32,
}

/// Encoder configuration snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    /// Encoding order
    pub order: usize,
    /// Active sensors, length = Q
    pub sensors: Vec<SensorSetting>,
    /// Sensor radius (m)
    pub r: f32,
    /// Baffle radius (m)
    pub baffle_r: f32,
    pub array_type: ArrayType,
    pub weight_type: WeightType,
    pub filter_type: FilterType,
    /// Regularization / max gain (dB)
    pub reg_par: f32,
    /// Speed of sound (m/s)
    pub speed_of_sound: f32,
    pub diffuse_eq: bool,
    pub ordering: ChannelOrdering,
    pub normalization: Normalization,
    /// Post gain (dB)
    pub gain_db: f32,
    /// Bands at or above this frequency are muted (Hz)
    pub max_freq: f32,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self::capture(&EncoderParams::default())
    }
}

impl EncoderSettings {
    /// Default settings for an array preset
    pub fn from_preset(preset: MicArrayPreset) -> Self {
        let params = EncoderParams::default();
        params.set_preset(preset);
        Self::capture(&params)
    }

    /// Snapshot the staged configuration
    pub fn capture(params: &EncoderParams) -> Self {
        let sensors = (0..params.num_sensors())
            .filter_map(|i| params.sensor_direction(i))
            .map(|dir| SensorSetting {
                azimuth_deg: dir.azimuth_deg(),
                elevation_deg: dir.elevation_deg(),
            })
            .collect();

        Self {
            order: params.encoding_order(),
            sensors,
            r: params.r(),
            baffle_r: params.baffle_r(),
            array_type: params.array_type(),
            weight_type: params.weight_type(),
            filter_type: params.filter_type(),
            reg_par: params.reg_par(),
            speed_of_sound: params.speed_of_sound(),
            diffuse_eq: params.diffuse_eq(),
            ordering: params.channel_ordering(),
            normalization: params.normalization(),
            gain_db: params.gain_db(),
            max_freq: params.max_freq(),
        }
    }

    /// Stage these settings on `params`; values are clamped by the setters
    pub fn apply(&self, params: &EncoderParams) {
        for (i, sensor) in self.sensors.iter().enumerate() {
            params.set_sensor_azimuth_deg(i, sensor.azimuth_deg);
            params.set_sensor_elevation_deg(i, sensor.elevation_deg);
        }
        params.set_num_sensors(self.sensors.len());
        params.set_encoding_order(self.order);

        params.set_r(self.r);
        params.set_baffle_r(self.baffle_r);
        params.set_array_type(self.array_type);
        params.set_weight_type(self.weight_type);
        params.set_filter_type(self.filter_type);
        params.set_reg_par(self.reg_par);
        params.set_speed_of_sound(self.speed_of_sound);
        params.set_diffuse_eq(self.diffuse_eq);

        // After the order, FuMa is only accepted at first order
        params.set_channel_ordering(self.ordering);
        params.set_normalization(self.normalization);
        params.set_gain_db(self.gain_db);
        params.set_max_freq(self.max_freq);
    }

    pub fn to_json(&self) -> Array2ShResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Array2ShResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Array2ShResult<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Array2ShResult<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
