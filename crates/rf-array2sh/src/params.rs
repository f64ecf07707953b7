//! Shared encoder configuration
//!
//! [`EncoderParams`] is shared between the control side (host UI, settings,
//! automation) and the audio side through an `Arc`. Every value is an atomic
//! and every setter takes `&self`. Setters that change the buffer layout or
//! the encoding matrix only stage values and raise a [`ReinitFlag`]; the
//! audio side applies them in `Array2Sh::check_reinit`.
//!
//! Staged vs. active:
//! - `new_order` / `new_num_sensors` are written by setters at any time
//! - `order` / `num_sensors` only change in [`EncoderParams::commit_shape`]

use portable_atomic::{AtomicBool, AtomicF32, AtomicU8, AtomicU32, AtomicUsize, Ordering};

use crate::array::{ArraySpecs, ArrayType, SensorDirection, WeightType, clamp_radius};
use crate::design::{FilterType, REG_PAR_MAX, REG_PAR_MIN};
use crate::format::{ChannelOrdering, Normalization};
use crate::presets::MicArrayPreset;
use crate::sh::num_sh_channels;
use crate::state::{ReinitFlag, ReinitState};
use crate::{MAX_NUM_SENSORS, MAX_SH_ORDER};

/// Speed of sound range (m/s)
pub const SPEED_OF_SOUND_MIN: f32 = 200.0;
pub const SPEED_OF_SOUND_MAX: f32 = 2000.0;
/// Post gain range (dB)
pub const POST_GAIN_MIN: f32 = -60.0;
pub const POST_GAIN_MAX: f32 = 12.0;
/// Max frequency range (Hz)
pub const MAX_FREQ_MIN: f32 = 0.0;
pub const MAX_FREQ_MAX: f32 = 48000.0;

pub const DEFAULT_REG_PAR: f32 = 15.0;
pub const DEFAULT_MAX_FREQ: f32 = 20000.0;

/// Lock-free encoder parameters
#[derive(Debug)]
pub struct EncoderParams {
    // Shape (active / staged)
    order: AtomicUsize,
    new_order: AtomicUsize,
    num_sensors: AtomicUsize,
    new_num_sensors: AtomicUsize,

    // Array geometry, radians
    azimuth: [AtomicF32; MAX_NUM_SENSORS],
    elevation: [AtomicF32; MAX_NUM_SENSORS],
    r: AtomicF32,
    baffle_r: AtomicF32,
    array_type: AtomicU8,
    weight_type: AtomicU8,

    // Filter design
    filter_type: AtomicU8,
    reg_par: AtomicF32,
    speed_of_sound: AtomicF32,
    diffuse_eq: AtomicBool,

    // Output (applied per block, no reinit)
    ordering: AtomicU8,
    normalization: AtomicU8,
    gain_db: AtomicF32,
    max_freq: AtomicF32,

    sample_rate: AtomicU32,
    eval_ready: AtomicBool,
    eval_valid: AtomicBool,

    pub(crate) reinit_transform: ReinitFlag,
    pub(crate) reinit_matrix: ReinitFlag,
    pub(crate) recalc_diagnostics: ReinitFlag,
}

impl EncoderParams {
    /// Defaults: default preset, Tikhonov at 15 dB, ACN/SN3D, 0 dB gain,
    /// 20 kHz cutoff, diffuse EQ on, all reinit flags pending.
    pub fn new(sample_rate: u32) -> Self {
        let params = Self {
            order: AtomicUsize::new(1),
            new_order: AtomicUsize::new(1),
            num_sensors: AtomicUsize::new(4),
            new_num_sensors: AtomicUsize::new(4),
            azimuth: std::array::from_fn(|_| AtomicF32::new(0.0)),
            elevation: std::array::from_fn(|_| AtomicF32::new(0.0)),
            r: AtomicF32::new(0.042),
            baffle_r: AtomicF32::new(0.042),
            array_type: AtomicU8::new(ArrayType::Spherical.as_u8()),
            weight_type: AtomicU8::new(WeightType::RigidOmni.as_u8()),
            filter_type: AtomicU8::new(FilterType::Tikhonov.as_u8()),
            reg_par: AtomicF32::new(DEFAULT_REG_PAR),
            speed_of_sound: AtomicF32::new(crate::presets::SPEED_OF_SOUND_AIR),
            diffuse_eq: AtomicBool::new(true),
            ordering: AtomicU8::new(ChannelOrdering::Acn.as_u8()),
            normalization: AtomicU8::new(Normalization::SN3D.as_u8()),
            gain_db: AtomicF32::new(0.0),
            max_freq: AtomicF32::new(DEFAULT_MAX_FREQ),
            sample_rate: AtomicU32::new(sample_rate),
            eval_ready: AtomicBool::new(false),
            eval_valid: AtomicBool::new(false),
            reinit_transform: ReinitFlag::new(ReinitState::Pending),
            reinit_matrix: ReinitFlag::new(ReinitState::Pending),
            recalc_diagnostics: ReinitFlag::new(ReinitState::Pending),
        };
        params.stage_preset(MicArrayPreset::Default);
        params.commit_shape();
        params
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ENCODING ORDER / SENSOR COUNT
    // ═══════════════════════════════════════════════════════════════════════

    /// Stage a new encoding order, clamped to `1..=MAX_SH_ORDER`.
    ///
    /// FuMa ordering/normalization fall back to ACN/SN3D for any order
    /// other than 1.
    pub fn set_encoding_order(&self, order: usize) {
        let order = order.clamp(1, MAX_SH_ORDER);
        self.new_order.store(order, Ordering::Release);
        self.downgrade_fuma(order);
        self.reinit_transform.request();
        self.reinit_matrix.request();
    }

    /// Staged encoding order
    pub fn encoding_order(&self) -> usize {
        self.new_order.load(Ordering::Acquire)
    }

    /// SH channels required by the staged order
    pub fn num_sh_required(&self) -> usize {
        num_sh_channels(self.encoding_order())
    }

    /// Stage a new sensor count, clamped to `1..=MAX_NUM_SENSORS`.
    ///
    /// Falls back to first order if the count cannot support the staged
    /// order. Counts below the SH channel count are otherwise accepted.
    pub fn set_num_sensors(&self, count: usize) {
        let count = count.clamp(1, MAX_NUM_SENSORS);
        let mut order_changed = false;
        if count < self.num_sh_required() {
            order_changed = self.new_order.swap(1, Ordering::AcqRel) != 1;
        }
        self.new_num_sensors.store(count, Ordering::Release);

        if count != self.num_sensors.load(Ordering::Acquire) || order_changed {
            self.reinit_transform.request();
            self.reinit_matrix.request();
        }
    }

    /// Staged sensor count
    pub fn num_sensors(&self) -> usize {
        self.new_num_sensors.load(Ordering::Acquire)
    }

    pub fn max_num_sensors(&self) -> usize {
        MAX_NUM_SENSORS
    }

    /// Sensors needed for the staged order
    pub fn min_num_sensors(&self) -> usize {
        self.num_sh_required()
    }

    /// Order currently used by the audio path
    pub fn active_order(&self) -> usize {
        self.order.load(Ordering::Acquire)
    }

    /// Sensor count currently used by the audio path
    pub fn active_num_sensors(&self) -> usize {
        self.num_sensors.load(Ordering::Acquire)
    }

    /// Promote the staged order and sensor count to active.
    /// Only called by the reconciler.
    pub(crate) fn commit_shape(&self) -> (usize, usize) {
        let order = self.new_order.load(Ordering::Acquire);
        let q = self.new_num_sensors.load(Ordering::Acquire);
        self.order.store(order, Ordering::Release);
        self.num_sensors.store(q, Ordering::Release);
        (order, q)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ARRAY GEOMETRY
    // ═══════════════════════════════════════════════════════════════════════

    pub fn set_sensor_azimuth_rad(&self, index: usize, azimuth: f32) {
        if let Some(slot) = self.azimuth.get(index) {
            slot.store(azimuth, Ordering::Release);
            self.reinit_matrix.request();
        }
    }

    pub fn set_sensor_elevation_rad(&self, index: usize, elevation: f32) {
        if let Some(slot) = self.elevation.get(index) {
            slot.store(elevation, Ordering::Release);
            self.reinit_matrix.request();
        }
    }

    pub fn set_sensor_azimuth_deg(&self, index: usize, azimuth: f32) {
        self.set_sensor_azimuth_rad(index, azimuth.to_radians());
    }

    pub fn set_sensor_elevation_deg(&self, index: usize, elevation: f32) {
        self.set_sensor_elevation_rad(index, elevation.to_radians());
    }

    /// Direction of sensor `index`, `None` past `MAX_NUM_SENSORS`
    pub fn sensor_direction(&self, index: usize) -> Option<SensorDirection> {
        let azimuth = self.azimuth.get(index)?.load(Ordering::Acquire);
        let elevation = self.elevation.get(index)?.load(Ordering::Acquire);
        Some(SensorDirection::from_radians(azimuth, elevation))
    }

    /// Sensor radius (m), clamped to `[RADIUS_MIN, RADIUS_MAX]`
    pub fn set_r(&self, r: f32) {
        self.r.store(clamp_radius(r), Ordering::Release);
        self.reinit_matrix.request();
    }

    pub fn r(&self) -> f32 {
        self.r.load(Ordering::Acquire)
    }

    /// Baffle radius (m), clamped to `[RADIUS_MIN, RADIUS_MAX]`
    pub fn set_baffle_r(&self, baffle_r: f32) {
        self.baffle_r.store(clamp_radius(baffle_r), Ordering::Release);
        self.reinit_matrix.request();
    }

    pub fn baffle_r(&self) -> f32 {
        self.baffle_r.load(Ordering::Acquire)
    }

    pub fn set_array_type(&self, array_type: ArrayType) {
        self.array_type.store(array_type.as_u8(), Ordering::Release);
        self.reinit_matrix.request();
    }

    pub fn array_type(&self) -> ArrayType {
        ArrayType::from_u8(self.array_type.load(Ordering::Acquire))
    }

    pub fn set_weight_type(&self, weight_type: WeightType) {
        self.weight_type.store(weight_type.as_u8(), Ordering::Release);
        self.reinit_matrix.request();
    }

    pub fn weight_type(&self) -> WeightType {
        WeightType::from_u8(self.weight_type.load(Ordering::Acquire))
    }

    /// Load a microphone array preset and schedule a full reinit
    pub fn set_preset(&self, preset: MicArrayPreset) {
        self.stage_preset(preset);
        self.reinit_transform.request();
        self.reinit_matrix.request();
        log::info!(
            "Array preset '{}': {} sensors, order {}",
            preset,
            self.num_sensors(),
            self.encoding_order()
        );
    }

    fn stage_preset(&self, preset: MicArrayPreset) {
        let geo = preset.geometry();
        for (i, &(az, el)) in geo.dirs_deg.iter().enumerate().take(MAX_NUM_SENSORS) {
            self.azimuth[i].store(az.to_radians(), Ordering::Release);
            self.elevation[i].store(el.to_radians(), Ordering::Release);
        }
        self.new_num_sensors
            .store(geo.dirs_deg.len().clamp(1, MAX_NUM_SENSORS), Ordering::Release);
        self.r.store(clamp_radius(geo.r), Ordering::Release);
        self.baffle_r.store(clamp_radius(geo.baffle_r), Ordering::Release);
        self.array_type.store(geo.array_type.as_u8(), Ordering::Release);
        self.weight_type.store(geo.weight_type.as_u8(), Ordering::Release);
        let order = geo.order.clamp(1, MAX_SH_ORDER);
        self.new_order.store(order, Ordering::Release);
        self.downgrade_fuma(order);
        self.speed_of_sound.store(geo.speed_of_sound, Ordering::Release);
    }

    /// Snapshot of the active array for the filter designer
    pub fn array_specs(&self) -> ArraySpecs {
        let q = self.active_num_sensors();
        ArraySpecs {
            array_type: self.array_type(),
            weight_type: self.weight_type(),
            r: self.r(),
            baffle_r: self.baffle_r(),
            sensors: (0..q).filter_map(|i| self.sensor_direction(i)).collect(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // FILTER DESIGN
    // ═══════════════════════════════════════════════════════════════════════

    pub fn set_filter_type(&self, filter_type: FilterType) {
        self.filter_type.store(filter_type.as_u8(), Ordering::Release);
        self.reinit_matrix.request();
    }

    pub fn filter_type(&self) -> FilterType {
        FilterType::from_u8(self.filter_type.load(Ordering::Acquire))
    }

    /// Regularization / max gain (dB), clamped to `[0, 80]`
    pub fn set_reg_par(&self, reg_par: f32) {
        self.reg_par
            .store(reg_par.clamp(REG_PAR_MIN, REG_PAR_MAX), Ordering::Release);
        self.reinit_matrix.request();
    }

    pub fn reg_par(&self) -> f32 {
        self.reg_par.load(Ordering::Acquire)
    }

    /// Speed of sound (m/s), clamped to `[200, 2000]`
    pub fn set_speed_of_sound(&self, c: f32) {
        self.speed_of_sound
            .store(c.clamp(SPEED_OF_SOUND_MIN, SPEED_OF_SOUND_MAX), Ordering::Release);
        self.reinit_matrix.request();
    }

    pub fn speed_of_sound(&self) -> f32 {
        self.speed_of_sound.load(Ordering::Acquire)
    }

    pub fn set_diffuse_eq(&self, enabled: bool) {
        if self.diffuse_eq.swap(enabled, Ordering::AcqRel) != enabled {
            self.reinit_matrix.request();
        }
    }

    pub fn diffuse_eq(&self) -> bool {
        self.diffuse_eq.load(Ordering::Acquire)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // OUTPUT
    // ═══════════════════════════════════════════════════════════════════════

    /// FuMa is only accepted while the staged order is 1
    pub fn set_channel_ordering(&self, ordering: ChannelOrdering) {
        if ordering != ChannelOrdering::FuMa || self.encoding_order() == 1 {
            self.ordering.store(ordering.as_u8(), Ordering::Release);
        }
    }

    pub fn channel_ordering(&self) -> ChannelOrdering {
        ChannelOrdering::from_u8(self.ordering.load(Ordering::Acquire))
    }

    /// FuMa is only accepted while the staged order is 1
    pub fn set_normalization(&self, normalization: Normalization) {
        if normalization != Normalization::FuMa || self.encoding_order() == 1 {
            self.normalization
                .store(normalization.as_u8(), Ordering::Release);
        }
    }

    pub fn normalization(&self) -> Normalization {
        Normalization::from_u8(self.normalization.load(Ordering::Acquire))
    }

    fn downgrade_fuma(&self, order: usize) {
        if order == 1 {
            return;
        }
        let _ = self.ordering.compare_exchange(
            ChannelOrdering::FuMa.as_u8(),
            ChannelOrdering::Acn.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        let _ = self.normalization.compare_exchange(
            Normalization::FuMa.as_u8(),
            Normalization::SN3D.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Post gain (dB), clamped to `[-60, 12]`
    pub fn set_gain_db(&self, gain_db: f32) {
        self.gain_db
            .store(gain_db.clamp(POST_GAIN_MIN, POST_GAIN_MAX), Ordering::Release);
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db.load(Ordering::Acquire)
    }

    /// Bands at or above this frequency are muted, clamped to `[0, 48000]`
    pub fn set_max_freq(&self, max_freq: f32) {
        self.max_freq
            .store(max_freq.clamp(MAX_FREQ_MIN, MAX_FREQ_MAX), Ordering::Release);
    }

    pub fn max_freq(&self) -> f32 {
        self.max_freq.load(Ordering::Acquire)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Acquire)
    }

    /// Returns true if the rate changed (and the matrix was scheduled)
    pub(crate) fn set_sample_rate(&self, sample_rate: u32) -> bool {
        let changed = self.sample_rate.swap(sample_rate, Ordering::AcqRel) != sample_rate;
        if changed {
            self.reinit_matrix.request();
        }
        changed
    }

    /// Re-run transform setup and matrix design with the current settings
    pub fn refresh_settings(&self) {
        self.reinit_transform.request();
        self.reinit_matrix.request();
    }

    /// Schedule a diagnostics evaluation of the current matrix
    pub fn request_evaluation(&self) {
        self.recalc_diagnostics.request();
    }

    /// True once after each completed evaluation
    pub fn take_evaluation_ready(&self) -> bool {
        self.eval_ready.swap(false, Ordering::AcqRel)
    }

    /// Whether the correlation/level curves describe the matrix in use
    pub fn is_evaluation_valid(&self) -> bool {
        self.eval_valid.load(Ordering::Acquire)
    }

    pub(crate) fn mark_matrix_regenerated(&self) {
        self.eval_valid.store(false, Ordering::Release);
    }

    pub(crate) fn mark_evaluated(&self) {
        self.eval_valid.store(true, Ordering::Release);
        self.eval_ready.store(true, Ordering::Release);
    }

    /// Flag states (transform, matrix, diagnostics)
    pub fn reinit_states(&self) -> (ReinitState, ReinitState, ReinitState) {
        (
            self.reinit_transform.state(),
            self.reinit_matrix.state(),
            self.recalc_diagnostics.state(),
        )
    }

    /// True if no reconfiguration is pending or in progress
    pub fn all_clean(&self) -> bool {
        self.reinit_transform.is_clean()
            && self.reinit_matrix.is_clean()
            && self.recalc_diagnostics.is_clean()
    }
}

impl Default for EncoderParams {
    fn default() -> Self {
        Self::new(48000)
    }
}
