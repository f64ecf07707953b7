//! FluxForge Array Encoder
//!
//! Real-time conversion of microphone / hydrophone array signals into
//! spherical harmonic (Ambisonic) signals:
//!
//! ## Encoding
//! - Spherical and cylindrical arrays, up to 64 sensors
//! - Up to 7th order (64 SH channels)
//! - Per-band complex encoding matrix, pluggable filter designer
//! - ACN/FuMa ordering, N3D/SN3D/FuMa normalization
//!
//! ## Real-time safety
//! - Fixed 512-sample frames, STFT sub-band processing
//! - Lock-free configuration through atomics and tri-state reinit flags
//! - Silence instead of glitches while reconfiguring
//!
//! ## Diagnostics
//! - Modal and regularized inverse magnitude responses
//! - Spatial correlation and level difference per order
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rf_array2sh::{Array2Sh, MicArrayPreset, FRAME_SIZE};
//!
//! let mut encoder = Array2Sh::new(48000);
//! let params = encoder.params();
//! params.set_preset(MicArrayPreset::Eigenmike32);
//!
//! // audio thread
//! encoder.process(&inputs, &mut outputs, FRAME_SIZE, true);
//! ```

pub mod array;
pub mod design;
pub mod encoder;
pub mod evaluate;
pub mod filterbank;
pub mod format;
pub mod params;
pub mod pipeline;
pub mod presets;
pub mod settings;
pub mod sh;
pub mod state;

mod error;

pub use array::{ArraySpecs, ArrayType, SensorDirection, WeightType};
pub use design::{DesignOutput, DesignRequest, EncodingFilterDesigner, FilterType, ModalDesigner};
pub use encoder::Array2Sh;
pub use error::{Array2ShError, Array2ShResult};
pub use format::{ChannelOrdering, Normalization};
pub use params::EncoderParams;
pub use presets::MicArrayPreset;
pub use settings::EncoderSettings;
pub use state::{Diagnostics, ReinitState};

/// Samples per processing block
pub const FRAME_SIZE: usize = 512;
/// Samples per transform hop
pub const HOP_SIZE: usize = 128;
/// Hops per frame
pub const TIME_SLOTS: usize = FRAME_SIZE / HOP_SIZE;
/// Sub-bands of the time-frequency transform
pub const NUM_BANDS: usize = HOP_SIZE + 1;
/// Transform delay in hops
pub const LATENCY_HOPS: usize = 1;

/// Maximum number of array sensors
pub const MAX_NUM_SENSORS: usize = 64;
/// Maximum encoding order
pub const MAX_SH_ORDER: usize = 7;
/// Maximum number of SH channels
pub const MAX_NUM_SH_SIGNALS: usize = (MAX_SH_ORDER + 1) * (MAX_SH_ORDER + 1);
