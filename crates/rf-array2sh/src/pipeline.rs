//! Frame-synchronous time-frequency pipeline
//!
//! Splits each FRAME_SIZE block into TIME_SLOTS hops, runs the transform
//! engine per hop and keeps the sub-band frames in fixed-size buffers:
//!
//! - `input_tf[band][sensor][slot]`
//! - `sh_tf[band][channel][slot]`
//!
//! All buffers are allocated once at maximum size.

use ndarray::{Array2, Array3};
use num_complex::Complex32;

use crate::filterbank::{StftFilterbank, TimeFrequencyTransform};
use crate::format::{FrequencyGate, OutputFormat};
use crate::{HOP_SIZE, MAX_NUM_SENSORS, MAX_NUM_SH_SIGNALS, NUM_BANDS, TIME_SLOTS};

pub struct TfPipeline {
    transform: Box<dyn TimeFrequencyTransform>,
    hop_in: Vec<Vec<f32>>,
    hop_out: Vec<Vec<f32>>,
    bins_in: Array2<Complex32>,
    bins_out: Array2<Complex32>,
    input_tf: Array3<Complex32>,
    sh_tf: Array3<Complex32>,
    num_sensors: usize,
    num_sh: usize,
}

impl TfPipeline {
    /// Pipeline with the default STFT engine
    pub fn new() -> Self {
        Self::with_transform(Box::new(StftFilterbank::new(
            MAX_NUM_SENSORS,
            MAX_NUM_SH_SIGNALS,
        )))
    }

    pub fn with_transform(transform: Box<dyn TimeFrequencyTransform>) -> Self {
        Self {
            transform,
            hop_in: vec![vec![0.0; HOP_SIZE]; MAX_NUM_SENSORS],
            hop_out: vec![vec![0.0; HOP_SIZE]; MAX_NUM_SH_SIGNALS],
            bins_in: Array2::zeros((MAX_NUM_SENSORS, NUM_BANDS)),
            bins_out: Array2::zeros((MAX_NUM_SH_SIGNALS, NUM_BANDS)),
            input_tf: Array3::zeros((NUM_BANDS, MAX_NUM_SENSORS, TIME_SLOTS)),
            sh_tf: Array3::zeros((NUM_BANDS, MAX_NUM_SH_SIGNALS, TIME_SLOTS)),
            num_sensors: 0,
            num_sh: 0,
        }
    }

    /// Reshape for new sensor / SH channel counts
    pub fn configure(&mut self, num_sensors: usize, num_sh: usize) {
        self.num_sensors = num_sensors.min(MAX_NUM_SENSORS);
        self.num_sh = num_sh.min(MAX_NUM_SH_SIGNALS);
        self.transform.configure(self.num_sensors, self.num_sh);
        self.input_tf.fill(Complex32::new(0.0, 0.0));
        self.sh_tf.fill(Complex32::new(0.0, 0.0));
        log::debug!(
            "TF pipeline configured: {} sensors -> {} SH channels",
            self.num_sensors,
            self.num_sh
        );
    }

    pub fn num_sensors(&self) -> usize {
        self.num_sensors
    }

    pub fn num_sh(&self) -> usize {
        self.num_sh
    }

    /// Processing delay in samples
    pub fn latency(&self) -> usize {
        self.transform.latency_hops() * HOP_SIZE
    }

    /// Forward-transform one frame into `input_tf`.
    ///
    /// Sensors without a supplied input channel are zero-filled.
    pub fn analyze(&mut self, inputs: &[&[f32]]) {
        for slot in 0..TIME_SLOTS {
            let start = slot * HOP_SIZE;
            for (ch, hop) in self.hop_in.iter_mut().enumerate().take(self.num_sensors) {
                match inputs.get(ch).and_then(|x| x.get(start..start + HOP_SIZE)) {
                    Some(src) => hop.copy_from_slice(src),
                    None => hop.fill(0.0),
                }
            }

            self.transform
                .forward(&self.hop_in[..self.num_sensors], &mut self.bins_in);

            for band in 0..NUM_BANDS {
                for ch in 0..self.num_sensors {
                    self.input_tf[[band, ch, slot]] = self.bins_in[[ch, band]];
                }
            }
        }
    }

    /// Sub-band input and SH frames for the encoding stage
    pub fn frames_mut(&mut self) -> (&Array3<Complex32>, &mut Array3<Complex32>) {
        (&self.input_tf, &mut self.sh_tf)
    }

    /// Zero the SH frame (not playing)
    pub fn clear_sh(&mut self) {
        self.sh_tf.fill(Complex32::new(0.0, 0.0));
    }

    /// Gate, inverse-transform and format `sh_tf` into the host outputs
    pub fn synthesize(
        &mut self,
        gate: &FrequencyGate,
        format: &OutputFormat,
        outputs: &mut [&mut [f32]],
    ) {
        for slot in 0..TIME_SLOTS {
            for band in 0..NUM_BANDS {
                let gain = gate.gain(band);
                for ch in 0..self.num_sh {
                    self.bins_out[[ch, band]] = self.sh_tf[[band, ch, slot]] * gain;
                }
            }

            self.transform
                .inverse(&self.bins_out, &mut self.hop_out[..self.num_sh]);
            format.write_hop(&self.hop_out[..self.num_sh], outputs, slot * HOP_SIZE);
        }
    }

    /// Reset transform history and sub-band frames
    pub fn reset(&mut self) {
        self.configure(self.num_sensors, self.num_sh);
    }
}

impl Default for TfPipeline {
    fn default() -> Self {
        Self::new()
    }
}
