//! Sensor array to spherical harmonic encoder
//!
//! Audio-side owner of the encoding matrix, the time-frequency pipeline and
//! all sub-band buffers. Configuration arrives through the shared
//! [`EncoderParams`]; pending changes are applied by [`Array2Sh::check_reinit`]
//! at the start of every block, in a fixed order:
//!
//! 1. transform reshape (commits staged order / sensor count)
//! 2. encoding matrix design
//! 3. diagnostics evaluation
//!
//! The signal path only runs when all three steps are clean. Otherwise a full
//! block of silence is written.

use std::sync::Arc;

use ndarray::{Array3, ArrayView3, s};
use num_complex::Complex32;

use crate::design::{DesignRequest, EncodingFilterDesigner, ModalDesigner};
use crate::evaluate::{EvaluationRequest, evaluate};
use crate::filterbank::band_frequencies;
use crate::format::{FrequencyGate, OutputFormat};
use crate::params::EncoderParams;
use crate::pipeline::TfPipeline;
use crate::sh::num_sh_channels;
use crate::state::{Diagnostics, DiagnosticsBoard};
use crate::{FRAME_SIZE, MAX_NUM_SENSORS, MAX_NUM_SH_SIGNALS, NUM_BANDS, TIME_SLOTS};

/// Real-time array to SH encoder
pub struct Array2Sh {
    params: Arc<EncoderParams>,
    designer: Box<dyn EncodingFilterDesigner>,
    pipeline: TfPipeline,
    /// Encoding matrix `[band, sh, sensor]`, allocated at maximum size
    matrix: Array3<Complex32>,
    freq_vector: Vec<f32>,
    /// Audio-side copy of the diagnostic curves
    diagnostics: Diagnostics,
    board: Arc<DiagnosticsBoard>,
    publish_pending: bool,
    order: usize,
    num_sh: usize,
    num_sensors: usize,
}

impl Array2Sh {
    /// Encoder with the built-in modal designer
    pub fn new(sample_rate: u32) -> Self {
        Self::with_designer(sample_rate, Box::new(ModalDesigner::default()))
    }

    /// Encoder with a custom filter designer
    pub fn with_designer(sample_rate: u32, designer: Box<dyn EncodingFilterDesigner>) -> Self {
        let freq_vector = band_frequencies(sample_rate as f32);
        let params = Arc::new(EncoderParams::new(sample_rate));
        let order = params.active_order();

        Self {
            designer,
            pipeline: TfPipeline::new(),
            matrix: Array3::zeros((NUM_BANDS, MAX_NUM_SH_SIGNALS, MAX_NUM_SENSORS)),
            diagnostics: Diagnostics::new(freq_vector.clone()),
            board: Arc::new(DiagnosticsBoard::new(freq_vector.clone())),
            freq_vector,
            publish_pending: false,
            order,
            num_sh: num_sh_channels(order),
            num_sensors: params.active_num_sensors(),
            params,
        }
    }

    /// Set the sampling rate and apply any pending configuration.
    ///
    /// A changed rate schedules a new encoding matrix.
    pub fn init(&mut self, sample_rate: u32) {
        if self.params.set_sample_rate(sample_rate) {
            self.freq_vector = band_frequencies(sample_rate as f32);
            self.diagnostics.freq_vector.clone_from(&self.freq_vector);
            self.publish_pending = true;
            log::info!("array2sh initialised at {} Hz", sample_rate);
        }
        self.check_reinit();
    }

    /// Shared configuration handle
    pub fn params(&self) -> Arc<EncoderParams> {
        Arc::clone(&self.params)
    }

    /// Shared diagnostics handle for other threads
    pub fn diagnostics_board(&self) -> Arc<DiagnosticsBoard> {
        Arc::clone(&self.board)
    }

    /// Latest published diagnostics
    pub fn diagnostics(&self) -> Diagnostics {
        self.board.snapshot()
    }

    pub fn freq_vector(&self) -> &[f32] {
        &self.freq_vector
    }

    pub fn sample_rate(&self) -> u32 {
        self.params.sample_rate()
    }

    /// Processing delay in samples
    pub fn processing_delay(&self) -> usize {
        self.pipeline.latency()
    }

    /// Active encoding matrix `[band, nSH, Q]`
    pub fn encoding_matrix(&self) -> ArrayView3<'_, Complex32> {
        self.matrix.slice(s![.., ..self.num_sh, ..self.num_sensors])
    }

    /// Name of the filter designer in use
    pub fn designer_name(&self) -> &str {
        self.designer.name()
    }

    /// Apply pending reconfiguration. Returns true if the encoder is ready
    /// to process.
    pub fn check_reinit(&mut self) -> bool {
        if self.params.reinit_transform.begin() {
            self.reinit_transform();
            if !self.params.reinit_transform.finish() {
                log::debug!("Transform change requested during reinit, rescheduled");
            }
        }

        if self.params.reinit_matrix.begin() {
            self.reinit_matrix();
            if !self.params.reinit_matrix.finish() {
                log::debug!("Matrix change requested during design, rescheduled");
            }
        }

        if self.params.recalc_diagnostics.begin() {
            self.recalc_diagnostics();
            if !self.params.recalc_diagnostics.finish() {
                log::debug!("Evaluation requested during evaluation, rescheduled");
            }
        }

        if self.publish_pending {
            if self.board.try_publish(&self.diagnostics) {
                self.publish_pending = false;
            } else {
                log::warn!("Diagnostics board busy, publication deferred");
            }
        }

        self.params.all_clean()
    }

    fn reinit_transform(&mut self) {
        let (order, num_sensors) = self.params.commit_shape();
        self.order = order;
        self.num_sh = num_sh_channels(order);
        self.num_sensors = num_sensors;
        self.pipeline.configure(num_sensors, self.num_sh);
        log::debug!(
            "Transform reinitialised: order {}, {} sensors, {} SH channels",
            order,
            num_sensors,
            self.num_sh
        );
    }

    fn reinit_matrix(&mut self) {
        let request = DesignRequest {
            order: self.order,
            array: self.params.array_specs(),
            filter_type: self.params.filter_type(),
            reg_par: self.params.reg_par(),
            speed_of_sound: self.params.speed_of_sound(),
            diffuse_eq: self.params.diffuse_eq(),
            freq_vector: &self.freq_vector,
        };

        let output = match self.designer.design(&request) {
            Ok(output) => output,
            Err(e) => {
                log::warn!("Encoding matrix design failed ({}), keeping previous matrix", e);
                return;
            }
        };

        let (nsh, q) = (self.num_sh, self.num_sensors);
        let expected = (NUM_BANDS, nsh, q);
        if output.matrix.dim() != expected {
            log::warn!(
                "Designer '{}' returned matrix {:?}, expected {:?}; keeping previous matrix",
                self.designer.name(),
                output.matrix.dim(),
                expected
            );
            return;
        }

        self.matrix.fill(Complex32::new(0.0, 0.0));
        self.matrix
            .slice_mut(s![.., ..nsh, ..q])
            .assign(&output.matrix);

        let orders = self.order + 1;
        self.diagnostics.num_orders = orders;
        self.diagnostics.modal_db.fill(0.0);
        self.diagnostics.inverse_db.fill(0.0);
        if output.modal_db.dim() == (NUM_BANDS, orders) {
            self.diagnostics
                .modal_db
                .slice_mut(s![.., ..orders])
                .assign(&output.modal_db);
        }
        if output.inverse_db.dim() == (NUM_BANDS, orders) {
            self.diagnostics
                .inverse_db
                .slice_mut(s![.., ..orders])
                .assign(&output.inverse_db);
        }

        self.params.mark_matrix_regenerated();
        self.publish_pending = true;
        log::debug!(
            "Encoding matrix designed by '{}': {} bands x {} x {}",
            self.designer.name(),
            NUM_BANDS,
            nsh,
            q
        );
    }

    fn recalc_diagnostics(&mut self) {
        let array = self.params.array_specs();
        let evaluation = evaluate(&EvaluationRequest {
            order: self.order,
            array: &array,
            speed_of_sound: self.params.speed_of_sound(),
            freq_vector: &self.freq_vector,
            matrix: self.matrix.slice(s![.., ..self.num_sh, ..self.num_sensors]),
        });

        let orders = self.order + 1;
        self.diagnostics.num_orders = orders;
        self.diagnostics.spatial_correlation.fill(0.0);
        self.diagnostics.level_difference.fill(0.0);
        self.diagnostics
            .spatial_correlation
            .slice_mut(s![.., ..orders])
            .assign(&evaluation.spatial_correlation);
        self.diagnostics
            .level_difference
            .slice_mut(s![.., ..orders])
            .assign(&evaluation.level_difference);

        self.params.mark_evaluated();
        self.publish_pending = true;
        log::debug!("Encoding matrix evaluated for order {}", self.order);
    }

    /// Process one block.
    ///
    /// `inputs` holds one slice per sensor signal, `outputs` one per SH
    /// output channel. Writes silence unless `block_size == FRAME_SIZE` and
    /// no reconfiguration is pending.
    pub fn process(
        &mut self,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        block_size: usize,
        is_playing: bool,
    ) {
        let ready = self.check_reinit();

        if block_size != FRAME_SIZE || !ready {
            for out in outputs.iter_mut() {
                let n = block_size.min(out.len());
                out[..n].fill(0.0);
            }
            return;
        }

        let format = OutputFormat::resolve(
            self.params.channel_ordering(),
            self.params.normalization(),
            self.order,
            self.num_sh,
            outputs.len(),
        );
        let gate = FrequencyGate::resolve(
            &self.freq_vector,
            self.params.max_freq(),
            self.params.gain_db(),
        );

        self.pipeline.analyze(inputs);
        if is_playing {
            let (input_tf, sh_tf) = self.pipeline.frames_mut();
            encode_frame(&self.matrix, input_tf, sh_tf, self.num_sh, self.num_sensors);
        } else {
            self.pipeline.clear_sh();
        }
        self.pipeline.synthesize(&gate, &format, outputs);
    }
}

/// `SH[band] = W[band] · X[band]` for the active channels
fn encode_frame(
    matrix: &Array3<Complex32>,
    input_tf: &Array3<Complex32>,
    sh_tf: &mut Array3<Complex32>,
    num_sh: usize,
    num_sensors: usize,
) {
    for band in 0..NUM_BANDS {
        for ch in 0..num_sh {
            for slot in 0..TIME_SLOTS {
                let mut acc = Complex32::new(0.0, 0.0);
                for q in 0..num_sensors {
                    acc += matrix[[band, ch, q]] * input_tf[[band, q, slot]];
                }
                sh_tf[[band, ch, slot]] = acc;
            }
        }
    }
}
