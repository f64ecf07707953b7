//! Array Encoder Integration Tests
//!
//! Tests the complete block path through `Array2Sh`.
//! Verifies:
//! - Gating (block size, pending reconfiguration, transport)
//! - Output ordering / normalization conventions
//! - Reconfiguration protocol under concurrent requests
//! - Built-in modal designer + evaluation on a real array

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use approx::assert_abs_diff_eq;
use ndarray::{Array2, Array3};
use num_complex::Complex32;

use rf_array2sh::{
    Array2Sh, Array2ShError, Array2ShResult, ChannelOrdering, DesignOutput, DesignRequest,
    EncoderParams, EncodingFilterDesigner, FRAME_SIZE, HOP_SIZE, MicArrayPreset, NUM_BANDS,
    Normalization, ReinitState,
};

const SAMPLE_RATE: u32 = 48000;
const NUM_FRAMES: usize = 6;

// ═══════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════

/// W[band] = I (sensor q feeds SH channel q)
struct IdentityDesigner;

impl EncodingFilterDesigner for IdentityDesigner {
    fn design(&self, request: &DesignRequest<'_>) -> Array2ShResult<DesignOutput> {
        let nsh = request.num_sh();
        let q = request.array.num_sensors();
        let bands = request.freq_vector.len();
        let matrix = Array3::from_shape_fn((bands, nsh, q), |(_, ch, s)| {
            if ch == s {
                Complex32::new(1.0, 0.0)
            } else {
                Complex32::new(0.0, 0.0)
            }
        });
        Ok(DesignOutput {
            matrix,
            modal_db: Array2::zeros((bands, request.order + 1)),
            inverse_db: Array2::zeros((bands, request.order + 1)),
        })
    }

    fn name(&self) -> &str {
        "identity"
    }
}

/// Identity on the first call, error afterwards
struct OneShotDesigner {
    calls: AtomicUsize,
}

impl EncodingFilterDesigner for OneShotDesigner {
    fn design(&self, request: &DesignRequest<'_>) -> Array2ShResult<DesignOutput> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            IdentityDesigner.design(request)
        } else {
            Err(Array2ShError::DesignFailed("unavailable".into()))
        }
    }
}

/// Requests another matrix update while the first design is running
struct RequeueDesigner {
    params: Arc<OnceLock<Arc<EncoderParams>>>,
    calls: Arc<AtomicUsize>,
}

impl EncodingFilterDesigner for RequeueDesigner {
    fn design(&self, request: &DesignRequest<'_>) -> Array2ShResult<DesignOutput> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            if let Some(params) = self.params.get() {
                params.set_reg_par(20.0);
            }
        }
        IdentityDesigner.design(request)
    }
}

/// Ready encoder with identity W, N3D, all bands open
fn identity_encoder() -> Array2Sh {
    let mut encoder = Array2Sh::with_designer(SAMPLE_RATE, Box::new(IdentityDesigner));
    let params = encoder.params();
    params.set_max_freq(48000.0);
    params.set_normalization(Normalization::N3D);
    assert!(encoder.check_reinit());
    encoder
}

/// Distinct sine per channel
fn generate_inputs(channels: usize, samples: usize) -> Vec<Vec<f32>> {
    (0..channels)
        .map(|ch| {
            let freq = 300.0 + 250.0 * ch as f32;
            (0..samples)
                .map(|i| {
                    0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / SAMPLE_RATE as f32).sin()
                })
                .collect()
        })
        .collect()
}

/// Run whole frames through the encoder, return concatenated outputs
fn run_frames(encoder: &mut Array2Sh, inputs: &[Vec<f32>], num_outputs: usize) -> Vec<Vec<f32>> {
    let frames = inputs[0].len() / FRAME_SIZE;
    let mut output = vec![Vec::with_capacity(frames * FRAME_SIZE); num_outputs];
    let mut block = vec![vec![0.0f32; FRAME_SIZE]; num_outputs];

    for f in 0..frames {
        let range = f * FRAME_SIZE..(f + 1) * FRAME_SIZE;
        let ins: Vec<&[f32]> = inputs.iter().map(|x| &x[range.clone()]).collect();
        let mut outs: Vec<&mut [f32]> = block.iter_mut().map(|b| b.as_mut_slice()).collect();
        encoder.process(&ins, &mut outs, FRAME_SIZE, true);
        for (o, b) in output.iter_mut().zip(&block) {
            o.extend_from_slice(b);
        }
    }
    output
}

fn is_silent(signal: &[f32]) -> bool {
    signal.iter().all(|&x| x == 0.0)
}

// ═══════════════════════════════════════════════════════════════════════════
// GATING
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_wrong_block_size_outputs_silence() {
    let mut encoder = identity_encoder();
    let inputs = generate_inputs(4, FRAME_SIZE);
    let ins: Vec<&[f32]> = inputs.iter().map(|x| x.as_slice()).collect();

    let mut block = vec![vec![1.0f32; FRAME_SIZE]; 4];
    let mut outs: Vec<&mut [f32]> = block.iter_mut().map(|b| b.as_mut_slice()).collect();
    encoder.process(&ins, &mut outs, FRAME_SIZE / 2, true);

    for ch in &block {
        assert!(is_silent(&ch[..FRAME_SIZE / 2]));
    }
}

#[test]
fn test_not_playing_outputs_silence() {
    let mut encoder = identity_encoder();
    let inputs = generate_inputs(4, FRAME_SIZE * 2);
    let ins: Vec<&[f32]> = inputs.iter().map(|x| &x[..FRAME_SIZE]).collect();

    let mut block = vec![vec![1.0f32; FRAME_SIZE]; 4];
    let mut outs: Vec<&mut [f32]> = block.iter_mut().map(|b| b.as_mut_slice()).collect();
    encoder.process(&ins, &mut outs, FRAME_SIZE, false);

    assert!(block.iter().all(|ch| ch.iter().all(|x| x.abs() < 1e-9)));
}

#[test]
fn test_pending_request_outputs_silence_then_recovers() {
    let slot = Arc::new(OnceLock::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let mut encoder = Array2Sh::with_designer(
        SAMPLE_RATE,
        Box::new(RequeueDesigner {
            params: Arc::clone(&slot),
            calls: Arc::clone(&calls),
        }),
    );
    let params = encoder.params();
    params.set_max_freq(48000.0);
    params.set_normalization(Normalization::N3D);
    assert!(slot.set(encoder.params()).is_ok());

    let inputs = generate_inputs(4, FRAME_SIZE * 2);

    // First block: the matrix request raised during design survives
    let ins: Vec<&[f32]> = inputs.iter().map(|x| &x[..FRAME_SIZE]).collect();
    let mut block = vec![vec![1.0f32; FRAME_SIZE]; 4];
    let mut outs: Vec<&mut [f32]> = block.iter_mut().map(|b| b.as_mut_slice()).collect();
    encoder.process(&ins, &mut outs, FRAME_SIZE, true);

    assert!(block.iter().all(|ch| is_silent(ch)));
    assert_eq!(params.reinit_states().1, ReinitState::Pending);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Second block: reconciled, W applied
    let ins: Vec<&[f32]> = inputs.iter().map(|x| &x[FRAME_SIZE..]).collect();
    let mut outs: Vec<&mut [f32]> = block.iter_mut().map(|b| b.as_mut_slice()).collect();
    encoder.process(&ins, &mut outs, FRAME_SIZE, true);

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(params.all_clean());
    assert!(block[0][HOP_SIZE..].iter().any(|x| x.abs() > 0.01));

    // Same result as a fresh encoder seeing that block first
    let mut reference = identity_encoder();
    let second: Vec<Vec<f32>> = inputs.iter().map(|x| x[FRAME_SIZE..].to_vec()).collect();
    let expected = run_frames(&mut reference, &second, 4);
    for ch in 0..4 {
        for i in 0..FRAME_SIZE {
            assert_abs_diff_eq!(block[ch][i], expected[ch][i], epsilon = 1e-6);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SIGNAL PATH
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_identity_passthrough_with_latency() {
    let mut encoder = identity_encoder();
    let inputs = generate_inputs(4, FRAME_SIZE * NUM_FRAMES);
    let output = run_frames(&mut encoder, &inputs, 4);

    let delay = encoder.processing_delay();
    assert_eq!(delay, HOP_SIZE);
    for ch in 0..4 {
        for i in delay..inputs[ch].len() {
            assert_abs_diff_eq!(output[ch][i], inputs[ch][i - delay], epsilon = 1e-4);
        }
    }
}

#[test]
fn test_missing_inputs_are_zero_filled() {
    let mut encoder = identity_encoder();
    let inputs = generate_inputs(2, FRAME_SIZE * 3);
    let output = run_frames(&mut encoder, &inputs, 4);

    assert!(output[0].iter().any(|x| x.abs() > 0.1));
    assert!(output[2].iter().all(|x| x.abs() < 1e-9));
    assert!(output[3].iter().all(|x| x.abs() < 1e-9));
}

#[test]
fn test_post_gain_and_max_freq() {
    let mut encoder = identity_encoder();
    let params = encoder.params();
    params.set_gain_db(-6.0);
    let inputs = generate_inputs(4, FRAME_SIZE * NUM_FRAMES);
    let output = run_frames(&mut encoder, &inputs, 4);

    let gain = 10f32.powf(-6.0 / 20.0);
    for i in FRAME_SIZE..inputs[0].len() {
        assert_abs_diff_eq!(output[0][i], gain * inputs[0][i - HOP_SIZE], epsilon = 1e-4);
    }

    // Cutoff below every band: silence
    let mut encoder = identity_encoder();
    encoder.params().set_max_freq(0.0);
    let output = run_frames(&mut encoder, &inputs, 4);
    assert!(output.iter().all(|ch| ch.iter().all(|x| x.abs() < 1e-9)));
}

#[test]
fn test_channels_beyond_sh_count_are_silent() {
    let mut encoder = identity_encoder();
    let inputs = generate_inputs(4, FRAME_SIZE * 2);
    let output = run_frames(&mut encoder, &inputs, 6);

    assert!(output[3].iter().any(|x| x.abs() > 0.1));
    assert!(is_silent(&output[4]));
    assert!(is_silent(&output[5]));
}

#[test]
fn test_sn3d_scales_each_order() {
    let setup = |normalization: Normalization| {
        let mut encoder = Array2Sh::with_designer(SAMPLE_RATE, Box::new(IdentityDesigner));
        let params = encoder.params();
        params.set_num_sensors(9);
        params.set_encoding_order(2);
        params.set_max_freq(48000.0);
        params.set_normalization(normalization);
        assert!(encoder.check_reinit());
        encoder
    };

    let inputs = generate_inputs(9, FRAME_SIZE * 3);
    let n3d = run_frames(&mut setup(Normalization::N3D), &inputs, 9);
    let sn3d = run_frames(&mut setup(Normalization::SN3D), &inputs, 9);

    for ch in 0..9 {
        let order = (ch as f32).sqrt().floor();
        let scale = (2.0 * order + 1.0).sqrt();
        for i in 0..n3d[ch].len() {
            assert_abs_diff_eq!(sn3d[ch][i], n3d[ch][i] / scale, epsilon = 1e-6);
        }
    }
}

#[test]
fn test_fuma_first_order() {
    let inputs = generate_inputs(4, FRAME_SIZE * 3);

    let mut acn = identity_encoder();
    let reference = run_frames(&mut acn, &inputs, 4);

    let mut fuma = identity_encoder();
    let params = fuma.params();
    params.set_channel_ordering(ChannelOrdering::FuMa);
    params.set_normalization(Normalization::FuMa);
    let output = run_frames(&mut fuma, &inputs, 4);

    let (sqrt2, sqrt3) = (2f32.sqrt(), 3f32.sqrt());
    for i in 0..reference[0].len() {
        assert_abs_diff_eq!(output[0][i], reference[0][i] / sqrt2, epsilon = 1e-6);
        assert_abs_diff_eq!(output[1][i], reference[3][i] / sqrt3, epsilon = 1e-6);
        assert_abs_diff_eq!(output[2][i], reference[1][i] / sqrt3, epsilon = 1e-6);
        assert_abs_diff_eq!(output[3][i], reference[2][i] / sqrt3, epsilon = 1e-6);
    }
}

#[test]
fn test_fuma_needs_four_outputs() {
    let mut encoder = identity_encoder();
    encoder.params().set_channel_ordering(ChannelOrdering::FuMa);
    let inputs = generate_inputs(4, FRAME_SIZE * 2);
    let output = run_frames(&mut encoder, &inputs, 3);
    assert!(output.iter().all(|ch| is_silent(ch)));
}

#[test]
fn test_order_change_drops_fuma() {
    let mut encoder = identity_encoder();
    let params = encoder.params();
    params.set_channel_ordering(ChannelOrdering::FuMa);
    params.set_normalization(Normalization::FuMa);

    params.set_num_sensors(9);
    params.set_encoding_order(2);
    assert_eq!(params.channel_ordering(), ChannelOrdering::Acn);
    assert_eq!(params.normalization(), Normalization::SN3D);

    assert!(encoder.check_reinit());
    assert_eq!(params.active_order(), 2);
    assert_eq!(encoder.encoding_matrix().dim(), (NUM_BANDS, 9, 9));
}

// ═══════════════════════════════════════════════════════════════════════════
// RECONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_designer_failure_keeps_matrix() {
    let mut encoder = Array2Sh::with_designer(
        SAMPLE_RATE,
        Box::new(OneShotDesigner {
            calls: AtomicUsize::new(0),
        }),
    );
    assert!(encoder.check_reinit());
    let before = encoder.encoding_matrix().to_owned();

    encoder.params().set_reg_par(30.0);
    assert!(encoder.check_reinit());
    assert_eq!(encoder.encoding_matrix(), before);
}

#[test]
fn test_evaluation_latch_and_validity() {
    let mut encoder = identity_encoder();
    let params = encoder.params();

    // Initial reconciliation evaluated the first matrix
    assert!(params.is_evaluation_valid());
    assert!(params.take_evaluation_ready());
    assert!(!params.take_evaluation_ready());

    params.refresh_settings();
    assert!(encoder.check_reinit());
    assert!(!params.is_evaluation_valid());
    assert!(!params.take_evaluation_ready());

    params.request_evaluation();
    assert!(encoder.check_reinit());
    assert!(params.is_evaluation_valid());
    assert!(params.take_evaluation_ready());
}

#[test]
fn test_sample_rate_change() {
    let mut encoder = identity_encoder();
    encoder.init(44100);
    assert_eq!(encoder.sample_rate(), 44100);
    assert_abs_diff_eq!(encoder.freq_vector()[1], 44100.0 / 256.0, epsilon = 1e-3);
    assert!(encoder.params().all_clean());
    assert_eq!(encoder.diagnostics().freq_vector, encoder.freq_vector());
}

// ═══════════════════════════════════════════════════════════════════════════
// MODAL DESIGNER
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_eigenmike_low_order_correlation() {
    let mut encoder = Array2Sh::new(SAMPLE_RATE);
    let params = encoder.params();
    params.set_preset(MicArrayPreset::Eigenmike32);
    params.request_evaluation();
    assert!(encoder.check_reinit());

    let diag = encoder.diagnostics();
    assert_eq!(diag.num_orders, 5);
    assert_eq!(diag.num_bands(), NUM_BANDS);

    // ~1.5 kHz
    let band = 8;
    assert!(diag.spatial_correlation[[band, 0]] > 0.9);
    assert!(diag.spatial_correlation[[band, 1]] > 0.9);
    assert!(diag.level_difference[[band, 1]].abs() < 3.0);
    assert!(diag.modal_db.iter().all(|x| x.is_finite()));
    assert!(diag.inverse_db.iter().all(|x| x.is_finite()));

    // Encoded output is finite
    let inputs = generate_inputs(32, FRAME_SIZE * 2);
    let output = run_frames(&mut encoder, &inputs, 25);
    assert!(output.iter().all(|ch| ch.iter().all(|x| x.is_finite())));
}
