//! Time-frequency transform
//!
//! Default engine: STFT with FFT size 256 (129 bands), hop 128, periodic
//! sqrt-Hann analysis and synthesis windows. With 50 % overlap the window
//! product sums to one, so analysis followed by synthesis reconstructs the
//! input delayed by exactly one hop.

use std::f32::consts::PI;
use std::sync::Arc;

use ndarray::Array2;
use num_complex::Complex32;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::{HOP_SIZE, LATENCY_HOPS, NUM_BANDS};

/// FFT size of the default STFT
pub const FFT_SIZE: usize = 2 * HOP_SIZE;

/// Hop-based multichannel analysis/synthesis engine
pub trait TimeFrequencyTransform: Send {
    /// Set the active channel counts; clears all internal history
    fn configure(&mut self, num_inputs: usize, num_outputs: usize);

    /// Analyze one hop per input channel into `bins[channel][band]`
    fn forward(&mut self, hops: &[Vec<f32>], bins: &mut Array2<Complex32>);

    /// Synthesize one hop per output channel from `bins[channel][band]`
    fn inverse(&mut self, bins: &Array2<Complex32>, hops: &mut [Vec<f32>]);

    /// Fixed delay of forward + inverse, in hops
    fn latency_hops(&self) -> usize {
        LATENCY_HOPS
    }
}

/// Band centre frequencies for a sample rate.
///
/// Band 0 is moved to a quarter of band 1 so DC never reaches the modal
/// filter design.
pub fn band_frequencies(sample_rate: f32) -> Vec<f32> {
    let mut freqs: Vec<f32> = (0..NUM_BANDS)
        .map(|band| band as f32 * sample_rate / FFT_SIZE as f32)
        .collect();
    freqs[0] = freqs[1] / 4.0;
    freqs
}

/// Default STFT engine
pub struct StftFilterbank {
    fft_forward: Arc<dyn RealToComplex<f32>>,
    fft_inverse: Arc<dyn ComplexToReal<f32>>,
    window: Vec<f32>,
    /// Last FFT_SIZE input samples per channel
    history: Vec<Vec<f32>>,
    /// Overlap-add accumulator per output channel
    overlap: Vec<Vec<f32>>,
    time_buf: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch_forward: Vec<Complex32>,
    scratch_inverse: Vec<Complex32>,
    num_inputs: usize,
    num_outputs: usize,
}

impl StftFilterbank {
    /// Allocate for up to `max_inputs` / `max_outputs` channels
    pub fn new(max_inputs: usize, max_outputs: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft_forward = planner.plan_fft_forward(FFT_SIZE);
        let fft_inverse = planner.plan_fft_inverse(FFT_SIZE);

        // sqrt of periodic Hann
        let window: Vec<f32> = (0..FFT_SIZE)
            .map(|i| (0.5 * (1.0 - (2.0 * PI * i as f32 / FFT_SIZE as f32).cos())).sqrt())
            .collect();

        let scratch_forward = fft_forward.make_scratch_vec();
        let scratch_inverse = fft_inverse.make_scratch_vec();

        Self {
            fft_forward,
            fft_inverse,
            window,
            history: vec![vec![0.0; FFT_SIZE]; max_inputs],
            overlap: vec![vec![0.0; FFT_SIZE]; max_outputs],
            time_buf: vec![0.0; FFT_SIZE],
            spectrum: vec![Complex32::new(0.0, 0.0); NUM_BANDS],
            scratch_forward,
            scratch_inverse,
            num_inputs: max_inputs,
            num_outputs: max_outputs,
        }
    }

    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    pub fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    pub fn reset(&mut self) {
        for h in self.history.iter_mut() {
            h.fill(0.0);
        }
        for o in self.overlap.iter_mut() {
            o.fill(0.0);
        }
    }
}

impl TimeFrequencyTransform for StftFilterbank {
    fn configure(&mut self, num_inputs: usize, num_outputs: usize) {
        self.num_inputs = num_inputs.min(self.history.len());
        self.num_outputs = num_outputs.min(self.overlap.len());
        self.reset();
    }

    fn forward(&mut self, hops: &[Vec<f32>], bins: &mut Array2<Complex32>) {
        for ch in 0..self.num_inputs {
            let history = &mut self.history[ch];
            history.copy_within(HOP_SIZE.., 0);
            match hops.get(ch) {
                Some(hop) => history[FFT_SIZE - HOP_SIZE..].copy_from_slice(&hop[..HOP_SIZE]),
                None => history[FFT_SIZE - HOP_SIZE..].fill(0.0),
            }

            for ((t, &x), &w) in self.time_buf.iter_mut().zip(history.iter()).zip(&self.window) {
                *t = x * w;
            }
            self.fft_forward
                .process_with_scratch(&mut self.time_buf, &mut self.spectrum, &mut self.scratch_forward)
                .ok();

            for (dst, &src) in bins.row_mut(ch).iter_mut().zip(&self.spectrum) {
                *dst = src;
            }
        }
    }

    fn inverse(&mut self, bins: &Array2<Complex32>, hops: &mut [Vec<f32>]) {
        let norm = 1.0 / FFT_SIZE as f32;

        for ch in 0..self.num_outputs.min(hops.len()) {
            for (dst, &src) in self.spectrum.iter_mut().zip(bins.row(ch).iter()) {
                *dst = src;
            }
            // DC and Nyquist must be real for the c2r transform
            self.spectrum[0].im = 0.0;
            self.spectrum[NUM_BANDS - 1].im = 0.0;

            self.fft_inverse
                .process_with_scratch(&mut self.spectrum, &mut self.time_buf, &mut self.scratch_inverse)
                .ok();

            let overlap = &mut self.overlap[ch];
            for ((o, &y), &w) in overlap.iter_mut().zip(&self.time_buf).zip(&self.window) {
                *o += y * w * norm;
            }

            hops[ch][..HOP_SIZE].copy_from_slice(&overlap[..HOP_SIZE]);
            overlap.copy_within(HOP_SIZE.., 0);
            overlap[FFT_SIZE - HOP_SIZE..].fill(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_band_frequencies() {
        let freqs = band_frequencies(48000.0);
        assert_eq!(freqs.len(), NUM_BANDS);
        assert_abs_diff_eq!(freqs[1], 187.5, epsilon = 1e-3);
        assert_abs_diff_eq!(freqs[0], 187.5 / 4.0, epsilon = 1e-3);
        assert_abs_diff_eq!(freqs[NUM_BANDS - 1], 24000.0, epsilon = 1e-2);
    }

    #[test]
    fn test_window_is_power_complementary() {
        let fb = StftFilterbank::new(1, 1);
        for i in 0..HOP_SIZE {
            let sum = fb.window[i].powi(2) + fb.window[i + HOP_SIZE].powi(2);
            assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_perfect_reconstruction() {
        let mut fb = StftFilterbank::new(2, 2);
        fb.configure(2, 2);

        let total = HOP_SIZE * 12;
        let signal: Vec<f32> = (0..total)
            .map(|i| (i as f32 * 0.07).sin() + 0.3 * (i as f32 * 0.61).cos())
            .collect();

        let mut bins = Array2::<Complex32>::zeros((2, NUM_BANDS));
        let mut out_hops = vec![vec![0.0; HOP_SIZE]; 2];
        let mut output = Vec::with_capacity(total);

        for hop in signal.chunks(HOP_SIZE) {
            let in_hops = vec![hop.to_vec(), vec![0.0; HOP_SIZE]];
            fb.forward(&in_hops, &mut bins);
            fb.inverse(&bins, &mut out_hops);
            output.extend_from_slice(&out_hops[0]);
        }

        let delay = fb.latency_hops() * HOP_SIZE;
        for i in delay..total {
            assert_abs_diff_eq!(output[i], signal[i - delay], epsilon = 1e-4);
        }
        // Silent channel stays silent
        assert!(out_hops[1].iter().all(|&x| x.abs() < 1e-6));
    }

    #[test]
    fn test_missing_input_is_zero_filled() {
        let mut fb = StftFilterbank::new(4, 1);
        fb.configure(3, 1);
        let mut bins = Array2::<Complex32>::from_elem((4, NUM_BANDS), Complex32::new(1.0, 1.0));
        fb.forward(&[vec![0.0; HOP_SIZE]], &mut bins);
        assert!(bins.row(2).iter().all(|c| c.norm() == 0.0));
        // Channel 3 is not configured and left untouched
        assert_eq!(bins[[3, 0]], Complex32::new(1.0, 1.0));
    }
}
