//! Modal (theoretical) encoding filter designer
//!
//! `W[band] = diag(H_n) · Y⁺`, where `Y⁺` is the pseudo-inverse of the real
//! N3D SH matrix at the sensor directions and `H_n` is the regularized
//! inverse of the array's modal coefficient `b_n(kr)`.

use std::f64::consts::PI;

use nalgebra::DMatrix;
use ndarray::{Array2, Array3};
use num_complex::{Complex32, Complex64};
use rayon::prelude::*;

use super::bessel::{
    cylindrical_derivative, cylindrical_jn, spherical_derivative, spherical_hankel1, spherical_jn,
};
use super::{DesignOutput, DesignRequest, EncodingFilterDesigner, FilterType, magnitude_db};
use crate::array::{ArrayType, SensorDirection, WeightType};
use crate::error::{Array2ShError, Array2ShResult};
use crate::sh::{max_re_weights, num_sh_channels, order_of_channel, real_sh_n3d};

/// Truncation order used when simulating array responses
pub(crate) const SIMULATION_ORDER: usize = 30;

/// Smallest wavenumber-radius product fed to the Bessel functions
const MIN_KR: f64 = 1e-6;

/// Modal coefficients `b_0 ..= b_order` of an array for a plane wave.
///
/// Convention: the sensor pressure for a unit plane wave is
/// `Σ_n b_n (2n+1) P_n(cos γ)` (spherical) or `b_0 + 2 Σ_n b_n cos(n Δφ)`
/// (cylindrical). Rigid directional sensors and rigid cylinders fall back to
/// the corresponding omni/open model.
pub fn modal_coefficients(
    array_type: ArrayType,
    weight_type: WeightType,
    kr: f64,
    k_baffle_r: f64,
    order: usize,
) -> Vec<Complex64> {
    let kr = kr.max(MIN_KR);
    let k_baffle_r = k_baffle_r.max(MIN_KR);
    let i = Complex64::i();
    let i_pow = |n: usize| i.powu(n as u32);

    match array_type {
        ArrayType::Spherical => {
            let j = spherical_jn(order + 1, kr);
            let dj = spherical_derivative(&j, kr, order);

            match weight_type {
                WeightType::OpenOmni => (0..=order).map(|n| i_pow(n) * j[n]).collect(),
                WeightType::OpenDipole => (0..=order).map(|n| i_pow(n) * -i * dj[n]).collect(),
                WeightType::OpenCardioid => (0..=order)
                    .map(|n| i_pow(n) * (Complex64::new(j[n], 0.0) - i * dj[n]) * 0.5)
                    .collect(),
                WeightType::RigidOmni | WeightType::RigidCardioid | WeightType::RigidDipole => {
                    let (_, dh_baffle) = spherical_hankel1(order, k_baffle_r);
                    let j_baffle = spherical_jn(order + 1, k_baffle_r);
                    let dj_baffle = spherical_derivative(&j_baffle, k_baffle_r, order);
                    let (h, _) = spherical_hankel1(order, kr);
                    (0..=order)
                        .map(|n| {
                            let scattered = h[n] * (dj_baffle[n] / dh_baffle[n]);
                            i_pow(n) * (Complex64::new(j[n], 0.0) - scattered)
                        })
                        .collect()
                }
            }
        }
        ArrayType::Cylindrical => {
            let j = cylindrical_jn(order + 1, kr);
            let dj = cylindrical_derivative(&j, order);

            match weight_type {
                WeightType::OpenDipole | WeightType::RigidDipole => {
                    (0..=order).map(|n| i_pow(n) * -i * dj[n]).collect()
                }
                WeightType::OpenCardioid | WeightType::RigidCardioid => (0..=order)
                    .map(|n| i_pow(n) * (Complex64::new(j[n], 0.0) - i * dj[n]) * 0.5)
                    .collect(),
                WeightType::OpenOmni | WeightType::RigidOmni => {
                    (0..=order).map(|n| i_pow(n) * j[n]).collect()
                }
            }
        }
    }
}

/// Sum a modal series over the angle between two directions.
///
/// With `coeffs = b_n` this is the array response to a plane wave; with
/// `coeffs = |b_n|²` it is the diffuse-field cross-spectrum of two sensors.
pub fn array_kernel(array_type: ArrayType, coeffs: &[Complex64], cos_angle: f64) -> Complex64 {
    let mut sum = Complex64::new(0.0, 0.0);
    let (mut p_prev, mut p_cur) = (0.0f64, 1.0f64);

    for (n, &c) in coeffs.iter().enumerate() {
        let weight = match array_type {
            ArrayType::Spherical => (2 * n + 1) as f64,
            ArrayType::Cylindrical => {
                if n == 0 {
                    1.0
                } else {
                    2.0
                }
            }
        };
        sum += c * (weight * p_cur);

        // Legendre (spherical) or Chebyshev (cylindrical) recurrence
        let nf = n as f64;
        let p_next = match array_type {
            ArrayType::Spherical => ((2.0 * nf + 1.0) * cos_angle * p_cur - nf * p_prev) / (nf + 1.0),
            ArrayType::Cylindrical => {
                if n == 0 {
                    cos_angle
                } else {
                    2.0 * cos_angle * p_cur - p_prev
                }
            }
        };
        p_prev = p_cur;
        p_cur = p_next;
    }
    sum
}

/// Cosine of the angle between two directions as seen by the array model
pub(crate) fn cos_angle(array_type: ArrayType, a: &SensorDirection, b: &SensorDirection) -> f64 {
    match array_type {
        ArrayType::Spherical => {
            let (u, v) = (a.unit_vector(), b.unit_vector());
            (u[0] * v[0] + u[1] * v[1] + u[2] * v[2]).clamp(-1.0, 1.0)
        }
        ArrayType::Cylindrical => ((a.azimuth - b.azimuth) as f64).cos(),
    }
}

/// Theoretical designer for spherical/cylindrical arrays
#[derive(Debug, Clone)]
pub struct ModalDesigner {
    /// Relative singular value cut-off for the SH pseudo-inverse
    pub pinv_tolerance: f64,
}

impl Default for ModalDesigner {
    fn default() -> Self {
        Self {
            pinv_tolerance: 1e-6,
        }
    }
}

struct BandDesign {
    matrix: Vec<Complex64>,
    modal_db: Vec<f32>,
    inverse_db: Vec<f32>,
}

impl ModalDesigner {
    /// Regularized radial inverse per order
    fn radial_inverse(
        filter_type: FilterType,
        modal: &[Complex64],
        max_gain: f64,
        max_re: &[f64],
    ) -> Vec<Complex64> {
        let tikhonov = |b: Complex64| {
            let lambda = 1.0 / (2.0 * max_gain);
            b.conj() / (b.norm_sqr() + lambda * lambda)
        };

        match filter_type {
            FilterType::SoftLimiting => modal
                .iter()
                .map(|&b| {
                    let mag = b.norm();
                    if mag < 1e-30 {
                        Complex64::new(max_gain, 0.0)
                    } else {
                        let limit = (2.0 * max_gain / PI) * (PI / (2.0 * max_gain * mag)).atan();
                        b.conj() / mag * limit
                    }
                })
                .collect(),
            FilterType::Tikhonov => modal.iter().map(|&b| tikhonov(b)).collect(),
            FilterType::ZStyle | FilterType::ZStyleMaxRE => {
                let weights: Vec<f64> = if filter_type == FilterType::ZStyleMaxRE {
                    max_re.to_vec()
                } else {
                    vec![1.0; modal.len()]
                };
                let mut inverse: Vec<Complex64> = modal
                    .iter()
                    .zip(&weights)
                    .map(|(&b, &w)| tikhonov(b) * w)
                    .collect();

                // Keep the diffuse-field energy of the equalized response constant
                let (mut energy, mut target) = (0.0, 0.0);
                for (n, ((h, b), w)) in inverse.iter().zip(modal).zip(&weights).enumerate() {
                    let dim = (2 * n + 1) as f64;
                    energy += dim * (h * b).norm_sqr();
                    target += dim * w * w;
                }
                if energy > 1e-30 {
                    let gain = (target / energy).sqrt();
                    for h in inverse.iter_mut() {
                        *h *= gain;
                    }
                }
                inverse
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn design_band(
        &self,
        request: &DesignRequest<'_>,
        freq: f32,
        y_pinv: &DMatrix<f64>,
        sensor_cos: &[f64],
        alias_freq: f64,
        max_re: &[f64],
    ) -> BandDesign {
        let order = request.order;
        let nsh = request.num_sh();
        let q = request.array.num_sensors();
        let array = &request.array;

        let k = 2.0 * PI * freq as f64 / request.speed_of_sound as f64;
        let kr = k * array.r as f64;
        let k_baffle_r = k * array.baffle_r as f64;

        let modal = modal_coefficients(array.array_type, array.weight_type, kr, k_baffle_r, order);
        let max_gain = 10f64.powf(request.reg_par as f64 / 20.0);
        let inverse = Self::radial_inverse(request.filter_type, &modal, max_gain, max_re);

        let mut matrix = vec![Complex64::new(0.0, 0.0); nsh * q];
        for ch in 0..nsh {
            let h = inverse[order_of_channel(ch)];
            for s in 0..q {
                matrix[ch * q + s] = h * y_pinv[(ch, s)];
            }
        }

        if request.diffuse_eq && (freq as f64) > alias_freq {
            let sim = modal_coefficients(
                array.array_type,
                array.weight_type,
                kr,
                k_baffle_r,
                SIMULATION_ORDER,
            );
            let power: Vec<Complex64> = sim.iter().map(|b| Complex64::new(b.norm_sqr(), 0.0)).collect();
            let coherence: Vec<f64> = sensor_cos
                .iter()
                .map(|&c| array_kernel(array.array_type, &power, c).re)
                .collect();

            for ch in 0..nsh {
                let row = &matrix[ch * q..(ch + 1) * q];
                let mut out_power = 0.0;
                for i in 0..q {
                    for j in 0..q {
                        out_power += (row[i] * coherence[i * q + j] * row[j].conj()).re;
                    }
                }
                if out_power > 1e-20 {
                    let gain = 1.0 / out_power.sqrt();
                    for w in matrix[ch * q..(ch + 1) * q].iter_mut() {
                        *w *= gain;
                    }
                }
            }
        }

        BandDesign {
            matrix,
            modal_db: modal.iter().map(|b| magnitude_db(b.norm())).collect(),
            inverse_db: inverse.iter().map(|h| magnitude_db(h.norm())).collect(),
        }
    }
}

impl EncodingFilterDesigner for ModalDesigner {
    fn design(&self, request: &DesignRequest<'_>) -> Array2ShResult<DesignOutput> {
        let order = request.order;
        let nsh = num_sh_channels(order);
        let q = request.array.num_sensors();
        let bands = request.freq_vector.len();

        if order == 0 || order > crate::MAX_SH_ORDER {
            return Err(Array2ShError::InvalidOrder(order));
        }
        if q == 0 || q > crate::MAX_NUM_SENSORS {
            return Err(Array2ShError::InvalidSensorCount(q));
        }

        let mut y = DMatrix::<f64>::zeros(q, nsh);
        let mut y_row = vec![0.0; nsh];
        for (row, dir) in request.array.sensors.iter().enumerate() {
            real_sh_n3d(order, dir.azimuth as f64, dir.elevation as f64, &mut y_row);
            for (col, &v) in y_row.iter().enumerate() {
                y[(row, col)] = v;
            }
        }
        let y_pinv = y
            .pseudo_inverse(self.pinv_tolerance)
            .map_err(|e| Array2ShError::DesignFailed(e.to_string()))?;

        let sensors = &request.array.sensors;
        let sensor_cos: Vec<f64> = sensors
            .iter()
            .flat_map(|a| sensors.iter().map(move |b| cos_angle(request.array.array_type, a, b)))
            .collect();

        let alias_freq =
            request.speed_of_sound as f64 * order as f64 / (2.0 * PI * request.array.r as f64);
        let max_re = max_re_weights(order);

        let bands_out: Vec<BandDesign> = request
            .freq_vector
            .par_iter()
            .map(|&freq| self.design_band(request, freq, &y_pinv, &sensor_cos, alias_freq, &max_re))
            .collect();

        let mut matrix = Array3::<Complex32>::zeros((bands, nsh, q));
        let mut modal_db = Array2::<f32>::zeros((bands, order + 1));
        let mut inverse_db = Array2::<f32>::zeros((bands, order + 1));
        for (band, design) in bands_out.iter().enumerate() {
            for ch in 0..nsh {
                for s in 0..q {
                    let w = design.matrix[ch * q + s];
                    matrix[[band, ch, s]] = Complex32::new(w.re as f32, w.im as f32);
                }
            }
            for n in 0..=order {
                modal_db[[band, n]] = design.modal_db[n];
                inverse_db[[band, n]] = design.inverse_db[n];
            }
        }

        log::debug!(
            "Modal design: order {}, {} sensors, {} bands, aliasing at {:.0} Hz",
            order,
            q,
            bands,
            alias_freq
        );

        Ok(DesignOutput {
            matrix,
            modal_db,
            inverse_db,
        })
    }

    fn name(&self) -> &str {
        "modal"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::ArraySpecs;
    use crate::presets::MicArrayPreset;
    use approx::assert_abs_diff_eq;

    fn preset_specs(preset: MicArrayPreset) -> ArraySpecs {
        let geo = preset.geometry();
        ArraySpecs {
            array_type: geo.array_type,
            weight_type: geo.weight_type,
            r: geo.r,
            baffle_r: geo.baffle_r,
            sensors: geo
                .dirs_deg
                .iter()
                .map(|&(az, el)| SensorDirection::from_degrees(az, el))
                .collect(),
        }
    }

    #[test]
    fn test_open_omni_low_frequency_limit() {
        let b = modal_coefficients(ArrayType::Spherical, WeightType::OpenOmni, 1e-3, 1e-3, 2);
        assert_abs_diff_eq!(b[0].re, 1.0, epsilon = 1e-6);
        // b_1 ~ i * kr / 3
        assert_abs_diff_eq!(b[1].im, 1e-3 / 3.0, epsilon = 1e-8);
    }

    #[test]
    fn test_kernel_matches_plane_wave() {
        // Open omni kernel reproduces exp(i kr cos γ)
        let kr = 1.3;
        let b = modal_coefficients(ArrayType::Spherical, WeightType::OpenOmni, kr, kr, SIMULATION_ORDER);
        for &c in &[-1.0, -0.3, 0.0, 0.5, 1.0] {
            let p = array_kernel(ArrayType::Spherical, &b, c);
            let expected = Complex64::new(0.0, kr * c).exp();
            assert_abs_diff_eq!(p.re, expected.re, epsilon = 1e-9);
            assert_abs_diff_eq!(p.im, expected.im, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_tikhonov_gain_is_bounded() {
        let modal: Vec<Complex64> = [1.0, 1e-3, 1e-6]
            .iter()
            .map(|&m| Complex64::new(0.0, m))
            .collect();
        let max_gain = 10f64.powf(15.0 / 20.0);
        for filter in [FilterType::SoftLimiting, FilterType::Tikhonov] {
            let inv = ModalDesigner::radial_inverse(filter, &modal, max_gain, &[1.0; 3]);
            for h in &inv {
                assert!(h.norm() <= max_gain * 1.0001, "{:?} exceeded max gain", filter);
            }
            // unit modal response is (almost) untouched
            assert!((inv[0] * modal[0]).re > 0.95);
        }
    }

    #[test]
    fn test_design_shapes() {
        let specs = preset_specs(MicArrayPreset::Eigenmike32);
        let freqs: Vec<f32> = (1..=8).map(|b| b as f32 * 1000.0).collect();
        let request = DesignRequest {
            order: 4,
            array: specs,
            filter_type: FilterType::Tikhonov,
            reg_par: 15.0,
            speed_of_sound: 343.0,
            diffuse_eq: true,
            freq_vector: &freqs,
        };
        let out = ModalDesigner::default().design(&request).unwrap();
        assert_eq!(out.matrix.shape(), &[8, 25, 32]);
        assert_eq!(out.modal_db.shape(), &[8, 5]);
        assert!(out.matrix.iter().all(|w| w.re.is_finite() && w.im.is_finite()));
    }

    #[test]
    fn test_design_rejects_empty_array() {
        let mut specs = preset_specs(MicArrayPreset::Default);
        specs.sensors.clear();
        let freqs = [1000.0f32];
        let request = DesignRequest {
            order: 1,
            array: specs,
            filter_type: FilterType::Tikhonov,
            reg_par: 15.0,
            speed_of_sound: 343.0,
            diffuse_eq: false,
            freq_vector: &freqs,
        };
        assert!(ModalDesigner::default().design(&request).is_err());
    }
}
