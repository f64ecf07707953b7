//! Encoding matrix evaluation
//!
//! Simulates plane waves from a quasi-uniform direction grid onto the array,
//! encodes them with the current matrix and compares the result with ideal
//! SH per order:
//!
//! - spatial correlation: `Σ Re(ŷ·y) / sqrt(Σ|ŷ|² · Σy²)`
//! - level difference (dB): `10·log10(Σ|ŷ|² / Σy²)`

use std::f64::consts::PI;

use ndarray::{Array2, ArrayView3};
use num_complex::{Complex32, Complex64};
use rayon::prelude::*;

use crate::array::{ArraySpecs, ArrayType, SensorDirection};
use crate::design::{SIMULATION_ORDER, array_kernel, cos_angle, modal_coefficients};
use crate::sh::{num_sh_channels, real_sh_n3d};

/// Directions on the sphere for spherical arrays
const SPHERE_GRID_POINTS: usize = 240;
/// Directions on the horizon for cylindrical arrays
const HORIZON_GRID_POINTS: usize = 72;

/// Quasi-uniform evaluation directions
pub fn evaluation_grid(array_type: ArrayType) -> Vec<SensorDirection> {
    match array_type {
        ArrayType::Spherical => {
            let golden_angle = PI * (3.0 - 5f64.sqrt());
            (0..SPHERE_GRID_POINTS)
                .map(|i| {
                    let z = 1.0 - (2 * i + 1) as f64 / SPHERE_GRID_POINTS as f64;
                    let azimuth = (i as f64 * golden_angle).rem_euclid(2.0 * PI) - PI;
                    SensorDirection::from_radians(azimuth as f32, z.asin() as f32)
                })
                .collect()
        }
        ArrayType::Cylindrical => (0..HORIZON_GRID_POINTS)
            .map(|i| {
                let azimuth = 2.0 * PI * i as f64 / HORIZON_GRID_POINTS as f64;
                SensorDirection::from_radians(azimuth as f32, 0.0)
            })
            .collect(),
    }
}

/// Evaluation inputs
pub struct EvaluationRequest<'a> {
    pub order: usize,
    pub array: &'a ArraySpecs,
    pub speed_of_sound: f32,
    pub freq_vector: &'a [f32],
    /// Encoding matrix `[bands, nSH, Q]`
    pub matrix: ArrayView3<'a, Complex32>,
}

/// Per-band, per-order evaluation curves `[band, order]`
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub spatial_correlation: Array2<f32>,
    pub level_difference: Array2<f32>,
}

/// Evaluate an encoding matrix, in parallel over bands
pub fn evaluate(request: &EvaluationRequest<'_>) -> Evaluation {
    let order = request.order;
    let nsh = num_sh_channels(order);
    let array = request.array;
    let q = array.num_sensors();
    let bands = request.freq_vector.len();

    let grid = evaluation_grid(array.array_type);
    let num_dirs = grid.len();

    // Ideal SH [nSH][dir]
    let mut ideal = vec![0.0f64; nsh * num_dirs];
    let mut y = vec![0.0f64; nsh];
    for (d, dir) in grid.iter().enumerate() {
        real_sh_n3d(order, dir.azimuth as f64, dir.elevation as f64, &mut y);
        for (ch, &v) in y.iter().enumerate() {
            ideal[ch * num_dirs + d] = v;
        }
    }

    // cos(sensor, direction) [sensor][dir]
    let cosines: Vec<f64> = array
        .sensors
        .iter()
        .flat_map(|s| grid.iter().map(move |d| cos_angle(array.array_type, s, d)))
        .collect();

    let per_band: Vec<(Vec<f32>, Vec<f32>)> = (0..bands)
        .into_par_iter()
        .map(|band| {
            let freq = request.freq_vector[band] as f64;
            let k = 2.0 * PI * freq / request.speed_of_sound as f64;
            let modal = modal_coefficients(
                array.array_type,
                array.weight_type,
                k * array.r as f64,
                k * array.baffle_r as f64,
                SIMULATION_ORDER,
            );

            // Simulated sensor responses [sensor][dir]
            let responses: Vec<Complex64> = cosines
                .iter()
                .map(|&c| array_kernel(array.array_type, &modal, c))
                .collect();

            let mut correlation = vec![0.0f32; order + 1];
            let mut level = vec![0.0f32; order + 1];
            for n in 0..=order {
                let (mut cross, mut energy_hat, mut energy_ideal) = (0.0, 0.0, 0.0);
                for ch in n * n..(n + 1) * (n + 1) {
                    for d in 0..num_dirs {
                        let mut y_hat = Complex64::new(0.0, 0.0);
                        for s in 0..q {
                            let w = request.matrix[[band, ch, s]];
                            y_hat += Complex64::new(w.re as f64, w.im as f64)
                                * responses[s * num_dirs + d];
                        }
                        let y_ideal = ideal[ch * num_dirs + d];
                        cross += y_hat.re * y_ideal;
                        energy_hat += y_hat.norm_sqr();
                        energy_ideal += y_ideal * y_ideal;
                    }
                }
                let denom = (energy_hat * energy_ideal).sqrt();
                correlation[n] = if denom > 1e-30 { (cross / denom) as f32 } else { 0.0 };
                level[n] = if energy_ideal > 1e-30 {
                    (10.0 * (energy_hat / energy_ideal).max(1e-20).log10()) as f32
                } else {
                    0.0
                };
            }
            (correlation, level)
        })
        .collect();

    let mut spatial_correlation = Array2::<f32>::zeros((bands, order + 1));
    let mut level_difference = Array2::<f32>::zeros((bands, order + 1));
    for (band, (correlation, level)) in per_band.iter().enumerate() {
        for n in 0..=order {
            spatial_correlation[[band, n]] = correlation[n];
            level_difference[[band, n]] = level[n];
        }
    }

    Evaluation {
        spatial_correlation,
        level_difference,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphere_grid_is_balanced() {
        let grid = evaluation_grid(ArrayType::Spherical);
        assert_eq!(grid.len(), SPHERE_GRID_POINTS);
        let mut centroid = [0.0f64; 3];
        for dir in &grid {
            let v = dir.unit_vector();
            for i in 0..3 {
                centroid[i] += v[i] / grid.len() as f64;
            }
        }
        assert!(centroid.iter().all(|c| c.abs() < 0.02), "{:?}", centroid);
    }

    #[test]
    fn test_horizon_grid() {
        let grid = evaluation_grid(ArrayType::Cylindrical);
        assert_eq!(grid.len(), HORIZON_GRID_POINTS);
        assert!(grid.iter().all(|d| d.elevation == 0.0));
    }
}
