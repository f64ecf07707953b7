//! Bessel functions for modal array models
//!
//! All routines fill `0..=n_max` in one pass. Functions of the first kind use
//! Miller's downward recurrence with rescaling; the spherical Neumann
//! function uses the (stable) upward recurrence.

use num_complex::Complex64;

const RESCALE_LIMIT: f64 = 1e250;

fn miller_start(n_max: usize, x: f64) -> usize {
    let m = n_max.max(x.ceil() as usize);
    m + 16 + (40.0 * m as f64).sqrt() as usize
}

/// Spherical Bessel functions of the first kind `j_0(x) ..= j_{n_max}(x)`
pub fn spherical_jn(n_max: usize, x: f64) -> Vec<f64> {
    let mut out = vec![0.0; n_max + 1];
    if x.abs() < 1e-12 {
        out[0] = 1.0;
        return out;
    }

    let start = miller_start(n_max, x);
    let mut next = 0.0; // j_{n+1}
    let mut current = 1e-30; // j_n
    for n in (1..=start).rev() {
        // j_{n-1} = (2n+1)/x j_n - j_{n+1}
        let prev = (2 * n + 1) as f64 / x * current - next;
        next = current;
        current = prev;
        if n - 1 <= n_max {
            out[n - 1] = current;
        }
        if n <= n_max {
            out[n] = next;
        }
        if current.abs() > RESCALE_LIMIT {
            current /= RESCALE_LIMIT;
            next /= RESCALE_LIMIT;
            for v in out.iter_mut() {
                *v /= RESCALE_LIMIT;
            }
        }
    }

    // Normalize against the closed forms, picking the better conditioned one
    let j0 = x.sin() / x;
    let j1 = x.sin() / (x * x) - x.cos() / x;
    let scale = if j0.abs() >= j1.abs() || n_max == 0 {
        j0 / out[0]
    } else {
        j1 / out[1]
    };
    for v in out.iter_mut() {
        *v *= scale;
    }
    out
}

/// Spherical Bessel functions of the second kind `y_0(x) ..= y_{n_max}(x)`
pub fn spherical_yn(n_max: usize, x: f64) -> Vec<f64> {
    let mut out = vec![f64::NEG_INFINITY; n_max + 1];
    if x.abs() < 1e-12 {
        return out;
    }
    out[0] = -x.cos() / x;
    if n_max >= 1 {
        out[1] = -x.cos() / (x * x) - x.sin() / x;
    }
    for n in 1..n_max {
        out[n + 1] = (2 * n + 1) as f64 / x * out[n] - out[n - 1];
    }
    out
}

/// Derivatives of a spherical Bessel family, `f` must hold `n_max + 2` values
pub fn spherical_derivative(f: &[f64], x: f64, n_max: usize) -> Vec<f64> {
    (0..=n_max)
        .map(|n| {
            if n == 0 {
                -f[1]
            } else {
                f[n - 1] - (n + 1) as f64 / x * f[n]
            }
        })
        .collect()
}

/// Spherical Hankel functions of the first kind and their derivatives
pub fn spherical_hankel1(n_max: usize, x: f64) -> (Vec<Complex64>, Vec<Complex64>) {
    let j = spherical_jn(n_max + 1, x);
    let y = spherical_yn(n_max + 1, x);
    let dj = spherical_derivative(&j, x, n_max);
    let dy = spherical_derivative(&y, x, n_max);
    let h = (0..=n_max).map(|n| Complex64::new(j[n], y[n])).collect();
    let dh = (0..=n_max).map(|n| Complex64::new(dj[n], dy[n])).collect();
    (h, dh)
}

/// Cylindrical Bessel functions of the first kind `J_0(x) ..= J_{n_max}(x)`
pub fn cylindrical_jn(n_max: usize, x: f64) -> Vec<f64> {
    let mut out = vec![0.0; n_max + 1];
    if x.abs() < 1e-12 {
        out[0] = 1.0;
        return out;
    }

    let mut start = miller_start(n_max, x);
    if start % 2 == 1 {
        start += 1;
    }
    let mut next = 0.0;
    let mut current = 1e-30;
    // J_0 + 2 * sum J_2k = 1
    let mut norm_sum = if start % 2 == 0 { 2.0 * current } else { 0.0 };
    for n in (1..=start).rev() {
        let prev = 2.0 * n as f64 / x * current - next;
        next = current;
        current = prev;
        let idx = n - 1;
        if idx <= n_max {
            out[idx] = current;
        }
        if n <= n_max {
            out[n] = next;
        }
        if idx % 2 == 0 {
            norm_sum += if idx == 0 { current } else { 2.0 * current };
        }
        if current.abs() > RESCALE_LIMIT {
            current /= RESCALE_LIMIT;
            next /= RESCALE_LIMIT;
            norm_sum /= RESCALE_LIMIT;
            for v in out.iter_mut() {
                *v /= RESCALE_LIMIT;
            }
        }
    }

    let scale = 1.0 / norm_sum;
    for v in out.iter_mut() {
        *v *= scale;
    }
    out
}

/// Derivatives `J_n'(x)`, `j` must hold `n_max + 2` values
pub fn cylindrical_derivative(j: &[f64], n_max: usize) -> Vec<f64> {
    (0..=n_max)
        .map(|n| if n == 0 { -j[1] } else { 0.5 * (j[n - 1] - j[n + 1]) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_spherical_jn_closed_forms() {
        for &x in &[0.05, 0.5, 1.0, 3.3, 10.0, 40.0] {
            let j = spherical_jn(3, x);
            let j0 = x.sin() / x;
            let j1 = x.sin() / (x * x) - x.cos() / x;
            let j2 = (3.0 / (x * x) - 1.0) * x.sin() / x - 3.0 * x.cos() / (x * x);
            assert_relative_eq!(j[0], j0, max_relative = 1e-9, epsilon = 1e-12);
            assert_relative_eq!(j[1], j1, max_relative = 1e-9, epsilon = 1e-12);
            assert_relative_eq!(j[2], j2, max_relative = 1e-8, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_spherical_small_argument() {
        // j_n(x) ~ x^n / (2n+1)!!
        let x = 1e-3;
        let j = spherical_jn(4, x);
        assert_relative_eq!(j[1], x / 3.0, max_relative = 1e-5);
        assert_relative_eq!(j[2], x * x / 15.0, max_relative = 1e-5);
    }

    #[test]
    fn test_wronskian() {
        // j_n y_n' - j_n' y_n = 1 / x^2
        let x = 2.7;
        let j = spherical_jn(6, x);
        let y = spherical_yn(6, x);
        let dj = spherical_derivative(&j, x, 5);
        let dy = spherical_derivative(&y, x, 5);
        for n in 0..=5 {
            assert_relative_eq!(j[n] * dy[n] - dj[n] * y[n], 1.0 / (x * x), max_relative = 1e-8);
        }
    }

    #[test]
    fn test_cylindrical_jn() {
        // Reference values
        let j = cylindrical_jn(2, 1.0);
        assert_relative_eq!(j[0], 0.765_197_686_557_966_6, max_relative = 1e-9);
        assert_relative_eq!(j[1], 0.440_050_585_744_933_5, max_relative = 1e-9);
        assert_relative_eq!(j[2], 0.114_903_484_931_900_5, max_relative = 1e-8);

        let j = cylindrical_jn(1, 10.0);
        assert_relative_eq!(j[0], -0.245_935_764_451_348_3, max_relative = 1e-8);
    }
}
