//! Spherical harmonic helpers
//!
//! Real spherical harmonics in ACN channel order with N3D normalization
//! (no Condon-Shortley phase), which is the internal format of the encoder.
//! Conversions to SN3D / FuMa happen only at the output formatter.

/// Number of SH channels for an order: `(order + 1)²`
#[inline]
pub fn num_sh_channels(order: usize) -> usize {
    (order + 1) * (order + 1)
}

/// ACN channel index from (order, degree)
#[inline]
pub fn acn_index(order: i32, degree: i32) -> usize {
    (order * order + order + degree) as usize
}

/// Get (order, degree) from ACN index
pub fn acn_to_order_degree(acn: usize) -> (i32, i32) {
    let order = (acn as f64).sqrt().floor() as i32;
    let degree = acn as i32 - order * order - order;
    (order, degree)
}

/// SH order band that an ACN channel belongs to
#[inline]
pub fn order_of_channel(acn: usize) -> usize {
    acn_to_order_degree(acn).0 as usize
}

/// Legendre polynomials `P_0(x) ..= P_n(x)` written into `out`
pub fn legendre_polynomials(x: f64, out: &mut [f64]) {
    if out.is_empty() {
        return;
    }
    out[0] = 1.0;
    if out.len() > 1 {
        out[1] = x;
    }
    for n in 2..out.len() {
        let nf = n as f64;
        out[n] = ((2.0 * nf - 1.0) * x * out[n - 1] - (nf - 1.0) * out[n - 2]) / nf;
    }
}

/// Real N3D spherical harmonics for one direction, ACN order.
///
/// `out` must hold at least `(order+1)²` values. Angles are in radians,
/// elevation measured up from the horizontal plane.
pub fn real_sh_n3d(order: usize, azimuth: f64, elevation: f64, out: &mut [f64]) {
    debug_assert!(out.len() >= num_sh_channels(order));

    let x = elevation.sin();
    let s = (1.0 - x * x).max(0.0).sqrt();

    // legendre[l][m] without Condon-Shortley phase
    let mut legendre = [[0.0f64; crate::MAX_SH_ORDER + 1]; crate::MAX_SH_ORDER + 1];
    let mut pmm = 1.0;
    for m in 0..=order {
        if m > 0 {
            pmm *= (2 * m - 1) as f64 * s;
        }
        legendre[m][m] = pmm;
        if m < order {
            legendre[m + 1][m] = x * (2 * m + 1) as f64 * pmm;
        }
        for l in (m + 2)..=order {
            legendre[l][m] = ((2 * l - 1) as f64 * x * legendre[l - 1][m]
                - (l + m - 1) as f64 * legendre[l - 2][m])
                / (l - m) as f64;
        }
    }

    for n in 0..=order {
        for m in -(n as i32)..=(n as i32) {
            let am = m.unsigned_abs() as usize;
            // (n-|m|)! / (n+|m|)!
            let mut ratio = 1.0;
            for k in (n - am + 1)..=(n + am) {
                ratio /= k as f64;
            }
            let delta = if m == 0 { 1.0 } else { 2.0 };
            let norm = ((2 * n + 1) as f64 * delta * ratio).sqrt();
            let angular = if m >= 0 {
                (m as f64 * azimuth).cos()
            } else {
                (am as f64 * azimuth).sin()
            };
            out[acn_index(n as i32, m)] = norm * legendre[n][am] * angular;
        }
    }
}

/// Max-rE weights per order for a given maximum order
pub fn max_re_weights(order: usize) -> Vec<f64> {
    let angle = (137.9f64 / (order as f64 + 1.51)).to_radians();
    let mut weights = vec![0.0; order + 1];
    legendre_polynomials(angle.cos(), &mut weights);
    weights
}
