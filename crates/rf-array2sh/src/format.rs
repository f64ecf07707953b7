//! Output formatting: frequency gate, channel ordering, normalization
//!
//! The encoder works internally in ACN/N3D. Once per block the active
//! ordering and normalization are resolved into an [`OutputFormat`], a
//! per-output-channel routing table (source SH channel + divisor), so the
//! per-sample loop never branches on the format.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Array2ShError, Array2ShResult};
use crate::sh::order_of_channel;
use crate::{MAX_NUM_SH_SIGNALS, NUM_BANDS};

/// Output channel ordering convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChannelOrdering {
    /// Ambisonic Channel Number
    #[default]
    Acn,
    /// Furse-Malham (W, X, Y, Z), first order only
    FuMa,
}

/// Output normalization convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Normalization {
    /// Full 3D normalization
    N3D,
    /// Schmidt semi-normalized
    #[default]
    SN3D,
    /// Furse-Malham (maxN), first order only
    FuMa,
}

impl ChannelOrdering {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::FuMa,
            _ => Self::Acn,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Acn => "acn",
            Self::FuMa => "fuma",
        }
    }
}

impl Normalization {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::N3D,
            2 => Self::FuMa,
            _ => Self::SN3D,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::N3D => "n3d",
            Self::SN3D => "sn3d",
            Self::FuMa => "fuma",
        }
    }
}

impl fmt::Display for ChannelOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Normalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelOrdering {
    type Err = Array2ShError;

    fn from_str(s: &str) -> Array2ShResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "acn" => Ok(Self::Acn),
            "fuma" => Ok(Self::FuMa),
            _ => Err(Array2ShError::UnknownVariant {
                kind: "channel ordering",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for Normalization {
    type Err = Array2ShError;

    fn from_str(s: &str) -> Array2ShResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "n3d" => Ok(Self::N3D),
            "sn3d" => Ok(Self::SN3D),
            "fuma" | "maxn" => Ok(Self::FuMa),
            _ => Err(Array2ShError::UnknownVariant {
                kind: "normalization",
                value: s.to_string(),
            }),
        }
    }
}

/// FuMa output slot -> ACN source channel (W, X, Y, Z)
const FUMA_SOURCES: [usize; 4] = [0, 3, 1, 2];

#[derive(Debug, Clone, Copy)]
struct Route {
    source: Option<usize>,
    divisor: f32,
}

const SILENT: Route = Route {
    source: None,
    divisor: 1.0,
};

/// Resolved output routing for one block
#[derive(Debug, Clone)]
pub struct OutputFormat {
    routes: [Route; MAX_NUM_SH_SIGNALS],
}

impl OutputFormat {
    /// Resolve ordering and normalization for the current block.
    ///
    /// Output channels at or above `min(n_sh, num_outputs)` are silent.
    /// FuMa ordering or normalization silence their channels unless
    /// `order == 1` and at least four outputs are available.
    pub fn resolve(
        ordering: ChannelOrdering,
        normalization: Normalization,
        order: usize,
        n_sh: usize,
        num_outputs: usize,
    ) -> Self {
        let mut routes = [SILENT; MAX_NUM_SH_SIGNALS];
        let active = n_sh.min(num_outputs).min(MAX_NUM_SH_SIGNALS);
        let first_order_quad = order == 1 && num_outputs >= 4;

        for (out, route) in routes.iter_mut().enumerate().take(active) {
            let source = match ordering {
                ChannelOrdering::Acn => Some(out),
                ChannelOrdering::FuMa if first_order_quad => FUMA_SOURCES.get(out).copied(),
                ChannelOrdering::FuMa => None,
            };
            let divisor = match normalization {
                Normalization::N3D => Some(1.0),
                Normalization::SN3D => Some(((2 * order_of_channel(out) + 1) as f32).sqrt()),
                Normalization::FuMa if first_order_quad => {
                    Some(if out == 0 { 2f32.sqrt() } else { 3f32.sqrt() })
                }
                Normalization::FuMa => None,
            };

            if let (Some(source), Some(divisor)) = (source, divisor) {
                *route = Route {
                    source: Some(source),
                    divisor,
                };
            }
        }
        Self { routes }
    }

    /// Source SH channel feeding an output channel, `None` if silent
    pub fn source(&self, output: usize) -> Option<usize> {
        self.routes.get(output).and_then(|r| r.source)
    }

    /// Divisor applied to an output channel
    pub fn divisor(&self, output: usize) -> f32 {
        self.routes.get(output).map_or(1.0, |r| r.divisor)
    }

    /// Write one hop of ACN/N3D time signals into the host outputs at `offset`
    pub fn write_hop(&self, hop: &[Vec<f32>], outputs: &mut [&mut [f32]], offset: usize) {
        for (out, channel) in outputs.iter_mut().enumerate() {
            let route = self.routes.get(out).copied().unwrap_or(SILENT);
            let source = route.source.and_then(|s| hop.get(s));
            let Some(dst) = channel.get_mut(offset..) else {
                continue;
            };
            match source {
                Some(src) => {
                    for (d, &s) in dst.iter_mut().zip(src.iter()) {
                        *d = s / route.divisor;
                    }
                }
                None => {
                    let len = hop.first().map_or(crate::HOP_SIZE, Vec::len).min(dst.len());
                    dst[..len].fill(0.0);
                }
            }
        }
    }
}

/// Per-band gain: post gain below the cutoff, zero at or above it
#[derive(Debug, Clone)]
pub struct FrequencyGate {
    gains: [f32; NUM_BANDS],
}

impl FrequencyGate {
    pub fn resolve(freq_vector: &[f32], max_freq: f32, gain_db: f32) -> Self {
        let gain_lin = 10f32.powf(gain_db / 20.0);
        let mut gains = [0.0; NUM_BANDS];
        for (g, &f) in gains.iter_mut().zip(freq_vector) {
            *g = if f < max_freq { gain_lin } else { 0.0 };
        }
        Self { gains }
    }

    #[inline]
    pub fn gain(&self, band: usize) -> f32 {
        self.gains.get(band).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_acn_sn3d_divisors() {
        let fmt = OutputFormat::resolve(ChannelOrdering::Acn, Normalization::SN3D, 3, 16, 16);
        for ch in 0..16 {
            assert_eq!(fmt.source(ch), Some(ch));
            let n = order_of_channel(ch) as f32;
            assert_relative_eq!(fmt.divisor(ch), (2.0 * n + 1.0).sqrt());
        }
    }

    #[test]
    fn test_channels_beyond_active_are_silent() {
        let fmt = OutputFormat::resolve(ChannelOrdering::Acn, Normalization::N3D, 1, 4, 9);
        assert_eq!(fmt.source(3), Some(3));
        for ch in 4..9 {
            assert_eq!(fmt.source(ch), None);
        }
        let fmt = OutputFormat::resolve(ChannelOrdering::Acn, Normalization::N3D, 2, 9, 2);
        assert_eq!(fmt.source(1), Some(1));
        assert_eq!(fmt.source(2), None);
    }

    #[test]
    fn test_fuma_routing() {
        let fmt = OutputFormat::resolve(ChannelOrdering::FuMa, Normalization::FuMa, 1, 4, 4);
        assert_eq!(fmt.source(0), Some(0));
        assert_eq!(fmt.source(1), Some(3));
        assert_eq!(fmt.source(2), Some(1));
        assert_eq!(fmt.source(3), Some(2));
        assert_relative_eq!(fmt.divisor(0), 2f32.sqrt());
        assert_relative_eq!(fmt.divisor(2), 3f32.sqrt());
    }

    #[test]
    fn test_fuma_needs_four_outputs() {
        let fmt = OutputFormat::resolve(ChannelOrdering::FuMa, Normalization::SN3D, 1, 4, 3);
        assert!((0..3).all(|ch| fmt.source(ch).is_none()));
        let fmt = OutputFormat::resolve(ChannelOrdering::Acn, Normalization::FuMa, 1, 4, 2);
        assert!((0..2).all(|ch| fmt.source(ch).is_none()));
        let fmt = OutputFormat::resolve(ChannelOrdering::Acn, Normalization::FuMa, 2, 9, 9);
        assert!((0..9).all(|ch| fmt.source(ch).is_none()));
    }

    #[test]
    fn test_write_hop() {
        let hop: Vec<Vec<f32>> = (0..4).map(|ch| vec![ch as f32 + 1.0; 8]).collect();
        let mut a = vec![9.0; 16];
        let mut b = vec![9.0; 16];
        let mut c = vec![9.0; 16];
        let mut outputs: Vec<&mut [f32]> = vec![&mut a, &mut b, &mut c];

        let fmt = OutputFormat::resolve(ChannelOrdering::Acn, Normalization::N3D, 1, 2, 3);
        fmt.write_hop(&hop, &mut outputs, 8);

        assert_eq!(outputs[0][8], 1.0);
        assert_eq!(outputs[1][15], 2.0);
        assert_eq!(outputs[2][8], 0.0);
        assert_eq!(outputs[0][0], 9.0);
    }

    #[test]
    fn test_frequency_gate() {
        let freqs: Vec<f32> = (0..NUM_BANDS).map(|b| b as f32 * 187.5).collect();
        let gate = FrequencyGate::resolve(&freqs, 1000.0, 6.0);
        assert_relative_eq!(gate.gain(5), 10f32.powf(0.3), max_relative = 1e-6);
        assert_eq!(gate.gain(6), 0.0);
        assert_eq!(gate.gain(NUM_BANDS - 1), 0.0);
    }
}
