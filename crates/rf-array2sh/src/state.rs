//! Lock-free reinitialization flags and diagnostics publication
//!
//! - `ReinitFlag`: tri-state (Clean / Pending / InProgress) request flag
//! - `DiagnosticsBoard`: try-lock publication of curves from the reconciler,
//!   snapshot reads from the control side

use ndarray::Array2;
use parking_lot::Mutex;
use portable_atomic::{AtomicU8, Ordering};

use crate::{MAX_SH_ORDER, NUM_BANDS};

/// Reinitialization state of one configuration aspect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReinitState {
    /// Nothing to do
    Clean = 0,
    /// A change was requested and not yet applied
    Pending = 1,
    /// The reconciler is applying the change
    InProgress = 2,
}

impl ReinitState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Pending,
            2 => Self::InProgress,
            _ => Self::Clean,
        }
    }
}

/// Atomic tri-state reinit flag
///
/// The control side only ever calls [`request`](Self::request). The
/// reconciler moves `Pending -> InProgress` with [`begin`](Self::begin) and
/// `InProgress -> Clean` with [`finish`](Self::finish); a request that lands
/// in between survives as `Pending`.
#[derive(Debug)]
pub struct ReinitFlag(AtomicU8);

impl ReinitFlag {
    pub fn new(state: ReinitState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn state(&self) -> ReinitState {
        ReinitState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Mark as pending
    pub fn request(&self) {
        self.0.store(ReinitState::Pending as u8, Ordering::Release);
    }

    /// Claim a pending request; returns false if nothing is pending
    pub fn begin(&self) -> bool {
        self.0
            .compare_exchange(
                ReinitState::Pending as u8,
                ReinitState::InProgress as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Complete the claimed request.
    ///
    /// Returns false if a new request arrived while in progress, in which
    /// case the flag stays `Pending`.
    pub fn finish(&self) -> bool {
        self.0
            .compare_exchange(
                ReinitState::InProgress as u8,
                ReinitState::Clean as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn is_clean(&self) -> bool {
        self.state() == ReinitState::Clean
    }
}

impl Default for ReinitFlag {
    fn default() -> Self {
        Self::new(ReinitState::Pending)
    }
}

/// Per-order, per-band diagnostic curves
#[derive(Debug, Clone)]
pub struct Diagnostics {
    /// Band centre frequencies (Hz)
    pub freq_vector: Vec<f32>,
    /// Number of valid order rows (`order + 1`)
    pub num_orders: usize,
    /// Modal magnitude response (dB) `[band, order]`
    pub modal_db: Array2<f32>,
    /// Regularized inverse magnitude response (dB) `[band, order]`
    pub inverse_db: Array2<f32>,
    /// Spatial correlation `[band, order]`, 0..1
    pub spatial_correlation: Array2<f32>,
    /// Level difference (dB) `[band, order]`
    pub level_difference: Array2<f32>,
}

impl Diagnostics {
    pub fn new(freq_vector: Vec<f32>) -> Self {
        let shape = (NUM_BANDS, MAX_SH_ORDER + 1);
        Self {
            freq_vector,
            num_orders: 0,
            modal_db: Array2::zeros(shape),
            inverse_db: Array2::zeros(shape),
            spatial_correlation: Array2::zeros(shape),
            level_difference: Array2::zeros(shape),
        }
    }

    pub fn num_bands(&self) -> usize {
        self.freq_vector.len()
    }

    /// Copy all curves from `other` without reallocating
    pub fn copy_from(&mut self, other: &Diagnostics) {
        self.freq_vector.clone_from(&other.freq_vector);
        self.num_orders = other.num_orders;
        self.modal_db.assign(&other.modal_db);
        self.inverse_db.assign(&other.inverse_db);
        self.spatial_correlation.assign(&other.spatial_correlation);
        self.level_difference.assign(&other.level_difference);
    }
}

/// Shared, host-readable copy of the latest diagnostics
#[derive(Debug)]
pub struct DiagnosticsBoard {
    inner: Mutex<Diagnostics>,
}

impl DiagnosticsBoard {
    pub fn new(freq_vector: Vec<f32>) -> Self {
        Self {
            inner: Mutex::new(Diagnostics::new(freq_vector)),
        }
    }

    /// Publish without blocking; returns false if a reader holds the lock
    pub fn try_publish(&self, diagnostics: &Diagnostics) -> bool {
        match self.inner.try_lock() {
            Some(mut board) => {
                board.copy_from(diagnostics);
                true
            }
            None => false,
        }
    }

    /// Clone the current curves
    pub fn snapshot(&self) -> Diagnostics {
        self.inner.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_lifecycle() {
        let flag = ReinitFlag::new(ReinitState::Clean);
        assert!(!flag.begin());

        flag.request();
        assert_eq!(flag.state(), ReinitState::Pending);
        assert!(flag.begin());
        assert_eq!(flag.state(), ReinitState::InProgress);
        assert!(flag.finish());
        assert!(flag.is_clean());
    }

    #[test]
    fn test_request_during_progress_is_kept() {
        let flag = ReinitFlag::default();
        assert!(flag.begin());
        flag.request();
        assert!(!flag.finish());
        assert_eq!(flag.state(), ReinitState::Pending);
        assert!(flag.begin());
        assert!(flag.finish());
    }

    #[test]
    fn test_board_publication() {
        let board = DiagnosticsBoard::new(vec![0.0; NUM_BANDS]);
        let mut diag = Diagnostics::new(vec![1.0; NUM_BANDS]);
        diag.num_orders = 2;
        diag.spatial_correlation[[3, 1]] = 0.75;

        {
            let _reader = board.inner.lock();
            assert!(!board.try_publish(&diag));
        }
        assert!(board.try_publish(&diag));

        let snap = board.snapshot();
        assert_eq!(snap.num_orders, 2);
        assert_eq!(snap.spatial_correlation[[3, 1]], 0.75);
        assert_eq!(snap.freq_vector[0], 1.0);
    }
}
