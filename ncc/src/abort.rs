//! Cooperative cancellation.
//!
//! The engine polls an [`Aborter`] only at pass boundaries: between
//! comparison stages, between hash-code partitioning passes, and
//! before expanding each cell while flattening a netlist. A pass in
//! progress is never interrupted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Abort check provider.
///
/// Any `Fn() -> bool` closure can be used as an aborter.
pub trait Aborter: Send + Sync {
    /// Polled at pass boundaries. Returning true ends the
    /// comparison with an incomplete result.
    fn user_wants_to_abort(&self) -> bool;
}

impl<T> Aborter for T
where T: Fn() -> bool + Send + Sync {
    #[inline]
    fn user_wants_to_abort(&self) -> bool {
        self()
    }
}

/// An aborter that never aborts.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverAbort;

impl Aborter for NeverAbort {
    #[inline]
    fn user_wants_to_abort(&self) -> bool {
        false
    }
}

/// A shareable cancellation flag.
///
/// Clones share the same flag, so one clone can be handed to the
/// engine while another one is kept to cancel from elsewhere.
#[derive(Debug, Default, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    /// Request cancellation. Takes effect at the next pass boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl Aborter for CancelToken {
    #[inline]
    fn user_wants_to_abort(&self) -> bool {
        self.is_cancelled()
    }
}

#[test]
fn test_cancel_token_shared() {
    let token = CancelToken::new();
    let handed_out = token.clone();
    assert!(!handed_out.user_wants_to_abort());
    token.cancel();
    assert!(handed_out.user_wants_to_abort());
}
