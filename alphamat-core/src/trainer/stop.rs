use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// A cooperative stop request shared between the [`Trainer`](super::Trainer) and its caller.
///
/// Clones share the same flag. The trainer checks it at episode boundaries only,
/// so a running episode always completes.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Creates a lowered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` if the signal was raised.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Lowers the signal.
    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
