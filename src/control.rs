//! Signals the synchronizer sends to its hosting platform.

/// Lifecycle requests towards the host that runs the synchronizer.
///
/// All methods have default no-op implementations.
pub trait WorkerControl: Send + Sync {
    /// Asks the host to activate this worker without waiting for the
    /// previous worker's clients to go away.
    fn skip_waiting(&self) {}

    /// Asks the host to route every open client through this worker now.
    fn claim_clients(&self) {}
}

impl<T: WorkerControl + ?Sized> WorkerControl for std::sync::Arc<T> {
    fn skip_waiting(&self) {
        (**self).skip_waiting();
    }

    fn claim_clients(&self) {
        (**self).claim_clients();
    }
}

/// A control that ignores all signals, for hosts without a worker lifecycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct Detached;

impl WorkerControl for Detached {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Detached>();
        Detached.skip_waiting();
        Detached.claim_clients();
    }
}
