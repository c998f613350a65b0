use crate::decode::Decoder;
use crate::hardware::session::SessionStats;
use crate::hardware::DeviceFilter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Delay before rescanning after a failed or finished session
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Everything the session thread and the renderer share for the lifetime of
/// the process. Cloning is cheap; all clones refer to the same state.
#[derive(Clone)]
pub struct ScopeContext {
    pub filter: DeviceFilter,
    pub backoff: Duration,
    /// Capture state and the only path that writes to it
    pub decoder: Decoder,
    pub stats: Arc<SessionStats>,
    running: Arc<AtomicBool>,
}

impl ScopeContext {
    pub fn new(filter: DeviceFilter, backoff: Duration) -> Self {
        Self {
            filter,
            backoff,
            decoder: Decoder::new(),
            stats: Arc::new(SessionStats::default()),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask every loop holding this context to stop at its next check
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Handler for SIGINT: clears the running flag so the render loop saves
    /// its settings and exits on its next iteration
    pub fn interrupt_handler(&self) -> impl FnMut() + Send + 'static {
        let ctx = self.clone();
        move || {
            if ctx.is_running() {
                info!("Interrupted, shutting down");
            }
            ctx.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_is_shared() {
        let filter = DeviceFilter { vendor_id: 1, product_id: 2, subclass: 3 };
        let ctx = ScopeContext::new(filter, DEFAULT_BACKOFF);
        let other = ctx.clone();
        assert!(other.is_running());
        ctx.shutdown();
        assert!(!other.is_running());
    }

    #[test]
    fn test_interrupt_handler_stops_session() {
        use crate::hardware::mock::MockUsbHost;
        use crate::hardware::spawn_session;

        let filter = DeviceFilter { vendor_id: 1, product_id: 2, subclass: 3 };
        let ctx = ScopeContext::new(filter, Duration::from_millis(1));
        let session = spawn_session(MockUsbHost::new(), ctx.clone()).unwrap();

        let mut handler = ctx.interrupt_handler();
        std::thread::spawn(move || handler()).join().unwrap();

        assert!(!ctx.is_running());
        session.join().unwrap();
    }
}
