use std::sync::atomic::{AtomicBool, Ordering};

/// Connection liveness shared by the gateway and its I/O threads.
#[derive(Debug)]
pub struct Link {
    open: AtomicBool,
    stopping: AtomicBool,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            open: AtomicBool::new(true),
            stopping: AtomicBool::new(false),
        }
    }
}

impl Link {
    pub fn new() -> Self {
        Self::default()
    }

    /// False once either I/O thread has exited.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// True once a local `stop()` has begun.
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.stopping.store(true, Ordering::Release);
    }
}
