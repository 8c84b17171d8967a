//! Pause control for debugger frontends.
//!
//! The executor polls [`PauseHandler::is_paused`] between instructions;
//! in-flight instructions always complete. Edge listeners fire on the thread
//! that called `pause`/`resume`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type Listener = Box<dyn Fn(bool) + Send>;

struct Inner {
    paused: AtomicBool,
    listeners: Mutex<Vec<Listener>>,
}

/// Shared pause flag with edge notifications.
#[derive(Clone)]
pub struct PauseHandler {
    inner: Arc<Inner>,
}

impl PauseHandler {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                paused: AtomicBool::new(false),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Request a pause at the next instruction boundary.
    pub fn pause(&self) {
        if !self.inner.paused.swap(true, Ordering::AcqRel) {
            self.notify(true);
        }
    }

    /// Resume execution. Resume is always explicit.
    pub fn resume(&self) {
        if self.inner.paused.swap(false, Ordering::AcqRel) {
            self.notify(false);
        }
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::Acquire)
    }

    /// Subscribe to pause (true) / resume (false) edges.
    pub fn subscribe<F: Fn(bool) + Send + 'static>(&self, listener: F) {
        self.inner
            .listeners
            .lock()
            .expect("pause listener lock poisoned")
            .push(Box::new(listener));
    }

    fn notify(&self, paused: bool) {
        let listeners = self
            .inner
            .listeners
            .lock()
            .expect("pause listener lock poisoned");
        for listener in listeners.iter() {
            listener(paused);
        }
    }
}

impl Default for PauseHandler {
    fn default() -> Self {
        Self::new()
    }
}
