//! Outstanding-response gate.
//!
//! A counting gate of capacity one: at most one low-priority request/response
//! exchange is in flight. The transmitter acquires it when it sends a
//! low-priority packet; the receiver releases it when a RESPONSE arrives; the
//! transmitter releases it itself when an exchange is given up. Acquire and
//! release are single compare-exchange operations, so a release racing a
//! timeout succeeds exactly once.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct ResponseGate {
    held: AtomicBool,
}

impl ResponseGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the permit; `false` if an exchange is already outstanding.
    pub fn try_acquire(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Return the permit; `false` if it was not held.
    pub fn release(&self) -> bool {
        self.held
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Permits available (0 or 1).
    pub fn available(&self) -> usize {
        usize::from(!self.is_held())
    }
}
