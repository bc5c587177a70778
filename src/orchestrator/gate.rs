//! Bounded admission for concurrent spawns.

use std::sync::{Condvar, Mutex, MutexGuard};

/// Counting gate limiting how many spawns are in flight at once. Acquiring
/// past the limit blocks until a permit is released.
pub struct AdmissionGate {
    permits: Mutex<usize>,
    available: Condvar,
}

impl AdmissionGate {
    pub fn new(limit: usize) -> Self {
        Self {
            permits: Mutex::new(limit.max(1)),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.permits.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block until a permit is free. The permit is released on drop.
    pub fn acquire(&self) -> Permit<'_> {
        let mut permits = self.lock();
        while *permits == 0 {
            permits = self
                .available
                .wait(permits)
                .unwrap_or_else(|e| e.into_inner());
        }
        *permits -= 1;
        Permit { gate: self }
    }

    pub fn available_permits(&self) -> usize {
        *self.lock()
    }
}

pub struct Permit<'a> {
    gate: &'a AdmissionGate,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        let mut permits = self.gate.lock();
        *permits += 1;
        self.gate.available.notify_one();
    }
}
