//! The shared/exclusive lock sequenced by the guard.
//!
//! This is a thin wrapper around [`parking_lot::RawRwLock`]. It is raw (guard-less)
//! because the guard's acquire and release calls are separate API calls that
//! cannot carry a lock guard between them. Recursion is NOT handled here: the
//! guard tracks per-thread depths in its [`ThreadTable`](crate::threads::ThreadTable)
//! and makes sure each thread holds the raw lock at most once.
//!
//! parking_lot blocks new shared acquisitions as soon as an exclusive acquirer
//! is queued, so a disposing thread only waits for shared holders that got in
//! before it.

use parking_lot::{RawRwLock, lock_api::RawRwLock as _};

pub(crate) struct SharedExclusiveLock {
    raw: RawRwLock,
}

impl SharedExclusiveLock {
    pub(crate) const fn new() -> Self {
        Self {
            raw: <RawRwLock as parking_lot::lock_api::RawRwLock>::INIT,
        }
    }

    /// Blocks until the shared side is acquired.
    pub(crate) fn lock_shared(&self) {
        self.raw.lock_shared();
    }

    /// Releases one shared acquisition.
    ///
    /// # Safety
    ///
    /// The caller must have acquired the shared side with [`Self::lock_shared`]
    /// and not released it yet.
    pub(crate) unsafe fn unlock_shared(&self) {
        // SAFETY: forwarded to the caller
        unsafe { self.raw.unlock_shared() }
    }

    /// Blocks until every shared holder has left and the exclusive side is acquired.
    pub(crate) fn lock_exclusive(&self) {
        self.raw.lock_exclusive();
    }

    /// Releases the exclusive side.
    ///
    /// # Safety
    ///
    /// The caller must hold the exclusive side, acquired with [`Self::lock_exclusive`].
    pub(crate) unsafe fn unlock_exclusive(&self) {
        // SAFETY: forwarded to the caller
        unsafe { self.raw.unlock_exclusive() }
    }

    /// Whether anyone holds the lock, in either mode. Only used for diagnostics.
    pub(crate) fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;
    use test_log::test;

    #[test]
    fn shared_holders_coexist() {
        let lock = SharedExclusiveLock::new();
        lock.lock_shared();
        lock.lock_shared();
        assert!(lock.is_locked());
        // SAFETY: both acquisitions above are still held
        unsafe {
            lock.unlock_shared();
            lock.unlock_shared();
        }
        assert!(!lock.is_locked());
    }

    #[test]
    fn exclusive_waits_for_shared() {
        let lock = SharedExclusiveLock::new();
        let (tx, rx) = mpsc::channel();

        lock.lock_shared();
        thread::scope(|s| {
            s.spawn(|| {
                lock.lock_exclusive();
                tx.send(()).unwrap();
                // SAFETY: acquired right above
                unsafe { lock.unlock_exclusive() };
            });

            assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
            // SAFETY: acquired before the scope
            unsafe { lock.unlock_shared() };
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        });
        assert!(!lock.is_locked());
    }
}
