//! Per-thread bookkeeping for a single guard.
//!
//! Every thread that is somewhere between an enter and its matching exit has a
//! [`ThreadRecord`] in the guard's [`ThreadTable`]. Records are dropped from the
//! table as soon as they go back to all-zero, so the table only ever holds
//! threads that are currently "inside" the guard.

use std::collections::HashMap;
use std::thread::{self, ThreadId};

use maitake_sync::blocking::Mutex;
use mutex_traits::ScopedRawMutex;

/// What one thread currently holds on one guard.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct ThreadRecord {
    /// Unmatched `enter_method` calls. The raw shared lock is held (once) while
    /// this is non-zero, unless the thread also holds the exclusive side.
    pub(crate) shared: usize,
    /// Dispose nesting depth of the owning thread. The raw exclusive lock is
    /// held (once) while this is non-zero.
    pub(crate) exclusive: usize,
    /// This thread won the `Active -> Disposing` transition.
    pub(crate) owner: bool,
    /// `enter_dispose` calls that did not take part in the real disposal,
    /// either because another thread owns it or because it already finished.
    pub(crate) redundant: usize,
}

impl ThreadRecord {
    /// Whether this thread holds either side of the lock.
    pub(crate) fn holds_lock(&self) -> bool {
        self.shared > 0 || self.exclusive > 0
    }

    fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

/// Map from thread to [`ThreadRecord`], behind a blocking mutex.
///
/// The mutex is only ever held for the duration of a bookkeeping closure and
/// MUST NOT be held while blocking on the [`SharedExclusiveLock`](crate::lock::SharedExclusiveLock).
pub(crate) struct ThreadTable<R: ScopedRawMutex> {
    records: Mutex<HashMap<ThreadId, ThreadRecord>, R>,
}

impl<R: ScopedRawMutex> ThreadTable<R> {
    pub(crate) fn new_with_raw_mutex(raw: R) -> Self {
        Self {
            records: Mutex::new_with_raw_mutex(HashMap::new(), raw),
        }
    }

    /// Run `f` on the calling thread's record, storing the result back
    /// (or removing the record when it ends up idle).
    pub(crate) fn with_current<U>(&self, f: impl FnOnce(&mut ThreadRecord) -> U) -> U {
        let id = thread::current().id();
        self.records.with_lock(|records| {
            let mut record = records.get(&id).copied().unwrap_or_default();
            let out = f(&mut record);
            if record.is_idle() {
                records.remove(&id);
            } else {
                records.insert(id, record);
            }
            out
        })
    }

    /// A copy of the calling thread's record.
    pub(crate) fn current(&self) -> ThreadRecord {
        self.with_current(|record| *record)
    }

    /// The thread currently flagged as disposal owner, if any.
    pub(crate) fn owner(&self) -> Option<ThreadId> {
        self.records.with_lock(|records| {
            records
                .iter()
                .find_map(|(id, record)| record.owner.then_some(*id))
        })
    }

    /// Number of threads that currently hold anything on this guard.
    pub(crate) fn active_threads(&self) -> usize {
        self.records.with_lock(|records| records.len())
    }
}
