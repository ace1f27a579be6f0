//! The collaborator side of the guard.
//!
//! Objects that own a [`LifecycleGuard`] implement [`Disposable`] to get a
//! bracketed `dispose` and a helper for their guarded mutators.

use mutex_traits::ScopedRawMutex;

use crate::{LifecycleGuard, error::Error};

/// An object whose operations and teardown are sequenced by a [`LifecycleGuard`].
///
/// ```
/// use lifecycle_guard::{Disposable, Error, LifecycleGuard};
/// use maitake_sync::blocking::DefaultMutex;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// struct Counter {
///     guard: LifecycleGuard,
///     value: AtomicUsize,
/// }
///
/// impl Disposable for Counter {
///     type RawMutex = DefaultMutex;
///
///     fn lifecycle(&self) -> &LifecycleGuard {
///         &self.guard
///     }
///
///     fn teardown(&self) -> Result<(), Error> {
///         self.value.store(0, Ordering::Relaxed);
///         Ok(())
///     }
/// }
///
/// let counter = Counter {
///     guard: LifecycleGuard::new_started("Counter"),
///     value: AtomicUsize::new(0),
/// };
/// counter.guarded(|c| c.value.fetch_add(1, Ordering::Relaxed)).unwrap();
/// counter.dispose().unwrap();
/// assert!(counter.guarded(|_| ()).unwrap_err().is_disposed());
/// ```
pub trait Disposable {
    /// Raw mutex used by the guard's bookkeeping
    type RawMutex: ScopedRawMutex;

    /// The guard sequencing this object
    fn lifecycle(&self) -> &LifecycleGuard<Self::RawMutex>;

    /// Release the object's resources.
    ///
    /// Runs with exclusive access, at most once, on the thread that won the
    /// disposal. It may call guarded methods of `self` and dispose children
    /// that call back into `self`.
    fn teardown(&self) -> Result<(), Error>;

    /// Dispose the object. Safe to call any number of times, from any thread.
    ///
    /// If another thread is already running the teardown this returns right
    /// away, without waiting for it to finish.
    fn dispose(&self) -> Result<(), Error> {
        if self.lifecycle().is_disposed() {
            return Ok(());
        }
        self.lifecycle().dispose_with(|| self.teardown()).map(|_| ())
    }

    /// Whether [`dispose`](Self::dispose) has completed.
    fn is_disposed(&self) -> bool {
        self.lifecycle().is_disposed()
    }

    /// Run `op` on `self` as a guarded operation.
    fn guarded<T>(&self, op: impl FnOnce(&Self) -> T) -> Result<T, Error> {
        self.lifecycle().run(|| op(self))
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use maitake_sync::blocking::DefaultMutex;
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };
    use test_log::test;

    /// A parent that owns children; children call back into the parent while
    /// being disposed.
    struct Parent {
        guard: LifecycleGuard,
        children: Mutex<Vec<Arc<Child>>>,
        teardowns: AtomicUsize,
        notified: AtomicUsize,
    }

    struct Child {
        guard: LifecycleGuard,
        parent: Arc<Parent>,
    }

    impl Parent {
        fn child_gone(&self) -> Result<(), Error> {
            self.guarded(|p| p.notified.fetch_add(1, Ordering::Relaxed))
                .map(|_| ())
        }
    }

    impl Disposable for Parent {
        type RawMutex = DefaultMutex;

        fn lifecycle(&self) -> &LifecycleGuard {
            &self.guard
        }

        fn teardown(&self) -> Result<(), Error> {
            self.teardowns.fetch_add(1, Ordering::Relaxed);
            let children = core::mem::take(&mut *self.children.lock().unwrap());
            for child in children {
                child.dispose()?;
            }
            Ok(())
        }
    }

    impl Disposable for Child {
        type RawMutex = DefaultMutex;

        fn lifecycle(&self) -> &LifecycleGuard {
            &self.guard
        }

        fn teardown(&self) -> Result<(), Error> {
            self.parent.child_gone()?;
            // Re-entrant dispose of the parent is a no-op
            self.parent.dispose()
        }
    }

    #[test]
    fn container_disposes_children_that_call_back() {
        let parent = Arc::new(Parent {
            guard: LifecycleGuard::new_started("Parent"),
            children: Mutex::new(Vec::new()),
            teardowns: AtomicUsize::new(0),
            notified: AtomicUsize::new(0),
        });
        for i in 0..3 {
            let child = Arc::new(Child {
                guard: LifecycleGuard::new_started(format!("Child#{i}")),
                parent: parent.clone(),
            });
            parent.children.lock().unwrap().push(child);
        }

        parent.dispose().unwrap();
        assert!(parent.is_disposed());
        assert_eq!(parent.teardowns.load(Ordering::Relaxed), 1);
        assert_eq!(parent.notified.load(Ordering::Relaxed), 3);

        parent.dispose().unwrap();
        assert_eq!(parent.teardowns.load(Ordering::Relaxed), 1);
        assert!(parent.child_gone().unwrap_err().is_disposed());
    }
}
