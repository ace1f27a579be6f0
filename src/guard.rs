//! # Lifecycle Guard
//!
//! This implements the [`LifecycleGuard`] façade and the RAII scopes built on it.
//!
//! The façade holds no logic of its own: every call loads the current
//! [`Phase`] and hands the operation to that phase's handler, re-dispatching
//! for as long as the handler reports that the phase moved on underneath it.

use core::{
    fmt,
    marker::PhantomData,
    mem::ManuallyDrop,
    sync::atomic::{AtomicU8, Ordering},
};
use std::{sync::Arc, thread::ThreadId};

use maitake_sync::blocking::DefaultMutex;
use mutex_traits::{ConstInit, ScopedRawMutex};

use crate::{
    Phase,
    error::{Error, LifecycleViolation, UsageError},
    lock::SharedExclusiveLock,
    logging::{error, trace},
    states::{self, Flow, Op},
    threads::ThreadTable,
};

/// Coordinates guarded operations on a shared resource with its single disposal.
///
/// Many threads may run guarded operations concurrently, bracketed by
/// [`enter_method`](Self::enter_method) / [`exit_method`](Self::exit_method)
/// (or the [`method`](Self::method) scope). Exactly one thread wins the
/// disposal started by [`enter_dispose`](Self::enter_dispose); it waits until
/// every operation that started before it has left, and from then on new
/// callers fail immediately with [`Error::ResourceDisposed`] instead of
/// blocking.
///
/// The type parameter `R` selects the raw mutex protecting the per-thread
/// bookkeeping, allowing e.g. a critical-section based mutex instead of the
/// default one.
///
/// ```
/// # use lifecycle_guard::LifecycleGuard;
/// let guard = LifecycleGuard::new("Connection", true);
///
/// let answer = guard.run(|| 42).unwrap();
/// assert_eq!(answer, 42);
///
/// guard.dispose().unwrap();
/// assert!(guard.is_disposed());
/// assert!(guard.run(|| ()).unwrap_err().is_disposed());
/// ```
pub struct LifecycleGuard<R: ScopedRawMutex = DefaultMutex> {
    core: Core<R>,
}

/// State shared by all phase handlers of one guard.
pub(crate) struct Core<R: ScopedRawMutex> {
    /// Description of the guarded object, used in errors and log output
    pub(crate) owner: Arc<str>,
    /// The current [`Phase`], only ever changed by compare-exchange
    phase: AtomicU8,
    /// The one lock shared by `Active` and `Disposing`
    pub(crate) lock: SharedExclusiveLock,
    pub(crate) threads: ThreadTable<R>,
}

// --------------------------------------------------------------------------
// impl Core
// --------------------------------------------------------------------------

impl<R: ScopedRawMutex> Core<R> {
    pub(crate) fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Atomically move from exactly `from` to `to`. Returns `false` if the
    /// phase was no longer `from`.
    pub(crate) fn transition(&self, from: Phase, to: Phase) -> bool {
        self.phase
            .compare_exchange(
                from.into_u8(),
                to.into_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn disposed(&self) -> Error {
        Error::ResourceDisposed {
            owner: self.owner.clone(),
        }
    }

    pub(crate) fn violation(&self, violation: LifecycleViolation) -> Error {
        Error::Lifecycle {
            owner: self.owner.clone(),
            violation,
        }
    }

    pub(crate) fn usage(&self, misuse: UsageError) -> Error {
        Error::Usage {
            owner: self.owner.clone(),
            misuse,
        }
    }
}

// --------------------------------------------------------------------------
// impl LifecycleGuard
// --------------------------------------------------------------------------

impl LifecycleGuard {
    /// Create a guard using the default bookkeeping mutex.
    ///
    /// With `start_immediately` the guard begins in [`Phase::Active`],
    /// otherwise in [`Phase::NotStarted`] and [`start`](Self::start) must be
    /// called before guarded operations are accepted.
    pub fn new(owner: impl Into<Arc<str>>, start_immediately: bool) -> Self {
        Self::with_raw_mutex(owner, start_immediately, DefaultMutex::INIT)
    }

    /// Shorthand for `new(owner, true)`.
    pub fn new_started(owner: impl Into<Arc<str>>) -> Self {
        Self::new(owner, true)
    }

    /// Shorthand for `new(owner, false)`.
    pub fn new_unstarted(owner: impl Into<Arc<str>>) -> Self {
        Self::new(owner, false)
    }
}

impl<R: ScopedRawMutex> LifecycleGuard<R> {
    /// Create a guard whose bookkeeping is protected by the given raw mutex.
    ///
    /// ```
    /// # use lifecycle_guard::LifecycleGuard;
    /// use maitake_sync::blocking::DefaultMutex;
    /// use mutex_traits::ConstInit;
    ///
    /// let guard = LifecycleGuard::with_raw_mutex("Pool", false, DefaultMutex::INIT);
    /// assert!(!guard.is_started());
    /// ```
    pub fn with_raw_mutex(owner: impl Into<Arc<str>>, start_immediately: bool, raw: R) -> Self {
        let phase = if start_immediately {
            Phase::Active
        } else {
            Phase::NotStarted
        };
        Self {
            core: Core {
                owner: owner.into(),
                phase: AtomicU8::new(phase.into_u8()),
                lock: SharedExclusiveLock::new(),
                threads: ThreadTable::new_with_raw_mutex(raw),
            },
        }
    }

    /// Move a two-phase guard from [`Phase::NotStarted`] to [`Phase::Active`].
    ///
    /// Fails with [`LifecycleViolation::AlreadyStarted`] if the guard is
    /// running, or [`LifecycleViolation::Disposed`] once disposal has begun.
    pub fn start(&self) -> Result<(), Error> {
        self.dispatch(Op::Start)
    }

    /// Enter a guarded operation on the calling thread.
    ///
    /// While [`Phase::Active`] this blocks only while a disposing thread holds
    /// exclusive access (and then fails). Calls may nest on one thread. Every
    /// successful call MUST be matched by [`exit_method`](Self::exit_method) on
    /// the same thread; prefer [`method`](Self::method) which does this on drop.
    pub fn enter_method(&self) -> Result<(), Error> {
        self.dispatch(Op::EnterMethod)
    }

    /// Leave a guarded operation entered with [`enter_method`](Self::enter_method).
    pub fn exit_method(&self) -> Result<(), Error> {
        self.dispatch(Op::ExitMethod)
    }

    /// Begin disposal.
    ///
    /// The first caller becomes the owner: it blocks until all guarded
    /// operations that were already running have left, then returns with
    /// exclusive access. The owner may call `enter_dispose` again (nesting)
    /// and may run guarded operations before its matching
    /// [`exit_dispose`](Self::exit_dispose). Other threads return at once.
    ///
    /// MUST NOT be called from inside a guarded operation of the same guard.
    /// Before disposal has begun this is reported as
    /// [`UsageError::MethodNotExited`] and the phase is left untouched.
    pub fn enter_dispose(&self) -> Result<(), Error> {
        self.dispatch(Op::EnterDispose)
    }

    /// End disposal. When the owner's last nested `exit_dispose` returns,
    /// the guard is [`Phase::Disposed`].
    pub fn exit_dispose(&self) -> Result<(), Error> {
        self.dispatch(Op::ExitDispose)
    }

    /// `true` once the guard has left [`Phase::NotStarted`].
    pub fn is_started(&self) -> bool {
        self.core.phase().is_started()
    }

    /// `true` once disposal has completed.
    pub fn is_disposed(&self) -> bool {
        self.core.phase().is_disposed()
    }

    /// The current phase. Only a snapshot; it may change right after.
    pub fn phase(&self) -> Phase {
        self.core.phase()
    }

    /// The owner description given at construction.
    pub fn owner(&self) -> &str {
        &self.core.owner
    }

    /// The thread currently running the disposal, if one is in progress.
    pub fn disposing_thread(&self) -> Option<ThreadId> {
        self.core.threads.owner()
    }

    /// Enter a guarded operation that is exited when the returned scope drops.
    pub fn method(&self) -> Result<MethodScope<'_, R>, Error> {
        self.enter_method()?;
        Ok(MethodScope {
            guard: self,
            _not_send: PhantomData,
        })
    }

    /// Enter disposal; disposal is exited when the returned scope drops.
    pub fn dispose_scope(&self) -> Result<DisposeScope<'_, R>, Error> {
        self.enter_dispose()?;
        let record = self.core.threads.current();
        Ok(DisposeScope {
            guard: self,
            outermost: record.owner && record.exclusive == 1,
            _not_send: PhantomData,
        })
    }

    /// Run `op` as a guarded operation.
    pub fn run<T>(&self, op: impl FnOnce() -> T) -> Result<T, Error> {
        let _scope = self.method()?;
        Ok(op())
    }

    /// The conventional single dispose call: `enter_dispose` immediately
    /// followed by `exit_dispose`.
    pub fn dispose(&self) -> Result<(), Error> {
        self.enter_dispose()?;
        self.exit_dispose()
    }

    /// Dispose, running `teardown` with exclusive access.
    ///
    /// `teardown` only runs for the call that actually performs the disposal,
    /// which is the outermost dispose on the owning thread. Redundant calls
    /// (from other threads, nested calls on the owner, or after disposal has
    /// completed) return `Ok(None)` without running it.
    ///
    /// The dispose pair is balanced even if `teardown` fails or panics. A
    /// teardown error takes precedence over an error from exiting.
    pub fn dispose_with<T, E>(&self, teardown: impl FnOnce() -> Result<T, E>) -> Result<Option<T>, E>
    where
        E: From<Error>,
    {
        let scope = self.dispose_scope()?;
        let out = if scope.is_outermost() {
            teardown().map(Some)
        } else {
            Ok(None)
        };
        let exited = scope.exit();
        let value = out?;
        exited?;
        Ok(value)
    }

    fn dispatch(&self, op: Op) -> Result<(), Error> {
        loop {
            let phase = self.core.phase();
            match states::handle(&self.core, phase, op)? {
                Flow::Done => return Ok(()),
                Flow::Redispatch => {
                    trace!("{}: {:?} re-dispatched after {:?}", self.core.owner, op, phase)
                }
            }
        }
    }
}

impl<R: ScopedRawMutex> fmt::Debug for LifecycleGuard<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleGuard")
            .field("owner", &self.core.owner)
            .field("phase", &self.core.phase())
            .field("locked", &self.core.lock.is_locked())
            .field("threads_inside", &self.core.threads.active_threads())
            .finish()
    }
}

// --------------------------------------------------------------------------
// Scopes
// --------------------------------------------------------------------------

/// An entered guarded operation, exited on drop.
///
/// Not `Send`: it must be released on the thread that entered it.
#[must_use = "the guarded operation is exited as soon as the scope is dropped"]
pub struct MethodScope<'a, R: ScopedRawMutex = DefaultMutex> {
    guard: &'a LifecycleGuard<R>,
    _not_send: PhantomData<*const ()>,
}

impl<R: ScopedRawMutex> MethodScope<'_, R> {
    /// Exit now, returning the error instead of logging it.
    pub fn exit(self) -> Result<(), Error> {
        let this = ManuallyDrop::new(self);
        this.guard.exit_method()
    }
}

impl<R: ScopedRawMutex> Drop for MethodScope<'_, R> {
    fn drop(&mut self) {
        if let Err(e) = self.guard.exit_method() {
            error!("{}: failed to exit guarded method: {}", self.guard.owner(), e);
        }
    }
}

/// An entered disposal, exited on drop.
///
/// Not `Send`: it must be released on the thread that entered it.
#[must_use = "disposal is exited as soon as the scope is dropped"]
pub struct DisposeScope<'a, R: ScopedRawMutex = DefaultMutex> {
    guard: &'a LifecycleGuard<R>,
    outermost: bool,
    _not_send: PhantomData<*const ()>,
}

impl<R: ScopedRawMutex> DisposeScope<'_, R> {
    /// `true` if this scope is the outermost dispose of the owning thread,
    /// i.e. the one that should run the actual teardown.
    pub fn is_outermost(&self) -> bool {
        self.outermost
    }

    /// Exit now, returning the error instead of logging it.
    pub fn exit(self) -> Result<(), Error> {
        let this = ManuallyDrop::new(self);
        this.guard.exit_dispose()
    }
}

impl<R: ScopedRawMutex> Drop for DisposeScope<'_, R> {
    fn drop(&mut self) {
        if let Err(e) = self.guard.exit_dispose() {
            error!("{}: failed to exit dispose: {}", self.guard.owner(), e);
        }
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use test_log::test;

    #[test]
    fn two_phase_start() {
        let guard = LifecycleGuard::new_unstarted("Widget");
        assert_eq!(guard.phase(), Phase::NotStarted);
        assert!(!guard.is_started());

        let err = guard.enter_method().unwrap_err();
        assert_eq!(err.lifecycle(), Some(LifecycleViolation::NotStarted));
        let err = guard.exit_method().unwrap_err();
        assert_eq!(err.lifecycle(), Some(LifecycleViolation::NotStarted));

        guard.start().unwrap();
        assert!(guard.is_started());
        guard.enter_method().unwrap();
        guard.exit_method().unwrap();

        let err = guard.start().unwrap_err();
        assert_eq!(err.lifecycle(), Some(LifecycleViolation::AlreadyStarted));
    }

    #[test]
    fn start_after_dispose_fails() {
        let guard = LifecycleGuard::new_unstarted("Widget");
        guard.enter_dispose().unwrap();
        assert_eq!(
            guard.start().unwrap_err().lifecycle(),
            Some(LifecycleViolation::Disposed)
        );
        guard.exit_dispose().unwrap();
        assert_eq!(
            guard.start().unwrap_err().lifecycle(),
            Some(LifecycleViolation::Disposed)
        );
        assert!(guard.is_disposed());
        assert!(guard.is_started());
    }

    #[test]
    fn nested_methods_balance() {
        let guard = LifecycleGuard::new_started("Widget");
        guard.enter_method().unwrap();
        guard.enter_method().unwrap();
        assert_eq!(guard.core.threads.current().shared, 2);
        guard.exit_method().unwrap();
        guard.exit_method().unwrap();
        assert!(!guard.core.lock.is_locked());
        assert_eq!(
            guard.exit_method().unwrap_err().usage(),
            Some(UsageError::MethodNotEntered)
        );
    }

    #[test]
    fn exit_dispose_without_enter() {
        let guard = LifecycleGuard::new_started("Widget");
        assert_eq!(
            guard.exit_dispose().unwrap_err().usage(),
            Some(UsageError::DisposeNotEntered)
        );
        assert_eq!(guard.phase(), Phase::Active);
    }

    #[test]
    fn dispose_from_inside_method_is_refused() {
        let guard = LifecycleGuard::new_started("Widget");
        let scope = guard.method().unwrap();
        assert_eq!(
            guard.enter_dispose().unwrap_err().usage(),
            Some(UsageError::MethodNotExited)
        );
        // The phase was left alone
        assert_eq!(guard.phase(), Phase::Active);
        scope.exit().unwrap();
        guard.dispose().unwrap();
        assert!(guard.is_disposed());
    }

    #[test]
    fn owner_reenters_methods_while_disposing() {
        let guard = LifecycleGuard::new_started("Widget");
        guard.enter_dispose().unwrap();
        assert_eq!(guard.phase(), Phase::Disposing);
        assert_eq!(guard.disposing_thread(), Some(std::thread::current().id()));

        guard.enter_method().unwrap();
        // Still inside a method
        assert_eq!(
            guard.exit_dispose().unwrap_err().usage(),
            Some(UsageError::MethodNotExited)
        );
        guard.exit_method().unwrap();

        guard.exit_dispose().unwrap();
        assert!(guard.is_disposed());
        assert_eq!(guard.disposing_thread(), None);
        assert!(!guard.core.lock.is_locked());
    }

    #[test]
    fn nested_dispose_completes_on_last_exit() {
        const DEPTH: usize = 4;
        let guard = LifecycleGuard::new_started("Widget");
        for _ in 0..DEPTH {
            guard.enter_dispose().unwrap();
        }
        for i in 0..DEPTH {
            assert!(!guard.is_disposed(), "disposed early at exit {i}");
            guard.exit_dispose().unwrap();
        }
        assert!(guard.is_disposed());
        assert_eq!(guard.core.threads.active_threads(), 0);
    }

    #[test]
    fn disposed_is_terminal_and_idempotent() {
        let guard = LifecycleGuard::new_started("Widget");
        guard.dispose().unwrap();

        assert!(guard.enter_method().unwrap_err().is_disposed());
        assert_eq!(
            guard.exit_method().unwrap_err().usage(),
            Some(UsageError::MethodNotEntered)
        );

        guard.dispose().unwrap();
        guard.enter_dispose().unwrap();
        guard.enter_dispose().unwrap();
        guard.exit_dispose().unwrap();
        guard.exit_dispose().unwrap();
        assert_eq!(
            guard.exit_dispose().unwrap_err().usage(),
            Some(UsageError::DisposeNotEntered)
        );
        assert_eq!(guard.phase(), Phase::Disposed);
    }

    #[test]
    fn dispose_with_runs_teardown_once() {
        let guard = LifecycleGuard::new_started("Widget");
        let mut runs = 0;

        let out: Result<Option<()>, Error> = guard.dispose_with(|| {
            runs += 1;
            // Nested dispose from inside the teardown does not re-run it
            let nested: Result<Option<()>, Error> = guard.dispose_with(|| unreachable!());
            assert_eq!(nested.unwrap(), None);
            guard.run(|| ()).unwrap();
            Ok(())
        });
        assert_eq!(out.unwrap(), Some(()));
        assert_eq!(runs, 1);
        assert!(guard.is_disposed());

        let again: Result<Option<()>, Error> = guard.dispose_with(|| unreachable!());
        assert_eq!(again.unwrap(), None);
    }

    #[test]
    fn dispose_with_balances_on_teardown_error() {
        #[derive(Debug)]
        #[allow(dead_code)]
        enum TeardownError {
            Guard(Error),
            Io,
        }
        impl From<Error> for TeardownError {
            fn from(e: Error) -> Self {
                Self::Guard(e)
            }
        }

        let guard = LifecycleGuard::new_started("Widget");
        let out: Result<Option<()>, TeardownError> = guard.dispose_with(|| Err(TeardownError::Io));
        assert!(matches!(out, Err(TeardownError::Io)));
        assert!(guard.is_disposed());
        assert_eq!(guard.core.threads.active_threads(), 0);
    }

    #[test]
    fn scopes_release_on_drop() {
        let guard = LifecycleGuard::new_started("Widget");
        {
            let _outer = guard.method().unwrap();
            let _inner = guard.method().unwrap();
            assert!(guard.core.lock.is_locked());
        }
        assert!(!guard.core.lock.is_locked());

        {
            let scope = guard.dispose_scope().unwrap();
            assert!(scope.is_outermost());
            assert!(!guard.is_disposed());
        }
        assert!(guard.is_disposed());
    }

    #[test]
    fn debug_output() {
        let guard = LifecycleGuard::new_started("Widget");
        let s = format!("{guard:?}");
        assert!(s.contains("Widget"));
        assert!(s.contains("Active"));
    }
}
