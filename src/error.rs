//! Error types returned by the [`LifecycleGuard`](crate::LifecycleGuard)
use std::sync::Arc;

/// Unbalanced or misplaced enter/exit calls.
///
/// These are programming defects in the caller and are never retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UsageError {
    /// `exit_method` was called on a thread with no open `enter_method`.
    MethodNotEntered,
    /// A dispose call was made while this thread still had a guarded method open.
    MethodNotExited,
    /// `exit_dispose` was called on a thread with no open `enter_dispose`.
    DisposeNotEntered,
}

/// Misuse of the start/dispose lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleViolation {
    /// A guarded operation was attempted before `start` was called.
    NotStarted,
    /// `start` was called on a guard that is already running.
    AlreadyStarted,
    /// `start` was called on a guard whose disposal has already begun.
    Disposed,
}

/// General error returned by every guard operation
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Disposal has begun (or finished) and the calling thread is not allowed
    /// in anymore. Callers usually surface this as "object no longer usable".
    #[error("{owner}: resource has been disposed")]
    ResourceDisposed {
        /// Description of the guarded object
        owner: Arc<str>,
    },
    /// The operation is not legal in the current lifecycle phase.
    #[error("{owner}: lifecycle violation: {violation:?}")]
    Lifecycle {
        /// Description of the guarded object
        owner: Arc<str>,
        /// What exactly went wrong
        violation: LifecycleViolation,
    },
    /// Enter/exit calls were not balanced on the calling thread.
    #[error("{owner}: usage error: {misuse:?}")]
    Usage {
        /// Description of the guarded object
        owner: Arc<str>,
        /// Which pairing rule was broken
        misuse: UsageError,
    },
}

impl Error {
    /// Returns `true` for [`Error::ResourceDisposed`].
    pub fn is_disposed(&self) -> bool {
        matches!(self, Error::ResourceDisposed { .. })
    }

    /// Returns the usage error, if this is one.
    pub fn usage(&self) -> Option<UsageError> {
        match self {
            Error::Usage { misuse, .. } => Some(*misuse),
            _ => None,
        }
    }

    /// Returns the lifecycle violation, if this is one.
    pub fn lifecycle(&self) -> Option<LifecycleViolation> {
        match self {
            Error::Lifecycle { violation, .. } => Some(*violation),
            _ => None,
        }
    }

    /// The owner description of the guard that produced this error.
    pub fn owner(&self) -> &str {
        match self {
            Error::ResourceDisposed { owner }
            | Error::Lifecycle { owner, .. }
            | Error::Usage { owner, .. } => owner,
        }
    }
}
