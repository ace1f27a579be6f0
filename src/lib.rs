//! # Lifecycle guard
//!
//! A concurrency primitive that lets many threads run operations against a
//! shared, disposable resource while guaranteeing that:
//!
//! 1. exactly one dispose sequence ever runs,
//! 2. the dispose sequence never overlaps with an in-flight operation, and
//! 3. once disposal has begun, new callers fail fast with
//!    [`Error::ResourceDisposed`] instead of blocking.
//!
//! The guard does not tear anything down itself. Objects owning a
//! [`LifecycleGuard`] bracket their operations with
//! [`enter_method`](LifecycleGuard::enter_method) /
//! [`exit_method`](LifecycleGuard::exit_method) and their teardown with
//! [`enter_dispose`](LifecycleGuard::enter_dispose) /
//! [`exit_dispose`](LifecycleGuard::exit_dispose), or use the scoped helpers
//! and the [`Disposable`] trait.
//!
//! ```
//! use lifecycle_guard::{LifecycleGuard, Phase};
//!
//! let guard = LifecycleGuard::new("Session", false);
//! assert!(guard.enter_method().is_err());
//!
//! guard.start().unwrap();
//! guard.enter_method().unwrap();
//! guard.exit_method().unwrap();
//!
//! guard.enter_dispose().unwrap();
//! assert_eq!(guard.phase(), Phase::Disposing);
//! guard.exit_dispose().unwrap();
//! assert!(guard.is_disposed());
//! ```
#![warn(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::undocumented_unsafe_blocks)]
#![allow(
    clippy::uninlined_format_args,
    reason = "Inlined variables are not seen by the no-op logging macros"
)]

pub mod error;

mod dispose;
mod guard;
mod lock;
mod phase;
mod states;
mod threads;

#[doc(inline)]
pub use dispose::Disposable;
#[doc(inline)]
pub use error::{Error, LifecycleViolation, UsageError};
#[doc(inline)]
pub use guard::{DisposeScope, LifecycleGuard, MethodScope};
#[doc(inline)]
pub use phase::Phase;

// re-export so users can name the bookkeeping mutex
pub use mutex_traits;

#[allow(unused)]
pub(crate) mod logging {
    #[cfg(feature = "log")]
    pub use log::*;

    /// No-op macros when the `log` feature is disabled
    #[cfg(not(feature = "log"))]
    macro_rules! trace {
        ($s:literal $(, $x:expr)* $(,)?) => {
            {
            let _ = ($( & $x ),*);
            }
        };
    }

    #[cfg(not(feature = "log"))]
    macro_rules! debug {
        ($s:literal $(, $x:expr)* $(,)?) => {
            {
            let _ = ($( & $x ),*);
            }
        };
    }

    #[cfg(not(feature = "log"))]
    macro_rules! info {
        ($s:literal $(, $x:expr)* $(,)?) => {
            {
            let _ = ($( & $x ),*);
            }
        };
    }

    #[cfg(not(feature = "log"))]
    macro_rules! log_warn {
        ($s:literal $(, $x:expr)* $(,)?) => {
            {
            let _ = ($( & $x ),*);
            }
        };
    }

    #[cfg(not(feature = "log"))]
    macro_rules! error {
        ($s:literal $(, $x:expr)* $(,)?) => {{
            let _ = ($( & $x ),*);
        }
        };
    }

    #[cfg(not(feature = "log"))]
    pub(crate) use {debug, error, info, log_warn as warn, trace};
}
