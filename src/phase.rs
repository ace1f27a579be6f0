//! The lifecycle phases of a [`LifecycleGuard`](crate::LifecycleGuard)

/// Current phase of a guard.
///
/// The phase is stored in the guard as an `AtomicU8` and only ever changes by
/// `compare_exchange` from the exact phase that was observed, so for every
/// transition there is exactly one winning thread.
///
/// ## State transition diagram
///
/// ```text
/// ┌────────────┐  start()   ┌────────┐
/// │ NotStarted │───────────▶│ Active │
/// └────────────┘            └────────┘
///       │                        │ enter_dispose() [CAS winner]
///       │ enter_dispose()        ▼
///       │ [CAS winner]     ┌───────────┐  exit_dispose()  ┌──────────┐
///       └─────────────────▶│ Disposing │─────────────────▶│ Disposed │
///                          └───────────┘  [owner depth 0] └──────────┘
/// ```
///
/// Transitions are monotonic; `Disposed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Created with deferred start. Guarded operations are rejected until
    /// [`start`](crate::LifecycleGuard::start) is called, but disposal is allowed.
    NotStarted,
    /// Guarded operations run concurrently under the shared side of the lock.
    Active,
    /// One thread (the owner) has won the disposal race and holds, or is
    /// waiting for, the exclusive side of the lock. Only threads that already
    /// hold the lock may enter guarded operations.
    Disposing,
    /// Disposal has completed. Nothing may enter anymore.
    Disposed,
}

impl Phase {
    /// Convert Phase to u8.
    pub const fn into_u8(self) -> u8 {
        match self {
            Phase::NotStarted => 0,
            Phase::Active => 1,
            Phase::Disposing => 2,
            Phase::Disposed => 3,
        }
    }

    /// Convert u8 to Phase.
    ///
    /// Panics if the u8 value does not have a matching phase as
    /// returned by [`Self::into_u8`].
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Phase::NotStarted,
            1 => Phase::Active,
            2 => Phase::Disposing,
            3 => Phase::Disposed,
            _ => panic!("Invalid phase value"),
        }
    }

    /// `true` once the guard has left [`Phase::NotStarted`].
    pub const fn is_started(self) -> bool {
        !matches!(self, Phase::NotStarted)
    }

    /// `true` only in the terminal [`Phase::Disposed`].
    pub const fn is_disposed(self) -> bool {
        matches!(self, Phase::Disposed)
    }
}
