//! Per-phase handlers.
//!
//! Every [`Phase`] implements the same set of operations ([`Op`]) with its own
//! semantics. A handler either finishes the operation or asks the guard to
//! [`Flow::Redispatch`] it, which happens when the phase moved on underneath it
//! (a lost compare-exchange, or a shared acquisition that completed after the
//! guard left `Active`).

mod active;
mod disposed;
mod disposing;
mod not_started;

use mutex_traits::ScopedRawMutex;

use crate::{
    Phase,
    error::{Error, UsageError},
    guard::Core,
    logging::{debug, trace, warn},
};

/// The operations every phase handles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Op {
    Start,
    EnterMethod,
    ExitMethod,
    EnterDispose,
    ExitDispose,
}

/// What the guard should do after a handler returned successfully.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Flow {
    Done,
    Redispatch,
}

pub(crate) type Step = Result<Flow, Error>;

/// Hand `op` to the handler for `phase`.
pub(crate) fn handle<R: ScopedRawMutex>(core: &Core<R>, phase: Phase, op: Op) -> Step {
    match phase {
        Phase::NotStarted => not_started::handle(core, op),
        Phase::Active => active::handle(core, op),
        Phase::Disposing => disposing::handle(core, op),
        Phase::Disposed => disposed::handle(core, op),
    }
}

/// Release one level of the shared side. Shared by `Active` and `Disposing`.
fn exit_method<R: ScopedRawMutex>(core: &Core<R>) -> Step {
    let release_raw = core.threads.with_current(|record| {
        if record.shared == 0 {
            return None;
        }
        record.shared -= 1;
        // The owner never took the raw shared lock, it counts against its exclusive hold
        Some(record.shared == 0 && record.exclusive == 0)
    });

    match release_raw {
        None => {
            warn!("{}: exit_method without matching enter_method", core.owner);
            Err(core.usage(UsageError::MethodNotEntered))
        }
        Some(true) => {
            // SAFETY: `shared` just dropped to zero and this thread is not the
            // exclusive holder, so it took the raw shared lock exactly once in
            // `active::enter_method` and has not released it yet.
            unsafe { core.lock.unlock_shared() };
            trace!("{}: left last guarded method on this thread", core.owner);
            Ok(Flow::Done)
        }
        Some(false) => Ok(Flow::Done),
    }
}

/// Win the transition from `from` into `Disposing` and take the exclusive side.
/// Shared by `NotStarted` and `Active`.
fn begin_dispose<R: ScopedRawMutex>(core: &Core<R>, from: Phase) -> Step {
    // Waiting for exclusive access while holding shared access would never return
    if core.threads.current().shared > 0 {
        warn!(
            "{}: enter_dispose called from inside a guarded method",
            core.owner
        );
        return Err(core.usage(UsageError::MethodNotExited));
    }

    if !core.transition(from, Phase::Disposing) {
        trace!("{}: lost the race to start disposal", core.owner);
        return Ok(Flow::Redispatch);
    }

    core.threads.with_current(|record| record.owner = true);
    debug!(
        "{}: disposal started, waiting for in-flight operations",
        core.owner
    );

    core.lock.lock_exclusive();
    core.threads.with_current(|record| record.exclusive = 1);
    debug!("{}: exclusive access acquired", core.owner);
    Ok(Flow::Done)
}
