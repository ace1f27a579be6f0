//! Handlers for [`Phase::Active`]

use mutex_traits::ScopedRawMutex;

use super::{Flow, Op, Step, begin_dispose, exit_method};
use crate::{
    Phase,
    error::{LifecycleViolation, UsageError},
    guard::Core,
    logging::trace,
};

pub(super) fn handle<R: ScopedRawMutex>(core: &Core<R>, op: Op) -> Step {
    match op {
        Op::Start => Err(core.violation(LifecycleViolation::AlreadyStarted)),
        Op::EnterMethod => enter_method(core),
        Op::ExitMethod => exit_method(core),
        Op::EnterDispose => begin_dispose(core, Phase::Active),
        // Nothing was ever entered against this phase
        Op::ExitDispose => Err(core.usage(UsageError::DisposeNotEntered)),
    }
}

fn enter_method<R: ScopedRawMutex>(core: &Core<R>) -> Step {
    // Nested guarded calls only bump the depth. Taking the raw lock a second
    // time could queue behind a waiting disposer that is waiting on us.
    let nested = core.threads.with_current(|record| {
        if record.holds_lock() {
            record.shared += 1;
            true
        } else {
            false
        }
    });
    if nested {
        return Ok(Flow::Done);
    }

    core.lock.lock_shared();

    // We may have been parked behind a disposer that won the race after we
    // looked at the phase. Late arrivals are rejected, not let in afterwards.
    if core.phase() != Phase::Active {
        // SAFETY: acquired right above and not recorded anywhere
        unsafe { core.lock.unlock_shared() };
        trace!("{}: phase changed while acquiring shared access", core.owner);
        return Ok(Flow::Redispatch);
    }

    core.threads.with_current(|record| record.shared += 1);
    trace!("{}: entered guarded method", core.owner);
    Ok(Flow::Done)
}
