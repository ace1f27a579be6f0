//! Handlers for [`Phase::Disposing`]
//!
//! Exactly one thread, the owner, won the transition into this phase. It holds
//! (or is about to hold) the exclusive side of the lock. From here on:
//!
//! * The owner may re-enter guarded methods and nested disposals freely. Its
//!   nesting depth is tracked in its `ThreadRecord::exclusive`, and the phase
//!   moves to `Disposed` when that depth returns to zero.
//! * Threads that were already inside a guarded method before disposal began
//!   may nest further calls until they leave.
//! * Everybody else is turned away immediately with `ResourceDisposed`. Nobody
//!   is ever queued behind an in-flight teardown.
//!
//! A non-owning thread calling `enter_dispose` here neither blocks nor touches
//! the lock; the call is only counted for that thread so that its matching
//! `exit_dispose` balances. It has no effect on when disposal completes.

use mutex_traits::ScopedRawMutex;

use super::{Flow, Op, Step, exit_method};
use crate::{
    Phase,
    error::{LifecycleViolation, UsageError},
    guard::Core,
    logging::{debug, error, trace, warn},
};

pub(super) fn handle<R: ScopedRawMutex>(core: &Core<R>, op: Op) -> Step {
    match op {
        Op::Start => Err(core.violation(LifecycleViolation::Disposed)),
        Op::EnterMethod => enter_method(core),
        Op::ExitMethod => exit_method(core),
        Op::EnterDispose => enter_dispose(core),
        Op::ExitDispose => exit_dispose(core),
    }
}

fn enter_method<R: ScopedRawMutex>(core: &Core<R>) -> Step {
    let granted = core.threads.with_current(|record| {
        if record.holds_lock() {
            record.shared += 1;
            true
        } else {
            false
        }
    });

    if granted {
        trace!("{}: re-entered guarded method while disposing", core.owner);
        Ok(Flow::Done)
    } else {
        Err(core.disposed())
    }
}

fn enter_dispose<R: ScopedRawMutex>(core: &Core<R>) -> Step {
    let depth = core.threads.with_current(|record| {
        if record.owner {
            // The raw exclusive lock is held once; recursion is just the depth
            record.exclusive += 1;
            Some(record.exclusive)
        } else {
            record.redundant += 1;
            None
        }
    });

    match depth {
        Some(depth) => trace!("{}: nested dispose, depth {}", core.owner, depth),
        None => debug!(
            "{}: enter_dispose from a non-owning thread while disposal is in progress",
            core.owner
        ),
    }
    Ok(Flow::Done)
}

enum Exit {
    MethodOpen,
    Unwound(usize),
    Finished,
    Redundant,
    NotEntered,
}

fn exit_dispose<R: ScopedRawMutex>(core: &Core<R>) -> Step {
    let exit = core.threads.with_current(|record| {
        if record.shared > 0 {
            Exit::MethodOpen
        } else if record.owner && record.exclusive > 0 {
            record.exclusive -= 1;
            if record.exclusive == 0 {
                record.owner = false;
                Exit::Finished
            } else {
                Exit::Unwound(record.exclusive)
            }
        } else if record.redundant > 0 {
            record.redundant -= 1;
            Exit::Redundant
        } else {
            Exit::NotEntered
        }
    });

    match exit {
        Exit::MethodOpen => {
            warn!(
                "{}: exit_dispose called with a guarded method still open",
                core.owner
            );
            Err(core.usage(UsageError::MethodNotExited))
        }
        Exit::Unwound(depth) => {
            trace!("{}: nested dispose left, depth {}", core.owner, depth);
            Ok(Flow::Done)
        }
        Exit::Finished => {
            // Publish `Disposed` before letting anyone parked on the lock
            // through, so they observe the final phase and back off.
            if !core.transition(Phase::Disposing, Phase::Disposed) {
                error!(
                    "{}: phase changed under the disposing owner: {:?}",
                    core.owner,
                    core.phase()
                );
            }
            // SAFETY: this thread is the owner, it took the exclusive lock in
            // `begin_dispose` and its depth just returned to zero.
            unsafe { core.lock.unlock_exclusive() };
            debug!("{}: disposed", core.owner);
            Ok(Flow::Done)
        }
        Exit::Redundant => Ok(Flow::Done),
        Exit::NotEntered => {
            warn!("{}: exit_dispose without matching enter_dispose", core.owner);
            Err(core.usage(UsageError::DisposeNotEntered))
        }
    }
}
