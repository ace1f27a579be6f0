//! Handlers for [`Phase::Disposed`]. Terminal, the lock is never touched again.

use mutex_traits::ScopedRawMutex;

use super::{Flow, Op, Step};
use crate::{
    error::{LifecycleViolation, UsageError},
    guard::Core,
    logging::warn,
};

pub(super) fn handle<R: ScopedRawMutex>(core: &Core<R>, op: Op) -> Step {
    match op {
        Op::Start => Err(core.violation(LifecycleViolation::Disposed)),
        Op::EnterMethod => Err(core.disposed()),
        Op::ExitMethod => Err(core.usage(UsageError::MethodNotEntered)),
        Op::EnterDispose => {
            core.threads.with_current(|record| record.redundant += 1);
            Ok(Flow::Done)
        }
        Op::ExitDispose => {
            let balanced = core.threads.with_current(|record| {
                if record.redundant > 0 {
                    record.redundant -= 1;
                    true
                } else {
                    false
                }
            });
            if balanced {
                Ok(Flow::Done)
            } else {
                warn!("{}: exit_dispose without matching enter_dispose", core.owner);
                Err(core.usage(UsageError::DisposeNotEntered))
            }
        }
    }
}
