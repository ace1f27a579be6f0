//! Handlers for [`Phase::NotStarted`]

use mutex_traits::ScopedRawMutex;

use super::{Flow, Op, Step, begin_dispose};
use crate::{
    Phase,
    error::{LifecycleViolation, UsageError},
    guard::Core,
    logging::debug,
};

pub(super) fn handle<R: ScopedRawMutex>(core: &Core<R>, op: Op) -> Step {
    match op {
        Op::Start => {
            if core.transition(Phase::NotStarted, Phase::Active) {
                debug!("{}: started", core.owner);
                Ok(Flow::Done)
            } else {
                Ok(Flow::Redispatch)
            }
        }
        Op::EnterMethod | Op::ExitMethod => Err(core.violation(LifecycleViolation::NotStarted)),
        // A resource may be disposed without ever having been started
        Op::EnterDispose => begin_dispose(core, Phase::NotStarted),
        Op::ExitDispose => Err(core.usage(UsageError::DisposeNotEntered)),
    }
}
