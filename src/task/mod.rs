//! Task module - per-project run state, control signals and the task registry.
//!
//! A [`Task`] is the live state of one project's pipeline run. It survives
//! across runs: the [`TaskRegistry`] resets a finished task in place when the
//! next run is claimed, so there is never more than one task per project.
//!
//! Locking:
//! - each `Task` and `Subtask` guards its own fields with a `RwLock`
//! - the registry map has a single lock, taken before any task lock
//! - no lock is held across an `.await`

mod control;
mod registry;
mod subtask;
pub mod task;

pub use control::{ControlState, ControlToken};
pub use registry::{StartClaim, TaskRegistry};
pub use subtask::{Subtask, SubtaskSnapshot};
pub use task::{Task, TaskSnapshot, TaskStatus};

use std::sync::{
    Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

// A panic while holding one of these locks never leaves the guarded data
// half-written (every critical section is a plain field assignment), so a
// poisoned lock is recovered rather than propagated.

pub(crate) fn read_guard<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_guard<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn lock_guard<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}
