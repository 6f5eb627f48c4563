use std::sync::{Mutex, MutexGuard};

use tracing::{trace, warn};

/// Acquire `lock`, recovering the guard if a previous holder panicked.
///
/// `owner` names the guarded state (a package id or `registry`) and `op` the
/// operation, so lock traffic can be followed at TRACE level.
pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    owner: &str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    trace!(target: "folio::lock", owner, op, "acquiring lock");
    let guard = match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                target: "folio::lock",
                owner,
                op,
                lock_kind = "mutex.lock",
                result = "poisoned_recovered",
                hint = "state may be stale after panic in another thread",
                "Recovered from poisoned lock"
            );
            poisoned.into_inner()
        }
    };
    trace!(target: "folio::lock", owner, op, "lock acquired");
    guard
}
