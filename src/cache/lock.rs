use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::warn;

/// Acquire `lock`, recovering the guard if a previous holder panicked.
///
/// In-process state guarded here is always left structurally valid between
/// statements, so continuing with it is preferable to cascading the panic.
pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| recover(poisoned, target, op))
}

fn recover<G>(poisoned: PoisonError<G>, target: &'static str, op: &'static str) -> G {
    warn!(
        op,
        target_module = target,
        lock_kind = "mutex.lock",
        result = "poisoned_recovered",
        "Recovered from poisoned lock"
    );
    poisoned.into_inner()
}
