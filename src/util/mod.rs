// Copyright (c) 2021, KTH Royal Institute of Technology.
// SPDX-License-Identifier: AGPL-3.0-only

use std::sync::{Mutex, MutexGuard};

/// Bounds shared by user-defined functions handed to the kernel
///
/// Handlers run concurrently on several port threads, hence `Sync`.
pub trait OperonFnBounds: Send + Sync + 'static {}
impl<T> OperonFnBounds for T where T: Send + Sync + 'static {}

/// Locks a mutex, recovering the guard if another thread panicked while holding it
///
/// Kernel bookkeeping must stay usable after a handler panic so that
/// shutdown can still run to completion.
#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn lock_survives_poisoning() {
        let shared = Arc::new(Mutex::new(1));
        let remote = shared.clone();
        let _ = thread::spawn(move || {
            let _guard = remote.lock().unwrap();
            panic!("poison");
        })
        .join();
        assert!(shared.is_poisoned());
        *lock(&shared) += 1;
        assert_eq!(*lock(&shared), 2);
    }
}
