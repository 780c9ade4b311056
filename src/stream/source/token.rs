// Copyright (c) 2021, KTH Royal Institute of Technology.
// SPDX-License-Identifier: AGPL-3.0-only

use crate::util::lock;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

struct TokenInner {
    cancelled: AtomicBool,
    // Dropped on cancel, which disconnects `wake` and releases every sleeper
    signal: Mutex<Option<Sender<()>>>,
    wake: Receiver<()>,
    poll_interval: Duration,
}

/// Cooperative cancellation signal shared between a kernel and its threads
///
/// Cancelling is idempotent and visible to every clone.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    pub fn new(poll_interval: Duration) -> Self {
        let (signal, wake) = bounded(0);
        CancellationToken {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                signal: Mutex::new(Some(signal)),
                wake,
                poll_interval,
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        lock(&self.inner.signal).take();
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration` unless cancelled first
    ///
    /// Returns true if the full duration passed without cancellation.
    pub fn sleep(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        match self.inner.wake.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => !self.is_cancelled(),
            _ => false,
        }
    }

    /// Blocks until the token is cancelled
    pub fn wait(&self) {
        while !self.is_cancelled() {
            let _ = self.inner.wake.recv();
        }
    }

    /// Suggested upper bound between two cancellation checks
    #[inline]
    pub fn poll_interval(&self) -> Duration {
        self.inner.poll_interval
    }

    /// Receiver that becomes ready once the token is cancelled, for use in `select!`
    pub(crate) fn signal(&self) -> &Receiver<()> {
        &self.inner.wake
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        CancellationToken::new(Duration::from_millis(100))
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
