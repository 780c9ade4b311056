// Copyright (c) 2021, KTH Royal Institute of Technology.
// SPDX-License-Identifier: AGPL-3.0-only

use crate::error::{Error, OperonResult};
use std::{
    fmt,
    sync::{Condvar, Mutex, MutexGuard},
    time::{Duration, Instant},
};

/// Lifecycle states of an operator kernel, in the only order they can be visited
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    Created,
    Initializing,
    Initialized,
    AllPortsReady,
    Running,
    ShuttingDown,
    Terminated,
}

impl LifecycleState {
    /// True while tuples and punctuation are admitted
    #[inline]
    pub fn is_delivering(self) -> bool {
        matches!(self, LifecycleState::AllPortsReady | LifecycleState::Running)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Created => "created",
            LifecycleState::Initializing => "initializing",
            LifecycleState::Initialized => "initialized",
            LifecycleState::AllPortsReady => "ready",
            LifecycleState::Running => "running",
            LifecycleState::ShuttingDown => "shutting down",
            LifecycleState::Terminated => "terminated",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug)]
struct Phase {
    state: LifecycleState,
    in_flight: usize,
}

/// State cell shared by the lifecycle calls of one kernel
///
/// Besides the state it counts deliveries that are currently inside an
/// operator handler, so that shutdown can wait for them to drain.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    phase: Mutex<Phase>,
    changed: Condvar,
}

impl Lifecycle {
    pub fn new() -> Self {
        Lifecycle {
            phase: Mutex::new(Phase {
                state: LifecycleState::Created,
                in_flight: 0,
            }),
            changed: Condvar::new(),
        }
    }

    fn phase(&self) -> MutexGuard<'_, Phase> {
        crate::util::lock(&self.phase)
    }

    pub fn state(&self) -> LifecycleState {
        self.phase().state
    }

    /// Moves from `from` to `to`, failing if the current state is not `from`
    pub fn transition(
        &self,
        operation: &'static str,
        from: LifecycleState,
        to: LifecycleState,
    ) -> OperonResult<()> {
        let mut phase = self.phase();
        if phase.state != from {
            return Err(Error::Lifecycle {
                operation,
                state: phase.state,
            });
        }
        phase.state = to;
        self.changed.notify_all();
        Ok(())
    }

    /// Like [Lifecycle::transition] but also registers the caller as in flight
    ///
    /// Shutdown waits for the returned admission like it does for deliveries.
    pub fn transition_admitted(
        &self,
        operation: &'static str,
        from: LifecycleState,
        to: LifecycleState,
    ) -> OperonResult<Admission<'_>> {
        let mut phase = self.phase();
        if phase.state != from {
            return Err(Error::Lifecycle {
                operation,
                state: phase.state,
            });
        }
        phase.state = to;
        phase.in_flight += 1;
        self.changed.notify_all();
        Ok(Admission { lifecycle: self })
    }

    /// Moves from `from` to `to` if still in `from`
    pub fn advance(&self, from: LifecycleState, to: LifecycleState) -> bool {
        let mut phase = self.phase();
        if phase.state == from {
            phase.state = to;
            self.changed.notify_all();
            true
        } else {
            false
        }
    }

    /// Registers a delivery
    ///
    /// Returns `Ok(None)` once shutdown has begun, in which case the
    /// delivery is to be discarded.
    pub fn admit(&self, operation: &'static str) -> OperonResult<Option<Admission<'_>>> {
        let mut phase = self.phase();
        match phase.state {
            s if s.is_delivering() => {
                phase.in_flight += 1;
                Ok(Some(Admission { lifecycle: self }))
            }
            LifecycleState::ShuttingDown | LifecycleState::Terminated => Ok(None),
            state => Err(Error::Lifecycle { operation, state }),
        }
    }

    /// Enters `ShuttingDown`, returning the previous state
    ///
    /// Returns `None` if shutdown was already entered by an earlier call.
    pub fn begin_shutdown(&self) -> Option<LifecycleState> {
        let mut phase = self.phase();
        match phase.state {
            LifecycleState::ShuttingDown | LifecycleState::Terminated => None,
            prev => {
                phase.state = LifecycleState::ShuttingDown;
                self.changed.notify_all();
                Some(prev)
            }
        }
    }

    /// Blocks until no admitted delivery is still running
    pub fn await_quiescence(&self) {
        let mut phase = self.phase();
        while phase.in_flight > 0 {
            phase = match self.changed.wait(phase) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    pub fn terminate(&self) {
        let mut phase = self.phase();
        phase.state = LifecycleState::Terminated;
        self.changed.notify_all();
    }

    /// Blocks until the state has reached or passed `target`
    pub fn await_state(&self, target: LifecycleState) {
        let mut phase = self.phase();
        while phase.state < target {
            phase = match self.changed.wait(phase) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Like [Lifecycle::await_state] but gives up after `timeout`
    pub fn await_state_timeout(&self, target: LifecycleState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut phase = self.phase();
        while phase.state < target {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            phase = match self.changed.wait_timeout(phase, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.phase().in_flight
    }
}

/// An admitted delivery, released on drop
#[derive(Debug)]
pub(crate) struct Admission<'a> {
    lifecycle: &'a Lifecycle,
}

impl<'a> Drop for Admission<'a> {
    fn drop(&mut self) {
        let mut phase = self.lifecycle.phase();
        phase.in_flight -= 1;
        if phase.in_flight == 0 {
            self.lifecycle.changed.notify_all();
        }
    }
}
