// Copyright (c) 2021, KTH Royal Institute of Technology.
// SPDX-License-Identifier: AGPL-3.0-only

use super::Endpoint;
use crate::{
    data::{Punctuation, StreamEvent, Tuple},
    error::OperonResult,
    util::lock,
};
use std::{
    sync::{Condvar, Mutex},
    time::{Duration, Instant},
};

/// A DebugEndpoint acts as a sink that keeps every event in arrival order
///
/// Useful for tests and situations when one needs to verify what an
/// operator emitted.
#[derive(Debug, Default)]
pub struct DebugEndpoint {
    events: Mutex<Vec<StreamEvent>>,
    arrived: Condvar,
}

impl DebugEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every received event
    pub fn events(&self) -> Vec<StreamEvent> {
        lock(&self.events).clone()
    }

    /// Snapshot of the received tuples
    pub fn tuples(&self) -> Vec<Tuple> {
        lock(&self.events)
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Tuple(t) => Some(t.clone()),
                StreamEvent::Punctuation(_) => None,
            })
            .collect()
    }

    /// Snapshot of the received punctuation marks
    pub fn punctuations(&self) -> Vec<Punctuation> {
        lock(&self.events)
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Punctuation(p) => Some(*p),
                StreamEvent::Tuple(_) => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blocks until `done` holds for the received events or `timeout` passes
    ///
    /// Returns whether the condition was met.
    pub fn wait_until<F>(&self, timeout: Duration, mut done: F) -> bool
    where
        F: FnMut(&[StreamEvent]) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut events = lock(&self.events);
        loop {
            if done(events.as_slice()) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            events = match self.arrived.wait_timeout(events, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Blocks until a final punctuation has been received
    pub fn wait_for_final(&self, timeout: Duration) -> bool {
        self.wait_until(timeout, |events| events.iter().any(StreamEvent::is_final))
    }
}

impl Endpoint for DebugEndpoint {
    fn deliver(&self, event: StreamEvent) -> OperonResult<()> {
        lock(&self.events).push(event);
        self.arrived.notify_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{AttributeType, Schema, Value};
    use std::{sync::Arc, thread};

    #[test]
    fn records_in_order() {
        let endpoint = DebugEndpoint::new();
        let schema = Schema::shared(vec![("id", AttributeType::Int64)]).unwrap();
        let t = Tuple::new(schema, vec![Value::Int64(7)]).unwrap();
        endpoint.deliver(StreamEvent::Tuple(t.clone())).unwrap();
        endpoint
            .deliver(StreamEvent::Punctuation(Punctuation::WindowMarker))
            .unwrap();

        assert_eq!(endpoint.len(), 2);
        assert_eq!(endpoint.tuples(), vec![t]);
        assert_eq!(endpoint.punctuations(), vec![Punctuation::WindowMarker]);
    }

    #[test]
    fn wait_for_final_from_another_thread() {
        let endpoint = Arc::new(DebugEndpoint::new());
        assert!(!endpoint.wait_for_final(Duration::from_millis(10)));

        let remote = endpoint.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote
                .deliver(StreamEvent::Punctuation(Punctuation::FinalMarker))
                .unwrap();
        });
        assert!(endpoint.wait_for_final(Duration::from_secs(5)));
        handle.join().unwrap();
    }
}
