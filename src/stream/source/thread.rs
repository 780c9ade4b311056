// Copyright (c) 2021, KTH Royal Institute of Technology.
// SPDX-License-Identifier: AGPL-3.0-only

use super::{token::CancellationToken, ProductionContext, Producer};
use crate::{conf::OperonConf, error::OperonResult, util::lock};
use slog::{debug, error, trace};
use std::{
    any::Any,
    io,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Condvar, Mutex,
    },
    thread::{self, JoinHandle},
};

/// Creates the threads a kernel runs its background work on
///
/// The runtime hands one to the kernel through the context so that it can
/// name, size and account for every thread it does not create itself.
pub trait ThreadFactory: Send + Sync {
    fn spawn(&self, name: &str, routine: Box<dyn FnOnce() + Send>) -> io::Result<JoinHandle<()>>;
}

/// Default [ThreadFactory] producing `{prefix}-{name}-{n}` threads
#[derive(Debug)]
pub struct NamedThreadFactory {
    prefix: String,
    stack_size: usize,
    spawned: AtomicUsize,
    active: Arc<AtomicUsize>,
}

impl NamedThreadFactory {
    pub fn new(prefix: impl Into<String>, stack_size: usize) -> Self {
        NamedThreadFactory {
            prefix: prefix.into(),
            stack_size,
            spawned: AtomicUsize::new(0),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn from_conf(conf: &OperonConf) -> Self {
        Self::new(conf.thread_name_prefix.clone(), conf.production_stack_size)
    }

    /// Threads spawned by this factory that have not finished yet
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Total number of threads spawned by this factory
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }
}

struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ThreadFactory for NamedThreadFactory {
    fn spawn(&self, name: &str, routine: Box<dyn FnOnce() + Send>) -> io::Result<JoinHandle<()>> {
        let n = self.spawned.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);
        let guard = ActiveGuard(self.active.clone());

        thread::Builder::new()
            .name(format!("{}-{}-{}", self.prefix, name, n))
            .stack_size(self.stack_size)
            .spawn(move || {
                let _guard = guard;
                routine()
            })
    }
}

/// Observable outcome of a production routine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductionStatus {
    NotStarted,
    Running,
    /// The routine returned on its own
    Completed,
    /// The routine returned after cancellation was requested
    Cancelled,
    /// The routine returned an error or panicked
    Failed(String),
}

impl ProductionStatus {
    #[inline]
    pub fn is_finished(&self) -> bool {
        !matches!(self, ProductionStatus::NotStarted | ProductionStatus::Running)
    }
}

struct StatusCell {
    status: Mutex<ProductionStatus>,
    changed: Condvar,
}

impl StatusCell {
    fn set(&self, status: ProductionStatus) {
        *lock(&self.status) = status;
        self.changed.notify_all();
    }

    fn get(&self) -> ProductionStatus {
        lock(&self.status).clone()
    }

    fn wait(&self) -> ProductionStatus {
        let mut status = lock(&self.status);
        while *status == ProductionStatus::Running {
            status = match self.changed.wait(status) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
        status.clone()
    }
}

enum Stage {
    Built {
        producer: Box<dyn Producer>,
        ctx: ProductionContext,
    },
    Started(JoinHandle<()>),
    Stopped,
}

/// Handle to the dedicated thread that runs a source's production routine
///
/// Built during initialization, started once all ports are ready and
/// cancelled and joined during shutdown. Dropping the handle does the
/// latter, so the thread never outlives its kernel.
pub(crate) struct ProductionThread {
    name: String,
    stage: Mutex<Stage>,
    token: CancellationToken,
    status: Arc<StatusCell>,
    factory: Arc<dyn ThreadFactory>,
}

impl ProductionThread {
    pub fn new(
        name: String,
        producer: Box<dyn Producer>,
        ctx: ProductionContext,
        factory: Arc<dyn ThreadFactory>,
    ) -> Self {
        ProductionThread {
            name,
            token: ctx.token().clone(),
            stage: Mutex::new(Stage::Built { producer, ctx }),
            status: Arc::new(StatusCell {
                status: Mutex::new(ProductionStatus::NotStarted),
                changed: Condvar::new(),
            }),
            factory,
        }
    }

    /// Starts the routine. Does nothing if it was started or stopped before
    pub fn start(&self) -> OperonResult<()> {
        let mut stage = lock(&self.stage);
        let (producer, ctx) = match std::mem::replace(&mut *stage, Stage::Stopped) {
            Stage::Built { producer, ctx } => (producer, ctx),
            other => {
                *stage = other;
                return Ok(());
            }
        };

        self.status.set(ProductionStatus::Running);
        let status = self.status.clone();
        let logger = ctx.log().clone();
        trace!(logger, "Starting production thread for {}", self.name);

        match self
            .factory
            .spawn(&self.name, Box::new(move || run(producer, ctx, &status)))
        {
            Ok(handle) => {
                *stage = Stage::Started(handle);
                Ok(())
            }
            Err(err) => {
                error!(logger, "Failed to spawn production thread: {}", err);
                self.status.set(ProductionStatus::Failed(err.to_string()));
                Err(err.into())
            }
        }
    }

    /// Cancels the routine and waits for its thread to end
    pub fn stop(&self) {
        self.token.cancel();
        let mut stage = lock(&self.stage);
        if let Stage::Started(handle) = std::mem::replace(&mut *stage, Stage::Stopped) {
            // the routine runs under catch_unwind, so join only fails on a bug
            let _ = handle.join();
        }
    }

    pub fn status(&self) -> ProductionStatus {
        self.status.get()
    }

    /// Blocks until a started routine finishes
    pub fn await_completion(&self) -> ProductionStatus {
        self.status.wait()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for ProductionThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(mut producer: Box<dyn Producer>, ctx: ProductionContext, status: &StatusCell) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| producer.produce(&ctx)));
    let outcome = match result {
        Ok(Ok(())) if ctx.is_cancelled() => ProductionStatus::Cancelled,
        Ok(Ok(())) => ProductionStatus::Completed,
        Ok(Err(err)) if ctx.is_cancelled() => {
            debug!(ctx.log(), "Production ended during cancellation: {}", err);
            ProductionStatus::Cancelled
        }
        Ok(Err(err)) => {
            error!(ctx.log(), "Production failed: {}", err);
            crate::metrics::record_production_failure(ctx.operator());
            ProductionStatus::Failed(err.to_string())
        }
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            error!(ctx.log(), "Production panicked: {}", msg);
            crate::metrics::record_production_failure(ctx.operator());
            ProductionStatus::Failed(msg)
        }
    };
    trace!(ctx.log(), "Production thread finished with {:?}", outcome);
    status.set(outcome);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        String::from("unknown panic")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{operator_err, test_utils::LOGGER};
    use std::time::Duration;

    fn context() -> ProductionContext {
        ProductionContext::new(
            String::from("Src"),
            Vec::new(),
            CancellationToken::new(Duration::from_millis(5)),
            LOGGER.clone(),
        )
    }

    fn thread_with<P: Producer>(producer: P) -> (ProductionThread, Arc<NamedThreadFactory>) {
        let factory = Arc::new(NamedThreadFactory::new("test", 256 * 1024));
        let thread = ProductionThread::new(
            String::from("Src"),
            Box::new(producer),
            context(),
            factory.clone(),
        );
        (thread, factory)
    }

    #[test]
    fn completes_naturally() {
        let (thread, factory) = thread_with(|_: &ProductionContext| -> OperonResult<()> { Ok(()) });
        assert_eq!(thread.status(), ProductionStatus::NotStarted);
        thread.start().unwrap();
        assert_eq!(thread.await_completion(), ProductionStatus::Completed);
        thread.stop();
        assert_eq!(factory.spawned(), 1);
        assert_eq!(factory.active(), 0);
    }

    #[test]
    fn cancellation_ends_routine() {
        let (thread, _) = thread_with(|ctx: &ProductionContext| -> OperonResult<()> {
            while ctx.sleep(ctx.token().poll_interval()) {}
            Ok(())
        });
        thread.start().unwrap();
        assert_eq!(thread.status(), ProductionStatus::Running);
        thread.stop();
        assert_eq!(thread.status(), ProductionStatus::Cancelled);
        // no restart after a stop
        thread.start().unwrap();
        assert_eq!(thread.status(), ProductionStatus::Cancelled);
    }

    #[test]
    fn failures_are_recorded() {
        let (thread, _) = thread_with(|_: &ProductionContext| -> OperonResult<()> {
            operator_err!("source offline")
        });
        thread.start().unwrap();
        assert!(matches!(
            thread.await_completion(),
            ProductionStatus::Failed(ref msg) if msg.contains("source offline")
        ));

        let (thread, _) = thread_with(|_: &ProductionContext| -> OperonResult<()> {
            panic!("boom")
        });
        thread.start().unwrap();
        assert_eq!(
            thread.await_completion(),
            ProductionStatus::Failed(String::from("boom"))
        );
    }

    #[test]
    fn stop_before_start() {
        let (thread, factory) = thread_with(|_: &ProductionContext| -> OperonResult<()> { Ok(()) });
        thread.stop();
        thread.start().unwrap();
        assert_eq!(thread.status(), ProductionStatus::NotStarted);
        assert_eq!(factory.spawned(), 0);
    }

    #[test]
    fn named_threads() {
        let factory = NamedThreadFactory::new("pe", 128 * 1024);
        let handle = factory
            .spawn(
                "op",
                Box::new(|| {
                    assert_eq!(thread::current().name(), Some("pe-op-0"));
                }),
            )
            .unwrap();
        handle.join().unwrap();
        assert_eq!(factory.active(), 0);
    }
}
