// Copyright (c) 2021, KTH Royal Institute of Technology.
// SPDX-License-Identifier: AGPL-3.0-only

use crate::{
    data::{Punctuation, StreamEvent, Tuple},
    error::{Error, OperonResult},
    stream::{
        endpoint::Endpoint,
        kernel::OperatorKernel,
        lifecycle::LifecycleState,
        operator::{ContextInfo, Operator},
        port::PortKind,
        source::token::CancellationToken,
    },
    util::lock,
};
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use slog::{crit, debug, o, trace, Logger};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::JoinHandle,
};

/// State shared by a dispatcher, its senders and its workers
struct DispatchShared {
    /// Cancelled when the dispatcher stops, for any reason
    stop: CancellationToken,
    fatal: Mutex<Option<Error>>,
}

impl DispatchShared {
    fn fail(&self, err: Error) {
        let mut fatal = lock(&self.fatal);
        if fatal.is_none() {
            *fatal = Some(err);
        }
        drop(fatal);
        self.stop.cancel();
    }
}

/// Queues events for one input port of a dispatcher
///
/// Also usable as the [Endpoint] of an upstream output port.
#[derive(Clone)]
pub struct PortSender {
    index: usize,
    tx: Sender<StreamEvent>,
    // true once a final marker was queued
    closed: Arc<Mutex<bool>>,
    shared: Arc<DispatchShared>,
}

impl PortSender {
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn send_tuple(&self, tuple: Tuple) -> OperonResult<()> {
        self.send(StreamEvent::Tuple(tuple))
    }

    pub fn send_punctuation(&self, mark: Punctuation) -> OperonResult<()> {
        self.send(StreamEvent::Punctuation(mark))
    }

    fn send(&self, event: StreamEvent) -> OperonResult<()> {
        let mut closed = lock(&self.closed);
        if *closed || self.shared.stop.is_cancelled() {
            return Err(self.port_closed());
        }
        let is_final = event.is_final();
        // A full queue must not outlive the dispatcher
        select! {
            send(self.tx, event) -> res => res.map_err(|_| self.port_closed())?,
            recv(self.shared.stop.signal()) -> _ => return Err(self.port_closed()),
        }
        if is_final {
            *closed = true;
        }
        Ok(())
    }

    fn port_closed(&self) -> Error {
        Error::PortClosed {
            kind: PortKind::Input,
            index: self.index,
        }
    }
}

impl Endpoint for PortSender {
    fn deliver(&self, event: StreamEvent) -> OperonResult<()> {
        self.send(event)
    }
}

/// Runs one worker thread per input port of a kernel
///
/// Each worker drains the FIFO queue of its port and delivers the events
/// serially into the kernel, so ports make progress independently of each
/// other. A handler error is fatal: it is recorded, every worker is asked
/// to stop and [Dispatcher::join] reports it.
pub struct Dispatcher<OP: Operator> {
    kernel: Arc<OperatorKernel<OP>>,
    senders: Vec<PortSender>,
    receivers: Mutex<Option<Vec<Receiver<StreamEvent>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shared: Arc<DispatchShared>,
}

impl<OP: Operator> Dispatcher<OP> {
    /// Creates one queue per input port of `kernel`
    pub fn new(kernel: Arc<OperatorKernel<OP>>) -> Self {
        let capacity = kernel.conf().port_queue_capacity;
        let shared = Arc::new(DispatchShared {
            stop: CancellationToken::new(kernel.conf().poll_interval()),
            fatal: Mutex::new(None),
        });

        let (senders, receivers): (Vec<_>, Vec<_>) = (0..kernel.input_count())
            .map(|index| {
                let (tx, rx) = if capacity == 0 {
                    unbounded()
                } else {
                    bounded(capacity)
                };
                let sender = PortSender {
                    index,
                    tx,
                    closed: Arc::new(Mutex::new(false)),
                    shared: shared.clone(),
                };
                (sender, rx)
            })
            .unzip();

        Dispatcher {
            kernel,
            senders,
            receivers: Mutex::new(Some(receivers)),
            workers: Mutex::new(Vec::new()),
            shared,
        }
    }

    /// Initializes the kernel, declares all ports ready and starts the workers
    pub fn launch(kernel: Arc<OperatorKernel<OP>>, info: ContextInfo) -> OperonResult<Self> {
        kernel.initialize(info)?;
        kernel.all_ports_ready()?;
        let dispatcher = Dispatcher::new(kernel);
        dispatcher.start()?;
        Ok(dispatcher)
    }

    /// Spawns the port workers through the kernel's thread factory
    ///
    /// The kernel must have been initialized. Events sent before this call
    /// stay queued until then.
    pub fn start(&self) -> OperonResult<()> {
        let ctx = match self.kernel.context() {
            Some(ctx) => ctx,
            None => {
                return Err(Error::Lifecycle {
                    operation: "start dispatcher",
                    state: self.kernel.state(),
                })
            }
        };
        let receivers = match lock(&self.receivers).take() {
            Some(receivers) => receivers,
            None => {
                return Err(Error::Unsupported {
                    msg: String::from("dispatcher already started"),
                })
            }
        };

        let mut workers = lock(&self.workers);
        for (index, rx) in receivers.into_iter().enumerate() {
            let kernel = self.kernel.clone();
            let shared = self.shared.clone();
            let logger = ctx.log().new(o!("port" => index));
            let name = format!("{}-in{}", ctx.name(), index);
            let handle = ctx.thread_factory().spawn(
                &name,
                Box::new(move || run_worker(&kernel, index, &rx, &shared, &logger)),
            );
            match handle {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    self.shared.stop.cancel();
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }

    #[inline]
    pub fn kernel(&self) -> &Arc<OperatorKernel<OP>> {
        &self.kernel
    }

    pub fn sender(&self, index: usize) -> OperonResult<PortSender> {
        self.senders.get(index).cloned().ok_or(Error::UnknownPort {
            kind: PortKind::Input,
            index,
        })
    }

    #[inline]
    pub fn senders(&self) -> &[PortSender] {
        &self.senders
    }

    /// True once a worker failed or the dispatcher was shut down
    pub fn is_stopped(&self) -> bool {
        self.shared.stop.is_cancelled()
    }

    /// Stops admission, shuts the kernel down and joins every worker
    ///
    /// Events still queued are discarded.
    pub fn shutdown(&self) -> OperonResult<()> {
        self.shared.stop.cancel();
        lock(&self.receivers).take();
        let result = self.kernel.shutdown();
        self.join_workers();
        result
    }

    /// Waits for every worker to end, returning the first fatal error
    ///
    /// Workers end once their port delivered a final marker, on a fatal
    /// error, or when the dispatcher is shut down.
    pub fn join(&self) -> OperonResult<()> {
        self.join_workers();
        match lock(&self.shared.fatal).take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn join_workers(&self) {
        let workers: Vec<_> = lock(&self.workers).drain(..).collect();
        for worker in workers {
            let _ = worker.join();
        }
    }
}

impl<OP: Operator> Drop for Dispatcher<OP> {
    fn drop(&mut self) {
        self.shared.stop.cancel();
        self.join_workers();
    }
}

fn run_worker<OP: Operator>(
    kernel: &OperatorKernel<OP>,
    index: usize,
    rx: &Receiver<StreamEvent>,
    shared: &DispatchShared,
    logger: &Logger,
) {
    trace!(logger, "Worker for input port {} started", index);
    let stop = shared.stop.signal();

    loop {
        select! {
            recv(rx) -> msg => {
                let event = match msg {
                    Ok(event) if !shared.stop.is_cancelled() => event,
                    _ => break,
                };
                let is_final = event.is_final();
                let res = match event {
                    StreamEvent::Tuple(tuple) => kernel.process(index, tuple),
                    StreamEvent::Punctuation(mark) => kernel.process_punctuation(index, mark),
                };
                if let Err(err) = res {
                    crit!(logger, "Fatal error on input port {}: {}", index, err);
                    shared.fail(err);
                    break;
                }
                if is_final {
                    debug!(logger, "Input port {} is final", index);
                    break;
                }
                if kernel.state() >= LifecycleState::ShuttingDown {
                    break;
                }
            },
            recv(stop) -> _ => break,
        }
    }

    trace!(logger, "Worker for input port {} stopped", index);
}
