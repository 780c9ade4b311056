// Copyright (c) 2021, KTH Royal Institute of Technology.
// SPDX-License-Identifier: AGPL-3.0-only

use crate::{
    conf::{logger::KernelLogger, OperonConf},
    data::{schema::same_schema, Punctuation, Tuple},
    error::{Error, OperonResult},
    reportable_error,
    stream::{
        endpoint::Endpoint,
        lifecycle::{Lifecycle, LifecycleState},
        operator::{ContextInfo, Operator, OperatorContext},
        port::{InputPort, OperatorModel, OutputPort, PortBinding, PortKind, WindowPunctuationOutputMode},
        source::{
            thread::{NamedThreadFactory, ProductionStatus, ProductionThread, ThreadFactory},
            token::CancellationToken,
            ProductionContext,
        },
    },
    util::lock,
};
use once_cell::sync::OnceCell;
use slog::{debug, error, o, trace};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

struct InputSlot {
    port: InputPort,
    // Held across the handler so each port delivers serially
    serial: Mutex<()>,
    closed: AtomicBool,
}

/// Hosts one operator invocation and drives it through its lifecycle
///
/// The kernel owns the lifecycle state, the concrete ports and the
/// production thread of the operator. Runtime calls are admitted or
/// rejected according to [LifecycleState]:
///
/// * `initialize` and `all_ports_ready` run exactly once, in that order.
/// * `process` and `process_punctuation` are admitted once all ports are
///   ready, may run concurrently for different ports and are discarded
///   once shutdown has begun.
/// * `shutdown` is accepted in any state and takes effect once.
///
/// When `shutdown` returns no handler is running and none will run again.
pub struct OperatorKernel<OP: Operator> {
    model: OperatorModel,
    conf: Arc<OperonConf>,
    lifecycle: Lifecycle,
    inputs: Vec<InputSlot>,
    outputs: Vec<OutputPort>,
    /// Operator waiting for `initialize`
    pending: Mutex<Option<OP>>,
    /// Operator after a successful `initialize`
    operator: OnceCell<OP>,
    context: OnceCell<OperatorContext>,
    production: OnceCell<ProductionThread>,
    logger: KernelLogger,
    finals_remaining: AtomicUsize,
}

impl<OP: Operator> OperatorKernel<OP> {
    /// Creates a kernel with the default configuration
    pub fn new(model: OperatorModel, binding: PortBinding, operator: OP) -> OperonResult<Self> {
        Self::with_conf(model, binding, operator, OperonConf::default())
    }

    /// Creates a kernel logging to the logger configured in `conf`
    pub fn with_conf(
        model: OperatorModel,
        binding: PortBinding,
        operator: OP,
        conf: OperonConf,
    ) -> OperonResult<Self> {
        let logger = conf.logger()?;
        Self::with_logger(model, binding, operator, conf, logger)
    }

    /// Validates the model against the binding and creates the kernel
    pub fn with_logger(
        model: OperatorModel,
        binding: PortBinding,
        operator: OP,
        conf: OperonConf,
        logger: KernelLogger,
    ) -> OperonResult<Self> {
        let (inputs, outputs) = binding.bind(&model)?;
        let logger = logger.new(o!("operator" => model.qualified_name()));
        let inputs: Vec<InputSlot> = inputs
            .into_iter()
            .map(|port| InputSlot {
                port,
                serial: Mutex::new(()),
                closed: AtomicBool::new(false),
            })
            .collect();

        Ok(OperatorKernel {
            finals_remaining: AtomicUsize::new(inputs.len()),
            model,
            conf: Arc::new(conf),
            lifecycle: Lifecycle::new(),
            inputs,
            outputs,
            pending: Mutex::new(Some(operator)),
            operator: OnceCell::new(),
            context: OnceCell::new(),
            production: OnceCell::new(),
            logger,
        })
    }

    /// Sets up the operator and builds, but does not start, its production thread
    ///
    /// On failure the kernel stays in [LifecycleState::Initializing] and only
    /// `shutdown` remains useful.
    pub fn initialize(&self, info: ContextInfo) -> OperonResult<()> {
        self.lifecycle.transition(
            "initialize",
            LifecycleState::Created,
            LifecycleState::Initializing,
        )?;

        let mut operator = match lock(&self.pending).take() {
            Some(operator) => operator,
            None => return reportable_error!("operator of {} missing", self.model.name),
        };

        let ContextInfo {
            pe_id,
            job_id,
            logger,
            thread_factory,
        } = info;
        let base = match logger {
            Some(logger) => logger.new(o!("operator" => self.model.qualified_name())),
            None => self.logger.clone(),
        };
        let log = base.new(o!("pe" => pe_id, "job" => job_id.clone()));
        let factory: Arc<dyn ThreadFactory> = match thread_factory {
            Some(factory) => factory,
            None => Arc::new(NamedThreadFactory::from_conf(&self.conf)),
        };

        trace!(
            log,
            "Operator {} initializing in PE: {} in Job: {}",
            self.model.name,
            pe_id,
            job_id
        );

        let ctx = self.context.get_or_init(|| {
            OperatorContext::new(
                self.model.name.clone(),
                self.model.namespace.clone(),
                pe_id,
                job_id,
                log,
                factory.clone(),
                self.conf.clone(),
                self.inputs.iter().map(|slot| slot.port.clone()).collect(),
                self.outputs.clone(),
            )
        });

        operator.initialize(ctx)?;

        if let Some(producer) = operator.producer(ctx)? {
            let production_ctx = ProductionContext::new(
                self.model.qualified_name(),
                self.outputs.clone(),
                CancellationToken::new(self.conf.poll_interval()),
                ctx.log().new(o!("thread" => "production")),
            );
            let thread =
                ProductionThread::new(self.model.name.clone(), producer, production_ctx, factory);
            if self.production.set(thread).is_err() {
                return reportable_error!("production thread of {} built twice", self.model.name);
            }
        }

        if self.operator.set(operator).is_err() {
            return reportable_error!("operator of {} initialized twice", self.model.name);
        }

        self.lifecycle.transition(
            "initialize",
            LifecycleState::Initializing,
            LifecycleState::Initialized,
        )
    }

    /// Connects output port `index` to a downstream endpoint
    ///
    /// Only allowed before all ports are declared ready.
    pub fn connect_output(&self, index: usize, endpoint: Arc<dyn Endpoint>) -> OperonResult<()> {
        let state = self.lifecycle.state();
        if state >= LifecycleState::AllPortsReady {
            return Err(Error::Lifecycle {
                operation: "connect output",
                state,
            });
        }
        self.output(index)?.connect(endpoint);
        Ok(())
    }

    /// Tells the operator that every port is connected and starts production
    ///
    /// Delivery may begin as soon as this is entered. A concurrent `shutdown`
    /// waits for the operator's handler to return.
    pub fn all_ports_ready(&self) -> OperonResult<()> {
        let state = self.lifecycle.state();
        if state != LifecycleState::Initialized {
            return Err(Error::Lifecycle {
                operation: "all_ports_ready",
                state,
            });
        }
        if let Some(port) = self.outputs.iter().find(|port| !port.is_connected()) {
            return Err(Error::InvalidBinding {
                msg: format!(
                    "output port {} ({}) is not connected",
                    port.index(),
                    port.name()
                ),
            });
        }

        // Held until production is started so shutdown waits for the handler
        let _admission = self.lifecycle.transition_admitted(
            "all_ports_ready",
            LifecycleState::Initialized,
            LifecycleState::AllPortsReady,
        )?;

        let (operator, ctx) = self.initialized()?;
        trace!(
            ctx.log(),
            "Operator {} all ports are ready in PE: {} in Job: {}",
            ctx.name(),
            ctx.pe_id(),
            ctx.job_id()
        );
        operator.all_ports_ready(ctx)?;

        if let Some(production) = self.production.get() {
            production.start()?;
        }

        self.lifecycle
            .advance(LifecycleState::AllPortsReady, LifecycleState::Running);
        Ok(())
    }

    /// Delivers a tuple that arrived on input port `port`
    pub fn process(&self, port: usize, tuple: Tuple) -> OperonResult<()> {
        let slot = self.input_slot(port)?;
        let _admission = match self.lifecycle.admit("process")? {
            Some(admission) => admission,
            None => {
                debug!(self.log(), "Discarding tuple on input port {} during shutdown", port);
                return Ok(());
            }
        };

        let _serial = lock(&slot.serial);
        if slot.closed.load(Ordering::Acquire) {
            return Err(Error::PortClosed {
                kind: PortKind::Input,
                index: port,
            });
        }
        if !same_schema(tuple.schema(), slot.port.schema()) {
            return Err(Error::Schema {
                msg: format!(
                    "tuple of {} delivered to input port {} of {}",
                    tuple.schema(),
                    port,
                    slot.port.schema()
                ),
            });
        }

        let (operator, ctx) = self.initialized()?;
        crate::metrics::record_received(ctx.name());
        operator.process(&slot.port, tuple, ctx)
    }

    /// Delivers a punctuation that arrived on input port `port`
    ///
    /// Window markers are forwarded to preserving output ports after the
    /// handler returns. Once every input port has delivered its final
    /// marker, every output port that is still open receives one.
    pub fn process_punctuation(&self, port: usize, mark: Punctuation) -> OperonResult<()> {
        let slot = self.input_slot(port)?;
        let _admission = match self.lifecycle.admit("process_punctuation")? {
            Some(admission) => admission,
            None => {
                debug!(self.log(), "Discarding {} on input port {} during shutdown", mark, port);
                return Ok(());
            }
        };

        let _serial = lock(&slot.serial);
        if slot.closed.load(Ordering::Acquire) {
            return Err(Error::PortClosed {
                kind: PortKind::Input,
                index: port,
            });
        }

        let (operator, ctx) = self.initialized()?;
        crate::metrics::record_punctuation(ctx.name());
        match mark {
            Punctuation::WindowMarker => {
                operator.process_punctuation(&slot.port, mark, ctx)?;
                for output in &self.outputs {
                    if output.punctuation_mode() == WindowPunctuationOutputMode::Preserving {
                        output.punctuate_if_open(mark)?;
                    }
                }
            }
            Punctuation::FinalMarker => {
                slot.closed.store(true, Ordering::Release);
                operator.process_punctuation(&slot.port, mark, ctx)?;
                if self.finals_remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    debug!(ctx.log(), "All input ports are final, closing output ports");
                    for output in &self.outputs {
                        output.punctuate_if_open(Punctuation::FinalMarker)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Stops production, runs the operator's shutdown handler and terminates
    ///
    /// Accepted in every state. Only the first call has an effect, later
    /// calls return `Ok(())` right away.
    pub fn shutdown(&self) -> OperonResult<()> {
        let previous = match self.lifecycle.begin_shutdown() {
            Some(previous) => previous,
            None => return Ok(()),
        };

        trace!(
            self.log(),
            "Operator {} shutting down from state {}",
            self.model.name,
            previous
        );

        if let Some(production) = self.production.get() {
            production.stop();
        }

        let result = match (self.operator.get(), self.context.get()) {
            (Some(operator), Some(ctx)) => operator.shutdown(ctx),
            _ => Ok(()),
        };

        self.lifecycle.await_quiescence();
        self.lifecycle.terminate();

        match result {
            Ok(()) => {
                trace!(self.log(), "Operator {} terminated", self.model.name);
                Ok(())
            }
            Err(err) => {
                error!(self.log(), "Shutdown of {} failed: {}", self.model.name, err);
                Err(err)
            }
        }
    }

    #[inline]
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Blocks until the kernel has terminated
    pub fn await_termination(&self) {
        self.lifecycle.await_state(LifecycleState::Terminated)
    }

    /// Like [OperatorKernel::await_termination] but gives up after `timeout`
    pub fn await_termination_timeout(&self, timeout: Duration) -> bool {
        self.lifecycle
            .await_state_timeout(LifecycleState::Terminated, timeout)
    }

    /// Status of the production routine, `None` if the operator has none
    pub fn production_status(&self) -> Option<ProductionStatus> {
        self.production.get().map(|p| p.status())
    }

    /// Blocks until a started production routine has finished
    pub fn await_production(&self) -> Option<ProductionStatus> {
        self.production.get().map(|p| p.await_completion())
    }

    /// Token observed by the production routine
    pub fn cancellation_token(&self) -> Option<&CancellationToken> {
        self.production.get().map(|p| p.token())
    }

    /// The operator, once it has been initialized
    pub fn operator(&self) -> Option<&OP> {
        self.operator.get()
    }

    pub fn context(&self) -> Option<&OperatorContext> {
        self.context.get()
    }

    #[inline]
    pub fn model(&self) -> &OperatorModel {
        &self.model
    }

    #[inline]
    pub fn conf(&self) -> &OperonConf {
        &self.conf
    }

    pub fn input(&self, index: usize) -> OperonResult<&InputPort> {
        self.input_slot(index).map(|slot| &slot.port)
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output(&self, index: usize) -> OperonResult<&OutputPort> {
        self.outputs.get(index).ok_or(Error::UnknownPort {
            kind: PortKind::Output,
            index,
        })
    }

    #[inline]
    pub fn outputs(&self) -> &[OutputPort] {
        &self.outputs
    }

    /// Logger tagged with the operator, and with PE and job once initialized
    pub fn log(&self) -> &KernelLogger {
        match self.context.get() {
            Some(ctx) => ctx.log(),
            None => &self.logger,
        }
    }

    fn input_slot(&self, index: usize) -> OperonResult<&InputSlot> {
        self.inputs.get(index).ok_or(Error::UnknownPort {
            kind: PortKind::Input,
            index,
        })
    }

    fn initialized(&self) -> OperonResult<(&OP, &OperatorContext)> {
        match (self.operator.get(), self.context.get()) {
            (Some(operator), Some(ctx)) => Ok((operator, ctx)),
            _ => reportable_error!("{} admitted before initialization", self.model.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::{AttributeType, Schema, SchemaRef, Value},
        operator_err,
        stream::{
            endpoint::debug::DebugEndpoint,
            operator::function::Transform,
            port::{OperatorPattern, OutputPortSet},
        },
        test_utils::LOGGER,
    };

    fn schema() -> SchemaRef {
        Schema::shared(vec![("id", AttributeType::Int64)]).unwrap()
    }

    fn tuple(id: i64) -> Tuple {
        Tuple::new(schema(), vec![Value::Int64(id)]).unwrap()
    }

    fn kernel<OP: Operator>(op: OP, sink: Option<Arc<DebugEndpoint>>) -> OperatorKernel<OP> {
        let model = OperatorModel::for_pattern(OperatorPattern::Process, "Op", "test");
        let binding = match sink {
            Some(sink) => PortBinding::new()
                .input("In", schema())
                .output_to("Out", schema(), sink),
            None => PortBinding::new()
                .input("In", schema())
                .output("Out", schema()),
        };
        OperatorKernel::with_logger(model, binding, op, OperonConf::default(), LOGGER.clone())
            .unwrap()
    }

    #[test]
    fn lifecycle_is_enforced() {
        let sink = Arc::new(DebugEndpoint::new());
        let kernel = kernel(Transform::pass_through(), Some(sink.clone()));

        assert!(matches!(
            kernel.all_ports_ready(),
            Err(Error::Lifecycle { state: LifecycleState::Created, .. })
        ));
        assert!(matches!(
            kernel.process(0, tuple(1)),
            Err(Error::Lifecycle { .. })
        ));

        kernel.initialize(ContextInfo::new(3, "job")).unwrap();
        assert!(kernel.initialize(ContextInfo::default()).is_err());
        assert_eq!(kernel.state(), LifecycleState::Initialized);
        assert!(kernel.process(0, tuple(1)).is_err());
        assert_eq!(kernel.context().unwrap().pe_id(), 3);

        kernel.all_ports_ready().unwrap();
        assert_eq!(kernel.state(), LifecycleState::Running);
        assert!(kernel.all_ports_ready().is_err());

        kernel.process(0, tuple(1)).unwrap();
        kernel.shutdown().unwrap();
        assert_eq!(kernel.state(), LifecycleState::Terminated);
        kernel.shutdown().unwrap();

        // discarded after shutdown
        kernel.process(0, tuple(2)).unwrap();
        kernel.process_punctuation(0, Punctuation::WindowMarker).unwrap();
        assert_eq!(sink.len(), 1);
    }

    struct SlowReady {
        entered: crossbeam_channel::Sender<()>,
    }

    impl Operator for SlowReady {
        fn all_ports_ready(&self, ctx: &OperatorContext) -> OperonResult<()> {
            let _ = self.entered.send(());
            std::thread::sleep(Duration::from_millis(150));
            let output = ctx.output(0)?;
            let mut out = output.new_tuple();
            out.set("id", 7i64)?;
            output.submit(out)
        }

        fn process(&self, _: &InputPort, _: Tuple, _: &OperatorContext) -> OperonResult<()> {
            Ok(())
        }

        crate::ignore_punctuation!();
    }

    #[test]
    fn shutdown_waits_for_ready_handler() {
        let sink = Arc::new(DebugEndpoint::new());
        let (entered_tx, entered_rx) = crossbeam_channel::bounded(1);
        let kernel = Arc::new(kernel(
            SlowReady {
                entered: entered_tx,
            },
            Some(sink.clone()),
        ));
        kernel.initialize(ContextInfo::default()).unwrap();

        let ready = {
            let kernel = kernel.clone();
            std::thread::spawn(move || kernel.all_ports_ready())
        };
        entered_rx.recv().unwrap();

        kernel.shutdown().unwrap();
        assert_eq!(kernel.state(), LifecycleState::Terminated);
        assert_eq!(sink.len(), 1);

        ready.join().unwrap().unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(kernel.state(), LifecycleState::Terminated);
    }

    #[test]
    fn unknown_ports_and_schema_mismatch() {
        let sink = Arc::new(DebugEndpoint::new());
        let kernel = kernel(Transform::pass_through(), Some(sink));
        kernel.initialize(ContextInfo::default()).unwrap();
        kernel.all_ports_ready().unwrap();

        assert!(matches!(
            kernel.process(4, tuple(1)),
            Err(Error::UnknownPort { kind: PortKind::Input, index: 4 })
        ));
        assert!(kernel.process_punctuation(1, Punctuation::FinalMarker).is_err());

        let other = Schema::shared(vec![("id", AttributeType::Int32)]).unwrap();
        let mismatched = Tuple::new(other, vec![Value::Int32(1)]).unwrap();
        assert!(matches!(
            kernel.process(0, mismatched),
            Err(Error::Schema { .. })
        ));
    }

    #[test]
    fn outputs_must_be_connected() {
        let kernel = kernel(Transform::pass_through(), None);
        kernel.initialize(ContextInfo::default()).unwrap();
        assert!(matches!(
            kernel.all_ports_ready(),
            Err(Error::InvalidBinding { .. })
        ));
        assert_eq!(kernel.state(), LifecycleState::Initialized);

        let sink = Arc::new(DebugEndpoint::new());
        kernel.connect_output(0, sink.clone()).unwrap();
        assert!(kernel.connect_output(1, sink.clone()).is_err());
        kernel.all_ports_ready().unwrap();
        assert!(matches!(
            kernel.connect_output(0, sink),
            Err(Error::Lifecycle { .. })
        ));
    }

    #[test]
    fn final_marker_closes_ports() {
        let sink = Arc::new(DebugEndpoint::new());
        let kernel = kernel(Transform::pass_through(), Some(sink.clone()));
        kernel.initialize(ContextInfo::default()).unwrap();
        kernel.all_ports_ready().unwrap();

        kernel.process(0, tuple(1)).unwrap();
        kernel.process_punctuation(0, Punctuation::FinalMarker).unwrap();
        assert!(matches!(
            kernel.process(0, tuple(2)),
            Err(Error::PortClosed { kind: PortKind::Input, index: 0 })
        ));
        assert!(kernel.process_punctuation(0, Punctuation::FinalMarker).is_err());
        assert_eq!(sink.punctuations(), vec![Punctuation::FinalMarker]);
        assert!(kernel.output(0).unwrap().is_finalized());
    }

    #[test]
    fn preserving_ports_get_window_markers() {
        let preserved = Arc::new(DebugEndpoint::new());
        let free = Arc::new(DebugEndpoint::new());
        let model = OperatorModel::new("Op", "")
            .with_input(crate::stream::port::InputPortSet::required("in"))
            .with_output(
                OutputPortSet::required("kept")
                    .punctuation_mode(WindowPunctuationOutputMode::Preserving),
            )
            .with_output(
                OutputPortSet::required("free").punctuation_mode(WindowPunctuationOutputMode::Free),
            );
        let binding = PortBinding::new()
            .input("In", schema())
            .output_to("Kept", schema(), preserved.clone())
            .output_to("Free", schema(), free.clone());
        let kernel = OperatorKernel::with_logger(
            model,
            binding,
            Transform::pass_through(),
            OperonConf::default(),
            LOGGER.clone(),
        )
        .unwrap();
        kernel.initialize(ContextInfo::default()).unwrap();
        kernel.all_ports_ready().unwrap();

        kernel.process(0, tuple(1)).unwrap();
        kernel.process_punctuation(0, Punctuation::WindowMarker).unwrap();
        kernel.process_punctuation(0, Punctuation::FinalMarker).unwrap();

        assert_eq!(preserved.tuples().len(), 1);
        assert_eq!(
            preserved.punctuations(),
            vec![Punctuation::WindowMarker, Punctuation::FinalMarker]
        );
        assert_eq!(free.punctuations(), vec![Punctuation::FinalMarker]);
    }

    struct FailingInit;

    impl Operator for FailingInit {
        fn initialize(&mut self, _ctx: &OperatorContext) -> OperonResult<()> {
            operator_err!("no database")
        }

        fn process(&self, _: &InputPort, _: Tuple, _: &OperatorContext) -> OperonResult<()> {
            Ok(())
        }

        crate::ignore_punctuation!();
    }

    #[test]
    fn failed_initialize_is_fatal() {
        let kernel = kernel(FailingInit, Some(Arc::new(DebugEndpoint::new())));
        let err = kernel.initialize(ContextInfo::default()).unwrap_err();
        assert!(err.is_operator_failure());
        assert_eq!(kernel.state(), LifecycleState::Initializing);
        assert!(kernel.all_ports_ready().is_err());
        assert!(kernel.operator().is_none());

        kernel.shutdown().unwrap();
        assert_eq!(kernel.state(), LifecycleState::Terminated);
    }

    #[test]
    fn shutdown_before_initialize() {
        let kernel = kernel(Transform::pass_through(), None);
        kernel.shutdown().unwrap();
        assert_eq!(kernel.state(), LifecycleState::Terminated);
        assert!(kernel.await_termination_timeout(Duration::from_millis(1)));
        assert!(kernel.initialize(ContextInfo::default()).is_err());
        assert!(kernel.production_status().is_none());
    }
}
