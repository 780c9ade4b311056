// Copyright (c) 2021, KTH Royal Institute of Technology.
// SPDX-License-Identifier: AGPL-3.0-only

/// Process pattern operators
pub mod function;
/// Sink pattern operators
pub mod sink;

use crate::{
    conf::{logger::KernelLogger, OperonConf},
    data::{Punctuation, Tuple},
    error::{Error, OperonResult},
    stream::{
        port::{InputPort, OutputPort, PortKind, WindowPunctuationOutputMode},
        source::{thread::ThreadFactory, Producer},
    },
};
use std::sync::Arc;

/// Defines the handlers an `Operator` may implement
///
/// `initialize` and `producer` run alone and may mutate the operator. Every
/// other handler takes `&self` as it may be invoked concurrently from
/// several input ports and from shutdown, so state shared between
/// invocations must be synchronized by the operator itself.
pub trait Operator: Send + Sync + 'static {
    /// Determines what the `Operator` sets up before any port is ready
    fn initialize(&mut self, _ctx: &OperatorContext) -> OperonResult<()> {
        Ok(())
    }

    /// Hands the kernel a production routine to run on a dedicated thread
    ///
    /// Called once, right after `initialize`.
    fn producer(&mut self, _ctx: &OperatorContext) -> OperonResult<Option<Box<dyn Producer>>> {
        Ok(None)
    }

    /// Called once every port is connected, before any delivery.
    ///
    /// Must not block.
    fn all_ports_ready(&self, _ctx: &OperatorContext) -> OperonResult<()> {
        Ok(())
    }

    /// Determines how the `Operator` processes a tuple arriving on `port`
    fn process(&self, port: &InputPort, tuple: Tuple, ctx: &OperatorContext) -> OperonResult<()>;

    /// Determines how the `Operator` handles a punctuation arriving on `port`
    fn process_punctuation(
        &self,
        port: &InputPort,
        mark: Punctuation,
        ctx: &OperatorContext,
    ) -> OperonResult<()>;

    /// Releases resources. Runs after the production thread has been joined
    fn shutdown(&self, _ctx: &OperatorContext) -> OperonResult<()> {
        Ok(())
    }
}

/// Helper macro to implement `process_punctuation` by forwarding window markers
///
/// See [forward_punctuation].
#[macro_export]
macro_rules! forward_punctuation {
    () => {
        fn process_punctuation(
            &self,
            _port: &$crate::stream::port::InputPort,
            mark: $crate::data::Punctuation,
            ctx: &$crate::stream::operator::OperatorContext,
        ) -> $crate::error::OperonResult<()> {
            $crate::stream::operator::forward_punctuation(ctx, mark)
        }
    };
}

/// Helper macro to implement an empty `process_punctuation` function
#[macro_export]
macro_rules! ignore_punctuation {
    () => {
        fn process_punctuation(
            &self,
            _port: &$crate::stream::port::InputPort,
            _mark: $crate::data::Punctuation,
            _ctx: &$crate::stream::operator::OperatorContext,
        ) -> $crate::error::OperonResult<()> {
            Ok(())
        }
    };
}

/// Helper macro for operators without input ports
#[macro_export]
macro_rules! no_input_ports {
    () => {
        fn process(
            &self,
            port: &$crate::stream::port::InputPort,
            _tuple: $crate::data::Tuple,
            _ctx: &$crate::stream::operator::OperatorContext,
        ) -> $crate::error::OperonResult<()> {
            Err($crate::error::Error::Unsupported {
                msg: format!("tuple on input port {} of an operator without inputs", port.index()),
            })
        }

        fn process_punctuation(
            &self,
            port: &$crate::stream::port::InputPort,
            _mark: $crate::data::Punctuation,
            _ctx: &$crate::stream::operator::OperatorContext,
        ) -> $crate::error::OperonResult<()> {
            Err($crate::error::Error::Unsupported {
                msg: format!(
                    "punctuation on input port {} of an operator without inputs",
                    port.index()
                ),
            })
        }
    };
}

/// Forwards a window marker to every output port that generates punctuation
///
/// Final markers are left to the kernel, which closes every output port
/// once all input ports have delivered theirs.
pub fn forward_punctuation(ctx: &OperatorContext, mark: Punctuation) -> OperonResult<()> {
    if mark != Punctuation::WindowMarker {
        return Ok(());
    }
    for port in ctx.outputs() {
        if port.punctuation_mode() == WindowPunctuationOutputMode::Generating {
            port.punctuate_if_open(mark)?;
        }
    }
    Ok(())
}

/// What the runtime tells a kernel about where it runs
pub struct ContextInfo {
    /// Id of the processing element hosting the operator
    pub pe_id: u64,
    pub job_id: String,
    /// Root logger, the kernel's own logger is used if absent
    pub logger: Option<KernelLogger>,
    /// Factory for background threads, a [NamedThreadFactory](crate::stream::source::thread::NamedThreadFactory) if absent
    pub thread_factory: Option<Arc<dyn ThreadFactory>>,
}

impl ContextInfo {
    pub fn new(pe_id: u64, job_id: impl Into<String>) -> Self {
        ContextInfo {
            pe_id,
            job_id: job_id.into(),
            logger: None,
            thread_factory: None,
        }
    }

    pub fn with_logger(mut self, logger: KernelLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_thread_factory(mut self, factory: Arc<dyn ThreadFactory>) -> Self {
        self.thread_factory = Some(factory);
        self
    }
}

impl Default for ContextInfo {
    fn default() -> Self {
        ContextInfo::new(0, uuid::Uuid::new_v4().to_string())
    }
}

/// Context available to an Operator
pub struct OperatorContext {
    name: String,
    namespace: String,
    pe_id: u64,
    job_id: String,
    logger: KernelLogger,
    thread_factory: Arc<dyn ThreadFactory>,
    conf: Arc<OperonConf>,
    inputs: Vec<InputPort>,
    outputs: Vec<OutputPort>,
}

impl OperatorContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        namespace: String,
        pe_id: u64,
        job_id: String,
        logger: KernelLogger,
        thread_factory: Arc<dyn ThreadFactory>,
        conf: Arc<OperonConf>,
        inputs: Vec<InputPort>,
        outputs: Vec<OutputPort>,
    ) -> Self {
        OperatorContext {
            name,
            namespace,
            pe_id,
            job_id,
            logger,
            thread_factory,
            conf,
            inputs,
            outputs,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[inline]
    pub fn pe_id(&self) -> u64 {
        self.pe_id
    }

    #[inline]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Enable users to log within an Operator
    ///
    /// `error!(ctx.log(), "Something bad happened!");`
    #[inline]
    pub fn log(&self) -> &KernelLogger {
        &self.logger
    }

    #[inline]
    pub fn thread_factory(&self) -> &Arc<dyn ThreadFactory> {
        &self.thread_factory
    }

    #[inline]
    pub fn conf(&self) -> &OperonConf {
        &self.conf
    }

    pub fn input(&self, index: usize) -> OperonResult<&InputPort> {
        self.inputs.get(index).ok_or(Error::UnknownPort {
            kind: PortKind::Input,
            index,
        })
    }

    pub fn output(&self, index: usize) -> OperonResult<&OutputPort> {
        self.outputs.get(index).ok_or(Error::UnknownPort {
            kind: PortKind::Output,
            index,
        })
    }

    #[inline]
    pub fn inputs(&self) -> &[InputPort] {
        &self.inputs
    }

    #[inline]
    pub fn outputs(&self) -> &[OutputPort] {
        &self.outputs
    }
}
