// Copyright (c) 2021, KTH Royal Institute of Technology.
// SPDX-License-Identifier: AGPL-3.0-only

/// Source emitting a fixed collection of rows
pub mod collection;
/// Production thread handle and thread factories
pub mod thread;
/// Cooperative cancellation
pub mod token;

use crate::{
    conf::logger::KernelLogger,
    error::{Error, OperonResult},
    stream::{
        operator::{Operator, OperatorContext},
        port::{OutputPort, PortKind},
    },
};
use std::{sync::Mutex, time::Duration};
use token::CancellationToken;

/// A production routine run once on a dedicated thread
///
/// The routine submits to output ports until it is done or until it
/// observes cancellation through its [ProductionContext]. Returning an
/// error does not fail the operator; the error is logged and recorded in
/// the production status.
pub trait Producer: Send + 'static {
    fn produce(&mut self, ctx: &ProductionContext) -> OperonResult<()>;
}

impl<F> Producer for F
where
    F: FnMut(&ProductionContext) -> OperonResult<()> + Send + 'static,
{
    fn produce(&mut self, ctx: &ProductionContext) -> OperonResult<()> {
        (self)(ctx)
    }
}

/// What a production routine can see of its operator
pub struct ProductionContext {
    operator: String,
    outputs: Vec<OutputPort>,
    token: CancellationToken,
    logger: KernelLogger,
}

impl ProductionContext {
    pub(crate) fn new(
        operator: String,
        outputs: Vec<OutputPort>,
        token: CancellationToken,
        logger: KernelLogger,
    ) -> Self {
        ProductionContext {
            operator,
            outputs,
            token,
            logger,
        }
    }

    #[inline]
    pub fn operator(&self) -> &str {
        &self.operator
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

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Sleeps unless cancelled first, returning true if the full duration passed
    #[inline]
    pub fn sleep(&self, duration: Duration) -> bool {
        self.token.sleep(duration)
    }

    #[inline]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Logger tagged with the operator, PE and job
    #[inline]
    pub fn log(&self) -> &KernelLogger {
        &self.logger
    }
}

/// Source pattern: an operator whose only behaviour is its production routine
pub struct SourceOperator<P: Producer> {
    producer: Mutex<Option<P>>,
}

impl<P: Producer> SourceOperator<P> {
    pub fn new(producer: P) -> Self {
        SourceOperator {
            producer: Mutex::new(Some(producer)),
        }
    }
}

impl<P: Producer> Operator for SourceOperator<P> {
    fn producer(&mut self, _ctx: &OperatorContext) -> OperonResult<Option<Box<dyn Producer>>> {
        let producer = match self.producer.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        Ok(producer.map(|p| Box::new(p) as Box<dyn Producer>))
    }

    crate::no_input_ports!();
}
