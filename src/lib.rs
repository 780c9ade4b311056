// Copyright (c) 2021, KTH Royal Institute of Technology.
// SPDX-License-Identifier: AGPL-3.0-only

//! Operon is an execution kernel for streaming dataflow operators.
//!
//! An [OperatorKernel](stream::kernel::OperatorKernel) hosts a single
//! operator invocation. It validates the declared ports against the
//! concrete ones, drives the operator through its lifecycle, routes tuples
//! and punctuation from input ports into the operator's handlers and runs
//! the production routine of source operators on a dedicated thread.

// Public Interface

/// Operon Configuration
pub mod conf;
/// Tuples, schemas and punctuation
pub mod data;
/// Error types and helper macros
pub mod error;
/// Contains the core stream logic
pub mod stream;

// Internal modules

/// Operon metrics
mod metrics;
/// Test module containing scenario tests that span several components
#[cfg(test)]
mod test;
/// Internal Operon Utilities
mod util;

pub use util::OperonFnBounds;

#[cfg(feature = "metrics")]
pub use metrics::log_recorder::LogRecorder;


/// Helper module that imports everything related to operon into scope
pub mod prelude {
    pub use crate::{
        conf::{
            logger::{KernelLogger, LoggerType},
            OperonConf,
        },
        data::{
            Attribute, AttributeType, OutputTuple, Punctuation, Schema, SchemaRef, StreamEvent,
            Tuple, Value,
        },
        error::{Error, OperonResult},
        operator_err,
        stream::{
            dispatch::{Dispatcher, PortSender},
            endpoint::{debug::DebugEndpoint, Console, Endpoint, Mute},
            kernel::OperatorKernel,
            lifecycle::LifecycleState,
            operator::{
                forward_punctuation,
                function::{Filter, Transform},
                sink::ForEach,
                ContextInfo, Operator, OperatorContext,
            },
            port::{
                Cardinality, InputPort, InputPortSet, OperatorModel, OperatorPattern, OutputPort,
                OutputPortSet, PortBinding, PortKind, WindowMode, WindowPunctuationInputMode,
                WindowPunctuationOutputMode,
            },
            source::{
                collection::CollectionSource,
                thread::{NamedThreadFactory, ProductionStatus, ThreadFactory},
                token::CancellationToken,
                ProductionContext, Producer, SourceOperator,
            },
        },
    };
}
