// Copyright (c) 2021, KTH Royal Institute of Technology.
// SPDX-License-Identifier: AGPL-3.0-only

/// Concrete port assignment of an operator invocation
pub mod binding;
/// Declared port sets and operator models
pub mod model;

pub use binding::PortBinding;
pub use model::{InputPortSet, OperatorModel, OperatorPattern, OutputPortSet};

use crate::{
    data::{schema::same_schema, OutputTuple, Punctuation, SchemaRef, StreamEvent},
    error::{Error, OperonResult},
    stream::endpoint::{Endpoint, Mute},
    util::lock,
};
use serde::Deserialize;
use std::{
    fmt,
    sync::{Arc, Mutex},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortKind {
    Input,
    Output,
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortKind::Input => write!(f, "input"),
            PortKind::Output => write!(f, "output"),
        }
    }
}

/// Number of concrete ports a declared port set accepts
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Fixed(usize),
    Unbounded,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMode {
    NonWindowed,
    Windowed,
    OptionallyWindowed,
}

/// How an input port relates to window punctuation
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPunctuationInputMode {
    Oblivious,
    Expecting,
    WindowBound,
}

/// How an output port produces window punctuation
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPunctuationOutputMode {
    /// The operator decides where window markers go
    Generating,
    /// The port never carries window markers
    Free,
    /// Window markers received on the inputs are forwarded by the kernel
    Preserving,
}

/// A concrete input port of an operator invocation
#[derive(Debug, Clone)]
pub struct InputPort {
    index: usize,
    name: String,
    schema: SchemaRef,
    set: usize,
    window_mode: WindowMode,
    punctuation_mode: WindowPunctuationInputMode,
}

impl InputPort {
    pub(crate) fn new(
        index: usize,
        name: String,
        schema: SchemaRef,
        set: &InputPortSet,
        set_index: usize,
    ) -> Self {
        InputPort {
            index,
            name,
            schema,
            set: set_index,
            window_mode: set.window_mode,
            punctuation_mode: set.punctuation_mode,
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Index of the declared port set this port belongs to
    #[inline]
    pub fn port_set(&self) -> usize {
        self.set
    }

    #[inline]
    pub fn window_mode(&self) -> WindowMode {
        self.window_mode
    }

    #[inline]
    pub fn punctuation_mode(&self) -> WindowPunctuationInputMode {
        self.punctuation_mode
    }
}

struct OutputState {
    endpoint: Arc<dyn Endpoint>,
    connected: bool,
    finalized: bool,
    submitted: u64,
}

struct OutputInner {
    index: usize,
    name: String,
    schema: SchemaRef,
    set: usize,
    punctuation_mode: WindowPunctuationOutputMode,
    operator: String,
    state: Mutex<OutputState>,
}

/// A concrete output port of an operator invocation
///
/// Cloning is cheap and every clone refers to the same port. Events are
/// handed to the connected [Endpoint] while the port lock is held, so the
/// endpoint observes them in the order the submit calls were serialized.
#[derive(Clone)]
pub struct OutputPort {
    inner: Arc<OutputInner>,
}

impl OutputPort {
    pub(crate) fn new(
        index: usize,
        name: String,
        schema: SchemaRef,
        set: &OutputPortSet,
        set_index: usize,
        operator: &str,
        endpoint: Option<Arc<dyn Endpoint>>,
    ) -> Self {
        let connected = endpoint.is_some();
        OutputPort {
            inner: Arc::new(OutputInner {
                index,
                name,
                schema,
                set: set_index,
                punctuation_mode: set.punctuation_mode,
                operator: operator.to_string(),
                state: Mutex::new(OutputState {
                    endpoint: endpoint.unwrap_or_else(|| Arc::new(Mute)),
                    connected,
                    finalized: false,
                    submitted: 0,
                }),
            }),
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.inner.index
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[inline]
    pub fn schema(&self) -> &SchemaRef {
        &self.inner.schema
    }

    #[inline]
    pub fn port_set(&self) -> usize {
        self.inner.set
    }

    #[inline]
    pub fn punctuation_mode(&self) -> WindowPunctuationOutputMode {
        self.inner.punctuation_mode
    }

    /// Creates a tuple of this port's schema with every attribute at its default
    pub fn new_tuple(&self) -> OutputTuple {
        OutputTuple::new(self.inner.schema.clone())
    }

    /// Creates a tuple of this port's schema and copies the attributes that
    /// match the given input tuple by name and type
    pub fn new_tuple_from(&self, tuple: &crate::data::Tuple) -> OutputTuple {
        let mut out = self.new_tuple();
        out.assign(tuple);
        out
    }

    /// Hands a tuple to the downstream endpoint
    pub fn submit(&self, tuple: OutputTuple) -> OperonResult<()> {
        if !same_schema(tuple.schema(), &self.inner.schema) {
            return Err(Error::Schema {
                msg: format!(
                    "tuple of {} submitted to output port {} of {}",
                    tuple.schema(),
                    self.inner.index,
                    self.inner.schema
                ),
            });
        }

        let mut state = lock(&self.inner.state);
        if state.finalized {
            return Err(self.closed());
        }
        state
            .endpoint
            .deliver(StreamEvent::Tuple(tuple.into_tuple()))?;
        state.submitted += 1;
        drop(state);

        crate::metrics::record_submitted(&self.inner.operator);
        Ok(())
    }

    /// Hands a punctuation to the downstream endpoint
    ///
    /// After a final marker the port is closed and any further traffic fails.
    pub fn punctuate(&self, mark: Punctuation) -> OperonResult<()> {
        if self.punctuate_if_open(mark)? {
            Ok(())
        } else {
            Err(self.closed())
        }
    }

    /// Like [OutputPort::punctuate] but returns false instead of failing on a closed port
    pub(crate) fn punctuate_if_open(&self, mark: Punctuation) -> OperonResult<bool> {
        if mark == Punctuation::WindowMarker
            && self.inner.punctuation_mode == WindowPunctuationOutputMode::Free
        {
            return Err(Error::Unsupported {
                msg: format!(
                    "window punctuation on punctuation free output port {}",
                    self.inner.index
                ),
            });
        }

        let mut state = lock(&self.inner.state);
        if state.finalized {
            return Ok(false);
        }
        state.endpoint.deliver(StreamEvent::Punctuation(mark))?;
        if mark == Punctuation::FinalMarker {
            state.finalized = true;
        }
        Ok(true)
    }

    pub fn is_finalized(&self) -> bool {
        lock(&self.inner.state).finalized
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.inner.state).connected
    }

    /// Number of tuples successfully handed downstream
    pub fn submitted(&self) -> u64 {
        lock(&self.inner.state).submitted
    }

    pub(crate) fn connect(&self, endpoint: Arc<dyn Endpoint>) {
        let mut state = lock(&self.inner.state);
        state.endpoint = endpoint;
        state.connected = true;
    }

    fn closed(&self) -> Error {
        Error::PortClosed {
            kind: PortKind::Output,
            index: self.inner.index,
        }
    }
}

impl fmt::Debug for OutputPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputPort")
            .field("index", &self.inner.index)
            .field("name", &self.inner.name)
            .field("schema", &self.inner.schema)
            .field("punctuation_mode", &self.inner.punctuation_mode)
            .finish()
    }
}
