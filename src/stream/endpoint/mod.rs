// Copyright (c) 2021, KTH Royal Institute of Technology.
// SPDX-License-Identifier: AGPL-3.0-only

/// Debug version of an [Endpoint] that records everything it receives
pub mod debug;

use crate::{data::StreamEvent, error::OperonResult};

/// The runtime side of an output port
///
/// An output port hands every submitted tuple and punctuation mark to its
/// endpoint, in submission order. Endpoints are shared between threads.
pub trait Endpoint: Send + Sync {
    fn deliver(&self, event: StreamEvent) -> OperonResult<()>;
}

impl<F> Endpoint for F
where
    F: Fn(StreamEvent) -> OperonResult<()> + Send + Sync,
{
    #[inline]
    fn deliver(&self, event: StreamEvent) -> OperonResult<()> {
        (self)(event)
    }
}

/// An endpoint that simply does nothing
///
/// Output ports start out connected to it until the runtime wires them.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mute;

impl Endpoint for Mute {
    #[inline]
    fn deliver(&self, _: StreamEvent) -> OperonResult<()> {
        Ok(())
    }
}

/// An endpoint that prints to the console
#[derive(Debug, Default, Clone, Copy)]
pub struct Console;

impl Endpoint for Console {
    fn deliver(&self, event: StreamEvent) -> OperonResult<()> {
        match event {
            StreamEvent::Tuple(t) => println!("{}", t),
            StreamEvent::Punctuation(p) => println!("{}", p),
        }
        Ok(())
    }
}
