// Copyright (c) 2021, KTH Royal Institute of Technology.
// SPDX-License-Identifier: AGPL-3.0-only

use super::{ProductionContext, Producer, SourceOperator};
use crate::{
    data::{Punctuation, Value},
    error::OperonResult,
};
use slog::debug;

/// Emits a fixed list of rows, then a final marker
///
/// Row values are assigned positionally to the attributes of the output
/// schema; attributes past the end of a row keep their defaults.
pub struct CollectionSource {
    rows: std::vec::IntoIter<Vec<Value>>,
    port: usize,
    window: Option<usize>,
    emitted: usize,
}

impl CollectionSource {
    pub fn new(rows: Vec<Vec<Value>>) -> Self {
        CollectionSource {
            rows: rows.into_iter(),
            port: 0,
            window: None,
            emitted: 0,
        }
    }

    /// Submit to the given output port instead of port 0
    pub fn on_port(mut self, port: usize) -> Self {
        self.port = port;
        self
    }

    /// Emit a window marker after every `size` tuples
    pub fn window_every(mut self, size: usize) -> Self {
        self.window = if size == 0 { None } else { Some(size) };
        self
    }

    /// Wraps the collection into a source operator
    pub fn into_operator(self) -> SourceOperator<Self> {
        SourceOperator::new(self)
    }
}

impl Producer for CollectionSource {
    fn produce(&mut self, ctx: &ProductionContext) -> OperonResult<()> {
        let port = ctx.output(self.port)?;

        for row in &mut self.rows {
            if ctx.is_cancelled() {
                debug!(ctx.log(), "Collection cancelled after {} tuples", self.emitted);
                return Ok(());
            }
            let mut tuple = port.new_tuple();
            for (i, value) in row.into_iter().enumerate() {
                tuple.set_by_index(i, value)?;
            }
            port.submit(tuple)?;
            self.emitted += 1;

            if let Some(size) = self.window {
                if self.emitted % size == 0 {
                    port.punctuate(Punctuation::WindowMarker)?;
                }
            }
        }

        port.punctuate(Punctuation::FinalMarker)
    }
}
