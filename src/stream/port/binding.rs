// Copyright (c) 2021, KTH Royal Institute of Technology.
// SPDX-License-Identifier: AGPL-3.0-only

use super::{InputPort, OperatorModel, OutputPort};
use crate::{
    data::SchemaRef,
    error::{Error, OperonResult},
    stream::endpoint::Endpoint,
};
use std::sync::Arc;

/// Concrete ports of one operator invocation, listed in port index order
///
/// ```
/// use operon::prelude::*;
///
/// let schema = Schema::shared(vec![("id", AttributeType::Int64)]).unwrap();
/// let binding = PortBinding::new()
///     .input("In", schema.clone())
///     .output("Out", schema);
/// assert_eq!(binding.input_count(), 1);
/// ```
#[derive(Default)]
pub struct PortBinding {
    inputs: Vec<(String, SchemaRef)>,
    outputs: Vec<(String, SchemaRef, Option<Arc<dyn Endpoint>>)>,
}

impl PortBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, name: impl Into<String>, schema: SchemaRef) -> Self {
        self.inputs.push((name.into(), schema));
        self
    }

    /// Adds an output port that must be connected before the operator starts
    pub fn output(mut self, name: impl Into<String>, schema: SchemaRef) -> Self {
        self.outputs.push((name.into(), schema, None));
        self
    }

    /// Adds an output port already connected to a downstream endpoint
    pub fn output_to(
        mut self,
        name: impl Into<String>,
        schema: SchemaRef,
        endpoint: Arc<dyn Endpoint>,
    ) -> Self {
        self.outputs.push((name.into(), schema, Some(endpoint)));
        self
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Validates the model and creates ports assigned to its declared sets
    pub(crate) fn bind(
        self,
        model: &OperatorModel,
    ) -> OperonResult<(Vec<InputPort>, Vec<OutputPort>)> {
        model.validate()?;

        let input_sets = model.assign_inputs(self.inputs.len())?;
        let output_sets = model.assign_outputs(self.outputs.len())?;

        let inputs = self
            .inputs
            .into_iter()
            .zip(input_sets)
            .enumerate()
            .map(|(index, ((name, schema), set))| {
                InputPort::new(index, name, schema, &model.inputs[set], set)
            })
            .collect();

        let qualified = model.qualified_name();
        let mut outputs = Vec::with_capacity(self.outputs.len());
        for (index, ((name, schema, endpoint), set)) in
            self.outputs.into_iter().zip(output_sets).enumerate()
        {
            if outputs.iter().any(|o: &OutputPort| o.name() == name) {
                return Err(Error::InvalidBinding {
                    msg: format!("duplicate output port name {}", name),
                });
            }
            outputs.push(OutputPort::new(
                index,
                name,
                schema,
                &model.outputs[set],
                set,
                &qualified,
                endpoint,
            ));
        }

        Ok((inputs, outputs))
    }
}
