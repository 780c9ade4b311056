// Copyright (c) 2021, KTH Royal Institute of Technology.
// SPDX-License-Identifier: AGPL-3.0-only

use crate::{
    data::{OutputTuple, Tuple},
    error::OperonResult,
    stream::{
        operator::{Operator, OperatorContext},
        port::InputPort,
    },
    util::{lock, OperonFnBounds},
};
use std::sync::Mutex;

/// Process pattern: one output tuple per input tuple
///
/// The output tuple starts as a copy of every input attribute that matches
/// the schema of output port 0 by name and type, the udf then adjusts it
/// before it is submitted.
pub struct Transform<F, S>
where
    F: Fn(&Tuple, &mut OutputTuple, &mut S) -> OperonResult<()> + OperonFnBounds,
    S: Send + 'static,
{
    state: Mutex<S>,
    udf: F,
}

impl Transform<fn(&Tuple, &mut OutputTuple, &mut ()) -> OperonResult<()>, ()> {
    #[allow(clippy::new_ret_no_self)]
    pub fn new(
        udf: impl Fn(&Tuple, &mut OutputTuple) -> OperonResult<()> + OperonFnBounds,
    ) -> Transform<impl Fn(&Tuple, &mut OutputTuple, &mut ()) -> OperonResult<()> + OperonFnBounds, ()>
    {
        let udf = move |input: &Tuple, output: &mut OutputTuple, _: &mut ()| udf(input, output);
        Transform {
            state: Mutex::new(()),
            udf,
        }
    }

    /// A transform that forwards matching attributes unchanged
    #[allow(clippy::new_ret_no_self)]
    pub fn pass_through(
    ) -> Transform<impl Fn(&Tuple, &mut OutputTuple, &mut ()) -> OperonResult<()> + OperonFnBounds, ()>
    {
        Transform::new(|_: &Tuple, _: &mut OutputTuple| Ok(()))
    }
}

impl<F, S> Transform<F, S>
where
    F: Fn(&Tuple, &mut OutputTuple, &mut S) -> OperonResult<()> + OperonFnBounds,
    S: Send + 'static,
{
    /// The udf additionally gets exclusive access to `state`
    pub fn stateful(state: S, udf: F) -> Self {
        Transform {
            state: Mutex::new(state),
            udf,
        }
    }

    /// Consumes the operator, returning its state
    pub fn into_state(self) -> S {
        match self.state.into_inner() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<F, S> Operator for Transform<F, S>
where
    F: Fn(&Tuple, &mut OutputTuple, &mut S) -> OperonResult<()> + OperonFnBounds,
    S: Send + 'static,
{
    fn process(&self, _port: &InputPort, tuple: Tuple, ctx: &OperatorContext) -> OperonResult<()> {
        let output = ctx.output(0)?;
        let mut out = output.new_tuple_from(&tuple);
        (self.udf)(&tuple, &mut out, &mut *lock(&self.state))?;
        output.submit(out)
    }

    crate::forward_punctuation!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::{AttributeType, Schema, Value},
        operator_err,
        test::harness::Harness,
    };

    #[test]
    fn stateful_transform_numbers_tuples() {
        let schema = Schema::shared(vec![
            ("id", AttributeType::Int64),
            ("seq", AttributeType::UInt64),
        ])
        .unwrap();
        let op = Transform::stateful(0u64, |_: &Tuple, out: &mut OutputTuple, seen: &mut u64| {
            *seen += 1;
            out.set("seq", *seen)?;
            Ok(())
        });
        let harness = Harness::process(op, schema);

        for id in 0..3i64 {
            harness.push(0, vec![Value::Int64(id), Value::UInt64(99)]).unwrap();
        }

        let seqs: Vec<u64> = harness
            .captured(0)
            .tuples()
            .iter()
            .map(|t| t.get_u64("seq").unwrap())
            .collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        harness.kernel().shutdown().unwrap();
        assert_eq!(*harness.kernel().operator().unwrap().state.lock().unwrap(), 3);
    }

    #[test]
    fn udf_failure_propagates() {
        let schema = Schema::shared(vec![("id", AttributeType::Int64)]).unwrap();
        let op = Transform::new(|input: &Tuple, _: &mut OutputTuple| {
            if input.get_i64("id")? < 0 {
                return operator_err!("negative id");
            }
            Ok(())
        });
        let harness = Harness::process(op, schema);
        harness.push(0, vec![Value::Int64(1)]).unwrap();
        let err = harness.push(0, vec![Value::Int64(-1)]).unwrap_err();
        assert!(err.is_operator_failure());
        assert_eq!(harness.captured(0).len(), 1);
    }
}
