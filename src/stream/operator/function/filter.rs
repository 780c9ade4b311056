// Copyright (c) 2021, KTH Royal Institute of Technology.
// SPDX-License-Identifier: AGPL-3.0-only

use crate::{
    data::Tuple,
    error::OperonResult,
    stream::{
        operator::{Operator, OperatorContext},
        port::InputPort,
    },
    util::{lock, OperonFnBounds},
};
use std::sync::Mutex;

/// Submits the tuples for which the udf holds to output port 0
pub struct Filter<F, S>
where
    F: Fn(&Tuple, &mut S) -> bool + OperonFnBounds,
    S: Send + 'static,
{
    state: Mutex<S>,
    udf: F,
}

impl Filter<fn(&Tuple, &mut ()) -> bool, ()> {
    #[allow(clippy::new_ret_no_self)]
    pub fn new(
        udf: impl Fn(&Tuple) -> bool + OperonFnBounds,
    ) -> Filter<impl Fn(&Tuple, &mut ()) -> bool + OperonFnBounds, ()> {
        let udf = move |input: &Tuple, _: &mut ()| udf(input);
        Filter {
            state: Mutex::new(()),
            udf,
        }
    }
}

impl<F, S> Filter<F, S>
where
    F: Fn(&Tuple, &mut S) -> bool + OperonFnBounds,
    S: Send + 'static,
{
    pub fn stateful(state: S, udf: F) -> Self {
        Filter {
            state: Mutex::new(state),
            udf,
        }
    }
}

impl<F, S> Operator for Filter<F, S>
where
    F: Fn(&Tuple, &mut S) -> bool + OperonFnBounds,
    S: Send + 'static,
{
    fn process(&self, _port: &InputPort, tuple: Tuple, ctx: &OperatorContext) -> OperonResult<()> {
        if (self.udf)(&tuple, &mut *lock(&self.state)) {
            let output = ctx.output(0)?;
            output.submit(output.new_tuple_from(&tuple))?;
        }
        Ok(())
    }

    crate::forward_punctuation!();
}
