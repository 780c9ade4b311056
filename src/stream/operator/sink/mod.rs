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

/// Sink pattern: hands every tuple to a udf and ignores punctuation
pub struct ForEach<F, S>
where
    F: Fn(&InputPort, &Tuple, &mut S) -> OperonResult<()> + OperonFnBounds,
    S: Send + 'static,
{
    state: Mutex<S>,
    udf: F,
}

impl ForEach<fn(&InputPort, &Tuple, &mut ()) -> OperonResult<()>, ()> {
    #[allow(clippy::new_ret_no_self)]
    pub fn new(
        udf: impl Fn(&Tuple) -> OperonResult<()> + OperonFnBounds,
    ) -> ForEach<impl Fn(&InputPort, &Tuple, &mut ()) -> OperonResult<()> + OperonFnBounds, ()>
    {
        let udf = move |_: &InputPort, input: &Tuple, _: &mut ()| udf(input);
        ForEach {
            state: Mutex::new(()),
            udf,
        }
    }
}

impl<F, S> ForEach<F, S>
where
    F: Fn(&InputPort, &Tuple, &mut S) -> OperonResult<()> + OperonFnBounds,
    S: Send + 'static,
{
    pub fn stateful(state: S, udf: F) -> Self {
        ForEach {
            state: Mutex::new(state),
            udf,
        }
    }

    /// Runs `f` with the sink state locked
    pub fn with_state<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut *lock(&self.state))
    }
}

impl<F, S> Operator for ForEach<F, S>
where
    F: Fn(&InputPort, &Tuple, &mut S) -> OperonResult<()> + OperonFnBounds,
    S: Send + 'static,
{
    fn process(&self, port: &InputPort, tuple: Tuple, _ctx: &OperatorContext) -> OperonResult<()> {
        (self.udf)(port, &tuple, &mut *lock(&self.state))
    }

    crate::ignore_punctuation!();
}
