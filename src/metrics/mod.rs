// Copyright (c) 2021, KTH Royal Institute of Technology.
// SPDX-License-Identifier: AGPL-3.0-only

//! Per-operator counters, compiled to no-ops unless the `metrics` feature is set

pub const TUPLES_RECEIVED: &str = "operon_tuples_received";
pub const TUPLES_SUBMITTED: &str = "operon_tuples_submitted";
pub const PUNCTUATIONS_RECEIVED: &str = "operon_punctuations_received";
pub const PRODUCTION_FAILURES: &str = "operon_production_failures";

cfg_if::cfg_if! {
    if #[cfg(feature = "metrics")] {
        pub mod log_recorder;

        #[inline]
        fn increment(name: &'static str, operator: &str) {
            ::metrics::increment_counter!(name, "operator" => operator.to_string());
        }
    } else {
        #[inline(always)]
        fn increment(_name: &'static str, _operator: &str) {}
    }
}

#[inline]
pub(crate) fn record_received(operator: &str) {
    increment(TUPLES_RECEIVED, operator);
}

#[inline]
pub(crate) fn record_submitted(operator: &str) {
    increment(TUPLES_SUBMITTED, operator);
}

#[inline]
pub(crate) fn record_punctuation(operator: &str) {
    increment(PUNCTUATIONS_RECEIVED, operator);
}

#[inline]
pub(crate) fn record_production_failure(operator: &str) {
    increment(PRODUCTION_FAILURES, operator);
}
