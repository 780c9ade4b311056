// Copyright (c) 2021, KTH Royal Institute of Technology.
// SPDX-License-Identifier: AGPL-3.0-only

use crate::conf::logger::KernelLogger;
use metrics::{GaugeValue, Key, Recorder, Unit};
use slog::debug;

/// A [Recorder] that writes every metric event to a logger at debug level
pub struct LogRecorder {
    pub(crate) logger: KernelLogger,
}

impl LogRecorder {
    pub fn new(logger: KernelLogger) -> Self {
        LogRecorder { logger }
    }

    /// Installs the recorder as the global metrics recorder
    pub fn install(logger: KernelLogger) -> Result<(), metrics::SetRecorderError> {
        metrics::set_boxed_recorder(Box::new(LogRecorder::new(logger)))
    }
}

impl Recorder for LogRecorder {
    fn register_counter(&self, key: &Key, unit: Option<Unit>, description: Option<&'static str>) {
        debug!(
            self.logger,
            "(counter) registered key {} with unit {:?} and description {:?}", key, unit, description
        );
    }

    fn register_gauge(&self, key: &Key, unit: Option<Unit>, description: Option<&'static str>) {
        debug!(
            self.logger,
            "(gauge) registered key {} with unit {:?} and description {:?}", key, unit, description
        );
    }

    fn register_histogram(&self, key: &Key, unit: Option<Unit>, description: Option<&'static str>) {
        debug!(
            self.logger,
            "(histogram) registered key {} with unit {:?} and description {:?}",
            key,
            unit,
            description
        );
    }

    fn increment_counter(&self, key: &Key, value: u64) {
        debug!(self.logger, "(counter) got value {} for key {}", value, key);
    }

    fn update_gauge(&self, key: &Key, value: GaugeValue) {
        debug!(self.logger, "(gauge) got value {:?} for key {}", value, key);
    }

    fn record_histogram(&self, key: &Key, value: f64) {
        debug!(self.logger, "(histogram) got value {} for key {}", value, key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slog::{o, Drain, Never, OwnedKVList, Record};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<String>>>);

    impl Captured {
        fn lines(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Drain for Captured {
        type Ok = ();
        type Err = Never;

        fn log(&self, record: &Record, _: &OwnedKVList) -> Result<(), Never> {
            self.0.lock().unwrap().push(record.msg().to_string());
            Ok(())
        }
    }

    #[test]
    fn recorder_logs_counter_events() {
        let captured = Captured::default();
        let recorder = LogRecorder::new(KernelLogger::root(captured.clone(), o!()));
        let key = Key::from_name(crate::metrics::TUPLES_RECEIVED);

        recorder.register_counter(&key, None, Some("tuples delivered to the operator"));
        recorder.increment_counter(&key, 3);

        let lines = captured.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("(counter) registered key"));
        assert!(lines[1].starts_with("(counter) got value 3"));
        assert!(lines[1].contains(crate::metrics::TUPLES_RECEIVED));
    }

    #[test]
    fn installed_recorder_sees_kernel_counters() {
        let captured = Captured::default();
        LogRecorder::install(KernelLogger::root(captured.clone(), o!())).unwrap();

        crate::metrics::record_punctuation("metrics-test");

        assert!(captured
            .lines()
            .iter()
            .any(|line| line.contains(crate::metrics::PUNCTUATIONS_RECEIVED)));
    }
}
