// Copyright (c) 2021, KTH Royal Institute of Technology.
// SPDX-License-Identifier: AGPL-3.0-only

/// A helper macro to indicate a reportable bug
#[macro_export]
macro_rules! reportable_error {
    ( $($arg:tt)* ) => ({
        $crate::error::OperonResult::Err($crate::error::Error::ReportableBug { msg: format!($($arg)*) })
    })
}

/// A helper macro for operator handlers that want to fail with a formatted message
///
/// `return operator_err!("lookup of key {} failed", key);`
#[macro_export]
macro_rules! operator_err {
    ( $($arg:tt)* ) => ({
        $crate::error::OperonResult::Err($crate::error::Error::Operator { msg: format!($($arg)*) })
    })
}

use crate::stream::{lifecycle::LifecycleState, port::PortKind};
use snafu::Snafu;
use std::io;

/// Top level Result type in Operon
pub type OperonResult<T> = std::result::Result<T, Error>;

/// A top level Error type for the operator kernel
///
/// Every error that leaves a lifecycle or delivery call is fatal to the
/// enclosing execution unit. The kernel itself never retries.
#[derive(Debug, Snafu)]
pub enum Error {
    /// The kernel has been used in an unsupported way.
    #[snafu(display("Unsupported operation {}", msg))]
    Unsupported { msg: String },
    /// An unexpected bug has happened.
    #[snafu(display("Unexpected bug {}, please report it", msg))]
    ReportableBug { msg: String },
    /// A read or write error, or a failure to spawn a thread.
    #[snafu(display("An IO error occured {}", error))]
    Io { error: io::Error },
    /// A lifecycle call arrived in a state that does not admit it
    #[snafu(display("Cannot {} while the operator is {}", operation, state))]
    Lifecycle {
        operation: &'static str,
        state: LifecycleState,
    },
    /// The declared port sets of an operator model are inconsistent
    #[snafu(display("Invalid operator model {}", msg))]
    InvalidModel { msg: String },
    /// The concrete ports of an invocation do not fit the declared port sets
    #[snafu(display("Invalid port binding {}", msg))]
    InvalidBinding { msg: String },
    /// Schema construction failed or a tuple does not conform to a schema
    #[snafu(display("Schema error {}", msg))]
    Schema { msg: String },
    #[snafu(display("No {} port with index {}", kind, index))]
    UnknownPort { kind: PortKind, index: usize },
    /// Traffic on a port after its final punctuation
    #[snafu(display("{} port {} already received its final punctuation", kind, index))]
    PortClosed { kind: PortKind, index: usize },
    /// Failure raised by operator business logic
    #[snafu(display("Operator failure {}", msg))]
    Operator { msg: String },
    #[snafu(display("Failed to load configuration {}", msg))]
    Config { msg: String },
}

impl Error {
    /// Returns true if the error was raised by operator logic rather than the kernel
    pub fn is_operator_failure(&self) -> bool {
        matches!(self, Error::Operator { .. })
    }
}

impl From<io::Error> for Error {
    #[inline]
    fn from(io_error: io::Error) -> Self {
        Error::Io { error: io_error }
    }
}

impl From<Error> for io::Error {
    fn from(error: Error) -> io::Error {
        use self::Error::*;
        use std::io::ErrorKind;
        match error {
            Io { error } => error,
            Unsupported { ref msg } => io::Error::new(
                ErrorKind::InvalidInput,
                format!("operation not supported: {:?}", msg),
            ),
            ReportableBug { ref msg } => {
                io::Error::new(ErrorKind::Other, format!("unexpected bug! {:?}", msg))
            }
            PortClosed { kind, index } => io::Error::new(
                ErrorKind::BrokenPipe,
                format!("{} port {} is closed", kind, index),
            ),
            Schema { ref msg } => io::Error::new(
                ErrorKind::InvalidData,
                format!("schema mismatch: {:?}", msg),
            ),
            other => io::Error::new(ErrorKind::Other, other.to_string()),
        }
    }
}
