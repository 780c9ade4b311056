// Copyright (c) 2021, KTH Royal Institute of Technology.
// SPDX-License-Identifier: AGPL-3.0-only

use crate::error::OperonResult;
use serde::Deserialize;
use slog::{o, Discard, Drain, Logger};
use std::{fs::OpenOptions, path::Path};

/// Alias for the logger handed to kernels and operators
pub type KernelLogger = Logger;

pub const OPERON_LOG_NAME: &str = "operon.log";

/// Defines a logger type
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoggerType {
    /// Logs output directly to the terminal
    Terminal,
    /// Logs output to file
    File,
    /// Drops every record
    Discard,
}

impl Default for LoggerType {
    fn default() -> Self {
        LoggerType::Terminal
    }
}

fn location() -> slog::OwnedKV<impl slog::SendSyncRefUnwindSafeKV> {
    o!(
    "location" => slog::PushFnValue(|r: &slog::Record<'_>, ser: slog::PushFnValueSerializer<'_>| {
        ser.emit(format_args!("{}:{}", r.file(), r.line()))
    }))
}

pub fn term_logger() -> KernelLogger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).chan_size(1024).build().fuse();

    Logger::root(drain, location())
}

/// Creates a logger that truncates and writes to `log_path`
pub fn file_logger(log_path: impl AsRef<Path>) -> OperonResult<KernelLogger> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(log_path)?;

    let decorator = slog_term::PlainDecorator::new(file);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).chan_size(1024).build().fuse();

    Ok(Logger::root(drain, location()))
}

pub fn discard_logger() -> KernelLogger {
    Logger::root(Discard, o!())
}
