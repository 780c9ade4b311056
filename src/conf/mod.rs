// Copyright (c) 2021, KTH Royal Institute of Technology.
// SPDX-License-Identifier: AGPL-3.0-only

pub mod logger;

use crate::error::{Error, OperonResult};
use hocon::HoconLoader;
use logger::{KernelLogger, LoggerType, OPERON_LOG_NAME};
use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Configuration shared by the kernels of one execution unit
#[derive(Deserialize, Clone, Debug)]
pub struct OperonConf {
    /// Prefix of every thread spawned by the default thread factory
    #[serde(default = "thread_name_prefix_default")]
    pub thread_name_prefix: String,
    /// Stack size in bytes for production and dispatch threads
    #[serde(default = "production_stack_size_default")]
    pub production_stack_size: usize,
    /// Upper bound in milliseconds a production routine should sleep between cancellation checks
    #[serde(default = "cancellation_poll_interval_default")]
    pub cancellation_poll_interval: u64,
    /// Events buffered per input port before senders block, 0 means unbounded
    #[serde(default = "port_queue_capacity_default")]
    pub port_queue_capacity: usize,
    #[serde(default)]
    pub logger_type: LoggerType,
    /// Directory used by [LoggerType::File]
    #[serde(default = "log_dir_default")]
    pub log_dir: PathBuf,
}

impl Default for OperonConf {
    fn default() -> Self {
        OperonConf {
            thread_name_prefix: thread_name_prefix_default(),
            production_stack_size: production_stack_size_default(),
            cancellation_poll_interval: cancellation_poll_interval_default(),
            port_queue_capacity: port_queue_capacity_default(),
            logger_type: LoggerType::default(),
            log_dir: log_dir_default(),
        }
    }
}

impl OperonConf {
    /// Loads OperonConf from a file
    pub fn from_file(path: impl AsRef<Path>) -> OperonResult<OperonConf> {
        let data = std::fs::read_to_string(path).map_err(|e| Error::Config {
            msg: format!("Failed to read config file with err {}", e),
        })?;
        Self::load_str(&data)
    }

    /// Loads OperonConf from a HOCON string
    pub fn load_str(data: &str) -> OperonResult<OperonConf> {
        let loader: HoconLoader = HoconLoader::new().load_str(data).map_err(|e| Error::Config {
            msg: format!("Failed to load Hocon Loader with err {}", e),
        })?;

        loader.resolve().map_err(|e| Error::Config {
            msg: format!("Failed to resolve OperonConf with err {}", e),
        })
    }

    #[inline]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.cancellation_poll_interval)
    }

    /// Builds the configured logger
    pub fn logger(&self) -> OperonResult<KernelLogger> {
        match self.logger_type {
            LoggerType::Terminal => Ok(logger::term_logger()),
            LoggerType::Discard => Ok(logger::discard_logger()),
            LoggerType::File => {
                std::fs::create_dir_all(&self.log_dir)?;
                logger::file_logger(self.log_dir.join(OPERON_LOG_NAME))
            }
        }
    }
}

// Default values

fn thread_name_prefix_default() -> String {
    String::from("operon")
}

fn production_stack_size_default() -> usize {
    2 * 1024 * 1024
}

fn cancellation_poll_interval_default() -> u64 {
    100
}

fn port_queue_capacity_default() -> usize {
    1024
}

fn log_dir_default() -> PathBuf {
    let mut res = std::env::temp_dir();
    res.push("operon");
    res
}
