// Copyright (c) 2021, KTH Royal Institute of Technology.
// SPDX-License-Identifier: AGPL-3.0-only

/// Per-port worker queues feeding a kernel
pub mod dispatch;
/// Downstream receivers of output port traffic
pub mod endpoint;
/// The operator kernel
pub mod kernel;
/// Lifecycle states and admission
pub mod lifecycle;
/// Operator trait, context and built-in operators
pub mod operator;
/// Port declarations and concrete ports
pub mod port;
/// Production threads for source operators
pub mod source;
