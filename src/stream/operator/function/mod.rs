// Copyright (c) 2021, KTH Royal Institute of Technology.
// SPDX-License-Identifier: AGPL-3.0-only

pub mod filter;
pub mod transform;

pub use filter::Filter;
pub use transform::Transform;
