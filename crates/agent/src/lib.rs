// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Binary crate: wires the other crates together into the running agent
//! (request processing, module registry construction, logging, `main`).

pub mod bootstrap;
pub mod logging;
pub mod processor;

pub use bootstrap::build_registry;
pub use processor::RequestProcessor;
