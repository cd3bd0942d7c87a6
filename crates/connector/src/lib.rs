// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Mutual-TLS WebSocket transport to the PCP broker: connect/associate/
//! keepalive loop, wire framing, and the outbound `send_*` surface
//! (spec.md §4.8).

mod connector;
mod error;
mod frame;
mod tls;

pub use connector::{MessageHandler, PcpConnector, WsConnector};
pub use error::ConnectorError;
pub use frame::{parse as parse_frame, render as render_frame};
pub use tls::build_client_config;
