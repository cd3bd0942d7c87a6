// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pxp-core: shared data model, error taxonomy, and concurrency primitives
//! for the PCP/PXP remote-execution agent.

pub mod macros;

pub mod action;
pub mod clock;
pub mod config;
pub mod error;
pub mod ids;
pub mod mutex_registry;
pub mod purge;
pub mod status;
pub mod thread_container;

pub use action::{
    ActionMetadata, ActionOutput, ActionRequest, ActionResponse, ModuleType, RequestData,
    RequestEnvelope, RequestType, ResponseKind,
};
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{
    ConfigError, Configuration, ConnectorTuning, PcpVersion, TaskDownloadTuning, TlsMaterial,
};
pub use error::RequestError;
pub use ids::{RequestId, TransactionId};
pub use mutex_registry::{MutexRegistryError, ResultsMutexRegistry};
pub use purge::{sleep_interval, Purgeable, PurgeLoop};
pub use status::{derive_client_status, TransactionStatus};
pub use thread_container::{ThreadContainer, ThreadContainerError};
