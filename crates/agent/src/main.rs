// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent entry point: load configuration, wire up storage/registry/connector,
//! and run the connect loop and purge loop until the process is killed
//! (spec.md §5 "Process model").

use pxp_agent::{bootstrap, logging, RequestProcessor};
use pxp_connector::{ConnectorError, PcpConnector, WsConnector};
use pxp_core::{
    Configuration, Purgeable, PurgeLoop, ResultsMutexRegistry, SystemClock, ThreadContainer,
};
use pxp_modules::TaskCachePurger;
use pxp_storage::ResultsStorage;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "/etc/puppetlabs/pxp-agent/pxp-agent.conf";

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let config_path = config_path_from_args();
    let config = match Configuration::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load configuration from {}: {e}", config_path.display());
            return std::process::ExitCode::FAILURE;
        }
    };

    let _log_guard = logging::init(&config);
    info!(config = %config_path.display(), "pxp-agent starting");

    match run(config).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "pxp-agent exited with a fatal error");
            std::process::ExitCode::FAILURE
        }
    }
}

fn config_path_from_args() -> PathBuf {
    std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

async fn run(config: Configuration) -> Result<(), ConnectorError> {
    let storage = ResultsStorage::new(config.spool_dir.clone(), config.spool_purge_ttl());
    let mutex_registry = ResultsMutexRegistry::new();
    let workers = ThreadContainer::new();
    let clock = SystemClock;

    let registry = Arc::new(
        bootstrap::build_registry(&config, storage.clone(), mutex_registry.clone(), workers.clone(), clock.clone())
            .await,
    );
    info!(modules = registry.len(), "module registry built");

    let connector = Arc::new(WsConnector::new(
        config.client_type.clone(),
        config.broker_ws_uris.clone(),
        config.pcp_version,
        config.connector.clone(),
        config.connector.pcp_message_ttl_s,
        &config.tls,
    )?);

    let processor = Arc::new(RequestProcessor::new(
        registry,
        connector.clone(),
        storage.clone(),
        mutex_registry,
        workers.clone(),
        clock,
    ));

    let handler_processor = processor.clone();
    let handler: pxp_connector::MessageHandler = Arc::new(move |chunks| {
        let processor = handler_processor.clone();
        tokio::spawn(async move { processor.process_request(chunks).await });
    });

    let purgeables: Vec<Box<dyn Purgeable>> = vec![
        Box::new(storage),
        Box::new(TaskCachePurger::new(config.task_cache_dir.clone(), config.task_cache_purge_ttl())),
    ];
    let purge_workers = workers.clone();
    let purge_loop = PurgeLoop::new(purgeables, move || purge_workers.names());
    info!(interval_s = purge_loop.interval().as_secs(), "purge loop scheduled");
    tokio::spawn(purge_loop.run());

    connector.run(handler).await
}
