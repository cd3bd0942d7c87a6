// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builds the process's [`ModuleRegistry`]: built-ins, the task runner, and
//! a scan of `modules_dir` for external modules (spec.md §4.6 "Load failures
//! exclude only the affected module").

use pxp_core::{Clock, Configuration, ResultsMutexRegistry, ThreadContainer};
use pxp_modules::{
    EchoModule, ExternalModule, InventoryModule, ModuleRegistry, PingModule, StatusModule,
    TaskModule, TaskRunner,
};
use pxp_storage::ResultsStorage;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// The bundled `task` module ships its PowerShell launcher alongside the
/// other external modules, the same layout `modules_dir` uses for any other
/// module (puppetlabs/pxp-agent convention: `<modules_dir>/task/files/...`).
fn powershell_shim_path(modules_dir: &Path) -> PathBuf {
    modules_dir.join("task").join("files").join("PowershellShim.ps1")
}

/// Build the registry: built-in modules first, then `task`, then whatever
/// external modules are discovered under `config.modules_dir`.
pub async fn build_registry<C: Clock + 'static>(
    config: &Configuration,
    storage: ResultsStorage,
    mutex_registry: ResultsMutexRegistry,
    workers: ThreadContainer,
    clock: C,
) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();

    registry.register(Arc::new(EchoModule::new(clock.clone())));
    registry.register(Arc::new(PingModule::new(clock.clone())));
    registry.register(Arc::new(InventoryModule::new(clock.clone())));
    registry.register(Arc::new(StatusModule::new(storage, mutex_registry, workers, clock.clone())));

    let runner = TaskRunner::new(
        config.master_uris.clone(),
        config.task_cache_dir.clone(),
        powershell_shim_path(&config.modules_dir),
        Duration::from_secs(config.task_download.task_download_connect_timeout_s),
        Duration::from_secs(config.task_download.task_download_timeout_s),
        clock.clone(),
    );
    registry.register(Arc::new(TaskModule::new(runner)));

    for path in discover_executables(&config.modules_dir) {
        let module_config = load_module_config(&config.modules_config_dir, &path);
        match ExternalModule::load(path.clone(), module_config, clock.clone()).await {
            Ok(module) => registry.register(Arc::new(module)),
            Err(e) => {
                tracing::warn!(module = %path.display(), error = %e, "failed to load external module; excluding");
            }
        }
    }

    registry
}

fn discover_executables(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        tracing::debug!(dir = %dir.display(), "modules_dir not readable; no external modules loaded");
        return Vec::new();
    };
    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_executable(path))
        .collect();
    paths.sort();
    paths
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).map(|m| m.permissions().mode() & 0o111 != 0).unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    true
}

/// Read `<modules_config_dir>/<name>.conf` as JSON, defaulting to an empty
/// object when absent or unparseable (a missing per-module config file is
/// normal, not an error).
fn load_module_config(config_dir: &Path, module_path: &Path) -> Value {
    let name = module_path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let config_path = config_dir.join(format!("{name}.conf"));
    let Ok(text) = std::fs::read_to_string(&config_path) else {
        return Value::Object(Default::default());
    };
    serde_json::from_str(&text).unwrap_or_else(|e| {
        tracing::warn!(module = name, path = %config_path.display(), error = %e, "module config is not valid JSON; ignoring");
        Value::Object(Default::default())
    })
}

#[cfg(test)]
#[path = "bootstrap_tests.rs"]
mod tests;
