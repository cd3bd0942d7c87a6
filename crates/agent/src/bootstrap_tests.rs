// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pxp_core::{ConnectorTuning, FakeClock, PcpVersion, TaskDownloadTuning, TlsMaterial};
use std::os::unix::fs::PermissionsExt;

fn config_for(dir: &Path) -> Configuration {
    Configuration {
        broker_ws_uris: vec!["wss://broker.example:8142/pcp".into()],
        client_type: "agent".into(),
        tls: TlsMaterial { ca: dir.join("ca.pem"), crt: dir.join("crt.pem"), key: dir.join("key.pem"), crl: None },
        spool_dir: dir.join("spool"),
        spool_dir_purge_ttl_s: 3600,
        modules_dir: dir.join("modules"),
        modules_config_dir: dir.join("modules.conf.d"),
        task_cache_dir: dir.join("task-cache"),
        task_cache_dir_purge_ttl_s: 3600,
        master_uris: vec!["https://master.example:8140".into()],
        master_proxy: None,
        pcp_version: PcpVersion::V2,
        connector: ConnectorTuning::default(),
        task_download: TaskDownloadTuning::default(),
        max_message_size: 4_000_000,
        logfile: None,
    }
}

#[test]
fn discover_executables_finds_only_executable_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("readme.txt"), "not a module").unwrap();

    let exe_path = dir.path().join("my_module");
    std::fs::write(&exe_path, "#!/bin/sh\necho hi\n").unwrap();
    let mut perms = std::fs::metadata(&exe_path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&exe_path, perms).unwrap();

    let found = discover_executables(dir.path());
    assert_eq!(found, vec![exe_path]);
}

#[test]
fn discover_executables_returns_empty_for_missing_dir() {
    let found = discover_executables(Path::new("/nonexistent/modules/dir"));
    assert!(found.is_empty());
}

#[test]
fn load_module_config_defaults_to_empty_object_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_module_config(dir.path(), Path::new("/some/path/my_module"));
    assert_eq!(config, serde_json::json!({}));
}

#[test]
fn load_module_config_reads_matching_conf_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("my_module.conf"), r#"{"proxy": "http://proxy.example"}"#).unwrap();

    let config = load_module_config(dir.path(), Path::new("/some/path/my_module"));
    assert_eq!(config, serde_json::json!({ "proxy": "http://proxy.example" }));
}

#[test]
fn load_module_config_ignores_malformed_json() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("my_module.conf"), "not json").unwrap();

    let config = load_module_config(dir.path(), Path::new("/some/path/my_module"));
    assert_eq!(config, serde_json::json!({}));
}

#[tokio::test]
async fn build_registry_registers_builtins_and_task() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path());
    let clock = FakeClock::default();
    let storage = ResultsStorage::new(config.spool_dir.clone(), config.spool_purge_ttl());

    let registry =
        build_registry(&config, storage, ResultsMutexRegistry::new(), ThreadContainer::new(), clock).await;

    for name in ["echo", "ping", "inventory", "status", "task"] {
        assert!(registry.get(name).is_some(), "missing built-in module {name}");
    }
    assert_eq!(registry.len(), 5);
}
