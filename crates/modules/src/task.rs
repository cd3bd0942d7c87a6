// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task runner, composed on top of external-module invocation (spec.md
//! §4.7), grounded on `lib/src/modules/task.cc`.

use crate::error::ModuleError;
use crate::module::{ActionDescriptor, Module, ModuleDescriptor};
use async_trait::async_trait;
use pxp_core::{ActionRequest, ActionResponse, ActionOutput, Clock, ModuleType, Purgeable};
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const OUTPUT_DELAY_WINDOW: Duration = Duration::from_millis(100);
const FILE_ERROR_EXITCODE: i32 = 5;
const INPUT_METHODS: [&str; 3] = ["stdin", "environment", "powershell"];

#[derive(Debug, Clone, Deserialize)]
pub struct TaskFileUri {
    pub path: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskFile {
    pub filename: String,
    pub uri: TaskFileUri,
    pub sha256: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskImplementation {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub input_method: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskMetadata {
    #[serde(default)]
    pub input_method: Option<String>,
    #[serde(default)]
    pub implementations: Vec<TaskImplementation>,
    #[serde(default)]
    pub files: Vec<String>,
}

/// The `task` action's `params` shape (spec.md §4.7).
#[derive(Debug, Clone, Deserialize)]
pub struct TaskSpec {
    pub task: String,
    #[serde(default)]
    pub metadata: TaskMetadata,
    #[serde(default)]
    pub features: Vec<String>,
    pub files: Vec<TaskFile>,
    pub input: Value,
}

pub struct TaskRunner<C: Clock> {
    master_uris: Vec<String>,
    http: reqwest::Client,
    cache_dir: PathBuf,
    powershell_shim: PathBuf,
    features: HashSet<String>,
    clock: C,
}

impl<C: Clock> TaskRunner<C> {
    pub fn new(
        master_uris: Vec<String>,
        cache_dir: impl Into<PathBuf>,
        powershell_shim: impl Into<PathBuf>,
        connect_timeout: Duration,
        download_timeout: Duration,
        clock: C,
    ) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(download_timeout)
            .build()
            .unwrap_or_default();

        #[cfg(windows)]
        let features = ["puppet-agent", "powershell"].into_iter().map(String::from).collect();
        #[cfg(not(windows))]
        let features = ["puppet-agent", "shell"].into_iter().map(String::from).collect();

        Self { master_uris, http, cache_dir: cache_dir.into(), powershell_shim: powershell_shim.into(), features, clock }
    }

    fn select_implementation(&self, spec: &TaskSpec) -> Result<TaskImplementation, ModuleError> {
        if spec.metadata.implementations.is_empty() {
            return Ok(TaskImplementation::default());
        }
        let mut features = self.features.clone();
        features.extend(spec.features.iter().cloned());

        spec.metadata
            .implementations
            .iter()
            .find(|impl_| impl_.requirements.iter().all(|r| features.contains(r)))
            .cloned()
            .ok_or(ModuleError::NoMatchingImplementation)
    }

    fn select_task_file<'a>(&self, spec: &'a TaskSpec, implementation: &TaskImplementation) -> Result<&'a TaskFile, ModuleError> {
        if spec.files.is_empty() {
            return Err(ModuleError::ProcessingError {
                module: "task".into(),
                action: "run".into(),
                reason: "at least one file must be specified for a task".into(),
            });
        }
        match &implementation.name {
            None => Ok(&spec.files[0]),
            Some(name) => spec.files.iter().find(|f| &f.filename == name).ok_or_else(|| ModuleError::ProcessingError {
                module: "task".into(),
                action: "run".into(),
                reason: format!("'{name}' file requested by implementation not found"),
            }),
        }
    }

    /// Expand directory entries (trailing `/`) into the files they prefix,
    /// and union metadata-level and implementation-level library file lists
    /// (spec.md §4.7 step 5).
    fn multi_files(meta_files: &[String], impl_files: &[String], files: &[TaskFile]) -> Vec<String> {
        let mut set: HashSet<String> = meta_files.iter().chain(impl_files.iter()).cloned().collect();
        let directories: Vec<String> = set.iter().filter(|f| f.ends_with('/')).cloned().collect();
        for dir in directories {
            set.remove(&dir);
            for f in files {
                if f.filename.starts_with(&dir) {
                    set.insert(f.filename.clone());
                }
            }
        }
        let mut result: Vec<String> = set.into_iter().collect();
        result.sort();
        result
    }

    async fn fetch_cached(&self, file: &TaskFile) -> Result<PathBuf, ModuleError> {
        let entry_dir = self.cache_dir.join(&file.sha256);
        let cached_path = entry_dir.join(&file.filename);
        if cached_path.exists() {
            return Ok(cached_path);
        }
        std::fs::create_dir_all(&entry_dir)?;

        let mut last_error = "no master_uris configured".to_string();
        for base in &self.master_uris {
            let url = format!("{}{}", base.trim_end_matches('/'), file.uri.path);
            match self.download(&url, &file.uri.params).await {
                Ok(bytes) => {
                    let digest = format!("{:x}", Sha256::digest(&bytes));
                    if digest != file.sha256 {
                        last_error = format!("checksum mismatch: expected {}, got {digest}", file.sha256);
                        continue;
                    }
                    let temp_path = entry_dir.join(format!(".tmp-{}", file.filename));
                    std::fs::write(&temp_path, &bytes)?;
                    std::fs::rename(&temp_path, &cached_path)?;
                    return Ok(cached_path);
                }
                Err(e) => {
                    last_error = e;
                    continue;
                }
            }
        }
        Err(ModuleError::TaskFetch { filename: file.filename.clone(), sha256: file.sha256.clone(), reason: last_error })
    }

    async fn download(&self, url: &str, params: &Value) -> Result<Vec<u8>, String> {
        let mut req = self.http.get(url);
        if let Value::Object(map) = params {
            let query: Vec<(String, String)> =
                map.iter().map(|(k, v)| (k.clone(), v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))).collect();
            req = req.query(&query);
        }
        let response = req.send().await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }
        response.bytes().await.map(|b| b.to_vec()).map_err(|e| e.to_string())
    }

    /// Build `<spool>/temp_task_<random>`, copy every library file into it,
    /// and return the install dir (spec.md §4.7 step 5).
    async fn build_install_dir(
        &self,
        results_dir: &Path,
        module: &str,
        task_file: &Path,
        files: &[TaskFile],
        lib_files: &[String],
    ) -> Result<(PathBuf, PathBuf), ModuleError> {
        let install_dir = results_dir.join(format!("temp_task_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&install_dir)?;

        for name in lib_files {
            let file = files.iter().find(|f| f.filename == *name).ok_or_else(|| ModuleError::ProcessingError {
                module: module.to_string(),
                action: "run".into(),
                reason: format!("'{name}' file requested as additional task dependency not found"),
            })?;
            let cached = self.fetch_cached(file).await?;
            let dest = install_dir.join(name);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(&cached, &dest)?;
        }

        let task_subdir = install_dir.join(module).join("tasks");
        std::fs::create_dir_all(&task_subdir)?;
        let task_dest = task_subdir.join(task_file.file_name().unwrap_or_default());
        std::fs::copy(task_file, &task_dest)?;

        Ok((install_dir, task_dest))
    }

    /// Run the `task` action: select implementation and file, fetch from
    /// cache, compose the invocation, and delegate to non-blocking dispatch
    /// (spec.md §4.7).
    pub async fn run(&self, request: &ActionRequest) -> Result<ActionResponse, ModuleError> {
        let results_dir = request.results_dir.clone().ok_or_else(|| ModuleError::ProcessingError {
            module: "task".into(),
            action: request.action.clone(),
            reason: "results_dir not set for task dispatch".into(),
        })?;

        let spec: TaskSpec = serde_json::from_value(request.params.clone()).map_err(|e| ModuleError::InvalidInput {
            module: "task".into(),
            action: request.action.clone(),
            reason: e.to_string(),
        })?;

        let mut implementation = self.select_implementation(&spec)?;
        if implementation.input_method.is_none() {
            implementation.input_method = spec.metadata.input_method.clone();
        }
        if let Some(method) = &implementation.input_method {
            if !INPUT_METHODS.contains(&method.as_str()) {
                return Err(ModuleError::UnsupportedInputMethod(method.clone()));
            }
        }

        let task_file_entry = self.select_task_file(&spec, &implementation)?.clone();
        let mut task_file = self.fetch_cached(&task_file_entry).await?;

        if implementation.input_method.is_none() && task_file.extension().and_then(|e| e.to_str()) == Some("ps1") {
            implementation.input_method = Some("powershell".into());
        }

        let mut task_params = spec.input.clone();
        if let Value::Object(map) = &mut task_params {
            map.insert("_task".into(), Value::String(spec.task.clone()));
        }

        let lib_files = Self::multi_files(&spec.metadata.files, &implementation.files, &spec.files);
        if !lib_files.is_empty() {
            let module = spec.task.split(':').next().unwrap_or(&spec.task).to_string();
            let (install_dir, task_dest) =
                self.build_install_dir(&results_dir, &module, &task_file, &spec.files, &lib_files).await?;
            task_file = task_dest;
            if let Value::Object(map) = &mut task_params {
                map.insert("_installdir".into(), Value::String(install_dir.to_string_lossy().into_owned()));
            }
        }

        self.invoke(request, &implementation, &task_file, &task_params, &results_dir).await
    }

    async fn invoke(
        &self,
        request: &ActionRequest,
        implementation: &TaskImplementation,
        task_file: &Path,
        task_params: &Value,
        results_dir: &Path,
    ) -> Result<ActionResponse, ModuleError> {
        let method = implementation.input_method.as_deref();

        let mut cmd = match method {
            Some("powershell") => {
                let mut c = Command::new(&self.powershell_shim);
                c.arg(task_file);
                c
            }
            _ => Command::new(task_file),
        };

        let feed_stdin = matches!(method, None | Some("stdin") | Some("powershell"));
        if matches!(method, None | Some("environment")) {
            if let Value::Object(map) = task_params {
                for (key, value) in map {
                    let rendered = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
                    cmd.env(format!("PT_{key}"), rendered);
                }
            }
        }

        cmd.stdin(Stdio::piped()).stdout(Stdio::null()).stderr(Stdio::null());
        detach_process_group(&mut cmd);

        let mut child = cmd.spawn().map_err(|e| ModuleError::ProcessingError {
            module: "task".into(),
            action: request.action.clone(),
            reason: e.to_string(),
        })?;

        if let Some(pid) = child.id() {
            let pid_path = results_dir.join("pid");
            if let Err(e) = pxp_storage::atomic_write(&pid_path, &format!("{pid}\n")) {
                tracing::error!(path = %pid_path.display(), error = %e, "failed to write pid file");
            }
        }

        if feed_stdin {
            if let Some(mut stdin) = child.stdin.take() {
                let payload = serde_json::to_vec(task_params).unwrap_or_default();
                let _ = stdin.write_all(&payload).await;
            }
        }
        drop(child.stdin.take());

        let status = child.wait().await.map_err(|e| ModuleError::ProcessingError {
            module: "task".into(),
            action: request.action.clone(),
            reason: e.to_string(),
        })?;
        let exitcode = status.code().unwrap_or(-1);

        if exitcode == FILE_ERROR_EXITCODE {
            return Err(ModuleError::ProcessingError {
                module: "task".into(),
                action: request.action.clone(),
                reason: "failed to write output on file".into(),
            });
        }

        tokio::time::sleep(OUTPUT_DELAY_WINDOW).await;

        let transaction_id = request.transaction_id.to_string();
        let output_dir = results_dir.to_path_buf();
        let output = tokio::task::spawn_blocking(move || read_output(&output_dir, exitcode))
            .await
            .unwrap_or_else(|_| ActionOutput { exitcode, std_out: String::new(), std_err: String::new() });

        let mut response = ActionResponse::metadata_from_request(request, ModuleType::External, &self.clock);
        response.output = output.clone();
        let parsed: Result<Value, _> =
            serde_json::from_str(if output.std_out.is_empty() { "null" } else { &output.std_out });
        match parsed {
            Ok(results) => response.set_valid_results_and_end(results, &self.clock),
            Err(e) => {
                let error = format!("task {transaction_id} returned invalid JSON on stdout: {e}");
                response.set_bad_results_and_end(error, &self.clock);
            }
        }
        Ok(response)
    }
}

/// Registers the task runner in the `ModuleRegistry` under the well-known
/// `task` name, so the request processor dispatches `module: "task"` the
/// same way it dispatches any other module (spec.md §4.7 is a composition
/// on top of §4.6, not a separate request path).
pub struct TaskModule<C: Clock> {
    runner: TaskRunner<C>,
    descriptor: ModuleDescriptor,
}

impl<C: Clock> TaskModule<C> {
    pub fn new(runner: TaskRunner<C>) -> Self {
        let input_schema = serde_json::json!({
            "type": "object",
            "required": ["task", "files", "input"],
            "properties": {
                "task": { "type": "string" },
                "metadata": { "type": "object" },
                "features": { "type": "array", "items": { "type": "string" } },
                "files": { "type": "array" },
                "input": {},
            },
        });
        let descriptor = ModuleDescriptor {
            name: "task".into(),
            description: "runs a Puppet task's selected implementation".into(),
            supports_async: true,
            actions: vec![ActionDescriptor {
                name: "run".into(),
                input_schema,
                results_schema: serde_json::json!({}),
            }],
        };
        Self { runner, descriptor }
    }
}

#[async_trait]
impl<C: Clock> Module for TaskModule<C> {
    fn describe(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn module_type(&self) -> ModuleType {
        ModuleType::External
    }

    async fn execute_action(&self, request: &ActionRequest) -> Result<ActionResponse, ModuleError> {
        self.runner.run(request).await
    }
}

/// Sweeps `<cache_dir>/<sha256>/` entries older than the configured TTL
/// (spec.md §4.9 "sha-keyed cache dirs older than ttl for module caches").
/// Cache entries aren't transactions, so `ongoing_transactions` never
/// applies here.
pub struct TaskCachePurger {
    cache_dir: PathBuf,
    ttl: Duration,
}

impl TaskCachePurger {
    pub fn new(cache_dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self { cache_dir: cache_dir.into(), ttl }
    }
}

#[async_trait]
impl Purgeable for TaskCachePurger {
    fn name(&self) -> &str {
        "task_cache"
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }

    async fn purge(&self, ttl: Duration, _ongoing_transactions: &[String]) -> usize {
        let cache_dir = self.cache_dir.clone();
        tokio::task::spawn_blocking(move || sweep_cache_dir(&cache_dir, ttl)).await.unwrap_or(0)
    }
}

fn sweep_cache_dir(cache_dir: &Path, ttl: Duration) -> usize {
    let Ok(entries) = std::fs::read_dir(cache_dir) else {
        return 0;
    };
    let now = std::time::SystemTime::now();
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Ok(metadata) = entry.metadata() else { continue };
        let Ok(modified) = metadata.modified() else { continue };
        let Ok(age) = now.duration_since(modified) else { continue };
        if age < ttl {
            continue;
        }
        if let Err(e) = std::fs::remove_dir_all(&path) {
            tracing::error!(path = %path.display(), error = %e, "failed to remove task cache entry");
            continue;
        }
        removed += 1;
    }
    removed
}

fn read_output(dir: &Path, exitcode: i32) -> ActionOutput {
    let std_out = std::fs::read_to_string(dir.join("stdout")).unwrap_or_default();
    let std_err = std::fs::read_to_string(dir.join("stderr")).unwrap_or_default();
    ActionOutput { exitcode, std_out, std_err }
}

#[cfg(unix)]
fn detach_process_group(cmd: &mut Command) {
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn detach_process_group(_cmd: &mut Command) {}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
