//! Newman collection runner
//!
//! Each run writes the collection next to its report, invokes `newman run`
//! as a child process and reads back the JSON report. Once spawned, the child
//! runs to completion: there is no cancellation, and newman's own `--timeout`
//! is the only bound on a run.

use std::path::PathBuf;
use std::process::Stdio;

use apirun_common::{Collection, Error, Result, RunStore};
use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::config::RunnerConfig;

/// Report produced by one runner invocation
#[derive(Debug, Clone)]
pub struct RunnerOutput {
    pub report: Value,
    pub report_path: PathBuf,
}

/// Executes a collection and returns the runner's report
#[async_trait]
pub trait CollectionRunner: Send + Sync {
    /// Run `collection` under `run_id`; artifacts are named after `run_id`.
    async fn run(&self, run_id: &str, collection: &Collection) -> Result<RunnerOutput>;
}

/// Runner that shells out to the newman CLI
pub struct NewmanRunner {
    config: RunnerConfig,
    store: RunStore,
}

impl NewmanRunner {
    pub fn new(config: RunnerConfig, store: RunStore) -> Self {
        Self { config, store }
    }

    /// Check whether the configured newman binary answers `--version`
    pub async fn check_installed(&self) -> Option<String> {
        let output = Command::new(&self.config.newman_bin)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .ok()?;
        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Command-line arguments for one `newman run`
    pub fn build_args(&self, run_id: &str, collection: &Collection) -> Result<Vec<String>> {
        let collection_path = self.collection_path(run_id);
        let report_path = self.store.report_path(run_id)?;

        let mut reporters = vec!["cli", "json"];
        if self.config.html_report {
            reporters.push("htmlextra");
        }

        let mut args = vec![
            "run".to_string(),
            collection_path.to_string_lossy().into_owned(),
            "--reporters".to_string(),
            reporters.join(","),
            "--reporter-json-export".to_string(),
            report_path.to_string_lossy().into_owned(),
            "--timeout".to_string(),
            self.config.run_timeout_ms(collection.len()).to_string(),
            "--timeout-request".to_string(),
            self.config.request_timeout_ms.to_string(),
            "--suppress-exit-code".to_string(),
            "--color".to_string(),
            "off".to_string(),
        ];

        if self.config.html_report {
            let html_path = self.store.reports_dir().join(format!("{}.html", run_id));
            args.push("--reporter-htmlextra-export".to_string());
            args.push(html_path.to_string_lossy().into_owned());
        }

        if let Some(base_url) = collection.base_url() {
            args.push("--env-var".to_string());
            args.push(format!("baseUrl={}", base_url));
        }

        if self.config.insecure {
            args.push("--insecure".to_string());
        }

        Ok(args)
    }

    fn collection_path(&self, run_id: &str) -> PathBuf {
        self.store
            .reports_dir()
            .join(format!("{}.collection.json", run_id))
    }
}

/// Last few lines of process output, for error messages
fn tail(output: &[u8], lines: usize) -> String {
    let text = String::from_utf8_lossy(output);
    let all: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

#[async_trait]
impl CollectionRunner for NewmanRunner {
    async fn run(&self, run_id: &str, collection: &Collection) -> Result<RunnerOutput> {
        let args = self.build_args(run_id, collection)?;
        let report_path = self.store.report_path(run_id)?;

        self.store
            .write_json(&self.collection_path(run_id), collection)
            .await?;
        // A stale report from an earlier run must not be mistaken for this one.
        match tokio::fs::remove_file(&report_path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }

        info!(
            run_id,
            items = collection.len(),
            base_url = collection.base_url().as_deref().unwrap_or(""),
            "Starting newman run"
        );
        debug!("newman {}", args.join(" "));

        let output = Command::new(&self.config.newman_bin)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::unavailable(
                        "newman",
                        format!("{} not found on PATH", self.config.newman_bin.display()),
                    )
                } else {
                    Error::unavailable("newman", e)
                }
            })?;

        if !output.status.success() {
            let stderr = tail(&output.stderr, 20);
            error!(run_id, status = %output.status, "newman run failed: {}", stderr);
            return Err(Error::upstream(
                "newman",
                None,
                format!("newman exited with {}: {}", output.status, stderr),
            ));
        }

        let report = match self.store.read_report(run_id).await {
            Ok(report) => report,
            Err(Error::NotFound { .. }) => {
                warn!(run_id, "newman finished without a JSON report");
                return Err(Error::upstream(
                    "newman",
                    None,
                    format!("run finished without writing a report: {}", tail(&output.stderr, 5)),
                ));
            }
            Err(e) => return Err(e),
        };

        let requests = report
            .pointer("/run/stats/requests/total")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        info!(run_id, requests, "newman run completed");

        Ok(RunnerOutput {
            report,
            report_path,
        })
    }
}
