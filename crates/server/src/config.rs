//! Server configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listen address
    pub listen: String,

    /// Root directory for collections, reports and summaries
    pub storage_dir: PathBuf,

    /// Batch size used when a request does not carry one
    pub default_batch_size: usize,

    /// Maximum accepted request body
    pub max_body_bytes: usize,

    /// Worker (parse / generate / analyze) configuration
    pub worker: WorkerConfig,

    /// Test runner configuration
    pub runner: RunnerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:5000".to_string(),
            storage_dir: apirun_common::default_storage_dir(),
            default_batch_size: apirun_common::DEFAULT_BATCH_SIZE,
            max_body_bytes: 10 * 1024 * 1024,
            worker: WorkerConfig::default(),
            runner: RunnerConfig::default(),
        }
    }
}

/// Where runner reports get summarised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    /// Worker `POST /analyze-report`
    #[default]
    Remote,
    /// Built-in report summary, no worker round trip
    Local,
}

impl FromStr for AnalysisMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "remote" => Ok(Self::Remote),
            "local" => Ok(Self::Local),
            _ => Err(format!("unknown analysis mode: {} (expected remote or local)", s)),
        }
    }
}

/// Worker-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Base URL of the worker service
    pub url: String,

    /// Timeout for a single worker call; generation and analysis are slow
    pub timeout_secs: u64,

    /// Timeout for the `/health` check
    pub health_timeout_secs: u64,

    pub analysis: AnalysisMode,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8000".to_string(),
            timeout_secs: 300,
            health_timeout_secs: 5,
            analysis: AnalysisMode::Remote,
        }
    }
}

impl WorkerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }
}

/// Newman runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Path to the newman executable
    pub newman_bin: PathBuf,

    /// Per-request timeout passed to newman
    pub request_timeout_ms: u64,

    /// Run timeout budget per collection item
    pub per_item_timeout_ms: u64,

    /// Lower bound for the whole-run timeout
    pub min_run_timeout_ms: u64,

    /// Accept self-signed certificates on the target API
    pub insecure: bool,

    /// Also export an HTML report (requires newman-reporter-htmlextra)
    pub html_report: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            newman_bin: PathBuf::from("newman"),
            request_timeout_ms: 30_000,
            per_item_timeout_ms: 30_000,
            min_run_timeout_ms: 60_000,
            insecure: true,
            html_report: false,
        }
    }
}

impl RunnerConfig {
    /// Whole-run timeout for a collection of `items` requests
    pub fn run_timeout_ms(&self, items: usize) -> u64 {
        self.min_run_timeout_ms
            .max(self.per_item_timeout_ms.saturating_mul(items as u64))
    }
}

impl ServerConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = ServerConfig::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.default_batch_size, 10);
        assert_eq!(config.worker.analysis, AnalysisMode::Remote);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("apirun.toml");
        std::fs::write(
            &path,
            "listen = \"0.0.0.0:9000\"\n[worker]\nanalysis = \"local\"\n",
        )
        .unwrap();

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.listen, "0.0.0.0:9000");
        assert_eq!(config.worker.analysis, AnalysisMode::Local);
        assert_eq!(config.worker.timeout_secs, 300);
        assert_eq!(config.worker.health_timeout_secs, 5);
        assert_eq!(config.runner.request_timeout_ms, 30_000);
    }

    #[test]
    fn test_save_then_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/apirun.toml");
        let mut config = ServerConfig::default();
        config.runner.html_report = true;
        config.save(&path).unwrap();

        assert!(ServerConfig::load(&path).unwrap().runner.html_report);
    }

    #[test]
    fn test_run_timeout_scales_with_items() {
        let runner = RunnerConfig::default();
        assert_eq!(runner.run_timeout_ms(0), 60_000);
        assert_eq!(runner.run_timeout_ms(2), 60_000);
        assert_eq!(runner.run_timeout_ms(5), 150_000);
    }

    #[test]
    fn test_analysis_mode_parse() {
        assert_eq!("LOCAL".parse::<AnalysisMode>().unwrap(), AnalysisMode::Local);
        assert!("cloud".parse::<AnalysisMode>().is_err());
    }
}
