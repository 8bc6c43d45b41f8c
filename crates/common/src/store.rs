//! File-backed run store
//!
//! Every artifact of a run lives under the storage root, keyed by run id:
//!
//! ```text
//! <root>/collections/<runId>.json   latest collection, overwritten on update
//! <root>/reports/<id>.json          runner report (id may be a batch id)
//! <root>/summaries/<runId>.json     whole-collection execution summary
//! <root>/tmp/                       staging area for atomic writes
//! ```
//!
//! There is no locking. Concurrent writers to the same run id race and the
//! last rename wins.

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::{Collection, RunSummaryRecord};
use crate::{Error, Result};

/// Longest accepted run id
pub const MAX_RUN_ID_LEN: usize = 96;

/// Longest accepted report id; leaves room for `-batch-<usize::MAX>`
pub const MAX_ARTIFACT_ID_LEN: usize = 128;

fn check_id(id: &str, max_len: usize, what: &str) -> Result<()> {
    let ok = !id.is_empty()
        && id.len() <= max_len
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidRequest(format!("invalid {}: {:?}", what, id)))
    }
}

/// Keyed JSON store for collections, reports and summaries
#[derive(Debug, Clone)]
pub struct RunStore {
    root: PathBuf,
}

impl RunStore {
    /// Open a store at `root`, creating its directory layout
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        for dir in ["collections", "reports", "summaries", "tmp"] {
            fs::create_dir_all(root.join(dir)).await?;
        }

        info!("Opened run store at {:?}", root);

        Ok(Self { root })
    }

    pub fn collections_dir(&self) -> PathBuf {
        self.root.join("collections")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.root.join("reports")
    }

    pub fn summaries_dir(&self) -> PathBuf {
        self.root.join("summaries")
    }

    /// Reject run ids that could escape the storage root.
    ///
    /// Run ids are capped at [`MAX_RUN_ID_LEN`] so that every derived batch id
    /// still fits under [`MAX_ARTIFACT_ID_LEN`].
    pub fn validate_id(id: &str) -> Result<()> {
        check_id(id, MAX_RUN_ID_LEN, "run id")
    }

    /// Like [`validate_id`](Self::validate_id) for report ids, which may carry
    /// a `-batch-<index>` suffix.
    pub fn validate_artifact_id(id: &str) -> Result<()> {
        check_id(id, MAX_ARTIFACT_ID_LEN, "report id")
    }

    pub fn collection_path(&self, run_id: &str) -> Result<PathBuf> {
        Self::validate_id(run_id)?;
        Ok(self.collections_dir().join(format!("{}.json", run_id)))
    }

    /// Path of the JSON report for a run or batch id
    pub fn report_path(&self, id: &str) -> Result<PathBuf> {
        Self::validate_artifact_id(id)?;
        Ok(self.reports_dir().join(format!("{}.json", id)))
    }

    pub fn summary_path(&self, run_id: &str) -> Result<PathBuf> {
        Self::validate_id(run_id)?;
        Ok(self.summaries_dir().join(format!("{}.json", run_id)))
    }

    // ------------------------------------------------------------------------
    // Collections
    // ------------------------------------------------------------------------

    /// Store a collection under `run_id`, replacing any previous version.
    ///
    /// Items without an identifier are given one before writing.
    pub async fn put_collection(&self, run_id: &str, collection: &mut Collection) -> Result<()> {
        let path = self.collection_path(run_id)?;
        let assigned = collection.assign_item_ids();
        self.write_json(&path, collection).await?;
        debug!(
            "Stored collection {} ({} items, {} new ids)",
            run_id,
            collection.len(),
            assigned
        );
        Ok(())
    }

    pub async fn get_collection(&self, run_id: &str) -> Result<Collection> {
        let path = self.collection_path(run_id)?;
        self.read_json(&path, "collection", run_id).await
    }

    pub async fn has_collection(&self, run_id: &str) -> bool {
        match self.collection_path(run_id) {
            Ok(path) => fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    // ------------------------------------------------------------------------
    // Reports and summaries
    // ------------------------------------------------------------------------

    pub async fn read_report(&self, id: &str) -> Result<serde_json::Value> {
        let path = self.report_path(id)?;
        self.read_json(&path, "report", id).await
    }

    pub async fn put_summary(&self, record: &RunSummaryRecord) -> Result<()> {
        let path = self.summary_path(&record.run_id)?;
        self.write_json(&path, record).await?;
        debug!("Stored summary for {}", record.run_id);
        Ok(())
    }

    pub async fn get_summary(&self, run_id: &str) -> Result<RunSummaryRecord> {
        let path = self.summary_path(run_id)?;
        self.read_json(&path, "summary", run_id).await
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Write pretty JSON atomically via a temp file in the same store
    pub async fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        let data = serde_json::to_vec_pretty(value)?;
        let tmp_path = self.root.join("tmp").join(format!("{}.tmp", Uuid::new_v4()));
        fs::write(&tmp_path, &data).await?;
        if let Err(e) = fs::rename(&tmp_path, path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path, kind: &str, id: &str) -> Result<T> {
        let data = match fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::not_found(kind, id));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&data)?)
    }
}
