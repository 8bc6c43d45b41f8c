//! Core types for apirun
//!
//! Collections follow the Postman v2.1 layout. Only the fields the service
//! reads are typed; everything else rides along in `extra` so a stored
//! collection round-trips without losing runner-specific data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Name used for collections that carry no `info.name`
pub const DEFAULT_COLLECTION_NAME: &str = "API Tests";

/// Collection variable holding the target base URL
pub const BASE_URL_VARIABLE: &str = "baseUrl";

// ============================================================================
// Collection
// ============================================================================

/// An ordered list of API request items stored under one run identifier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    #[serde(default)]
    pub info: CollectionInfo,

    #[serde(default)]
    pub item: Vec<CollectionItem>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variable: Vec<Variable>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single request definition. Opaque beyond its name and identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub name: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub key: String,

    #[serde(default)]
    pub value: Value,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CollectionItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            extra: Map::new(),
        }
    }
}

impl Collection {
    pub fn new(name: impl Into<String>, items: Vec<CollectionItem>) -> Self {
        Self {
            info: CollectionInfo {
                name: Some(name.into()),
                extra: Map::new(),
            },
            item: items,
            variable: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.item.len()
    }

    pub fn is_empty(&self) -> bool {
        self.item.is_empty()
    }

    pub fn name(&self) -> &str {
        self.info
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_COLLECTION_NAME)
    }

    /// Look up a collection variable rendered as a string
    pub fn variable(&self, key: &str) -> Option<String> {
        self.variable
            .iter()
            .find(|v| v.key == key)
            .and_then(|v| match &v.value {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
    }

    pub fn base_url(&self) -> Option<String> {
        self.variable(BASE_URL_VARIABLE).filter(|u| !u.is_empty())
    }

    /// Give every item without an identifier a fresh one.
    ///
    /// Returns the number of identifiers assigned.
    pub fn assign_item_ids(&mut self) -> usize {
        let mut assigned = 0;
        for item in self.item.iter_mut().filter(|i| i.id.is_none()) {
            item.id = Some(Uuid::new_v4().to_string());
            assigned += 1;
        }
        assigned
    }

    /// Remove the items whose identifiers appear in `ids`.
    ///
    /// Surviving items keep their relative order. Returns the removed items.
    pub fn remove_items<S: AsRef<str>>(&mut self, ids: &[S]) -> Vec<CollectionItem> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.item)
            .into_iter()
            .partition(|item| {
                item.id
                    .as_deref()
                    .is_some_and(|id| ids.iter().any(|x| x.as_ref() == id))
            });
        self.item = kept;
        removed
    }
}

// ============================================================================
// Generated test cases
// ============================================================================

/// A test case description produced by the worker.
///
/// `item_id` links the case to the stored collection item it was compiled to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(rename = "itemId", default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl TestCase {
    pub fn name(&self) -> Option<&str> {
        self.fields.get("name").and_then(Value::as_str)
    }
}

/// Attach stored item identifiers to generated test cases by name.
///
/// Each item is claimed at most once so duplicate names pair up in order.
pub fn link_test_cases(cases: &mut [TestCase], collection: &Collection) {
    let mut claimed = vec![false; collection.item.len()];
    for case in cases.iter_mut() {
        let Some(name) = case.name() else { continue };
        let hit = collection
            .item
            .iter()
            .enumerate()
            .find(|(i, item)| !claimed[*i] && item.name == name && item.id.is_some());
        if let Some((i, item)) = hit {
            claimed[i] = true;
            case.item_id = item.id.clone();
        }
    }
}

// ============================================================================
// Summaries
// ============================================================================

/// Pass/fail summary for one runner report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub passed: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub success_endpoints: Vec<SuccessEndpoint>,
    #[serde(default)]
    pub failed_endpoints: Vec<FailedEndpoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessEndpoint {
    pub endpoint: String,
    /// Response status code, or "N/A" when the runner recorded none
    #[serde(default)]
    pub status: Value,
    #[serde(default)]
    pub response_time: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedEndpoint {
    pub endpoint: String,
    pub message: String,
}

/// Progress reported alongside each batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub current_batch: usize,
    pub total_batches: usize,
    pub tested_so_far: usize,
    pub total_tests: usize,
}

/// Result of executing one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub run_id: String,
    pub batch_index: usize,
    pub is_complete: bool,
    pub summary: BatchSummary,
    pub progress: BatchProgress,
}

/// Persisted outcome of a whole-collection execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummaryRecord {
    pub run_id: String,
    pub executed_at: DateTime<Utc>,
    pub summary: BatchSummary,
}
