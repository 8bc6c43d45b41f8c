//! In-process fakes for the worker and the runner

use std::ops::Range;
use std::sync::{Arc, Mutex};

use apirun_common::types::CollectionItem;
use apirun_common::{Collection, Error, Result, RunStore, TestCase};
use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::analysis::LocalAnalyzer;
use crate::runner::{CollectionRunner, RunnerOutput};
use crate::service::RunsService;
use crate::worker::{GeneratedTests, TestGenerator};

/// Items at positions 4, 9, 14, ... fail when run
pub fn item_name(index: usize) -> String {
    if index % 5 == 4 {
        format!("fail-{}", index)
    } else {
        format!("req-{}", index)
    }
}

pub fn item_names(range: Range<usize>) -> Vec<String> {
    range.map(item_name).collect()
}

pub fn sample_collection(items: usize) -> Collection {
    Collection::new("Sample", (0..items).map(|i| CollectionItem::new(item_name(i))).collect())
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRun {
    pub run_id: String,
    pub name: String,
    pub items: Vec<String>,
}

/// Runner that fabricates a newman-shaped report instead of spawning newman
#[derive(Default)]
pub struct FakeRunner {
    runs: Mutex<Vec<RecordedRun>>,
    fail_on: Mutex<Option<String>>,
}

impl FakeRunner {
    pub fn runs(&self) -> Vec<RecordedRun> {
        self.runs.lock().unwrap().clone()
    }

    pub fn fail_on(&self, run_id: &str) {
        *self.fail_on.lock().unwrap() = Some(run_id.to_string());
    }
}

fn fake_report(collection: &Collection) -> Value {
    let executions: Vec<Value> = collection
        .item
        .iter()
        .map(|item| json!({"item": {"name": item.name}, "response": {"code": 200, "responseTime": 12}}))
        .collect();
    let failures: Vec<Value> = collection
        .item
        .iter()
        .filter(|item| item.name.starts_with("fail-"))
        .map(|item| json!({"source": {"name": item.name}, "error": {"message": "expected 200 to equal 201"}}))
        .collect();
    json!({
        "run": {
            "stats": {"requests": {"total": collection.len()}},
            "executions": executions,
            "failures": failures,
        }
    })
}

#[async_trait]
impl CollectionRunner for FakeRunner {
    async fn run(&self, run_id: &str, collection: &Collection) -> Result<RunnerOutput> {
        self.runs.lock().unwrap().push(RecordedRun {
            run_id: run_id.to_string(),
            name: collection.name().to_string(),
            items: collection.item.iter().map(|i| i.name.clone()).collect(),
        });
        if self.fail_on.lock().unwrap().as_deref() == Some(run_id) {
            return Err(Error::upstream("newman", None, "newman exited with 1"));
        }
        Ok(RunnerOutput {
            report: fake_report(collection),
            report_path: format!("{}.json", run_id).into(),
        })
    }
}

/// Worker stand-in producing a fixed two-request collection
#[derive(Default)]
pub struct FakeGenerator {
    calls: Mutex<Vec<String>>,
    unavailable: bool,
}

impl FakeGenerator {
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if self.unavailable {
            return Err(Error::unavailable("worker", "connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl TestGenerator for FakeGenerator {
    async fn parse_swagger_url(&self, swagger_url: &str) -> Result<Value> {
        self.record(format!("url:{}", swagger_url))?;
        Ok(json!({"title": "Petstore", "endpoints": 2}))
    }

    async fn parse_swagger_spec(&self, _spec: &Value) -> Result<Value> {
        self.record("spec".to_string())?;
        Ok(json!({"title": "Petstore", "endpoints": 2}))
    }

    async fn generate_tests(&self, _parsed: &Value) -> Result<GeneratedTests> {
        self.record("generate".to_string())?;
        let names = ["List pets", "Create pet"];
        Ok(GeneratedTests {
            testcases: names
                .iter()
                .map(|name| {
                    let mut case = TestCase::default();
                    case.fields.insert("name".to_string(), json!(name));
                    case
                })
                .collect(),
            collection: Collection::new(
                "Petstore",
                names.iter().map(|n| CollectionItem::new(*n)).collect(),
            ),
        })
    }
}

/// A service over a temporary store with fake collaborators
pub struct TestHarness {
    pub service: Arc<RunsService>,
    pub runner: Arc<FakeRunner>,
    pub generator: Arc<FakeGenerator>,
    _tmp: TempDir,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_generator(FakeGenerator::default()).await
    }

    pub async fn with_generator(generator: FakeGenerator) -> Self {
        let tmp = TempDir::new().unwrap();
        let store = RunStore::open(tmp.path()).await.unwrap();
        let runner = Arc::new(FakeRunner::default());
        let generator = Arc::new(generator);
        let service = RunsService::new(
            store,
            generator.clone(),
            runner.clone(),
            Arc::new(LocalAnalyzer),
        );
        Self {
            service: Arc::new(service),
            runner,
            generator,
            _tmp: tmp,
        }
    }

    pub async fn seed(&self, run_id: &str, mut collection: Collection) {
        self.service
            .store()
            .put_collection(run_id, &mut collection)
            .await
            .unwrap();
    }
}
