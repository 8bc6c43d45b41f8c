//! Collection commands: generate, show, count, update, prune

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use apirun_common::types::CollectionItem;
use apirun_common::{Collection, TestCase};
use clap::Parser;
use serde::Serialize;
use serde_json::Value;

use crate::client::ApiClient;
use crate::output::{
    print_info, print_item, print_list, print_success, print_value, print_warning, OutputFormat,
    TableDisplay,
};

#[derive(Parser)]
pub struct GenerateArgs {
    /// URL of an OpenAPI / Swagger document
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub url: Option<String>,

    /// Local OpenAPI document (JSON or YAML)
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Parser)]
pub struct RunIdArgs {
    /// Run ID
    pub run_id: String,
}

#[derive(Parser)]
pub struct UpdateArgs {
    /// Run ID
    pub run_id: String,

    /// Postman collection file to store
    #[arg(short, long)]
    pub file: PathBuf,
}

#[derive(Parser)]
pub struct PruneArgs {
    /// Run ID
    pub run_id: String,

    /// Item IDs to remove (repeatable)
    #[arg(long = "item", required = true)]
    pub items: Vec<String>,
}

/// Generated test case row
#[derive(Serialize)]
pub struct TestCaseDisplay {
    pub item_id: String,
    pub name: String,
    pub method: String,
    pub path: String,
    pub expected: String,
    pub category: String,
}

fn field(case: &TestCase, key: &str) -> String {
    match case.fields.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "-".to_string(),
        Some(other) => other.to_string(),
    }
}

impl From<&TestCase> for TestCaseDisplay {
    fn from(case: &TestCase) -> Self {
        Self {
            item_id: case.item_id.clone().unwrap_or_else(|| "-".to_string()),
            name: field(case, "name"),
            method: field(case, "method"),
            path: field(case, "path"),
            expected: field(case, "expected"),
            category: field(case, "category"),
        }
    }
}

impl TableDisplay for TestCaseDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Item ID", "Name", "Method", "Path", "Expected", "Category"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.item_id.clone(),
            self.name.clone(),
            self.method.clone(),
            self.path.clone(),
            self.expected.clone(),
            self.category.clone(),
        ]
    }
}

/// Collection item row
#[derive(Serialize)]
pub struct ItemDisplay {
    pub position: usize,
    pub id: String,
    pub name: String,
    pub method: String,
    pub url: String,
}

impl ItemDisplay {
    pub fn new(position: usize, item: &CollectionItem) -> Self {
        let (method, url) = request_line(item);
        Self {
            position,
            id: item.id.clone().unwrap_or_else(|| "-".to_string()),
            name: item.name.clone(),
            method,
            url,
        }
    }
}

impl TableDisplay for ItemDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["#", "ID", "Name", "Method", "URL"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.position.to_string(),
            self.id.clone(),
            self.name.clone(),
            self.method.clone(),
            self.url.clone(),
        ]
    }
}

/// Method and URL of a Postman item. The request may be a bare URL string,
/// and its `url` may be a string or an object with `raw`.
fn request_line(item: &CollectionItem) -> (String, String) {
    match item.extra.get("request") {
        Some(Value::String(url)) => ("GET".to_string(), url.clone()),
        Some(request) => {
            let method = request
                .get("method")
                .and_then(Value::as_str)
                .unwrap_or("GET")
                .to_string();
            let url = match request.get("url") {
                Some(Value::String(raw)) => raw.clone(),
                Some(url) => url
                    .get("raw")
                    .and_then(Value::as_str)
                    .unwrap_or("-")
                    .to_string(),
                None => "-".to_string(),
            };
            (method, url)
        }
        None => ("-".to_string(), "-".to_string()),
    }
}

/// Read an OpenAPI document as JSON, falling back to YAML
pub fn read_document(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    if let Ok(value) = serde_json::from_str::<Value>(&content) {
        return Ok(value);
    }
    let value: Value = serde_yaml::from_str(&content)
        .with_context(|| format!("{} is neither JSON nor YAML", path.display()))?;
    if !value.is_object() {
        bail!("{} does not contain a document object", path.display());
    }
    Ok(value)
}

/// Remove `ids` from `collection`, returning the removed items and any ids
/// that matched nothing.
pub fn prune_items(collection: &mut Collection, ids: &[String]) -> (Vec<CollectionItem>, Vec<String>) {
    let removed = collection.remove_items(ids);
    let unknown = ids
        .iter()
        .filter(|id| !removed.iter().any(|item| item.id.as_deref() == Some(id.as_str())))
        .cloned()
        .collect();
    (removed, unknown)
}

pub async fn generate(args: GenerateArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let response = match (args.url, args.file) {
        (Some(url), _) => {
            print_info(&format!("Generating tests from {}", url));
            client.generate(&url).await?
        }
        (None, Some(file)) => {
            let spec = read_document(&file)?;
            print_info(&format!("Generating tests from {}", file.display()));
            client.generate_from_spec(spec).await?
        }
        (None, None) => bail!("either --url or --file is required"),
    };

    if format != OutputFormat::Table {
        print_value(&response, format);
        return Ok(());
    }

    let rows: Vec<TestCaseDisplay> = response.testcases.iter().map(TestCaseDisplay::from).collect();
    print_list(&rows, format);
    print_success(&format!("{} (run {})", response.message, response.run_id));
    Ok(())
}

pub async fn show(args: RunIdArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let response = client.collection(&args.run_id).await?;

    if format != OutputFormat::Table {
        print_value(&response, format);
        return Ok(());
    }

    let collection = &response.collection;
    println!("Collection: {}", collection.name());
    if let Some(base_url) = collection.base_url() {
        println!("Base URL:   {}", base_url);
    }
    let rows: Vec<ItemDisplay> = collection
        .item
        .iter()
        .enumerate()
        .map(|(i, item)| ItemDisplay::new(i + 1, item))
        .collect();
    print_list(&rows, format);
    Ok(())
}

/// Test count row
#[derive(Serialize)]
pub struct CountDisplay {
    pub run_id: String,
    pub total_tests: usize,
}

impl TableDisplay for CountDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Run ID", "Tests"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.run_id.clone(), self.total_tests.to_string()]
    }
}

pub async fn count(args: RunIdArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let response = client.test_count(&args.run_id).await?;
    print_item(
        &CountDisplay {
            run_id: response.run_id,
            total_tests: response.total_tests,
        },
        format,
    );
    Ok(())
}

pub async fn update(args: UpdateArgs, client: &ApiClient) -> Result<()> {
    let content = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let collection: Collection = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a Postman collection", args.file.display()))?;

    let items = collection.len();
    let response = client.update(&args.run_id, collection).await?;
    print_success(&format!("{} ({} items)", response.message, items));
    Ok(())
}

/// Prune items from a stored collection; shared with `run --exclude`
pub async fn prune_stored(client: &ApiClient, run_id: &str, ids: &[String]) -> Result<Vec<CollectionItem>> {
    let mut collection = client.collection(run_id).await?.collection;
    let (removed, unknown) = prune_items(&mut collection, ids);

    for id in &unknown {
        print_warning(&format!("No item with id {} in run {}", id, run_id));
    }
    if !removed.is_empty() {
        client.update(run_id, collection).await?;
    }
    Ok(removed)
}

pub async fn prune(args: PruneArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let removed = prune_stored(client, &args.run_id, &args.items).await?;

    if removed.is_empty() {
        print_warning("Nothing removed");
        return Ok(());
    }

    let rows: Vec<ItemDisplay> = removed
        .iter()
        .enumerate()
        .map(|(i, item)| ItemDisplay::new(i + 1, item))
        .collect();
    print_list(&rows, format);
    print_success(&format!("Removed {} item(s) from run {}", removed.len(), args.run_id));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn item(id: &str, name: &str, request: Value) -> CollectionItem {
        let mut item = CollectionItem::new(name);
        item.id = Some(id.to_string());
        item.extra.insert("request".to_string(), request);
        item
    }

    #[test]
    fn test_request_line_shapes() {
        let object_url = item(
            "a",
            "List pets",
            json!({"method": "GET", "url": {"raw": "{{baseUrl}}/pets"}}),
        );
        assert_eq!(
            request_line(&object_url),
            ("GET".to_string(), "{{baseUrl}}/pets".to_string())
        );

        let string_url = item("b", "Create pet", json!({"method": "POST", "url": "{{baseUrl}}/pets"}));
        assert_eq!(request_line(&string_url).0, "POST");

        let bare = item("c", "Ping", json!("http://api.local/ping"));
        assert_eq!(
            request_line(&bare),
            ("GET".to_string(), "http://api.local/ping".to_string())
        );
    }

    #[test]
    fn test_prune_reports_unknown_ids() {
        let mut collection = Collection::new(
            "Pets",
            vec![
                item("a", "one", json!({})),
                item("b", "two", json!({})),
                item("c", "three", json!({})),
            ],
        );
        let (removed, unknown) =
            prune_items(&mut collection, &["b".to_string(), "zzz".to_string()]);

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].name, "two");
        assert_eq!(unknown, vec!["zzz".to_string()]);
        let names: Vec<_> = collection.item.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["one", "three"]);
    }

    #[test]
    fn test_read_document_json_and_yaml() {
        let tmp = TempDir::new().unwrap();

        let json_path = tmp.path().join("openapi.json");
        std::fs::write(&json_path, r#"{"openapi": "3.0.0", "paths": {}}"#).unwrap();
        assert_eq!(read_document(&json_path).unwrap()["openapi"], "3.0.0");

        let yaml_path = tmp.path().join("openapi.yaml");
        std::fs::write(&yaml_path, "openapi: 3.0.0\npaths:\n  /pets:\n    get: {}\n").unwrap();
        let doc = read_document(&yaml_path).unwrap();
        assert_eq!(doc["openapi"], "3.0.0");
        assert!(doc["paths"]["/pets"]["get"].is_object());

        let scalar = tmp.path().join("scalar.yaml");
        std::fs::write(&scalar, "just text").unwrap();
        assert!(read_document(&scalar).is_err());
    }

    #[test]
    fn test_test_case_display_fields() {
        let mut case = TestCase::default();
        case.item_id = Some("id-1".to_string());
        case.fields.insert("name".to_string(), json!("List pets"));
        case.fields.insert("expected".to_string(), json!(200));

        let row = TestCaseDisplay::from(&case);
        assert_eq!(row.item_id, "id-1");
        assert_eq!(row.expected, "200");
        assert_eq!(row.method, "-");
    }
}
