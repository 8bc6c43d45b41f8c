//! Execution commands: execute, run, summary

use anyhow::Result;
use apirun_common::{drain_batches, BatchSummary, DEFAULT_BATCH_SIZE};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::{json, Value};

use super::collection::{prune_stored, RunIdArgs};
use crate::client::ApiClient;
use crate::output::{print_info, print_list, print_value, OutputFormat, TableDisplay};

#[derive(Parser)]
pub struct RunArgs {
    /// Run ID
    pub run_id: String,

    /// Items per batch
    #[arg(short, long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Item IDs to remove from the collection before running (repeatable)
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Hide the progress bar
    #[arg(long)]
    pub quiet: bool,
}

/// One endpoint outcome
#[derive(Serialize)]
pub struct EndpointDisplay {
    pub endpoint: String,
    pub result: String,
    pub status: String,
    pub detail: String,
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "N/A".to_string(),
        other => other.to_string(),
    }
}

impl TableDisplay for EndpointDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Endpoint", "Result", "Status", "Detail"]
    }

    fn row(&self) -> Vec<String> {
        let result = match self.result.as_str() {
            "PASS" => self.result.green().to_string(),
            _ => self.result.red().to_string(),
        };
        vec![
            self.endpoint.clone(),
            result,
            self.status.clone(),
            self.detail.clone(),
        ]
    }
}

/// Passes first, then failures, each in report order
pub fn endpoint_rows(summary: &BatchSummary) -> Vec<EndpointDisplay> {
    let passed = summary.success_endpoints.iter().map(|e| EndpointDisplay {
        endpoint: e.endpoint.clone(),
        result: "PASS".to_string(),
        status: render(&e.status),
        detail: render(&e.response_time),
    });
    let failed = summary.failed_endpoints.iter().map(|e| EndpointDisplay {
        endpoint: e.endpoint.clone(),
        result: "FAIL".to_string(),
        status: "-".to_string(),
        detail: e.message.clone(),
    });
    passed.chain(failed).collect()
}

fn print_summary(summary: &BatchSummary, format: OutputFormat) {
    print_list(&endpoint_rows(summary), format);
    let failed = if summary.failed > 0 {
        summary.failed.to_string().red().bold()
    } else {
        summary.failed.to_string().green()
    };
    println!(
        "Requests: {}  Passed: {}  Failed: {}",
        summary.total,
        summary.passed.to_string().green(),
        failed
    );
}

pub async fn execute(args: RunIdArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    print_info(&format!("Executing run {} in a single pass", args.run_id));
    let response = client.execute(&args.run_id).await?;

    if format == OutputFormat::Table {
        print_summary(&response.summary, format);
    } else {
        print_value(&response, format);
    }
    Ok(())
}

fn progress_bar(total: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        bar.set_style(style.progress_chars("#>-"));
    }
    bar
}

/// Prune, then run every batch in order and print the combined result
pub async fn run(args: RunArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    if !args.exclude.is_empty() {
        let removed = prune_stored(client, &args.run_id, &args.exclude).await?;
        print_info(&format!("Excluded {} item(s)", removed.len()));
    }

    let total = client.test_count(&args.run_id).await?.total_tests;
    let bar = if args.quiet || format != OutputFormat::Table {
        ProgressBar::hidden()
    } else {
        progress_bar(total)
    };

    let result = drain_batches(client, &args.run_id, args.batch_size, |response| {
        bar.set_position(response.progress.tested_so_far as u64);
        bar.set_message(format!(
            "batch {}/{}",
            response.progress.current_batch, response.progress.total_batches
        ));
    })
    .await;

    let aggregate = match result {
        Ok(aggregate) => {
            bar.finish_with_message("Completed");
            aggregate
        }
        Err(e) => {
            bar.abandon_with_message("Failed");
            return Err(e.into());
        }
    };

    if format == OutputFormat::Table {
        println!("Batches: {}", aggregate.batches);
        print_summary(&aggregate.into_summary(), format);
    } else {
        print_value(&json!({ "runId": args.run_id, "aggregate": aggregate }), format);
    }
    Ok(())
}

pub async fn summary(args: RunIdArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let record = client.summary(&args.run_id).await?;

    if format == OutputFormat::Table {
        println!(
            "Run {} executed at {}",
            record.run_id,
            record.executed_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        print_summary(&record.summary, format);
    } else {
        print_value(&record, format);
    }
    Ok(())
}
