//! Summarising Newman JSON reports
//!
//! Failures are grouped by the name of the request that produced them, keeping
//! the first assertion message. A request counts as passed when it executed
//! and never appears among the failures.

use std::collections::HashSet;

use serde_json::{json, Value};

use crate::types::{BatchSummary, FailedEndpoint, SuccessEndpoint};

const UNKNOWN: &str = "Unknown";

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

/// Build a pass/fail summary from a Newman JSON report
pub fn summarize_report(report: &Value) -> BatchSummary {
    let run = report.get("run").unwrap_or(&Value::Null);

    let total = run
        .pointer("/stats/requests/total")
        .and_then(Value::as_u64)
        .unwrap_or(0);

    let mut failed_names = HashSet::new();
    let mut failed_endpoints = Vec::new();
    for failure in run.get("failures").and_then(Value::as_array).into_iter().flatten() {
        let name = str_at(failure, "/source/name").unwrap_or(UNKNOWN);
        if failed_names.insert(name.to_string()) {
            failed_endpoints.push(FailedEndpoint {
                endpoint: name.to_string(),
                message: str_at(failure, "/error/message")
                    .unwrap_or("Unknown error")
                    .to_string(),
            });
        }
    }

    let mut seen = HashSet::new();
    let mut success_endpoints = Vec::new();
    for execution in run.get("executions").and_then(Value::as_array).into_iter().flatten() {
        let name = str_at(execution, "/item/name").unwrap_or(UNKNOWN);
        if failed_names.contains(name) || !seen.insert(name.to_string()) {
            continue;
        }
        let status = execution
            .pointer("/response/code")
            .cloned()
            .unwrap_or_else(|| json!("N/A"));
        let response_time = match execution.pointer("/response/responseTime") {
            Some(Value::Number(ms)) => json!(format!("{}ms", ms)),
            _ => json!("N/A"),
        };
        success_endpoints.push(SuccessEndpoint {
            endpoint: name.to_string(),
            status,
            response_time,
        });
    }

    BatchSummary {
        total,
        passed: success_endpoints.len() as u64,
        failed: failed_endpoints.len() as u64,
        success_endpoints,
        failed_endpoints,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_mixed_report() {
        let report = json!({
            "run": {
                "stats": {"requests": {"total": 4}},
                "failures": [
                    {"source": {"name": "Create pet"}, "error": {"message": "expected 201 got 500"}},
                    {"source": {"name": "Create pet"}, "error": {"message": "second assertion"}},
                    {"source": {"name": "Delete pet"}, "error": {}}
                ],
                "executions": [
                    {"item": {"name": "List pets"}, "response": {"code": 200, "responseTime": 35}},
                    {"item": {"name": "Create pet"}, "response": {"code": 500, "responseTime": 10}},
                    {"item": {"name": "List pets"}, "response": {"code": 200, "responseTime": 40}},
                    {"item": {"name": "Health"}},
                    {"item": {"name": "Delete pet"}, "response": {"code": 404}}
                ]
            }
        });

        let summary = summarize_report(&report);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.failed_endpoints[0].message, "expected 201 got 500");
        assert_eq!(summary.failed_endpoints[1].message, "Unknown error");

        assert_eq!(summary.passed, 2);
        assert_eq!(summary.success_endpoints[0].endpoint, "List pets");
        assert_eq!(summary.success_endpoints[0].status, json!(200));
        assert_eq!(summary.success_endpoints[0].response_time, json!("35ms"));
        assert_eq!(summary.success_endpoints[1].status, json!("N/A"));
        assert_eq!(summary.success_endpoints[1].response_time, json!("N/A"));
    }

    #[test]
    fn test_summarize_empty_report() {
        assert_eq!(summarize_report(&json!({})), BatchSummary::default());
    }
}
