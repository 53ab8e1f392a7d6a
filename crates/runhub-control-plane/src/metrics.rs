//! Prometheus metrics collection and formatting.
//!
//! This module provides metrics in Prometheus text exposition format.

use std::collections::HashMap;
use std::fmt::Write;

use runhub_core::{PageRequest, RunStatus};

use crate::store::{RunStore, StoreError};

const SCAN_PAGE_SIZE: usize = 500;

/// Collect run metrics from the store and format as Prometheus text.
pub async fn collect_metrics(runs: &dyn RunStore) -> Result<String, StoreError> {
    let counts = count_by_status(runs).await?;
    let mut output = String::new();

    writeln!(output, "# HELP runhub_runs_total Number of runs by status").ok();
    writeln!(output, "# TYPE runhub_runs_total gauge").ok();
    for status in RunStatus::ALL {
        let count = counts.get(&status).copied().unwrap_or(0);
        writeln!(
            output,
            "runhub_runs_total{{status=\"{}\"}} {count}",
            status.as_str().to_lowercase()
        )
        .ok();
    }

    Ok(output)
}

async fn count_by_status(runs: &dyn RunStore) -> Result<HashMap<RunStatus, u64>, StoreError> {
    let mut counts = HashMap::new();
    let mut page = 0;
    loop {
        let batch = runs.find_all(PageRequest::new(page, SCAN_PAGE_SIZE)).await?;
        for run in &batch.content {
            *counts.entry(run.status).or_insert(0u64) += 1;
        }
        if batch.content.len() < SCAN_PAGE_SIZE {
            break;
        }
        page += 1;
    }
    Ok(counts)
}
