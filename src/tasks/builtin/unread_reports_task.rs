use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::engine::database::Database;
use crate::engine::types::{Document, Options, REPORTS_COLLECTION, ReportStatus};
use crate::tasks::Task;

/// Summarizes the reports nobody has read yet.
pub struct UnreadReportsTask;

#[async_trait]
impl Task for UnreadReportsTask {
    fn name(&self) -> &str {
        "unread_reports"
    }

    fn description(&self) -> &str {
        "Count unread reports by status and source"
    }

    async fn run(&self, db: &Database, options: &Options) -> Result<()> {
        let mut criteria = Document::new();
        criteria.insert("read".to_string(), serde_json::Value::Bool(false));
        if let Some(source) = options.get_str("source") {
            criteria.insert("source".to_string(), serde_json::json!(source));
        }

        let unread = db.collection(REPORTS_COLLECTION).find(&criteria).await?;

        let mut by_status: BTreeMap<String, u64> = BTreeMap::new();
        let mut by_source: BTreeMap<String, u64> = BTreeMap::new();
        for report in &unread {
            let status = report
                .get("status")
                .and_then(|v| v.as_str())
                .unwrap_or("UNKNOWN");
            let source = report
                .get("source")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            *by_status.entry(status.to_string()).or_insert(0) += 1;
            *by_source.entry(source.to_string()).or_insert(0) += 1;
        }

        let failures = by_status
            .get(&ReportStatus::Failure.to_string())
            .copied()
            .unwrap_or(0);

        tracing::info!(
            unread = unread.len(),
            failures = failures,
            "Counted unread reports"
        );

        let mut additional = Document::new();
        additional.insert("unread".to_string(), serde_json::json!(unread.len()));
        additional.insert("by_status".to_string(), serde_json::to_value(&by_status)?);
        additional.insert("by_source".to_string(), serde_json::to_value(&by_source)?);

        if failures > 0 {
            db.warning(
                format!("{} unread report(s), {} failure(s)", unread.len(), failures),
                Some(additional),
            )
            .await?;
        } else {
            db.success(format!("{} unread report(s)", unread.len()), Some(additional))
                .await?;
        }
        Ok(())
    }
}
