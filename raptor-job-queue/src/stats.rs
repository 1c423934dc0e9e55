//! Aggregated statistics view of a job and its sequence jobs.

use serde::{Deserialize, Serialize};

use crate::error::JobQueueError;
use crate::id;
use crate::store::StatusStore;
use crate::types::{JobKind, JobRecord, JobStats, ReportedStats};

/// Statistics of one job, plus those of every sequence of its batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatsView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ReportedStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_stats: Option<Vec<ChildStatsView>>,
}

/// Statistics of one sequence job of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildStatsView {
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ReportedStats>,
}

/// Bring engine stats into their external form.
///
/// A legacy `totalSeconds` fills a missing `analysisSeconds`; `totalSeconds`
/// and `reportWriteTimeMs` are then dropped.
pub fn normalize(stats: JobStats) -> ReportedStats {
    let JobStats {
        started_at,
        ended_at,
        idle_time,
        execution_time,
        analysis_seconds,
        probability,
        products,
        original_products,
        exact_probability,
        approximate_probability,
        relative_error,
        total_seconds,
        report_write_time_ms: _,
        mut extra,
    } = stats;

    // Engines that predate the typed fields may still send these untyped.
    extra.remove("totalSeconds");
    extra.remove("reportWriteTimeMs");

    ReportedStats {
        started_at,
        ended_at,
        idle_time,
        execution_time,
        analysis_seconds: analysis_seconds.or(total_seconds),
        probability,
        products,
        original_products,
        exact_probability,
        approximate_probability,
        relative_error,
        extra,
    }
}

/// Read model combining a job's own stats with its sequences' stats.
#[derive(Debug, Clone)]
pub struct StatsAggregator {
    store: StatusStore,
}

impl StatsAggregator {
    pub fn new(store: StatusStore) -> Self {
        Self { store }
    }

    /// Stats of `job_id`. Computed on every read, never persisted.
    ///
    /// A batch root, or any of its sequences, also carries `childStats` for
    /// every sequence of the batch. A job that has not reported yet yields
    /// `stats: None`; an unknown id is [`JobQueueError::NotFound`].
    pub async fn get_job_stats(&self, job_id: &str) -> Result<JobStatsView, JobQueueError> {
        let record = self.store.get_record(job_id).await?;

        let root = match record.kind {
            JobKind::Batch => Some(record.clone()),
            JobKind::Sequence => match id::parent_of(job_id) {
                Some(root_id) => self.store.get_record(root_id).await.ok(),
                None => None,
            },
            JobKind::Standalone => None,
        };
        let child_stats = match root {
            Some(root) => {
                let children = self.store.children(&root).await;
                Some(children.into_iter().map(child_view).collect())
            }
            None => None,
        };

        Ok(JobStatsView {
            sent_at: record.timing.sent_at,
            received_at: record.timing.received_at,
            stats: record.stats.map(normalize),
            child_stats,
        })
    }
}

fn child_view(record: JobRecord) -> ChildStatsView {
    ChildStatsView {
        job_id: record.job_id,
        sent_at: record.timing.sent_at,
        received_at: record.timing.received_at,
        stats: record.stats.map(normalize),
    }
}
