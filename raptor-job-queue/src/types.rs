//! Core types for the job queue system.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Job type constants for type-safe job references.
pub mod job_types {
    pub const QUANTIFY: &str = "scram.quantify";
    pub const QUANTIFY_ADAPTIVE: &str = "scram.quantify.adaptive";
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Partial,
    Failed,
}

impl JobStatus {
    /// Returns true if this status represents a terminal state.
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Partial | Self::Failed)
    }

    /// Terminal states that carry a result document.
    #[inline]
    pub const fn has_output(self) -> bool {
        matches!(self, Self::Completed | Self::Partial)
    }

    /// Combine the statuses of a batch's sequence jobs into one batch status.
    ///
    /// Returns `None` when there are no children to combine.
    pub fn roll_up<I: IntoIterator<Item = JobStatus>>(children: I) -> Option<JobStatus> {
        let mut total = 0usize;
        let mut queued = 0usize;
        let mut running = 0usize;
        let mut completed = 0usize;
        let mut failed = 0usize;
        for status in children {
            total += 1;
            match status {
                Self::Queued => queued += 1,
                Self::Processing => running += 1,
                Self::Completed => completed += 1,
                Self::Failed => failed += 1,
                Self::Partial => {}
            }
        }

        if total == 0 {
            None
        } else if queued == total {
            Some(Self::Queued)
        } else if queued + running > 0 {
            Some(Self::Processing)
        } else if completed == total {
            Some(Self::Completed)
        } else if failed == total {
            Some(Self::Failed)
        } else {
            Some(Self::Partial)
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Partial => "PARTIAL",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "queued" => Ok(Self::Queued),
            "processing" | "running" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "partial" => Ok(Self::Partial),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Shape of a job within the batch hierarchy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// A whole request quantified as one unit.
    Standalone,
    /// The root of a decomposed request. Never dispatched itself.
    Batch,
    /// One sequence of a batch.
    Sequence,
}

/// Dispatch and pickup timestamps, in milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    pub sent_at: Option<i64>,
    pub received_at: Option<i64>,
}

/// Truncation limits handed to the quantification engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TruncationCriteria {
    /// Maximum size of a retained product.
    pub limit_order: u32,
    /// Products with a probability below this are dropped.
    pub cut_off: f64,
}

impl TruncationCriteria {
    /// Loosen the criteria so the next quantification keeps more products.
    #[must_use]
    pub fn widen(self, order_step: u32, cut_off_factor: f64) -> Self {
        Self {
            limit_order: self.limit_order.saturating_add(order_step),
            cut_off: self.cut_off / cut_off_factor,
        }
    }
}

/// Parameters a worker needs to run the adaptive truncation loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveParams {
    pub initial: TruncationCriteria,
    /// Largest acceptable `relativeError` before the result counts as converged.
    pub tolerance: f64,
    pub max_iterations: u32,
    pub order_step: u32,
    pub cut_off_factor: f64,
}

impl Default for AdaptiveParams {
    fn default() -> Self {
        Self {
            initial: TruncationCriteria {
                limit_order: 3,
                cut_off: 1e-8,
            },
            tolerance: 0.05,
            max_iterations: 5,
            order_step: 1,
            cut_off_factor: 10.0,
        }
    }
}

/// Performance and result record reported by the engine for one job.
///
/// `total_seconds` and `report_write_time_ms` are internal engine fields; they
/// are stored as reported but never leave the service (see [`ReportedStats`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub products: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_products: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exact_probability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approximate_probability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative_error: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_write_time_ms: Option<f64>,
    /// Engine fields this service does not interpret; passed through as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobStats {
    /// Names of the adaptive fields an adaptive job's report is missing.
    pub fn missing_adaptive_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.products.is_none() {
            missing.push("products");
        }
        if self.original_products.is_none() {
            missing.push("originalProducts");
        }
        if self.exact_probability.is_none() {
            missing.push("exactProbability");
        }
        if self.approximate_probability.is_none() {
            missing.push("approximateProbability");
        }
        if self.relative_error.is_none() {
            missing.push("relativeError");
        }
        missing
    }
}

/// Externally visible form of [`JobStats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub products: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_products: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exact_probability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approximate_probability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative_error: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Stored state of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub job_id: String,
    pub parent_id: Option<String>,
    pub kind: JobKind,
    pub job_type: String,
    pub adaptive: bool,
    pub status: JobStatus,
    pub input_ref: String,
    pub output_ref: Option<String>,
    /// Number of sequence jobs allocated for a batch root; zero otherwise.
    pub child_count: usize,
    pub timing: Timing,
    pub stats: Option<JobStats>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Create a new queued record.
    pub fn queued(
        job_id: impl Into<String>,
        parent_id: Option<String>,
        kind: JobKind,
        job_type: impl Into<String>,
        adaptive: bool,
        input_ref: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            parent_id,
            kind,
            job_type: job_type.into(),
            adaptive,
            status: JobStatus::Queued,
            input_ref: input_ref.into(),
            output_ref: None,
            child_count: 0,
            timing: Timing::default(),
            stats: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the number of sequence jobs of a batch root.
    #[inline]
    #[must_use]
    pub fn with_children(mut self, child_count: usize) -> Self {
        self.child_count = child_count;
        self
    }

    /// Set the dispatch timestamp.
    #[inline]
    #[must_use]
    pub fn sent_at(mut self, sent_at: i64) -> Self {
        self.timing.sent_at = Some(sent_at);
        self
    }

    /// Build the status view of this record, reporting `status`.
    pub fn status_record(&self, status: JobStatus) -> JobStatusRecord {
        JobStatusRecord {
            job_id: self.job_id.clone(),
            parent_id: self.parent_id.clone(),
            kind: self.kind,
            status,
            adaptive: self.adaptive,
            input_id: self.job_id.clone(),
            output_id: self.output_ref.as_ref().map(|_| self.job_id.clone()),
            child_count: (self.kind == JobKind::Batch).then_some(self.child_count),
            sent_at: self.timing.sent_at,
            received_at: self.timing.received_at,
            error_message: self.error_message.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Status view of a job as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusRecord {
    pub job_id: String,
    pub parent_id: Option<String>,
    pub kind: JobKind,
    pub status: JobStatus,
    pub adaptive: bool,
    pub input_id: String,
    pub output_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_count: Option<usize>,
    pub sent_at: Option<i64>,
    pub received_at: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Work item carried by the dispatch channel to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub job_id: String,
    pub job_type: String,
    pub input_ref: String,
    /// Present only for adaptively quantified jobs.
    pub adaptive: Option<AdaptiveParams>,
    pub sent_at: i64,
}

/// Outcome reported by a worker for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    pub status: JobStatus,
    #[serde(default)]
    pub stats: Option<JobStats>,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl JobReport {
    /// A successful report carrying stats and a result document.
    pub fn completed(status: JobStatus, stats: JobStats, output: Value) -> Self {
        Self {
            status,
            stats: Some(stats),
            output: Some(output),
            error: None,
        }
    }

    /// A failure report with an error message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            stats: None,
            output: None,
            error: Some(message.into()),
        }
    }
}

/// Result documents of a job, or of every sequence of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedOutput {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequences: Option<Vec<SequenceOutput>>,
}

/// Result document of one sequence job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceOutput {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

/// Current time in milliseconds since the Unix epoch.
#[inline]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
