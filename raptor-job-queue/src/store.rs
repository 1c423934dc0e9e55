//! Job status store.
//!
//! The store is the single piece of shared mutable state of the service. Each
//! job record sits behind its own lock inside a concurrent map, so writers to
//! different jobs never contend, while writes to one job are serialized. A
//! report's output document is persisted while the record's write lock is
//! held, so no reader can observe a terminal status without its output.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::artifact::{input_key, output_key, ArtifactStore, InMemoryArtifactStore};
use crate::error::JobQueueError;
use crate::id::child_id;
use crate::types::{
    now_millis, AggregatedOutput, JobKind, JobRecord, JobReport, JobStatus, JobStatusRecord,
    SequenceOutput,
};

type SharedRecord = Arc<RwLock<JobRecord>>;

/// Key-value record of job lifecycle state plus access to job artifacts.
#[derive(Clone)]
pub struct StatusStore {
    records: Arc<DashMap<String, SharedRecord>>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl fmt::Debug for StatusStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusStore")
            .field("records", &self.records.len())
            .field("artifacts", &"<dyn ArtifactStore>")
            .finish()
    }
}

impl StatusStore {
    pub fn new(artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            artifacts,
        }
    }

    /// Store backed by an in-memory artifact store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryArtifactStore::new()))
    }

    fn shared(&self, job_id: &str) -> Result<SharedRecord, JobQueueError> {
        self.records
            .get(job_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| JobQueueError::NotFound(job_id.to_owned()))
    }

    fn all_shared(&self) -> Vec<SharedRecord> {
        self.records
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Insert a new job record. Job ids are never reused.
    pub fn create(&self, record: JobRecord) -> Result<(), JobQueueError> {
        use dashmap::mapref::entry::Entry;

        match self.records.entry(record.job_id.clone()) {
            Entry::Occupied(_) => Err(JobQueueError::PersistFailure {
                job_id: record.job_id,
                reason: "job id already exists".into(),
            }),
            Entry::Vacant(slot) => {
                debug!(job_id = %record.job_id, kind = ?record.kind, "job record created");
                slot.insert(Arc::new(RwLock::new(record)));
                Ok(())
            }
        }
    }

    /// Drop a record that never reached the dispatch channel.
    pub(crate) fn discard(&self, job_id: &str) {
        if self.records.remove(job_id).is_some() {
            debug!(job_id, "discarded undispatched job record");
        }
    }

    /// Snapshot of the stored record of `job_id`.
    pub async fn get_record(&self, job_id: &str) -> Result<JobRecord, JobQueueError> {
        let shared = self.shared(job_id)?;
        let record = shared.read().await;
        Ok(record.clone())
    }

    /// Overwrite the status of `job_id` (last write wins).
    ///
    /// COMPLETED and PARTIAL are accepted only once an output is stored, and a
    /// batch root's status is never written since it is derived.
    pub async fn put_status(
        &self,
        job_id: &str,
        status: JobStatus,
    ) -> Result<JobStatusRecord, JobQueueError> {
        let shared = self.shared(job_id)?;
        let mut record = shared.write().await;
        if record.kind == JobKind::Batch {
            return Err(JobQueueError::InvalidReport {
                job_id: job_id.to_owned(),
                reason: "batch root status is derived from its sequences".into(),
            });
        }
        if status.has_output() && record.output_ref.is_none() {
            return Err(JobQueueError::InvalidReport {
                job_id: job_id.to_owned(),
                reason: format!("status {status} requires a stored output"),
            });
        }
        record.status = status;
        record.updated_at = Utc::now();
        Ok(record.status_record(status))
    }

    /// Status view of `job_id`. A batch root reports the roll-up of its sequences.
    pub async fn get_status(&self, job_id: &str) -> Result<JobStatusRecord, JobQueueError> {
        let record = self.get_record(job_id).await?;
        if record.kind != JobKind::Batch {
            return Ok(record.status_record(record.status));
        }
        let children = self.children(&record).await;
        let status = JobStatus::roll_up(children.iter().map(|c| c.status)).unwrap_or(record.status);
        Ok(record.status_record(status))
    }

    /// Sequence job records of a batch root, in index order.
    ///
    /// Indices that were never enqueued are skipped.
    pub async fn children(&self, root: &JobRecord) -> Vec<JobRecord> {
        let mut children = Vec::with_capacity(root.child_count);
        for index in 0..root.child_count {
            let id = child_id(&root.job_id, index);
            if let Ok(child) = self.get_record(&id).await {
                children.push(child);
            }
        }
        children
    }

    /// Persist the request payload of `job_id`, returning its artifact key.
    pub async fn put_input(&self, job_id: &str, bytes: Bytes) -> Result<String, JobQueueError> {
        let key = input_key(job_id);
        self.artifacts
            .put(&key, bytes)
            .await
            .map_err(|e| JobQueueError::persist(job_id, e))?;
        Ok(key)
    }

    /// Request payload of a known job.
    pub async fn get_input(&self, job_id: &str) -> Result<Bytes, JobQueueError> {
        let record = self.get_record(job_id).await?;
        self.artifacts
            .get(&record.input_ref)
            .await
            .map_err(|e| JobQueueError::persist(job_id, e))
    }

    /// Persist a result document of `job_id` and point its record at it.
    pub async fn put_output(&self, job_id: &str, bytes: Bytes) -> Result<String, JobQueueError> {
        let shared = self.shared(job_id)?;
        let mut record = shared.write().await;
        let key = output_key(job_id);
        self.artifacts
            .put(&key, bytes)
            .await
            .map_err(|e| JobQueueError::persist(job_id, e))?;
        record.output_ref = Some(key.clone());
        record.updated_at = Utc::now();
        Ok(key)
    }

    async fn read_output(&self, record: &JobRecord) -> Result<Option<Value>, JobQueueError> {
        let Some(key) = record.output_ref.as_deref() else {
            return Ok(None);
        };
        let bytes = self
            .artifacts
            .get(key)
            .await
            .map_err(|e| JobQueueError::persist(&record.job_id, e))?;
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| JobQueueError::PersistFailure {
                job_id: record.job_id.clone(),
                reason: format!("stored output is not valid JSON: {e}"),
            })
    }

    /// Result documents of a job, or of every sequence of a batch root.
    pub async fn get_output(&self, job_id: &str) -> Result<AggregatedOutput, JobQueueError> {
        let record = self.get_record(job_id).await?;
        if record.kind != JobKind::Batch {
            let output = self.read_output(&record).await?;
            return Ok(AggregatedOutput {
                job_id: record.job_id,
                status: record.status,
                output,
                sequences: None,
            });
        }

        let children = self.children(&record).await;
        let status = JobStatus::roll_up(children.iter().map(|c| c.status)).unwrap_or(record.status);
        let mut sequences = Vec::with_capacity(children.len());
        for child in children {
            let output = self.read_output(&child).await?;
            sequences.push(SequenceOutput {
                job_id: child.job_id,
                status: child.status,
                output,
            });
        }
        Ok(AggregatedOutput {
            job_id: record.job_id,
            status,
            output: None,
            sequences: Some(sequences),
        })
    }

    /// Records currently in `status`, oldest first. Batch roots are not listed.
    pub async fn list_by_status(&self, status: JobStatus) -> Vec<JobRecord> {
        let mut matching = Vec::new();
        for shared in self.all_shared() {
            let record = shared.read().await;
            if record.kind != JobKind::Batch && record.status == status {
                matching.push(record.clone());
            }
        }
        matching.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.job_id.cmp(&b.job_id))
        });
        matching
    }

    /// Ids of every completed job, oldest first.
    pub async fn list_completed_job_ids(&self) -> Vec<String> {
        self.list_by_status(JobStatus::Completed)
            .await
            .into_iter()
            .map(|r| r.job_id)
            .collect()
    }

    /// Record that a worker picked up `job_id`.
    ///
    /// Returns `None` when the job already reached a terminal state, which
    /// happens when the broker redelivers a finished job.
    pub async fn mark_processing(&self, job_id: &str) -> Result<Option<JobRecord>, JobQueueError> {
        let shared = self.shared(job_id)?;
        let mut record = shared.write().await;
        if record.kind == JobKind::Batch {
            return Err(JobQueueError::InvalidReport {
                job_id: job_id.to_owned(),
                reason: "batch roots are not executed by workers".into(),
            });
        }
        if record.status.is_terminal() {
            return Ok(None);
        }
        record.status = JobStatus::Processing;
        record.timing.received_at = Some(now_millis());
        record.updated_at = Utc::now();
        Ok(Some(record.clone()))
    }

    /// Apply a worker report: status, stats and output change together.
    pub async fn record_report(
        &self,
        job_id: &str,
        report: JobReport,
    ) -> Result<JobStatusRecord, JobQueueError> {
        let shared = self.shared(job_id)?;
        let mut record = shared.write().await;

        validate_report(&record, &report)?;

        let output_ref = match report.output {
            Some(ref output) => {
                let bytes = serde_json::to_vec(output).map_err(|e| JobQueueError::InvalidReport {
                    job_id: job_id.to_owned(),
                    reason: e.to_string(),
                })?;
                let key = output_key(job_id);
                self.artifacts
                    .put(&key, Bytes::from(bytes))
                    .await
                    .map_err(|e| JobQueueError::persist(job_id, e))?;
                Some(key)
            }
            None => None,
        };

        record.status = report.status;
        if output_ref.is_some() {
            record.output_ref = output_ref;
        }
        if report.stats.is_some() {
            record.stats = report.stats;
        }
        record.error_message = report.error;
        if record.timing.received_at.is_none() {
            record.timing.received_at = Some(now_millis());
        }
        record.updated_at = Utc::now();

        if report.status == JobStatus::Failed {
            warn!(
                job_id,
                error = record.error_message.as_deref().unwrap_or("-"),
                "job reported failure"
            );
        } else {
            info!(job_id, status = %report.status, "job report recorded");
        }

        Ok(record.status_record(record.status))
    }
}

fn validate_report(record: &JobRecord, report: &JobReport) -> Result<(), JobQueueError> {
    let reject = |reason: String| JobQueueError::InvalidReport {
        job_id: record.job_id.clone(),
        reason,
    };

    if record.kind == JobKind::Batch {
        return Err(reject("batch roots are not executed by workers".into()));
    }
    if report.status.has_output() && report.output.is_none() {
        return Err(reject(format!(
            "a {} report must carry an output document",
            report.status
        )));
    }
    if record.adaptive && report.status.has_output() {
        let missing = report
            .stats
            .as_ref()
            .map(|s| s.missing_adaptive_fields())
            .unwrap_or_else(|| vec!["stats"]);
        if !missing.is_empty() {
            return Err(reject(format!(
                "adaptive report is missing {}",
                missing.join(", ")
            )));
        }
    }
    Ok(())
}
