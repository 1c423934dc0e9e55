//! Producer: turns quantification requests into queued jobs.
//!
//! Every unit of work goes through the same steps: persist its input, create a
//! QUEUED record, publish a work item. If publishing fails the record is
//! discarded again so no job exists that no worker will ever receive; the
//! stored input stays behind and is harmless.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::dispatch::DispatchChannel;
use crate::error::JobQueueError;
use crate::id::{child_id, new_root_id};
use crate::job_types;
use crate::store::StatusStore;
use crate::types::{now_millis, AdaptiveParams, JobKind, JobRecord, WorkItem};

/// Splits a request into independently quantifiable sequence requests.
pub trait SequenceExtractor: Send + Sync {
    /// Ordered sub-requests, one per sequence. An empty list means there is
    /// nothing to quantify.
    fn extract(&self, request: &Value) -> Result<Vec<Value>, JobQueueError>;
}

/// Extractor reading a `sequences` array from the request document.
///
/// Each element becomes a copy of the request with `sequences` removed and
/// `sequence` set to that element.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSequenceExtractor;

impl SequenceExtractor for JsonSequenceExtractor {
    fn extract(&self, request: &Value) -> Result<Vec<Value>, JobQueueError> {
        let Some(object) = request.as_object() else {
            return Ok(Vec::new());
        };
        let Some(sequences) = object.get("sequences").and_then(Value::as_array) else {
            return Ok(Vec::new());
        };

        let mut base = object.clone();
        base.remove("sequences");
        Ok(sequences
            .iter()
            .map(|sequence| {
                let mut sub = base.clone();
                sub.insert("sequence".to_string(), sequence.clone());
                Value::Object(sub)
            })
            .collect())
    }
}

/// Producer tuning.
#[derive(Debug, Clone, Copy)]
pub struct ProducerConfig {
    /// Sequence jobs of one batch persisted and published concurrently.
    pub fan_out: usize,
    /// Parameters attached to adaptively quantified jobs.
    pub adaptive: AdaptiveParams,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            fan_out: 8,
            adaptive: AdaptiveParams::default(),
        }
    }
}

struct Unit {
    job_id: String,
    parent_id: Option<String>,
    kind: JobKind,
    adaptive: bool,
    payload: Bytes,
}

/// Decomposes requests and enqueues their jobs.
#[derive(Clone)]
pub struct Producer {
    store: StatusStore,
    dispatch: Arc<dyn DispatchChannel>,
    extractor: Arc<dyn SequenceExtractor>,
    config: ProducerConfig,
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("store", &self.store)
            .field("dispatch", &"<dyn DispatchChannel>")
            .field("extractor", &"<dyn SequenceExtractor>")
            .field("config", &self.config)
            .finish()
    }
}

impl Producer {
    pub fn new(
        store: StatusStore,
        dispatch: Arc<dyn DispatchChannel>,
        extractor: Arc<dyn SequenceExtractor>,
        config: ProducerConfig,
    ) -> Self {
        Self {
            store,
            dispatch,
            extractor,
            config,
        }
    }

    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    /// Queue the whole request as one job and return its id.
    pub async fn create_and_queue_quant(&self, request: &Value) -> Result<String, JobQueueError> {
        self.enqueue_standalone(request, false).await
    }

    /// Queue the whole request as one adaptively quantified job.
    pub async fn create_and_queue_adaptive_quant(
        &self,
        request: &Value,
    ) -> Result<String, JobQueueError> {
        self.enqueue_standalone(request, true).await
    }

    /// Queue one job per sequence of the request.
    ///
    /// Returns the sequence job ids in sequence order. The batch root is not
    /// returned; it is `parent_of(ids[0])`.
    pub async fn create_and_queue_sequence_batch(
        &self,
        request: &Value,
    ) -> Result<Vec<String>, JobQueueError> {
        self.enqueue_batch(request, false).await
    }

    /// Queue one adaptively quantified job per sequence of the request.
    pub async fn create_and_queue_adaptive_sequence_batch(
        &self,
        request: &Value,
    ) -> Result<Vec<String>, JobQueueError> {
        self.enqueue_batch(request, true).await
    }

    async fn enqueue_standalone(
        &self,
        request: &Value,
        adaptive: bool,
    ) -> Result<String, JobQueueError> {
        let job_id = new_root_id();
        let payload = encode(&job_id, request)?;
        let unit = Unit {
            job_id,
            parent_id: None,
            kind: JobKind::Standalone,
            adaptive,
            payload,
        };
        let job_id = self.enqueue(unit).await?;
        info!(%job_id, adaptive, "queued quantification job");
        Ok(job_id)
    }

    async fn enqueue_batch(
        &self,
        request: &Value,
        adaptive: bool,
    ) -> Result<Vec<String>, JobQueueError> {
        let sequences = self.extractor.extract(request)?;
        if sequences.is_empty() {
            return Err(JobQueueError::DecompositionEmpty);
        }

        let root_id = new_root_id();
        let count = sequences.len();
        let mut units = Vec::with_capacity(count);
        for (index, sequence) in sequences.iter().enumerate() {
            let job_id = child_id(&root_id, index);
            let payload = encode(&job_id, sequence)?;
            units.push(Unit {
                job_id,
                parent_id: Some(root_id.clone()),
                kind: JobKind::Sequence,
                adaptive,
                payload,
            });
        }

        let input_ref = self
            .store
            .put_input(&root_id, encode(&root_id, request)?)
            .await?;
        self.store.create(
            JobRecord::queued(&root_id, None, JobKind::Batch, job_type(adaptive), adaptive, input_ref)
                .with_children(count)
                .sent_at(now_millis()),
        )?;

        let aborted = AtomicBool::new(false);
        let outcomes: Vec<Option<Result<String, JobQueueError>>> = stream::iter(units)
            .map(|unit| {
                let aborted = &aborted;
                async move {
                    if aborted.load(Ordering::Acquire) {
                        return None;
                    }
                    let outcome = self.enqueue(unit).await;
                    if outcome.is_err() {
                        aborted.store(true, Ordering::Release);
                    }
                    Some(outcome)
                }
            })
            .buffered(self.config.fan_out.max(1))
            .collect()
            .await;

        let mut enqueued = Vec::with_capacity(count);
        let mut failure = None;
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Some(Ok(job_id)) => enqueued.push(job_id),
                Some(Err(err)) if failure.is_none() => failure = Some((index, err)),
                Some(Err(err)) => debug!(%root_id, index, error = %err, "additional sequence failure"),
                None => {}
            }
        }

        match failure {
            None => {
                info!(%root_id, sequences = count, adaptive, "queued sequence batch");
                Ok(enqueued)
            }
            Some((_, err)) if enqueued.is_empty() => {
                self.store.discard(&root_id);
                warn!(%root_id, error = %err, "sequence batch failed before any job was queued");
                Err(err)
            }
            Some((failed_index, err)) => {
                warn!(
                    %root_id,
                    failed_index,
                    queued = enqueued.len(),
                    error = %err,
                    "sequence batch partially queued"
                );
                Err(JobQueueError::PartialBatchFailure {
                    root_id,
                    failed_index,
                    enqueued,
                    source: Box::new(err),
                })
            }
        }
    }

    async fn enqueue(&self, unit: Unit) -> Result<String, JobQueueError> {
        let Unit {
            job_id,
            parent_id,
            kind,
            adaptive,
            payload,
        } = unit;

        let input_ref = self.store.put_input(&job_id, payload).await?;
        let sent_at = now_millis();
        let job_type = job_type(adaptive);
        self.store.create(
            JobRecord::queued(&job_id, parent_id, kind, job_type, adaptive, input_ref.clone())
                .sent_at(sent_at),
        )?;

        let item = WorkItem {
            job_id: job_id.clone(),
            job_type: job_type.to_string(),
            input_ref,
            adaptive: adaptive.then_some(self.config.adaptive),
            sent_at,
        };
        if let Err(err) = self.dispatch.publish(item).await {
            self.store.discard(&job_id);
            return Err(JobQueueError::publish(&job_id, err));
        }
        debug!(%job_id, job_type, "published work item");
        Ok(job_id)
    }
}

fn job_type(adaptive: bool) -> &'static str {
    if adaptive {
        job_types::QUANTIFY_ADAPTIVE
    } else {
        job_types::QUANTIFY
    }
}

fn encode(job_id: &str, value: &Value) -> Result<Bytes, JobQueueError> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| JobQueueError::PersistFailure {
            job_id: job_id.to_owned(),
            reason: e.to_string(),
        })
}
