//! Quantification executors.

use std::sync::Arc;

use raptor_job_queue::{
    async_trait, now_millis, AdaptiveParams, JobExecutor, JobQueueError, JobReport, JobStats,
    JobStatus, StatusStore, WorkItem,
};
use serde_json::Value;
use tracing::info;

use crate::adaptive::run_adaptive;
use crate::engine::{EngineRun, QuantEngine};
use crate::error::JobError;
use crate::job_types;

async fn load_request(store: &StatusStore, item: &WorkItem) -> Result<Value, JobError> {
    let bytes = store.get_input(&item.job_id).await?;
    serde_json::from_slice(&bytes).map_err(|e| JobError::InvalidPayload(e.to_string()))
}

/// Timing fields shared by every report; durations are in milliseconds.
fn timed_stats(item: &WorkItem, started_at: i64, ended_at: i64, run: &EngineRun) -> JobStats {
    JobStats {
        started_at: Some(started_at),
        ended_at: Some(ended_at),
        idle_time: Some((started_at - item.sent_at).max(0) as f64),
        execution_time: Some((ended_at - started_at) as f64),
        analysis_seconds: run.analysis_seconds,
        probability: Some(run.probability),
        products: Some(run.products),
        ..JobStats::default()
    }
}

/// Executor for `scram.quantify` jobs: a single engine run.
pub struct QuantifyExecutor {
    store: StatusStore,
    engine: Arc<dyn QuantEngine>,
}

impl QuantifyExecutor {
    pub fn new(store: StatusStore, engine: Arc<dyn QuantEngine>) -> Self {
        Self { store, engine }
    }

    async fn run(&self, item: &WorkItem) -> Result<(), JobError> {
        let request = load_request(&self.store, item).await?;

        let started_at = now_millis();
        let run = self.engine.quantify(&request, None).await?;
        let ended_at = now_millis();

        let stats = timed_stats(item, started_at, ended_at, &run);
        self.store
            .record_report(
                &item.job_id,
                JobReport::completed(JobStatus::Completed, stats, run.output),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl JobExecutor for QuantifyExecutor {
    fn job_type(&self) -> &str {
        job_types::QUANTIFY
    }

    async fn execute(&self, item: WorkItem) -> Result<(), JobQueueError> {
        info!(job_id = %item.job_id, "executing scram.quantify job");
        self.run(&item).await.map_err(Into::into)
    }
}

/// Executor for `scram.quantify.adaptive` jobs.
///
/// Parameters travel with the work item; items without them fall back to the
/// executor's defaults.
pub struct AdaptiveQuantifyExecutor {
    store: StatusStore,
    engine: Arc<dyn QuantEngine>,
    defaults: AdaptiveParams,
}

impl AdaptiveQuantifyExecutor {
    pub fn new(store: StatusStore, engine: Arc<dyn QuantEngine>, defaults: AdaptiveParams) -> Self {
        Self {
            store,
            engine,
            defaults,
        }
    }

    async fn run(&self, item: &WorkItem) -> Result<(), JobError> {
        let request = load_request(&self.store, item).await?;
        let params = item.adaptive.unwrap_or(self.defaults);

        let started_at = now_millis();
        let outcome = run_adaptive(self.engine.as_ref(), &request, &params).await?;
        let ended_at = now_millis();

        let mut stats = timed_stats(item, started_at, ended_at, &outcome.run);
        stats.original_products = Some(outcome.original_products);
        stats.exact_probability = Some(outcome.exact_probability);
        stats.approximate_probability = Some(outcome.run.probability);
        stats.relative_error = Some(outcome.relative_error);

        let status = outcome.status();
        self.store
            .record_report(
                &item.job_id,
                JobReport::completed(status, stats, outcome.run.output),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl JobExecutor for AdaptiveQuantifyExecutor {
    fn job_type(&self) -> &str {
        job_types::QUANTIFY_ADAPTIVE
    }

    async fn execute(&self, item: WorkItem) -> Result<(), JobQueueError> {
        info!(job_id = %item.job_id, "executing scram.quantify.adaptive job");
        self.run(&item).await.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use raptor_job_queue::{
        InMemoryDispatch, JsonSequenceExtractor, Producer, ProducerConfig, WorkReceiver,
        WorkerPool,
    };
    use serde_json::json;

    use super::*;
    use crate::adaptive::tests::ScriptedEngine;
    use crate::register_all_executors;

    fn setup(adaptive: AdaptiveParams) -> (Producer, WorkerPool, WorkReceiver) {
        let store = StatusStore::in_memory();
        let (dispatch, receiver) = InMemoryDispatch::new(64);
        let producer = Producer::new(
            store.clone(),
            Arc::new(dispatch),
            Arc::new(JsonSequenceExtractor),
            ProducerConfig {
                adaptive,
                ..ProducerConfig::default()
            },
        );
        (producer, WorkerPool::new(store), receiver)
    }

    async fn drain(pool: &WorkerPool, receiver: &WorkReceiver, n: usize) -> Vec<JobStatus> {
        let mut statuses = Vec::new();
        for _ in 0..n {
            let item = receiver.recv().await.unwrap();
            statuses.push(pool.process(item).await.unwrap());
        }
        statuses
    }

    #[tokio::test]
    async fn plain_job_records_stats_and_output() {
        let (producer, pool, receiver) = setup(AdaptiveParams::default());
        register_all_executors(&pool, Arc::new(ScriptedEngine::new()), AdaptiveParams::default())
            .await;

        let job_id = producer.create_and_queue_quant(&json!({ "model": {} })).await.unwrap();
        assert_eq!(drain(&pool, &receiver, 1).await, vec![JobStatus::Completed]);

        let record = pool.store().get_record(&job_id).await.unwrap();
        let stats = record.stats.unwrap();
        assert_eq!(stats.products, Some(30));
        assert_eq!(stats.analysis_seconds, Some(0.5));
        assert!(stats.idle_time.unwrap() >= 0.0);
        assert!(stats.relative_error.is_none());

        let output = pool.store().get_output(&job_id).await.unwrap();
        assert_eq!(output.output, Some(json!({ "limitOrder": 3 })));
    }

    #[tokio::test]
    async fn adaptive_batch_reports_adaptive_fields() {
        let params = AdaptiveParams {
            tolerance: 0.15,
            max_iterations: 10,
            ..AdaptiveParams::default()
        };
        let (producer, pool, receiver) = setup(params);
        register_all_executors(&pool, Arc::new(ScriptedEngine::new()), AdaptiveParams::default())
            .await;

        let request = json!({ "model": {}, "sequences": ["S1", "S2"] });
        let ids = producer
            .create_and_queue_adaptive_sequence_batch(&request)
            .await
            .unwrap();
        assert_eq!(
            drain(&pool, &receiver, 2).await,
            vec![JobStatus::Completed, JobStatus::Completed]
        );

        for id in &ids {
            let stats = pool.store().get_record(id).await.unwrap().stats.unwrap();
            assert!(stats.missing_adaptive_fields().is_empty());
            assert_eq!(stats.original_products, Some(30));
            assert_eq!(stats.products, Some(60));
        }
    }

    #[tokio::test]
    async fn engine_failure_marks_job_failed() {
        struct Broken;

        #[async_trait]
        impl QuantEngine for Broken {
            async fn quantify(
                &self,
                _request: &Value,
                _criteria: Option<raptor_job_queue::TruncationCriteria>,
            ) -> Result<EngineRun, JobError> {
                Err(JobError::Engine("segfault".into()))
            }
        }

        let (producer, pool, receiver) = setup(AdaptiveParams::default());
        register_all_executors(&pool, Arc::new(Broken), AdaptiveParams::default()).await;

        let job_id = producer.create_and_queue_quant(&json!({})).await.unwrap();
        assert_eq!(drain(&pool, &receiver, 1).await, vec![JobStatus::Failed]);
        let record = pool.store().get_record(&job_id).await.unwrap();
        assert!(record.error_message.unwrap().contains("segfault"));
    }
}
