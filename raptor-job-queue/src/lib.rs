//! Job decomposition, identification, dispatch and status tracking for the
//! RAPTOR quantification service.
//!
//! A quantification request becomes one or more jobs. Each job gets a
//! hierarchical id, its input is persisted to an artifact store, a QUEUED
//! record is written to the status store and a work item is published on the
//! dispatch channel. Workers pick items up, run the quantification engine and
//! report back through the status store, from which clients read status,
//! outputs and aggregated statistics.
//!
//! # Architecture
//!
//! - [`id`] - Hierarchical job identifiers (`<root>-<index>`)
//! - [`Producer`] - Decomposes requests and enqueues their jobs
//! - [`StatusStore`] - Per-job lifecycle records plus input/output artifacts
//! - [`StatsAggregator`] - Combines a job's stats with its sequences' stats
//! - [`DispatchChannel`] / [`ArtifactStore`] - Broker and object store seams
//! - [`WorkerPool`] / [`JobExecutor`] - In-process consumers of the channel
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use raptor_job_queue::{
//!     id, InMemoryDispatch, JsonSequenceExtractor, Producer, ProducerConfig, StatusStore,
//! };
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = StatusStore::in_memory();
//!     let (dispatch, _receiver) = InMemoryDispatch::new(128);
//!     let producer = Producer::new(
//!         store.clone(),
//!         Arc::new(dispatch),
//!         Arc::new(JsonSequenceExtractor),
//!         ProducerConfig::default(),
//!     );
//!
//!     let request = json!({ "model": {}, "sequences": ["S1", "S2"] });
//!     let ids = producer.create_and_queue_sequence_batch(&request).await.unwrap();
//!     let root = id::parent_of(&ids[0]).unwrap();
//!     println!("batch {root}: {:?}", store.get_status(root).await.unwrap().status);
//! }
//! ```

mod artifact;
mod dispatch;
mod error;
mod executor;
pub mod id;
mod producer;
mod stats;
mod store;
mod types;
mod worker;

pub use artifact::{
    input_key, output_key, ArtifactError, ArtifactStore, FsArtifactStore, InMemoryArtifactStore,
};
pub use dispatch::{DispatchChannel, DispatchError, InMemoryDispatch, WorkReceiver};
pub use error::JobQueueError;
pub use executor::JobExecutor;
pub use producer::{JsonSequenceExtractor, Producer, ProducerConfig, SequenceExtractor};
pub use stats::{normalize, ChildStatsView, JobStatsView, StatsAggregator};
pub use store::StatusStore;
pub use types::{
    job_types, now_millis, AdaptiveParams, AggregatedOutput, JobKind, JobRecord, JobReport,
    JobStats, JobStatus, JobStatusRecord, ReportedStats, SequenceOutput, Timing,
    TruncationCriteria, WorkItem,
};
pub use worker::WorkerPool;

// Re-export async_trait for convenience when implementing JobExecutor
pub use async_trait::async_trait;
