use raptor_job_queue::{Producer, StatsAggregator, StatusStore, WorkReceiver, WorkerPool};

/// Shared application state passed to every route handler.
pub struct AppState {
    pub producer: Producer,
    pub store: StatusStore,
    pub stats: StatsAggregator,
    /// Present when this process also runs quantification workers.
    pub worker_pool: Option<WorkerPool>,
    /// Present when work items are claimed by external workers over HTTP.
    pub work_receiver: Option<WorkReceiver>,
}

impl AppState {
    /// Build the state around a producer; the store and aggregator share its
    /// status store.
    pub fn new(producer: Producer) -> Self {
        let store = producer.store().clone();
        Self {
            stats: StatsAggregator::new(store.clone()),
            store,
            producer,
            worker_pool: None,
            work_receiver: None,
        }
    }

    pub fn with_worker_pool(mut self, pool: WorkerPool) -> Self {
        self.worker_pool = Some(pool);
        self
    }

    pub fn with_work_receiver(mut self, receiver: WorkReceiver) -> Self {
        self.work_receiver = Some(receiver);
        self
    }
}
