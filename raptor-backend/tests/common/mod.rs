#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use raptor_backend::{app::DEFAULT_BODY_LIMIT, state::AppState};
use raptor_job_queue::{
    InMemoryDispatch, JsonSequenceExtractor, Producer, ProducerConfig, StatusStore, WorkReceiver,
};
use serde_json::Value;
use tower::util::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub receiver: WorkReceiver,
}

pub fn test_app() -> TestApp {
    let store = StatusStore::in_memory();
    let (dispatch, receiver) = InMemoryDispatch::new(256);
    let producer = Producer::new(
        store,
        Arc::new(dispatch),
        Arc::new(JsonSequenceExtractor),
        ProducerConfig::default(),
    );
    let state = Arc::new(AppState::new(producer).with_work_receiver(receiver.clone()));
    TestApp {
        router: raptor_backend::build_router(state.clone(), DEFAULT_BODY_LIMIT),
        state,
        receiver,
    }
}

pub async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&value).unwrap())
        }
        None => Body::empty(),
    };
    let resp = router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, value)
}
