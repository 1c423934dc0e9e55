mod common;

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use common::{send, test_app};
use raptor_backend::{app::DEFAULT_BODY_LIMIT, state::AppState};
use raptor_job_queue::{
    id, InMemoryDispatch, JobStatus, JsonSequenceExtractor, Producer, ProducerConfig, StatusStore,
};
use serde_json::json;

#[tokio::test]
async fn health_and_ready() {
    let app = test_app();
    let (status, body) = send(&app.router, Method::GET, "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("OK"));
    let (status, _) = send(&app.router, Method::GET, "/api/ready", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn single_job_round_trip() {
    let app = test_app();
    let request = json!({ "model": { "faultTrees": [] } });

    let (status, body) = send(&app.router, Method::POST, "/api/scram", Some(request.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let job_id = body["jobId"].as_str().unwrap().to_string();

    let item = app.receiver.recv().await.unwrap();
    assert_eq!(item.job_id, job_id);

    let (status, body) = send(&app.router, Method::GET, &format!("/api/scram/{job_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "QUEUED");
    assert_eq!(body["adaptive"], false);

    let (status, body) =
        send(&app.router, Method::GET, &format!("/api/scram/input/{job_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, request);

    // External worker reports pickup, then completion.
    let (status, body) = send(
        &app.router,
        Method::PUT,
        &format!("/api/scram/report/{job_id}"),
        Some(json!({ "status": "PROCESSING" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PROCESSING");

    let (status, body) = send(
        &app.router,
        Method::PUT,
        &format!("/api/scram/report/{job_id}"),
        Some(json!({
            "status": "COMPLETED",
            "stats": { "probability": 0.003, "products": 12, "totalSeconds": 4 },
            "output": { "topEvent": 0.003 }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "COMPLETED");

    let (_, body) = send(&app.router, Method::GET, "/api/scram", None).await;
    assert_eq!(body, json!([job_id.clone()]));

    let (_, body) = send(&app.router, Method::GET, &format!("/api/scram/output/{job_id}"), None).await;
    assert_eq!(body["output"], json!({ "topEvent": 0.003 }));

    let (_, body) = send(&app.router, Method::GET, &format!("/api/scram/stats/{job_id}"), None).await;
    assert_eq!(body["stats"]["analysisSeconds"], json!(4.0));
    assert!(body["stats"].get("totalSeconds").is_none());
    assert!(body.get("childStats").is_none());
}

#[tokio::test]
async fn distributed_batch_returns_parent_and_sequences() {
    let app = test_app();
    let request = json!({ "model": {}, "sequences": ["S1", "S2", "S3"] });

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/api/scram?distributedSequences=yes",
        Some(request),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let parent = body["parentJobId"].as_str().unwrap().to_string();
    let ids: Vec<String> = serde_json::from_value(body["sequenceJobIds"].clone()).unwrap();
    assert_eq!(ids, (0..3).map(|i| id::child_id(&parent, i)).collect::<Vec<_>>());
    assert_eq!(id::parent_of(&ids[0]), Some(parent.as_str()));

    let (status, body) = send(&app.router, Method::GET, &format!("/api/scram/{parent}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "QUEUED");
    assert_eq!(body["childCount"], 3);

    let (_, body) = send(&app.router, Method::GET, &format!("/api/scram/stats/{parent}"), None).await;
    assert_eq!(body["childStats"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn adaptive_batch_marks_jobs_adaptive() {
    let app = test_app();
    let (status, body) = send(
        &app.router,
        Method::POST,
        "/api/scram/adaptive?distributedSequences=yes",
        Some(json!({ "model": {}, "sequences": ["S1", "S2"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let first = body["sequenceJobIds"][0].as_str().unwrap().to_string();

    let item = app.receiver.recv().await.unwrap();
    assert!(item.adaptive.is_some());

    // Adaptive completion without the adaptive fields is refused.
    let (status, _) = send(
        &app.router,
        Method::PUT,
        &format!("/api/scram/report/{first}"),
        Some(json!({ "status": "COMPLETED", "stats": { "products": 3 }, "output": {} })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app.router,
        Method::PUT,
        &format!("/api/scram/report/{first}"),
        Some(json!({
            "status": "PARTIAL",
            "stats": {
                "products": 620,
                "originalProducts": 500,
                "exactProbability": 0.0021,
                "approximateProbability": 0.0023,
                "relativeError": 0.095,
                "totalSeconds": 2.5
            },
            "output": {}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let root = id::parent_of(&first).unwrap().to_string();
    let (_, body) = send(&app.router, Method::GET, &format!("/api/scram/stats/{root}"), None).await;
    let child = &body["childStats"][0];
    assert_eq!(child["jobId"], first.as_str());
    let stats = &child["stats"];
    assert_eq!(stats["products"], 620);
    assert_eq!(stats["originalProducts"], 500);
    assert_eq!(stats["exactProbability"], 0.0021);
    assert_eq!(stats["approximateProbability"], 0.0023);
    assert_eq!(stats["relativeError"], 0.095);
    assert_eq!(stats["analysisSeconds"], 2.5);
    assert!(stats.get("totalSeconds").is_none());

    // A sibling id resolves the same batch.
    let (_, body) = send(&app.router, Method::GET, &format!("/api/scram/stats/{first}"), None).await;
    assert_eq!(body["stats"]["relativeError"], 0.095);
    let siblings = body["childStats"].as_array().unwrap();
    assert_eq!(siblings.len(), 2);
    assert_eq!(siblings[1]["jobId"], id::child_id(&root, 1).as_str());

    let (_, body) = send(&app.router, Method::GET, &format!("/api/scram/{root}"), None).await;
    assert_eq!(body["status"], JobStatus::Processing.as_str());
}

#[tokio::test]
async fn single_adaptive_job() {
    let app = test_app();
    let (status, body) = send(&app.router, Method::POST, "/api/scram/adaptive", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    let job_id = body["jobId"].as_str().unwrap();
    let (_, body) = send(&app.router, Method::GET, &format!("/api/scram/{job_id}"), None).await;
    assert_eq!(body["adaptive"], true);
}

#[tokio::test]
async fn empty_decomposition_is_unprocessable() {
    let app = test_app();
    let (status, body) = send(
        &app.router,
        Method::POST,
        "/api/scram?distributedSequences=yes",
        Some(json!({ "model": {}, "sequences": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("zero sequences"));
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let app = test_app();
    for uri in [
        "/api/scram/nope",
        "/api/scram/input/nope",
        "/api/scram/output/nope",
        "/api/scram/stats/nope",
    ] {
        let (status, body) = send(&app.router, Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert!(body["error"].is_string());
    }

    let (status, _) = send(
        &app.router,
        Method::PUT,
        "/api/scram/report/nope",
        Some(json!({ "status": "FAILED", "error": "boom" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn queued_is_not_a_reportable_status() {
    let app = test_app();
    let (_, body) = send(&app.router, Method::POST, "/api/scram", Some(json!({}))).await;
    let job_id = body["jobId"].as_str().unwrap();
    let (status, _) = send(
        &app.router,
        Method::PUT,
        &format!("/api/scram/report/{job_id}"),
        Some(json!({ "status": "QUEUED" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn external_worker_claims_queued_jobs() {
    let app = test_app();
    let (status, _) = send(&app.router, Method::POST, "/api/scram/claim", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send(
        &app.router,
        Method::POST,
        "/api/scram/adaptive?distributedSequences=yes",
        Some(json!({ "model": {}, "sequences": ["S1", "S2"] })),
    )
    .await;
    let ids: Vec<String> = serde_json::from_value(body["sequenceJobIds"].clone()).unwrap();

    for expected in &ids {
        let (status, item) = send(&app.router, Method::POST, "/api/scram/claim", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(item["jobId"], expected.as_str());
        assert!(item["adaptive"].is_object());

        let (_, body) =
            send(&app.router, Method::GET, &format!("/api/scram/{expected}"), None).await;
        assert_eq!(body["status"], "PROCESSING");
    }

    let (status, _) = send(&app.router, Method::POST, "/api/scram/claim", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn claiming_keeps_a_small_queue_accepting_jobs() {
    let store = StatusStore::in_memory();
    let (dispatch, receiver) = InMemoryDispatch::new(2);
    let producer = Producer::new(
        store,
        Arc::new(dispatch),
        Arc::new(JsonSequenceExtractor),
        ProducerConfig::default(),
    );
    let state = Arc::new(AppState::new(producer).with_work_receiver(receiver));
    let router = raptor_backend::build_router(state, DEFAULT_BODY_LIMIT);

    for _ in 0..2 {
        let (status, _) = send(&router, Method::POST, "/api/scram", Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = send(&router, Method::POST, "/api/scram", Some(json!({}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    for _ in 0..3 {
        let (status, _) = send(&router, Method::POST, "/api/scram/claim", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&router, Method::POST, "/api/scram", Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test]
async fn claim_is_unavailable_without_external_workers() {
    let store = StatusStore::in_memory();
    let (dispatch, _receiver) = InMemoryDispatch::new(4);
    let producer = Producer::new(
        store,
        Arc::new(dispatch),
        Arc::new(JsonSequenceExtractor),
        ProducerConfig::default(),
    );
    let router = raptor_backend::build_router(Arc::new(AppState::new(producer)), DEFAULT_BODY_LIMIT);
    let (status, body) = send(&router, Method::POST, "/api/scram/claim", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}
