//! Integration tests for the HTTP surface, driven through the router with
//! a scripted gateway and a mocked document source.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use mockall::mock;
use serde_json::{json, Value};
use tower::ServiceExt;

use gflow_core::{
    AppConfig, BackendId, CoreError, CoreResult, DocumentSource, EventKind, StageCatalog,
    StreamEvent,
};
use gflow_llm::{ScriptedGateway, ScriptedResponse};
use gflow_pipeline::EvaluationPipeline;
use gflow_server::{build_router, AppState};

mock! {
    pub Documents {}

    #[async_trait]
    impl DocumentSource for Documents {
        async fn extract_text(&self, handle: &str) -> CoreResult<String>;
    }
}

fn state(gateway: &ScriptedGateway, documents: MockDocuments) -> AppState {
    let pipeline = EvaluationPipeline::new(
        Arc::new(gateway.clone()),
        Arc::new(StageCatalog::builtin()),
    );
    AppState::new(Arc::new(AppConfig::default()), pipeline, Arc::new(documents))
}

async fn post_json(state: AppState, uri: &str, body: Value) -> Response {
    build_router(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn get(state: AppState, uri: &str) -> Response {
    build_router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

async fn frames(response: Response) -> Vec<StreamEvent> {
    let text = body_text(response).await;
    assert!(text.ends_with("\n\n"));
    text.split("\n\n")
        .filter(|frame| !frame.is_empty())
        .map(|frame| StreamEvent::parse_frame(frame).unwrap())
        .collect()
}

#[tokio::test]
async fn test_evaluate_streams_framed_events() {
    let gateway = ScriptedGateway::new().add_response(ScriptedResponse::tokens(["Solid", " work."]));
    let response = post_json(
        state(&gateway, MockDocuments::new()),
        "/ai/evaluate",
        json!({
            "document_text": "My thesis.",
            "stages": ["analysis"],
            "provider": "openai",
            "pacing_delay": 0
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
    assert_eq!(response.headers()["x-accel-buffering"], "no");

    let events = frames(response).await;
    let kinds: Vec<_> = events.iter().map(StreamEvent::kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::Status,
            EventKind::Progress,
            EventKind::Section,
            EventKind::Status,
            EventKind::Content,
            EventKind::Progress,
            EventKind::Complete,
        ]
    );
    assert_eq!(events[1], StreamEvent::progress("THESIS ANALYSIS ...", 1, 1));
    assert_eq!(events[2], StreamEvent::section("THESIS ANALYSIS"));
    assert_eq!(events[4], StreamEvent::content("Solid work."));

    let calls = gateway.get_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].backend, BackendId::OpenAI);
    assert!(calls[0].messages[1].content.contains("My thesis."));
}

#[tokio::test]
async fn test_evaluate_defaults_to_all_stages() {
    let gateway = ScriptedGateway::new().add_response(ScriptedResponse::tokens(["Ok."]));
    let response = post_json(
        state(&gateway, MockDocuments::new()),
        "/ai/evaluate",
        json!({ "document_text": "Text", "pacing_delay": 0 }),
    )
    .await;

    let events = frames(response).await;
    let sections = events.iter().filter(|e| e.kind() == EventKind::Section).count();
    assert_eq!(sections, StageCatalog::builtin().len());
    assert_eq!(gateway.call_count(), StageCatalog::builtin().len());
    assert_eq!(events.last(), Some(&StreamEvent::Complete));
}

#[tokio::test]
async fn test_evaluate_reads_document_path() {
    let mut documents = MockDocuments::new();
    documents
        .expect_extract_text()
        .withf(|handle| handle == "thesis.txt")
        .times(1)
        .returning(|_| Ok("Extracted thesis body".to_string()));

    let gateway = ScriptedGateway::new().add_response(ScriptedResponse::tokens(["Fine."]));
    let response = post_json(
        state(&gateway, documents),
        "/ai/evaluate",
        json!({ "document_path": "thesis.txt", "stages": ["formatting_style"], "pacing_delay": 0 }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let events = frames(response).await;
    assert_eq!(events.last(), Some(&StreamEvent::Complete));
    assert!(gateway.get_calls()[0].messages[1]
        .content
        .contains("Extracted thesis body"));
}

#[tokio::test]
async fn test_extraction_failure_is_streamed() {
    let mut documents = MockDocuments::new();
    documents
        .expect_extract_text()
        .returning(|_| Err(CoreError::Extraction("unsupported file type 'thesis.pdf'".into())));

    let gateway = ScriptedGateway::new();
    let response = post_json(
        state(&gateway, documents),
        "/ai/evaluate",
        json!({ "document_path": "thesis.pdf" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let events = frames(response).await;
    assert_eq!(
        events,
        vec![
            StreamEvent::error("Document text unavailable: unsupported file type 'thesis.pdf'"),
            StreamEvent::Complete,
        ]
    );
    assert_eq!(gateway.call_count(), 0);
}

#[tokio::test]
async fn test_fallback_over_http() {
    let gateway = ScriptedGateway::new().without_credentials(BackendId::DeepSeek);
    let response = post_json(
        state(&gateway, MockDocuments::new()),
        "/ai/evaluate",
        json!({ "document_text": "Text", "stages": ["results_product"], "provider": "deepseek" }),
    )
    .await;

    let events = frames(response).await;
    assert!(events.contains(&StreamEvent::status("[FALLBACK MODE] DEEPSEEK Analysis")));
    assert!(events.contains(&StreamEvent::content(
        "This is a simulated response since no API key is configured for deepseek."
    )));
    assert_eq!(gateway.call_count(), 0);
}

#[tokio::test]
async fn test_bad_requests() {
    let gateway = ScriptedGateway::new();

    let response = post_json(
        state(&gateway, MockDocuments::new()),
        "/ai/evaluate",
        json!({ "document_text": "Text", "provider": "claude" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert!(body["error"]["message"].as_str().unwrap().contains("claude"));

    let response = post_json(
        state(&gateway, MockDocuments::new()),
        "/ai/evaluate",
        json!({ "stages": ["analysis"] }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_json(
        state(&gateway, MockDocuments::new()),
        "/ai/evaluate",
        json!({ "document_text": "Text", "pacing_delay": -1.0 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_json(
        state(&gateway, MockDocuments::new()),
        "/ai/evaluate",
        json!({ "document_text": "Text", "pacing_delay": 1e20 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"]["message"].as_str().unwrap().contains("pacing delay"));

    assert_eq!(gateway.call_count(), 0);
}

#[tokio::test]
async fn test_providers_endpoint() {
    let response = get(state(&ScriptedGateway::new(), MockDocuments::new()), "/ai/providers").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["active_provider"], "openrouter");
    assert_eq!(body["fallback_mode"], true);

    let providers = body["providers"].as_array().unwrap();
    assert_eq!(providers.len(), 3);
    assert_eq!(providers[0]["provider"], "openai");
    assert_eq!(providers[0]["has_api_key"], false);
    assert_eq!(providers[2]["is_active"], true);
    assert_eq!(providers[2]["default_model"], "deepseek/deepseek-r1:free");
}

#[tokio::test]
async fn test_stages_endpoint() {
    let response = get(state(&ScriptedGateway::new(), MockDocuments::new()), "/ai/stages").await;
    let body = body_json(response).await;

    let stages = body.as_array().unwrap();
    assert_eq!(stages.len(), 10);
    assert_eq!(stages[0]["id"], "analysis");
    assert_eq!(stages[0]["title"], "THESIS ANALYSIS");
    assert_eq!(stages[0]["max_document_chars"], 8000);
    assert_eq!(stages[9]["id"], "results_product");
}

#[tokio::test]
async fn test_streaming_config_endpoint() {
    let response = get(
        state(&ScriptedGateway::new(), MockDocuments::new()),
        "/ai/streaming-config",
    )
    .await;
    let body = body_json(response).await;

    assert_eq!(body["pacing_delay"], 0.01);
    assert_eq!(body["buffer_size"], 50);
    assert_eq!(body["timeout"], 120);
    let types = body["supported_types"].as_array().unwrap();
    assert_eq!(types.len(), 6);
    assert!(types.contains(&json!("complete")));
}

#[tokio::test]
async fn test_health_endpoint() {
    let response = get(state(&ScriptedGateway::new(), MockDocuments::new()), "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}
