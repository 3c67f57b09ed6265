//! Router assembly: HTTP endpoints, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod error;
pub mod http;

/// Upper bound for one uploaded lesson file.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Build the application router with:
/// - JSON API under `/api/...`
/// - Static SPA from `static_dir` with index fallback
/// - CORS (allow any origin/method/headers), adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>, static_dir: &str) -> Router {
    // Static files with SPA fallback
    let static_service = ServeDir::new(static_dir)
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new(format!("{}/index.html", static_dir)));

    api_router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}

/// API routes only, with state attached.
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(http::http_health))
        .route("/api/generate-test", post(http::http_post_generate_test))
        // Lessons and their files
        .route("/api/lessons", get(http::http_list_lessons).post(http::http_create_lesson))
        .route("/api/lessons/:lesson_id", get(http::http_get_lesson))
        .route("/api/lessons/:lesson_id/files", get(http::http_list_files))
        .route(
            "/api/lessons/:lesson_id/files/:name",
            put(http::http_upload_file)
                .delete(http::http_delete_file)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/lessons/:lesson_id/tests", get(http::http_list_tests))
        // Tests and quiz attempts
        .route("/api/tests/:test_id/questions", get(http::http_list_questions))
        .route("/api/tests/:test_id/attempts", post(http::http_start_attempt))
        .route("/api/attempts/:attempt_id", get(http::http_get_attempt))
        .route("/api/attempts/:attempt_id/answer", post(http::http_post_answer))
        .route("/api/attempts/:attempt_id/next", post(http::http_post_next))
        .route("/api/attempts/:attempt_id/results", get(http::http_get_results))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::api_router;
    use crate::config::AppConfig;
    use crate::domain::NewLesson;
    use crate::generate::tests::{seeded, QuestionInsertFails, ScriptedModel, REPLY};
    use crate::openai::CompletionModel;
    use crate::state::AppState;
    use crate::store::memory::MemoryBucket;
    use crate::store::RecordStore;

    fn app_over(store: Arc<dyn RecordStore>, bucket: MemoryBucket, reply: &str) -> (Router, Arc<AppState>) {
        let model: Arc<dyn CompletionModel> = Arc::new(ScriptedModel::replying(reply));
        let state = Arc::new(AppState::new(store, Arc::new(bucket), Some(model), AppConfig::default(), "memory"));
        (api_router(state.clone()), state)
    }

    async fn app_with(reply: &str) -> (Router, Arc<AppState>) {
        let (store, bucket) = seeded().await;
        app_over(Arc::new(store), bucket, reply)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(v) => builder
                .header("content-type", "application/json")
                .body(Body::from(v.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    fn generate_body(lesson_id: &str) -> Value {
        json!({
            "lessonId": lesson_id,
            "testTitle": "Cardiac quiz",
            "testType": "normal",
            "numQuestions": 5,
            "questionTypes": ["multiple_choice", "select_all"]
        })
    }

    #[tokio::test]
    async fn missing_lesson_id_is_400() {
        let (app, _) = app_with(REPLY).await;
        let mut body = generate_body("l1");
        body.as_object_mut().unwrap().remove("lessonId");
        let (status, v) = send(&app, Method::POST, "/api/generate-test", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(v, json!({ "error": "Missing required fields." }));
    }

    #[tokio::test]
    async fn empty_question_types_is_400() {
        let (app, _) = app_with(REPLY).await;
        let mut body = generate_body("l1");
        body["questionTypes"] = json!([]);
        let (status, v) = send(&app, Method::POST, "/api/generate-test", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(v["error"], "Missing required fields.");
    }

    #[tokio::test]
    async fn unknown_lesson_is_404() {
        let (app, _) = app_with(REPLY).await;
        let (status, v) = send(&app, Method::POST, "/api/generate-test", Some(generate_body("missing"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(v, json!({ "error": "Lesson not found." }));
    }

    #[tokio::test]
    async fn unparseable_output_is_500() {
        let (app, state) = app_with("I could not read the lesson.").await;
        let (status, v) = send(&app, Method::POST, "/api/generate-test", Some(generate_body("l1"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(v, json!({ "error": "Failed to generate test." }));
        assert!(state.store.list_tests("l1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn generate_then_take_the_quiz() {
        let (app, _) = app_with(REPLY).await;
        let (status, v) = send(&app, Method::POST, "/api/generate-test", Some(generate_body("l1"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["message"], "Test and questions generated and inserted successfully.");
        assert_eq!(v["droppedBlocks"], 1);
        let test_id = v["testId"].as_str().unwrap().to_string();

        let (_, tests) = send(&app, Method::GET, "/api/lessons/l1/tests", None).await;
        assert_eq!(tests[0]["id"], test_id.as_str());
        assert_eq!(tests[0]["num_questions"], 2);

        let (status, attempt) = send(&app, Method::POST, &format!("/api/tests/{}/attempts", test_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(attempt["total"], 2);
        assert_eq!(attempt["phase"], json!({ "state": "answering", "index": 0 }));
        assert!(attempt["question"].get("correctAnswer").is_none());
        let attempt_id = attempt["attemptId"].as_str().unwrap().to_string();

        // Next without an answer does not advance.
        let (status, _) = send(&app, Method::POST, &format!("/api/attempts/{}/next", attempt_id), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let mut current = attempt;
        for _ in 0..2 {
            let answer = if current["question"]["type"] == "select_all" {
                json!(["Tremor", "Sweating"])
            } else {
                json!("40")
            };
            let (status, _) = send(
                &app,
                Method::POST,
                &format!("/api/attempts/{}/answer", attempt_id),
                Some(json!({ "answer": answer })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            let (status, next) = send(&app, Method::POST, &format!("/api/attempts/{}/next", attempt_id), None).await;
            assert_eq!(status, StatusCode::OK);
            current = next;
        }
        assert_eq!(current["phase"], json!({ "state": "results" }));

        let (status, results) = send(&app, Method::GET, &format!("/api/attempts/{}/results", attempt_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(results["score"], 1);
        assert_eq!(results["total"], 2);
    }

    #[tokio::test]
    async fn files_upload_list_and_delete() {
        let (app, _) = app_with(REPLY).await;
        let req = Request::builder()
            .method(Method::PUT)
            .uri("/api/lessons/l1/files/week%202.txt")
            .header("content-type", "text/plain")
            .body(Body::from("ECG basics"))
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let (status, files) = send(&app, Method::GET, "/api/lessons/l1/files", None).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = files.as_array().unwrap().iter().filter_map(|f| f["name"].as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "week 2.txt"]);

        let (status, _) = send(&app, Method::DELETE, "/api/lessons/l1/files/a.txt", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, lesson) = send(&app, Method::GET, "/api/lessons/l1", None).await;
        assert_eq!(lesson["title"], "Cardiac");
        assert_eq!(lesson["files"].as_array().unwrap().len(), 2);

        let (status, v) = send(&app, Method::GET, "/api/lessons/nope/files", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(v["error"], "Lesson not found.");
    }

    #[tokio::test]
    async fn lessons_can_be_created_and_listed() {
        let (app, _) = app_with(REPLY).await;
        let (status, created) = send(
            &app,
            Method::POST,
            "/api/lessons",
            Some(json!({ "title": "Antibiotics", "createdBy": "u2" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["created_by"], "u2");

        let (_, lessons) = send(&app, Method::GET, "/api/lessons?sort=title&direction=asc", None).await;
        let titles: Vec<&str> = lessons.as_array().unwrap().iter().filter_map(|l| l["title"].as_str()).collect();
        assert_eq!(titles, vec!["Antibiotics", "Cardiac"]);
    }

    #[tokio::test]
    async fn malformed_bodies_and_queries_get_json_errors() {
        let (app, _) = app_with(REPLY).await;

        let (status, v) = send(&app, Method::POST, "/api/lessons", Some(json!({ "createdBy": "u2" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(v, json!({ "error": "Invalid request body." }));

        let (status, v) = send(&app, Method::GET, "/api/lessons?sort=bogus", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(v, json!({ "error": "Invalid query parameters." }));

        let (_, generated) = send(&app, Method::POST, "/api/generate-test", Some(generate_body("l1"))).await;
        let test_id = generated["testId"].as_str().unwrap().to_string();
        let (_, attempt) = send(&app, Method::POST, &format!("/api/tests/{}/attempts", test_id), None).await;
        let attempt_id = attempt["attemptId"].as_str().unwrap().to_string();
        let (status, v) = send(
            &app,
            Method::POST,
            &format!("/api/attempts/{}/answer", attempt_id),
            Some(json!({ "answer": 42 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(v, json!({ "error": "Invalid request body." }));
    }

    #[tokio::test]
    async fn unknown_test_or_attempt_is_404() {
        let (app, _) = app_with(REPLY).await;
        let (status, v) = send(&app, Method::POST, "/api/tests/nope/attempts", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(v, json!({ "error": "Test not found." }));

        let (status, v) = send(&app, Method::GET, "/api/attempts/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(v, json!({ "error": "Attempt not found." }));
    }

    #[tokio::test]
    async fn failed_question_insert_is_500_and_keeps_the_test() {
        let (store, bucket) = seeded().await;
        let (app, state) = app_over(Arc::new(QuestionInsertFails(store)), bucket, REPLY);
        let (status, v) = send(&app, Method::POST, "/api/generate-test", Some(generate_body("l1"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(v, json!({ "error": "Failed to generate test." }));
        assert_eq!(state.store.list_tests("l1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lesson_without_owner_does_not_touch_the_bucket() {
        let (app, state) = app_with(REPLY).await;
        state
            .store
            .create_lesson(NewLesson { id: "l2".into(), title: "Orphan".into(), created_by: String::new() })
            .await
            .unwrap();
        let (status, v) = send(&app, Method::GET, "/api/lessons/l2/files", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(v, json!({ "error": "Storage request failed." }));
    }
}
