pub mod health;

use axum::{
    routing::{get, patch, post, put},
    Router,
};

use crate::keywords::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Resume lifecycle
        .route("/api/v1/resumes", post(handlers::handle_create))
        .route("/api/v1/resumes/upload", post(handlers::handle_upload))
        .route(
            "/api/v1/resumes/:id",
            get(handlers::handle_get).delete(handlers::handle_delete),
        )
        .route("/api/v1/resumes/:id/events", get(handlers::handle_events))
        .route("/api/v1/resumes/:id/text", put(handlers::handle_replace_text))
        .route("/api/v1/resumes/:id/close", post(handlers::handle_close))
        // Keyword analysis
        .route("/api/v1/resumes/:id/analyze", post(handlers::handle_analyze))
        // Keyword editing
        .route(
            "/api/v1/resumes/:id/keywords",
            post(handlers::handle_add_keyword).delete(handlers::handle_delete_all),
        )
        .route(
            "/api/v1/resumes/:id/keywords/dedupe",
            post(handlers::handle_dedupe),
        )
        .route(
            "/api/v1/resumes/:id/keywords/demote",
            post(handlers::handle_demote),
        )
        .route(
            "/api/v1/resumes/:id/keywords/:index",
            patch(handlers::handle_rename).delete(handlers::handle_delete_one),
        )
        .route(
            "/api/v1/resumes/:id/non-keywords",
            post(handlers::handle_exclude),
        )
        .route(
            "/api/v1/resumes/:id/non-keywords/restore",
            post(handlers::handle_restore),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::keywords::editor::KeywordEditor;
    use crate::keywords::extraction::ExtractionError;
    use crate::keywords::ingest::ResumeIngestor;
    use crate::keywords::reconciler::KeywordReconciler;
    use crate::keywords::retry::RetryPolicy;
    use crate::keywords::state_machine::ResumeStateMachine;
    use crate::keywords::testing::{
        resume_row, InMemoryResumeStore, MemoryBlobStore, ScriptedExtractor,
    };
    use crate::models::resume::ResumeRow;

    fn app(rows: Vec<ResumeRow>, script: Vec<Result<Vec<&'static str>, ExtractionError>>) -> Router {
        let store = Arc::new(InMemoryResumeStore::with_rows(rows));
        let blobs = Arc::new(MemoryBlobStore::default());
        let extractor = Arc::new(ScriptedExtractor::new(script));
        let machine = ResumeStateMachine::new(
            store.clone(),
            KeywordReconciler::new(store.clone(), extractor, RetryPolicy::default()),
            KeywordEditor::new(store.clone()),
            ResumeIngestor::new(store, blobs),
        );
        build_router(AppState { machine })
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(
            app(vec![], vec![]),
            Request::builder().uri("/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_analyze_reports_added_count() {
        let row = resume_row("Python developer with AWS and SQL", &["SQL"], &["aws"]);
        let uri = format!("/api/v1/resumes/{}/analyze", row.id);
        let owner = row.owner_id;
        let app = app(vec![row], vec![Ok(vec!["Python, AWS, SQL"])]);

        let (status, body) = send(app, json_request("POST", &uri, json!({ "owner_id": owner }))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["keywords"], json!(["Python", "SQL"]));
        assert_eq!(body["added_count"], 1);
        assert_eq!(body["message"], "Added 1 new keyword");
    }

    #[tokio::test]
    async fn test_malformed_extraction_is_bad_gateway() {
        let row = resume_row("Rust", &[], &[]);
        let uri = format!("/api/v1/resumes/{}/analyze", row.id);
        let owner = row.owner_id;
        let app = app(
            vec![row],
            vec![Err(ExtractionError::Malformed("42".to_string()))],
        );

        let (status, body) = send(app, json_request("POST", &uri, json!({ "owner_id": owner }))).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "MALFORMED_RESPONSE");
    }

    #[tokio::test]
    async fn test_other_owner_gets_not_found() {
        let row = resume_row("Rust", &["Rust"], &[]);
        let uri = format!("/api/v1/resumes/{}?owner_id={}", row.id, Uuid::new_v4());
        let app = app(vec![row], vec![]);

        let (status, body) = send(
            app,
            Request::builder().uri(uri).body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_dedupe_messages() {
        let row = resume_row("text", &["Python", "python", "SQL"], &[]);
        let uri = format!("/api/v1/resumes/{}/keywords/dedupe", row.id);
        let owner = row.owner_id;
        let app = app(vec![row], vec![]);

        let (status, body) = send(
            app.clone(),
            json_request("POST", &uri, json!({ "owner_id": owner })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["removed"], 1);
        assert_eq!(body["keywords"], json!(["Python", "SQL"]));
        assert_eq!(body["message"], "Removed 1 duplicate");

        let (_, body) = send(app, json_request("POST", &uri, json!({ "owner_id": owner }))).await;
        assert_eq!(body["removed"], 0);
        assert_eq!(body["message"], "No duplicates found");
    }

    #[tokio::test]
    async fn test_demote_then_rename_by_index() {
        let row = resume_row("text", &["Python", "SQL", "Excel"], &[]);
        let id = row.id;
        let owner = row.owner_id;
        let app = app(vec![row], vec![]);

        let (status, body) = send(
            app.clone(),
            json_request(
                "POST",
                &format!("/api/v1/resumes/{id}/keywords/demote"),
                json!({ "owner_id": owner, "keyword": "Excel" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["keywords"], json!(["Python", "SQL"]));
        assert_eq!(body["non_keywords"], json!(["excel"]));

        let (status, body) = send(
            app,
            json_request(
                "PATCH",
                &format!("/api/v1/resumes/{id}/keywords/1"),
                json!({ "owner_id": owner, "value": "PostgreSQL", "expected": "SQL" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["keywords"], json!(["Python", "PostgreSQL"]));
    }

    #[tokio::test]
    async fn test_events_stream_for_owner_only() {
        let row = resume_row("Rust", &["Rust"], &[]);
        let (id, owner) = (row.id, row.owner_id);
        let app = app(vec![row], vec![]);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/resumes/{id}/events?owner_id={owner}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "text/event-stream"
        );

        let (status, _) = send(
            app,
            Request::builder()
                .uri(format!("/api/v1/resumes/{id}/events?owner_id={}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_then_fetch() {
        let owner = Uuid::new_v4();
        let app = app(vec![], vec![]);

        let (status, created) = send(
            app.clone(),
            json_request("POST", "/api/v1/resumes", json!({ "owner_id": owner, "text": "Go developer" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["keywords"], json!([]));
        assert_eq!(created["phase"], "idle");

        let uri = format!("/api/v1/resumes/{}?owner_id={owner}", created["id"].as_str().unwrap());
        let (status, fetched) = send(
            app,
            Request::builder().uri(uri).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["text"], "Go developer");
    }
}
