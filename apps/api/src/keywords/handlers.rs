use std::convert::Infallible;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;
use crate::keywords::editor::{DedupOutcome, KeywordLists, KeywordTarget};
use crate::keywords::reconciler::analysis_message;
use crate::keywords::state_machine::ResumeSnapshot;
use crate::models::resume::ResumeKey;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct OwnerQuery {
    pub owner_id: Uuid,
}

#[derive(Deserialize)]
pub struct OwnerBody {
    pub owner_id: Uuid,
}

#[derive(Deserialize)]
pub struct TextRequest {
    pub owner_id: Uuid,
    pub text: String,
}

#[derive(Deserialize)]
pub struct KeywordRequest {
    pub owner_id: Uuid,
    pub keyword: String,
}

#[derive(Deserialize)]
pub struct RenameRequest {
    pub owner_id: Uuid,
    pub value: String,
    pub expected: Option<String>,
}

#[derive(Deserialize)]
pub struct DeleteKeywordQuery {
    pub owner_id: Uuid,
    pub expected: Option<String>,
}

#[derive(Serialize)]
pub struct AnalyzeResponse {
    pub keywords: Vec<String>,
    pub added_count: usize,
    pub message: String,
}

#[derive(Serialize)]
pub struct DedupeResponse {
    pub removed: usize,
    #[serde(flatten)]
    pub lists: Option<KeywordLists>,
    pub message: String,
}

/// POST /api/v1/resumes
pub async fn handle_create(
    State(state): State<AppState>,
    Json(req): Json<TextRequest>,
) -> Result<(StatusCode, Json<ResumeSnapshot>), AppError> {
    let snapshot = state.machine.create_from_text(req.owner_id, &req.text).await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// POST /api/v1/resumes/upload?owner_id=
pub async fn handle_upload(
    State(state): State<AppState>,
    Query(params): Query<OwnerQuery>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ResumeSnapshot>), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid upload: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("resume").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Invalid upload: {e}")))?;

        let snapshot = state
            .machine
            .create_from_upload(params.owner_id, &file_name, &content_type, bytes)
            .await?;
        return Ok((StatusCode::CREATED, Json(snapshot)));
    }

    Err(AppError::Validation(
        "Upload must contain a 'file' field".to_string(),
    ))
}

/// GET /api/v1/resumes/:id
pub async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<OwnerQuery>,
) -> Result<Json<ResumeSnapshot>, AppError> {
    let key = ResumeKey::new(id, params.owner_id);
    let snapshot = match state.machine.snapshot(&key) {
        Some(snapshot) => snapshot,
        None => state.machine.open(&key).await?,
    };
    Ok(Json(snapshot))
}

/// GET /api/v1/resumes/:id/events
/// Streams the resume's snapshot, then every change to it, as SSE `data` frames.
pub async fn handle_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<OwnerQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let mut rx = state
        .machine
        .subscribe(&ResumeKey::new(id, params.owner_id))
        .await?;

    let stream = async_stream::stream! {
        loop {
            let snapshot = rx.borrow_and_update().clone();
            match Event::default().json_data(&snapshot) {
                Ok(event) => yield Ok::<_, Infallible>(event),
                Err(e) => {
                    warn!("Failed to encode snapshot of resume {}: {}", id, e);
                    break;
                }
            }
            // Ends when the session is closed or evicted.
            if rx.changed().await.is_err() {
                break;
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// DELETE /api/v1/resumes/:id
pub async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<OwnerQuery>,
) -> Result<StatusCode, AppError> {
    state
        .machine
        .delete_resume(&ResumeKey::new(id, params.owner_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/v1/resumes/:id/text
pub async fn handle_replace_text(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<TextRequest>,
) -> Result<Json<ResumeSnapshot>, AppError> {
    let snapshot = state
        .machine
        .replace_text(&ResumeKey::new(id, req.owner_id), &req.text)
        .await?;
    Ok(Json(snapshot))
}

/// POST /api/v1/resumes/:id/close
pub async fn handle_close(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<OwnerBody>,
) -> StatusCode {
    state.machine.close(&ResumeKey::new(id, req.owner_id));
    StatusCode::NO_CONTENT
}

/// POST /api/v1/resumes/:id/analyze
pub async fn handle_analyze(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<OwnerBody>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let outcome = state
        .machine
        .reanalyze(&ResumeKey::new(id, req.owner_id))
        .await?;
    Ok(Json(AnalyzeResponse {
        message: analysis_message(outcome.added_count),
        keywords: outcome.keywords,
        added_count: outcome.added_count,
    }))
}

/// POST /api/v1/resumes/:id/keywords
pub async fn handle_add_keyword(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<KeywordRequest>,
) -> Result<Json<KeywordLists>, AppError> {
    let lists = state
        .machine
        .add(&ResumeKey::new(id, req.owner_id), &req.keyword)
        .await?;
    Ok(Json(lists))
}

/// DELETE /api/v1/resumes/:id/keywords
pub async fn handle_delete_all(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<OwnerQuery>,
) -> Result<Json<KeywordLists>, AppError> {
    let lists = state
        .machine
        .delete_all(&ResumeKey::new(id, params.owner_id))
        .await?;
    Ok(Json(lists))
}

/// PATCH /api/v1/resumes/:id/keywords/:index
pub async fn handle_rename(
    State(state): State<AppState>,
    Path((id, index)): Path<(Uuid, usize)>,
    Json(req): Json<RenameRequest>,
) -> Result<Json<KeywordLists>, AppError> {
    let target = KeywordTarget {
        index,
        expected: req.expected,
    };
    let lists = state
        .machine
        .rename(&ResumeKey::new(id, req.owner_id), &target, &req.value)
        .await?;
    Ok(Json(lists))
}

/// DELETE /api/v1/resumes/:id/keywords/:index
pub async fn handle_delete_one(
    State(state): State<AppState>,
    Path((id, index)): Path<(Uuid, usize)>,
    Query(params): Query<DeleteKeywordQuery>,
) -> Result<Json<KeywordLists>, AppError> {
    let target = KeywordTarget {
        index,
        expected: params.expected,
    };
    let lists = state
        .machine
        .delete_one(&ResumeKey::new(id, params.owner_id), &target)
        .await?;
    Ok(Json(lists))
}

/// POST /api/v1/resumes/:id/keywords/dedupe
pub async fn handle_dedupe(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<OwnerBody>,
) -> Result<Json<DedupeResponse>, AppError> {
    let outcome = state
        .machine
        .deduplicate(&ResumeKey::new(id, req.owner_id))
        .await?;
    let message = outcome.message();
    let response = match outcome {
        DedupOutcome::NoDuplicates => DedupeResponse {
            removed: 0,
            lists: None,
            message,
        },
        DedupOutcome::Removed { removed, lists } => DedupeResponse {
            removed,
            lists: Some(lists),
            message,
        },
    };
    Ok(Json(response))
}

/// POST /api/v1/resumes/:id/keywords/demote
pub async fn handle_demote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<KeywordRequest>,
) -> Result<Json<KeywordLists>, AppError> {
    let lists = state
        .machine
        .demote(&ResumeKey::new(id, req.owner_id), &req.keyword)
        .await?;
    Ok(Json(lists))
}

/// POST /api/v1/resumes/:id/non-keywords
pub async fn handle_exclude(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<KeywordRequest>,
) -> Result<Json<KeywordLists>, AppError> {
    let lists = state
        .machine
        .exclude(&ResumeKey::new(id, req.owner_id), &req.keyword)
        .await?;
    Ok(Json(lists))
}

/// POST /api/v1/resumes/:id/non-keywords/restore
pub async fn handle_restore(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<KeywordRequest>,
) -> Result<Json<KeywordLists>, AppError> {
    let lists = state
        .machine
        .restore(&ResumeKey::new(id, req.owner_id), &req.keyword)
        .await?;
    Ok(Json(lists))
}
