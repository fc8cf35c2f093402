use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use doc_rag::{Answer, QueryRequest, RagError, RagSystem};
use futures::TryStreamExt;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::api_error::ApiError;
use crate::docs_payload::{DeleteDocsPayload, DeleteDocsResponse, ListDocsResponse, UploadResponse};
use crate::query_payload::QueryPayload;

const UPLOAD_FIELD: &str = "file";

pub struct AppState {
    pub rag: RagSystem,
    pub upload_dir: PathBuf,
}

pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/upload_file", post(upload_file))
        .route("/list_docs", get(list_docs))
        .route("/delete_docs", delete(delete_docs))
        .route("/query", post(query))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Stores an uploaded PDF page by page. The upload is spooled to a temporary
/// file in the upload directory and removed once processed.
async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let doc_name = field
            .file_name()
            .and_then(document_name)
            .ok_or_else(|| ApiError::bad_request("uploaded file has no name"))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;

        let temp = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(".pdf")
            .tempfile_in(&state.upload_dir)?;
        let temp_path = temp.path().to_path_buf();
        tokio::fs::write(&temp_path, &bytes).await?;

        let result = state.rag.documents().ingest(&temp_path, &doc_name).await;

        if let Err(e) = temp.close() {
            log::warn!("Failed to remove {}: {}", temp_path.display(), e);
        }

        let pages = result?;
        log::info!("Uploaded {} ({} pages)", doc_name, pages);
        return Ok(Json(UploadResponse {
            message: format!("doc {} uploaded successfully!", doc_name),
        }));
    }

    Err(RagError::InvalidRequest(format!("multipart field '{}' is required", UPLOAD_FIELD)).into())
}

async fn list_docs(State(state): State<Arc<AppState>>) -> Result<Json<ListDocsResponse>, ApiError> {
    let docs = state.rag.retriever().list_document_names().await?;
    Ok(Json(ListDocsResponse { docs }))
}

async fn delete_docs(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DeleteDocsPayload>,
) -> Result<Json<DeleteDocsResponse>, ApiError> {
    let deleted_ids = state.rag.retriever().delete_documents(&payload.docs).await?;
    Ok(Json(DeleteDocsResponse { deleted_ids }))
}

/// Answers as plain text. In streaming mode fragments are written as they
/// arrive; a failure mid-answer aborts the response without a clean end.
async fn query(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QueryPayload>,
) -> Result<Response, ApiError> {
    let request_id: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    let request: QueryRequest = payload.into();
    log::info!(
        "[{}] query over {} doc(s), history {} chars",
        request_id,
        request.docs.len(),
        request.message_history.len()
    );

    let body = match state.rag.queries().run(&request).await? {
        Answer::Complete(text) => Body::from(text),
        Answer::Stream(stream) => {
            let stream = stream.inspect_err(move |e| {
                log::error!("[{}] answer stream aborted: {}", request_id, e);
            });
            Body::from_stream(stream)
        }
    };

    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response())
}

/// Final path segment of a client-supplied file name.
fn document_name(raw: &str) -> Option<String> {
    let name = raw.rsplit(['/', '\\']).next()?.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
