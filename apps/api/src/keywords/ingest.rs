//! Resume ingestion: creates resumes from typed text or uploaded files and
//! removes them again together with their stored file.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::keywords::blob::{blob_path, BlobStore};
use crate::keywords::store::ResumeStore;
use crate::models::resume::{NewResume, ResumeKey, ResumeRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadKind {
    Pdf,
    PlainText,
}

fn upload_kind(file_name: &str, content_type: &str) -> Option<UploadKind> {
    let content_type = content_type.to_ascii_lowercase();
    let file_name = file_name.to_ascii_lowercase();
    if content_type == "application/pdf" || file_name.ends_with(".pdf") {
        Some(UploadKind::Pdf)
    } else if content_type.starts_with("text/")
        || file_name.ends_with(".txt")
        || file_name.ends_with(".md")
    {
        Some(UploadKind::PlainText)
    } else {
        None
    }
}

/// Pulls plain text out of an uploaded file. No layout reconstruction is attempted.
pub async fn extract_upload_text(
    file_name: &str,
    content_type: &str,
    bytes: Bytes,
) -> Result<String, AppError> {
    let text = match upload_kind(file_name, content_type) {
        Some(UploadKind::Pdf) => tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem(&bytes)
        })
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("PDF extraction task failed: {e}")))?
        .map_err(|e| AppError::Validation(format!("Could not read PDF: {e}")))?,
        Some(UploadKind::PlainText) => String::from_utf8(bytes.to_vec())
            .map_err(|_| AppError::Validation("Text file is not valid UTF-8".to_string()))?,
        None => {
            return Err(AppError::Validation(format!(
                "Unsupported file type '{content_type}'. Upload a PDF or plain text file."
            )))
        }
    };

    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(AppError::Validation(
            "No text could be extracted from the uploaded file".to_string(),
        ));
    }
    Ok(text)
}

#[derive(Clone)]
pub struct ResumeIngestor {
    store: Arc<dyn ResumeStore>,
    blobs: Arc<dyn BlobStore>,
}

impl ResumeIngestor {
    pub fn new(store: Arc<dyn ResumeStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { store, blobs }
    }

    pub async fn create_from_text(&self, owner_id: Uuid, text: &str) -> Result<ResumeRow, AppError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::Validation("Resume text cannot be empty".to_string()));
        }
        self.store
            .create(NewResume {
                id: Uuid::new_v4(),
                owner_id,
                text: text.to_string(),
                blob_path: None,
            })
            .await
    }

    /// Stores the file, extracts its text and creates the resume. The stored
    /// file is removed again if any later step fails.
    pub async fn create_from_upload(
        &self,
        owner_id: Uuid,
        file_name: &str,
        content_type: &str,
        bytes: Bytes,
    ) -> Result<ResumeRow, AppError> {
        if bytes.is_empty() {
            return Err(AppError::Validation("Uploaded file is empty".to_string()));
        }
        let text = extract_upload_text(file_name, content_type, bytes.clone()).await?;

        let resume_id = Uuid::new_v4();
        let path = blob_path(owner_id, resume_id, file_name);
        self.blobs.put(&path, bytes, content_type).await?;

        let created = self
            .store
            .create(NewResume {
                id: resume_id,
                owner_id,
                text,
                blob_path: Some(path.clone()),
            })
            .await;

        match created {
            Ok(row) => {
                info!("Ingested upload '{}' as resume {}", file_name, row.id);
                Ok(row)
            }
            Err(e) => {
                if let Err(cleanup) = self.blobs.delete(&path).await {
                    warn!("Failed to remove orphaned upload {}: {}", path, cleanup);
                }
                Err(e)
            }
        }
    }

    /// Removes the stored file first so a failure leaves the resume intact
    /// and the delete can be retried.
    pub async fn delete(&self, key: &ResumeKey) -> Result<(), AppError> {
        let row = self.store.get(key).await?;
        if let Some(path) = &row.blob_path {
            self.blobs.delete(path).await?;
        }
        self.store.delete(key).await
    }
}
