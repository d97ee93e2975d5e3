//! Blob storage for uploaded resume files.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, path: &str, bytes: Bytes, content_type: &str) -> Result<(), AppError>;
    async fn delete(&self, path: &str) -> Result<(), AppError>;
}

/// Storage path for an uploaded file, namespaced by owner.
pub fn blob_path(owner_id: Uuid, resume_id: Uuid, file_name: &str) -> String {
    let file_name: String = file_name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let file_name = if file_name.trim_matches('.').is_empty() {
        "resume".to_string()
    } else {
        file_name
    };
    format!("resumes/{owner_id}/{resume_id}/{file_name}")
}

#[derive(Clone)]
pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, path: &str, bytes: Bytes, content_type: &str) -> Result<(), AppError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("S3 upload failed: {e}")))?;

        info!("Uploaded resume file to s3://{}/{}", self.bucket, path);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), AppError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("S3 delete failed: {e}")))?;

        info!("Deleted resume file s3://{}/{}", self.bucket, path);
        Ok(())
    }
}
