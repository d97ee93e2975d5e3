//! PostgreSQL-backed `ResumeStore`.
//!
//! Schema: `migrations/001_create_resumes.sql`.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::errors::AppError;
use crate::keywords::store::ResumeStore;
use crate::models::resume::{NewResume, ResumeKey, ResumePatch, ResumeRow};

#[derive(Clone)]
pub struct PgResumeStore {
    pool: PgPool,
}

impl PgResumeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn not_found(key: &ResumeKey) -> AppError {
    AppError::NotFound(format!("Resume {} not found", key.resume_id))
}

#[async_trait]
impl ResumeStore for PgResumeStore {
    async fn create(&self, resume: NewResume) -> Result<ResumeRow, AppError> {
        let row = sqlx::query_as::<_, ResumeRow>(
            r#"
            INSERT INTO resumes (id, owner_id, text, keywords, non_keywords, blob_path)
            VALUES ($1, $2, $3, '{}', '{}', $4)
            RETURNING *
            "#,
        )
        .bind(resume.id)
        .bind(resume.owner_id)
        .bind(&resume.text)
        .bind(&resume.blob_path)
        .fetch_one(&self.pool)
        .await?;

        info!("Created resume {} for owner {}", row.id, row.owner_id);
        Ok(row)
    }

    async fn get(&self, key: &ResumeKey) -> Result<ResumeRow, AppError> {
        sqlx::query_as::<_, ResumeRow>("SELECT * FROM resumes WHERE id = $1 AND owner_id = $2")
            .bind(key.resume_id)
            .bind(key.owner_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found(key))
    }

    async fn update(&self, key: &ResumeKey, patch: ResumePatch) -> Result<ResumeRow, AppError> {
        // NULL parameters leave the column untouched, so one statement covers
        // every combination of fields.
        let row = sqlx::query_as::<_, ResumeRow>(
            r#"
            UPDATE resumes SET
                text = COALESCE($3, text),
                keywords = COALESCE($4, keywords),
                non_keywords = COALESCE($5, non_keywords),
                updated_at = NOW()
            WHERE id = $1 AND owner_id = $2
            RETURNING *
            "#,
        )
        .bind(key.resume_id)
        .bind(key.owner_id)
        .bind(patch.text)
        .bind(patch.keywords)
        .bind(patch.non_keywords)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| not_found(key))?;

        debug!(
            "Updated resume {}: {} keywords, {} non-keywords",
            row.id,
            row.keywords.len(),
            row.non_keywords.len()
        );
        Ok(row)
    }

    async fn delete(&self, key: &ResumeKey) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM resumes WHERE id = $1 AND owner_id = $2")
            .bind(key.resume_id)
            .bind(key.owner_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(not_found(key));
        }
        info!("Deleted resume {} for owner {}", key.resume_id, key.owner_id);
        Ok(())
    }
}
