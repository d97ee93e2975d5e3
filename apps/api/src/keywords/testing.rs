//! In-memory fakes of the keyword engine's collaborators.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::errors::AppError;
use crate::keywords::blob::BlobStore;
use crate::keywords::extraction::{
    AnalysisRequest, AnalysisResult, ExtractionClient, ExtractionError,
};
use crate::keywords::store::ResumeStore;
use crate::models::resume::{NewResume, ResumeKey, ResumePatch, ResumeRow};

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn resume_row(text: &str, keywords: &[&str], non_keywords: &[&str]) -> ResumeRow {
    let now = Utc::now();
    ResumeRow {
        id: Uuid::new_v4(),
        owner_id: Uuid::new_v4(),
        text: Some(text.to_string()),
        keywords: strings(keywords),
        non_keywords: strings(non_keywords),
        blob_path: None,
        created_at: now,
        updated_at: now,
    }
}

#[derive(Default)]
pub struct InMemoryResumeStore {
    rows: Mutex<HashMap<Uuid, ResumeRow>>,
    fail_updates: AtomicBool,
    updates: AtomicU32,
}

impl InMemoryResumeStore {
    pub fn with_rows(rows: impl IntoIterator<Item = ResumeRow>) -> Self {
        let store = Self::default();
        for row in rows {
            store.rows.lock().unwrap().insert(row.id, row);
        }
        store
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn update_calls(&self) -> u32 {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn row(&self, id: Uuid) -> Option<ResumeRow> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    fn scoped(&self, key: &ResumeKey) -> Result<ResumeRow, AppError> {
        self.rows
            .lock()
            .unwrap()
            .get(&key.resume_id)
            .filter(|r| r.owner_id == key.owner_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Resume {} not found", key.resume_id)))
    }
}

#[async_trait]
impl ResumeStore for InMemoryResumeStore {
    async fn create(&self, resume: NewResume) -> Result<ResumeRow, AppError> {
        let now = Utc::now();
        let row = ResumeRow {
            id: resume.id,
            owner_id: resume.owner_id,
            text: Some(resume.text),
            keywords: vec![],
            non_keywords: vec![],
            blob_path: resume.blob_path,
            created_at: now,
            updated_at: now,
        };
        self.rows.lock().unwrap().insert(row.id, row.clone());
        Ok(row)
    }

    async fn get(&self, key: &ResumeKey) -> Result<ResumeRow, AppError> {
        self.scoped(key)
    }

    async fn update(&self, key: &ResumeKey, patch: ResumePatch) -> Result<ResumeRow, AppError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut row = self.scoped(key)?;
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(AppError::PersistenceFailed("store offline".to_string()));
        }
        if let Some(text) = patch.text {
            row.text = Some(text);
        }
        if let Some(keywords) = patch.keywords {
            row.keywords = keywords;
        }
        if let Some(non_keywords) = patch.non_keywords {
            row.non_keywords = non_keywords;
        }
        row.updated_at = Utc::now();
        self.rows.lock().unwrap().insert(row.id, row.clone());
        Ok(row)
    }

    async fn delete(&self, key: &ResumeKey) -> Result<(), AppError> {
        self.scoped(key)?;
        self.rows.lock().unwrap().remove(&key.resume_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Bytes>>,
    fail_deletes: AtomicBool,
}

impl MemoryBlobStore {
    pub fn contains(&self, path: &str) -> bool {
        self.blobs.lock().unwrap().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, path: &str, bytes: Bytes, _content_type: &str) -> Result<(), AppError> {
        self.blobs.lock().unwrap().insert(path.to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), AppError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(AppError::Storage("bucket unreachable".to_string()));
        }
        self.blobs.lock().unwrap().remove(path);
        Ok(())
    }
}

/// Replays a fixed sequence of responses, one per call.
pub struct ScriptedExtractor {
    script: Mutex<VecDeque<Result<Vec<&'static str>, ExtractionError>>>,
    calls: AtomicU32,
    last_request: Mutex<Option<AnalysisRequest>>,
}

impl ScriptedExtractor {
    pub fn new(script: Vec<Result<Vec<&'static str>, ExtractionError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<AnalysisRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExtractionClient for ScriptedExtractor {
    async fn extract(&self, request: &AnalysisRequest) -> Result<AnalysisResult, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(candidates)) => Ok(AnalysisResult {
                raw_candidates: strings(&candidates),
            }),
            Some(Err(e)) => Err(e),
            None => Err(ExtractionError::Unavailable("script exhausted".to_string())),
        }
    }
}

/// Blocks every call until `release` is notified, then returns `candidates`.
pub struct GatedExtractor {
    pub entered: Notify,
    pub release: Notify,
    candidates: Vec<&'static str>,
}

impl GatedExtractor {
    pub fn new(candidates: Vec<&'static str>) -> Self {
        Self {
            entered: Notify::new(),
            release: Notify::new(),
            candidates,
        }
    }
}

#[async_trait]
impl ExtractionClient for GatedExtractor {
    async fn extract(&self, _request: &AnalysisRequest) -> Result<AnalysisResult, ExtractionError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(AnalysisResult {
            raw_candidates: strings(&self.candidates),
        })
    }
}
