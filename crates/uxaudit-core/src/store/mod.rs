//! Storage abstraction for uxaudit.
//!
//! [`AuditStore`] holds audits and everything produced while one is
//! processed (frames, partial results, screenshots). [`KnowledgeStore`] holds
//! the indexed knowledge chunks and the per-user category preferences used to
//! filter them.
//!
//! Implementations must be `Send + Sync` so independent audits can run on
//! separate workers against one shared store.

pub mod memory;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::AuditResult;
use crate::models::{
    Audit, Frame, IssueScreenshot, KnowledgeChunk, NewAudit, PartialResult, ProcessingStage,
    Report,
};

/// A knowledge chunk returned from vector search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkMatch {
    pub chunk_id: String,
    pub source_name: String,
    pub content: String,
    pub category_id: Option<i64>,
    /// Euclidean distance to the query vector (lower is closer).
    pub distance: f32,
}

/// Durable state of audits.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`create_audit`](AuditStore::create_audit) | Insert a pending audit |
/// | [`set_stage`](AuditStore::set_stage) | Move an in-flight audit to a new stage |
/// | [`complete_audit`](AuditStore::complete_audit) | Persist the final report |
/// | [`fail_audit`](AuditStore::fail_audit) | Persist a user-facing failure |
/// | [`begin_partial`](AuditStore::begin_partial) | Record a batch as processing |
/// | [`save_screenshots`](AuditStore::save_screenshots) | Attach frame images to issues |
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn create_audit(&self, new: &NewAudit) -> AuditResult<Audit>;

    async fn get_audit(&self, id: &str) -> AuditResult<Option<Audit>>;

    /// Most recent audits first.
    async fn list_audits(&self, limit: usize) -> AuditResult<Vec<Audit>>;

    /// Set the stage of an audit that is not yet terminal. Status follows:
    /// `uploaded` is pending, every working stage is processing.
    async fn set_stage(&self, id: &str, stage: ProcessingStage) -> AuditResult<()>;

    async fn set_thumbnail(&self, id: &str, thumbnail_b64: &str) -> AuditResult<()>;

    /// Mark completed with its report and score.
    async fn complete_audit(&self, id: &str, report: &Report, score: f64) -> AuditResult<()>;

    /// Mark failed with a user-facing message.
    async fn fail_audit(&self, id: &str, message: &str) -> AuditResult<()>;

    /// Replace the audit's frame list.
    async fn replace_frames(&self, id: &str, frames: &[Frame]) -> AuditResult<()>;

    /// Frames ordered by number.
    async fn list_frames(&self, id: &str) -> AuditResult<Vec<Frame>>;

    async fn delete_frames(&self, id: &str) -> AuditResult<()>;

    async fn begin_partial(&self, id: &str, batch_index: usize) -> AuditResult<()>;

    async fn complete_partial(&self, id: &str, batch_index: usize, json: &str) -> AuditResult<()>;

    async fn fail_partial(&self, id: &str, batch_index: usize, json: &str) -> AuditResult<()>;

    /// Partial results ordered by batch index.
    async fn list_partials(&self, id: &str) -> AuditResult<Vec<PartialResult>>;

    async fn delete_partials(&self, id: &str) -> AuditResult<()>;

    async fn save_screenshots(&self, shots: &[IssueScreenshot]) -> AuditResult<()>;

    /// Screenshots ordered by issue index, then sequence.
    async fn list_screenshots(&self, id: &str) -> AuditResult<Vec<IssueScreenshot>>;
}

/// Indexed knowledge, read-only from the pipeline's point of view.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Nearest chunks by Euclidean distance, ascending.
    ///
    /// With `categories = Some(ids)` only chunks tagged with one of `ids`
    /// are considered; an empty slice matches nothing.
    async fn nearest_chunks(
        &self,
        query: &[f32],
        limit: usize,
        categories: Option<&[i64]>,
    ) -> AuditResult<Vec<ChunkMatch>>;

    /// Category ids the user has enabled, ascending.
    async fn enabled_category_ids(&self, user_id: &str) -> AuditResult<Vec<i64>>;

    /// Insert or replace chunks by id.
    async fn insert_chunks(&self, chunks: &[KnowledgeChunk]) -> AuditResult<()>;
}
