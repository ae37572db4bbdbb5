//! In-memory [`AuditStore`] and [`KnowledgeStore`] for tests and dry runs.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Vector search is
//! brute-force Euclidean distance over all stored chunks.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use uuid::Uuid;

use crate::embedding::l2_distance;
use crate::error::{AuditError, AuditResult};
use crate::models::{
    Audit, AuditStatus, Frame, IssueScreenshot, KnowledgeChunk, NewAudit, PartialResult,
    PartialStatus, ProcessingStage, Report,
};

use super::{AuditStore, ChunkMatch, KnowledgeStore};

/// In-memory store for tests.
pub struct InMemoryStore {
    audits: RwLock<HashMap<String, Audit>>,
    /// Insertion order, for `list_audits`.
    order: RwLock<Vec<String>>,
    frames: RwLock<HashMap<String, Vec<Frame>>>,
    partials: RwLock<HashMap<String, Vec<PartialResult>>>,
    screenshots: RwLock<Vec<IssueScreenshot>>,
    chunks: RwLock<Vec<KnowledgeChunk>>,
    preferences: RwLock<HashMap<String, Vec<i64>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            audits: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
            frames: RwLock::new(HashMap::new()),
            partials: RwLock::new(HashMap::new()),
            screenshots: RwLock::new(Vec::new()),
            chunks: RwLock::new(Vec::new()),
            preferences: RwLock::new(HashMap::new()),
        }
    }

    /// Set the categories a user has enabled.
    pub fn set_enabled_categories(&self, user_id: &str, ids: &[i64]) -> AuditResult<()> {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        write(&self.preferences)?.insert(user_id.to_string(), ids);
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(lock: &RwLock<T>) -> AuditResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| AuditError::Storage("in-memory store lock poisoned".into()))
}

fn write<T>(lock: &RwLock<T>) -> AuditResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| AuditError::Storage("in-memory store lock poisoned".into()))
}

fn not_found(id: &str) -> AuditError {
    AuditError::Storage(format!("audit not found: {}", id))
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

impl InMemoryStore {
    fn update_audit(&self, id: &str, f: impl FnOnce(&mut Audit)) -> AuditResult<()> {
        let mut audits = write(&self.audits)?;
        let audit = audits.get_mut(id).ok_or_else(|| not_found(id))?;
        f(audit);
        audit.updated_at = now();
        Ok(())
    }

    fn update_partial(
        &self,
        id: &str,
        batch_index: usize,
        status: PartialStatus,
        json: Option<&str>,
    ) -> AuditResult<()> {
        let mut partials = write(&self.partials)?;
        let list = partials.entry(id.to_string()).or_default();
        match list.iter_mut().find(|p| p.batch_index == batch_index) {
            Some(p) => {
                p.status = status;
                p.result_json = json.map(str::to_string);
            }
            None => {
                list.push(PartialResult {
                    audit_id: id.to_string(),
                    batch_index,
                    status,
                    result_json: json.map(str::to_string),
                });
                list.sort_by_key(|p| p.batch_index);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AuditStore for InMemoryStore {
    async fn create_audit(&self, new: &NewAudit) -> AuditResult<Audit> {
        let ts = now();
        let audit = Audit {
            id: Uuid::new_v4().to_string(),
            user_id: new.user_id.clone(),
            title: new.title.clone(),
            description: new.description.clone(),
            video_path: new.video_path.clone(),
            thumbnail: None,
            status: AuditStatus::Pending,
            stage: ProcessingStage::Uploaded,
            report: None,
            score: None,
            error_message: None,
            created_at: ts,
            updated_at: ts,
        };
        write(&self.audits)?.insert(audit.id.clone(), audit.clone());
        write(&self.order)?.push(audit.id.clone());
        Ok(audit)
    }

    async fn get_audit(&self, id: &str) -> AuditResult<Option<Audit>> {
        Ok(read(&self.audits)?.get(id).cloned())
    }

    async fn list_audits(&self, limit: usize) -> AuditResult<Vec<Audit>> {
        let audits = read(&self.audits)?;
        let order = read(&self.order)?;
        Ok(order
            .iter()
            .rev()
            .filter_map(|id| audits.get(id).cloned())
            .take(limit)
            .collect())
    }

    async fn set_stage(&self, id: &str, stage: ProcessingStage) -> AuditResult<()> {
        self.update_audit(id, |a| {
            if a.status.is_terminal() {
                return;
            }
            a.stage = stage;
            a.status = match stage {
                ProcessingStage::Uploaded => AuditStatus::Pending,
                _ => AuditStatus::Processing,
            };
        })
    }

    async fn set_thumbnail(&self, id: &str, thumbnail_b64: &str) -> AuditResult<()> {
        self.update_audit(id, |a| a.thumbnail = Some(thumbnail_b64.to_string()))
    }

    async fn complete_audit(&self, id: &str, report: &Report, score: f64) -> AuditResult<()> {
        self.update_audit(id, |a| {
            a.status = AuditStatus::Completed;
            a.stage = ProcessingStage::Completed;
            a.report = Some(report.clone());
            a.score = Some(score);
            a.error_message = None;
        })
    }

    async fn fail_audit(&self, id: &str, message: &str) -> AuditResult<()> {
        self.update_audit(id, |a| {
            a.status = AuditStatus::Failed;
            a.stage = ProcessingStage::Failed;
            a.error_message = Some(message.to_string());
        })
    }

    async fn replace_frames(&self, id: &str, frames: &[Frame]) -> AuditResult<()> {
        let mut sorted = frames.to_vec();
        sorted.sort_by_key(|f| f.number);
        write(&self.frames)?.insert(id.to_string(), sorted);
        Ok(())
    }

    async fn list_frames(&self, id: &str) -> AuditResult<Vec<Frame>> {
        Ok(read(&self.frames)?.get(id).cloned().unwrap_or_default())
    }

    async fn delete_frames(&self, id: &str) -> AuditResult<()> {
        write(&self.frames)?.remove(id);
        Ok(())
    }

    async fn begin_partial(&self, id: &str, batch_index: usize) -> AuditResult<()> {
        self.update_partial(id, batch_index, PartialStatus::Processing, None)
    }

    async fn complete_partial(&self, id: &str, batch_index: usize, json: &str) -> AuditResult<()> {
        self.update_partial(id, batch_index, PartialStatus::Completed, Some(json))
    }

    async fn fail_partial(&self, id: &str, batch_index: usize, json: &str) -> AuditResult<()> {
        self.update_partial(id, batch_index, PartialStatus::Failed, Some(json))
    }

    async fn list_partials(&self, id: &str) -> AuditResult<Vec<PartialResult>> {
        Ok(read(&self.partials)?.get(id).cloned().unwrap_or_default())
    }

    async fn delete_partials(&self, id: &str) -> AuditResult<()> {
        write(&self.partials)?.remove(id);
        Ok(())
    }

    async fn save_screenshots(&self, shots: &[IssueScreenshot]) -> AuditResult<()> {
        write(&self.screenshots)?.extend_from_slice(shots);
        Ok(())
    }

    async fn list_screenshots(&self, id: &str) -> AuditResult<Vec<IssueScreenshot>> {
        let mut out: Vec<IssueScreenshot> = read(&self.screenshots)?
            .iter()
            .filter(|s| s.audit_id == id)
            .cloned()
            .collect();
        out.sort_by_key(|s| (s.issue_index, s.frame_sequence));
        Ok(out)
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryStore {
    async fn nearest_chunks(
        &self,
        query: &[f32],
        limit: usize,
        categories: Option<&[i64]>,
    ) -> AuditResult<Vec<ChunkMatch>> {
        let chunks = read(&self.chunks)?;
        let mut matches: Vec<ChunkMatch> = chunks
            .iter()
            .filter(|c| match categories {
                Some(ids) => c.category_id.map(|id| ids.contains(&id)).unwrap_or(false),
                None => true,
            })
            .map(|c| ChunkMatch {
                chunk_id: c.id.clone(),
                source_name: c.source_name.clone(),
                content: c.content.clone(),
                category_id: c.category_id,
                distance: l2_distance(query, &c.embedding),
            })
            .collect();
        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn enabled_category_ids(&self, user_id: &str) -> AuditResult<Vec<i64>> {
        Ok(read(&self.preferences)?
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn insert_chunks(&self, new_chunks: &[KnowledgeChunk]) -> AuditResult<()> {
        let mut chunks = write(&self.chunks)?;
        for c in new_chunks {
            chunks.retain(|existing| existing.id != c.id);
            chunks.push(c.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Severity, WorkflowSummary};
    use std::path::PathBuf;

    fn chunk(id: &str, category: Option<i64>, embedding: Vec<f32>) -> KnowledgeChunk {
        KnowledgeChunk {
            id: id.into(),
            source_name: format!("{}.md", id),
            chunk_index: 0,
            content: format!("content of {}", id),
            category_id: category,
            embedding,
            hash: String::new(),
        }
    }

    fn report() -> Report {
        Report {
            workflow_summary: WorkflowSummary {
                workflow_title: "t".into(),
                user_goal: "g".into(),
                workflow_steps: vec![],
                total_frames_analyzed: "1".into(),
                summary: None,
                workflow_criticality: None,
            },
            identified_issues: vec![crate::models::Issue {
                frame_reference: "Frame 1".into(),
                pain_point_title: "title".into(),
                severity: Severity::Low,
                issue_description: "d".into(),
                recommendations: vec![],
                heuristic_violated: None,
                impact_score: None,
            }],
        }
    }

    #[tokio::test]
    async fn nearest_chunks_orders_by_distance_and_filters() {
        let store = InMemoryStore::new();
        store
            .insert_chunks(&[
                chunk("far", Some(1), vec![10.0, 0.0]),
                chunk("near", Some(2), vec![1.0, 0.0]),
                chunk("mid", None, vec![3.0, 0.0]),
            ])
            .await
            .unwrap();

        let all = store.nearest_chunks(&[0.0, 0.0], 10, None).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|m| m.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid", "far"]);

        let filtered = store
            .nearest_chunks(&[0.0, 0.0], 10, Some(&[1i64][..]))
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].chunk_id, "far");

        let none = store
            .nearest_chunks(&[0.0, 0.0], 10, Some(&[][..]))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn audit_lifecycle_keeps_invariants() {
        let store = InMemoryStore::new();
        let audit = store
            .create_audit(&NewAudit {
                video_path: PathBuf::from("v.mp4"),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(audit.status, AuditStatus::Pending);

        store
            .set_stage(&audit.id, ProcessingStage::AnalyzingAi)
            .await
            .unwrap();
        let a = store.get_audit(&audit.id).await.unwrap().unwrap();
        assert_eq!(a.status, AuditStatus::Processing);

        store.complete_audit(&audit.id, &report(), 88.5).await.unwrap();
        // terminal audits ignore late stage updates
        store
            .set_stage(&audit.id, ProcessingStage::GeneratingReport)
            .await
            .unwrap();
        let a = store.get_audit(&audit.id).await.unwrap().unwrap();
        assert_eq!(a.status, AuditStatus::Completed);
        assert_eq!(a.stage, ProcessingStage::Completed);
        assert!(a.report.is_some());
        assert_eq!(a.score, Some(88.5));
    }

    #[tokio::test]
    async fn partials_are_ordered_and_updated_in_place() {
        let store = InMemoryStore::new();
        store.begin_partial("a", 1).await.unwrap();
        store.begin_partial("a", 0).await.unwrap();
        store.complete_partial("a", 0, "{}").await.unwrap();
        let partials = store.list_partials("a").await.unwrap();
        assert_eq!(partials.len(), 2);
        assert_eq!(partials[0].batch_index, 0);
        assert_eq!(partials[0].status, PartialStatus::Completed);
        assert_eq!(partials[1].status, PartialStatus::Processing);
        store.delete_partials("a").await.unwrap();
        assert!(store.list_partials("a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_audit_updates_fail() {
        let store = InMemoryStore::new();
        let err = store.fail_audit("missing", "boom").await.unwrap_err();
        assert!(matches!(err, AuditError::Storage(_)));
    }
}
