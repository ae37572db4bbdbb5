//! SQLite-backed [`AuditStore`] and [`KnowledgeStore`].
//!
//! Maps each store operation to queries against the schema created by
//! [`migrate`](crate::migrate). Also carries the user, category, and
//! preference queries the CLI and indexer need.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::path::PathBuf;
use uuid::Uuid;

use uxaudit_core::embedding::{blob_to_vec, l2_distance, vec_to_blob};
use uxaudit_core::error::{AuditError, AuditResult};
use uxaudit_core::models::{
    Audit, AuditStatus, Frame, IssueScreenshot, KnowledgeCategory, KnowledgeChunk, NewAudit,
    PartialResult, PartialStatus, ProcessingStage, Report, UserKnowledgePreference,
};
use uxaudit_core::store::{AuditStore, ChunkMatch, KnowledgeStore};

/// SQLite implementation of the store traits.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn db_err(e: sqlx::Error) -> AuditError {
    AuditError::storage(e)
}

fn audit_from_row(row: &SqliteRow) -> AuditResult<Audit> {
    let status: String = row.get("status");
    let stage: String = row.get("stage");
    let report_json: Option<String> = row.get("report_json");
    let report = match report_json {
        Some(json) => Some(
            serde_json::from_str::<Report>(&json)
                .map_err(|e| AuditError::Storage(format!("corrupt report JSON: {}", e)))?,
        ),
        None => None,
    };
    let video_path: String = row.get("video_path");

    Ok(Audit {
        id: row.get("id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        description: row.get("description"),
        video_path: PathBuf::from(video_path),
        thumbnail: row.get("thumbnail"),
        status: status.parse().map_err(AuditError::Storage)?,
        stage: stage.parse().map_err(AuditError::Storage)?,
        report,
        score: row.get("score"),
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

const AUDIT_COLUMNS: &str = "id, user_id, title, description, video_path, thumbnail, status, \
     stage, report_json, score, error_message, created_at, updated_at";

impl SqliteStore {
    async fn set_partial(
        &self,
        id: &str,
        batch_index: usize,
        status: PartialStatus,
        json: Option<&str>,
    ) -> AuditResult<()> {
        sqlx::query(
            r#"
            INSERT INTO partial_results (audit_id, batch_index, status, result_json, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(audit_id, batch_index) DO UPDATE SET
                status = excluded.status,
                result_json = excluded.result_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id)
        .bind(batch_index as i64)
        .bind(status.as_str())
        .bind(json)
        .bind(now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn require_updated(&self, result: sqlx::sqlite::SqliteQueryResult, id: &str) -> AuditResult<()> {
        if result.rows_affected() == 0 {
            let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM audits WHERE id = ?")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
            if !exists {
                return Err(AuditError::Storage(format!("audit not found: {}", id)));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AuditStore for SqliteStore {
    async fn create_audit(&self, new: &NewAudit) -> AuditResult<Audit> {
        let ts = now();
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO audits (id, user_id, title, description, video_path, status, stage,
                                created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 'pending', 'uploaded', ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new.user_id)
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.video_path.to_string_lossy().to_string())
        .bind(ts)
        .bind(ts)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(Audit {
            id,
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
        })
    }

    async fn get_audit(&self, id: &str) -> AuditResult<Option<Audit>> {
        let row = sqlx::query(&format!("SELECT {} FROM audits WHERE id = ?", AUDIT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(audit_from_row).transpose()
    }

    async fn list_audits(&self, limit: usize) -> AuditResult<Vec<Audit>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM audits ORDER BY created_at DESC, rowid DESC LIMIT ?",
            AUDIT_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(audit_from_row).collect()
    }

    async fn set_stage(&self, id: &str, stage: ProcessingStage) -> AuditResult<()> {
        let status = match stage {
            ProcessingStage::Uploaded => AuditStatus::Pending,
            _ => AuditStatus::Processing,
        };
        let result = sqlx::query(
            r#"
            UPDATE audits SET stage = ?, status = ?, updated_at = ?
            WHERE id = ? AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(stage.as_str())
        .bind(status.as_str())
        .bind(now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        self.require_updated(result, id).await
    }

    async fn set_thumbnail(&self, id: &str, thumbnail_b64: &str) -> AuditResult<()> {
        let result = sqlx::query("UPDATE audits SET thumbnail = ?, updated_at = ? WHERE id = ?")
            .bind(thumbnail_b64)
            .bind(now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        self.require_updated(result, id).await
    }

    async fn complete_audit(&self, id: &str, report: &Report, score: f64) -> AuditResult<()> {
        let json = serde_json::to_string(report)
            .map_err(|e| AuditError::Storage(format!("serialize report: {}", e)))?;
        let result = sqlx::query(
            r#"
            UPDATE audits
            SET status = 'completed', stage = 'completed', report_json = ?, score = ?,
                error_message = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(json)
        .bind(score)
        .bind(now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        self.require_updated(result, id).await
    }

    async fn fail_audit(&self, id: &str, message: &str) -> AuditResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE audits
            SET status = 'failed', stage = 'failed', error_message = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(message)
        .bind(now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        self.require_updated(result, id).await
    }

    async fn replace_frames(&self, id: &str, frames: &[Frame]) -> AuditResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("DELETE FROM frames WHERE audit_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        for frame in frames {
            sqlx::query("INSERT INTO frames (audit_id, number, path, size_bytes) VALUES (?, ?, ?, ?)")
                .bind(id)
                .bind(frame.number as i64)
                .bind(frame.path.to_string_lossy().to_string())
                .bind(frame.size_bytes as i64)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn list_frames(&self, id: &str) -> AuditResult<Vec<Frame>> {
        let rows = sqlx::query(
            "SELECT number, path, size_bytes FROM frames WHERE audit_id = ? ORDER BY number ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .iter()
            .map(|row| {
                let number: i64 = row.get("number");
                let path: String = row.get("path");
                let size: i64 = row.get("size_bytes");
                Frame {
                    number: number as u32,
                    path: PathBuf::from(path),
                    size_bytes: size as u64,
                }
            })
            .collect())
    }

    async fn delete_frames(&self, id: &str) -> AuditResult<()> {
        sqlx::query("DELETE FROM frames WHERE audit_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn begin_partial(&self, id: &str, batch_index: usize) -> AuditResult<()> {
        self.set_partial(id, batch_index, PartialStatus::Processing, None)
            .await
    }

    async fn complete_partial(&self, id: &str, batch_index: usize, json: &str) -> AuditResult<()> {
        self.set_partial(id, batch_index, PartialStatus::Completed, Some(json))
            .await
    }

    async fn fail_partial(&self, id: &str, batch_index: usize, json: &str) -> AuditResult<()> {
        self.set_partial(id, batch_index, PartialStatus::Failed, Some(json))
            .await
    }

    async fn list_partials(&self, id: &str) -> AuditResult<Vec<PartialResult>> {
        let rows = sqlx::query(
            r#"
            SELECT audit_id, batch_index, status, result_json FROM partial_results
            WHERE audit_id = ? ORDER BY batch_index ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                let index: i64 = row.get("batch_index");
                let status: String = row.get("status");
                Ok(PartialResult {
                    audit_id: row.get("audit_id"),
                    batch_index: index as usize,
                    status: status.parse().map_err(AuditError::Storage)?,
                    result_json: row.get("result_json"),
                })
            })
            .collect()
    }

    async fn delete_partials(&self, id: &str) -> AuditResult<()> {
        sqlx::query("DELETE FROM partial_results WHERE audit_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn save_screenshots(&self, shots: &[IssueScreenshot]) -> AuditResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for shot in shots {
            sqlx::query(
                r#"
                INSERT INTO issue_screenshots (audit_id, issue_index, frame_number,
                                               frame_sequence, is_primary, image_data)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(audit_id, issue_index, frame_sequence) DO UPDATE SET
                    frame_number = excluded.frame_number,
                    is_primary = excluded.is_primary,
                    image_data = excluded.image_data
                "#,
            )
            .bind(&shot.audit_id)
            .bind(shot.issue_index as i64)
            .bind(shot.frame_number as i64)
            .bind(shot.frame_sequence as i64)
            .bind(shot.is_primary)
            .bind(&shot.image_data)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn list_screenshots(&self, id: &str) -> AuditResult<Vec<IssueScreenshot>> {
        let rows = sqlx::query(
            r#"
            SELECT audit_id, issue_index, frame_number, frame_sequence, is_primary, image_data
            FROM issue_screenshots
            WHERE audit_id = ?
            ORDER BY issue_index ASC, frame_sequence ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .iter()
            .map(|row| {
                let issue_index: i64 = row.get("issue_index");
                let frame_number: i64 = row.get("frame_number");
                let frame_sequence: i64 = row.get("frame_sequence");
                IssueScreenshot {
                    audit_id: row.get("audit_id"),
                    issue_index: issue_index as usize,
                    frame_number: frame_number as u32,
                    frame_sequence: frame_sequence as usize,
                    is_primary: row.get("is_primary"),
                    image_data: row.get("image_data"),
                }
            })
            .collect())
    }
}

#[async_trait]
impl KnowledgeStore for SqliteStore {
    async fn nearest_chunks(
        &self,
        query: &[f32],
        limit: usize,
        categories: Option<&[i64]>,
    ) -> AuditResult<Vec<ChunkMatch>> {
        let rows = match categories {
            Some([]) => return Ok(Vec::new()),
            Some(ids) => {
                let placeholders = vec!["?"; ids.len()].join(", ");
                let sql = format!(
                    "SELECT id, source_name, content, category_id, embedding FROM knowledge_chunks \
                     WHERE category_id IN ({})",
                    placeholders
                );
                let mut q = sqlx::query(&sql);
                for id in ids {
                    q = q.bind(*id);
                }
                q.fetch_all(&self.pool).await.map_err(db_err)?
            }
            None => sqlx::query(
                "SELECT id, source_name, content, category_id, embedding FROM knowledge_chunks",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?,
        };

        let mut matches: Vec<ChunkMatch> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                ChunkMatch {
                    chunk_id: row.get("id"),
                    source_name: row.get("source_name"),
                    content: row.get("content"),
                    category_id: row.get("category_id"),
                    distance: l2_distance(query, &blob_to_vec(&blob)),
                }
            })
            .filter(|m| m.distance.is_finite())
            .collect();

        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn enabled_category_ids(&self, user_id: &str) -> AuditResult<Vec<i64>> {
        sqlx::query_scalar(
            r#"
            SELECT category_id FROM user_knowledge_preferences
            WHERE user_id = ? AND enabled = 1
            ORDER BY category_id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn insert_chunks(&self, chunks: &[KnowledgeChunk]) -> AuditResult<()> {
        let ts = now();
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO knowledge_chunks (id, source_name, chunk_index, content, category_id,
                                              dims, embedding, hash, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(source_name, chunk_index) DO UPDATE SET
                    content = excluded.content,
                    category_id = excluded.category_id,
                    dims = excluded.dims,
                    embedding = excluded.embedding,
                    hash = excluded.hash,
                    created_at = excluded.created_at
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.source_name)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(chunk.category_id)
            .bind(chunk.embedding.len() as i64)
            .bind(vec_to_blob(&chunk.embedding))
            .bind(&chunk.hash)
            .bind(ts)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }
}

// ============ Users, categories, preferences ============

impl SqliteStore {
    /// Insert categories that are not present yet (by slug). Returns how many were added.
    pub async fn seed_categories(&self, categories: &[KnowledgeCategory]) -> Result<usize> {
        let mut added = 0;
        for c in categories {
            let result = sqlx::query(
                r#"
                INSERT INTO knowledge_categories (name, slug, description, default_enabled, position)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(slug) DO NOTHING
                "#,
            )
            .bind(&c.name)
            .bind(&c.slug)
            .bind(&c.description)
            .bind(c.default_enabled)
            .bind(c.position)
            .execute(&self.pool)
            .await?;
            added += result.rows_affected() as usize;
        }
        Ok(added)
    }

    pub async fn list_categories(&self) -> Result<Vec<KnowledgeCategory>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, slug, description, default_enabled, position
            FROM knowledge_categories ORDER BY position ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| KnowledgeCategory {
                id: row.get("id"),
                name: row.get("name"),
                slug: row.get("slug"),
                description: row.get("description"),
                default_enabled: row.get("default_enabled"),
                position: row.get("position"),
            })
            .collect())
    }

    pub async fn category_id(&self, slug: &str) -> Result<i64> {
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM knowledge_categories WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        match id {
            Some(id) => Ok(id),
            None => bail!(
                "Unknown knowledge category: '{}'. Run `uxaudit knowledge categories` to list them.",
                slug
            ),
        }
    }

    /// Create a user and enable every default category for them.
    pub async fn create_user(&self, email: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let ts = now();
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO users (id, email, created_at) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(email)
            .bind(ts)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO user_knowledge_preferences (user_id, category_id, enabled, updated_at)
            SELECT ?, id, 1, ? FROM knowledge_categories WHERE default_enabled = 1
            "#,
        )
        .bind(&id)
        .bind(ts)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(id)
    }

    pub async fn user_exists(&self, user_id: &str) -> Result<bool> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    pub async fn set_preference(&self, user_id: &str, slug: &str, enabled: bool) -> Result<()> {
        if !self.user_exists(user_id).await? {
            bail!("Unknown user: {}", user_id);
        }
        let category_id = self.category_id(slug).await?;
        sqlx::query(
            r#"
            INSERT INTO user_knowledge_preferences (user_id, category_id, enabled, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id, category_id) DO UPDATE SET
                enabled = excluded.enabled,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(category_id)
        .bind(enabled)
        .bind(now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Every category with the user's effective setting (disabled when no row exists).
    pub async fn list_preferences(&self, user_id: &str) -> Result<Vec<UserKnowledgePreference>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id AS category_id, c.slug AS slug, COALESCE(p.enabled, 0) AS enabled
            FROM knowledge_categories c
            LEFT JOIN user_knowledge_preferences p
                   ON p.category_id = c.id AND p.user_id = ?
            ORDER BY c.position ASC, c.id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| UserKnowledgePreference {
                user_id: user_id.to_string(),
                category_id: row.get("category_id"),
                category_slug: row.get("slug"),
                enabled: row.get("enabled"),
            })
            .collect())
    }

    /// Hashes of the chunks already stored for a source, by chunk index.
    pub async fn source_hashes(&self, source_name: &str) -> Result<Vec<String>> {
        Ok(sqlx::query_scalar(
            "SELECT hash FROM knowledge_chunks WHERE source_name = ? ORDER BY chunk_index ASC",
        )
        .bind(source_name)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Remove chunks of a source at or beyond `from_index`.
    pub async fn truncate_source(&self, source_name: &str, from_index: i64) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM knowledge_chunks WHERE source_name = ? AND chunk_index >= ?")
                .bind(source_name)
                .bind(from_index)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::migrate_pool;
    use sqlx::sqlite::SqlitePoolOptions;
    use uxaudit_core::models::{Issue, Severity, WorkflowSummary};

    async fn store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate_pool(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn category(slug: &str, default_enabled: bool, position: i64) -> KnowledgeCategory {
        KnowledgeCategory {
            id: 0,
            name: slug.to_uppercase(),
            slug: slug.into(),
            description: String::new(),
            default_enabled,
            position,
        }
    }

    fn report() -> Report {
        Report {
            workflow_summary: WorkflowSummary {
                workflow_title: "Checkout".into(),
                user_goal: "Buy".into(),
                workflow_steps: vec!["Open cart".into()],
                total_frames_analyzed: "20".into(),
                summary: None,
                workflow_criticality: None,
            },
            identified_issues: vec![Issue {
                frame_reference: "Frame 3".into(),
                pain_point_title: "Hidden pay button".into(),
                severity: Severity::High,
                issue_description: "The pay button is below the fold.".into(),
                recommendations: vec!["Move it up".into()],
                heuristic_violated: None,
                impact_score: Some(8),
            }],
        }
    }

    #[tokio::test]
    async fn audit_roundtrip_and_terminal_guard() {
        let store = store().await;
        let audit = store
            .create_audit(&NewAudit {
                title: Some("Checkout".into()),
                video_path: PathBuf::from("/tmp/v.mp4"),
                ..Default::default()
            })
            .await
            .unwrap();

        store
            .set_stage(&audit.id, ProcessingStage::AnalyzingAi)
            .await
            .unwrap();
        store.complete_audit(&audit.id, &report(), 91.25).await.unwrap();
        store
            .set_stage(&audit.id, ProcessingStage::GeneratingReport)
            .await
            .unwrap();

        let loaded = store.get_audit(&audit.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, AuditStatus::Completed);
        assert_eq!(loaded.stage, ProcessingStage::Completed);
        assert_eq!(loaded.report, Some(report()));
        assert_eq!(loaded.score, Some(91.25));
        assert_eq!(loaded.title.as_deref(), Some("Checkout"));

        assert!(store.get_audit("missing").await.unwrap().is_none());
        assert!(store.fail_audit("missing", "x").await.is_err());
    }

    #[tokio::test]
    async fn partials_frames_and_screenshots() {
        let store = store().await;
        let audit = store
            .create_audit(&NewAudit {
                video_path: PathBuf::from("v.mp4"),
                ..Default::default()
            })
            .await
            .unwrap();

        store.begin_partial(&audit.id, 1).await.unwrap();
        store.begin_partial(&audit.id, 0).await.unwrap();
        store.complete_partial(&audit.id, 0, "{}").await.unwrap();
        let partials = store.list_partials(&audit.id).await.unwrap();
        assert_eq!(partials.len(), 2);
        assert_eq!(partials[0].status, PartialStatus::Completed);
        assert_eq!(partials[1].status, PartialStatus::Processing);

        let frames: Vec<Frame> = (1..=3)
            .rev()
            .map(|n| Frame {
                number: n,
                path: PathBuf::from(format!("frame_{:04}.jpg", n)),
                size_bytes: 100,
            })
            .collect();
        store.replace_frames(&audit.id, &frames).await.unwrap();
        let listed = store.list_frames(&audit.id).await.unwrap();
        assert_eq!(
            listed.iter().map(|f| f.number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        store
            .save_screenshots(&[
                IssueScreenshot {
                    audit_id: audit.id.clone(),
                    issue_index: 0,
                    frame_number: 3,
                    frame_sequence: 1,
                    is_primary: true,
                    image_data: "BBBB".into(),
                },
                IssueScreenshot {
                    audit_id: audit.id.clone(),
                    issue_index: 0,
                    frame_number: 2,
                    frame_sequence: 0,
                    is_primary: false,
                    image_data: "AAAA".into(),
                },
            ])
            .await
            .unwrap();
        let shots = store.list_screenshots(&audit.id).await.unwrap();
        assert_eq!(shots[0].frame_number, 2);
        assert!(shots[1].is_primary);

        store.delete_frames(&audit.id).await.unwrap();
        store.delete_partials(&audit.id).await.unwrap();
        assert!(store.list_frames(&audit.id).await.unwrap().is_empty());
        assert!(store.list_partials(&audit.id).await.unwrap().is_empty());
        assert_eq!(store.list_screenshots(&audit.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn users_get_default_categories_and_can_toggle() {
        let store = store().await;
        let added = store
            .seed_categories(&[category("core", true, 0), category("a11y", false, 1)])
            .await
            .unwrap();
        assert_eq!(added, 2);
        assert_eq!(
            store
                .seed_categories(&[category("core", true, 0)])
                .await
                .unwrap(),
            0
        );

        let user = store.create_user("ana@example.com").await.unwrap();
        let core = store.category_id("core").await.unwrap();
        let a11y = store.category_id("a11y").await.unwrap();
        assert_eq!(store.enabled_category_ids(&user).await.unwrap(), vec![core]);

        store.set_preference(&user, "a11y", true).await.unwrap();
        store.set_preference(&user, "core", false).await.unwrap();
        assert_eq!(store.enabled_category_ids(&user).await.unwrap(), vec![a11y]);

        let prefs = store.list_preferences(&user).await.unwrap();
        assert_eq!(prefs.len(), 2);
        assert!(!prefs[0].enabled);
        assert!(prefs[1].enabled);

        assert!(store.set_preference(&user, "nope", true).await.is_err());
        assert!(store.set_preference("ghost", "core", true).await.is_err());
    }

    #[tokio::test]
    async fn vector_search_filters_by_category() {
        let store = store().await;
        store
            .seed_categories(&[category("core", true, 0), category("a11y", false, 1)])
            .await
            .unwrap();
        let core = store.category_id("core").await.unwrap();
        let a11y = store.category_id("a11y").await.unwrap();

        let chunk = |source: &str, idx: i64, cat: i64, x: f32| KnowledgeChunk {
            id: Uuid::new_v4().to_string(),
            source_name: source.into(),
            chunk_index: idx,
            content: format!("{} {}", source, idx),
            category_id: Some(cat),
            embedding: vec![x, 0.0],
            hash: format!("h{}", idx),
        };
        store
            .insert_chunks(&[
                chunk("nielsen.md", 0, core, 1.0),
                chunk("nielsen.md", 1, core, 5.0),
                chunk("wcag.md", 0, a11y, 2.0),
            ])
            .await
            .unwrap();

        let all = store.nearest_chunks(&[0.0, 0.0], 2, None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].content, "nielsen.md 0");
        assert_eq!(all[1].content, "wcag.md 0");

        let only = store
            .nearest_chunks(&[0.0, 0.0], 10, Some(&[a11y][..]))
            .await
            .unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].category_id, Some(a11y));

        assert!(store
            .nearest_chunks(&[0.0, 0.0], 10, Some(&[][..]))
            .await
            .unwrap()
            .is_empty());

        assert_eq!(store.source_hashes("nielsen.md").await.unwrap(), vec!["h0", "h1"]);
        assert_eq!(store.truncate_source("nielsen.md", 1).await.unwrap(), 1);
    }
}
