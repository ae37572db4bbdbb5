//! `uxaudit audit`, `uxaudit status`, and `uxaudit report`.
//!
//! Also assembles the production pipeline (SQLite store, ffmpeg extractor,
//! OpenAI gateway, retrieval) shared by the CLI and the server.

use anyhow::{bail, Result};
use std::path::Path;
use std::sync::Arc;

use uxaudit_core::models::{AuditStatus, NewAudit};
use uxaudit_core::progress::compute_progress;
use uxaudit_core::retrieval::KnowledgeRetriever;
use uxaudit_core::store::{AuditStore, KnowledgeStore};

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::frames::FfmpegExtractor;
use crate::llm::{LlmGateway, OpenAiChat};
use crate::pipeline::{AnalysisOrchestrator, AuditOutcome, PipelineSettings};
use crate::progress::ProgressReporter;
use crate::sqlite_store::SqliteStore;

/// The wired-up pipeline.
pub struct Services {
    pub store: Arc<SqliteStore>,
    pub orchestrator: Arc<AnalysisOrchestrator>,
}

/// Build every pipeline component from configuration.
///
/// Fails when `OPENAI_API_KEY` is missing or the embedding provider cannot
/// be constructed, before any audit is touched.
pub async fn build_services(
    config: &Config,
    progress: Arc<dyn ProgressReporter>,
) -> Result<Services> {
    let backend = OpenAiChat::new(&config.llm)?;
    let embedder = create_embedder(&config.embedding)?;
    let store = Arc::new(SqliteStore::new(db::connect(config).await?));

    let knowledge: Arc<dyn KnowledgeStore> = store.clone();
    let retriever = Arc::new(KnowledgeRetriever::new(
        knowledge,
        embedder,
        config.retrieval.settings(),
    ));
    let gateway = Arc::new(LlmGateway::from_config(Arc::new(backend), &config.llm));
    let frames = Arc::new(FfmpegExtractor::new(config.frames.clone()));

    let orchestrator = Arc::new(AnalysisOrchestrator::new(
        store.clone(),
        frames,
        retriever,
        gateway,
        PipelineSettings::from_config(config),
        progress,
    ));
    Ok(Services {
        store,
        orchestrator,
    })
}

/// Run one audit in process and print the outcome.
pub async fn run_audit(
    config: &Config,
    video: &Path,
    new: NewAudit,
    progress: Arc<dyn ProgressReporter>,
) -> Result<()> {
    if !video.is_file() {
        bail!("Video not found: {}", video.display());
    }
    let services = build_services(config, progress).await?;
    if let Some(user_id) = new.user_id.as_deref() {
        if !services.store.user_exists(user_id).await? {
            bail!("Unknown user: {}", user_id);
        }
    }

    let audit = services
        .store
        .create_audit(&NewAudit {
            video_path: video.to_path_buf(),
            ..new
        })
        .await?;
    let outcome = services.orchestrator.run(&audit.id).await?;

    println!("audit {}", audit.id);
    let result = match outcome {
        AuditOutcome::Completed { score, issues } => {
            println!("  status: completed");
            println!("  score: {:.2}", score);
            println!("  issues: {}", issues);
            Ok(())
        }
        AuditOutcome::Failed { category } => {
            println!("  status: failed");
            println!("  reason: {}", category.as_str());
            println!("  message: {}", category.user_message());
            Err(anyhow::anyhow!("audit {} failed", audit.id))
        }
    };
    services.store.pool().close().await;
    result
}

/// Print progress for one audit, or list recent audits when no id is given.
pub async fn run_status(config: &Config, id: Option<&str>) -> Result<()> {
    let store = SqliteStore::new(db::connect(config).await?);
    match id {
        Some(id) => {
            let Some(audit) = store.get_audit(id).await? else {
                bail!("Audit not found: {}", id);
            };
            let partials = store.list_partials(id).await?;
            let progress = compute_progress(&audit, &partials);
            println!("{}", serde_json::to_string_pretty(&progress)?);
        }
        None => {
            let audits = store.list_audits(20).await?;
            if audits.is_empty() {
                println!("No audits.");
            }
            for audit in audits {
                let score = audit
                    .score
                    .map(|s| format!("{:.2}", s))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}  {:<10} {:<18} {:>6}  {}",
                    audit.id,
                    audit.status.as_str(),
                    audit.stage.as_str(),
                    score,
                    audit.title.as_deref().unwrap_or("")
                );
            }
        }
    }
    store.pool().close().await;
    Ok(())
}

/// Print the canonical report JSON of a completed audit.
pub async fn run_report(config: &Config, id: &str) -> Result<()> {
    let store = SqliteStore::new(db::connect(config).await?);
    let Some(audit) = store.get_audit(id).await? else {
        bail!("Audit not found: {}", id);
    };
    match (audit.status, audit.report) {
        (AuditStatus::Completed, Some(report)) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        (AuditStatus::Failed, _) => bail!(
            "Audit {} failed: {}",
            id,
            audit.error_message.unwrap_or_default()
        ),
        (status, _) => bail!("Audit {} has no report yet (status: {})", id, status),
    }
    store.pool().close().await;
    Ok(())
}
