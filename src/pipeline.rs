//! Analysis orchestrator.
//!
//! Drives one audit through `uploaded → extracting_frames → analyzing_ai →
//! generating_report → {completed | failed}`:
//!
//! 1. Extract frames (retried at job level when the error is retryable).
//! 2. Batch the frames and analyze each batch **in order**, persisting a
//!    partial result per batch. The first failing batch fails the audit.
//! 3. Synthesize the batch outputs into one report, filter and deduplicate
//!    its issues, and store it with the report-level score.
//! 4. Attach screenshots to issues (best effort).
//! 5. Clean up scratch frames, frame rows, and partial results. Cleanup runs
//!    whatever the outcome.
//!
//! Errors are classified into a [`FailureCategory`] before being persisted,
//! so the stored message never contains raw error text.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use uxaudit_core::batch::{batch_frames, deduplicate};
use uxaudit_core::error::{AuditError, AuditResult, FailureCategory};
use uxaudit_core::issue_filter;
use uxaudit_core::models::{Audit, Batch, Frame, IssueScreenshot, ProcessingStage, Report};
use uxaudit_core::prompt::{BatchSummary, Prompt, PromptBuilder, PromptSettings, FUNCTION_NAME};
use uxaudit_core::retrieval::KnowledgeRetriever;
use uxaudit_core::screenshots::plan_screenshots;
use uxaudit_core::store::AuditStore;
use uxaudit_core::validate::{self, ValidatedResponse};
use uxaudit_core::workflow::classify_workflow;

use crate::config::Config;
use crate::frames::{jpeg_data_url, read_base64, FrameSource};
use crate::llm::{ChatReply, ChatRequest, ImagePart, LlmGateway};
use crate::progress::{ProgressEvent, ProgressReporter};

/// Weight of the synthesis quality in the stored score; batches get the rest.
const SYNTHESIS_WEIGHT: f64 = 0.7;

/// Tunables the orchestrator needs, copied out of [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub prompt: PromptSettings,
    pub batch_size: usize,
    pub deduplicate: bool,
    pub min_quality_score: f64,
    pub screenshot_context: u32,
    pub screenshot_max: usize,
    pub delete_video: bool,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            prompt: config.llm.prompt_settings(),
            batch_size: config.llm.batch_size,
            deduplicate: config.frames.deduplicate,
            min_quality_score: config.issues.min_quality_score,
            screenshot_context: config.screenshots.context,
            screenshot_max: config.screenshots.max_frames,
            delete_video: config.frames.delete_video,
        }
    }
}

/// Job-level retry budget for frame extraction.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionRetry {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl ExtractionRetry {
    /// A single attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.backoff * (1u32 << attempt.saturating_sub(1).min(5))
    }
}

/// How an audit run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditOutcome {
    Completed { score: f64, issues: usize },
    Failed { category: FailureCategory },
}

pub struct AnalysisOrchestrator {
    store: Arc<dyn AuditStore>,
    frames: Arc<dyn FrameSource>,
    retriever: Arc<KnowledgeRetriever>,
    gateway: Arc<LlmGateway>,
    settings: PipelineSettings,
    progress: Arc<dyn ProgressReporter>,
}

impl AnalysisOrchestrator {
    pub fn new(
        store: Arc<dyn AuditStore>,
        frames: Arc<dyn FrameSource>,
        retriever: Arc<KnowledgeRetriever>,
        gateway: Arc<LlmGateway>,
        settings: PipelineSettings,
        progress: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            store,
            frames,
            retriever,
            gateway,
            settings,
            progress,
        }
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    /// Run an audit end to end with a single extraction attempt.
    pub async fn run(&self, audit_id: &str) -> AuditResult<AuditOutcome> {
        self.run_with_retry(audit_id, ExtractionRetry::none()).await
    }

    /// Run an audit end to end.
    ///
    /// Returns `Err` only when the audit cannot be loaded; pipeline failures
    /// are persisted on the audit and reported as [`AuditOutcome::Failed`].
    pub async fn run_with_retry(
        &self,
        audit_id: &str,
        retry: ExtractionRetry,
    ) -> AuditResult<AuditOutcome> {
        let audit = self
            .store
            .get_audit(audit_id)
            .await?
            .ok_or_else(|| AuditError::Storage(format!("audit not found: {}", audit_id)))?;

        let result = match self.extract_with_retry(&audit, retry).await {
            Ok(frames) => self.analyze(&audit, &frames).await,
            Err(e) => Err(e),
        };

        let outcome = match result {
            Ok((score, issues)) => AuditOutcome::Completed { score, issues },
            Err(e) => AuditOutcome::Failed {
                category: self.record_failure(&audit, &e).await,
            },
        };

        self.cleanup(&audit).await;
        Ok(outcome)
    }

    async fn set_stage(&self, audit: &Audit, stage: ProcessingStage) -> AuditResult<()> {
        self.store.set_stage(&audit.id, stage).await?;
        info!(audit_id = %audit.id, stage = %stage, "audit stage changed");
        self.progress.report(ProgressEvent::Stage {
            audit_id: audit.id.clone(),
            stage,
        });
        Ok(())
    }

    async fn extract_with_retry(
        &self,
        audit: &Audit,
        retry: ExtractionRetry,
    ) -> AuditResult<Vec<Frame>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.extract(audit).await {
                Ok(frames) => return Ok(frames),
                Err(e) if e.is_retryable() && attempt < retry.max_attempts => {
                    let delay = retry.delay(attempt);
                    warn!(
                        audit_id = %audit.id,
                        attempt,
                        max_attempts = retry.max_attempts,
                        error = %e,
                        "frame extraction failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn extract(&self, audit: &Audit) -> AuditResult<Vec<Frame>> {
        self.set_stage(audit, ProcessingStage::ExtractingFrames)
            .await?;
        let extracted = self.frames.extract(&audit.id, &audit.video_path).await?;

        self.store
            .replace_frames(&audit.id, &extracted.frames)
            .await?;
        if let Some(thumbnail) = &extracted.thumbnail {
            self.store.set_thumbnail(&audit.id, thumbnail).await?;
        }
        self.progress.report(ProgressEvent::FramesExtracted {
            audit_id: audit.id.clone(),
            frames: extracted.frames.len(),
        });
        Ok(extracted.frames)
    }

    /// Knowledge context for the audit, scoped to the user when there is one.
    async fn knowledge(&self, audit: &Audit) -> String {
        let context = audit.analysis_context();
        match audit.user_id.as_deref() {
            Some(user_id) => self.retriever.retrieve_for_user(&context, user_id).await,
            None => self.retriever.retrieve_for_context(&context).await,
        }
    }

    /// Batch analysis and synthesis. Returns the stored score and issue count.
    async fn analyze(&self, audit: &Audit, frames: &[Frame]) -> AuditResult<(f64, usize)> {
        self.set_stage(audit, ProcessingStage::AnalyzingAi).await?;

        // Screenshots map against every extracted frame, not just the analyzed ones.
        let extracted = frames;
        let frames = if self.settings.deduplicate {
            let kept = deduplicate(extracted);
            debug!(audit_id = %audit.id, before = extracted.len(), after = kept.len(), "deduplicated frames");
            kept
        } else {
            extracted.to_vec()
        };
        let total_frames = frames.len();
        let batches = batch_frames(&frames, self.settings.batch_size);
        let criticality = classify_workflow(audit.title.as_deref(), audit.description.as_deref());
        let builder = PromptBuilder::new(self.settings.prompt.clone(), criticality);
        info!(
            audit_id = %audit.id,
            frames = total_frames,
            batches = batches.len(),
            criticality = %criticality,
            "starting batch analysis"
        );

        let mut summaries = Vec::with_capacity(batches.len());
        let mut batch_scores = Vec::with_capacity(batches.len());
        for batch in &batches {
            self.store.begin_partial(&audit.id, batch.index).await?;
            let validated = match self.analyze_batch(audit, &builder, batch, total_frames).await {
                Ok(v) => v,
                Err(e) => {
                    let body = json!({ "error": e.to_string() }).to_string();
                    if let Err(store_err) =
                        self.store.fail_partial(&audit.id, batch.index, &body).await
                    {
                        warn!(audit_id = %audit.id, error = %store_err, "could not record failed batch");
                    }
                    return Err(e);
                }
            };

            let json = serde_json::to_string(&validated.report).map_err(AuditError::storage)?;
            self.store
                .complete_partial(&audit.id, batch.index, &json)
                .await?;
            info!(
                audit_id = %audit.id,
                batch = batch.index + 1,
                total = batches.len(),
                quality = validated.quality_score,
                issues = validated.report.identified_issues.len(),
                "batch analyzed"
            );
            self.progress.report(ProgressEvent::BatchDone {
                audit_id: audit.id.clone(),
                n: batch.index + 1,
                total: batches.len(),
                quality: validated.quality_score,
            });

            batch_scores.push(validated.quality_score);
            summaries.push(BatchSummary {
                batch_index: batch.index,
                first_frame: batch.first_number().unwrap_or(0),
                last_frame: batch.last_number().unwrap_or(0),
                json,
            });
        }

        self.set_stage(audit, ProcessingStage::GeneratingReport)
            .await?;
        let knowledge = self.knowledge(audit).await;
        let prompt = builder.synthesis_prompt(&summaries, total_frames, &knowledge);
        let synthesis = self.call_and_validate(&prompt, Vec::new()).await?;

        let mut report = synthesis.report;
        let before = report.identified_issues.len();
        let kept = issue_filter::filter(report.identified_issues, self.settings.min_quality_score);
        report.identified_issues = issue_filter::deduplicate_similar(kept);
        if report.identified_issues.len() < before {
            warn!(
                audit_id = %audit.id,
                before,
                after = report.identified_issues.len(),
                "dropped low-quality or duplicate issues"
            );
        }

        let score = report_score(synthesis.quality_score, &batch_scores);
        self.store.complete_audit(&audit.id, &report, score).await?;
        info!(audit_id = %audit.id, score, issues = report.identified_issues.len(), "audit completed");
        self.progress.report(ProgressEvent::Stage {
            audit_id: audit.id.clone(),
            stage: ProcessingStage::Completed,
        });

        if let Err(e) = self.attach_screenshots(audit, &report, extracted).await {
            warn!(audit_id = %audit.id, error = %e, "screenshot mapping failed");
        }

        Ok((score, report.identified_issues.len()))
    }

    async fn analyze_batch(
        &self,
        audit: &Audit,
        builder: &PromptBuilder,
        batch: &Batch,
        total_frames: usize,
    ) -> AuditResult<ValidatedResponse> {
        let knowledge = self.knowledge(audit).await;
        let prompt = builder.batch_prompt(batch, total_frames, &knowledge);

        let mut images = Vec::with_capacity(batch.frames.len());
        for frame in &batch.frames {
            images.push(ImagePart {
                label: format!("Frame {}", frame.number),
                data_url: jpeg_data_url(&frame.path).await?,
                detail: prompt.image_detail,
            });
        }
        self.call_and_validate(&prompt, images).await
    }

    async fn call_and_validate(
        &self,
        prompt: &Prompt,
        images: Vec<ImagePart>,
    ) -> AuditResult<ValidatedResponse> {
        let request = ChatRequest::from_prompt(prompt, &self.settings.prompt, images);
        let reply = self.gateway.call(&request).await?;

        let validated = match reply {
            ChatReply::FunctionCall { name, arguments } => {
                if name != FUNCTION_NAME {
                    warn!(function = %name, "model called an unexpected function");
                }
                validate::parse_function_call(&arguments, true)?
            }
            ChatReply::Text(text) => validate::parse_text_response(&text)?,
        };
        if validated.remapped {
            debug!("model reply was remapped from an alternate shape");
        }
        validate::ensure_grounded(&validated.report)?;
        Ok(validated)
    }

    async fn attach_screenshots(
        &self,
        audit: &Audit,
        report: &Report,
        frames: &[Frame],
    ) -> AuditResult<()> {
        let planned = plan_screenshots(
            &report.identified_issues,
            frames,
            self.settings.screenshot_context,
            self.settings.screenshot_max,
        );
        let mut shots = Vec::with_capacity(planned.len());
        for plan in planned {
            shots.push(IssueScreenshot {
                audit_id: audit.id.clone(),
                issue_index: plan.issue_index,
                frame_number: plan.frame_number,
                frame_sequence: plan.frame_sequence,
                is_primary: plan.is_primary,
                image_data: read_base64(&plan.path).await?,
            });
        }
        self.store.save_screenshots(&shots).await?;
        debug!(audit_id = %audit.id, screenshots = shots.len(), "screenshots attached");
        Ok(())
    }

    async fn record_failure(&self, audit: &Audit, err: &AuditError) -> FailureCategory {
        let category = FailureCategory::classify(err);
        error!(
            audit_id = %audit.id,
            category = category.as_str(),
            error = %err,
            "audit failed"
        );
        if let Err(e) = self.store.fail_audit(&audit.id, category.user_message()).await {
            error!(audit_id = %audit.id, error = %e, "could not persist audit failure");
        }
        self.progress.report(ProgressEvent::Stage {
            audit_id: audit.id.clone(),
            stage: ProcessingStage::Failed,
        });
        category
    }

    /// Remove scratch frames, frame rows, partial results, and optionally the
    /// source video. Failures are logged.
    async fn cleanup(&self, audit: &Audit) {
        if let Err(e) = self.frames.cleanup(&audit.id).await {
            warn!(audit_id = %audit.id, error = %e, "could not remove scratch frames");
        }
        if let Err(e) = self.store.delete_frames(&audit.id).await {
            warn!(audit_id = %audit.id, error = %e, "could not delete frame rows");
        }
        if let Err(e) = self.store.delete_partials(&audit.id).await {
            warn!(audit_id = %audit.id, error = %e, "could not delete partial results");
        }
        if self.settings.delete_video {
            match tokio::fs::remove_file(&audit.video_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(audit_id = %audit.id, error = %e, "could not delete video"),
            }
        }
        debug!(audit_id = %audit.id, "cleanup finished");
    }
}

/// `0.7 × synthesis + 0.3 × mean batch quality`, rounded to two decimals.
pub fn report_score(synthesis: f64, batch_scores: &[f64]) -> f64 {
    let score = if batch_scores.is_empty() {
        synthesis
    } else {
        let mean = batch_scores.iter().sum::<f64>() / batch_scores.len() as f64;
        SYNTHESIS_WEIGHT * synthesis + (1.0 - SYNTHESIS_WEIGHT) * mean
    };
    (score * 100.0).round() / 100.0
}
