//! Progress query for a single audit.

use serde::Serialize;

use crate::models::{Audit, AuditStatus, PartialResult, PartialStatus, ProcessingStage};

/// Progress snapshot returned to pollers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditProgress {
    pub id: String,
    pub status: AuditStatus,
    pub stage: ProcessingStage,
    pub message: &'static str,
    /// Percentage, 0–100.
    pub progress: u8,
    pub completed_batches: usize,
    pub total_batches: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Compute progress from an audit and its partial results.
///
/// While the audit is analyzing, progress is completed partials over all
/// partials recorded so far. Other stages map to fixed values: nothing done
/// before analysis starts, everything done once a report is being
/// generated or the audit is completed.
pub fn compute_progress(audit: &Audit, partials: &[PartialResult]) -> AuditProgress {
    let total = partials.len();
    let completed = partials
        .iter()
        .filter(|p| p.status == PartialStatus::Completed)
        .count();

    let progress = match audit.stage {
        ProcessingStage::Uploaded | ProcessingStage::ExtractingFrames => 0,
        ProcessingStage::AnalyzingAi | ProcessingStage::Failed => {
            if total == 0 {
                0
            } else {
                ((completed as f64 / total as f64) * 100.0).round() as u8
            }
        }
        ProcessingStage::GeneratingReport | ProcessingStage::Completed => 100,
    };

    AuditProgress {
        id: audit.id.clone(),
        status: audit.status,
        stage: audit.stage,
        message: audit.stage.message(),
        progress,
        completed_batches: completed,
        total_batches: total,
        error: audit.error_message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn audit(stage: ProcessingStage) -> Audit {
        Audit {
            id: "a1".into(),
            user_id: None,
            title: None,
            description: None,
            video_path: PathBuf::from("v.mp4"),
            thumbnail: None,
            status: AuditStatus::Processing,
            stage,
            report: None,
            score: None,
            error_message: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn partial(index: usize, status: PartialStatus) -> PartialResult {
        PartialResult {
            audit_id: "a1".into(),
            batch_index: index,
            status,
            result_json: None,
        }
    }

    #[test]
    fn analyzing_progress_is_completed_over_total() {
        let partials = vec![
            partial(0, PartialStatus::Completed),
            partial(1, PartialStatus::Completed),
            partial(2, PartialStatus::Completed),
            partial(3, PartialStatus::Processing),
        ];
        let p = compute_progress(&audit(ProcessingStage::AnalyzingAi), &partials);
        assert_eq!(p.progress, 75);
        assert_eq!(p.completed_batches, 3);
        assert_eq!(p.total_batches, 4);
    }

    #[test]
    fn fixed_values_outside_analysis() {
        assert_eq!(
            compute_progress(&audit(ProcessingStage::ExtractingFrames), &[]).progress,
            0
        );
        assert_eq!(
            compute_progress(&audit(ProcessingStage::AnalyzingAi), &[]).progress,
            0
        );
        assert_eq!(
            compute_progress(&audit(ProcessingStage::GeneratingReport), &[]).progress,
            100
        );
    }

    #[test]
    fn serializes_snake_case_status() {
        let p = compute_progress(&audit(ProcessingStage::AnalyzingAi), &[]);
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["status"], "processing");
        assert_eq!(json["stage"], "analyzing_ai");
        assert!(json.get("error").is_none());
    }
}
