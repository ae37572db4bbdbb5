//! Core data models used throughout uxaudit.
//!
//! These types represent the audits, frames, batches, and reports that flow
//! through the analysis pipeline, plus the knowledge chunks consumed by
//! retrieval.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Lifecycle status of an audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Pending => "pending",
            AuditStatus::Processing => "processing",
            AuditStatus::Completed => "completed",
            AuditStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AuditStatus::Completed | AuditStatus::Failed)
    }
}

impl FromStr for AuditStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AuditStatus::Pending),
            "processing" => Ok(AuditStatus::Processing),
            "completed" => Ok(AuditStatus::Completed),
            "failed" => Ok(AuditStatus::Failed),
            other => Err(format!("unknown audit status: {}", other)),
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage of an audit.
///
/// Transitions: `uploaded → extracting_frames → analyzing_ai →
/// generating_report → {completed | failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    Uploaded,
    ExtractingFrames,
    AnalyzingAi,
    GeneratingReport,
    Completed,
    Failed,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStage::Uploaded => "uploaded",
            ProcessingStage::ExtractingFrames => "extracting_frames",
            ProcessingStage::AnalyzingAi => "analyzing_ai",
            ProcessingStage::GeneratingReport => "generating_report",
            ProcessingStage::Completed => "completed",
            ProcessingStage::Failed => "failed",
        }
    }

    /// Short human-readable description of what the pipeline is doing.
    pub fn message(&self) -> &'static str {
        match self {
            ProcessingStage::Uploaded => "Video uploaded successfully",
            ProcessingStage::ExtractingFrames => "Extracting frames from video...",
            ProcessingStage::AnalyzingAi => "Analyzing workflow with AI...",
            ProcessingStage::GeneratingReport => "Generating your UX report...",
            ProcessingStage::Completed => "Report ready",
            ProcessingStage::Failed => "Analysis failed",
        }
    }
}

impl FromStr for ProcessingStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(ProcessingStage::Uploaded),
            "extracting_frames" => Ok(ProcessingStage::ExtractingFrames),
            "analyzing_ai" => Ok(ProcessingStage::AnalyzingAi),
            "generating_report" => Ok(ProcessingStage::GeneratingReport),
            "completed" => Ok(ProcessingStage::Completed),
            "failed" => Ok(ProcessingStage::Failed),
            other => Err(format!("unknown processing stage: {}", other)),
        }
    }
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One analysis run over a single uploaded video.
#[derive(Debug, Clone)]
pub struct Audit {
    pub id: String,
    pub user_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub video_path: PathBuf,
    /// Base64 JPEG of the first extracted frame.
    pub thumbnail: Option<String>,
    pub status: AuditStatus,
    pub stage: ProcessingStage,
    pub report: Option<Report>,
    /// Report-level quality score (0–100).
    pub score: Option<f64>,
    /// User-facing failure message. Present iff `status == Failed`.
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Audit {
    /// Free-form text describing the audit, used for knowledge retrieval
    /// and workflow classification.
    pub fn analysis_context(&self) -> String {
        let mut parts = vec!["UX audit".to_string()];
        if let Some(title) = self.title.as_deref().filter(|t| !t.trim().is_empty()) {
            parts.push(format!("of {}", title.trim()));
        }
        if let Some(desc) = self
            .description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
        {
            parts.push(desc.trim().to_string());
        }
        parts.join(" ")
    }
}

/// Input for creating an audit.
#[derive(Debug, Clone, Default)]
pub struct NewAudit {
    pub user_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub video_path: PathBuf,
}

/// A 1-indexed still image extracted from an audit's video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub number: u32,
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl Frame {
    /// Parse the frame number from an extractor file name such as
    /// `frame_0042.jpg`. Returns `None` for anything else.
    pub fn number_from_file_name(name: &str) -> Option<u32> {
        let stem = name.strip_suffix(".jpg")?;
        let digits = stem.strip_prefix("frame_")?;
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

/// A contiguous, order-tagged slice of frames analyzed in one LLM call.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Zero-based position of this batch within the audit.
    pub index: usize,
    pub frames: Vec<Frame>,
}

impl Batch {
    pub fn frame_numbers(&self) -> Vec<u32> {
        self.frames.iter().map(|f| f.number).collect()
    }

    pub fn first_number(&self) -> Option<u32> {
        self.frames.first().map(|f| f.number)
    }

    pub fn last_number(&self) -> Option<u32> {
        self.frames.last().map(|f| f.number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialStatus {
    Processing,
    Completed,
    Failed,
}

impl PartialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartialStatus::Processing => "processing",
            PartialStatus::Completed => "completed",
            PartialStatus::Failed => "failed",
        }
    }
}

impl FromStr for PartialStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(PartialStatus::Processing),
            "completed" => Ok(PartialStatus::Completed),
            "failed" => Ok(PartialStatus::Failed),
            other => Err(format!("unknown partial result status: {}", other)),
        }
    }
}

/// Per-batch output recorded for progress polling.
#[derive(Debug, Clone)]
pub struct PartialResult {
    pub audit_id: String,
    pub batch_index: usize,
    pub status: PartialStatus,
    /// Validated batch JSON on success, `{"error": ...}` on failure.
    pub result_json: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
        }
    }

    /// Case-insensitive parse of `High`/`Medium`/`Low`.
    pub fn parse_lenient(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Severity::High),
            "medium" => Some(Severity::Medium),
            "low" => Some(Severity::Low),
            _ => None,
        }
    }
}

/// Nielsen's ten usability heuristics, as accepted in `heuristicViolated`.
pub const NIELSEN_HEURISTICS: [&str; 10] = [
    "Visibility of system status",
    "Match between system and real world",
    "User control and freedom",
    "Consistency and standards",
    "Error prevention",
    "Recognition rather than recall",
    "Flexibility and efficiency of use",
    "Aesthetic and minimalist design",
    "Help users recognize, diagnose, and recover from errors",
    "Help and documentation",
];

/// The `workflowSummary` section of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    #[serde(rename = "workflowtitle")]
    pub workflow_title: String,
    pub user_goal: String,
    pub workflow_steps: Vec<String>,
    pub total_frames_analyzed: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_criticality: Option<String>,
}

/// One finding within a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub frame_reference: String,
    pub pain_point_title: String,
    pub severity: Severity,
    pub issue_description: String,
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heuristic_violated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact_score: Option<u8>,
}

/// The canonical persisted report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub workflow_summary: WorkflowSummary,
    pub identified_issues: Vec<Issue>,
}

/// A frame image attached to an issue for display.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueScreenshot {
    pub audit_id: String,
    /// Ordinal index of the issue within the report.
    pub issue_index: usize,
    pub frame_number: u32,
    /// Display position among the issue's screenshots.
    pub frame_sequence: usize,
    /// True when the frame was named by the model, false for context frames.
    pub is_primary: bool,
    /// Base64 JPEG bytes.
    pub image_data: String,
}

/// A fixed-size chunk of a knowledge source with its embedding.
#[derive(Debug, Clone)]
pub struct KnowledgeChunk {
    pub id: String,
    pub source_name: String,
    pub chunk_index: i64,
    pub content: String,
    pub category_id: Option<i64>,
    pub embedding: Vec<f32>,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnowledgeCategory {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub default_enabled: bool,
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserKnowledgePreference {
    pub user_id: String,
    pub category_id: i64,
    pub category_slug: String,
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_number_from_extractor_names() {
        assert_eq!(Frame::number_from_file_name("frame_0001.jpg"), Some(1));
        assert_eq!(Frame::number_from_file_name("frame_0042.jpg"), Some(42));
        assert_eq!(Frame::number_from_file_name("frame_12345.jpg"), Some(12345));
        assert_eq!(Frame::number_from_file_name("thumbnail.jpg"), None);
        assert_eq!(Frame::number_from_file_name("frame_.jpg"), None);
        assert_eq!(Frame::number_from_file_name("frame_00a1.jpg"), None);
        assert_eq!(Frame::number_from_file_name("frame_0001.png"), None);
    }

    #[test]
    fn analysis_context_skips_blank_fields() {
        let audit = Audit {
            id: "a".into(),
            user_id: None,
            title: Some("Checkout flow".into()),
            description: Some("   ".into()),
            video_path: PathBuf::from("v.mp4"),
            thumbnail: None,
            status: AuditStatus::Pending,
            stage: ProcessingStage::Uploaded,
            report: None,
            score: None,
            error_message: None,
            created_at: 0,
            updated_at: 0,
        };
        assert_eq!(audit.analysis_context(), "UX audit of Checkout flow");
    }

    #[test]
    fn report_serializes_canonical_keys() {
        let report = Report {
            workflow_summary: WorkflowSummary {
                workflow_title: "Signup".into(),
                user_goal: "Create an account".into(),
                workflow_steps: vec!["Open form".into()],
                total_frames_analyzed: "12".into(),
                summary: None,
                workflow_criticality: None,
            },
            identified_issues: vec![Issue {
                frame_reference: "Frame 3".into(),
                pain_point_title: "Submit button hidden".into(),
                severity: Severity::High,
                issue_description: "The submit button is below the fold.".into(),
                recommendations: vec!["Move it up".into()],
                heuristic_violated: None,
                impact_score: None,
            }],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["workflowSummary"]["workflowtitle"].is_string());
        assert!(json["workflowSummary"]["totalFramesAnalyzed"].is_string());
        assert_eq!(json["identifiedIssues"][0]["severity"], "High");
        assert!(json["identifiedIssues"][0].get("heuristicViolated").is_none());
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in ["pending", "processing", "completed", "failed"] {
            assert_eq!(s.parse::<AuditStatus>().unwrap().as_str(), s);
        }
        assert!("done".parse::<AuditStatus>().is_err());
    }
}
