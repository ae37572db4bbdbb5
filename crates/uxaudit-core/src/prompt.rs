//! Prompt construction for batch analysis and synthesis.
//!
//! [`PromptBuilder`] is built once per audit from [`PromptSettings`] (taken
//! from the loaded configuration) and the audit's
//! [`WorkflowCriticality`]. It produces [`Prompt`] values that carry the
//! system and user text plus the frame numbers whose images the caller
//! attaches. Models whose name starts with `gpt-5` get the richer
//! step-by-step system message and, when enabled, the
//! `analyze_ux_workflow` function schema.

use serde_json::{json, Value};

use crate::models::{Batch, NIELSEN_HEURISTICS};
use crate::workflow::{severity_guidelines, WorkflowCriticality};

pub const FUNCTION_NAME: &str = "analyze_ux_workflow";

/// Batches at or below this size are sent with high image detail.
pub const HIGH_DETAIL_MAX_FRAMES: usize = 10;

const BATCH_SEPARATOR: &str = "\n\n---\n\n";

/// Model-facing settings, copied out of the loaded configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub function_calling: bool,
}

impl PromptSettings {
    /// Whether the model gets the advanced prompt tier.
    pub fn is_advanced(&self) -> bool {
        self.model.starts_with("gpt-5")
    }

    pub fn uses_function_calling(&self) -> bool {
        self.function_calling && self.is_advanced()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageDetail {
    High,
    Low,
}

impl ImageDetail {
    pub fn for_batch_len(frames: usize) -> Self {
        if frames <= HIGH_DETAIL_MAX_FRAMES {
            ImageDetail::High
        } else {
            ImageDetail::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageDetail::High => "high",
            ImageDetail::Low => "low",
        }
    }
}

/// A ready-to-send prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user_text: String,
    /// Frames whose images follow the user text, in order.
    pub frame_numbers: Vec<u32>,
    pub image_detail: ImageDetail,
    /// Request the `analyze_ux_workflow` function instead of free text.
    pub function_call: bool,
}

/// One completed batch output handed to synthesis.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub batch_index: usize,
    pub first_frame: u32,
    pub last_frame: u32,
    /// Validated report JSON for the batch.
    pub json: String,
}

pub struct PromptBuilder {
    settings: PromptSettings,
    criticality: WorkflowCriticality,
}

impl PromptBuilder {
    pub fn new(settings: PromptSettings, criticality: WorkflowCriticality) -> Self {
        Self {
            settings,
            criticality,
        }
    }

    pub fn settings(&self) -> &PromptSettings {
        &self.settings
    }

    pub fn criticality(&self) -> WorkflowCriticality {
        self.criticality
    }

    /// System message, with the knowledge section appended when non-empty.
    pub fn system_message(&self, knowledge: &str) -> String {
        let base = if self.settings.is_advanced() {
            ADVANCED_SYSTEM
        } else {
            STANDARD_SYSTEM
        };
        if knowledge.trim().is_empty() {
            return base.to_string();
        }
        format!(
            "{}\n\n=== REFERENCE MATERIALS ===\n\
             The following curated UX knowledge was selected from the user's enabled \
             categories. Treat it as authoritative background, but only report issues \
             that are visible in the supplied frames.\n\n{}\n\n===========================",
            base,
            knowledge.trim()
        )
    }

    /// Prompt for one batch of frames.
    pub fn batch_prompt(&self, batch: &Batch, total_frames: usize, knowledge: &str) -> Prompt {
        let numbers = batch.frame_numbers();
        let first = batch.first_number().unwrap_or(0);
        let last = batch.last_number().unwrap_or(0);
        let listed = numbers
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(", ");

        let mut text = format!(
            "Analyze frames {}-{} of {} from a recording of a user workflow.\n\n\
             Frames in this batch: {}.\n\
             Each image is preceded by its frame label. Reference only these frame numbers in \
             `frameReference`; never cite a frame that is not in this batch.\n\n",
            first, last, total_frames, listed
        );

        if self.settings.is_advanced() {
            text.push_str(ADVANCED_STEPS);
            text.push_str("\n\n");
        }

        text.push_str(&self.severity_section());
        text.push_str("\n\n");
        text.push_str(INSTRUCTIONS);
        text.push_str("\n\n");
        text.push_str(&self.output_section());

        Prompt {
            system: self.system_message(knowledge),
            user_text: text,
            frame_numbers: numbers,
            image_detail: ImageDetail::for_batch_len(batch.frames.len()),
            function_call: self.settings.uses_function_calling(),
        }
    }

    /// Prompt that merges all batch outputs into one report.
    pub fn synthesis_prompt(
        &self,
        summaries: &[BatchSummary],
        total_frames: usize,
        knowledge: &str,
    ) -> Prompt {
        let batches = summaries
            .iter()
            .map(|s| {
                format!(
                    "Batch {} (frames {}-{}):\n{}",
                    s.batch_index + 1,
                    s.first_frame,
                    s.last_frame,
                    s.json
                )
            })
            .collect::<Vec<_>>()
            .join(BATCH_SEPARATOR);

        let text = format!(
            "Combine the following batch analyses into a single, unified UX audit report.\n\
             The batches are in chronological order and together cover {} frames. \
             This workflow is classified as {}.\n\n\
             ### BATCH ANALYSES ###\n{}\n\n\
             ### SYNTHESIS INSTRUCTIONS ###\n\
             1. Merge the workflow summaries into one description of the whole journey.\n\
             2. Combine issues that describe the same problem and drop duplicates.\n\
             3. Order issues by severity and impact.\n\
             4. Keep the original frame references and concrete descriptions.\n\
             5. Use consistent terminology and formatting.\n\n{}",
            total_frames,
            self.criticality,
            batches,
            self.output_section()
        );

        Prompt {
            system: self.system_message(knowledge),
            user_text: text,
            frame_numbers: Vec::new(),
            image_detail: ImageDetail::Low,
            function_call: self.settings.uses_function_calling(),
        }
    }

    fn severity_section(&self) -> String {
        let mut out = format!(
            "### CONTEXT-AWARE SEVERITY ###\n\
             This workflow is classified as {}. Rate the same kind of defect higher in \
             business-critical flows than in low-impact ones.\n",
            self.criticality
        );
        for (tier, examples) in [
            (
                WorkflowCriticality::BusinessCritical,
                "checkout, payment, signup, login",
            ),
            (
                WorkflowCriticality::HighImpact,
                "onboarding, core features, search",
            ),
            (
                WorkflowCriticality::Standard,
                "settings, profile, preferences",
            ),
            (WorkflowCriticality::LowImpact, "help, about, footer links"),
        ] {
            let g = severity_guidelines(tier);
            let marker = if tier == self.criticality {
                " (this workflow)"
            } else {
                ""
            };
            out.push_str(&format!(
                "\n**{}{}** ({}):\n\
                 - Blocking issues: {}\n\
                 - Confusing elements: {}\n\
                 - Minor friction: {}\n\
                 - Cosmetic issues: {}\n",
                tier, marker, examples, g.blocking, g.confusing, g.minor_friction, g.cosmetic
            ));
        }
        out.push_str(
            "\nSeverity in the output must still be exactly one of High, Medium or Low; \
             round mixed ratings such as Medium-High to the nearer end for the workflow.",
        );
        out
    }

    fn output_section(&self) -> String {
        if self.settings.uses_function_calling() {
            return format!(
                "### OUTPUT FORMAT ###\nCall the `{}` function with `workflowSummary` and \
                 `identifiedIssues`. Every issue needs `heuristicViolated` (one of Nielsen's \
                 ten heuristics) and an `impactScore` from 1 to 10.",
                FUNCTION_NAME
            );
        }
        let mut out = String::from(
            "### OUTPUT FORMAT ###\n\
             Respond with one valid JSON object and nothing else:\n\
             {\n  \"workflowSummary\": {\n    \"workflowtitle\": string,\n    \
             \"userGoal\": string,\n    \"workflowSteps\": [string],\n    \
             \"totalFramesAnalyzed\": string,\n    \"summary\": string\n  },\n  \
             \"identifiedIssues\": [{\n    \"frameReference\": \"Frame N\" or \"Frames N-M\",\n    \
             \"painPointTitle\": string,\n    \"severity\": \"High\" | \"Medium\" | \"Low\",\n    \
             \"issueDescription\": string,\n    \"recommendations\": [string],\n    \
             \"heuristicViolated\": string\n  }]\n}",
        );
        if self.settings.is_advanced() {
            out.push_str("\n\n### EXAMPLE ISSUE ###\n");
            out.push_str(EXAMPLE_ISSUE);
        }
        out
    }
}

/// JSON schema for the `analyze_ux_workflow` function.
pub fn function_schema() -> Value {
    json!({
        "name": FUNCTION_NAME,
        "description": "Analyze a recorded user workflow and report specific UX issues with recommendations",
        "parameters": {
            "type": "object",
            "properties": {
                "workflowSummary": {
                    "type": "object",
                    "properties": {
                        "workflowtitle": {"type": "string", "maxLength": 100},
                        "userGoal": {"type": "string"},
                        "summary": {"type": "string"},
                        "workflowSteps": {"type": "array", "items": {"type": "string"}},
                        "totalFramesAnalyzed": {"type": "string"},
                        "workflowCriticality": {
                            "type": "string",
                            "enum": ["Business-Critical", "High-Impact", "Standard", "Low-Impact"]
                        }
                    },
                    "required": ["workflowtitle", "userGoal", "workflowSteps", "totalFramesAnalyzed"]
                },
                "identifiedIssues": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "frameReference": {
                                "type": "string",
                                "description": "Frame numbers where the issue is visible, e.g. 'Frame 5' or 'Frames 12-14'"
                            },
                            "painPointTitle": {"type": "string"},
                            "severity": {"type": "string", "enum": ["High", "Medium", "Low"]},
                            "issueDescription": {"type": "string"},
                            "recommendations": {
                                "type": "array",
                                "items": {"type": "string"},
                                "minItems": 1,
                                "maxItems": 5
                            },
                            "heuristicViolated": {"type": "string", "enum": NIELSEN_HEURISTICS},
                            "impactScore": {"type": "number", "minimum": 1, "maximum": 10}
                        },
                        "required": [
                            "frameReference", "painPointTitle", "severity", "issueDescription",
                            "recommendations", "heuristicViolated", "impactScore"
                        ]
                    }
                }
            },
            "required": ["workflowSummary", "identifiedIssues"]
        }
    })
}

const STANDARD_SYSTEM: &str = "You are a principal UX analyst experienced in usability testing. \
Your findings are specific, actionable and grounded in established usability heuristics. \
You identify friction in user workflows, analyze interface design problems, give concrete \
recommendations, and calibrate severity to how critical the workflow is to the business.";

const ADVANCED_SYSTEM: &str = "You are a principal UX analyst with 15+ years of experience in \
user experience design and usability testing. Your findings are specific, actionable and grounded \
in Nielsen's 10 Usability Heuristics and Norman's design principles.\n\n\
Work through the recording with chain-of-thought reasoning before answering:\n\
1. Observe each frame in order and note user interactions and visible UI elements.\n\
2. Evaluate every interaction against Nielsen's heuristics.\n\
3. Weigh impact by user frustration, completion time, conversion and workflow criticality.\n\
4. Recommend concrete, implementable fixes with a clear rationale.\n\n\
Avoid generic advice. Every finding must point at something visible in a specific frame.";

const ADVANCED_STEPS: &str = "### THINKING PROCESS ###\n\
1. Frame sequence: follow the frames chronologically to reconstruct the journey.\n\
2. Interactions: identify clicks, scrolls, form inputs and state changes.\n\
3. Visual assessment: judge hierarchy, layout and information architecture.\n\
4. Heuristic evaluation: apply Nielsen's heuristics to each interaction.\n\
5. Impact: rate each issue by its effect on the user and the business.\n\
6. Solutions: give specific recommendations per issue.";

const INSTRUCTIONS: &str = "### INSTRUCTIONS ###\n\
1. Treat the frames as one user's journey over time.\n\
2. Report specific friction points, confusion or inefficiencies you can see.\n\
3. Name the violated Nielsen heuristic in `heuristicViolated`.\n\
4. In `issueDescription`, describe what actually happens on screen (e.g. \"No feedback after \
the Save button is pressed\"), referring to concrete UI elements.\n\
5. Give at least two concrete recommendations per issue.\n\
6. Do not describe hypothetical screens or features that are not shown.";

const EXAMPLE_ISSUE: &str = r#"{
  "frameReference": "Frames 8-10",
  "painPointTitle": "Card field error does not say what is wrong",
  "severity": "High",
  "issueDescription": "After submitting the payment form the card number field turns red, but no message explains whether the number is invalid or incomplete, so the user retypes it twice.",
  "recommendations": [
    "Show a field-specific message under the card number input",
    "Validate the card number while the user types"
  ],
  "heuristicViolated": "Help users recognize, diagnose, and recover from errors"
}"#;
