//! Turning free-form model replies into the canonical report.
//!
//! # Pipeline
//!
//! 1. [`extract_json`] takes the substring from the first `{` to the last
//!    `}` so prose around the payload is tolerated.
//! 2. [`ResponseShape::classify`] sorts the parsed value into a canonical
//!    report, a known alternate shape, or something unparseable.
//! 3. [`ResponseShape::remap`] rewrites alternates into canonical keys.
//! 4. Missing top-level keys fail with [`SchemaError::MissingKeys`].
//! 5. [`quality_score`] rates the remapped payload (0–100).
//! 6. Issues are normalized into [`Issue`] values with placeholders for
//!    absent fields.
//!
//! [`ensure_grounded`] is a separate check that rejects a report whose
//! every issue is generic, which is how replies describing a hypothetical
//! interface instead of the supplied frames are caught.

use serde_json::{Map, Value};

use crate::error::{AuditError, SchemaError};
use crate::issue_filter::UI_ELEMENTS;
use crate::models::{Issue, Report, Severity, WorkflowSummary, NIELSEN_HEURISTICS};

pub const SUMMARY_KEY: &str = "workflowSummary";
pub const ISSUES_KEY: &str = "identifiedIssues";

pub const REQUIRED_SUMMARY_FIELDS: [&str; 4] = [
    "workflowtitle",
    "userGoal",
    "workflowSteps",
    "totalFramesAnalyzed",
];

pub const REQUIRED_ISSUE_FIELDS: [&str; 5] = [
    "frameReference",
    "painPointTitle",
    "severity",
    "issueDescription",
    "recommendations",
];

pub const OPTIONAL_ISSUE_FIELDS: [&str; 2] = ["heuristicViolated", "impactScore"];

pub const FRAME_PLACEHOLDER: &str = "Frame not specified";
pub const TITLE_PLACEHOLDER: &str = "Untitled Issue";
const WORKFLOW_TITLE_PLACEHOLDER: &str = "Untitled Workflow";
const NOT_SPECIFIED: &str = "Not specified";

const SUMMARY_ALIASES: [&str; 2] = ["workflow_summary", "summary"];
/// Alternate issue-list keys, concatenated in this order when remapping.
const ISSUE_ALIASES: [&str; 4] = [
    "identified_issues",
    "commonIssues",
    "issues",
    "holisticRecommendations",
];

const WEIGHT_COMPLETENESS: f64 = 0.30;
const WEIGHT_SPECIFICITY: f64 = 0.25;
const WEIGHT_ACTIONABILITY: f64 = 0.25;
const WEIGHT_CONSISTENCY: f64 = 0.20;

/// Titles shorter than this count as generic.
const MIN_GROUNDED_TITLE_CHARS: usize = 10;

const WORKFLOW_VOCABULARY: [&str; 30] = [
    "screen", "page", "modal", "dialog", "tab", "toggle", "card", "banner", "toast", "tooltip",
    "header", "navigation", "sidebar", "search", "spinner", "loading", "error", "message", "step",
    "disabled", "selected", "empty", "scroll", "click", "tap", "submit", "text", "image", "list",
    "cart",
];

/// Locate and parse the JSON object embedded in a model reply.
pub fn extract_json(raw: &str) -> Result<Value, SchemaError> {
    let start = raw.find('{').ok_or(SchemaError::NoJsonObject)?;
    let end = raw.rfind('}').ok_or(SchemaError::NoJsonObject)?;
    if end < start {
        return Err(SchemaError::NoJsonObject);
    }
    serde_json::from_str(&raw[start..=end]).map_err(|e| SchemaError::InvalidJson(e.to_string()))
}

/// Known non-canonical layouts a model reply may use.
#[derive(Debug, Clone, PartialEq)]
pub enum AlternateShape {
    /// A single wrapper key whose value holds the canonical keys.
    Wrapped { key: String },
    /// Workflow-summary fields inlined at the top level.
    Flattened,
    /// Canonical structure under alias key names.
    Renamed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseShape {
    Canonical(Map<String, Value>),
    Alternate(AlternateShape, Map<String, Value>),
    Unparseable(Value),
}

impl ResponseShape {
    pub fn classify(value: Value) -> Self {
        let Value::Object(obj) = value else {
            return ResponseShape::Unparseable(value);
        };

        if obj.contains_key(SUMMARY_KEY) && obj.contains_key(ISSUES_KEY) {
            return ResponseShape::Canonical(obj);
        }

        if obj.len() == 1 {
            if let Some((key, Value::Object(inner))) = obj.iter().next() {
                if inner.contains_key(SUMMARY_KEY) && inner.contains_key(ISSUES_KEY) {
                    let key = key.clone();
                    return ResponseShape::Alternate(AlternateShape::Wrapped { key }, obj);
                }
            }
        }

        let has_summary = obj.contains_key(SUMMARY_KEY)
            || SUMMARY_ALIASES
                .iter()
                .any(|k| obj.get(*k).map(Value::is_object).unwrap_or(false));
        let has_issues =
            obj.contains_key(ISSUES_KEY) || ISSUE_ALIASES.iter().any(|k| obj.contains_key(*k));
        let has_inline_summary = REQUIRED_SUMMARY_FIELDS
            .iter()
            .chain(["workflowTitle"].iter())
            .any(|k| obj.contains_key(*k));

        if !has_summary && has_inline_summary {
            return ResponseShape::Alternate(AlternateShape::Flattened, obj);
        }
        if has_summary || has_issues {
            return ResponseShape::Alternate(AlternateShape::Renamed, obj);
        }
        ResponseShape::Unparseable(Value::Object(obj))
    }

    pub fn is_canonical(&self) -> bool {
        matches!(self, ResponseShape::Canonical(_))
    }

    /// Rewrite into canonical keys.
    ///
    /// Total over every variant: an alternate that lacks a piece simply
    /// leaves that key out, and [`require_keys`] reports it afterwards.
    pub fn remap(self) -> Result<Map<String, Value>, SchemaError> {
        match self {
            ResponseShape::Canonical(obj) => Ok(obj),
            ResponseShape::Unparseable(Value::Object(_)) => Err(SchemaError::MissingKeys(vec![
                SUMMARY_KEY.to_string(),
                ISSUES_KEY.to_string(),
            ])),
            ResponseShape::Unparseable(_) => Err(SchemaError::NotAnObject),
            ResponseShape::Alternate(AlternateShape::Wrapped { key }, mut obj) => {
                match obj.remove(&key) {
                    Some(Value::Object(inner)) => Ok(inner),
                    _ => Err(SchemaError::NotAnObject),
                }
            }
            ResponseShape::Alternate(AlternateShape::Flattened, mut obj) => {
                let mut out = Map::new();
                if let Some(issues) = take_issues(&mut obj) {
                    out.insert(ISSUES_KEY.to_string(), issues);
                }
                out.insert(SUMMARY_KEY.to_string(), Value::Object(obj));
                Ok(out)
            }
            ResponseShape::Alternate(AlternateShape::Renamed, mut obj) => {
                let mut out = Map::new();
                let summary = obj.remove(SUMMARY_KEY).or_else(|| {
                    SUMMARY_ALIASES
                        .iter()
                        .find_map(|k| obj.remove(*k).filter(Value::is_object))
                });
                if let Some(summary) = summary {
                    out.insert(SUMMARY_KEY.to_string(), summary);
                }
                if let Some(issues) = take_issues(&mut obj) {
                    out.insert(ISSUES_KEY.to_string(), issues);
                }
                Ok(out)
            }
        }
    }
}

fn take_issues(obj: &mut Map<String, Value>) -> Option<Value> {
    if let Some(issues) = obj.remove(ISSUES_KEY) {
        return Some(issues);
    }
    let mut merged = Vec::new();
    let mut found = false;
    for key in ISSUE_ALIASES {
        match obj.remove(key) {
            Some(Value::Array(items)) => {
                found = true;
                merged.extend(items);
            }
            Some(other) => {
                found = true;
                merged.push(other);
            }
            None => {}
        }
    }
    found.then_some(Value::Array(merged))
}

/// Fail unless both canonical top-level keys are present.
pub fn require_keys(obj: &Map<String, Value>) -> Result<(), SchemaError> {
    let missing: Vec<String> = [SUMMARY_KEY, ISSUES_KEY]
        .iter()
        .filter(|k| obj.get(**k).map(Value::is_null).unwrap_or(true))
        .map(|k| k.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(SchemaError::MissingKeys(missing))
    }
}

/// A validated reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedResponse {
    pub report: Report,
    /// Weighted quality score, 0–100, two decimals.
    pub quality_score: f64,
    /// True when the reply needed remapping from an alternate shape.
    pub remapped: bool,
}

/// Validate a free-text model reply.
pub fn parse_text_response(raw: &str) -> Result<ValidatedResponse, SchemaError> {
    validate_value(extract_json(raw)?)
}

/// Validate a function-call `arguments` string.
///
/// With `strict`, every issue must carry a severity of exactly
/// `High`/`Medium`/`Low`, an `impactScore` within 1–10, and one of the ten
/// Nielsen heuristics.
pub fn parse_function_call(arguments: &str, strict: bool) -> Result<ValidatedResponse, SchemaError> {
    let value: Value =
        serde_json::from_str(arguments).map_err(|e| SchemaError::InvalidJson(e.to_string()))?;
    if strict {
        check_strict(&value)?;
    }
    validate_value(value)
}

fn check_strict(value: &Value) -> Result<(), SchemaError> {
    let Some(issues) = value.get(ISSUES_KEY).and_then(Value::as_array) else {
        return Ok(());
    };
    for (i, issue) in issues.iter().enumerate() {
        let invalid = |field: &str, reason: String| SchemaError::InvalidField {
            field: format!("{}[{}].{}", ISSUES_KEY, i, field),
            reason,
        };

        let severity = issue.get("severity").and_then(Value::as_str).unwrap_or("");
        if !["High", "Medium", "Low"].contains(&severity) {
            return Err(invalid("severity", format!("{:?} is not High/Medium/Low", severity)));
        }

        match issue.get("impactScore").and_then(Value::as_f64) {
            Some(score) if (1.0..=10.0).contains(&score) => {}
            Some(score) => return Err(invalid("impactScore", format!("{} is outside 1-10", score))),
            None => return Err(invalid("impactScore", "missing".to_string())),
        }

        let heuristic = issue
            .get("heuristicViolated")
            .and_then(Value::as_str)
            .unwrap_or("");
        if !NIELSEN_HEURISTICS.contains(&heuristic) {
            return Err(invalid(
                "heuristicViolated",
                format!("{:?} is not a Nielsen heuristic", heuristic),
            ));
        }
    }
    Ok(())
}

/// Classify, remap, check, score and normalize a parsed reply.
pub fn validate_value(value: Value) -> Result<ValidatedResponse, SchemaError> {
    let shape = ResponseShape::classify(value);
    let remapped = !shape.is_canonical();
    let obj = shape.remap()?;
    require_keys(&obj)?;

    let quality_score = quality_score(&obj);
    let report = normalize(&obj)?;

    Ok(ValidatedResponse {
        report,
        quality_score,
        remapped,
    })
}

/// Weighted 0–100 quality score of a canonical-keyed payload.
///
/// | Sub-score | Weight | Measures |
/// |-----------|--------|----------|
/// | completeness | 0.30 | workflow-summary fields present |
/// | specificity | 0.25 | issues with a frame ref, a description over 50 chars, and a named principle |
/// | actionability | 0.25 | issues with ≥2 recommendations, one over 20 chars |
/// | consistency | 0.20 | issues with the required keys and no keys outside the issue shape |
pub fn quality_score(obj: &Map<String, Value>) -> f64 {
    let empty = Vec::new();
    let issues = obj
        .get(ISSUES_KEY)
        .and_then(Value::as_array)
        .unwrap_or(&empty);

    let completeness = match obj.get(SUMMARY_KEY).and_then(Value::as_object) {
        Some(summary) => {
            let present = REQUIRED_SUMMARY_FIELDS
                .iter()
                .filter(|k| summary.get(**k).map(|v| !v.is_null()).unwrap_or(false))
                .count();
            present as f64 / REQUIRED_SUMMARY_FIELDS.len() as f64
        }
        None => 0.0,
    };

    let specificity = fraction(issues, 0.0, |issue| {
        let frame_ok = str_field(issue, "frameReference")
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false);
        let description = str_field(issue, "issueDescription").unwrap_or("");
        let names_principle = description.to_lowercase().contains("violat")
            || str_field(issue, "heuristicViolated")
                .map(|s| !s.trim().is_empty())
                .unwrap_or(false);
        frame_ok && description.chars().count() > 50 && names_principle
    });

    let actionability = fraction(issues, 0.0, |issue| {
        match issue.get("recommendations").and_then(Value::as_array) {
            Some(recs) => {
                recs.len() >= 2
                    && recs
                        .iter()
                        .any(|r| r.as_str().map(|s| s.chars().count() > 20).unwrap_or(false))
            }
            None => false,
        }
    });

    let consistency = fraction(issues, 1.0, |issue| {
        REQUIRED_ISSUE_FIELDS.iter().all(|k| issue.contains_key(*k))
            && issue.keys().all(|k| {
                REQUIRED_ISSUE_FIELDS.contains(&k.as_str())
                    || OPTIONAL_ISSUE_FIELDS.contains(&k.as_str())
            })
    });

    let weighted = completeness * WEIGHT_COMPLETENESS
        + specificity * WEIGHT_SPECIFICITY
        + actionability * WEIGHT_ACTIONABILITY
        + consistency * WEIGHT_CONSISTENCY;
    (weighted * 100.0 * 100.0).round() / 100.0
}

/// Share of object issues satisfying `pred`; `if_empty` for an empty list.
fn fraction(issues: &[Value], if_empty: f64, pred: impl Fn(&Map<String, Value>) -> bool) -> f64 {
    if issues.is_empty() {
        return if_empty;
    }
    let hits = issues
        .iter()
        .filter(|i| i.as_object().map(&pred).unwrap_or(false))
        .count();
    hits as f64 / issues.len() as f64
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| non_empty_string(Some(v)))
            .collect(),
        Some(v) => non_empty_string(Some(v)).into_iter().collect(),
        None => Vec::new(),
    }
}

fn normalize(obj: &Map<String, Value>) -> Result<Report, SchemaError> {
    let summary = obj
        .get(SUMMARY_KEY)
        .and_then(Value::as_object)
        .ok_or_else(|| SchemaError::InvalidField {
            field: SUMMARY_KEY.to_string(),
            reason: "expected an object".to_string(),
        })?;
    let issues = obj
        .get(ISSUES_KEY)
        .and_then(Value::as_array)
        .ok_or_else(|| SchemaError::InvalidField {
            field: ISSUES_KEY.to_string(),
            reason: "expected an array".to_string(),
        })?;

    let workflow_summary = WorkflowSummary {
        workflow_title: non_empty_string(
            summary
                .get("workflowtitle")
                .or_else(|| summary.get("workflowTitle")),
        )
        .unwrap_or_else(|| WORKFLOW_TITLE_PLACEHOLDER.to_string()),
        user_goal: non_empty_string(summary.get("userGoal"))
            .unwrap_or_else(|| NOT_SPECIFIED.to_string()),
        workflow_steps: string_list(summary.get("workflowSteps")),
        total_frames_analyzed: non_empty_string(summary.get("totalFramesAnalyzed"))
            .unwrap_or_else(|| NOT_SPECIFIED.to_string()),
        summary: non_empty_string(summary.get("summary")),
        workflow_criticality: non_empty_string(summary.get("workflowCriticality")),
    };

    let identified_issues = issues
        .iter()
        .filter_map(Value::as_object)
        .map(normalize_issue)
        .collect();

    Ok(Report {
        workflow_summary,
        identified_issues,
    })
}

fn normalize_issue(issue: &Map<String, Value>) -> Issue {
    let frame_reference = match issue.get("frameReference") {
        Some(Value::Number(n)) => format!("Frame {}", n),
        other => non_empty_string(other).unwrap_or_else(|| FRAME_PLACEHOLDER.to_string()),
    };

    let pain_point_title = non_empty_string(issue.get("painPointTitle"))
        .or_else(|| non_empty_string(issue.get("title")))
        .unwrap_or_else(|| TITLE_PLACEHOLDER.to_string());

    let severity = issue
        .get("severity")
        .and_then(Value::as_str)
        .and_then(Severity::parse_lenient)
        .unwrap_or(Severity::Medium);

    let issue_description = non_empty_string(issue.get("issueDescription"))
        .or_else(|| non_empty_string(issue.get("description")))
        .unwrap_or_default();

    let impact_score = issue
        .get("impactScore")
        .and_then(Value::as_f64)
        .map(|s| s.round().clamp(1.0, 10.0) as u8);

    Issue {
        frame_reference,
        pain_point_title,
        severity,
        issue_description,
        recommendations: string_list(issue.get("recommendations")),
        heuristic_violated: non_empty_string(issue.get("heuristicViolated")),
        impact_score,
    }
}

/// Whether an issue carries nothing tying it to the supplied frames.
pub fn is_generic(issue: &Issue) -> bool {
    let frame = issue.frame_reference.trim();
    let vague_frame = frame.is_empty()
        || frame == FRAME_PLACEHOLDER
        || !frame.chars().any(|c| c.is_ascii_digit());

    let title = issue.pain_point_title.trim();
    let vague_title = title == TITLE_PLACEHOLDER || title.chars().count() < MIN_GROUNDED_TITLE_CHARS;

    let description = issue.issue_description.to_lowercase();
    let concrete = UI_ELEMENTS
        .iter()
        .chain(WORKFLOW_VOCABULARY.iter())
        .any(|w| description.contains(w));

    vague_frame || vague_title || !concrete
}

/// Reject a report in which every issue is generic.
///
/// A report with no issues passes; there is nothing to judge.
pub fn ensure_grounded(report: &Report) -> Result<(), AuditError> {
    let issues = &report.identified_issues;
    if !issues.is_empty() && issues.iter().all(is_generic) {
        return Err(AuditError::Quality(format!(
            "all {} issue(s) are generic and not grounded in the supplied frames",
            issues.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn canonical() -> Value {
        json!({
            "workflowSummary": {
                "workflowtitle": "Checkout",
                "userGoal": "Buy a gift card",
                "workflowSteps": ["Open cart", "Enter card details"],
                "totalFramesAnalyzed": 20
            },
            "identifiedIssues": [{
                "frameReference": "Frames 12-14",
                "painPointTitle": "Pay button hidden below fold",
                "severity": "high",
                "issueDescription": "This violates visibility of system status: the pay button \
                                     is rendered below the fold on the payment screen.",
                "recommendations": [
                    "Pin the pay button to the bottom of the viewport",
                    "Reduce the order summary height"
                ]
            }]
        })
    }

    #[test]
    fn extracts_json_wrapped_in_prose() {
        let raw = format!("Here is the analysis: {} Thanks!", canonical());
        let validated = parse_text_response(&raw).unwrap();
        assert!(!validated.remapped);
        assert_eq!(validated.report.identified_issues.len(), 1);
        assert_eq!(validated.report.identified_issues[0].severity, Severity::High);
        assert_eq!(validated.report.workflow_summary.total_frames_analyzed, "20");
    }

    #[test]
    fn missing_braces_fail_cleanly() {
        assert_eq!(extract_json("no json here"), Err(SchemaError::NoJsonObject));
        assert_eq!(extract_json("} backwards {"), Err(SchemaError::NoJsonObject));
        assert!(matches!(
            extract_json("{ not json }"),
            Err(SchemaError::InvalidJson(_))
        ));
    }

    #[test]
    fn common_issues_is_remapped() {
        let mut value = canonical();
        let issues = value.as_object_mut().unwrap().remove("identifiedIssues").unwrap();
        value["commonIssues"] = issues;
        let validated = validate_value(value).unwrap();
        assert!(validated.remapped);
        assert_eq!(validated.report.identified_issues.len(), 1);
    }

    #[test]
    fn holistic_recommendations_merge_after_common_issues() {
        let value = json!({
            "workflowSummary": {"workflowtitle": "t"},
            "commonIssues": [{"painPointTitle": "A"}],
            "holisticRecommendations": [{"painPointTitle": "B"}]
        });
        let report = validate_value(value).unwrap().report;
        let titles: Vec<&str> = report
            .identified_issues
            .iter()
            .map(|i| i.pain_point_title.as_str())
            .collect();
        assert_eq!(titles, vec!["A", "B"]);
    }

    #[test]
    fn single_key_wrapper_is_unwrapped() {
        let value = json!({ "analysis": canonical() });
        let shape = ResponseShape::classify(value.clone());
        assert_eq!(
            shape,
            ResponseShape::Alternate(
                AlternateShape::Wrapped {
                    key: "analysis".into()
                },
                value.as_object().unwrap().clone()
            )
        );
        assert!(validate_value(value).unwrap().remapped);
    }

    #[test]
    fn flattened_summary_is_regrouped() {
        let value = json!({
            "workflowtitle": "Signup",
            "userGoal": "Create account",
            "workflowSteps": ["Open form"],
            "totalFramesAnalyzed": "8",
            "identifiedIssues": []
        });
        let validated = validate_value(value).unwrap();
        assert_eq!(validated.report.workflow_summary.workflow_title, "Signup");
        assert!(validated.report.identified_issues.is_empty());
    }

    #[test]
    fn unresolvable_shapes_are_schema_errors() {
        assert_eq!(
            validate_value(json!({"workflowSummary": {}})),
            Err(SchemaError::MissingKeys(vec!["identifiedIssues".into()]))
        );
        assert!(matches!(
            validate_value(json!({"foo": 1, "bar": 2})),
            Err(SchemaError::MissingKeys(_))
        ));
        assert_eq!(validate_value(json!([1, 2])), Err(SchemaError::NotAnObject));
    }

    #[test]
    fn issues_are_normalized_with_placeholders() {
        let value = json!({
            "workflowSummary": {},
            "identifiedIssues": [{"severity": "critical", "recommendations": "Add a label"}]
        });
        let issue = &validate_value(value).unwrap().report.identified_issues[0];
        assert_eq!(issue.frame_reference, FRAME_PLACEHOLDER);
        assert_eq!(issue.pain_point_title, TITLE_PLACEHOLDER);
        assert_eq!(issue.severity, Severity::Medium);
        assert_eq!(issue.recommendations, vec!["Add a label".to_string()]);
    }

    #[test]
    fn quality_score_weights() {
        // complete summary, specific, actionable, consistent
        let obj = canonical().as_object().unwrap().clone();
        assert_eq!(quality_score(&obj), 100.0);

        // summary only, no issues: 0.30 + consistency 0.20
        let obj = json!({"workflowSummary": canonical()["workflowSummary"], "identifiedIssues": []});
        assert_eq!(quality_score(obj.as_object().unwrap()), 50.0);

        // half the summary, one issue with an extra key and one recommendation
        let obj = json!({
            "workflowSummary": {"workflowtitle": "x", "userGoal": "y"},
            "identifiedIssues": [{
                "frameReference": "Frame 2",
                "painPointTitle": "t",
                "severity": "Low",
                "issueDescription": "short",
                "recommendations": ["one"],
                "extra": true
            }]
        });
        assert_eq!(quality_score(obj.as_object().unwrap()), 15.0);
    }

    #[test]
    fn optional_issue_keys_keep_consistency() {
        let mut obj = canonical();
        obj["identifiedIssues"][0]["heuristicViolated"] = json!("Visibility of system status");
        obj["identifiedIssues"][0]["impactScore"] = json!(8);
        assert_eq!(quality_score(obj.as_object().unwrap()), 100.0);

        obj["identifiedIssues"][0]["notes"] = json!("unrequested");
        assert_eq!(quality_score(obj.as_object().unwrap()), 80.0);
    }

    #[test]
    fn strict_function_call_rejects_out_of_enum_values() {
        let mut args = canonical();
        args["identifiedIssues"][0]["severity"] = json!("High");
        args["identifiedIssues"][0]["impactScore"] = json!(7);
        args["identifiedIssues"][0]["heuristicViolated"] = json!("Error prevention");
        assert!(parse_function_call(&args.to_string(), true).is_ok());

        let mut bad = args.clone();
        bad["identifiedIssues"][0]["impactScore"] = json!(11);
        assert!(matches!(
            parse_function_call(&bad.to_string(), true),
            Err(SchemaError::InvalidField { .. })
        ));
        assert!(parse_function_call(&bad.to_string(), false).is_ok());

        let mut bad = args.clone();
        bad["identifiedIssues"][0]["heuristicViolated"] = json!("Be nice");
        assert!(parse_function_call(&bad.to_string(), true).is_err());

        let mut bad = args;
        bad["identifiedIssues"][0]["severity"] = json!("high");
        assert!(parse_function_call(&bad.to_string(), true).is_err());
    }

    #[test]
    fn all_generic_reports_are_rejected() {
        let generic = Issue {
            frame_reference: FRAME_PLACEHOLDER.into(),
            pain_point_title: "Bad UX".into(),
            severity: Severity::Medium,
            issue_description: "Users might be confused.".into(),
            recommendations: vec![],
            heuristic_violated: None,
            impact_score: None,
        };
        let grounded = validate_value(canonical()).unwrap().report.identified_issues[0].clone();
        assert!(is_generic(&generic));
        assert!(!is_generic(&grounded));

        let mut report = validate_value(canonical()).unwrap().report;
        report.identified_issues = vec![generic.clone(), generic.clone()];
        assert!(matches!(ensure_grounded(&report), Err(AuditError::Quality(_))));

        report.identified_issues.push(grounded);
        assert!(ensure_grounded(&report).is_ok());

        report.identified_issues.clear();
        assert!(ensure_grounded(&report).is_ok());
    }
}
