//! Workflow criticality classification.
//!
//! An audit's title and description are matched against keyword lists to
//! place the recorded workflow in one of four tiers. The tier calibrates how
//! severe the same kind of defect is rated: a blocking bug in checkout is
//! more serious than one on an FAQ page.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkflowCriticality {
    BusinessCritical,
    HighImpact,
    Standard,
    LowImpact,
}

impl WorkflowCriticality {
    pub fn label(&self) -> &'static str {
        match self {
            WorkflowCriticality::BusinessCritical => "Business-Critical",
            WorkflowCriticality::HighImpact => "High-Impact",
            WorkflowCriticality::Standard => "Standard",
            WorkflowCriticality::LowImpact => "Low-Impact",
        }
    }
}

impl fmt::Display for WorkflowCriticality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

const BUSINESS_CRITICAL: &[&str] = &[
    "checkout",
    "payment",
    "pay",
    "purchase",
    "buy",
    "order",
    "signup",
    "sign up",
    "register",
    "registration",
    "login",
    "log in",
    "sign in",
    "auth",
    "cart",
    "billing",
    "subscription",
    "credit card",
];

const HIGH_IMPACT: &[&str] = &[
    "onboarding",
    "search",
    "filter",
    "core feature",
    "dashboard",
    "upload",
    "create",
    "main flow",
    "navigation",
    "browse",
    "discover",
    "recommendation",
];

const LOW_IMPACT: &[&str] = &[
    "help",
    "about",
    "faq",
    "footer",
    "privacy",
    "terms",
    "contact",
    "support",
    "documentation",
];

/// Whole-word (or whole-phrase) alternation, also accepting a plural `s`.
/// Phrase words may be separated by any run of non-word characters.
fn keyword_regex(keywords: &[&str]) -> Regex {
    let alternatives: Vec<String> = keywords
        .iter()
        .map(|kw| regex::escape(kw).replace(' ', r"\W+"))
        .collect();
    Regex::new(&format!(r"(?i)\b(?:{})s?\b", alternatives.join("|"))).expect("valid regex")
}

/// Tier patterns in priority order.
fn tier_patterns() -> &'static [(Regex, WorkflowCriticality)] {
    static PATTERNS: OnceLock<Vec<(Regex, WorkflowCriticality)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            (keyword_regex(BUSINESS_CRITICAL), WorkflowCriticality::BusinessCritical),
            (keyword_regex(HIGH_IMPACT), WorkflowCriticality::HighImpact),
            (keyword_regex(LOW_IMPACT), WorkflowCriticality::LowImpact),
        ]
    })
}

/// Classify a workflow from its title and description.
///
/// Tiers are checked in priority order: Business-Critical, High-Impact,
/// Low-Impact. Settings-style flows and anything unmatched are Standard.
pub fn classify_workflow(title: Option<&str>, description: Option<&str>) -> WorkflowCriticality {
    let text = format!(
        "{} {}",
        title.unwrap_or_default(),
        description.unwrap_or_default()
    );

    tier_patterns()
        .iter()
        .find(|(re, _)| re.is_match(&text))
        .map(|(_, tier)| *tier)
        .unwrap_or(WorkflowCriticality::Standard)
}

/// Severity to assign per defect category within a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeverityGuidelines {
    pub blocking: &'static str,
    pub confusing: &'static str,
    pub minor_friction: &'static str,
    pub cosmetic: &'static str,
}

pub fn severity_guidelines(tier: WorkflowCriticality) -> SeverityGuidelines {
    match tier {
        WorkflowCriticality::BusinessCritical => SeverityGuidelines {
            blocking: "High",
            confusing: "High",
            minor_friction: "Medium",
            cosmetic: "Low-Medium",
        },
        WorkflowCriticality::HighImpact => SeverityGuidelines {
            blocking: "High",
            confusing: "Medium-High",
            minor_friction: "Medium",
            cosmetic: "Low",
        },
        WorkflowCriticality::Standard => SeverityGuidelines {
            blocking: "Medium-High",
            confusing: "Medium",
            minor_friction: "Low-Medium",
            cosmetic: "Low",
        },
        WorkflowCriticality::LowImpact => SeverityGuidelines {
            blocking: "Medium",
            confusing: "Low-Medium",
            minor_friction: "Low",
            cosmetic: "Low",
        },
    }
}
