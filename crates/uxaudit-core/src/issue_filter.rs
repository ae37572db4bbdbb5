//! Per-issue quality scoring, threshold filtering, and near-duplicate removal.
//!
//! [`quality_score`] rates one issue on a 0–10 scale: it starts at 10,
//! subtracts for vague language and thin content, and adds for concrete
//! frame ranges, detailed recommendations and UI vocabulary.
//!
//! [`deduplicate_similar`] clusters issues by weighted Jaccard similarity of
//! their title and description tokens, comparing each issue only against a
//! cluster's first member.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use tracing::info;

use crate::models::{Issue, Severity};

pub const DEFAULT_MIN_QUALITY_SCORE: f64 = 6.0;

/// Title/description similarity above which two issues are duplicates.
pub const SIMILARITY_THRESHOLD: f64 = 0.6;

const TITLE_WEIGHT: f64 = 0.7;
const DESCRIPTION_WEIGHT: f64 = 0.3;

pub const GENERIC_PHRASES: [&str; 13] = [
    "lack of",
    "insufficient",
    "poor",
    "unclear",
    "should have",
    "could have",
    "missing",
    "no clear",
    "not enough",
    "limited",
    "inadequate",
    "vague",
    "ambiguous",
];

pub const UI_ELEMENTS: [&str; 11] = [
    "button", "input", "field", "menu", "dropdown", "icon", "label", "form", "link", "checkbox",
    "radio",
];

fn frame_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)frames?\s*\d+").expect("valid regex"))
}

fn frame_range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)frames?\s*\d+\s*[-–]\s*\d+").expect("valid regex"))
}

/// Score one issue on a 0–10 scale.
pub fn quality_score(issue: &Issue) -> f64 {
    let mut score = 10.0;

    let title_len = issue.pain_point_title.trim().chars().count();
    let description = issue.issue_description.to_lowercase();
    let description_len = description.chars().count();
    let frame_ref = issue.frame_reference.trim();
    let rec_count = issue.recommendations.len();

    let generic = GENERIC_PHRASES
        .iter()
        .filter(|p| description.contains(*p))
        .count();
    score -= generic as f64;

    if description_len < 50 {
        score -= 2.0;
    } else if description_len < 100 {
        score -= 1.0;
    }

    if frame_ref.is_empty() || frame_ref.to_lowercase().contains("not specified") {
        score -= 3.0;
    } else if !frame_number_re().is_match(frame_ref) {
        score -= 1.5;
    }

    match rec_count {
        0 => score -= 3.0,
        1 => score -= 1.5,
        _ => {}
    }

    if issue.severity == Severity::Low && description_len < 80 {
        score -= 2.0;
    }

    if title_len < 15 {
        score -= 1.0;
    }

    if frame_range_re().is_match(frame_ref) {
        score += 1.0;
    }

    if rec_count >= 3 {
        score += 1.5;
    } else if rec_count >= 2 {
        score += 0.5;
    }

    if description_len > 150 {
        score += 1.0;
    } else if description_len > 100 {
        score += 0.5;
    }

    if UI_ELEMENTS.iter().any(|e| description.contains(e)) {
        score += 1.0;
    }

    f64::clamp(score, 0.0, 10.0)
}

/// Keep issues scoring at least `min_score`, preserving order.
pub fn filter(issues: Vec<Issue>, min_score: f64) -> Vec<Issue> {
    let before = issues.len();
    let kept: Vec<Issue> = issues
        .into_iter()
        .filter(|issue| quality_score(issue) >= min_score)
        .collect();

    if kept.len() < before {
        info!(
            removed = before - kept.len(),
            before,
            after = kept.len(),
            "filtered low-quality issues"
        );
    }
    kept
}

/// Collapse near-duplicate issues, keeping the best-scoring one per cluster.
///
/// Each issue joins the first cluster whose first member it resembles above
/// [`SIMILARITY_THRESHOLD`]; otherwise it starts a new cluster. Clusters are
/// emitted in formation order. On a score tie the earlier member wins.
pub fn deduplicate_similar(issues: Vec<Issue>) -> Vec<Issue> {
    if issues.len() <= 1 {
        return issues;
    }
    let before = issues.len();

    let mut clusters: Vec<Vec<Issue>> = Vec::new();
    for issue in issues {
        match clusters
            .iter_mut()
            .find(|c| similarity(&issue, &c[0]) > SIMILARITY_THRESHOLD)
        {
            Some(cluster) => cluster.push(issue),
            None => clusters.push(vec![issue]),
        }
    }

    let deduplicated: Vec<Issue> = clusters
        .into_iter()
        .filter_map(|cluster| {
            let mut best: Option<(f64, Issue)> = None;
            for issue in cluster {
                let score = quality_score(&issue);
                match &best {
                    Some((best_score, _)) if *best_score >= score => {}
                    _ => best = Some((score, issue)),
                }
            }
            best.map(|(_, issue)| issue)
        })
        .collect();

    if deduplicated.len() < before {
        info!(
            removed = before - deduplicated.len(),
            before,
            after = deduplicated.len(),
            "deduplicated similar issues"
        );
    }
    deduplicated
}

/// Weighted title/description token similarity in `[0, 1]`.
pub fn similarity(a: &Issue, b: &Issue) -> f64 {
    let title = jaccard(&a.pain_point_title, &b.pain_point_title);
    let description = jaccard(&a.issue_description, &b.issue_description);
    title * TITLE_WEIGHT + description * DESCRIPTION_WEIGHT
}

fn jaccard(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let left: HashSet<&str> = a.split_whitespace().collect();
    let right: HashSet<&str> = b.split_whitespace().collect();
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let intersection = left.intersection(&right).count() as f64;
    let union = left.union(&right).count() as f64;
    intersection / union
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strong_issue() -> Issue {
        Issue {
            frame_reference: "Frames 12-14".into(),
            pain_point_title: "Submit button disabled without explanation".into(),
            severity: Severity::High,
            issue_description: "On the payment form the submit button stays greyed out after all \
                                fields are filled, and no message tells the user which input is \
                                rejected, so they abandon the checkout."
                .into(),
            recommendations: vec![
                "Show inline validation next to the rejected input".into(),
                "Enable the button and explain errors on click".into(),
                "Add a summary of blocking errors above the form".into(),
            ],
            heuristic_violated: Some("Visibility of system status".into()),
            impact_score: Some(8),
        }
    }

    fn weak_issue() -> Issue {
        Issue {
            frame_reference: "Frame not specified".into(),
            pain_point_title: "Unclear".into(),
            severity: Severity::Low,
            issue_description: "Poor and unclear layout.".into(),
            recommendations: vec![],
            heuristic_violated: None,
            impact_score: None,
        }
    }

    #[test]
    fn strong_issue_scores_high_and_clamps() {
        assert_eq!(quality_score(&strong_issue()), 10.0);
    }

    #[test]
    fn weak_issue_clamps_at_zero() {
        assert_eq!(quality_score(&weak_issue()), 0.0);
    }

    #[test]
    fn generic_phrases_never_raise_score() {
        let base = "The checkout screen shows the total in grey small text next to the order \
                    summary and users scroll back up repeatedly to find it again.";
        let phrases = ["", " lack of", " insufficient", " poor", " unclear", " vague"];
        let mut prev = f64::MAX;
        let mut desc = base.to_string();
        for p in phrases {
            desc.push_str(p);
            let mut issue = strong_issue();
            issue.issue_description = desc.clone();
            issue.recommendations.truncate(1);
            let score = quality_score(&issue);
            assert!(score <= prev, "{} > {}", score, prev);
            assert!((0.0..=10.0).contains(&score));
            prev = score;
        }
    }

    #[test]
    fn vague_frame_reference_is_penalized() {
        let mut issue = strong_issue();
        issue.recommendations.truncate(1);
        issue.issue_description.push_str(" The label is unclear and poor.");
        issue.frame_reference = "Frame 12".into();
        let specific = quality_score(&issue);
        issue.frame_reference = "around the middle".into();
        let vague = quality_score(&issue);
        issue.frame_reference = String::new();
        let missing = quality_score(&issue);
        assert_eq!(specific - vague, 1.5);
        assert_eq!(vague - missing, 1.5);
    }

    #[test]
    fn filter_drops_below_threshold() {
        let kept = filter(vec![weak_issue(), strong_issue()], DEFAULT_MIN_QUALITY_SCORE);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].frame_reference, "Frames 12-14");
    }

    #[test]
    fn dedup_keeps_higher_scoring_duplicate() {
        let mut worse = strong_issue();
        worse.recommendations.truncate(1);
        worse.issue_description = "Submit button greyed out.".into();
        let better = strong_issue();
        assert!(quality_score(&worse) < quality_score(&better));
        assert!(similarity(&worse, &better) > SIMILARITY_THRESHOLD);

        let out = deduplicate_similar(vec![worse, better.clone()]);
        assert_eq!(out, vec![better]);
    }

    #[test]
    fn dedup_keeps_distinct_issues_in_order() {
        let a = strong_issue();
        let mut b = strong_issue();
        b.pain_point_title = "Search results lose filters on back navigation".into();
        b.issue_description = "Returning from a product resets every selected filter chip.".into();
        let out = deduplicate_similar(vec![a.clone(), b.clone()]);
        assert_eq!(out, vec![a, b]);
    }

    #[test]
    fn dedup_compares_against_cluster_representative_only() {
        let mk = |title: &str| {
            let mut i = strong_issue();
            i.pain_point_title = title.into();
            i
        };
        // b resembles a, c resembles b but not a: c starts its own cluster
        let a = mk("one two three four five");
        let b = mk("one two three four five six seven");
        let c = mk("three four five six seven eight");
        assert!(similarity(&b, &a) > SIMILARITY_THRESHOLD);
        assert!(similarity(&c, &b) > SIMILARITY_THRESHOLD);
        assert!(similarity(&c, &a) <= SIMILARITY_THRESHOLD);
        let out = deduplicate_similar(vec![a, b, c]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn jaccard_of_empty_is_zero() {
        assert_eq!(jaccard("", ""), 0.0);
        assert_eq!(jaccard("a b", ""), 0.0);
        assert_eq!(jaccard("A b", "a B"), 1.0);
    }
}
