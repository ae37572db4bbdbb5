//! Frame reference parsing and issue-to-screenshot mapping.
//!
//! A model cites frames as free text (`"Frame 5"`, `"Frames 12-14"`,
//! `"Frame 10, 12-14"`). [`extract_frame_range`] turns that into frame
//! numbers, [`expand_frame_range`] adds a context window around them, and
//! [`plan_screenshots`] matches the result against the audit's extracted
//! frames. Reading the image bytes is left to the caller.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::{Frame, Issue};

/// Ranges wider than this are treated as their two endpoints only.
const MAX_RANGE_SPAN: u32 = 1000;

fn range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\s*[-–]\s*(\d+)").expect("valid regex"))
}

fn int_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("valid regex"))
}

/// All frame numbers named in a reference string, sorted and deduplicated.
///
/// Ranges (`N-M`) contribute every number in between; bare integers
/// contribute themselves.
pub fn extract_frame_range(reference: &str) -> Vec<u32> {
    let mut out = BTreeSet::new();

    for caps in range_re().captures_iter(reference) {
        let (Ok(a), Ok(b)) = (caps[1].parse::<u32>(), caps[2].parse::<u32>()) else {
            continue;
        };
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        if hi - lo <= MAX_RANGE_SPAN {
            out.extend(lo..=hi);
        } else {
            out.insert(lo);
            out.insert(hi);
        }
    }

    for m in int_re().find_iter(reference) {
        if let Ok(n) = m.as_str().parse::<u32>() {
            out.insert(n);
        }
    }

    out.into_iter().collect()
}

/// Add `context` neighbours on each side of every referenced frame.
///
/// Frame numbers below 1 are dropped. When the expansion exceeds `max`,
/// a window of exactly `max` consecutive entries is taken from the expanded
/// list, centred on the midpoint of the *original* references.
pub fn expand_frame_range(frames: &[u32], context: u32, max: usize) -> Vec<u32> {
    let originals: Vec<u32> = frames.iter().copied().filter(|&f| f >= 1).collect();
    if originals.is_empty() || max == 0 {
        return Vec::new();
    }

    let mut expanded = BTreeSet::new();
    for &f in &originals {
        let lo = f.saturating_sub(context).max(1);
        let hi = f.saturating_add(context);
        expanded.extend(lo..=hi);
    }
    let expanded: Vec<u32> = expanded.into_iter().collect();
    if expanded.len() <= max {
        return expanded;
    }

    let lo = *originals.iter().min().unwrap_or(&1) as f64;
    let hi = *originals.iter().max().unwrap_or(&1) as f64;
    let midpoint = (lo + hi) / 2.0;

    let centre = expanded
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            let da = (**a as f64 - midpoint).abs();
            let db = (**b as f64 - midpoint).abs();
            da.total_cmp(&db)
        })
        .map(|(i, _)| i)
        .unwrap_or(0);

    let start = centre
        .saturating_sub(max / 2)
        .min(expanded.len() - max);
    expanded[start..start + max].to_vec()
}

/// One screenshot to attach to an issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedScreenshot {
    pub issue_index: usize,
    pub frame_number: u32,
    pub frame_sequence: usize,
    pub is_primary: bool,
    pub path: PathBuf,
}

/// Map every issue's frame reference onto extracted frames.
///
/// Frame numbers with no matching extracted frame are skipped. Issues whose
/// reference contains no numbers get no screenshots.
pub fn plan_screenshots(
    issues: &[Issue],
    frames: &[Frame],
    context: u32,
    max: usize,
) -> Vec<PlannedScreenshot> {
    let by_number: HashMap<u32, &Frame> = frames.iter().map(|f| (f.number, f)).collect();
    let mut planned = Vec::new();

    for (issue_index, issue) in issues.iter().enumerate() {
        let referenced = extract_frame_range(&issue.frame_reference);
        if referenced.is_empty() {
            continue;
        }
        let primary: BTreeSet<u32> = referenced.iter().copied().collect();

        let mut sequence = 0;
        for number in expand_frame_range(&referenced, context, max) {
            let Some(frame) = by_number.get(&number) else {
                continue;
            };
            planned.push(PlannedScreenshot {
                issue_index,
                frame_number: number,
                frame_sequence: sequence,
                is_primary: primary.contains(&number),
                path: frame.path.clone(),
            });
            sequence += 1;
        }
    }

    planned
}
