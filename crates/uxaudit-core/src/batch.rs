//! Frame deduplication and order-preserving batching.
//!
//! Deduplication is a cheap file-size heuristic, not a visual comparison:
//! consecutive screen-recording frames that differ by less than
//! [`SIZE_DELTA_THRESHOLD`] in JPEG size are treated as near-identical.
//! A frame is still kept on a fixed cadence ([`MIN_INTERVAL`]) so long
//! static stretches keep temporal coverage.

use crate::models::{Batch, Frame};

/// Inputs at or below this length are never deduplicated.
pub const DEDUP_MIN_FRAMES: usize = 10;

/// Relative size change versus the last kept frame that marks a frame as new.
pub const SIZE_DELTA_THRESHOLD: f64 = 0.05;

/// Keep at least one frame every `MIN_INTERVAL` positions.
pub const MIN_INTERVAL: usize = 5;

/// Drop near-identical consecutive frames.
///
/// The first and last frame are always retained. An interior frame is kept
/// when any of these hold (indices are 0-based):
///
/// - its size differs from the last kept frame by more than the threshold
/// - its index is a multiple of [`MIN_INTERVAL`]
/// - at least [`MIN_INTERVAL`] indices passed since the last kept frame
pub fn deduplicate(frames: &[Frame]) -> Vec<Frame> {
    if frames.len() <= DEDUP_MIN_FRAMES {
        return frames.to_vec();
    }

    let last_idx = frames.len() - 1;
    let mut kept = Vec::with_capacity(frames.len());
    kept.push(frames[0].clone());
    let mut last_size = frames[0].size_bytes;
    let mut last_kept_idx = 0usize;

    for (idx, frame) in frames.iter().enumerate().take(last_idx).skip(1) {
        let delta = (frame.size_bytes as f64 - last_size as f64).abs() / last_size.max(1) as f64;

        if delta > SIZE_DELTA_THRESHOLD
            || idx % MIN_INTERVAL == 0
            || idx - last_kept_idx >= MIN_INTERVAL
        {
            kept.push(frame.clone());
            last_size = frame.size_bytes;
            last_kept_idx = idx;
        }
    }

    kept.push(frames[last_idx].clone());
    kept
}

/// Slice frames into contiguous batches of at most `batch_size`.
///
/// Every frame appears in exactly one batch, in input order. A zero batch
/// size is treated as one.
pub fn batch_frames(frames: &[Frame], batch_size: usize) -> Vec<Batch> {
    frames
        .chunks(batch_size.max(1))
        .enumerate()
        .map(|(index, slice)| Batch {
            index,
            frames: slice.to_vec(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn frames_with_sizes(sizes: &[u64]) -> Vec<Frame> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| Frame {
                number: i as u32 + 1,
                path: PathBuf::from(format!("frame_{:04}.jpg", i + 1)),
                size_bytes: size,
            })
            .collect()
    }

    fn numbers(frames: &[Frame]) -> Vec<u32> {
        frames.iter().map(|f| f.number).collect()
    }

    #[test]
    fn short_inputs_are_untouched() {
        for n in 0..=10 {
            let frames = frames_with_sizes(&vec![1000; n]);
            assert_eq!(deduplicate(&frames), frames);
        }
    }

    #[test]
    fn identical_frames_keep_cadence_and_endpoints() {
        let frames = frames_with_sizes(&[1000; 23]);
        let kept = numbers(&deduplicate(&frames));
        assert_eq!(kept, vec![1, 6, 11, 16, 21, 23]);
    }

    #[test]
    fn size_changes_are_kept() {
        let mut sizes = vec![1000u64; 12];
        sizes[2] = 2000;
        let kept = numbers(&deduplicate(&frames_with_sizes(&sizes)));
        // frame 3 jumps, frame 4 drops back to 1000 (a change relative to 3)
        assert_eq!(kept, vec![1, 3, 4, 6, 11, 12]);
    }

    #[test]
    fn cadence_counts_from_the_first_frame() {
        // 0-based index 5 is the sixth frame
        let kept = numbers(&deduplicate(&frames_with_sizes(&[1000; 11])));
        assert_eq!(kept, vec![1, 6, 11]);
    }

    #[test]
    fn first_and_last_always_kept() {
        for n in 11..60 {
            let frames = frames_with_sizes(&vec![500; n]);
            let kept = deduplicate(&frames);
            assert_eq!(kept.first().unwrap().number, 1);
            assert_eq!(kept.last().unwrap().number, n as u32);
        }
    }

    #[test]
    fn batching_partitions_in_order() {
        for n in [0usize, 1, 19, 20, 21, 180, 181] {
            for b in [1usize, 7, 20] {
                let frames = frames_with_sizes(&vec![1; n]);
                let batches = batch_frames(&frames, b);
                assert_eq!(batches.len(), n.div_ceil(b));
                let flat: Vec<u32> = batches.iter().flat_map(|b| b.frame_numbers()).collect();
                assert_eq!(flat, numbers(&frames));
                for (i, batch) in batches.iter().enumerate() {
                    assert_eq!(batch.index, i);
                    assert!(batch.frames.len() <= b);
                }
            }
        }
    }

    #[test]
    fn ninety_second_video_yields_nine_batches() {
        let frames = frames_with_sizes(&vec![1; 180]);
        let batches = batch_frames(&frames, 20);
        assert_eq!(batches.len(), 9);
        assert_eq!(batches[4].first_number(), Some(81));
        assert_eq!(batches[4].last_number(), Some(100));
    }
}
