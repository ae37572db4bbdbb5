//! Frame extraction from uploaded videos.
//!
//! [`FfmpegExtractor`] shells out to `ffmpeg` (and `ffprobe` for the
//! duration check), writing `frame_0001.jpg`, `frame_0002.jpg`, … into a
//! scratch directory scoped to the audit. The directory is scanned with
//! `walkdir` + `globset` and frames are returned ordered by number.
//!
//! The pipeline depends on the [`FrameSource`] trait so tests can supply
//! frames without a video or the external tools.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use globset::{Glob, GlobMatcher};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use uxaudit_core::error::{AuditError, AuditResult};
use uxaudit_core::models::Frame;

use crate::config::{DurationPolicy, FramesConfig};

/// Output of a successful extraction.
#[derive(Debug, Clone)]
pub struct ExtractedFrames {
    /// Frames ordered by number, starting at 1.
    pub frames: Vec<Frame>,
    /// Base64 JPEG of the first frame.
    pub thumbnail: Option<String>,
}

/// Produces frames for an audit and owns their scratch storage.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn extract(&self, audit_id: &str, video: &Path) -> AuditResult<ExtractedFrames>;

    /// Remove everything written for the audit. Missing files are not an error.
    async fn cleanup(&self, audit_id: &str) -> AuditResult<()>;
}

pub struct FfmpegExtractor {
    config: FramesConfig,
}

impl FfmpegExtractor {
    pub fn new(config: FramesConfig) -> Self {
        Self { config }
    }

    pub fn audit_dir(&self, audit_id: &str) -> PathBuf {
        self.config.scratch_dir.join(audit_id)
    }

    /// Video duration in seconds, or `None` when ffprobe is unavailable or
    /// cannot read the container.
    async fn probe_duration(&self, video: &Path) -> Option<f64> {
        let output = Command::new(&self.config.ffprobe_bin)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(video)
            .output()
            .await;

        match output {
            Ok(out) if out.status.success() => {
                String::from_utf8_lossy(&out.stdout).trim().parse().ok()
            }
            Ok(out) => {
                warn!(
                    status = %out.status,
                    stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                    "ffprobe failed, skipping duration check"
                );
                None
            }
            Err(e) => {
                warn!(error = %e, "could not run ffprobe, skipping duration check");
                None
            }
        }
    }

    /// Returns the `-t` limit to pass to ffmpeg, if any.
    fn duration_limit(&self, duration: Option<f64>) -> AuditResult<Option<u64>> {
        let max = self.config.max_duration_secs;
        match (duration, self.config.duration_policy) {
            (Some(d), DurationPolicy::Reject) if d > max as f64 => Err(AuditError::Extraction(
                format!("video is {:.1}s long, the limit is {}s", d, max),
            )),
            (Some(d), DurationPolicy::Truncate) if d > max as f64 => {
                info!(duration = d, max, "truncating video to the duration limit");
                Ok(Some(max))
            }
            (None, DurationPolicy::Truncate) => Ok(Some(max)),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl FrameSource for FfmpegExtractor {
    async fn extract(&self, audit_id: &str, video: &Path) -> AuditResult<ExtractedFrames> {
        if !video.is_file() {
            return Err(AuditError::Extraction(format!(
                "video not found: {}",
                video.display()
            )));
        }

        let dir = self.audit_dir(audit_id);
        // Leftovers from an earlier attempt would be picked up as frames.
        if dir.exists() {
            tokio::fs::remove_dir_all(&dir)
                .await
                .map_err(|e| AuditError::Extraction(format!("clear {}: {}", dir.display(), e)))?;
        }
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| AuditError::Extraction(format!("create {}: {}", dir.display(), e)))?;

        let limit = self.duration_limit(self.probe_duration(video).await)?;

        let mut cmd = Command::new(&self.config.ffmpeg_bin);
        cmd.args(["-hide_banner", "-loglevel", "error", "-y", "-i"]);
        cmd.arg(video);
        if let Some(secs) = limit {
            cmd.arg("-t").arg(secs.to_string());
        }
        cmd.arg("-vf").arg(format!("fps={}", self.config.fps));
        cmd.arg(dir.join("frame_%04d.jpg"));

        debug!(audit_id, command = ?cmd.as_std(), "running ffmpeg");
        let output = cmd.output().await.map_err(|e| {
            AuditError::Extraction(format!(
                "failed to execute '{}': {}. Is ffmpeg installed?",
                self.config.ffmpeg_bin, e
            ))
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AuditError::Extraction(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let frames = collect_frames(&dir)?;
        if frames.is_empty() {
            return Err(AuditError::Extraction(
                "no frames were extracted from the video".to_string(),
            ));
        }
        info!(audit_id, frames = frames.len(), "frame extraction completed");

        let thumbnail = match frames.first() {
            Some(first) => Some(read_base64(&first.path).await?),
            None => None,
        };
        Ok(ExtractedFrames { frames, thumbnail })
    }

    async fn cleanup(&self, audit_id: &str) -> AuditResult<()> {
        let dir = self.audit_dir(audit_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuditError::storage(format!(
                "remove {}: {}",
                dir.display(),
                e
            ))),
        }
    }
}

fn frame_matcher() -> AuditResult<GlobMatcher> {
    Glob::new("frame_*.jpg")
        .map(|g| g.compile_matcher())
        .map_err(|e| AuditError::Extraction(e.to_string()))
}

/// Scan `dir` (non-recursively) for extractor output, ordered by frame number.
pub fn collect_frames(dir: &Path) -> AuditResult<Vec<Frame>> {
    let matcher = frame_matcher()?;
    let mut frames = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| AuditError::Extraction(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !matcher.is_match(name.as_ref()) {
            continue;
        }
        let Some(number) = Frame::number_from_file_name(&name) else {
            continue;
        };
        let size_bytes = entry
            .metadata()
            .map_err(|e| AuditError::Extraction(e.to_string()))?
            .len();
        frames.push(Frame {
            number,
            path: entry.path().to_path_buf(),
            size_bytes,
        });
    }

    frames.sort_by_key(|f| f.number);
    Ok(frames)
}

/// Read a file and encode it as standard base64.
pub async fn read_base64(path: &Path) -> AuditResult<String> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        AuditError::Extraction(format!("read frame {}: {}", path.display(), e))
    })?;
    Ok(BASE64.encode(bytes))
}

/// `data:image/jpeg;base64,...` URL for an image part.
pub async fn jpeg_data_url(path: &Path) -> AuditResult<String> {
    Ok(format!("data:image/jpeg;base64,{}", read_base64(path).await?))
}
