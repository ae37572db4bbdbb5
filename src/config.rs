//! TOML configuration.
//!
//! The [`Config`] is loaded once at startup by [`load_config`] and passed
//! down explicitly. Every section except `[db]` is optional and falls back to
//! the defaults below.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use uxaudit_core::issue_filter::DEFAULT_MIN_QUALITY_SCORE;
use uxaudit_core::prompt::PromptSettings;
use uxaudit_core::retrieval::RetrievalSettings;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub frames: FramesConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub issues: IssuesConfig,
    #[serde(default)]
    pub screenshots: ScreenshotsConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub batch_size: usize,
    pub timeout_secs: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub function_calling: bool,
    pub api_base: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.1,
            max_tokens: 4000,
            batch_size: 20,
            timeout_secs: 300,
            max_retries: 3,
            base_delay_ms: 1000,
            function_calling: true,
            api_base: default_api_base(),
        }
    }
}

impl LlmConfig {
    pub fn prompt_settings(&self) -> PromptSettings {
        PromptSettings {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            function_calling: self.function_calling,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

/// What to do with a video longer than `max_duration_secs`.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DurationPolicy {
    Reject,
    Truncate,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FramesConfig {
    pub fps: f64,
    pub max_duration_secs: u64,
    pub duration_policy: DurationPolicy,
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    pub scratch_dir: PathBuf,
    pub deduplicate: bool,
    /// Remove the source video during cleanup.
    pub delete_video: bool,
}

impl Default for FramesConfig {
    fn default() -> Self {
        Self {
            fps: 2.0,
            max_duration_secs: 120,
            duration_policy: DurationPolicy::Truncate,
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            scratch_dir: PathBuf::from("./data/frames"),
            deduplicate: false,
            delete_video: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            api_base: default_api_base(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub per_query_limit: usize,
    pub max_results: usize,
    pub max_topic_queries: usize,
    pub cache_ttl_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        let settings = RetrievalSettings::default();
        Self {
            per_query_limit: settings.per_query_limit,
            max_results: settings.max_results,
            max_topic_queries: settings.max_topic_queries,
            cache_ttl_secs: settings.cache_ttl.as_secs(),
        }
    }
}

impl RetrievalConfig {
    pub fn settings(&self) -> RetrievalSettings {
        RetrievalSettings {
            per_query_limit: self.per_query_limit,
            max_results: self.max_results,
            max_topic_queries: self.max_topic_queries,
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IssuesConfig {
    pub min_quality_score: f64,
}

impl Default for IssuesConfig {
    fn default() -> Self {
        Self {
            min_quality_score: DEFAULT_MIN_QUALITY_SCORE,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScreenshotsConfig {
    pub context: u32,
    pub max_frames: usize,
}

impl Default for ScreenshotsConfig {
    fn default() -> Self {
        Self {
            context: 2,
            max_frames: 7,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct JobsConfig {
    pub workers: usize,
    pub max_attempts: u32,
    pub backoff_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            max_attempts: 3,
            backoff_secs: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7340".to_string(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let llm = &config.llm;
    if llm.model.trim().is_empty() {
        anyhow::bail!("llm.model must not be empty");
    }
    if !(0.0..=2.0).contains(&llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }
    if !(1..=128_000).contains(&llm.max_tokens) {
        anyhow::bail!("llm.max_tokens must be in [1, 128000]");
    }
    if !(1..=1000).contains(&llm.batch_size) {
        anyhow::bail!("llm.batch_size must be in [1, 1000]");
    }
    if !(1..=600).contains(&llm.timeout_secs) {
        anyhow::bail!("llm.timeout_secs must be in [1, 600]");
    }

    if config.frames.fps.is_nan() || config.frames.fps <= 0.0 {
        anyhow::bail!("frames.fps must be > 0");
    }
    if config.frames.max_duration_secs == 0 {
        anyhow::bail!("frames.max_duration_secs must be > 0");
    }

    if !(0.0..=10.0).contains(&config.issues.min_quality_score) {
        anyhow::bail!("issues.min_quality_score must be in [0.0, 10.0]");
    }
    if config.screenshots.max_frames == 0 {
        anyhow::bail!("screenshots.max_frames must be >= 1");
    }
    if config.retrieval.per_query_limit == 0 || config.retrieval.max_results == 0 {
        anyhow::bail!("retrieval.per_query_limit and retrieval.max_results must be >= 1");
    }
    if config.jobs.workers == 0 {
        anyhow::bail!("jobs.workers must be >= 1");
    }
    if config.jobs.max_attempts == 0 {
        anyhow::bail!("jobs.max_attempts must be >= 1");
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse("[db]\npath = \"./data/uxaudit.sqlite\"\n").unwrap();
        assert_eq!(config.llm.batch_size, 20);
        assert_eq!(config.llm.max_retries, 3);
        assert_eq!(config.frames.fps, 2.0);
        assert_eq!(config.frames.duration_policy, DurationPolicy::Truncate);
        assert_eq!(config.issues.min_quality_score, 6.0);
        assert_eq!(config.screenshots.max_frames, 7);
        assert_eq!(config.retrieval.cache_ttl_secs, 900);
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = parse(
            "[db]\npath = \"x.sqlite\"\n[llm]\nmodel = \"gpt-5\"\nbatch_size = 10\n\
             [frames]\nduration_policy = \"reject\"\n",
        )
        .unwrap();
        assert_eq!(config.llm.model, "gpt-5");
        assert_eq!(config.llm.batch_size, 10);
        assert_eq!(config.llm.temperature, 0.1);
        assert_eq!(config.frames.duration_policy, DurationPolicy::Reject);
        assert!(config.llm.prompt_settings().is_advanced());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        for bad in [
            "[llm]\ntemperature = 3.5",
            "[llm]\nbatch_size = 0",
            "[llm]\ntimeout_secs = 0",
            "[frames]\nfps = 0.0",
            "[issues]\nmin_quality_score = 11.0",
            "[screenshots]\nmax_frames = 0",
            "[jobs]\nworkers = 0",
        ] {
            let text = format!("[db]\npath = \"x.sqlite\"\n{}\n", bad);
            assert!(parse(&text).is_err(), "accepted: {}", bad);
        }
    }

    #[test]
    fn enabled_embedding_needs_model_and_dims() {
        let err = parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"openai\"\n").unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));

        let err = parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"local\"\n").unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));

        let err = parse(
            "[db]\npath = \"x\"\n[embedding]\nprovider = \"local\"\nmodel = \"m\"\ndims = 3\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }
}
