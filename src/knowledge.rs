//! Knowledge base commands: category seeding, user preferences, and
//! indexing of plain-text sources.
//!
//! Indexing walks a directory for `*.md` / `*.txt` files, splits each into
//! word-aligned chunks, embeds them in batches, and stores them under a
//! category. A source whose chunk hashes are unchanged is skipped.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use uxaudit_core::chunk::{chunk_text, DEFAULT_CHUNK_CHARS, DEFAULT_OVERLAP_WORDS};
use uxaudit_core::models::{KnowledgeCategory, KnowledgeChunk};
use uxaudit_core::store::KnowledgeStore;

use crate::config::Config;
use crate::db;
use crate::embedding::OpenAiEmbedder;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::sqlite_store::SqliteStore;

/// Category new chunks land in when `--category` is not given.
pub const DEFAULT_CATEGORY: &str = "core_heuristics";

pub fn default_categories() -> Vec<KnowledgeCategory> {
    let category = |slug: &str, name: &str, description: &str, enabled: bool, position: i64| {
        KnowledgeCategory {
            id: 0,
            name: name.to_string(),
            slug: slug.to_string(),
            description: description.to_string(),
            default_enabled: enabled,
            position,
        }
    };
    vec![
        category(
            "core_heuristics",
            "Core Heuristics",
            "Fundamental UX principles and heuristics",
            true,
            1,
        ),
        category(
            "accessibility",
            "Accessibility & Inclusive Design",
            "WCAG standards, ARIA patterns, and inclusive design principles",
            false,
            2,
        ),
        category(
            "design_systems",
            "Design Systems & UI Patterns",
            "Component libraries, design tokens, and modern UI patterns",
            false,
            3,
        ),
        category(
            "ai_interfaces",
            "AI/LLM Interface Design",
            "Conversational UI, AI transparency, and LLM-powered features",
            false,
            4,
        ),
        category(
            "mobile_platforms",
            "Mobile & Platform-Specific",
            "Platform guidelines such as iOS HIG and Material Design",
            false,
            5,
        ),
    ]
}

async fn open_store(config: &Config) -> Result<SqliteStore> {
    Ok(SqliteStore::new(db::connect(config).await?))
}

pub async fn run_seed(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let added = store.seed_categories(&default_categories()).await?;
    println!("Seeded {} knowledge categories.", added);
    store.pool().close().await;
    Ok(())
}

pub async fn run_categories(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let categories = store.list_categories().await?;
    if categories.is_empty() {
        println!("No knowledge categories. Run `uxaudit knowledge seed` first.");
    }
    for c in &categories {
        println!(
            "{:<18} {:<34} {}",
            c.slug,
            c.name,
            if c.default_enabled { "default" } else { "" }
        );
    }
    store.pool().close().await;
    Ok(())
}

pub async fn run_user_create(config: &Config, email: &str) -> Result<()> {
    let store = open_store(config).await?;
    let id = store
        .create_user(email)
        .await
        .with_context(|| format!("Failed to create user {}", email))?;
    println!("{}", id);
    store.pool().close().await;
    Ok(())
}

pub async fn run_prefs_set(config: &Config, user_id: &str, slug: &str, enabled: bool) -> Result<()> {
    let store = open_store(config).await?;
    store.set_preference(user_id, slug, enabled).await?;
    println!(
        "{} {} for {}",
        if enabled { "Enabled" } else { "Disabled" },
        slug,
        user_id
    );
    store.pool().close().await;
    Ok(())
}

pub async fn run_prefs_list(config: &Config, user_id: &str) -> Result<()> {
    let store = open_store(config).await?;
    if !store.user_exists(user_id).await? {
        bail!("Unknown user: {}", user_id);
    }
    for pref in store.list_preferences(user_id).await? {
        println!(
            "{:<18} {}",
            pref.category_slug,
            if pref.enabled { "on" } else { "off" }
        );
    }
    store.pool().close().await;
    Ok(())
}

fn build_globset(patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// A text file to index, named by its path relative to the index root.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeSource {
    pub name: String,
    pub path: PathBuf,
}

/// Find `*.md` / `*.txt` files under `root`, sorted by name.
pub fn discover_sources(root: &Path) -> Result<Vec<KnowledgeSource>> {
    if !root.is_dir() {
        bail!("Knowledge directory does not exist: {}", root.display());
    }
    let include = build_globset(&["**/*.md", "**/*.markdown", "**/*.txt"])?;
    let exclude = build_globset(&["**/.git/**", "**/node_modules/**"])?;

    let mut sources = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let name = relative.to_string_lossy().replace('\\', "/");
        if exclude.is_match(&name) || !include.is_match(&name) {
            continue;
        }
        sources.push(KnowledgeSource {
            name,
            path: path.to_path_buf(),
        });
    }
    sources.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(sources)
}

pub async fn run_index(
    config: &Config,
    dir: &Path,
    category: Option<&str>,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }
    let sources = discover_sources(dir)?;
    let embedder = OpenAiEmbedder::new(&config.embedding)?;
    let store = open_store(config).await?;
    let category_id = store
        .category_id(category.unwrap_or(DEFAULT_CATEGORY))
        .await?;
    let batch_size = config.embedding.batch_size.max(1);

    let mut indexed = 0usize;
    let mut unchanged = 0usize;
    let mut total_chunks = 0usize;

    for source in &sources {
        let text = std::fs::read_to_string(&source.path)
            .with_context(|| format!("Failed to read {}", source.path.display()))?;
        let chunks = chunk_text(&text, DEFAULT_CHUNK_CHARS, DEFAULT_OVERLAP_WORDS);

        let existing = store.source_hashes(&source.name).await?;
        let hashes: Vec<&str> = chunks.iter().map(|c| c.hash.as_str()).collect();
        if !chunks.is_empty() && existing == hashes {
            unchanged += 1;
            continue;
        }

        let mut rows = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = embedder
                .embed_batch(&texts)
                .await
                .with_context(|| format!("Failed to embed {}", source.name))?;
            for (chunk, embedding) in batch.iter().zip(vectors) {
                rows.push(KnowledgeChunk {
                    id: chunk.id.clone(),
                    source_name: source.name.clone(),
                    chunk_index: chunk.chunk_index,
                    content: chunk.text.clone(),
                    category_id: Some(category_id),
                    embedding,
                    hash: chunk.hash.clone(),
                });
            }
        }

        store.insert_chunks(&rows).await?;
        store
            .truncate_source(&source.name, rows.len() as i64)
            .await?;

        indexed += 1;
        total_chunks += rows.len();
        progress.report(ProgressEvent::Indexed {
            source: source.name.clone(),
            chunks: rows.len(),
        });
    }

    println!("knowledge index");
    println!("  sources: {}", sources.len());
    println!("  indexed: {}", indexed);
    println!("  unchanged: {}", unchanged);
    println!("  chunks written: {}", total_chunks);

    store.pool().close().await;
    Ok(())
}
