//! Knowledge retrieval for prompt augmentation.
//!
//! [`KnowledgeRetriever`] embeds a query, asks a [`KnowledgeStore`] for the
//! nearest chunks and formats them as source-attributed context text.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`retrieve`](KnowledgeRetriever::retrieve) | One query, optional category filter |
//! | [`retrieve_for_context`](KnowledgeRetriever::retrieve_for_context) | Topic queries derived from free text |
//! | [`retrieve_for_user`](KnowledgeRetriever::retrieve_for_user) | Same, limited to the user's categories, cached |
//!
//! Retrieval is best-effort: embedding or store failures are logged and
//! yield an empty string so analysis proceeds without augmentation.
//! Failures are never cached.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::embedding::QueryEmbedder;
use crate::error::AuditResult;
use crate::store::{ChunkMatch, KnowledgeStore};

/// Queries added to every topic set.
pub const GENERAL_QUERIES: [&str; 2] = ["Nielsen heuristics", "usability principles"];

const SOURCE_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalSettings {
    /// Chunks fetched per topic query.
    pub per_query_limit: usize,
    /// Cap on distinct chunks across all queries.
    pub max_results: usize,
    /// Cap on keyword-derived topic queries (general queries come on top).
    pub max_topic_queries: usize,
    pub cache_ttl: Duration,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            per_query_limit: 5,
            max_results: 10,
            max_topic_queries: 4,
            cache_ttl: Duration::from_secs(15 * 60),
        }
    }
}

fn topic_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (r"(?i)\b(nav\w*|menus?|sidebars?)\b", "navigation design principles"),
            (r"(?i)\b(forms?|inputs?|fields?|submit\w*)\b", "form design usability"),
            (r"(?i)\b(errors?|warnings?|alerts?)\b", "error handling user feedback"),
            (
                r"(?i)\b(mobile|responsive|touch|ios|android)\b",
                "mobile interface design",
            ),
            (
                r"(?i)\b(accessib\w*|screen readers?|contrast|wcag|aria)\b",
                "accessibility guidelines WCAG",
            ),
            (
                r"(?i)\b(ai|chatbots?|conversation\w*|assistants?|llm)\b",
                "AI interface design patterns",
            ),
        ]
        .into_iter()
        .filter_map(|(pattern, query)| Regex::new(pattern).ok().map(|re| (re, query)))
        .collect()
    })
}

/// Topic queries for a piece of free text.
///
/// Keyword-matched topics come first (at most `max_topics`), followed by
/// the [`GENERAL_QUERIES`].
pub fn topic_queries(text: &str, max_topics: usize) -> Vec<String> {
    let mut queries: Vec<String> = topic_patterns()
        .iter()
        .filter(|(re, _)| re.is_match(text))
        .map(|(_, q)| q.to_string())
        .take(max_topics)
        .collect();
    queries.extend(GENERAL_QUERIES.iter().map(|q| q.to_string()));
    queries
}

fn fraction_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(\d+\)").expect("valid regex"))
}

/// Human-readable title for a source file name.
///
/// `nielsen_heuristics(2).pdf` becomes `Nielsen Heuristics`.
pub fn format_source_title(name: &str) -> String {
    let stem = [".pdf", ".md", ".markdown", ".txt"]
        .iter()
        .find_map(|ext| name.strip_suffix(ext))
        .unwrap_or(name);
    let cleaned = fraction_re().replace_all(stem, "").replace(['_', '-'], " ");
    cleaned
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Group matches by source (first appearance order) and format with citations.
pub fn format_context(matches: &[ChunkMatch]) -> String {
    let mut order: Vec<&str> = Vec::new();
    let mut by_source: HashMap<&str, Vec<&str>> = HashMap::new();
    for m in matches {
        let entry = by_source.entry(m.source_name.as_str()).or_insert_with(|| {
            order.push(m.source_name.as_str());
            Vec::new()
        });
        entry.push(m.content.trim());
    }

    order
        .iter()
        .map(|source| {
            let body = by_source
                .get(source)
                .map(|parts| parts.join("\n\n"))
                .unwrap_or_default();
            format!("From {}:\n{}", format_source_title(source), body.trim())
        })
        .collect::<Vec<_>>()
        .join(SOURCE_SEPARATOR)
}

/// Keyed TTL cache of formatted context strings.
pub struct RetrievalCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, String)>>,
}

impl RetrievalCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some((stored, value)) if stored.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: String, value: String) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|_, (stored, _)| stored.elapsed() < self.ttl);
            entries.insert(key, (Instant::now(), value));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cache key: user id, sorted category set, and a hash of the input text.
pub fn cache_key(user_id: &str, category_ids: &[i64], context: &str) -> String {
    let mut ids = category_ids.to_vec();
    ids.sort_unstable();
    let ids = ids
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join("_");
    let mut hasher = Sha256::new();
    hasher.update(context.as_bytes());
    format!(
        "knowledge_retrieval/user_{}/categories_{}/context_{:x}",
        user_id,
        ids,
        hasher.finalize()
    )
}

pub struct KnowledgeRetriever {
    store: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn QueryEmbedder>,
    settings: RetrievalSettings,
    cache: RetrievalCache,
}

impl KnowledgeRetriever {
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        embedder: Arc<dyn QueryEmbedder>,
        settings: RetrievalSettings,
    ) -> Self {
        let cache = RetrievalCache::new(settings.cache_ttl);
        Self {
            store,
            embedder,
            settings,
            cache,
        }
    }

    pub fn cache(&self) -> &RetrievalCache {
        &self.cache
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        categories: Option<&[i64]>,
    ) -> AuditResult<Vec<ChunkMatch>> {
        let vector = self.embedder.embed(query).await?;
        self.store.nearest_chunks(&vector, limit, categories).await
    }

    /// Nearest chunks for one query, formatted. Empty on failure.
    pub async fn retrieve(&self, query: &str, limit: usize, categories: Option<&[i64]>) -> String {
        if query.trim().is_empty() {
            return String::new();
        }
        match self.search(query, limit, categories).await {
            Ok(matches) => format_context(&matches),
            Err(e) => {
                warn!(error = %e, "knowledge retrieval failed, continuing without context");
                String::new()
            }
        }
    }

    async fn collect_for_context(
        &self,
        text: &str,
        categories: Option<&[i64]>,
    ) -> AuditResult<Vec<ChunkMatch>> {
        let mut seen = HashSet::new();
        let mut collected = Vec::new();
        for query in topic_queries(text, self.settings.max_topic_queries) {
            let matches = self
                .search(&query, self.settings.per_query_limit, categories)
                .await?;
            for m in matches {
                if seen.insert(m.chunk_id.clone()) {
                    collected.push(m);
                }
            }
        }
        collected.truncate(self.settings.max_results);
        Ok(collected)
    }

    /// Context for free text across all categories. Empty on failure.
    pub async fn retrieve_for_context(&self, text: &str) -> String {
        match self.collect_for_context(text, None).await {
            Ok(matches) => format_context(&matches),
            Err(e) => {
                warn!(error = %e, "knowledge retrieval failed, continuing without context");
                String::new()
            }
        }
    }

    /// Context limited to the user's enabled categories, cached per
    /// (user, category set, text). Empty when nothing is enabled or on failure.
    pub async fn retrieve_for_user(&self, context: &str, user_id: &str) -> String {
        let categories = match self.store.enabled_category_ids(user_id).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(user_id, error = %e, "could not load knowledge preferences");
                return String::new();
            }
        };
        if categories.is_empty() {
            debug!(user_id, "no knowledge categories enabled");
            return String::new();
        }

        let key = cache_key(user_id, &categories, context);
        if let Some(hit) = self.cache.get(&key) {
            debug!(user_id, "knowledge retrieval cache hit");
            return hit;
        }

        match self.collect_for_context(context, Some(&categories)).await {
            Ok(matches) => {
                let formatted = format_context(&matches);
                self.cache.insert(key, formatted.clone());
                formatted
            }
            Err(e) => {
                warn!(user_id, error = %e, "knowledge retrieval failed, continuing without context");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AuditError, GatewayError, GatewayErrorKind};
    use crate::models::KnowledgeChunk;
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeEmbedder {
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    impl FakeEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl QueryEmbedder for FakeEmbedder {
        fn model_name(&self) -> &str {
            "fake"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, text: &str) -> AuditResult<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(AuditError::Gateway(GatewayError::new(
                    GatewayErrorKind::Network,
                    "down",
                )));
            }
            Ok(vec![text.len() as f32, 0.0])
        }
    }

    fn chunk(id: &str, source: &str, category: i64, x: f32) -> KnowledgeChunk {
        KnowledgeChunk {
            id: id.into(),
            source_name: source.into(),
            chunk_index: 0,
            content: format!("text {}", id),
            category_id: Some(category),
            embedding: vec![x, 0.0],
            hash: String::new(),
        }
    }

    async fn setup() -> (Arc<InMemoryStore>, Arc<FakeEmbedder>, KnowledgeRetriever) {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert_chunks(&[
                chunk("c1", "nielsen_heuristics(1).pdf", 1, 18.0),
                chunk("c2", "nielsen_heuristics(1).pdf", 1, 20.0),
                chunk("c3", "wcag-guide.md", 2, 30.0),
            ])
            .await
            .unwrap();
        let embedder = Arc::new(FakeEmbedder::new());
        let retriever =
            KnowledgeRetriever::new(store.clone(), embedder.clone(), RetrievalSettings::default());
        (store, embedder, retriever)
    }

    #[test]
    fn topics_always_include_general_queries() {
        let q = topic_queries("UX audit of settings", 4);
        assert_eq!(q, vec!["Nielsen heuristics", "usability principles"]);

        let q = topic_queries("signup form shows an error on mobile", 4);
        assert_eq!(
            q,
            vec![
                "form design usability",
                "error handling user feedback",
                "mobile interface design",
                "Nielsen heuristics",
                "usability principles",
            ]
        );

        let q = topic_queries("form error mobile wcag chatbot menu", 2);
        assert_eq!(q.len(), 4);
    }

    #[test]
    fn ai_topic_matches_whole_word_only() {
        assert!(!topic_queries("email campaign", 4)
            .iter()
            .any(|q| q.starts_with("AI")));
        assert!(topic_queries("an AI assistant", 4)
            .iter()
            .any(|q| q.starts_with("AI")));
    }

    #[test]
    fn source_titles_are_cleaned() {
        assert_eq!(format_source_title("nielsen_heuristics(2).pdf"), "Nielsen Heuristics");
        assert_eq!(format_source_title("wcag-guide.md"), "Wcag Guide");
    }

    #[test]
    fn context_groups_by_source() {
        let m = |id: &str, source: &str| ChunkMatch {
            chunk_id: id.into(),
            source_name: source.into(),
            content: format!("body {}", id),
            category_id: None,
            distance: 0.0,
        };
        let out = format_context(&[m("1", "a.md"), m("2", "b.md"), m("3", "a.md")]);
        assert_eq!(out, "From A:\nbody 1\n\nbody 3\n\n---\n\nFrom B:\nbody 2");
        assert_eq!(format_context(&[]), "");
    }

    #[tokio::test]
    async fn retrieve_dedupes_and_caps() {
        let (_store, _embedder, retriever) = setup().await;
        let out = retriever.retrieve_for_context("checkout").await;
        assert!(out.starts_with("From Nielsen Heuristics:"));
        assert_eq!(out.matches("text c1").count(), 1);
        assert!(out.contains("From Wcag Guide:"));
    }

    #[tokio::test]
    async fn user_without_categories_gets_empty_context() {
        let (_store, embedder, retriever) = setup().await;
        assert_eq!(retriever.retrieve_for_user("checkout", "u1").await, "");
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn user_retrieval_filters_and_caches() {
        let (store, embedder, retriever) = setup().await;
        store.set_enabled_categories("u1", &[2]).unwrap();

        let first = retriever.retrieve_for_user("checkout", "u1").await;
        assert!(first.contains("Wcag Guide"));
        assert!(!first.contains("Nielsen"));
        let calls = embedder.calls.load(Ordering::SeqCst);
        assert_eq!(calls, 2);

        let second = retriever.retrieve_for_user("checkout", "u1").await;
        assert_eq!(first, second);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), calls);

        // different category set misses the cache
        store.set_enabled_categories("u1", &[1, 2]).unwrap();
        retriever.retrieve_for_user("checkout", "u1").await;
        assert!(embedder.calls.load(Ordering::SeqCst) > calls);
    }

    #[tokio::test]
    async fn embedding_failures_degrade_and_are_not_cached() {
        let (store, embedder, retriever) = setup().await;
        store.set_enabled_categories("u1", &[1]).unwrap();
        embedder.fail.store(true, Ordering::SeqCst);
        assert_eq!(retriever.retrieve_for_user("checkout", "u1").await, "");
        assert_eq!(retriever.retrieve("checkout", 5, None).await, "");
        assert!(retriever.cache().is_empty());

        embedder.fail.store(false, Ordering::SeqCst);
        assert!(!retriever.retrieve_for_user("checkout", "u1").await.is_empty());
    }

    #[test]
    fn cache_key_sorts_categories() {
        assert_eq!(cache_key("u", &[3, 1], "x"), cache_key("u", &[1, 3], "x"));
        assert_ne!(cache_key("u", &[1], "x"), cache_key("u", &[1], "y"));
        assert!(cache_key("u", &[1, 3], "x").starts_with("knowledge_retrieval/user_u/categories_1_3/"));
    }

    #[test]
    fn expired_entries_are_dropped() {
        let cache = RetrievalCache::new(Duration::from_secs(0));
        cache.insert("k".into(), "v".into());
        assert_eq!(cache.get("k"), None);
    }
}
