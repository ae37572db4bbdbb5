//! # uxaudit core
//!
//! Shared, runtime-agnostic logic for uxaudit: the data model, frame
//! batching, prompt building, response validation and scoring, issue
//! filtering, screenshot mapping, and the knowledge retrieval service.
//!
//! This crate contains no tokio, sqlx, subprocess, or HTTP dependencies.
//! The application crate supplies concrete stores, the embedding client,
//! the LLM gateway, and the frame extractor.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Audits, frames, issues, reports, knowledge chunks |
//! | [`error`] | Error taxonomy and user-facing failure categories |
//! | [`batch`] | Frame deduplication and order-preserving batching |
//! | [`chunk`] | Word-aligned knowledge chunking |
//! | [`embedding`] | Embedder trait and vector helpers |
//! | [`workflow`] | Workflow criticality classification |
//! | [`prompt`] | Batch, synthesis, and function-calling prompts |
//! | [`validate`] | JSON extraction, shape remapping, quality scoring |
//! | [`issue_filter`] | Per-issue quality scoring, filtering, deduplication |
//! | [`screenshots`] | Frame reference parsing and screenshot mapping |
//! | [`retrieval`] | Knowledge retrieval with caching |
//! | [`progress`] | Progress query computation |
//! | [`store`] | Storage traits and the in-memory backend |

pub mod batch;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod issue_filter;
pub mod models;
pub mod progress;
pub mod prompt;
pub mod retrieval;
pub mod screenshots;
pub mod store;
pub mod validate;
pub mod workflow;
