//! # uxaudit
//!
//! Turns a short screen recording into a structured usability report.
//!
//! Frames are extracted with ffmpeg, analyzed batch by batch by a multimodal
//! LLM, validated and scored, then merged into one deduplicated report whose
//! issues are mapped back to the frames they were seen in. A knowledge base of
//! usability guidance is retrieved per user and injected into every prompt.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌──────────────┐   ┌──────────┐
//! │  ffmpeg  │──▶│ Batch + Prompt │──▶│ LLM gateway  │──▶│ Validate │
//! │  frames  │   │  (+knowledge)  │   │ retry/timeout│   │  + score │
//! └──────────┘   └───────────────┘   └──────────────┘   └────┬─────┘
//!                                                            │
//!                       ┌──────────────┐   ┌─────────────┐   │
//!                       │ Screenshots  │◀──│  Synthesis  │◀──┘
//!                       └──────┬───────┘   └─────────────┘
//!                              ▼
//!                         ┌──────────┐
//!                         │  SQLite  │
//!                         └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! uxaudit init                            # create database
//! uxaudit knowledge seed                  # default knowledge categories
//! uxaudit knowledge index ./guidelines    # embed usability guidance
//! uxaudit audit ./checkout.mp4 --title "Checkout"
//! uxaudit serve                           # HTTP API + worker pool
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite audit and knowledge stores |
//! | [`frames`] | ffmpeg frame extraction |
//! | [`embedding`] | Embedding clients |
//! | [`llm`] | Chat backend and retrying gateway |
//! | [`pipeline`] | Analysis orchestrator |
//! | [`jobs`] | Background worker pool |
//! | [`knowledge`] | Category seeding, preferences, indexing |
//! | [`audit_cmd`] | Audit, status, and report commands |
//! | [`progress`] | CLI progress reporting |
//! | [`server`] | HTTP server |

pub mod audit_cmd;
pub mod config;
pub mod db;
pub mod embedding;
pub mod frames;
pub mod jobs;
pub mod knowledge;
pub mod llm;
pub mod migrate;
pub mod pipeline;
pub mod progress;
pub mod server;
pub mod sqlite_store;
