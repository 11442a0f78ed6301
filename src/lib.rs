//! # Wiz Harness
//!
//! Retrieval-augmented support assistant for software installation.
//!
//! Content from web articles, GitHub repositories and a structured
//! knowledge base is normalized, segmented, embedded and kept in a vector
//! index. Conversations retrieve from that index, classify their own
//! status each turn, and end as SOLVED or ESCALATED.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────────┐   ┌──────────┐
//! │ Connectors  │──▶│ normalize → segment  │──▶│  SQLite   │
//! │ git/fs/web  │   │ → tag → embed        │   │ vectors   │
//! │ + KB files  │   │ (reindex per source) │   │ + docs    │
//! └─────────────┘   └──────────────────────┘   └────┬─────┘
//!                                                   │
//!                      ┌────────────────────────────┤
//!                      ▼                            ▼
//!                 ┌──────────┐   retrieve → analyze → generate
//!                 │   CLI    │   ┌─────────────────────────┐
//!                 │  (wiz)   │   │ HTTP chat bridge (axum) │
//!                 └──────────┘   └─────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`normalize`] | Text cleanup |
//! | [`chunk`] | Segmentation |
//! | [`provenance`] | Chunk identity and metadata |
//! | [`pipeline`] | Document → chunks |
//! | [`embedding`] | Embedding providers and the fixed-dimension adapter |
//! | [`store`] | Vector and document stores |
//! | [`reindex`] | Per-source vector replacement |
//! | [`retrieve`] | Deduplicated top-K retrieval |
//! | [`llm`] | Chat-completion client and turn budget |
//! | [`assistant`] | Conversation engine |
//! | [`connectors`] | Source connectors and dispatch |
//! | [`knowledge_base`] | Knowledge-base loader and sync |
//! | [`ingest`] | CLI ingestion commands |
//! | [`server`] | HTTP chat bridge |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`testing`] | Deterministic fakes |

pub mod assistant;
pub mod chunk;
pub mod config;
pub mod connectors;
pub mod db;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod knowledge_base;
pub mod llm;
pub mod locks;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod provenance;
pub mod reindex;
pub mod retrieve;
pub mod server;
pub mod sources;
pub mod store;
pub mod testing;
