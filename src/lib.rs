//! # Igris
//!
//! Incremental document ingestion into a persistent semantic index, and
//! crash-safe persistence of conversation memory.
//!
//! Igris reads heterogeneous documents (text, markdown, CSV, JSON, logs,
//! source files, PDF, DOCX), splits them into overlapping chunks, embeds them
//! into an on-disk vector index kept in step with a plain JSON chunk store,
//! and can package both into a zip archive published to S3.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌──────────────┐   ┌───────────┐   ┌─────────┐
//! │  Loader  │──▶│ Chunker │──▶│ IndexBuilder │──▶│ Packager  │──▶│ Publish │
//! │ txt/pdf/ │   │ chars + │   │ vectors +    │   │ zip in a  │   │ S3 PUT  │
//! │ docx/... │   │ overlap │   │ chunk store  │   │ temp dir  │   │ (opt.)  │
//! └──────────┘   └─────────┘   └──────────────┘   └───────────┘   └─────────┘
//!        ▲ driven stage by stage by pipeline::Orchestrator
//!
//! ┌──────────────┐
//! │ MemoryStore  │  atomic write + .bak rotation, independent of ingestion
//! └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! igris ingest ./documents              # build or extend the index
//! igris ingest ./report.pdf --bucket kb # also publish the archive
//! igris search "cooling schedule"
//! igris stats                           # index / chunk store parity
//! igris memory append --role human "hello"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`loader`] | File and directory loading |
//! | [`extract`] | PDF and DOCX text extraction |
//! | [`chunk`] | Character-window chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | On-disk vector index |
//! | [`chunk_store`] | Parallel JSON chunk store |
//! | [`builder`] | Incremental index + store maintenance |
//! | [`package`] | Zip artifact packaging |
//! | [`publish`] | Remote upload |
//! | [`pipeline`] | Ingestion orchestration |
//! | [`memory`] | Durable conversation memory |
//! | [`persist`] | Atomic file replacement |
//! | [`search`] | Similarity search |
//! | [`stats`] | Index health overview |

pub mod builder;
pub mod chunk;
pub mod chunk_store;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod index;
pub mod loader;
pub mod memory;
pub mod models;
pub mod package;
pub mod persist;
pub mod pipeline;
pub mod publish;
pub mod search;
pub mod stats;
