//! # csv-rag
//!
//! Ask cited questions over an uploaded CSV.
//!
//! Each row of the CSV becomes a document (`"column: value"` lines), is
//! embedded, and is stored in a persisted vector index. A question retrieves
//! a deduplicated, diverse set of rows, which are packed into a prompt under
//! a character budget and sent to a chat model. The answer comes back with
//! the row numbers it was grounded on.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌────────────┐   ┌────────────┐   ┌──────────────┐
//! │  CSV    │──▶│ Serializer │──▶│ Embedder   │──▶│ VectorIndex  │──▶ disk
//! └─────────┘   └────────────┘   └────────────┘   └──────┬───────┘
//!                                                        │ swap
//!                        ┌───────────────────────────────┘
//!                        ▼
//! question ──▶ Retriever (MMR | similarity) ──▶ Prompt ──▶ Responder ──▶ answer + rows
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! csvrag ingest customers.csv
//! csvrag ask "Which customer has high churn risk?"
//! csvrag serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML + environment configuration |
//! | [`models`] | Core data types |
//! | [`table`] | CSV parsing |
//! | [`serialize`] | Row → document rendering |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index, MMR, persistence |
//! | [`retrieve`] | Retrieval strategies, dedup, truncation |
//! | [`prompt`] | Budgeted, cited prompt assembly |
//! | [`respond`] | Fail-soft chat completion |
//! | [`pipeline`] | Ingest/ask orchestration and the live index slot |
//! | [`server`] | HTTP API |
//! | [`logging`] | Tracing subscriber setup |

pub mod config;
pub mod embedding;
pub mod index;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod respond;
pub mod retrieve;
pub mod serialize;
pub mod server;
pub mod table;
