//! # Agentic RAG
//!
//! A planning / orchestration / reflection engine for retrieval-augmented
//! question answering over a local document corpus.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────┐
//! │ Planner  │──▶│ Orchestrator │──▶│ Reflector │
//! │ (LLM)    │   │ + executors  │◀──│ (LLM)     │
//! └──────────┘   └──────┬───────┘   └───────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   ┌─────────────┐          ┌──────────────┐
//!   │ VectorIndex │          │ LexicalIndex │
//!   │ (embedder)  │          │ (BM25)       │
//!   └─────────────┘          └──────────────┘
//! ```
//!
//! Pure types and algorithms (tasks, scheduling, score fusion, indexes, run
//! state) live in `agentic-rag-core`. This crate adds the collaborators that
//! talk to the outside world and the engines that drive a run.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`context`] | Process-wide collaborators shared by runs |
//! | [`corpus`] | Filesystem corpus loader |
//! | [`llm`] | Language model abstraction |
//! | [`embedding`] | Embedding providers |
//! | [`retrieval`] | Hybrid vector + BM25 retrieval |
//! | [`planner`] | Query → task graph |
//! | [`executor`] | Task executor trait and registry |
//! | [`executors`] | Built-in executors |
//! | [`orchestrator`] | Runs the task graph |
//! | [`synthesis`] | Final answer generation |
//! | [`reflector`] | Quality check and follow-up tasks |
//! | [`workflow`] | Phase state machine |
//! | [`server`] | HTTP API |

pub mod calc;
pub mod config;
pub mod context;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod executor;
pub mod executors;
pub mod llm;
pub mod openai;
pub mod orchestrator;
pub mod planner;
pub mod reflector;
pub mod retrieval;
pub mod server;
pub mod synthesis;
pub mod workflow;
