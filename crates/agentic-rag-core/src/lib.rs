//! # Agentic RAG Core
//!
//! Runtime-free building blocks for the Agentic RAG workflow engine: the
//! task model, dependency scheduling, hybrid score fusion, workflow state,
//! and the index/embedding traits the retrieval layer is built on.
//!
//! This crate contains no tokio, HTTP, or filesystem dependencies. All I/O
//! (language models, embedding APIs, corpus loading) lives in the
//! `agentic-rag` app crate.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`task`] | `Task`, typed `TaskParams`, `TaskType`, `TaskStatus` |
//! | [`schedule`] | Priority-aware topological ordering of a task graph |
//! | [`fusion`] | Min-max normalization and weighted hybrid score fusion |
//! | [`state`] | `WorkflowState`, execution log, reflection verdicts, `WorkflowResult` |
//! | [`index`] | `SearchIndex` / `Embedder` traits and in-memory BM25 + vector indexes |
//! | [`embedding`] | Vector similarity helpers |

pub mod embedding;
pub mod fusion;
pub mod index;
pub mod schedule;
pub mod state;
pub mod task;
