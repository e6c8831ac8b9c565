//! # Sisyphus
//!
//! A closed-loop pipeline that asks a language model to propose a solution
//! to a natural-language goal, runs the candidate in a sandbox, judges the
//! result, and feeds the lessons back into the next attempt until the goal
//! is met or the iteration budget runs out.
//!
//! ## Modules
//!
//! - `checkpoint` - Resumable run snapshots with atomic file persistence
//! - `collaborator` - Uniform text-completion interface over LLM vendors
//! - `config` - Run settings and validation
//! - `controller` - The refinement state machine driving each iteration
//! - `evaluator` - Verdict classification with a deterministic fallback
//! - `knowledge` - Append-only insight store with relevance-ranked queries
//! - `proposer` - Bounded-context candidate generation
//! - `retry` - Bounded retry with exponential backoff
//! - `sandbox` - Isolated child-process execution with hard timeouts
//! - `testing` - Scripted doubles for loop-level tests
pub mod checkpoint;
pub mod collaborator;
pub mod config;
pub mod controller;
pub mod error;
pub mod evaluator;
pub mod knowledge;
pub mod proposer;
pub mod retry;
pub mod sandbox;
pub mod testing;
