//! Testing utilities
//!
//! Scripted doubles for the collaborator, sandbox, and checkpoint storage
//! so the refinement loop can be exercised end-to-end without a model,
//! an interpreter, or a disk.

pub mod mocks;
