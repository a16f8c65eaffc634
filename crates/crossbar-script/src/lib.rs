//! Sandboxed script evaluation for crossbar tools.
//!
//! Wraps the rhai engine behind a small seam: a fresh engine per
//! evaluation, argument injection as top-level variables, print capture,
//! an on-demand library resolver rooted at a configurable directory, and
//! a once-settable result slot. Host integrations register their own
//! namespaces before running.

pub mod engine;
pub mod toon;

pub use engine::{EvalOutcome, Evaluation, ResultSlot, SCRIPT_EXTENSION, ScriptRuntime};
