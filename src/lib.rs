//! Tracewright captures a running program's function calls as an explicit,
//! replayable call graph, persists it as JSON, and regenerates equivalent
//! source code or unit tests from it.
//!
//! The instrumentation that intercepts calls in the host program lives
//! outside this crate; it feeds a [`core::CaptureSession`] with
//! enter/exit events and everything downstream (deduplicated call graph,
//! persistence, code generation) happens here.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;

pub use error::{Result, TracewrightError};
