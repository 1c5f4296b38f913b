//! Common types and utilities for the Tarn compiler.
//!
//! This crate provides foundational types used across all tarn crates:
//! - Source positions (`Pos`) and byte ranges (`Span`)
//! - Diagnostics (`Diagnostic`, `CompileResult`)
//! - Identifier name hashing (`NameHash`, `hash_name`)
//! - Compiler limits and thresholds

// Position and span types for source locations
pub mod span;
pub use span::{Pos, Span};

// Diagnostics - the single fatal error of a compilation
pub mod diagnostics;
pub use diagnostics::{CompileResult, Diagnostic};

// Identifier name hashing
pub mod names;
pub use names::{NameHash, hash_name};

// Centralized limits and thresholds
pub mod limits;
