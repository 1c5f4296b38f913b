//! Centralized limits and thresholds.
//!
//! Fixed maxima enforced by the type table and the block stack. Exceeding
//! any of them is a fatal diagnostic, not a silent truncation.

/// Maximum number of fields in a struct or interface.
pub const MAX_FIELDS: usize = 100;

/// Maximum number of parameters in a function signature.
pub const MAX_PARAMS: usize = 16;

/// Maximum lexical block nesting depth.
pub const MAX_BLOCK_NESTING: usize = 100;

/// Maximum identifier length in bytes.
pub const MAX_IDENT_LEN: usize = 255;

/// Recursion cap when spelling a type for a diagnostic.
pub const MAX_TYPE_SPELLING_DEPTH: usize = 10;
