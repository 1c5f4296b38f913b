//! Single-pass statement compiler for the Tarn language.
//!
//! The compiler scans the token stream exactly once and simultaneously
//! resolves identifiers within a nested block hierarchy, enforces static
//! type rules, and emits linear bytecode - including the control-flow
//! fixup machinery for forward jumps and the per-scope reference-count
//! maintenance required by the language's hybrid value/reference
//! semantics.
//!
//! Entry point: [`Compiler::new`] followed by [`Compiler::compile`].

pub mod blocks;
pub use blocks::{Block, Blocks};

pub mod idents;
pub use idents::{Ident, IdentId, IdentKind, Idents, Storage};

pub mod consts;
pub use consts::{ConstValue, DataSegment};

pub mod externals;
pub use externals::{External, Externals};

pub mod compiler;
pub use compiler::{Compiler, Module};

mod decl;
mod expr;
mod stmt;
