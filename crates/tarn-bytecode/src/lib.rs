//! Bytecode instruction set and code generator for the Tarn compiler.
//!
//! The [`Generator`] owns the linear code buffer. Emission is append-only
//! and offsets are stable once an instruction is emitted; forward jumps
//! are emitted as stubs whose target is patched in place when the epilog
//! of the corresponding construct runs. Stub patching is LIFO-safe
//! because every construct opens and closes its stubs within one
//! recursive-descent call.

pub mod instr;
pub use instr::{Builtin, Instr, Reg};

pub mod generator;
pub use generator::{Generator, Gotos};

/// Render a code buffer as a disassembly listing.
#[must_use]
pub fn listing(code: &[Instr]) -> String {
    use std::fmt::Write;
    let mut out = String::new();
    for (offset, instr) in code.iter().enumerate() {
        let _ = writeln!(out, "{offset:04}  {instr}");
    }
    out
}
