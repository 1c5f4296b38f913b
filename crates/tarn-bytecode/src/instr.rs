//! The virtual machine instruction set, as emitted by the compiler.

use tarn_lexer::TokenKind;
use tarn_types::TypeKind;

/// Placeholder jump target of a not-yet-patched stub.
pub const UNPATCHED: usize = usize::MAX;

/// VM scratch registers addressable from bytecode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reg {
    /// Function result register.
    Result,
    Common0,
    Common1,
    /// Scratch register used by `for`-in for the collection.
    Common2,
}

/// Builtin routines dispatched by a single opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Builtin {
    Len,
    /// Allocate a dynamic array: pops item size and length, pushes the
    /// new array.
    Make,
}

/// One bytecode instruction.
///
/// Refcount-bearing instructions carry the value's [`TypeKind`] so the VM
/// can pick the release routine; jump instructions carry an absolute code
/// offset.
#[derive(Clone, Debug, PartialEq)]
pub enum Instr {
    Nop,
    Halt,
    PushIntConst(i64),
    PushRealConst(f64),
    PushGlobalPtr(u32),
    PushLocalPtr(i32),
    PushReg(Reg),
    Pop,
    PopReg(Reg),
    Dup,
    Deref(TypeKind),
    Assign { kind: TypeKind, size: u32 },
    SwapAssign { kind: TypeKind, size: u32 },
    /// Adjust a reference count: `op` is `++` or `--`.
    ChangeRefCnt { op: TokenKind, kind: TypeKind },
    /// Increment the new value's refcount, decrement the old target's,
    /// and store - the fused assignment used for all reference types.
    ChangeRefCntAssign { kind: TypeKind },
    /// `ChangeRefCntAssign` with the address above the value.
    SwapChangeRefCntAssign { kind: TypeKind },
    Unary { op: TokenKind, kind: TypeKind },
    Binary { op: TokenKind, kind: TypeKind },
    /// Pop index and length, push the address of item `index` of the
    /// fixed array whose address lies below.
    GetArrayPtr { item_size: u32 },
    /// Pop index, push the address of that item of the dynamic array
    /// whose handle lies below.
    GetDynArrayPtr,
    GetFieldPtr { offset: u32 },
    Goto(usize),
    GotoIf(usize),
    GotoIfNot(usize),
    Call(usize),
    CallExtern(usize),
    CallBuiltin { kind: TypeKind, builtin: Builtin },
    EnterFrame { local_size: u32 },
    LeaveFrame,
    Return { param_slots: u32 },
}

impl Instr {
    /// Jump target of `Goto`/`GotoIf`/`GotoIfNot`, if this is one.
    #[must_use]
    pub fn jump_target(&self) -> Option<usize> {
        match self {
            Instr::Goto(t) | Instr::GotoIf(t) | Instr::GotoIfNot(t) => Some(*t),
            _ => None,
        }
    }
}

fn fmt_target(f: &mut std::fmt::Formatter<'_>, target: usize) -> std::fmt::Result {
    if target == UNPATCHED {
        write!(f, "????")
    } else {
        write!(f, "{target:04}")
    }
}

impl std::fmt::Display for Instr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instr::Nop => write!(f, "nop"),
            Instr::Halt => write!(f, "halt"),
            Instr::PushIntConst(v) => write!(f, "push {v}"),
            Instr::PushRealConst(v) => write!(f, "push {v}"),
            Instr::PushGlobalPtr(offset) => write!(f, "push global {offset}"),
            Instr::PushLocalPtr(offset) => write!(f, "push local {offset}"),
            Instr::PushReg(reg) => write!(f, "push reg {reg:?}"),
            Instr::Pop => write!(f, "pop"),
            Instr::PopReg(reg) => write!(f, "pop reg {reg:?}"),
            Instr::Dup => write!(f, "dup"),
            Instr::Deref(kind) => write!(f, "deref {kind}"),
            Instr::Assign { kind, size } => write!(f, "assign {kind} {size}"),
            Instr::SwapAssign { kind, size } => write!(f, "swap assign {kind} {size}"),
            Instr::ChangeRefCnt { op, kind } => write!(f, "refcnt {op} {kind}"),
            Instr::ChangeRefCntAssign { kind } => write!(f, "refcnt assign {kind}"),
            Instr::SwapChangeRefCntAssign { kind } => write!(f, "swap refcnt assign {kind}"),
            Instr::Unary { op, kind } => write!(f, "unary {op} {kind}"),
            Instr::Binary { op, kind } => write!(f, "binary {op} {kind}"),
            Instr::GetArrayPtr { item_size } => write!(f, "get array ptr {item_size}"),
            Instr::GetDynArrayPtr => write!(f, "get dynarray ptr"),
            Instr::GetFieldPtr { offset } => write!(f, "get field ptr {offset}"),
            Instr::Goto(t) => {
                write!(f, "goto ")?;
                fmt_target(f, *t)
            }
            Instr::GotoIf(t) => {
                write!(f, "goto if ")?;
                fmt_target(f, *t)
            }
            Instr::GotoIfNot(t) => {
                write!(f, "goto if not ")?;
                fmt_target(f, *t)
            }
            Instr::Call(t) => write!(f, "call {t:04}"),
            Instr::CallExtern(entry) => write!(f, "call extern {entry}"),
            Instr::CallBuiltin { kind, builtin } => write!(f, "call builtin {builtin:?} {kind}"),
            Instr::EnterFrame { local_size } => {
                if *local_size == u32::MAX {
                    write!(f, "enter frame ????")
                } else {
                    write!(f, "enter frame {local_size}")
                }
            }
            Instr::LeaveFrame => write!(f, "leave frame"),
            Instr::Return { param_slots } => write!(f, "return {param_slots}"),
        }
    }
}
