//! The code generator.
//!
//! Control-flow constructs drive the generator through prolog/epilog
//! pairs. Each pair communicates through an internal stub stack: a prolog
//! records the offset of a placeholder jump (or of a loop head), the
//! matching epilog pops it and patches the placeholder with the by-then
//! known target. Since every construct opens and closes its entries
//! within a single recursive-descent call, the stack discipline is LIFO.
//!
//! `break`/`continue`/`return` jumps cannot use the stack - any number of
//! them may accumulate inside one construct - so they live in caller-owned
//! [`Gotos`] sets patched all at once by `gotos_epilog`.

use smallvec::SmallVec;
use tarn_lexer::TokenKind;
use tarn_types::TypeKind;

use crate::instr::{Builtin, Instr, Reg, UNPATCHED};

/// A set of pending forward jumps bound to a target block.
///
/// `block` is the block depth at which the set was created, so exits know
/// how many scopes' worth of refcount decrements to insert before the
/// jump stub.
#[derive(Debug)]
pub struct Gotos {
    pub block: u32,
    stubs: SmallVec<[usize; 4]>,
}

impl Gotos {
    #[must_use]
    pub fn new(block: u32) -> Self {
        Gotos {
            block,
            stubs: SmallVec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stubs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stubs.is_empty()
    }
}

/// Owns the code buffer and hands out offsets.
#[derive(Default)]
pub struct Generator {
    code: Vec<Instr>,
    stack: Vec<usize>,
}

impl Generator {
    /// A fresh generator. Slot 0 is reserved as the program entry
    /// placeholder, patched by `entry_point(0)` when `main` is compiled.
    #[must_use]
    pub fn new() -> Self {
        Generator {
            code: vec![Instr::Nop],
            stack: Vec::new(),
        }
    }

    /// Offset of the next instruction to be emitted.
    #[inline]
    #[must_use]
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    #[must_use]
    pub fn code(&self) -> &[Instr] {
        &self.code
    }

    #[inline]
    fn emit(&mut self, instr: Instr) -> usize {
        self.code.push(instr);
        self.code.len() - 1
    }

    /// Redirect the jump at `at` to the current offset.
    fn patch_jump(&mut self, at: usize) {
        let target = self.offset();
        match &mut self.code[at] {
            Instr::Goto(t) | Instr::GotoIf(t) | Instr::GotoIfNot(t) => *t = target,
            other => unreachable!("patch target at {at} is not a jump: {other:?}"),
        }
    }

    fn pop_stub(&mut self) -> usize {
        self.stack.pop().expect("generator stub stack underflow")
    }

    // =========================================================================
    // Plain emission
    // =========================================================================

    pub fn nop(&mut self) -> usize {
        self.emit(Instr::Nop)
    }

    pub fn halt(&mut self) {
        self.emit(Instr::Halt);
    }

    pub fn push_int_const(&mut self, value: i64) {
        self.emit(Instr::PushIntConst(value));
    }

    pub fn push_real_const(&mut self, value: f64) {
        self.emit(Instr::PushRealConst(value));
    }

    pub fn push_global_ptr(&mut self, offset: u32) {
        self.emit(Instr::PushGlobalPtr(offset));
    }

    pub fn push_local_ptr(&mut self, offset: i32) {
        self.emit(Instr::PushLocalPtr(offset));
    }

    pub fn push_reg(&mut self, reg: Reg) {
        self.emit(Instr::PushReg(reg));
    }

    pub fn pop(&mut self) {
        self.emit(Instr::Pop);
    }

    pub fn pop_reg(&mut self, reg: Reg) {
        self.emit(Instr::PopReg(reg));
    }

    pub fn dup(&mut self) {
        self.emit(Instr::Dup);
    }

    pub fn deref(&mut self, kind: TypeKind) {
        self.emit(Instr::Deref(kind));
    }

    pub fn assign(&mut self, kind: TypeKind, size: u32) {
        self.emit(Instr::Assign { kind, size });
    }

    pub fn swap_assign(&mut self, kind: TypeKind, size: u32) {
        self.emit(Instr::SwapAssign { kind, size });
    }

    /// `op` is `++` or `--`.
    pub fn change_ref_cnt(&mut self, op: TokenKind, kind: TypeKind) {
        self.emit(Instr::ChangeRefCnt { op, kind });
    }

    pub fn change_ref_cnt_assign(&mut self, kind: TypeKind) {
        self.emit(Instr::ChangeRefCntAssign { kind });
    }

    pub fn swap_change_ref_cnt_assign(&mut self, kind: TypeKind) {
        self.emit(Instr::SwapChangeRefCntAssign { kind });
    }

    pub fn unary(&mut self, op: TokenKind, kind: TypeKind) {
        self.emit(Instr::Unary { op, kind });
    }

    pub fn binary(&mut self, op: TokenKind, kind: TypeKind) {
        self.emit(Instr::Binary { op, kind });
    }

    pub fn get_array_ptr(&mut self, item_size: u32) {
        self.emit(Instr::GetArrayPtr { item_size });
    }

    pub fn get_dyn_array_ptr(&mut self) {
        self.emit(Instr::GetDynArrayPtr);
    }

    pub fn get_field_ptr(&mut self, offset: u32) {
        self.emit(Instr::GetFieldPtr { offset });
    }

    pub fn call(&mut self, entry: usize) {
        self.emit(Instr::Call(entry));
    }

    pub fn call_extern(&mut self, entry: usize) {
        self.emit(Instr::CallExtern(entry));
    }

    pub fn call_builtin(&mut self, kind: TypeKind, builtin: Builtin) {
        self.emit(Instr::CallBuiltin { kind, builtin });
    }

    pub fn return_(&mut self, param_slots: u32) {
        self.emit(Instr::Return { param_slots });
    }

    // =========================================================================
    // if
    // =========================================================================

    /// Condition value is on the stack; emit the jump taken when it is
    /// false. Target patched by `else_prolog` or `if_else_epilog`.
    pub fn if_cond_epilog(&mut self) {
        let stub = self.emit(Instr::GotoIfNot(UNPATCHED));
        self.stack.push(stub);
    }

    /// End of the then-branch: skip the else-branch, land the false-jump
    /// here.
    pub fn else_prolog(&mut self) {
        let cond_stub = self.pop_stub();
        let end_stub = self.emit(Instr::Goto(UNPATCHED));
        self.patch_jump(cond_stub);
        self.stack.push(end_stub);
    }

    /// Patch whichever stub is pending (the false-jump if there was no
    /// else-branch, the end-jump otherwise).
    pub fn if_else_epilog(&mut self) {
        let stub = self.pop_stub();
        self.patch_jump(stub);
    }

    /// Left operand of `&&`/`||` is on the stack: keep it and jump over
    /// the right operand when it already decides the result.
    pub fn short_circuit_prolog(&mut self, op: TokenKind) {
        self.dup();
        let stub = match op {
            TokenKind::AndAnd => self.emit(Instr::GotoIfNot(UNPATCHED)),
            TokenKind::OrOr => self.emit(Instr::GotoIf(UNPATCHED)),
            _ => unreachable!("short-circuit operator expected, found {op}"),
        };
        self.stack.push(stub);
        self.pop();
    }

    /// Land the short-circuit jump after the right operand.
    pub fn short_circuit_epilog(&mut self) {
        let stub = self.pop_stub();
        self.patch_jump(stub);
    }

    // =========================================================================
    // switch
    // =========================================================================

    /// One case expression: duplicate the selector (which lives on the
    /// operand stack for the whole switch, so nested switches cannot
    /// clobber it), compare against a constant, and jump into the case
    /// body on a match.
    pub fn case_expr_epilog(&mut self, value: i64) {
        self.dup();
        self.push_int_const(value);
        self.binary(TokenKind::EqEq, TypeKind::Int);
        let stub = self.emit(Instr::GotoIf(UNPATCHED));
        self.stack.push(stub);
    }

    /// Start of a case body: emit the skip-to-next-case jump, land the
    /// case's match-jumps here, and discard the selector on this (taken)
    /// path.
    pub fn case_block_prolog(&mut self, num_exprs: usize) {
        let skip_stub = self.emit(Instr::Goto(UNPATCHED));
        for _ in 0..num_exprs {
            let stub = self.pop_stub();
            self.patch_jump(stub);
        }
        self.pop();
        self.stack.push(skip_stub);
    }

    /// End of a case body: jump to the switch end (patched by
    /// `switch_epilog`), then land the skip-jump on the next case test.
    pub fn case_block_epilog(&mut self) {
        let end_stub = self.emit(Instr::Goto(UNPATCHED));
        let skip_stub = self.pop_stub();
        self.patch_jump(skip_stub);
        self.stack.push(end_stub);
    }

    /// Start of the default region, reached when no case matched:
    /// discard the selector. Emitted whether or not a default clause
    /// follows.
    pub fn switch_default_prolog(&mut self) {
        self.pop();
    }

    /// Patch every case's end-jump to the switch end.
    pub fn switch_epilog(&mut self, num_cases: usize) {
        for _ in 0..num_cases {
            let stub = self.pop_stub();
            self.patch_jump(stub);
        }
    }

    // =========================================================================
    // for
    // =========================================================================

    /// Mark the loop head (target of the back-edge).
    pub fn for_cond_prolog(&mut self) {
        let head = self.offset();
        self.stack.push(head);
    }

    /// Condition value is on the stack. Emits the loop exit jump and the
    /// jump over the post-statement into the body; the post-statement
    /// region starts here.
    pub fn for_cond_epilog(&mut self) {
        let exit_stub = self.emit(Instr::GotoIfNot(UNPATCHED));
        let body_stub = self.emit(Instr::Goto(UNPATCHED));
        self.stack.push(exit_stub);
        self.stack.push(body_stub);
        let post_start = self.offset();
        self.stack.push(post_start);
    }

    /// End of the post-statement region: close the back-edge to the loop
    /// head and start the body.
    pub fn for_post_stmt_epilog(&mut self) {
        let post_start = self.pop_stub();
        let body_stub = self.pop_stub();
        let exit_stub = self.pop_stub();
        let head = self.pop_stub();
        self.emit(Instr::Goto(head));
        self.patch_jump(body_stub);
        self.stack.push(post_start);
        self.stack.push(exit_stub);
    }

    /// End of the body: jump back to the post-statement region and land
    /// the exit jump here.
    pub fn for_epilog(&mut self) {
        let exit_stub = self.pop_stub();
        let post_start = self.pop_stub();
        self.emit(Instr::Goto(post_start));
        self.patch_jump(exit_stub);
    }

    // =========================================================================
    // break / continue / return sets
    // =========================================================================

    /// Add a pending forward jump to the set.
    pub fn gotos_add_stub(&mut self, gotos: &mut Gotos) {
        let stub = self.emit(Instr::Goto(UNPATCHED));
        gotos.stubs.push(stub);
    }

    /// Patch every pending jump in the set to the current offset.
    pub fn gotos_epilog(&mut self, gotos: &mut Gotos) {
        for stub in std::mem::take(&mut gotos.stubs) {
            self.patch_jump(stub);
        }
    }

    // =========================================================================
    // Frames and entry points
    // =========================================================================

    /// Emit an enter-frame whose local size is not yet known.
    pub fn enter_frame_stub(&mut self) {
        let stub = self.emit(Instr::EnterFrame {
            local_size: u32::MAX,
        });
        self.stack.push(stub);
    }

    /// Patch the pending enter-frame with the accumulated local size and
    /// emit the matching leave-frame.
    pub fn leave_frame_fixup(&mut self, local_size: u32) {
        let stub = self.pop_stub();
        match &mut self.code[stub] {
            Instr::EnterFrame { local_size: slot } => *slot = local_size,
            other => unreachable!("enter-frame stub expected at {stub}, found {other:?}"),
        }
        self.emit(Instr::LeaveFrame);
    }

    /// Patch the placeholder at `at` (the program entry slot or a
    /// prototype's reserved `Nop`) into a jump to the current offset.
    pub fn entry_point(&mut self, at: usize) {
        let target = self.offset();
        match &mut self.code[at] {
            Instr::Nop => self.code[at] = Instr::Goto(target),
            other => unreachable!("entry point placeholder expected at {at}, found {other:?}"),
        }
    }

    /// True when every construct closed its stubs - used as a sanity
    /// check at end of module.
    #[must_use]
    pub fn stubs_closed(&self) -> bool {
        self.stack.is_empty()
    }

    /// Render the whole code buffer as a disassembly listing.
    #[must_use]
    pub fn listing(&self) -> String {
        crate::listing(&self.code)
    }
}
