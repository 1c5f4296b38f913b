//! The compiler state machine.
//!
//! One serially mutated state: lexer, type table, identifier table, block
//! stack, code generator, data segment, and the current break/continue/
//! return jump sets. All compilation is synchronous; errors are fatal and
//! propagate as `CompileResult` immediately.

use tracing::debug;

use tarn_bytecode::{Builtin, Generator, Gotos, Instr, listing};
use tarn_common::{CompileResult, Diagnostic};
use tarn_lexer::{Lexer, TokenKind};
use tarn_types::{Signature, TypeError, TypeId, TypeKind, TypeTable};

use crate::blocks::Blocks;
use crate::consts::{ConstValue, DataSegment};
use crate::externals::Externals;
use crate::idents::{IdentId, IdentKind, Idents, Storage};

/// Two stack slots (saved frame pointer and return address) separate a
/// function's parameters from its frame base.
const PARAM_FRAME_GAP: i32 = 2 * tarn_types::table::SLOT_SIZE as i32;

/// The predeclared types of the global scope.
pub(crate) struct Predecl {
    pub void: TypeId,
    pub int: TypeId,
    pub bool_: TypeId,
    pub char_: TypeId,
    pub real: TypeId,
    pub str_: TypeId,
    pub fiber: TypeId,
    pub void_ptr: TypeId,
    pub null_ptr: TypeId,
}

/// The compiled module: linear bytecode plus its global data segment
/// (globals and interned string data).
#[derive(Debug)]
pub struct Module {
    pub code: Vec<Instr>,
    pub data: Vec<u8>,
}

impl Module {
    /// Size of the global data segment in bytes.
    #[must_use]
    pub fn globals_size(&self) -> u32 {
        self.data.len() as u32
    }

    /// Disassembly listing of the whole code buffer.
    #[must_use]
    pub fn listing(&self) -> String {
        listing(&self.code)
    }
}

/// The single-pass compiler.
pub struct Compiler {
    pub(crate) lex: Lexer,
    pub(crate) types: TypeTable,
    pub(crate) idents: Idents,
    pub(crate) blocks: Blocks,
    pub(crate) r#gen: Generator,
    pub(crate) data: DataSegment,
    pub(crate) externals: Externals,
    pub(crate) breaks: Option<Gotos>,
    pub(crate) continues: Option<Gotos>,
    pub(crate) returns: Option<Gotos>,
    pub(crate) prim: Predecl,
    tmp_counter: u32,
}

impl Compiler {
    /// Create a compiler over one source file with no externals.
    pub fn new(file: &str, source: &str) -> CompileResult<Self> {
        Self::with_externals(file, source, Externals::new())
    }

    /// Create a compiler with a registry of host externals available for
    /// prototype resolution.
    pub fn with_externals(
        file: &str,
        source: &str,
        externals: Externals,
    ) -> CompileResult<Self> {
        let lex = Lexer::new(file, source)?;
        let mut types = TypeTable::new();
        let mut idents = Idents::new();

        let void = types.add(0, TypeKind::Void);
        let null = types.add(0, TypeKind::Null);
        let int = types.add(0, TypeKind::Int);
        let bool_ = types.add(0, TypeKind::Bool);
        let char_ = types.add(0, TypeKind::Char);
        let real = types.add(0, TypeKind::Real);
        let str_ = types.add(0, TypeKind::Str);
        let fiber = types.add(0, TypeKind::Fiber);
        let void_ptr = types.add_ptr_to(0, void);
        let null_ptr = types.add_ptr_to(0, null);

        let named = [
            ("void", void),
            ("int", int),
            ("int8", types.add(0, TypeKind::Int8)),
            ("int16", types.add(0, TypeKind::Int16)),
            ("int32", types.add(0, TypeKind::Int32)),
            ("uint", types.add(0, TypeKind::UInt)),
            ("uint8", types.add(0, TypeKind::UInt8)),
            ("uint16", types.add(0, TypeKind::UInt16)),
            ("uint32", types.add(0, TypeKind::UInt32)),
            ("bool", bool_),
            ("char", char_),
            ("real", real),
            ("real32", types.add(0, TypeKind::Real32)),
        ];
        for (name, ty) in named {
            idents
                .add(IdentKind::Type, name, ty, 0, Storage::None, false)
                .map_err(|e| Diagnostic::error(file, tarn_common::Pos::start(), e.0))?;
        }

        let builtins: [(&str, Storage, TypeId); 4] = [
            ("true", Storage::Constant(ConstValue::Int(1)), bool_),
            ("false", Storage::Constant(ConstValue::Int(0)), bool_),
            ("null", Storage::Constant(ConstValue::Null), null_ptr),
            ("len", Storage::Builtin(Builtin::Len), int),
        ];
        for (name, storage, ty) in builtins {
            let kind = if matches!(storage, Storage::Builtin(_)) {
                IdentKind::Fn
            } else {
                IdentKind::Const
            };
            idents
                .add(kind, name, ty, 0, storage, false)
                .map_err(|e| Diagnostic::error(file, tarn_common::Pos::start(), e.0))?;
        }

        Ok(Compiler {
            lex,
            types,
            idents,
            blocks: Blocks::new(),
            r#gen: Generator::new(),
            data: DataSegment::new(),
            externals,
            breaks: None,
            continues: None,
            returns: None,
            prim: Predecl {
                void,
                int,
                bool_,
                char_,
                real,
                str_,
                fiber,
                void_ptr,
                null_ptr,
            },
            tmp_counter: 0,
        })
    }

    /// Compile the module to completion.
    pub fn compile(mut self) -> CompileResult<Module> {
        debug!(file = self.lex.file(), "compiling module");
        self.parse_module()?;
        self.resolve_externs()?;
        self.types
            .assert_forwards_resolved()
            .map_err(|e| self.ty_err(e))?;
        debug_assert!(self.r#gen.stubs_closed(), "pending jump stubs at end of module");
        Ok(Module {
            code: self.r#gen.code().to_vec(),
            data: self.data.bytes().to_vec(),
        })
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    pub(crate) fn error(&self, message: impl Into<String>) -> Diagnostic {
        self.lex.error(message)
    }

    pub(crate) fn ty_err(&self, e: TypeError) -> Diagnostic {
        self.lex.error(e.0)
    }

    pub(crate) fn size_of(&self, ty: TypeId) -> CompileResult<u32> {
        self.types.size_of(ty).map_err(|e| self.ty_err(e))
    }

    pub(crate) fn check_compatible(
        &self,
        left: TypeId,
        right: TypeId,
        symmetric: bool,
    ) -> CompileResult<()> {
        self.types
            .assert_compatible(left, right, symmetric)
            .map_err(|e| self.ty_err(e))
    }

    pub(crate) fn check_valid_operator(&self, ty: TypeId, op: TokenKind) -> CompileResult<()> {
        self.types
            .assert_valid_operator(ty, op)
            .map_err(|e| self.ty_err(e))
    }

    // =========================================================================
    // Variable allocation
    // =========================================================================

    /// Allocate a variable in the current block: a frame slot inside a
    /// function body, a data segment slot at global scope.
    pub(crate) fn alloc_var(
        &mut self,
        name: &str,
        ty: TypeId,
        exported: bool,
    ) -> CompileResult<IdentId> {
        let size = self.size_of(ty)?;
        let storage = if self.blocks.enclosing_fn().is_some() {
            Storage::Local(self.blocks.alloc_local(size))
        } else {
            Storage::Global(self.data.alloc(size))
        };
        self.idents
            .add(
                IdentKind::Var,
                name,
                ty,
                self.blocks.current(),
                storage,
                exported,
            )
            .map_err(|e| self.ty_err(e))
    }

    /// Declare parameter `index` of `sig` as a local ident, using the
    /// signature's slot-aligned layout.
    pub(crate) fn alloc_param(&mut self, sig: &Signature, index: usize) -> CompileResult<IdentId> {
        let total = self.types.param_size_total(sig).map_err(|e| self.ty_err(e))?;
        let up_to = self
            .types
            .param_size_up_to(sig, index)
            .map_err(|e| self.ty_err(e))?;
        let param = &sig.params[index];
        let offset = (total - up_to) as i32 + PARAM_FRAME_GAP;
        self.idents
            .add(
                IdentKind::Var,
                &param.name,
                param.ty,
                self.blocks.current(),
                Storage::Local(offset),
                false,
            )
            .map_err(|e| self.ty_err(e))
    }

    /// Fresh synthetic name for a compiler temporary.
    pub(crate) fn tmp_name(&mut self, prefix: &str) -> String {
        let name = format!("__{prefix}{}", self.tmp_counter);
        self.tmp_counter += 1;
        name
    }

    // =========================================================================
    // Emission helpers
    // =========================================================================

    /// Push the address of a variable.
    pub(crate) fn push_var_ptr(&mut self, id: IdentId) {
        match self.idents.get(id).storage {
            Storage::Local(offset) => self.r#gen.push_local_ptr(offset),
            Storage::Global(offset) => self.r#gen.push_global_ptr(offset),
            ref other => unreachable!("variable storage expected, found {other:?}"),
        }
    }

    /// The type a designator reports for a variable of type `ty`:
    /// the type itself for structured values (whose representation is an
    /// address), a pointer to it for non-structured lvalues.
    pub(crate) fn reported_ty(&mut self, ty: TypeId) -> TypeId {
        if self.types.is_structured(ty) {
            ty
        } else {
            self.types.add_ptr_to(self.blocks.current(), ty)
        }
    }

    /// Refcount adjustment, emitted only for garbage-collected types.
    pub(crate) fn emit_change_ref_cnt(&mut self, op: TokenKind, ty: TypeId) {
        if self.types.garbage_collected(ty) {
            self.r#gen.change_ref_cnt(op, self.types.kind(ty));
        }
    }

    /// The fused inc-new/dec-old/store assignment; degrades to a plain
    /// store for types that carry no reference count.
    pub(crate) fn emit_change_ref_cnt_assign(&mut self, ty: TypeId) -> CompileResult<()> {
        let kind = self.types.kind(ty);
        if self.types.garbage_collected(ty) {
            self.r#gen.change_ref_cnt_assign(kind);
        } else {
            let size = self.size_of(ty)?;
            self.r#gen.assign(kind, size);
        }
        Ok(())
    }

    /// As above, with the address above the value on the stack.
    pub(crate) fn emit_swap_change_ref_cnt_assign(&mut self, ty: TypeId) -> CompileResult<()> {
        let kind = self.types.kind(ty);
        if self.types.garbage_collected(ty) {
            self.r#gen.swap_change_ref_cnt_assign(kind);
        } else {
            let size = self.size_of(ty)?;
            self.r#gen.swap_assign(kind, size);
        }
        Ok(())
    }

    // =========================================================================
    // Reference-count inserter
    // =========================================================================

    /// Emit a refcount decrement for every garbage-collected variable
    /// owned by `block`, in declaration order.
    pub(crate) fn collect(&mut self, block: u32) {
        for id in self.idents.ids() {
            let ident = self.idents.get(id);
            if ident.kind != IdentKind::Var
                || ident.block != block
                || !self.types.garbage_collected(ident.ty)
            {
                continue;
            }
            let kind = self.types.kind(ident.ty);
            self.push_var_ptr(id);
            self.r#gen.deref(kind);
            self.r#gen.change_ref_cnt(TokenKind::MinusMinus, kind);
            self.r#gen.pop();
        }
    }

    /// Collect garbage over all scopes down to `block`, not inclusive.
    /// Used by `break`/`continue`/`return` so jumps out of nested scopes
    /// release the scopes they skip.
    pub(crate) fn collect_down_to(&mut self, block: u32) {
        let skipped: Vec<u32> = self
            .blocks
            .iter_innermost_first()
            .map(|b| b.block)
            .take_while(|&b| b != block)
            .collect();
        for b in skipped {
            self.collect(b);
        }
    }

    // =========================================================================
    // Implicit conversion and operator application
    // =========================================================================

    /// Implicit conversion of `src` toward `dest`, consistent with the
    /// compatibility table: integers widen/narrow within the family,
    /// reals likewise, `null` adopts the destination pointer type.
    /// Returns the adjusted source type; no code is emitted (the operand
    /// stack is slot-wide).
    pub(crate) fn implicit_conv(&self, dest: TypeId, src: TypeId) -> TypeId {
        let (dk, sk) = (self.types.kind(dest), self.types.kind(src));
        if dk.is_integer() && sk.is_integer() {
            return dest;
        }
        if dk.is_real() && sk.is_real() {
            return dest;
        }
        if dk == TypeKind::Ptr
            && sk == TypeKind::Ptr
            && self.types.kind(self.types.base(src)) == TypeKind::Null
        {
            return dest;
        }
        src
    }

    /// Apply a binary operator to already-emitted operands: convert the
    /// right type toward the left, check compatibility and operator
    /// validity, emit the operation. Comparisons yield `bool`.
    pub(crate) fn apply_operator(
        &mut self,
        op: TokenKind,
        left: TypeId,
        right: TypeId,
    ) -> CompileResult<TypeId> {
        let right = self.implicit_conv(left, right);
        self.check_compatible(left, right, true)?;
        self.check_valid_operator(left, op)?;
        self.r#gen.binary(op, self.types.kind(left));
        Ok(if is_comparison(op) { self.prim.bool_ } else { left })
    }

    // =========================================================================
    // Extern resolution
    // =========================================================================

    /// Match every ident that still has a prototype entry against the
    /// external registry and emit its trampoline: enter frame, declare
    /// parameters (so they participate in garbage collection), call the
    /// external, collect, leave frame, return.
    pub(crate) fn resolve_externs(&mut self) -> CompileResult<()> {
        for id in self.idents.ids() {
            let ident = self.idents.get(id);
            let Some(proto_offset) = ident.prototype_offset else {
                continue;
            };
            let name = ident.name.clone();
            let Some(external) = self.externals.find(&name) else {
                return Err(self.error(format!("Unresolved prototype of {name}")));
            };
            let entry = external.entry;
            debug!(%name, entry, "resolving extern");

            let sig = self
                .types
                .get(self.idents.get(id).ty)
                .sig
                .clone()
                .expect("function ident has a signature");

            self.blocks.enter(Some(id)).map_err(|e| self.ty_err(e))?;
            self.r#gen.entry_point(proto_offset);
            self.r#gen.enter_frame_stub();
            for index in 0..sig.params.len() {
                self.alloc_param(&sig, index)?;
            }
            self.r#gen.call_extern(entry);

            self.collect(self.blocks.current());
            self.idents.free_block(self.blocks.current());
            self.r#gen.leave_frame_fixup(0);

            let param_slots =
                self.types.param_size_total(&sig).map_err(|e| self.ty_err(e))?
                    / tarn_types::table::SLOT_SIZE;
            self.r#gen.return_(param_slots);
            self.blocks.leave();

            self.idents.get_mut(id).prototype_offset = None;
        }
        Ok(())
    }
}

/// Comparison operators produce `bool` regardless of operand type.
pub(crate) fn is_comparison(op: TokenKind) -> bool {
    matches!(
        op,
        TokenKind::EqEq
            | TokenKind::NotEq
            | TokenKind::Less
            | TokenKind::LessEq
            | TokenKind::Greater
            | TokenKind::GreaterEq
    )
}
