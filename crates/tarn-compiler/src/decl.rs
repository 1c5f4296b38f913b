//! Declaration parsing: `type`, `const`, `var`, `fn`, and the type
//! expression syntax they share.
//!
//! Module scope only admits declarations; the short variable declaration
//! `name := expr` doubles as a statement form and lives here because the
//! global flavor writes folded constants straight into the data segment.

use tracing::debug;

use tarn_common::CompileResult;
use tarn_lexer::TokenKind;
use tarn_types::{Signature, TypeId, TypeKind};

use crate::compiler::Compiler;
use crate::idents::{IdentId, IdentKind, Storage};

impl Compiler {
    /// module = {decl}.
    pub(crate) fn parse_module(&mut self) -> CompileResult<()> {
        loop {
            match self.lex.tok.kind {
                TokenKind::Eof => return Ok(()),
                TokenKind::Semicolon => self.lex.next()?,
                TokenKind::Type => self.parse_type_decl()?,
                TokenKind::Const => self.parse_const_decl()?,
                TokenKind::Var => self.parse_var_decl()?,
                TokenKind::Fn => self.parse_fn_decl()?,
                TokenKind::Ident => self.parse_short_var_decl()?,
                other => {
                    return Err(
                        self.error(format!("Declaration expected but {other} found"))
                    );
                }
            }
        }
    }

    /// decl = typeDecl | constDecl | varDecl.
    /// The statement-level subset; function declarations are module-only.
    pub(crate) fn parse_decl(&mut self) -> CompileResult<()> {
        match self.lex.tok.kind {
            TokenKind::Type => self.parse_type_decl(),
            TokenKind::Const => self.parse_const_decl(),
            TokenKind::Var => self.parse_var_decl(),
            other => Err(self.error(format!("Declaration expected but {other} found"))),
        }
    }

    // =========================================================================
    // Type declarations
    // =========================================================================

    /// typeDecl = "type" ident "=" type.
    fn parse_type_decl(&mut self) -> CompileResult<()> {
        self.lex.eat(TokenKind::Type)?;
        self.lex.check(TokenKind::Ident)?;
        let name = self.lex.tok.name.clone();
        self.lex.next()?;
        self.lex.eat(TokenKind::Eq)?;

        let mark = self.types.len();
        let ty = self.parse_type()?;
        // Name freshly built types; never rename a shared predeclared one.
        if ty.index() >= mark && self.types.get(ty).decl_name.is_none() {
            self.types.get_mut(ty).decl_name = Some(name.clone());
        }
        self.idents
            .add(
                IdentKind::Type,
                &name,
                ty,
                self.blocks.current(),
                Storage::None,
                false,
            )
            .map_err(|e| self.ty_err(e))?;

        // Resolve pending forward references to this name.
        let forwards: Vec<TypeId> = self
            .types
            .forward_refs(&name)
            .into_iter()
            .filter(|&f| f != ty)
            .collect();
        for fwd in forwards {
            self.types.deep_copy(fwd, ty);
        }
        Ok(())
    }

    // =========================================================================
    // Constant and variable declarations
    // =========================================================================

    /// constDecl = "const" ident "=" expr.
    fn parse_const_decl(&mut self) -> CompileResult<()> {
        self.lex.eat(TokenKind::Const)?;
        self.lex.check(TokenKind::Ident)?;
        let name = self.lex.tok.name.clone();
        self.lex.next()?;
        self.lex.eat(TokenKind::Eq)?;
        let (ty, value) = self.parse_const_expr()?;
        self.idents
            .add(
                IdentKind::Const,
                &name,
                ty,
                self.blocks.current(),
                Storage::Constant(value),
                false,
            )
            .map_err(|e| self.ty_err(e))?;
        Ok(())
    }

    /// varDecl = "var" ident {"," ident} ":" type ["=" expr].
    fn parse_var_decl(&mut self) -> CompileResult<()> {
        self.lex.eat(TokenKind::Var)?;
        let mut names = Vec::new();
        loop {
            self.lex.check(TokenKind::Ident)?;
            names.push(self.lex.tok.name.clone());
            self.lex.next()?;
            if self.lex.tok.kind != TokenKind::Comma {
                break;
            }
            self.lex.next()?;
        }
        self.lex.eat(TokenKind::Colon)?;
        let ty = self.parse_type()?;

        if self.lex.tok.kind == TokenKind::Eq {
            if names.len() != 1 {
                return Err(self.error("Initializer is not allowed for a variable list"));
            }
            let id = self.alloc_var(&names[0], ty, false)?;
            self.lex.next()?;
            if self.blocks.enclosing_fn().is_none() {
                self.init_global(id)?;
            } else {
                self.push_var_ptr(id);
                let reported = self.reported_ty(ty);
                self.parse_assignment(reported)?;
            }
        } else {
            for name in &names {
                self.alloc_var(name, ty, false)?;
            }
        }
        Ok(())
    }

    /// shortVarDecl = ident ":=" expr.
    pub(crate) fn parse_short_var_decl(&mut self) -> CompileResult<()> {
        self.lex.check(TokenKind::Ident)?;
        let name = self.lex.tok.name.clone();
        self.lex.next()?;
        self.lex.eat(TokenKind::ColonEq)?;
        self.parse_decl_assignment(&name)
    }

    /// The right side of `name := expr`. A global declaration requires a
    /// foldable initializer written straight into the data segment; a
    /// local one emits a refcount increment and a swap-assign into the
    /// freshly allocated (hence release-free) slot.
    pub(crate) fn parse_decl_assignment(&mut self, name: &str) -> CompileResult<()> {
        if self.blocks.enclosing_fn().is_none() {
            let (ty, value) = self.parse_const_expr()?;
            let id = self.alloc_var(name, ty, false)?;
            self.write_global_const(id, ty, &value)
        } else {
            let ty = self.parse_expr()?;
            let id = self.alloc_var(name, ty, false)?;
            self.emit_change_ref_cnt(TokenKind::PlusPlus, ty);
            self.push_var_ptr(id);
            let size = self.size_of(ty)?;
            self.r#gen.swap_assign(self.types.kind(ty), size);
            Ok(())
        }
    }

    /// Global `var name: T = expr`: the initializer must fold.
    fn init_global(&mut self, id: IdentId) -> CompileResult<()> {
        let ty = self.idents.get(id).ty;
        let (value_ty, value) = self.parse_const_expr()?;
        let value_ty = self.implicit_conv(ty, value_ty);
        self.check_compatible(ty, value_ty, false)?;
        self.write_global_const(id, ty, &value)
    }

    fn write_global_const(
        &mut self,
        id: IdentId,
        ty: TypeId,
        value: &crate::consts::ConstValue,
    ) -> CompileResult<()> {
        let Storage::Global(offset) = self.idents.get(id).storage else {
            unreachable!("global variable has data segment storage")
        };
        let kind = self.types.kind(ty);
        let size = self.size_of(ty)?;
        self.data
            .assign_const(offset, kind, size, value)
            .map_err(|e| self.ty_err(e))
    }

    // =========================================================================
    // Function declarations
    // =========================================================================

    /// fnDecl = "fn" ident signature (fnBlock | fnPrototype).
    fn parse_fn_decl(&mut self) -> CompileResult<()> {
        self.lex.eat(TokenKind::Fn)?;
        self.lex.check(TokenKind::Ident)?;
        let name = self.lex.tok.name.clone();
        self.lex.next()?;
        let fn_ty = self.parse_signature(None)?;

        // A body may complete an earlier prototype of the same name.
        if let Some(existing) = self.idents.find(&name) {
            let prior = self.idents.get(existing);
            if prior.kind == IdentKind::Fn && prior.prototype_offset.is_some() {
                self.types
                    .assert_equivalent(prior.ty, fn_ty)
                    .map_err(|e| self.ty_err(e))?;
                if self.lex.tok.kind != TokenKind::LBrace {
                    return Err(self.error(format!("Duplicate identifier {name}")));
                }
                return self.parse_fn_block(existing);
            }
        }

        let id = self
            .idents
            .add(
                IdentKind::Fn,
                &name,
                fn_ty,
                self.blocks.current(),
                Storage::Code(self.r#gen.offset()),
                false,
            )
            .map_err(|e| self.ty_err(e))?;

        if self.lex.tok.kind == TokenKind::LBrace {
            self.parse_fn_block(id)
        } else {
            self.parse_fn_prototype(id)
        }
    }

    /// A body-less declaration reserves a placeholder entry to be patched
    /// by the body or by external resolution.
    fn parse_fn_prototype(&mut self, id: IdentId) -> CompileResult<()> {
        let offset = self.r#gen.nop();
        self.idents.get_mut(id).prototype_offset = Some(offset);
        debug!(name = %self.idents.get(id).name, offset, "declared prototype");
        Ok(())
    }

    // =========================================================================
    // Type syntax
    // =========================================================================

    /// type = ident | ["weak"] "^" type | "[" [expr] "]" type | "str"
    ///      | "fiber" | structType | interfaceType | "fn" signature.
    pub(crate) fn parse_type(&mut self) -> CompileResult<TypeId> {
        match self.lex.tok.kind {
            TokenKind::Ident => {
                let name = self.lex.tok.name.clone();
                let id = self
                    .idents
                    .find(&name)
                    .ok_or_else(|| self.error(format!("Unknown type {name}")))?;
                if self.idents.get(id).kind != IdentKind::Type {
                    return Err(self.error(format!("Type expected but {name} found")));
                }
                self.lex.next()?;
                Ok(self.idents.get(id).ty)
            }
            TokenKind::Weak => {
                self.lex.next()?;
                self.lex.check(TokenKind::Caret)?;
                let ptr = self.parse_type()?;
                self.types.get_mut(ptr).weak = true;
                Ok(ptr)
            }
            TokenKind::Caret => {
                self.lex.next()?;
                let base = self.parse_ptr_base_type()?;
                Ok(self.types.add_ptr_to(self.blocks.current(), base))
            }
            TokenKind::LBracket => {
                self.lex.next()?;
                if self.lex.tok.kind == TokenKind::RBracket {
                    self.lex.next()?;
                    let base = self.parse_type()?;
                    let ty = self.types.add(self.blocks.current(), TypeKind::DynArray);
                    self.types.get_mut(ty).base = Some(base);
                    Ok(ty)
                } else {
                    let (len_ty, len) = self.parse_const_expr()?;
                    self.check_compatible(self.prim.int, len_ty, false)?;
                    let len = len
                        .as_int()
                        .filter(|&n| n >= 0)
                        .ok_or_else(|| self.error("Illegal array length"))?;
                    self.lex.eat(TokenKind::RBracket)?;
                    let base = self.parse_type()?;
                    let ty = self.types.add(self.blocks.current(), TypeKind::Array);
                    self.types.get_mut(ty).base = Some(base);
                    self.types.get_mut(ty).num_items = len as u32;
                    Ok(ty)
                }
            }
            TokenKind::Str => {
                self.lex.next()?;
                Ok(self.prim.str_)
            }
            TokenKind::Fiber => {
                self.lex.next()?;
                Ok(self.prim.fiber)
            }
            TokenKind::Struct => self.parse_struct_type(),
            TokenKind::Interface => self.parse_interface_type(),
            TokenKind::Fn => {
                self.lex.next()?;
                self.parse_signature(None)
            }
            other => Err(self.error(format!("Type expected but {other} found"))),
        }
    }

    /// The pointee of a `^` type: an unknown name at module scope becomes
    /// a forward declaration, resolved when (and only when) the named
    /// type is declared.
    fn parse_ptr_base_type(&mut self) -> CompileResult<TypeId> {
        if self.lex.tok.kind == TokenKind::Ident
            && self.idents.find(&self.lex.tok.name).is_none()
            && self.blocks.current() == 0
        {
            let name = self.lex.tok.name.clone();
            self.lex.next()?;
            let fwd = self.types.add(0, TypeKind::Forward);
            self.types.get_mut(fwd).decl_name = Some(name);
            return Ok(fwd);
        }
        self.parse_type()
    }

    /// structType = "struct" "{" {ident {"," ident} ":" type ";"} "}".
    fn parse_struct_type(&mut self) -> CompileResult<TypeId> {
        self.lex.eat(TokenKind::Struct)?;
        self.lex.eat(TokenKind::LBrace)?;
        let ty = self.types.add(self.blocks.current(), TypeKind::Struct);
        while self.lex.tok.kind != TokenKind::RBrace {
            let mut names = Vec::new();
            loop {
                self.lex.check(TokenKind::Ident)?;
                names.push(self.lex.tok.name.clone());
                self.lex.next()?;
                if self.lex.tok.kind != TokenKind::Comma {
                    break;
                }
                self.lex.next()?;
            }
            self.lex.eat(TokenKind::Colon)?;
            let field_ty = self.parse_type()?;
            for name in &names {
                self.types
                    .add_field(ty, field_ty, name)
                    .map_err(|e| self.ty_err(e))?;
            }
            if self.lex.tok.kind == TokenKind::Semicolon {
                self.lex.next()?;
            }
        }
        self.lex.eat(TokenKind::RBrace)?;
        Ok(ty)
    }

    /// interfaceType = "interface" "{" {ident signature ";"} "}".
    ///
    /// The hidden `__self` slot occupies offset 0; every method is a
    /// field of function type whose receiver is `__self`.
    fn parse_interface_type(&mut self) -> CompileResult<TypeId> {
        self.lex.eat(TokenKind::Interface)?;
        self.lex.eat(TokenKind::LBrace)?;
        let ty = self.types.add(self.blocks.current(), TypeKind::Interface);
        self.types
            .add_field(ty, self.prim.void_ptr, "__self")
            .map_err(|e| self.ty_err(e))?;
        while self.lex.tok.kind != TokenKind::RBrace {
            self.lex.check(TokenKind::Ident)?;
            let name = self.lex.tok.name.clone();
            self.lex.next()?;
            let offset = self.types.size_of(ty).map_err(|e| self.ty_err(e))?;
            let method_ty = self.parse_signature(Some(offset))?;
            self.types
                .add_field(ty, method_ty, &name)
                .map_err(|e| self.ty_err(e))?;
            if self.lex.tok.kind == TokenKind::Semicolon {
                self.lex.next()?;
            }
        }
        self.lex.eat(TokenKind::RBrace)?;
        Ok(ty)
    }

    /// signature = "(" [param {"," param}] ")" [":" type],
    /// param = ident {"," ident} ":" type.
    ///
    /// A structured result appends the hidden `__result` pointer
    /// parameter: the caller pre-allocates the storage the callee copies
    /// into.
    pub(crate) fn parse_signature(
        &mut self,
        method_offset: Option<u32>,
    ) -> CompileResult<TypeId> {
        let fn_ty = self.types.add(self.blocks.current(), TypeKind::Fn);
        let mut sig = Signature::default();
        if let Some(offset) = method_offset {
            sig.is_method = true;
            sig.offset_from_self = offset;
            sig.add_param(self.prim.void_ptr, "__self")
                .map_err(|e| self.ty_err(e))?;
        }

        self.lex.eat(TokenKind::LParen)?;
        while self.lex.tok.kind != TokenKind::RParen {
            let mut names = Vec::new();
            loop {
                self.lex.check(TokenKind::Ident)?;
                names.push(self.lex.tok.name.clone());
                self.lex.next()?;
                if self.lex.tok.kind != TokenKind::Comma {
                    break;
                }
                self.lex.next()?;
            }
            self.lex.eat(TokenKind::Colon)?;
            let param_ty = self.parse_type()?;
            for name in &names {
                sig.add_param(param_ty, name).map_err(|e| self.ty_err(e))?;
            }
            if self.lex.tok.kind != TokenKind::Comma {
                break;
            }
            self.lex.next()?;
        }
        self.lex.eat(TokenKind::RParen)?;

        let result = if self.lex.tok.kind == TokenKind::Colon {
            self.lex.next()?;
            self.parse_type()?
        } else {
            self.prim.void
        };
        sig.results.push(result);
        if self.types.is_structured(result) {
            let result_ptr = self.types.add_ptr_to(self.blocks.current(), result);
            sig.add_param(result_ptr, "__result")
                .map_err(|e| self.ty_err(e))?;
        }

        self.types.get_mut(fn_ty).sig = Some(sig);
        Ok(fn_ty)
    }
}
