//! The expression compiler.
//!
//! Recursive descent over the operator precedence levels. Every level
//! runs in one of two modes: *emit* (code is generated, the value is left
//! on the operand stack) or *fold* (the expression must reduce to a
//! compile-time constant and nothing is emitted). Constant contexts -
//! `case` labels, `const` declarations, global initializers - use fold
//! mode; everything else emits.
//!
//! Designators push an address for non-structured lvalues and a value
//! (which for structured types is a reference) otherwise, and report
//! whether they are assignable and whether they denote a call.

use tarn_bytecode::{Builtin, Reg};
use tarn_common::CompileResult;
use tarn_lexer::TokenKind;
use tarn_types::{TypeId, TypeKind};

use crate::compiler::{Compiler, is_comparison};
use crate::consts::{self, ConstValue};
use crate::idents::{IdentId, IdentKind, Storage};

/// What a designator turned out to be.
pub(crate) struct Designator {
    pub ty: TypeId,
    /// Assignable storage location.
    pub is_var: bool,
    /// A function call (result already pushed unless void).
    pub is_call: bool,
    /// The stack holds an address that `ty` wraps (an lvalue), rather
    /// than a plain value.
    pub lvalue: bool,
}

impl Compiler {
    // =========================================================================
    // Entry points
    // =========================================================================

    /// Parse an expression, emit its code, and return its type.
    pub(crate) fn parse_expr(&mut self) -> CompileResult<TypeId> {
        let (ty, _) = self.expr(false)?;
        Ok(ty)
    }

    /// Parse an expression that must fold to a compile-time constant.
    pub(crate) fn parse_const_expr(&mut self) -> CompileResult<(TypeId, ConstValue)> {
        let (ty, cst) = self.expr(true)?;
        let cst = cst.ok_or_else(|| self.error("Constant expected"))?;
        Ok((ty, cst))
    }

    /// expr = logicalTerm {"||" logicalTerm}.
    pub(crate) fn expr(&mut self, fold: bool) -> CompileResult<(TypeId, Option<ConstValue>)> {
        self.logical_level(fold, TokenKind::OrOr)
    }

    // =========================================================================
    // Precedence levels
    // =========================================================================

    fn logical_level(
        &mut self,
        fold: bool,
        op: TokenKind,
    ) -> CompileResult<(TypeId, Option<ConstValue>)> {
        let next = |comp: &mut Self, fold| {
            if op == TokenKind::OrOr {
                comp.logical_level(fold, TokenKind::AndAnd)
            } else {
                comp.relation(fold)
            }
        };
        let (mut ty, mut cst) = next(self, fold)?;
        while self.lex.tok.kind == op {
            self.lex.next()?;
            if fold {
                let (rty, rc) = next(self, true)?;
                let (t, v) = self.fold_apply(op, ty, take_const(&mut cst), rty, rc)?;
                ty = t;
                cst = Some(v);
            } else {
                // Short-circuit: keep the left value and skip the right
                // operand when it already decides the result.
                self.check_valid_operator(ty, op)?;
                self.r#gen.short_circuit_prolog(op);
                let (rty, _) = next(self, false)?;
                self.check_compatible(ty, rty, true)?;
                self.check_valid_operator(rty, op)?;
                self.r#gen.short_circuit_epilog();
            }
        }
        Ok((ty, cst))
    }

    /// relation = additive [("==" | "!=" | "<" | "<=" | ">" | ">=") additive].
    fn relation(&mut self, fold: bool) -> CompileResult<(TypeId, Option<ConstValue>)> {
        let (mut ty, mut cst) = self.additive(fold)?;
        while is_comparison(self.lex.tok.kind) {
            let op = self.lex.tok.kind;
            self.lex.next()?;
            let (rty, rc) = self.additive(fold)?;
            if fold {
                let (t, v) = self.fold_apply(op, ty, take_const(&mut cst), rty, rc)?;
                ty = t;
                cst = Some(v);
            } else {
                ty = self.apply_operator(op, ty, rty)?;
            }
        }
        Ok((ty, cst))
    }

    /// additive = term {("+" | "-" | "|" | "~") term}.
    fn additive(&mut self, fold: bool) -> CompileResult<(TypeId, Option<ConstValue>)> {
        let (mut ty, mut cst) = self.term(fold)?;
        while matches!(
            self.lex.tok.kind,
            TokenKind::Plus | TokenKind::Minus | TokenKind::Or | TokenKind::Xor
        ) {
            let op = self.lex.tok.kind;
            self.lex.next()?;
            let (rty, rc) = self.term(fold)?;
            if fold {
                let (t, v) = self.fold_apply(op, ty, take_const(&mut cst), rty, rc)?;
                ty = t;
                cst = Some(v);
            } else {
                ty = self.apply_operator(op, ty, rty)?;
            }
        }
        Ok((ty, cst))
    }

    /// term = factor {("*" | "/" | "%" | "&" | "<<" | ">>") factor}.
    fn term(&mut self, fold: bool) -> CompileResult<(TypeId, Option<ConstValue>)> {
        let (mut ty, mut cst) = self.factor(fold)?;
        while matches!(
            self.lex.tok.kind,
            TokenKind::Mul
                | TokenKind::Div
                | TokenKind::Mod
                | TokenKind::And
                | TokenKind::Shl
                | TokenKind::Shr
        ) {
            let op = self.lex.tok.kind;
            self.lex.next()?;
            let (rty, rc) = self.factor(fold)?;
            if fold {
                let (t, v) = self.fold_apply(op, ty, take_const(&mut cst), rty, rc)?;
                ty = t;
                cst = Some(v);
            } else {
                ty = self.apply_operator(op, ty, rty)?;
            }
        }
        Ok((ty, cst))
    }

    fn fold_apply(
        &self,
        op: TokenKind,
        left: TypeId,
        lc: ConstValue,
        right: TypeId,
        rc: Option<ConstValue>,
    ) -> CompileResult<(TypeId, ConstValue)> {
        let rc = rc.ok_or_else(|| self.error("Constant expected"))?;
        let right = self.implicit_conv(left, right);
        self.check_compatible(left, right, true)?;
        self.check_valid_operator(left, op)?;
        let value = consts::fold_binary(op, lc, rc).map_err(|e| self.ty_err(e))?;
        let ty = if is_comparison(op) { self.prim.bool_ } else { left };
        Ok((ty, value))
    }

    // =========================================================================
    // Factors
    // =========================================================================

    fn factor(&mut self, fold: bool) -> CompileResult<(TypeId, Option<ConstValue>)> {
        match self.lex.tok.kind {
            TokenKind::IntLit => {
                let value = self.lex.tok.int_val;
                self.lex.next()?;
                if fold {
                    Ok((self.prim.int, Some(ConstValue::Int(value))))
                } else {
                    self.r#gen.push_int_const(value);
                    Ok((self.prim.int, None))
                }
            }
            TokenKind::CharLit => {
                let value = self.lex.tok.int_val;
                self.lex.next()?;
                if fold {
                    Ok((self.prim.char_, Some(ConstValue::Int(value))))
                } else {
                    self.r#gen.push_int_const(value);
                    Ok((self.prim.char_, None))
                }
            }
            TokenKind::RealLit => {
                let value = self.lex.tok.real_val;
                self.lex.next()?;
                if fold {
                    Ok((self.prim.real, Some(ConstValue::Real(value))))
                } else {
                    self.r#gen.push_real_const(value);
                    Ok((self.prim.real, None))
                }
            }
            TokenKind::StrLit => {
                let value = self.lex.tok.str_val.clone();
                self.lex.next()?;
                if fold {
                    Ok((self.prim.str_, Some(ConstValue::Str(value))))
                } else {
                    let offset = self.data.alloc_str(&value);
                    self.r#gen.push_global_ptr(offset);
                    Ok((self.prim.str_, None))
                }
            }
            TokenKind::LParen => {
                self.lex.next()?;
                let result = self.expr(fold)?;
                self.lex.eat(TokenKind::RParen)?;
                Ok(result)
            }
            TokenKind::Plus | TokenKind::Minus | TokenKind::Not | TokenKind::Xor => {
                let op = self.lex.tok.kind;
                self.lex.next()?;
                let (ty, mut cst) = self.factor(fold)?;
                self.check_valid_operator(ty, op)?;
                if fold {
                    let value =
                        consts::fold_unary(op, take_const(&mut cst)).map_err(|e| self.ty_err(e))?;
                    Ok((ty, Some(value)))
                } else {
                    if op != TokenKind::Plus {
                        self.r#gen.unary(op, self.types.kind(ty));
                    }
                    Ok((ty, None))
                }
            }
            TokenKind::And => {
                // Address-of an addressable designator.
                if fold {
                    return Err(self.error("Constant expected"));
                }
                self.lex.next()?;
                let d = self.parse_designator()?;
                if !d.is_var || d.is_call {
                    return Err(self.error("Unable to take address"));
                }
                let ty = if self.types.is_structured(d.ty) {
                    self.types.add_ptr_to(self.blocks.current(), d.ty)
                } else {
                    d.ty
                };
                Ok((ty, None))
            }
            TokenKind::Ident => {
                let name = self.lex.tok.name.clone();
                let id = self.idents.assert_find(&name).map_err(|e| self.ty_err(e))?;
                if self.idents.get(id).kind == IdentKind::Const {
                    let ty = self.idents.get(id).ty;
                    let Storage::Constant(value) = self.idents.get(id).storage.clone() else {
                        unreachable!("constant ident carries a value")
                    };
                    self.lex.next()?;
                    if fold {
                        return Ok((ty, Some(value)));
                    }
                    self.push_const_value(&value);
                    return Ok((ty, None));
                }
                if fold {
                    return Err(self.error("Constant expected"));
                }
                self.designator_rvalue()
            }
            TokenKind::Caret
            | TokenKind::Weak
            | TokenKind::LBracket
            | TokenKind::Str
            | TokenKind::Struct
            | TokenKind::Interface
            | TokenKind::Fiber
            | TokenKind::Fn => {
                if fold {
                    return Err(self.error("Constant expected"));
                }
                self.designator_rvalue()
            }
            other => Err(self.error(format!("Expression expected but {other} found"))),
        }
    }

    fn push_const_value(&mut self, value: &ConstValue) {
        match value {
            ConstValue::Int(v) => self.r#gen.push_int_const(*v),
            ConstValue::Real(v) => self.r#gen.push_real_const(*v),
            ConstValue::Str(s) => {
                let offset = self.data.alloc_str(s);
                self.r#gen.push_global_ptr(offset);
            }
            ConstValue::Null => self.r#gen.push_int_const(0),
        }
    }

    /// A designator used as an rvalue: non-structured lvalue addresses
    /// are dereferenced to their value, and a `str` lvalue loads the
    /// stored string pointer so it matches the representation of a
    /// string literal.
    fn designator_rvalue(&mut self) -> CompileResult<(TypeId, Option<ConstValue>)> {
        let d = self.parse_designator()?;
        if d.lvalue {
            match self.types.kind(d.ty) {
                TypeKind::Ptr => {
                    let base = self.types.base(d.ty);
                    self.r#gen.deref(self.types.kind(base));
                    return Ok((base, None));
                }
                TypeKind::Str => {
                    self.r#gen.deref(TypeKind::Str);
                    return Ok((d.ty, None));
                }
                _ => {}
            }
        }
        Ok((d.ty, None))
    }

    // =========================================================================
    // Designators
    // =========================================================================

    /// designator = (ident | type) {"." ident | "[" expr "]" | "^" | call}.
    pub(crate) fn parse_designator(&mut self) -> CompileResult<Designator> {
        match self.lex.tok.kind {
            TokenKind::Ident => {
                let name = self.lex.tok.name.clone();
                let id = self.idents.assert_find(&name).map_err(|e| self.ty_err(e))?;
                match self.idents.get(id).kind {
                    IdentKind::Var => {
                        let var_ty = self.idents.get(id).ty;
                        self.push_var_ptr(id);
                        self.lex.next()?;
                        let addr_ty = self.designator_suffixes(var_ty)?;
                        let ty = self.reported_ty(addr_ty);
                        Ok(Designator {
                            ty,
                            is_var: true,
                            is_call: false,
                            lvalue: true,
                        })
                    }
                    IdentKind::Fn => {
                        self.lex.next()?;
                        let ty = self.parse_call(id)?;
                        Ok(Designator {
                            ty,
                            is_var: false,
                            is_call: true,
                            lvalue: false,
                        })
                    }
                    IdentKind::Type => {
                        self.lex.next()?;
                        self.named_type_designator(id)
                    }
                    _ => Err(self.error("Variable or function expected")),
                }
            }
            TokenKind::Caret
            | TokenKind::Weak
            | TokenKind::LBracket
            | TokenKind::Str
            | TokenKind::Struct
            | TokenKind::Interface
            | TokenKind::Fiber
            | TokenKind::Fn => {
                let ty = self.parse_type()?;
                self.type_designator(ty)
            }
            other => Err(self.error(format!("Designator expected but {other} found"))),
        }
    }

    fn named_type_designator(&mut self, id: IdentId) -> CompileResult<Designator> {
        let ty = self.idents.get(id).ty;
        self.type_designator(ty)
    }

    /// A designator that started with a type: a composite literal
    /// (`T{...}`) or a type cast (`T(expr)`), with any suffixes applied
    /// to the result.
    fn type_designator(&mut self, ty: TypeId) -> CompileResult<Designator> {
        match self.lex.tok.kind {
            TokenKind::LBrace => {
                let lit_ty = self.parse_composite_literal(ty)?;
                if self.types.kind(lit_ty) == TypeKind::DynArray {
                    // The literal left a plain value; there is no
                    // storage address to designate through.
                    return Ok(Designator {
                        ty: lit_ty,
                        is_var: false,
                        is_call: false,
                        lvalue: false,
                    });
                }
                let addr_ty = self.designator_suffixes(lit_ty)?;
                let ty = self.reported_ty(addr_ty);
                Ok(Designator {
                    ty,
                    is_var: false,
                    is_call: false,
                    lvalue: true,
                })
            }
            TokenKind::LParen => {
                self.lex.next()?;
                let (src, _) = self.expr(false)?;
                self.lex.eat(TokenKind::RParen)?;
                self.check_castable(ty, src)?;
                // A pointer cast followed by a suffix designates its
                // pointee: the pointer value on the stack already is the
                // pointee's address, so no dereference is emitted.
                if self.types.kind(ty) == TypeKind::Ptr
                    && matches!(
                        self.lex.tok.kind,
                        TokenKind::Caret | TokenKind::Period | TokenKind::LBracket
                    )
                {
                    if self.lex.tok.kind == TokenKind::Caret {
                        if self.types.kind(self.types.base(ty)) == TypeKind::Void {
                            return Err(self.error("Typed pointer expected"));
                        }
                        self.lex.next()?;
                    }
                    let addr_ty = self.designator_suffixes(self.types.base(ty))?;
                    let ty = self.reported_ty(addr_ty);
                    return Ok(Designator {
                        ty,
                        is_var: true,
                        is_call: false,
                        lvalue: true,
                    });
                }
                Ok(Designator {
                    ty,
                    is_var: false,
                    is_call: false,
                    lvalue: false,
                })
            }
            other => Err(self.error(format!(
                "Composite literal or type cast expected but {other} found"
            ))),
        }
    }

    fn check_castable(&self, dest: TypeId, src: TypeId) -> CompileResult<()> {
        let (dk, sk) = (self.types.kind(dest), self.types.kind(src));
        let castable = self.types.compatible(dest, src, true)
            || ((dk.is_ordinal() || dk.is_real()) && (sk.is_ordinal() || sk.is_real()))
            || (dk == TypeKind::Ptr && sk == TypeKind::Ptr);
        if castable {
            Ok(())
        } else {
            Err(self.error(format!(
                "Incompatible types {} and {}",
                self.types.spelling(dest),
                self.types.spelling(src)
            )))
        }
    }

    /// Suffix chain over an address of `addr_ty` on the stack; returns
    /// the final addressed type.
    fn designator_suffixes(&mut self, mut addr_ty: TypeId) -> CompileResult<TypeId> {
        loop {
            match self.lex.tok.kind {
                TokenKind::Period => {
                    // Implicit dereferencing: p.field == p^.field
                    if self.types.kind(addr_ty) == TypeKind::Ptr {
                        self.r#gen.deref(TypeKind::Ptr);
                        addr_ty = self.types.base(addr_ty);
                    }
                    if !matches!(
                        self.types.kind(addr_ty),
                        TypeKind::Struct | TypeKind::Interface
                    ) {
                        return Err(self.error(format!(
                            "Type {} has no fields",
                            self.types.spelling(addr_ty)
                        )));
                    }
                    self.lex.next()?;
                    self.lex.check(TokenKind::Ident)?;
                    let name = self.lex.tok.name.clone();
                    self.lex.next()?;
                    let field = self
                        .types
                        .assert_find_field(addr_ty, &name)
                        .map_err(|e| self.ty_err(e))?;
                    let (offset, field_ty) = (field.offset, field.ty);
                    self.r#gen.get_field_ptr(offset);
                    addr_ty = field_ty;
                }
                TokenKind::LBracket => {
                    if self.types.kind(addr_ty) == TypeKind::Ptr {
                        self.r#gen.deref(TypeKind::Ptr);
                        addr_ty = self.types.base(addr_ty);
                    }
                    let kind = self.types.kind(addr_ty);
                    // Strings index through their character data; arrays
                    // (fixed and dynamic) directly through storage.
                    if kind == TypeKind::Str {
                        self.r#gen.deref(kind);
                    }
                    self.lex.next()?;
                    let (index_ty, _) = self.expr(false)?;
                    self.check_compatible(self.prim.int, index_ty, false)?;
                    self.lex.eat(TokenKind::RBracket)?;
                    match kind {
                        TypeKind::Array => {
                            let base = self.types.base(addr_ty);
                            let len = self.types.get(addr_ty).num_items;
                            self.r#gen.push_int_const(i64::from(len));
                            let item_size = self.size_of(base)?;
                            self.r#gen.get_array_ptr(item_size);
                            addr_ty = base;
                        }
                        TypeKind::DynArray => {
                            self.r#gen.get_dyn_array_ptr();
                            addr_ty = self.types.base(addr_ty);
                        }
                        TypeKind::Str => {
                            self.r#gen.push_int_const(-1);
                            self.r#gen.get_array_ptr(1);
                            addr_ty = self.prim.char_;
                        }
                        _ => {
                            return Err(self.error(format!(
                                "Array or string expected but {} found",
                                self.types.spelling(addr_ty)
                            )));
                        }
                    }
                }
                TokenKind::Caret => {
                    if self.types.kind(addr_ty) != TypeKind::Ptr
                        || self.types.kind(self.types.base(addr_ty)) == TypeKind::Void
                    {
                        return Err(self.error("Typed pointer expected"));
                    }
                    self.r#gen.deref(TypeKind::Ptr);
                    addr_ty = self.types.base(addr_ty);
                    self.lex.next()?;
                }
                _ => return Ok(addr_ty),
            }
        }
    }

    // =========================================================================
    // Calls
    // =========================================================================

    /// Actual-parameter list and call; pushes the result unless void.
    /// The callee ident token is already consumed.
    fn parse_call(&mut self, id: IdentId) -> CompileResult<TypeId> {
        if let Storage::Builtin(builtin) = self.idents.get(id).storage {
            return self.parse_builtin_call(builtin);
        }
        let fn_ty = self.idents.get(id).ty;
        let Storage::Code(entry) = self.idents.get(id).storage else {
            unreachable!("function ident has a code entry")
        };
        let sig = self
            .types
            .get(fn_ty)
            .sig
            .clone()
            .expect("function ident has a signature");

        self.lex.eat(TokenKind::LParen)?;

        let hidden_result = sig.params.last().is_some_and(|p| p.name == "__result");
        let visible = sig.params.len() - usize::from(hidden_result);

        for index in 0..visible {
            if index > 0 {
                if self.lex.tok.kind != TokenKind::Comma {
                    return Err(self.error("Too few actual parameters"));
                }
                self.lex.next()?;
            }
            if self.lex.tok.kind == TokenKind::RParen {
                return Err(self.error("Too few actual parameters"));
            }
            let (arg_ty, _) = self.expr(false)?;
            let param_ty = sig.params[index].ty;
            let arg_ty = self.implicit_conv(param_ty, arg_ty);
            self.check_compatible(param_ty, arg_ty, false)?;
        }
        if self.lex.tok.kind == TokenKind::Comma {
            return Err(self.error("Too many actual parameters"));
        }
        self.lex.eat(TokenKind::RParen)?;

        // A structured result is written into caller-provided storage
        // passed as a hidden trailing parameter.
        if hidden_result {
            let result_ty = sig.result();
            let name = self.tmp_name("ret");
            let tmp = self.alloc_var(&name, result_ty, false)?;
            self.push_var_ptr(tmp);
        }

        self.r#gen.call(entry);
        let result = sig.result();
        if self.types.kind(result) != TypeKind::Void {
            self.r#gen.push_reg(Reg::Result);
        }
        Ok(result)
    }

    fn parse_builtin_call(&mut self, builtin: Builtin) -> CompileResult<TypeId> {
        self.lex.eat(TokenKind::LParen)?;
        match builtin {
            Builtin::Len => {
                let (arg_ty, _) = self.expr(false)?;
                self.lex.eat(TokenKind::RParen)?;
                match self.types.kind(arg_ty) {
                    TypeKind::Array => {
                        let len = self.types.get(arg_ty).num_items;
                        self.r#gen.pop();
                        self.r#gen.push_int_const(i64::from(len));
                    }
                    kind @ (TypeKind::DynArray | TypeKind::Str) => {
                        self.r#gen.call_builtin(kind, Builtin::Len);
                    }
                    _ => {
                        return Err(self.error(format!(
                            "Illegal type {}",
                            self.types.spelling(arg_ty)
                        )));
                    }
                }
                Ok(self.prim.int)
            }
            Builtin::Make => unreachable!("make is not a named builtin"),
        }
    }

    // =========================================================================
    // Composite literals
    // =========================================================================

    /// `T{elem, ...}` - built in an anonymous local so its contents
    /// participate in scope garbage collection.
    fn parse_composite_literal(&mut self, ty: TypeId) -> CompileResult<TypeId> {
        if self.blocks.enclosing_fn().is_none() {
            return Err(self.error("Constant expected"));
        }
        let name = self.tmp_name("lit");
        let tmp = self.alloc_var(&name, ty, false)?;
        let Storage::Local(base_offset) = self.idents.get(tmp).storage else {
            unreachable!("literal temporary is a local")
        };

        match self.types.kind(ty) {
            TypeKind::Array | TypeKind::Struct => {
                self.lex.eat(TokenKind::LBrace)?;
                let mut index = 0u32;
                while self.lex.tok.kind != TokenKind::RBrace {
                    if index > 0 {
                        self.lex.eat(TokenKind::Comma)?;
                    }
                    let (item_ty, delta) = self.literal_item(ty, index)?;
                    self.r#gen.push_local_ptr(base_offset + delta as i32);
                    let (value_ty, _) = self.expr(false)?;
                    let value_ty = self.implicit_conv(item_ty, value_ty);
                    self.check_compatible(item_ty, value_ty, false)?;
                    self.emit_change_ref_cnt(TokenKind::PlusPlus, item_ty);
                    let size = self.size_of(item_ty)?;
                    self.r#gen.assign(self.types.kind(item_ty), size);
                    index += 1;
                }
                self.lex.eat(TokenKind::RBrace)?;
                if index != self.types.get(ty).num_items() {
                    return Err(self.error("Wrong number of elements in literal"));
                }
                self.r#gen.push_local_ptr(base_offset);
            }
            TypeKind::DynArray => {
                // The element count must be known before the first store,
                // so pre-scan the literal with a lexer clone.
                let len = self.scan_literal_len()?;
                let item_ty = self.types.base(ty);
                let item_size = self.size_of(item_ty)?;
                let dyn_size = self.size_of(ty)?;

                self.r#gen.push_int_const(len);
                self.r#gen.push_int_const(i64::from(item_size));
                self.r#gen.call_builtin(TypeKind::DynArray, Builtin::Make);
                self.r#gen.push_local_ptr(base_offset);
                self.r#gen.swap_assign(TypeKind::DynArray, dyn_size);

                self.lex.eat(TokenKind::LBrace)?;
                let mut index = 0i64;
                while self.lex.tok.kind != TokenKind::RBrace {
                    if index > 0 {
                        self.lex.eat(TokenKind::Comma)?;
                    }
                    self.r#gen.push_local_ptr(base_offset);
                    self.r#gen.push_int_const(index);
                    self.r#gen.get_dyn_array_ptr();
                    let (value_ty, _) = self.expr(false)?;
                    let value_ty = self.implicit_conv(item_ty, value_ty);
                    self.check_compatible(item_ty, value_ty, false)?;
                    self.emit_change_ref_cnt(TokenKind::PlusPlus, item_ty);
                    self.r#gen.assign(self.types.kind(item_ty), item_size);
                    index += 1;
                }
                self.lex.eat(TokenKind::RBrace)?;
                self.r#gen.push_local_ptr(base_offset);
            }
            _ => {
                return Err(self.error(format!(
                    "Illegal type {} for literal",
                    self.types.spelling(ty)
                )));
            }
        }
        Ok(ty)
    }

    fn literal_item(&self, ty: TypeId, index: u32) -> CompileResult<(TypeId, u32)> {
        match self.types.kind(ty) {
            TypeKind::Array => {
                if index >= self.types.get(ty).num_items {
                    return Err(self.error("Wrong number of elements in literal"));
                }
                let base = self.types.base(ty);
                let size = self.size_of(base)?;
                Ok((base, index * size))
            }
            TypeKind::Struct => {
                let field = self
                    .types
                    .get(ty)
                    .fields
                    .get(index as usize)
                    .ok_or_else(|| self.error("Wrong number of elements in literal"))?;
                Ok((field.ty, field.offset))
            }
            _ => unreachable!("array or struct literal"),
        }
    }

    /// Count the top-level elements of the literal ahead by scanning a
    /// lexer clone up to the matching closing brace.
    fn scan_literal_len(&mut self) -> CompileResult<i64> {
        let mut lookahead = self.lex.clone();
        lookahead.eat(TokenKind::LBrace)?;
        if lookahead.tok.kind == TokenKind::RBrace {
            return Ok(0);
        }
        let mut depth = 0usize;
        let mut count = 1i64;
        loop {
            match lookahead.tok.kind {
                TokenKind::LBrace | TokenKind::LParen | TokenKind::LBracket => depth += 1,
                TokenKind::RBrace | TokenKind::RParen | TokenKind::RBracket => {
                    if depth == 0 {
                        return Ok(count);
                    }
                    depth -= 1;
                }
                TokenKind::Comma if depth == 0 => count += 1,
                TokenKind::Eof => return Err(self.error("} expected but end of file found")),
                _ => {}
            }
            lookahead.next()?;
        }
    }
}

fn take_const(cst: &mut Option<ConstValue>) -> ConstValue {
    cst.take().expect("fold mode always produces a constant")
}
