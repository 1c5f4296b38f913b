//! The statement compiler.
//!
//! Recursive descent over the statement grammar. Every construct that
//! opens a scope also closes it, collecting refcount releases for the
//! scope's garbage-collected variables on the way out; `break`,
//! `continue` and `return` splice in the releases of every scope they
//! jump over before emitting their stub.

use tracing::{debug, trace};

use tarn_bytecode::{Builtin, Gotos, Reg};
use tarn_common::CompileResult;
use tarn_lexer::TokenKind;
use tarn_types::{TypeId, TypeKind};

use crate::compiler::Compiler;
use crate::idents::IdentId;

impl Compiler {
    // =========================================================================
    // Scopes
    // =========================================================================

    /// Collect refcount releases, reclaim the scope's idents, and pop the
    /// block. Types are reclaimed at function granularity (see
    /// `parse_fn_block`): inner-scope types may still be referenced by
    /// enclosing-scope variables, a loop's item variable for one.
    fn close_scope(&mut self) {
        let block = self.blocks.current();
        trace!(block, "leaving block");
        self.collect(block);
        self.idents.free_block(block);
        self.blocks.leave();
    }

    fn open_scope(&mut self, fn_ident: Option<IdentId>) -> CompileResult<()> {
        self.blocks.enter(fn_ident).map_err(|e| self.ty_err(e))?;
        trace!(block = self.blocks.current(), "entered block");
        Ok(())
    }

    // =========================================================================
    // Statement dispatch
    // =========================================================================

    /// stmt = decl | block | simpleStmt | ifStmt | switchStmt | forStmt
    ///      | breakStmt | continueStmt | returnStmt.
    fn parse_stmt(&mut self) -> CompileResult<()> {
        match self.lex.tok.kind {
            TokenKind::Type | TokenKind::Const | TokenKind::Var => self.parse_decl(),
            TokenKind::LBrace => self.parse_block(),
            TokenKind::Ident
            | TokenKind::Caret
            | TokenKind::Weak
            | TokenKind::LBracket
            | TokenKind::Str
            | TokenKind::Struct
            | TokenKind::Interface
            | TokenKind::Fiber
            | TokenKind::Fn => self.parse_simple_stmt(),
            TokenKind::If => self.parse_if_stmt(),
            TokenKind::Switch => self.parse_switch_stmt(),
            TokenKind::For => self.parse_for_stmt(),
            TokenKind::Break => self.parse_break_stmt(),
            TokenKind::Continue => self.parse_continue_stmt(),
            TokenKind::Return => self.parse_return_stmt(),
            _ => Ok(()),
        }
    }

    /// stmtList = stmt {";" stmt}.
    fn parse_stmt_list(&mut self) -> CompileResult<()> {
        loop {
            self.parse_stmt()?;
            if self.lex.tok.kind != TokenKind::Semicolon {
                return Ok(());
            }
            self.lex.next()?;
        }
    }

    /// block = "{" stmtList "}".
    pub(crate) fn parse_block(&mut self) -> CompileResult<()> {
        self.lex.eat(TokenKind::LBrace)?;
        self.open_scope(None)?;
        self.parse_stmt_list()?;
        self.close_scope();
        self.lex.eat(TokenKind::RBrace)
    }

    // =========================================================================
    // Simple statements
    // =========================================================================

    /// simpleStmt = shortVarDecl | assignmentStmt | shortAssignmentStmt
    ///            | incDecStmt | callStmt.
    fn parse_simple_stmt(&mut self) -> CompileResult<()> {
        if self.lex.tok.kind == TokenKind::Ident
            && self.lex.lookahead()? == TokenKind::ColonEq
        {
            return self.parse_short_var_decl();
        }

        let d = self.parse_designator()?;
        let op = self.lex.tok.kind;
        if op == TokenKind::Eq || op.short_assignment() != TokenKind::None {
            if !d.is_var {
                return Err(self.error("Left side cannot be assigned to"));
            }
            self.lex.next()?;
            if op == TokenKind::Eq {
                self.parse_assignment(d.ty)
            } else {
                self.parse_short_assignment(d.ty, op)
            }
        } else if op == TokenKind::PlusPlus || op == TokenKind::MinusMinus {
            if !d.is_var {
                return Err(self.error("Left side cannot be assigned to"));
            }
            self.parse_inc_dec(d.ty, op)
        } else {
            if !d.is_call {
                return Err(self.error("Assignment or function call expected"));
            }
            if self.types.kind(d.ty) != TypeKind::Void {
                // Discard the unused result.
                self.r#gen.pop();
            }
            Ok(())
        }
    }

    /// Unwrap the designator-reported type to the assigned-to type:
    /// structured designators already denote their storage, anything else
    /// must be an address.
    fn assignment_target_ty(&self, ty: TypeId) -> CompileResult<TypeId> {
        if self.types.is_structured(ty) {
            return Ok(ty);
        }
        if self.types.kind(ty) != TypeKind::Ptr
            || self.types.kind(self.types.base(ty)) == TypeKind::Void
        {
            return Err(self.error("Left side cannot be assigned to"));
        }
        Ok(self.types.base(ty))
    }

    /// assignmentStmt = designator "=" expr.
    pub(crate) fn parse_assignment(&mut self, ty: TypeId) -> CompileResult<()> {
        let ty = self.assignment_target_ty(ty)?;
        let right = self.parse_expr()?;
        let right = self.implicit_conv(ty, right);
        self.check_compatible(ty, right, false)?;
        self.emit_change_ref_cnt_assign(ty)
    }

    /// shortAssignmentStmt = designator op expr, op one of
    /// `+=` `-=` `*=` `/=` `%=` `&=` `|=` `~=` `<<=` `>>=`.
    fn parse_short_assignment(&mut self, ty: TypeId, op: TokenKind) -> CompileResult<()> {
        let mut ty = self.assignment_target_ty(ty)?;

        // Duplicate the designator and treat it as an expression.
        self.r#gen.dup();
        self.r#gen.deref(self.types.kind(ty));

        // All temporary reals are 64-bit.
        if self.types.kind(ty) == TypeKind::Real32 {
            ty = self.prim.real;
        }

        let right = self.parse_expr()?;
        self.apply_operator(op.short_assignment(), ty, right)?;
        self.emit_change_ref_cnt_assign(ty)
    }

    /// incDecStmt = designator ("++" | "--").
    fn parse_inc_dec(&mut self, ty: TypeId, op: TokenKind) -> CompileResult<()> {
        let ty = self.assignment_target_ty(ty)?;
        self.check_compatible(self.prim.int, ty, false)?;
        self.r#gen.unary(op, self.types.kind(ty));
        self.lex.next()
    }

    // =========================================================================
    // if
    // =========================================================================

    /// ifStmt = "if" [shortVarDecl ";"] expr block ["else" (ifStmt | block)].
    fn parse_if_stmt(&mut self) -> CompileResult<()> {
        self.lex.eat(TokenKind::If)?;

        // Additional scope embracing the short var decl and the body.
        self.open_scope(None)?;

        if self.lex.tok.kind == TokenKind::Ident
            && self.lex.lookahead()? == TokenKind::ColonEq
        {
            self.parse_short_var_decl()?;
            self.lex.eat(TokenKind::Semicolon)?;
        }

        let cond = self.parse_expr()?;
        self.check_compatible(self.prim.bool_, cond, false)?;
        self.r#gen.if_cond_epilog();

        self.parse_block()?;

        if self.lex.tok.kind == TokenKind::Else {
            self.r#gen.else_prolog();
            self.lex.next()?;
            if self.lex.tok.kind == TokenKind::If {
                self.parse_if_stmt()?;
            } else {
                self.parse_block()?;
            }
        }
        self.r#gen.if_else_epilog();

        self.close_scope();
        Ok(())
    }

    // =========================================================================
    // switch
    // =========================================================================

    /// case = "case" expr {"," expr} ":" stmtList.
    fn parse_case(&mut self, selector: TypeId) -> CompileResult<()> {
        self.lex.eat(TokenKind::Case)?;

        let mut num_exprs = 0;
        loop {
            let (ty, value) = self.parse_const_expr()?;
            let ty = self.implicit_conv(selector, ty);
            self.check_compatible(selector, ty, false)?;
            let value = value
                .as_int()
                .ok_or_else(|| self.error("Ordinal constant expected"))?;
            self.r#gen.case_expr_epilog(value);
            num_exprs += 1;

            if self.lex.tok.kind != TokenKind::Comma {
                break;
            }
            self.lex.next()?;
        }

        self.lex.eat(TokenKind::Colon)?;
        self.r#gen.case_block_prolog(num_exprs);
        self.parse_stmt_list()?;
        self.r#gen.case_block_epilog();
        Ok(())
    }

    /// default = "default" ":" stmtList.
    fn parse_default(&mut self) -> CompileResult<()> {
        self.lex.eat(TokenKind::Default)?;
        self.lex.eat(TokenKind::Colon)?;
        self.parse_stmt_list()
    }

    /// switchStmt = "switch" [shortVarDecl ";"] expr "{" {case} [default] "}".
    fn parse_switch_stmt(&mut self) -> CompileResult<()> {
        self.lex.eat(TokenKind::Switch)?;

        // Additional scope embracing the short var decl and the body.
        self.open_scope(None)?;

        if self.lex.tok.kind == TokenKind::Ident
            && self.lex.lookahead()? == TokenKind::ColonEq
        {
            self.parse_short_var_decl()?;
            self.lex.eat(TokenKind::Semicolon)?;
        }

        let selector = self.parse_expr()?;
        if !self.types.is_ordinal(selector) {
            return Err(self.error("Ordinal type expected"));
        }

        // The selector stays on the operand stack for the whole switch;
        // every case test duplicates it, and whichever path leaves the
        // tests (a match, or the fall-through into default) pops it.
        self.lex.eat(TokenKind::LBrace)?;
        let mut num_cases = 0;
        while self.lex.tok.kind == TokenKind::Case {
            self.parse_case(selector)?;
            num_cases += 1;
        }
        self.r#gen.switch_default_prolog();
        if self.lex.tok.kind == TokenKind::Default {
            self.parse_default()?;
        }
        self.lex.eat(TokenKind::RBrace)?;
        self.r#gen.switch_epilog(num_cases);

        self.close_scope();
        Ok(())
    }

    // =========================================================================
    // for
    // =========================================================================

    /// forHeader = [shortVarDecl ";"] expr [";" simpleStmt].
    fn parse_for_header(&mut self, lookahead: TokenKind) -> CompileResult<()> {
        if lookahead == TokenKind::ColonEq {
            self.parse_short_var_decl()?;
            self.lex.eat(TokenKind::Semicolon)?;
        }

        self.r#gen.for_cond_prolog();

        // Sub-scope so temporaries of the condition are released at each
        // iteration.
        self.open_scope(None)?;
        let cond = self.parse_expr()?;
        self.check_compatible(self.prim.bool_, cond, false)?;
        self.close_scope();

        self.r#gen.for_cond_epilog();

        if self.lex.tok.kind == TokenKind::Semicolon {
            // Sub-scope for the post statement, for the same reason.
            self.open_scope(None)?;
            self.lex.next()?;
            self.parse_simple_stmt()?;
            self.close_scope();
        }

        self.r#gen.for_post_stmt_epilog();
        Ok(())
    }

    /// forInHeader = [ident ","] ident "in" expr.
    fn parse_for_in_header(&mut self, lookahead: TokenKind) -> CompileResult<()> {
        self.lex.check(TokenKind::Ident)?;

        let index: IdentId;
        if lookahead == TokenKind::Comma {
            let name = self.lex.tok.name.clone();
            index = self.alloc_var(&name, self.prim.int, false)?;
            self.lex.eat(TokenKind::Ident)?;
            self.lex.eat(TokenKind::Comma)?;
            self.lex.check(TokenKind::Ident)?;
        } else {
            index = self.alloc_var("__index", self.prim.int, false)?;
        }

        // Zero the index.
        self.push_var_ptr(index);
        self.r#gen.push_int_const(0);
        self.r#gen.assign(TypeKind::Int, 8);

        let item_name = self.lex.tok.name.clone();
        self.lex.next()?;
        self.lex.eat(TokenKind::In)?;

        self.r#gen.for_cond_prolog();

        // Sub-scope embracing the collection expression, recomputed at
        // each iteration.
        self.open_scope(None)?;

        // Implicit condition: len(collection) > index.
        let mut collection = self.parse_expr()?;

        // Implicit dereferencing: x in a^ == x in a.
        if self.types.kind(collection) == TypeKind::Ptr {
            let base = self.types.base(collection);
            if self.types.loads_value(base) {
                self.r#gen.deref(self.types.kind(base));
            }
            collection = base;
        }

        // Save the collection for future use.
        self.r#gen.dup();
        self.r#gen.pop_reg(Reg::Common2);

        match self.types.kind(collection) {
            TypeKind::Array => {
                self.r#gen.pop();
                self.r#gen
                    .push_int_const(i64::from(self.types.get(collection).num_items));
            }
            kind @ (TypeKind::DynArray | TypeKind::Str) => {
                self.r#gen.call_builtin(kind, Builtin::Len);
            }
            _ => {
                return Err(self.error(format!(
                    "Expression of type {} is not iterable",
                    self.types.spelling(collection)
                )));
            }
        }

        self.push_var_ptr(index);
        self.r#gen.deref(TypeKind::Int);
        self.r#gen.binary(TokenKind::Greater, TypeKind::Int);

        self.close_scope();
        self.r#gen.for_cond_epilog();

        // Declare the variable holding the collection item.
        let item_ty = if self.types.kind(collection) == TypeKind::Str {
            self.prim.char_
        } else {
            self.types.base(collection)
        };
        let item = self.alloc_var(&item_name, item_ty, false)?;

        // Implicit post statement: index++.
        self.open_scope(None)?;
        self.push_var_ptr(index);
        self.r#gen.unary(TokenKind::PlusPlus, TypeKind::Int);
        self.close_scope();

        self.r#gen.for_post_stmt_epilog();

        // Get the collection item pointer.
        self.r#gen.push_reg(Reg::Common2);
        self.push_var_ptr(index);
        self.r#gen.deref(TypeKind::Int);

        let item_size = self.size_of(item_ty)?;
        match self.types.kind(collection) {
            TypeKind::DynArray => self.r#gen.get_dyn_array_ptr(),
            TypeKind::Str => {
                // Use the actual length for range checking.
                self.r#gen.push_int_const(-1);
                self.r#gen.get_array_ptr(item_size);
            }
            _ => {
                // Use the nominal length for range checking.
                self.r#gen
                    .push_int_const(i64::from(self.types.get(collection).num_items));
                self.r#gen.get_array_ptr(item_size);
            }
        }

        // Get the collection item value.
        if self.types.loads_value(item_ty) {
            self.r#gen.deref(self.types.kind(item_ty));
        }

        // Assign the item to the iteration variable.
        self.push_var_ptr(item);
        self.emit_swap_change_ref_cnt_assign(item_ty)
    }

    /// forStmt = "for" (forHeader | forInHeader) block.
    fn parse_for_stmt(&mut self) -> CompileResult<()> {
        self.lex.eat(TokenKind::For)?;

        // Additional scope embracing the loop variables and the body.
        self.open_scope(None)?;

        let outer_breaks = self.breaks.replace(Gotos::new(self.blocks.current()));
        let outer_continues = self.continues.replace(Gotos::new(self.blocks.current()));

        let lookahead = self.lex.lookahead()?;
        if lookahead == TokenKind::Comma || lookahead == TokenKind::In {
            self.parse_for_in_header(lookahead)?;
        } else {
            self.parse_for_header(lookahead)?;
        }

        self.parse_block()?;

        // 'continue' lands here, on the jump back to the post statement.
        let mut continues = self.continues.take().expect("loop continues set installed");
        self.r#gen.gotos_epilog(&mut continues);
        self.continues = outer_continues;

        self.r#gen.for_epilog();

        // 'break' lands here, after the loop.
        let mut breaks = self.breaks.take().expect("loop breaks set installed");
        self.r#gen.gotos_epilog(&mut breaks);
        self.breaks = outer_breaks;

        self.close_scope();
        Ok(())
    }

    // =========================================================================
    // break / continue / return
    // =========================================================================

    /// breakStmt = "break".
    fn parse_break_stmt(&mut self) -> CompileResult<()> {
        self.lex.eat(TokenKind::Break)?;

        let Some(target) = self.breaks.as_ref().map(|g| g.block) else {
            return Err(self.error("No loop to break"));
        };
        self.collect_down_to(target);

        let mut breaks = self.breaks.take().expect("checked above");
        self.r#gen.gotos_add_stub(&mut breaks);
        self.breaks = Some(breaks);
        Ok(())
    }

    /// continueStmt = "continue".
    fn parse_continue_stmt(&mut self) -> CompileResult<()> {
        self.lex.eat(TokenKind::Continue)?;

        let Some(target) = self.continues.as_ref().map(|g| g.block) else {
            return Err(self.error("No loop to continue"));
        };
        self.collect_down_to(target);

        let mut continues = self.continues.take().expect("checked above");
        self.r#gen.gotos_add_stub(&mut continues);
        self.continues = Some(continues);
        Ok(())
    }

    /// returnStmt = "return" [expr].
    fn parse_return_stmt(&mut self) -> CompileResult<()> {
        self.lex.eat(TokenKind::Return)?;
        self.blocks.top_mut().has_return = true;

        let ty = if self.lex.tok.kind != TokenKind::Semicolon
            && self.lex.tok.kind != TokenKind::RBrace
        {
            self.parse_expr()?
        } else {
            self.prim.void
        };

        // Locate the enclosing function's signature.
        let fn_id = self
            .blocks
            .enclosing_fn()
            .expect("return statement inside a function body");
        let sig = self
            .types
            .get(self.idents.get(fn_id).ty)
            .sig
            .clone()
            .expect("function ident has a signature");
        let result = sig.result();

        let ty = self.implicit_conv(result, ty);
        self.check_compatible(result, ty, false)?;

        // Copy a structured result into the caller-provided storage
        // behind __result. That store writes into a caller frame and
        // needs no refcount update.
        if self.types.is_structured(result) {
            let result_ident = self
                .idents
                .assert_find("__result")
                .map_err(|e| self.ty_err(e))?;
            let size = self.size_of(result)?;

            self.push_var_ptr(result_ident);
            self.r#gen.deref(TypeKind::Ptr);
            self.r#gen.swap_assign(self.types.kind(result), size);

            self.push_var_ptr(result_ident);
            self.r#gen.deref(TypeKind::Ptr);
            // A str result leaves the caller's storage holding the
            // string pointer; reload it so the result register carries
            // the pointer itself, like every other str value.
            if self.types.kind(result) == TypeKind::Str {
                self.r#gen.deref(TypeKind::Str);
            }
        }

        if self.types.kind(result) != TypeKind::Void {
            self.emit_change_ref_cnt(TokenKind::PlusPlus, result);
            self.r#gen.pop_reg(Reg::Result);
        }

        let target = self
            .returns
            .as_ref()
            .expect("returns set installed for the function")
            .block;
        self.collect_down_to(target);

        let mut returns = self.returns.take().expect("checked above");
        self.r#gen.gotos_add_stub(&mut returns);
        self.returns = Some(returns);
        Ok(())
    }

    // =========================================================================
    // Function bodies
    // =========================================================================

    /// fnBlock = block. Ties the scope to the function ident, allocates
    /// parameters, installs the `return` jump set, and closes the frame.
    pub(crate) fn parse_fn_block(&mut self, fn_id: IdentId) -> CompileResult<()> {
        self.lex.eat(TokenKind::LBrace)?;
        self.open_scope(Some(fn_id))?;

        let name = self.idents.get(fn_id).name.clone();
        let sig = self
            .types
            .get(self.idents.get(fn_id).ty)
            .sig
            .clone()
            .expect("function ident has a signature");
        debug!(%name, "compiling function body");

        let is_main = name == "main";
        if is_main {
            if sig.is_method
                || !sig.params.is_empty()
                || self.types.kind(sig.result()) != TypeKind::Void
            {
                return Err(self.error("Illegal main() signature"));
            }
            self.r#gen.entry_point(0);
        } else if let Some(proto) = self.idents.get(fn_id).prototype_offset {
            self.r#gen.entry_point(proto);
            self.idents.get_mut(fn_id).prototype_offset = None;
        }

        self.r#gen.enter_frame_stub();
        for index in 0..sig.params.len() {
            self.alloc_param(&sig, index)?;
        }

        let outer_returns = self.returns.replace(Gotos::new(self.blocks.current()));

        self.parse_stmt_list()?;

        if !self.blocks.top().has_return && self.types.kind(sig.result()) != TypeKind::Void {
            return Err(self.error("Non-void function block must have return statement"));
        }

        let mut returns = self.returns.take().expect("installed above");
        self.r#gen.gotos_epilog(&mut returns);
        self.returns = outer_returns;

        let block = self.blocks.current();
        self.collect(block);
        self.idents.free_block(block);
        self.types.free_block(block);
        self.r#gen.leave_frame_fixup(self.blocks.top().local_var_size);

        if is_main {
            // Release the globals before the program halts.
            self.collect(0);
            self.r#gen.halt();
        } else {
            let param_slots = self
                .types
                .param_size_total(&sig)
                .map_err(|e| self.ty_err(e))?
                / tarn_types::table::SLOT_SIZE;
            self.r#gen.return_(param_slots);
        }

        self.blocks.leave();
        self.lex.eat(TokenKind::RBrace)
    }
}
