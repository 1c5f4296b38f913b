//! End-to-end compilation tests: source snippets in, emitted instruction
//! streams and diagnostics out.

use tarn_bytecode::{Builtin, Instr};
use tarn_common::Diagnostic;
use tarn_compiler::{Compiler, Externals, Module};
use tarn_lexer::TokenKind;
use tarn_types::TypeKind;

fn compile(source: &str) -> Module {
    Compiler::new("test.tarn", source)
        .and_then(Compiler::compile)
        .expect("program should compile")
}

fn compile_err(source: &str) -> Diagnostic {
    Compiler::new("test.tarn", source)
        .and_then(Compiler::compile)
        .expect_err("program should not compile")
}

fn compile_with_externals(source: &str, externals: &[(&str, usize)]) -> Module {
    let mut registry = Externals::new();
    for (name, entry) in externals {
        registry.add(name, *entry);
    }
    Compiler::with_externals("test.tarn", source, registry)
        .and_then(Compiler::compile)
        .expect("program should compile")
}

fn count(code: &[Instr], pred: impl Fn(&Instr) -> bool) -> usize {
    code.iter().filter(|i| pred(i)).count()
}

fn has_seq(code: &[Instr], seq: &[Instr]) -> bool {
    code.windows(seq.len()).any(|w| w == seq)
}

// =============================================================================
// Scenario: simple assignment, no reference counting
// =============================================================================

#[test]
fn assignment_of_scalar_expression_emits_plain_store() {
    let module = compile("fn main() { var x: int; x = 41 + 1; }");

    assert!(has_seq(
        &module.code,
        &[
            Instr::PushLocalPtr(-8),
            Instr::PushIntConst(41),
            Instr::PushIntConst(1),
            Instr::Binary {
                op: TokenKind::Plus,
                kind: TypeKind::Int
            },
            Instr::Assign {
                kind: TypeKind::Int,
                size: 8
            },
        ]
    ));
    // No refcount ops anywhere: int carries no reference count.
    assert_eq!(
        count(&module.code, |i| matches!(
            i,
            Instr::ChangeRefCnt { .. }
                | Instr::ChangeRefCntAssign { .. }
                | Instr::SwapChangeRefCntAssign { .. }
        )),
        0
    );
    // The frame holds exactly x.
    assert!(module
        .code
        .contains(&Instr::EnterFrame { local_size: 8 }));
}

// =============================================================================
// Scenario: short variable declaration with a reference type
// =============================================================================

#[test]
fn short_var_decl_with_string_balances_refcounts() {
    let module = compile(r#"fn main() { s := "hello"; }"#);

    // The right side's refcount is incremented once, then swap-assigned
    // into the freshly allocated slot.
    assert!(has_seq(
        &module.code,
        &[
            Instr::ChangeRefCnt {
                op: TokenKind::PlusPlus,
                kind: TypeKind::Str
            },
            Instr::PushLocalPtr(-8),
            Instr::SwapAssign {
                kind: TypeKind::Str,
                size: 8
            },
        ]
    ));
    // On block exit, one decrement for s.
    assert!(has_seq(
        &module.code,
        &[
            Instr::PushLocalPtr(-8),
            Instr::Deref(TypeKind::Str),
            Instr::ChangeRefCnt {
                op: TokenKind::MinusMinus,
                kind: TypeKind::Str
            },
            Instr::Pop,
        ]
    ));
    // The string data landed in the global segment.
    assert!(module.data.starts_with(b"hello\0"));
}

// =============================================================================
// Scenario: loop with break in a nested scope
// =============================================================================

#[test]
fn for_in_loop_with_break_releases_the_collection_once() {
    let module = compile(
        "fn main() {
            a := []int{1,2,3};
            for i, v in a { if v == 2 { break } }
        }",
    );

    // The literal is built through the make builtin and owned by an
    // anonymous local, so exactly one increment binds it to `a`, and the
    // block exit releases both the temporary and `a`.
    assert!(module.code.contains(&Instr::CallBuiltin {
        kind: TypeKind::DynArray,
        builtin: Builtin::Make
    }));
    assert_eq!(
        count(&module.code, |i| matches!(
            i,
            Instr::ChangeRefCnt {
                op: TokenKind::PlusPlus,
                kind: TypeKind::DynArray
            }
        )),
        1
    );
    assert_eq!(
        count(&module.code, |i| matches!(
            i,
            Instr::ChangeRefCnt {
                op: TokenKind::MinusMinus,
                kind: TypeKind::DynArray
            }
        )),
        2
    );
    // The loop condition asks the collection for its length.
    assert!(module.code.contains(&Instr::CallBuiltin {
        kind: TypeKind::DynArray,
        builtin: Builtin::Len
    }));
    assert!(module.code.contains(&Instr::GetDynArrayPtr));
    // Every stub was patched.
    assert!(!module.listing().contains("????"));
}

#[test]
fn for_in_rejects_non_iterable_collections() {
    let err = compile_err("fn main() { for v in 42 { } }");
    assert!(err.message.contains("is not iterable"), "{}", err.message);
}

// =============================================================================
// Scenario: switch selector must be ordinal
// =============================================================================

#[test]
fn switch_on_real_selector_is_rejected() {
    let err = compile_err("fn main() { x := 1.5; switch x { case 1.0: } }");
    assert_eq!(err.message, "Ordinal type expected");
}

#[test]
fn switch_case_labels_must_be_constant() {
    let err = compile_err("fn main() { x := 1; y := 2; switch x { case y: } }");
    assert!(err.message.contains("Constant expected"));
}

#[test]
fn switch_with_cases_and_default_patches_all_stubs() {
    let module = compile(
        "fn main() {
            x := 2;
            switch x {
                case 1: x = 10;
                case 2, 3: x = 20;
                default: x = 30
            }
        }",
    );
    assert!(!module.listing().contains("????"));
    // One selector comparison per case expression.
    assert_eq!(
        count(&module.code, |i| matches!(
            i,
            Instr::Binary {
                op: TokenKind::EqEq,
                kind: TypeKind::Int
            }
        )),
        3
    );
}

#[test]
fn nested_switch_does_not_clobber_the_outer_selector() {
    let module = compile(
        "fn main() {
            switch 1 {
                case 1: switch 2 { case 2: }
                case 3:
            }
        }",
    );
    // The selector never leaves the operand stack: each case test
    // duplicates it, so the inner switch stacks its own selector above
    // the outer one instead of overwriting shared scratch state, and
    // the outer `case 3` test still compares against the outer value.
    assert_eq!(
        count(&module.code, |i| matches!(
            i,
            Instr::PushReg(_) | Instr::PopReg(_)
        )),
        0
    );
    assert_eq!(count(&module.code, |i| matches!(i, Instr::Dup)), 3);
    assert!(!module.listing().contains("????"));
}

#[test]
fn string_variable_reads_load_the_stored_pointer() {
    let module = compile(r#"fn main() { s := "a"; t := s; u := s + "b"; t = u; }"#);
    // Reading s loads the string pointer from its slot before the
    // refcount increment, matching what a literal pushes.
    assert!(has_seq(
        &module.code,
        &[
            Instr::PushLocalPtr(-8),
            Instr::Deref(TypeKind::Str),
            Instr::ChangeRefCnt {
                op: TokenKind::PlusPlus,
                kind: TypeKind::Str
            },
        ]
    ));
    // The concatenation operates on two loaded pointers.
    assert!(module.code.contains(&Instr::Binary {
        op: TokenKind::Plus,
        kind: TypeKind::Str
    }));
    // Three string locals: one increment each at binding, one decrement
    // each at scope exit (t = u goes through the fused assign).
    assert_eq!(
        count(&module.code, |i| matches!(
            i,
            Instr::ChangeRefCnt {
                op: TokenKind::PlusPlus,
                kind: TypeKind::Str
            }
        )),
        3
    );
    assert_eq!(
        count(&module.code, |i| matches!(
            i,
            Instr::ChangeRefCnt {
                op: TokenKind::MinusMinus,
                kind: TypeKind::Str
            }
        )),
        3
    );
}

// =============================================================================
// Scenario: structured return through __result
// =============================================================================

#[test]
fn structured_result_is_copied_into_caller_storage() {
    let module = compile(
        "type P = struct{ x,y: int }
         fn mk(): P { var p: P; p.x = 1; p.y = 2; return p }
         fn main() { }",
    );

    // Field stores at their tight offsets.
    assert!(module.code.contains(&Instr::GetFieldPtr { offset: 0 }));
    assert!(module.code.contains(&Instr::GetFieldPtr { offset: 8 }));
    // The return copies p into the hidden result slot without touching
    // reference counts, then moves the pointer into the result register.
    assert!(has_seq(
        &module.code,
        &[
            Instr::Deref(TypeKind::Ptr),
            Instr::SwapAssign {
                kind: TypeKind::Struct,
                size: 16
            },
        ]
    ));
    assert!(module
        .code
        .contains(&Instr::PopReg(tarn_bytecode::Reg::Result)));
    assert_eq!(
        count(&module.code, |i| matches!(i, Instr::ChangeRefCnt { .. })),
        0
    );
}

#[test]
fn non_void_function_without_return_is_rejected() {
    let err = compile_err("fn f(): int { }  fn main() { }");
    assert_eq!(
        err.message,
        "Non-void function block must have return statement"
    );
}

#[test]
fn calling_a_structured_result_function_allocates_caller_storage() {
    let module = compile(
        "type P = struct{ x,y: int }
         fn mk(): P { var p: P; return p }
         fn main() { q := mk(); q.x = 3; }",
    );
    // The caller passes the hidden result pointer and reads the result
    // register afterwards.
    assert!(module
        .code
        .contains(&Instr::PushReg(tarn_bytecode::Reg::Result)));
    assert!(!module.listing().contains("????"));
}

// =============================================================================
// Scenario: unresolved prototype
// =============================================================================

#[test]
fn unresolved_prototype_fails_at_end_of_module() {
    let err = compile_err("fn foo(): int\nfn main() { }");
    assert_eq!(err.message, "Unresolved prototype of foo");
}

#[test]
fn prototype_resolves_against_the_external_registry() {
    let module = compile_with_externals("fn foo(): int\nfn main() { x := foo(); }", &[("foo", 7)]);
    assert!(module.code.contains(&Instr::CallExtern(7)));
    assert!(!module.listing().contains("????"));
}

#[test]
fn extern_trampoline_declares_params_for_garbage_collection() {
    let module = compile_with_externals("fn take(s: str): int\nfn main() { }", &[("take", 3)]);
    // The trampoline releases the string parameter after the call.
    let extern_at = module
        .code
        .iter()
        .position(|i| *i == Instr::CallExtern(3))
        .expect("trampoline emitted");
    assert!(module.code[extern_at..].contains(&Instr::ChangeRefCnt {
        op: TokenKind::MinusMinus,
        kind: TypeKind::Str
    }));
}

#[test]
fn prototype_followed_by_body_is_patched_not_resolved() {
    let module = compile(
        "fn foo(): int
         fn main() { x := foo(); }
         fn foo(): int { return 5 }",
    );
    // The placeholder slot was patched into a jump to the body.
    assert!(!module.listing().contains("????"));
    assert_eq!(count(&module.code, |i| matches!(i, Instr::CallExtern(_))), 0);
}

#[test]
fn prototype_body_signature_mismatch_is_rejected() {
    let err = compile_err(
        "fn foo(): int
         fn foo(): str { return \"x\" }
         fn main() { }",
    );
    assert!(err.message.contains("Incompatible types"));
}

// =============================================================================
// main() contract
// =============================================================================

#[test]
fn main_with_parameters_is_rejected() {
    let err = compile_err("fn main(x: int) { }");
    assert_eq!(err.message, "Illegal main() signature");
}

#[test]
fn main_with_result_is_rejected() {
    let err = compile_err("fn main(): int { return 1 }");
    assert_eq!(err.message, "Illegal main() signature");
}

#[test]
fn main_gets_the_program_entry_and_halts_after_releasing_globals() {
    let module = compile("g := \"global\"\nfn main() { }");
    // Slot 0 jumps to main's body.
    assert!(matches!(module.code[0], Instr::Goto(_)));
    // The global string is released before the halt.
    let halt_at = module
        .code
        .iter()
        .position(|i| *i == Instr::Halt)
        .expect("main emits halt");
    assert!(module.code[..halt_at].contains(&Instr::ChangeRefCnt {
        op: TokenKind::MinusMinus,
        kind: TypeKind::Str
    }));
}

// =============================================================================
// Globals and constants
// =============================================================================

#[test]
fn global_initializers_fold_into_the_data_segment() {
    let module = compile("var g: int = 41 + 1\ng2 := 7\nfn main() { g = g2 + 1 }");
    assert_eq!(&module.data[0..8], &42i64.to_le_bytes());
    assert_eq!(&module.data[8..16], &7i64.to_le_bytes());
    // Runtime access goes through global pointers.
    assert!(module.code.contains(&Instr::PushGlobalPtr(0)));
    assert!(module.code.contains(&Instr::PushGlobalPtr(8)));
}

#[test]
fn global_initializer_must_be_constant() {
    let err = compile_err("fn f(): int { return 1 }\ng := f()\nfn main() { }");
    assert!(err.message.contains("Constant expected"));
}

#[test]
fn const_declarations_fold_at_use_sites() {
    let module = compile("const N = 3 + 4\nfn main() { x := N; }");
    assert!(module.code.contains(&Instr::PushIntConst(7)));
}

#[test]
fn division_by_zero_in_constants_is_rejected() {
    let err = compile_err("const BAD = 1 / 0\nfn main() { }");
    assert_eq!(err.message, "Division by zero");
}

// =============================================================================
// Designators, operators, conversions
// =============================================================================

#[test]
fn pointer_roundtrip_compiles() {
    let module = compile(
        "fn main() {
            var x: int;
            p := &x;
            p^ = 5;
            y := p^;
            if p == null { y = 0 }
        }",
    );
    assert!(!module.listing().contains("????"));
    assert!(module.code.contains(&Instr::Binary {
        op: TokenKind::EqEq,
        kind: TypeKind::Ptr
    }));
}

#[test]
fn fixed_array_indexing_checks_bounds_against_nominal_length() {
    let module = compile("fn main() { var a: [3]int; a[0] = 1; x := a[1] + len(a); }");
    assert!(module.code.contains(&Instr::GetArrayPtr { item_size: 8 }));
    // len of a fixed array folds to its nominal length.
    assert!(has_seq(&module.code, &[Instr::Pop, Instr::PushIntConst(3)]));
}

#[test]
fn string_indexing_and_iteration_compile() {
    let module = compile(r#"fn main() { s := "ab"; c := s[0]; for ch in s { } }"#);
    assert!(module.code.contains(&Instr::GetArrayPtr { item_size: 1 }));
    assert!(module.code.contains(&Instr::CallBuiltin {
        kind: TypeKind::Str,
        builtin: Builtin::Len
    }));
    assert!(!module.listing().contains("????"));
}

#[test]
fn compound_assignment_duplicates_the_address() {
    let module = compile("fn main() { var x: int; x += 2; x <<= 1; }");
    assert!(has_seq(
        &module.code,
        &[
            Instr::Dup,
            Instr::Deref(TypeKind::Int),
            Instr::PushIntConst(2),
            Instr::Binary {
                op: TokenKind::Plus,
                kind: TypeKind::Int
            },
        ]
    ));
    assert!(module.code.contains(&Instr::Binary {
        op: TokenKind::Shl,
        kind: TypeKind::Int
    }));
}

#[test]
fn inc_dec_require_integer_designators() {
    let module = compile("fn main() { var x: int; x++; x--; }");
    assert!(module.code.contains(&Instr::Unary {
        op: TokenKind::PlusPlus,
        kind: TypeKind::Int
    }));

    let err = compile_err("fn main() { x := 1.5; x++; }");
    assert!(err.message.contains("Incompatible types"));
}

#[test]
fn operators_are_rejected_on_invalid_types() {
    let err = compile_err("fn main() { b := true; c := b + b; }");
    assert!(err.message.contains("Operator + is not applicable to bool"));

    let err = compile_err(r#"fn main() { s := "a"; t := s - s; }"#);
    assert!(err.message.contains("not applicable"));
}

#[test]
fn incompatible_assignment_is_rejected() {
    let err = compile_err(r#"fn main() { x := 1; x = "s"; }"#);
    assert_eq!(err.message, "Incompatible types int and str");
}

#[test]
fn assignment_to_non_designator_is_rejected() {
    let err = compile_err("fn main() { f() = 1; }\nfn f(): int { return 1 }");
    // `f` resolves after its declaration only; forward use is an error.
    assert!(err.message.contains("Unknown identifier"));

    let err = compile_err("fn f(): int { return 1 }\nfn main() { f() = 1; }");
    assert_eq!(err.message, "Left side cannot be assigned to");
}

#[test]
fn call_statement_discards_a_non_void_result() {
    let module = compile("fn f(): int { return 1 }\nfn main() { f(); }");
    assert!(has_seq(
        &module.code,
        &[Instr::PushReg(tarn_bytecode::Reg::Result), Instr::Pop]
    ));
}

#[test]
fn call_arity_is_checked() {
    let err = compile_err("fn f(a: int, b: int) { }\nfn main() { f(1); }");
    assert!(err.message.contains("Too few actual parameters"));

    let err = compile_err("fn f(a: int) { }\nfn main() { f(1, 2); }");
    assert!(err.message.contains("Too many actual parameters"));
}

#[test]
fn short_circuit_operators_emit_no_binary_op() {
    let module = compile("fn main() { a := true; b := false; c := a && b; d := a || b; }");
    assert_eq!(
        count(&module.code, |i| matches!(
            i,
            Instr::Binary {
                op: TokenKind::AndAnd | TokenKind::OrOr,
                ..
            }
        )),
        0
    );
    assert!(module.code.contains(&Instr::Dup));
    assert!(!module.listing().contains("????"));
}

// =============================================================================
// Control flow shape
// =============================================================================

#[test]
fn if_else_chains_patch_cleanly() {
    let module = compile(
        "fn main() {
            x := 1;
            if x > 2 { x = 2 } else if x > 1 { x = 1 } else { x = 0 }
        }",
    );
    assert!(!module.listing().contains("????"));
    assert_eq!(
        count(&module.code, |i| matches!(i, Instr::GotoIfNot(_))),
        2
    );
}

#[test]
fn if_header_short_var_decl_is_scoped_to_the_statement() {
    let err = compile_err("fn main() { if y := 1; y > 0 { }; y = 2; }");
    assert!(err.message.contains("Unknown identifier y"));
}

#[test]
fn for_header_loop_compiles_with_post_statement() {
    let module = compile("fn main() { for i := 0; i < 3; i++ { } }");
    assert!(!module.listing().contains("????"));
    assert!(module.code.contains(&Instr::Binary {
        op: TokenKind::Less,
        kind: TypeKind::Int
    }));
    assert!(module.code.contains(&Instr::Unary {
        op: TokenKind::PlusPlus,
        kind: TypeKind::Int
    }));
}

#[test]
fn break_and_continue_require_an_enclosing_loop() {
    let err = compile_err("fn main() { break }");
    assert_eq!(err.message, "No loop to break");

    let err = compile_err("fn main() { continue }");
    assert_eq!(err.message, "No loop to continue");

    let err = compile_err("fn main() { if true { break } }");
    assert_eq!(err.message, "No loop to break");
}

#[test]
fn break_applies_to_the_innermost_loop_only() {
    let module = compile(
        "fn main() {
            for i := 0; i < 3; i++ {
                for j := 0; j < 3; j++ {
                    if j == 1 { break };
                    if i == 1 { continue }
                }
            }
        }",
    );
    assert!(!module.listing().contains("????"));
}

// =============================================================================
// Declarations
// =============================================================================

#[test]
fn struct_fields_resolve_through_pointers() {
    let module = compile(
        "type Node = struct { next: ^Node; val: int }
         fn main() {
            var n: Node;
            n.val = 1;
            p := &n;
            p.val = 2;
         }",
    );
    // p.val auto-dereferences the pointer.
    assert!(module.code.contains(&Instr::GetFieldPtr { offset: 8 }));
    assert!(!module.listing().contains("????"));
}

#[test]
fn unresolved_forward_type_is_fatal() {
    let err = compile_err("type T = struct { p: ^Missing }\nfn main() { }");
    assert_eq!(err.message, "Unresolved forward declaration of Missing");
}

#[test]
fn duplicate_identifiers_in_one_block_are_rejected() {
    let err = compile_err("fn main() { x := 1; x := 2; }");
    assert_eq!(err.message, "Duplicate identifier x");
}

#[test]
fn type_aliases_are_transparent() {
    let module = compile(
        "type Meters = int
         fn main() { var m: Meters; m = 5; x := m + 1; }",
    );
    assert!(module.code.contains(&Instr::PushIntConst(5)));
}

#[test]
fn var_lists_declare_each_name() {
    let module = compile("fn main() { var a, b, c: int; a = 1; b = 2; c = 3; }");
    assert!(module
        .code
        .contains(&Instr::EnterFrame { local_size: 24 }));
}

#[test]
fn weak_pointers_parse_and_do_not_change_layout() {
    let module = compile("type T = struct { v: int }\nfn main() { var p: weak ^T; p = null; }");
    assert!(!module.listing().contains("????"));
}
