//! Refcount balance properties: on every path through a function, each
//! garbage-collected local nets one increment and one decrement between
//! declaration and scope exit, and early exits release exactly the
//! scopes they skip.

use tarn_bytecode::Instr;
use tarn_compiler::{Compiler, Module};
use tarn_lexer::TokenKind;
use tarn_types::TypeKind;

fn compile(source: &str) -> Module {
    Compiler::new("test.tarn", source)
        .and_then(Compiler::compile)
        .expect("program should compile")
}

fn increments(module: &Module, kind: TypeKind) -> usize {
    module
        .code
        .iter()
        .filter(|i| {
            matches!(i, Instr::ChangeRefCnt { op, kind: k } if *op == TokenKind::PlusPlus && *k == kind)
        })
        .count()
}

fn decrements(module: &Module, kind: TypeKind) -> usize {
    module
        .code
        .iter()
        .filter(|i| {
            matches!(i, Instr::ChangeRefCnt { op, kind: k } if *op == TokenKind::MinusMinus && *k == kind)
        })
        .count()
}

#[test]
fn straight_line_function_balances_each_local() {
    let module = compile(r#"fn main() { s := "a"; t := "b"; }"#);
    assert_eq!(increments(&module, TypeKind::Str), 2);
    assert_eq!(decrements(&module, TypeKind::Str), 2);
}

#[test]
fn nested_blocks_release_at_their_own_exit() {
    let module = compile(r#"fn main() { s := "outer"; { t := "inner"; }; }"#);
    assert_eq!(increments(&module, TypeKind::Str), 2);
    assert_eq!(decrements(&module, TypeKind::Str), 2);

    // The inner release precedes the outer one in the code stream.
    let positions: Vec<usize> = module
        .code
        .iter()
        .enumerate()
        .filter(|(_, i)| {
            matches!(
                i,
                Instr::ChangeRefCnt {
                    op: TokenKind::MinusMinus,
                    kind: TypeKind::Str
                }
            )
        })
        .map(|(at, _)| at)
        .collect();
    assert_eq!(positions.len(), 2);
    assert!(positions[0] < positions[1]);
}

#[test]
fn break_releases_the_scopes_it_skips() {
    let module = compile(
        r#"fn main() {
            for i := 0; i < 3; i++ {
                s := "x";
                if i == 1 { break }
            }
        }"#,
    );
    // One increment when s is declared; one decrement on the normal
    // body exit and one more spliced in before the break jump.
    assert_eq!(increments(&module, TypeKind::Str), 1);
    assert_eq!(decrements(&module, TypeKind::Str), 2);
}

#[test]
fn continue_releases_the_scopes_it_skips() {
    let module = compile(
        r#"fn main() {
            for i := 0; i < 3; i++ {
                s := "x";
                if i == 1 { continue }
            }
        }"#,
    );
    assert_eq!(increments(&module, TypeKind::Str), 1);
    assert_eq!(decrements(&module, TypeKind::Str), 2);
}

#[test]
fn early_return_releases_skipped_scopes_once_each() {
    let module = compile(
        r#"fn f(): int {
            s := "kept";
            { t := "inner"; return 1 };
            return 2
        }
        fn main() { }"#,
    );
    // s lives in the function block itself: the return does not release
    // it (the shared epilog does). t is released both on the return path
    // and on the unreachable normal block exit.
    assert_eq!(increments(&module, TypeKind::Str), 2);
    assert_eq!(decrements(&module, TypeKind::Str), 3);
}

#[test]
fn string_return_value_is_retained_for_the_caller() {
    let module = compile(r#"fn f(): str { return "value" }  fn main() { }"#);
    // The result's refcount is incremented before it moves into the
    // result register; the function owns no string locals.
    assert_eq!(increments(&module, TypeKind::Str), 1);
    assert_eq!(decrements(&module, TypeKind::Str), 0);
}

#[test]
fn loop_condition_temporaries_release_inside_the_loop() {
    let module = compile(
        r#"fn f(): str { return "v" }
           fn main() { for f() < "z" { } }"#,
    );
    // The call result temporary belongs to the condition sub-scope, so
    // its release sits between the condition prolog and epilog - inside
    // the per-iteration region, not after the loop.
    assert_eq!(decrements(&module, TypeKind::Str), 1);
    assert!(!module.listing().contains("????"));
}

#[test]
fn gc_types_are_transitive_through_composites() {
    let module = compile(
        r#"type Holder = struct { name: str; n: int }
           fn main() { var h: Holder; }"#,
    );
    // A struct containing a string is released as a struct.
    assert_eq!(decrements(&module, TypeKind::Struct), 1);
}

#[test]
fn plain_value_types_emit_no_refcount_traffic() {
    let module = compile(
        "fn main() {
            x := 1;
            y := 2.5;
            b := true;
            var a: [4]int;
            a[0] = x;
        }",
    );
    let refcount_ops = module
        .code
        .iter()
        .filter(|i| {
            matches!(
                i,
                Instr::ChangeRefCnt { .. }
                    | Instr::ChangeRefCntAssign { .. }
                    | Instr::SwapChangeRefCntAssign { .. }
            )
        })
        .count();
    assert_eq!(refcount_ops, 0);
}

#[test]
fn reference_assignment_uses_the_fused_refcount_store() {
    let module = compile(r#"fn main() { var s: str; s = "x"; }"#);
    assert!(module
        .code
        .contains(&Instr::ChangeRefCntAssign { kind: TypeKind::Str }));
}

#[test]
fn for_in_item_assignment_is_refcount_aware_for_reference_items() {
    let module = compile(
        r#"fn main() {
            var words: []str;
            for w in words { }
        }"#,
    );
    assert!(module
        .code
        .contains(&Instr::SwapChangeRefCntAssign { kind: TypeKind::Str }));
    // w is released on each body exit and words on function exit.
    assert!(decrements(&module, TypeKind::Str) >= 1);
    assert_eq!(decrements(&module, TypeKind::DynArray), 1);
}
