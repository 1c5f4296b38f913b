//! Tests for block nesting, identifier ownership, and shadowing.

use tarn_compiler::{Blocks, Compiler, IdentKind, Idents, Storage};
use tarn_types::{TypeKind, TypeTable};

fn int_type(types: &mut TypeTable) -> tarn_types::TypeId {
    types.add(0, TypeKind::Int)
}

// =============================================================================
// Block stack
// =============================================================================

#[test]
fn block_numbers_are_unique_and_monotonic() {
    let mut blocks = Blocks::new();
    assert_eq!(blocks.current(), 0);

    blocks.enter(None).unwrap();
    let first = blocks.current();
    blocks.enter(None).unwrap();
    let second = blocks.current();
    assert!(second > first);

    blocks.leave();
    assert_eq!(blocks.current(), first);

    // Re-entering produces a fresh number, never a reused one.
    blocks.enter(None).unwrap();
    assert!(blocks.current() > second);
}

#[test]
fn block_nesting_depth_is_bounded() {
    let mut blocks = Blocks::new();
    let mut failed = false;
    for _ in 0..tarn_common::limits::MAX_BLOCK_NESTING + 1 {
        if blocks.enter(None).is_err() {
            failed = true;
            break;
        }
    }
    assert!(failed, "nesting past the limit must fail");
}

#[test]
fn locals_accumulate_on_the_enclosing_function_block() {
    let mut types = TypeTable::new();
    let mut idents = Idents::new();
    let fn_ty = types.add(0, TypeKind::Fn);
    let fn_id = idents
        .add(IdentKind::Fn, "f", fn_ty, 0, Storage::Code(0), false)
        .unwrap();

    let mut blocks = Blocks::new();
    blocks.enter(Some(fn_id)).unwrap();
    assert_eq!(blocks.alloc_local(8), -8);

    // A nested plain block still allocates into the function frame.
    blocks.enter(None).unwrap();
    assert_eq!(blocks.alloc_local(8), -16);
    blocks.leave();

    assert_eq!(blocks.alloc_local(4), -20);
    assert_eq!(blocks.top().local_var_size, 20);
}

// =============================================================================
// Identifier table
// =============================================================================

#[test]
fn lookup_walks_newest_to_oldest_so_inner_scopes_shadow() {
    let mut types = TypeTable::new();
    let mut idents = Idents::new();
    let int = int_type(&mut types);
    let str_ = types.add(0, TypeKind::Str);

    let outer = idents
        .add(IdentKind::Var, "x", int, 1, Storage::Local(-8), false)
        .unwrap();
    let inner = idents
        .add(IdentKind::Var, "x", str_, 2, Storage::Local(-16), false)
        .unwrap();

    assert_eq!(idents.find("x"), Some(inner));
    idents.free_block(2);
    assert_eq!(idents.find("x"), Some(outer));
}

#[test]
fn idents_of_a_dead_block_are_not_findable() {
    let mut types = TypeTable::new();
    let mut idents = Idents::new();
    let int = int_type(&mut types);

    idents
        .add(IdentKind::Var, "temp", int, 3, Storage::Local(-8), false)
        .unwrap();
    assert!(idents.find("temp").is_some());

    idents.free_block(3);
    assert!(idents.find("temp").is_none());
    assert!(idents.is_empty());
}

#[test]
fn duplicates_are_rejected_within_a_block_but_not_across() {
    let mut types = TypeTable::new();
    let mut idents = Idents::new();
    let int = int_type(&mut types);

    idents
        .add(IdentKind::Var, "x", int, 1, Storage::Local(-8), false)
        .unwrap();
    let err = idents
        .add(IdentKind::Var, "x", int, 1, Storage::Local(-16), false)
        .unwrap_err();
    assert!(err.0.contains("Duplicate identifier x"));

    // The same name in a nested block is shadowing, not duplication.
    assert!(idents
        .add(IdentKind::Var, "x", int, 2, Storage::Local(-16), false)
        .is_ok());
}

#[test]
fn unknown_identifier_lookup_reports_the_name() {
    let idents = Idents::new();
    let err = idents.assert_find("ghost").unwrap_err();
    assert_eq!(err.0, "Unknown identifier ghost");
}

// =============================================================================
// Compiled scoping behavior
// =============================================================================

#[test]
fn inner_declarations_vanish_after_their_block() {
    let err = Compiler::new(
        "test.tarn",
        "fn main() { { y := 1; y = 2; }; y = 3; }",
    )
    .and_then(Compiler::compile)
    .unwrap_err();
    assert!(err.message.contains("Unknown identifier y"));
}

#[test]
fn shadowing_in_nested_blocks_compiles() {
    let module = Compiler::new(
        "test.tarn",
        r#"fn main() { x := 1; { x := "inner"; x = "again"; }; x = 2; }"#,
    )
    .and_then(Compiler::compile)
    .expect("shadowing should compile");
    assert!(!module.listing().contains("????"));
}

#[test]
fn loop_variables_are_scoped_to_the_loop() {
    let err = Compiler::new(
        "test.tarn",
        "fn main() { for i := 0; i < 3; i++ { }; i = 5; }",
    )
    .and_then(Compiler::compile)
    .unwrap_err();
    assert!(err.message.contains("Unknown identifier i"));
}

#[test]
fn switch_header_declaration_is_scoped_to_the_switch() {
    let err = Compiler::new(
        "test.tarn",
        "fn main() { switch v := 2; v { case 2: }; v = 1; }",
    )
    .and_then(Compiler::compile)
    .unwrap_err();
    assert!(err.message.contains("Unknown identifier v"));
}
