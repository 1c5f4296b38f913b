//! Tests for diagnostic rendering and name hashing.

use tarn_common::{Diagnostic, Pos, Span, hash_name};

#[test]
fn diagnostic_renders_as_single_line() {
    let diag = Diagnostic::error("main.tarn", Pos::new(3, 14), "Unknown identifier foo");
    assert_eq!(diag.to_string(), "main.tarn:3:14: Unknown identifier foo");
}

#[test]
fn pos_starts_at_line_one_column_one() {
    assert_eq!(Pos::start(), Pos::new(1, 1));
    assert_eq!(Pos::default(), Pos::start());
}

#[test]
fn hash_name_is_deterministic_and_discriminating() {
    assert_eq!(hash_name("item"), hash_name("item"));
    assert_ne!(hash_name("item"), hash_name("index"));
    assert_ne!(hash_name(""), hash_name(" "));
}

#[test]
fn span_merge_and_slice() {
    let a = Span::new(2, 5);
    let b = Span::new(4, 9);
    assert_eq!(a.merge(b), Span::new(2, 9));
    assert_eq!(a.len(), 3);
    assert_eq!(Span::new(0, 5).slice("hello world"), "hello");
    assert!(Span::at(7).is_empty());
}
