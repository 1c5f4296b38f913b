//! Tests for token scanning and lookahead cloning.

use tarn_lexer::{Lexer, TokenKind};

fn kinds(source: &str) -> Vec<TokenKind> {
    let mut lexer = Lexer::new("test.tarn", source).expect("lex");
    let mut out = Vec::new();
    while lexer.tok.kind != TokenKind::Eof {
        out.push(lexer.tok.kind);
        lexer.next().expect("lex");
    }
    out
}

#[test]
fn scans_keywords_and_identifiers() {
    assert_eq!(
        kinds("fn main for item in collection"),
        vec![
            TokenKind::Fn,
            TokenKind::Ident,
            TokenKind::For,
            TokenKind::Ident,
            TokenKind::In,
            TokenKind::Ident,
        ]
    );
}

#[test]
fn scans_compound_assignment_operators() {
    assert_eq!(
        kinds("+= -= *= /= %= &= |= ~= <<= >>="),
        vec![
            TokenKind::PlusEq,
            TokenKind::MinusEq,
            TokenKind::MulEq,
            TokenKind::DivEq,
            TokenKind::ModEq,
            TokenKind::AndEq,
            TokenKind::OrEq,
            TokenKind::XorEq,
            TokenKind::ShlEq,
            TokenKind::ShrEq,
        ]
    );
}

#[test]
fn distinguishes_shift_from_comparison() {
    assert_eq!(
        kinds("a << b < c <= d"),
        vec![
            TokenKind::Ident,
            TokenKind::Shl,
            TokenKind::Ident,
            TokenKind::Less,
            TokenKind::Ident,
            TokenKind::LessEq,
            TokenKind::Ident,
        ]
    );
}

#[test]
fn short_assignment_maps_to_underlying_operator() {
    assert_eq!(TokenKind::PlusEq.short_assignment(), TokenKind::Plus);
    assert_eq!(TokenKind::ShrEq.short_assignment(), TokenKind::Shr);
    assert_eq!(TokenKind::Eq.short_assignment(), TokenKind::None);
    assert_eq!(TokenKind::Plus.short_assignment(), TokenKind::None);
}

#[test]
fn scans_number_literals() {
    let lexer = Lexer::new("test.tarn", "42").expect("lex");
    assert_eq!(lexer.tok.kind, TokenKind::IntLit);
    assert_eq!(lexer.tok.int_val, 42);

    let lexer = Lexer::new("test.tarn", "0x2a").expect("lex");
    assert_eq!(lexer.tok.int_val, 42);

    let lexer = Lexer::new("test.tarn", "1.5").expect("lex");
    assert_eq!(lexer.tok.kind, TokenKind::RealLit);
    assert_eq!(lexer.tok.real_val, 1.5);

    let lexer = Lexer::new("test.tarn", "2e3").expect("lex");
    assert_eq!(lexer.tok.kind, TokenKind::RealLit);
    assert_eq!(lexer.tok.real_val, 2000.0);
}

#[test]
fn dot_after_integer_stays_a_period() {
    // `a[1].f` must not glue the dot onto the index literal.
    assert_eq!(
        kinds("a[1].f"),
        vec![
            TokenKind::Ident,
            TokenKind::LBracket,
            TokenKind::IntLit,
            TokenKind::RBracket,
            TokenKind::Period,
            TokenKind::Ident,
        ]
    );
}

#[test]
fn scans_string_and_char_literals_with_escapes() {
    let lexer = Lexer::new("test.tarn", r#""hello\n""#).expect("lex");
    assert_eq!(lexer.tok.kind, TokenKind::StrLit);
    assert_eq!(lexer.tok.str_val, "hello\n");

    let lexer = Lexer::new("test.tarn", r"'\t'").expect("lex");
    assert_eq!(lexer.tok.kind, TokenKind::CharLit);
    assert_eq!(lexer.tok.int_val, '\t' as i64);
}

#[test]
fn skips_line_and_block_comments() {
    assert_eq!(
        kinds("a // comment\nb /* multi\nline */ c"),
        vec![TokenKind::Ident, TokenKind::Ident, TokenKind::Ident]
    );
}

#[test]
fn unterminated_string_is_fatal() {
    let err = Lexer::new("test.tarn", "\"oops").unwrap_err();
    assert!(err.message.contains("Unterminated string"));
}

#[test]
fn lookahead_does_not_consume() {
    let mut lexer = Lexer::new("test.tarn", "x := 1").expect("lex");
    assert_eq!(lexer.lookahead().expect("lex"), TokenKind::ColonEq);
    assert_eq!(lexer.tok.kind, TokenKind::Ident);
    assert_eq!(lexer.tok.name, "x");

    // A clone advances independently of the original.
    let mut clone = lexer.clone();
    clone.next().expect("lex");
    clone.next().expect("lex");
    assert_eq!(clone.tok.kind, TokenKind::IntLit);
    assert_eq!(lexer.tok.kind, TokenKind::Ident);
    lexer.next().expect("lex");
    assert_eq!(lexer.tok.kind, TokenKind::ColonEq);
}

#[test]
fn eat_reports_expected_and_found() {
    let mut lexer = Lexer::new("test.tarn", "x").expect("lex");
    let err = lexer.eat(TokenKind::LBrace).unwrap_err();
    assert!(err.message.contains("{ expected"));
    assert_eq!(err.pos.line, 1);
}

#[test]
fn token_spans_slice_the_source_text() {
    let source = "alpha := beta";
    let mut lexer = Lexer::new("test.tarn", source).expect("lex");
    assert_eq!(lexer.tok.span.slice(source), "alpha");
    lexer.next().expect("lex");
    assert_eq!(lexer.tok.span.slice(source), ":=");
    lexer.next().expect("lex");
    assert_eq!(lexer.tok.span.slice(source), "beta");
}

#[test]
fn tracks_line_and_column_positions() {
    let mut lexer = Lexer::new("test.tarn", "a\n  b").expect("lex");
    assert_eq!((lexer.tok.pos.line, lexer.tok.pos.col), (1, 1));
    lexer.next().expect("lex");
    assert_eq!((lexer.tok.pos.line, lexer.tok.pos.col), (2, 3));
}
