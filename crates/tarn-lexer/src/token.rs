//! Token kinds and the token value record.

use tarn_common::{Pos, Span};

/// Every token the lexer can produce.
///
/// `None` is the "no token" sentinel used before the first `next()` and as
/// the result of failed compound-assignment mapping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TokenKind {
    #[default]
    None,
    Eof,

    // Literals and identifiers
    Ident,
    IntLit,
    RealLit,
    CharLit,
    StrLit,

    // Keywords
    Break,
    Case,
    Const,
    Continue,
    Default,
    Else,
    Fiber,
    Fn,
    For,
    If,
    In,
    Interface,
    Return,
    Str,
    Struct,
    Switch,
    Type,
    Var,
    Weak,

    // Operators
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    AndAnd,
    OrOr,
    Not,
    PlusPlus,
    MinusMinus,
    PlusEq,
    MinusEq,
    MulEq,
    DivEq,
    ModEq,
    AndEq,
    OrEq,
    XorEq,
    ShlEq,
    ShrEq,
    EqEq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Eq,
    ColonEq,

    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Caret,
    Semicolon,
    Colon,
    Comma,
    Period,
}

impl TokenKind {
    /// Map a compound-assignment operator to its underlying binary
    /// operator, or `None` if this is not a compound assignment.
    #[must_use]
    pub const fn short_assignment(self) -> TokenKind {
        match self {
            TokenKind::PlusEq => TokenKind::Plus,
            TokenKind::MinusEq => TokenKind::Minus,
            TokenKind::MulEq => TokenKind::Mul,
            TokenKind::DivEq => TokenKind::Div,
            TokenKind::ModEq => TokenKind::Mod,
            TokenKind::AndEq => TokenKind::And,
            TokenKind::OrEq => TokenKind::Or,
            TokenKind::XorEq => TokenKind::Xor,
            TokenKind::ShlEq => TokenKind::Shl,
            TokenKind::ShrEq => TokenKind::Shr,
            _ => TokenKind::None,
        }
    }

    /// Human-readable spelling used in diagnostics.
    #[must_use]
    pub const fn spelling(self) -> &'static str {
        match self {
            TokenKind::None => "none",
            TokenKind::Eof => "end of file",
            TokenKind::Ident => "identifier",
            TokenKind::IntLit => "integer literal",
            TokenKind::RealLit => "real literal",
            TokenKind::CharLit => "character literal",
            TokenKind::StrLit => "string literal",
            TokenKind::Break => "break",
            TokenKind::Case => "case",
            TokenKind::Const => "const",
            TokenKind::Continue => "continue",
            TokenKind::Default => "default",
            TokenKind::Else => "else",
            TokenKind::Fiber => "fiber",
            TokenKind::Fn => "fn",
            TokenKind::For => "for",
            TokenKind::If => "if",
            TokenKind::In => "in",
            TokenKind::Interface => "interface",
            TokenKind::Return => "return",
            TokenKind::Str => "str",
            TokenKind::Struct => "struct",
            TokenKind::Switch => "switch",
            TokenKind::Type => "type",
            TokenKind::Var => "var",
            TokenKind::Weak => "weak",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Mul => "*",
            TokenKind::Div => "/",
            TokenKind::Mod => "%",
            TokenKind::And => "&",
            TokenKind::Or => "|",
            TokenKind::Xor => "~",
            TokenKind::Shl => "<<",
            TokenKind::Shr => ">>",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            TokenKind::Not => "!",
            TokenKind::PlusPlus => "++",
            TokenKind::MinusMinus => "--",
            TokenKind::PlusEq => "+=",
            TokenKind::MinusEq => "-=",
            TokenKind::MulEq => "*=",
            TokenKind::DivEq => "/=",
            TokenKind::ModEq => "%=",
            TokenKind::AndEq => "&=",
            TokenKind::OrEq => "|=",
            TokenKind::XorEq => "~=",
            TokenKind::ShlEq => "<<=",
            TokenKind::ShrEq => ">>=",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Less => "<",
            TokenKind::LessEq => "<=",
            TokenKind::Greater => ">",
            TokenKind::GreaterEq => ">=",
            TokenKind::Eq => "=",
            TokenKind::ColonEq => ":=",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Caret => "^",
            TokenKind::Semicolon => ";",
            TokenKind::Colon => ":",
            TokenKind::Comma => ",",
            TokenKind::Period => ".",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.spelling())
    }
}

/// The current token, with its decoded value.
///
/// Only the field matching `kind` is meaningful: `name` for identifiers,
/// `int_val` for integer and character literals, `real_val` for real
/// literals, `str_val` for string literals.
#[derive(Clone, Debug, Default)]
pub struct Token {
    pub kind: TokenKind,
    pub name: String,
    pub int_val: i64,
    pub real_val: f64,
    pub str_val: String,
    pub pos: Pos,
    /// Byte range of the token in the source text.
    pub span: Span,
}
