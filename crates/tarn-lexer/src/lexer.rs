//! The lexer: a hand-written scanner holding exactly one token of state.
//!
//! Cloning a `Lexer` is cheap (the source is behind an `Arc`), which is
//! what the statement compiler relies on for one-token lookahead.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tarn_common::{CompileResult, Diagnostic, Pos, Span};

use crate::token::{Token, TokenKind};

static KEYWORDS: Lazy<FxHashMap<&'static str, TokenKind>> = Lazy::new(|| {
    let mut map = FxHashMap::default();
    map.insert("break", TokenKind::Break);
    map.insert("case", TokenKind::Case);
    map.insert("const", TokenKind::Const);
    map.insert("continue", TokenKind::Continue);
    map.insert("default", TokenKind::Default);
    map.insert("else", TokenKind::Else);
    map.insert("fiber", TokenKind::Fiber);
    map.insert("fn", TokenKind::Fn);
    map.insert("for", TokenKind::For);
    map.insert("if", TokenKind::If);
    map.insert("in", TokenKind::In);
    map.insert("interface", TokenKind::Interface);
    map.insert("return", TokenKind::Return);
    map.insert("str", TokenKind::Str);
    map.insert("struct", TokenKind::Struct);
    map.insert("switch", TokenKind::Switch);
    map.insert("type", TokenKind::Type);
    map.insert("var", TokenKind::Var);
    map.insert("weak", TokenKind::Weak);
    map
});

/// A clonable single-token lexer over one source file.
#[derive(Clone, Debug)]
pub struct Lexer {
    file: Arc<str>,
    src: Arc<str>,
    offset: usize,
    line: u32,
    col: u32,
    /// The current token.
    pub tok: Token,
}

impl Lexer {
    /// Create a lexer and scan the first token.
    pub fn new(file: &str, source: &str) -> CompileResult<Self> {
        let mut lexer = Lexer {
            file: Arc::from(file),
            src: Arc::from(source),
            offset: 0,
            line: 1,
            col: 1,
            tok: Token::default(),
        };
        lexer.next()?;
        Ok(lexer)
    }

    /// The file this lexer is scanning.
    #[must_use]
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Build a diagnostic at the current token.
    #[must_use]
    pub fn error(&self, message: impl Into<String>) -> Diagnostic {
        Diagnostic::error(self.file.as_ref(), self.tok.pos, message)
    }

    /// Assert the current token kind and advance past it.
    pub fn eat(&mut self, kind: TokenKind) -> CompileResult<()> {
        self.check(kind)?;
        self.next()
    }

    /// Assert the current token kind without advancing.
    pub fn check(&self, kind: TokenKind) -> CompileResult<()> {
        if self.tok.kind != kind {
            return Err(self.error(format!("{} expected but {} found", kind, self.tok.kind)));
        }
        Ok(())
    }

    /// Peek at the token after the current one without consuming input.
    pub fn lookahead(&self) -> CompileResult<TokenKind> {
        let mut clone = self.clone();
        clone.next()?;
        Ok(clone.tok.kind)
    }

    // =========================================================================
    // Scanning
    // =========================================================================

    #[inline]
    fn peek_char(&self) -> Option<char> {
        self.src[self.offset..].chars().next()
    }

    #[inline]
    fn peek_char2(&self) -> Option<char> {
        let mut chars = self.src[self.offset..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.offset += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn skip_whitespace_and_comments(&mut self) -> CompileResult<()> {
        loop {
            match self.peek_char() {
                Some(ch) if ch.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_char2() == Some('/') => {
                    while let Some(ch) = self.peek_char() {
                        if ch == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek_char2() == Some('*') => {
                    let open = Pos::new(self.line, self.col);
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek_char() {
                            Some('*') if self.peek_char2() == Some('/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            Some(_) => {
                                self.bump();
                            }
                            None => {
                                return Err(Diagnostic::error(
                                    self.file.as_ref(),
                                    open,
                                    "Unterminated comment",
                                ));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Advance to the next token.
    pub fn next(&mut self) -> CompileResult<()> {
        self.skip_whitespace_and_comments()?;

        let pos = Pos::new(self.line, self.col);
        let start = self.offset as u32;
        self.tok = Token {
            pos,
            ..Token::default()
        };

        let Some(ch) = self.peek_char() else {
            self.tok.kind = TokenKind::Eof;
            self.tok.span = Span::at(start);
            return Ok(());
        };

        if ch.is_ascii_alphabetic() || ch == '_' {
            self.scan_ident()?;
        } else if ch.is_ascii_digit() {
            self.scan_number()?;
        } else if ch == '\'' {
            self.scan_char()?;
        } else if ch == '"' {
            self.scan_str()?;
        } else {
            self.scan_operator(ch)?;
        }
        self.tok.span = Span::new(start, self.offset as u32);
        Ok(())
    }

    fn scan_ident(&mut self) -> CompileResult<()> {
        let mut name = String::new();
        while let Some(ch) = self.peek_char() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                name.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        if name.len() > tarn_common::limits::MAX_IDENT_LEN {
            return Err(self.error("Identifier too long"));
        }
        if let Some(&kind) = KEYWORDS.get(name.as_str()) {
            self.tok.kind = kind;
        } else {
            self.tok.kind = TokenKind::Ident;
            self.tok.name = name;
        }
        Ok(())
    }

    fn scan_number(&mut self) -> CompileResult<()> {
        // Hexadecimal
        if self.peek_char() == Some('0') && matches!(self.peek_char2(), Some('x' | 'X')) {
            self.bump();
            self.bump();
            let mut value: i64 = 0;
            let mut any = false;
            while let Some(digit) = self.peek_char().and_then(|c| c.to_digit(16)) {
                value = value.wrapping_mul(16).wrapping_add(i64::from(digit));
                any = true;
                self.bump();
            }
            if !any {
                return Err(self.error("Invalid hexadecimal number"));
            }
            self.tok.kind = TokenKind::IntLit;
            self.tok.int_val = value;
            return Ok(());
        }

        let mut text = String::new();
        while let Some(ch) = self.peek_char() {
            if ch.is_ascii_digit() {
                text.push(ch);
                self.bump();
            } else {
                break;
            }
        }

        // A '.' starts a real literal only if followed by a digit, so that
        // a designator like 3.x never lexes (there are no such designators,
        // but `a[1].f` must not glue the dot to the index).
        let mut is_real = false;
        if self.peek_char() == Some('.') && self.peek_char2().is_some_and(|c| c.is_ascii_digit()) {
            is_real = true;
            text.push('.');
            self.bump();
            while let Some(ch) = self.peek_char() {
                if ch.is_ascii_digit() {
                    text.push(ch);
                    self.bump();
                } else {
                    break;
                }
            }
        }
        if matches!(self.peek_char(), Some('e' | 'E')) {
            is_real = true;
            text.push('e');
            self.bump();
            if matches!(self.peek_char(), Some('+' | '-')) {
                if let Some(sign) = self.bump() {
                    text.push(sign);
                }
            }
            let mut any = false;
            while let Some(ch) = self.peek_char() {
                if ch.is_ascii_digit() {
                    text.push(ch);
                    self.bump();
                    any = true;
                } else {
                    break;
                }
            }
            if !any {
                return Err(self.error("Invalid number"));
            }
        }

        if is_real {
            self.tok.kind = TokenKind::RealLit;
            self.tok.real_val = text.parse().map_err(|_| self.error("Invalid number"))?;
        } else {
            self.tok.kind = TokenKind::IntLit;
            self.tok.int_val = text.parse().map_err(|_| self.error("Invalid number"))?;
        }
        Ok(())
    }

    fn scan_escape(&mut self) -> CompileResult<char> {
        self.bump();
        let Some(ch) = self.bump() else {
            return Err(self.error("Unterminated escape sequence"));
        };
        match ch {
            'n' => Ok('\n'),
            'r' => Ok('\r'),
            't' => Ok('\t'),
            '0' => Ok('\0'),
            '\\' => Ok('\\'),
            '\'' => Ok('\''),
            '"' => Ok('"'),
            _ => Err(self.error(format!("Invalid escape sequence \\{ch}"))),
        }
    }

    fn scan_char(&mut self) -> CompileResult<()> {
        self.bump();
        let ch = match self.peek_char() {
            Some('\\') => self.scan_escape()?,
            Some('\'') | None => return Err(self.error("Invalid character literal")),
            Some(ch) => {
                self.bump();
                ch
            }
        };
        if self.peek_char() != Some('\'') {
            return Err(self.error("Invalid character literal"));
        }
        self.bump();
        self.tok.kind = TokenKind::CharLit;
        self.tok.int_val = ch as i64;
        Ok(())
    }

    fn scan_str(&mut self) -> CompileResult<()> {
        self.bump();
        let mut value = String::new();
        loop {
            match self.peek_char() {
                Some('"') => {
                    self.bump();
                    break;
                }
                Some('\\') => value.push(self.scan_escape()?),
                Some('\n') | None => return Err(self.error("Unterminated string literal")),
                Some(ch) => {
                    value.push(ch);
                    self.bump();
                }
            }
        }
        self.tok.kind = TokenKind::StrLit;
        self.tok.str_val = value;
        Ok(())
    }

    fn scan_operator(&mut self, first: char) -> CompileResult<()> {
        use TokenKind::*;
        self.bump();
        let second = self.peek_char();

        // Two- and three-character operators first.
        let kind = match (first, second) {
            ('+', Some('+')) => Some(PlusPlus),
            ('+', Some('=')) => Some(PlusEq),
            ('-', Some('-')) => Some(MinusMinus),
            ('-', Some('=')) => Some(MinusEq),
            ('*', Some('=')) => Some(MulEq),
            ('/', Some('=')) => Some(DivEq),
            ('%', Some('=')) => Some(ModEq),
            ('&', Some('&')) => Some(AndAnd),
            ('&', Some('=')) => Some(AndEq),
            ('|', Some('|')) => Some(OrOr),
            ('|', Some('=')) => Some(OrEq),
            ('~', Some('=')) => Some(XorEq),
            ('=', Some('=')) => Some(EqEq),
            ('!', Some('=')) => Some(NotEq),
            (':', Some('=')) => Some(ColonEq),
            ('<', Some('=')) => Some(LessEq),
            ('>', Some('=')) => Some(GreaterEq),
            ('<', Some('<')) => {
                self.bump();
                if self.peek_char() == Some('=') {
                    self.bump();
                    self.tok.kind = ShlEq;
                } else {
                    self.tok.kind = Shl;
                }
                return Ok(());
            }
            ('>', Some('>')) => {
                self.bump();
                if self.peek_char() == Some('=') {
                    self.bump();
                    self.tok.kind = ShrEq;
                } else {
                    self.tok.kind = Shr;
                }
                return Ok(());
            }
            _ => Option::None,
        };
        if let Some(kind) = kind {
            self.bump();
            self.tok.kind = kind;
            return Ok(());
        }

        self.tok.kind = match first {
            '+' => Plus,
            '-' => Minus,
            '*' => Mul,
            '/' => Div,
            '%' => Mod,
            '&' => And,
            '|' => Or,
            '~' => Xor,
            '!' => Not,
            '=' => Eq,
            '<' => Less,
            '>' => Greater,
            '(' => LParen,
            ')' => RParen,
            '[' => LBracket,
            ']' => RBracket,
            '{' => LBrace,
            '}' => RBrace,
            '^' => Caret,
            ';' => Semicolon,
            ':' => Colon,
            ',' => Comma,
            '.' => Period,
            _ => return Err(self.error(format!("Unexpected character {first:?}"))),
        };
        Ok(())
    }
}
