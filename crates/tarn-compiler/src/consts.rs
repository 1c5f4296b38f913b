//! Compile-time constants and the global data segment.
//!
//! `ConstValue` is the tagged value produced by constant folding, used
//! both for folding and for global initializers. `DataSegment` is the
//! byte-addressed storage of the module's globals; initializers that
//! folded to a constant are written straight into it and bypass the
//! runtime refcount path.

use tarn_lexer::TokenKind;
use tarn_types::{TypeError, TypeKind};

/// A compile-time-known value.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstValue {
    Int(i64),
    Real(f64),
    Str(String),
    Null,
}

impl ConstValue {
    /// Integer payload; booleans and characters fold as integers.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConstValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

fn bool_const(value: bool) -> ConstValue {
    ConstValue::Int(i64::from(value))
}

/// Fold a unary operator over a constant.
pub fn fold_unary(op: TokenKind, value: ConstValue) -> Result<ConstValue, TypeError> {
    match (op, value) {
        (TokenKind::Plus, v) => Ok(v),
        (TokenKind::Minus, ConstValue::Int(v)) => Ok(ConstValue::Int(v.wrapping_neg())),
        (TokenKind::Minus, ConstValue::Real(v)) => Ok(ConstValue::Real(-v)),
        (TokenKind::Not, ConstValue::Int(v)) => Ok(bool_const(v == 0)),
        (TokenKind::Xor, ConstValue::Int(v)) => Ok(ConstValue::Int(!v)),
        (op, _) => Err(TypeError(format!("Operator {op} is not applicable"))),
    }
}

/// Fold a binary operator over two constants of an already-unified type.
/// Comparison results fold to the canonical `bool` representation
/// (`Int` 0 or 1).
pub fn fold_binary(
    op: TokenKind,
    left: ConstValue,
    right: ConstValue,
) -> Result<ConstValue, TypeError> {
    use ConstValue::{Int, Real, Str};
    use TokenKind::*;
    match (left, right) {
        (Int(l), Int(r)) => match op {
            Plus => Ok(Int(l.wrapping_add(r))),
            Minus => Ok(Int(l.wrapping_sub(r))),
            Mul => Ok(Int(l.wrapping_mul(r))),
            Div => {
                if r == 0 {
                    return Err(TypeError("Division by zero".into()));
                }
                Ok(Int(l.wrapping_div(r)))
            }
            Mod => {
                if r == 0 {
                    return Err(TypeError("Division by zero".into()));
                }
                Ok(Int(l.wrapping_rem(r)))
            }
            And => Ok(Int(l & r)),
            Or => Ok(Int(l | r)),
            Xor => Ok(Int(l ^ r)),
            Shl => Ok(Int(l.wrapping_shl(r as u32))),
            Shr => Ok(Int(l.wrapping_shr(r as u32))),
            AndAnd => Ok(bool_const(l != 0 && r != 0)),
            OrOr => Ok(bool_const(l != 0 || r != 0)),
            EqEq => Ok(bool_const(l == r)),
            NotEq => Ok(bool_const(l != r)),
            Less => Ok(bool_const(l < r)),
            LessEq => Ok(bool_const(l <= r)),
            Greater => Ok(bool_const(l > r)),
            GreaterEq => Ok(bool_const(l >= r)),
            _ => Err(TypeError(format!("Operator {op} is not applicable"))),
        },
        (Real(l), Real(r)) => match op {
            Plus => Ok(Real(l + r)),
            Minus => Ok(Real(l - r)),
            Mul => Ok(Real(l * r)),
            Div => {
                if r == 0.0 {
                    return Err(TypeError("Division by zero".into()));
                }
                Ok(Real(l / r))
            }
            EqEq => Ok(bool_const(l == r)),
            NotEq => Ok(bool_const(l != r)),
            Less => Ok(bool_const(l < r)),
            LessEq => Ok(bool_const(l <= r)),
            Greater => Ok(bool_const(l > r)),
            GreaterEq => Ok(bool_const(l >= r)),
            _ => Err(TypeError(format!("Operator {op} is not applicable"))),
        },
        (Str(l), Str(r)) => match op {
            Plus => Ok(Str(l + &r)),
            EqEq => Ok(bool_const(l == r)),
            NotEq => Ok(bool_const(l != r)),
            Less => Ok(bool_const(l < r)),
            LessEq => Ok(bool_const(l <= r)),
            Greater => Ok(bool_const(l > r)),
            GreaterEq => Ok(bool_const(l >= r)),
            _ => Err(TypeError(format!("Operator {op} is not applicable"))),
        },
        _ => Err(TypeError(format!("Operator {op} is not applicable"))),
    }
}

/// Byte-addressed storage for the module's global variables.
///
/// String data lives here too: a string constant is appended once and
/// referenced by its offset.
#[derive(Default)]
pub struct DataSegment {
    bytes: Vec<u8>,
}

impl DataSegment {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve zeroed storage and return its offset.
    pub fn alloc(&mut self, size: u32) -> u32 {
        let offset = self.bytes.len() as u32;
        self.bytes.resize(self.bytes.len() + size as usize, 0);
        offset
    }

    /// Append NUL-terminated string data and return its offset.
    pub fn alloc_str(&mut self, value: &str) -> u32 {
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(value.as_bytes());
        self.bytes.push(0);
        offset
    }

    /// Write a folded constant directly into global storage.
    pub fn assign_const(
        &mut self,
        offset: u32,
        kind: TypeKind,
        size: u32,
        value: &ConstValue,
    ) -> Result<(), TypeError> {
        let raw: u64 = match value {
            ConstValue::Int(v) => *v as u64,
            ConstValue::Real(v) => {
                if kind == TypeKind::Real32 {
                    u64::from((*v as f32).to_bits())
                } else {
                    v.to_bits()
                }
            }
            ConstValue::Str(s) => u64::from(self.alloc_str(s)),
            ConstValue::Null => 0,
        };
        let start = offset as usize;
        let end = start + size as usize;
        if end > self.bytes.len() {
            return Err(TypeError("Global initializer out of bounds".into()));
        }
        self.bytes[start..end].copy_from_slice(&raw.to_le_bytes()[..size as usize]);
        Ok(())
    }

    /// Raw view for tests and the module dump.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}
