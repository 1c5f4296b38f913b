//! The type table: an arena of block-scoped type descriptors.

use smallvec::SmallVec;
use tarn_common::limits::{MAX_FIELDS, MAX_PARAMS, MAX_TYPE_SPELLING_DEPTH};
use tarn_common::{NameHash, hash_name};
use tarn_lexer::TokenKind;

use crate::kind::TypeKind;

/// Machine pointer size on the target VM, in bytes.
pub const PTR_SIZE: u32 = 8;

/// One stack slot of the target VM, in bytes. Parameters are slot-aligned.
pub const SLOT_SIZE: u32 = 8;

/// Size of the opaque dynamic array handle.
const DYN_ARRAY_SIZE: u32 = 24;

/// Size of the opaque fiber handle.
const FIBER_SIZE: u32 = 8;

/// Index of a type in the [`TypeTable`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

impl TypeId {
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A type-level error, formatted but not yet located.
///
/// The compiler attaches the current source position when it converts one
/// of these into a `Diagnostic`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeError(pub String);

impl std::fmt::Display for TypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for TypeError {}

/// A named field of a struct or interface.
#[derive(Clone, Debug)]
pub struct Field {
    pub name: String,
    pub hash: NameHash,
    pub ty: TypeId,
    pub offset: u32,
}

/// A named parameter of a function signature.
#[derive(Clone, Debug)]
pub struct Param {
    pub name: String,
    pub hash: NameHash,
    pub ty: TypeId,
    pub default_val: i64,
}

/// A function signature.
#[derive(Clone, Debug, Default)]
pub struct Signature {
    pub is_method: bool,
    pub offset_from_self: u32,
    pub params: SmallVec<[Param; 4]>,
    pub num_default_params: u32,
    pub results: SmallVec<[TypeId; 1]>,
}

impl Signature {
    /// Find a parameter by name.
    #[must_use]
    pub fn find_param(&self, name: &str) -> Option<&Param> {
        let hash = hash_name(name);
        self.params
            .iter()
            .find(|p| p.hash == hash && p.name == name)
    }

    /// Append a parameter, rejecting duplicates and overflow.
    pub fn add_param(&mut self, ty: TypeId, name: &str) -> Result<&Param, TypeError> {
        if self.find_param(name).is_some() {
            return Err(TypeError(format!("Duplicate parameter {name}")));
        }
        if self.params.len() >= MAX_PARAMS {
            return Err(TypeError("Too many parameters".into()));
        }
        self.params.push(Param {
            name: name.to_owned(),
            hash: hash_name(name),
            ty,
            default_val: 0,
        });
        Ok(self.params.last().expect("just pushed"))
    }

    /// The declared result type. Signatures always carry exactly one
    /// result slot; a procedure's slot holds `Void`.
    #[must_use]
    pub fn result(&self) -> TypeId {
        self.results[0]
    }
}

/// A type descriptor.
///
/// `base` is the element/pointee type for `Ptr`, `Array` and `DynArray`.
/// `decl_name` is the identifier the type was declared under, if any; it
/// is informational only and never participates in equivalence.
#[derive(Clone, Debug)]
pub struct Type {
    pub kind: TypeKind,
    pub block: u32,
    pub base: Option<TypeId>,
    pub num_items: u32,
    pub weak: bool,
    pub decl_name: Option<String>,
    pub fields: Vec<Field>,
    pub sig: Option<Signature>,
}

impl Type {
    fn new(kind: TypeKind, block: u32) -> Self {
        Type {
            kind,
            block,
            base: None,
            num_items: 0,
            weak: false,
            decl_name: None,
            fields: Vec::new(),
            sig: if kind == TypeKind::Fn {
                Some(Signature::default())
            } else {
                None
            },
        }
    }

    /// Element count for arrays, field count for structs and interfaces.
    #[must_use]
    pub fn num_items(&self) -> u32 {
        match self.kind {
            TypeKind::Struct | TypeKind::Interface => self.fields.len() as u32,
            _ => self.num_items,
        }
    }
}

/// Arena of all types of the module being compiled.
///
/// Append-only within a block; [`TypeTable::free_block`] truncates the
/// tail when the owning block exits (blocks are strictly LIFO, so a dying
/// block's types always form a suffix of the arena).
#[derive(Default)]
pub struct TypeTable {
    types: Vec<Type>,
}

impl TypeTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, id: TypeId) -> &mut Type {
        &mut self.types[id.index()]
    }

    #[inline]
    #[must_use]
    pub fn kind(&self, id: TypeId) -> TypeKind {
        self.get(id).kind
    }

    /// Pointee/element type; panics on kinds that have no base. The
    /// statement compiler only calls this after a kind check.
    #[must_use]
    pub fn base(&self, id: TypeId) -> TypeId {
        self.get(id).base.expect("type has a base")
    }

    // =========================================================================
    // Construction
    // =========================================================================

    /// Append a new descriptor owned by `block`.
    pub fn add(&mut self, block: u32, kind: TypeKind) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(Type::new(kind, block));
        id
    }

    /// Append a pointer type to `base`.
    pub fn add_ptr_to(&mut self, block: u32, base: TypeId) -> TypeId {
        let id = self.add(block, TypeKind::Ptr);
        self.get_mut(id).base = Some(base);
        id
    }

    /// Replace `dst` in place with a deep copy of `src`, field and
    /// parameter arrays included. Used to resolve forward declarations.
    pub fn deep_copy(&mut self, dst: TypeId, src: TypeId) {
        let copy = self.get(src).clone();
        self.types[dst.index()] = copy;
    }

    /// Reclaim every type owned by `block` or by any block nested inside
    /// it. Block numbers increase monotonically, so those types always
    /// form a suffix of the arena.
    pub fn free_block(&mut self, block: u32) {
        while let Some(last) = self.types.last() {
            if last.block < block {
                break;
            }
            self.types.pop();
        }
    }

    /// Ids of unresolved forward declarations carrying this name.
    #[must_use]
    pub fn forward_refs(&self, name: &str) -> Vec<TypeId> {
        self.types
            .iter()
            .enumerate()
            .filter(|(_, ty)| ty.kind == TypeKind::Forward && ty.decl_name.as_deref() == Some(name))
            .map(|(index, _)| TypeId(index as u32))
            .collect()
    }

    // =========================================================================
    // Layout
    // =========================================================================

    fn size_of_raw(&self, id: TypeId) -> Option<u32> {
        let ty = self.get(id);
        match ty.kind {
            TypeKind::Void => Some(0),
            TypeKind::Int8 | TypeKind::UInt8 | TypeKind::Bool | TypeKind::Char => Some(1),
            TypeKind::Int16 | TypeKind::UInt16 => Some(2),
            TypeKind::Int32 | TypeKind::UInt32 | TypeKind::Real32 => Some(4),
            TypeKind::Int | TypeKind::UInt | TypeKind::Real => Some(8),
            TypeKind::Ptr | TypeKind::Str | TypeKind::Fn => Some(PTR_SIZE),
            TypeKind::Array => {
                let base = self.size_of_raw(ty.base?)?;
                Some(ty.num_items * base)
            }
            TypeKind::DynArray => Some(DYN_ARRAY_SIZE),
            TypeKind::Fiber => Some(FIBER_SIZE),
            TypeKind::Struct | TypeKind::Interface => {
                // Fields are laid out tightly in declaration order.
                let mut size = 0;
                for field in &ty.fields {
                    size += self.size_of_raw(field.ty)?;
                }
                Some(size)
            }
            TypeKind::None | TypeKind::Forward | TypeKind::Null => None,
        }
    }

    /// Size of a value of this type in bytes.
    pub fn size_of(&self, id: TypeId) -> Result<u32, TypeError> {
        self.size_of_raw(id)
            .ok_or_else(|| TypeError(format!("Illegal type {}", self.spelling(id))))
    }

    /// Parameter frame size up to and including `index`, slot-aligned.
    pub fn param_size_up_to(&self, sig: &Signature, index: usize) -> Result<u32, TypeError> {
        let mut size = 0;
        for param in sig.params.iter().take(index + 1) {
            size += self.size_of(param.ty)?.div_ceil(SLOT_SIZE) * SLOT_SIZE;
        }
        Ok(size)
    }

    /// Total slot-aligned parameter frame size.
    pub fn param_size_total(&self, sig: &Signature) -> Result<u32, TypeError> {
        if sig.params.is_empty() {
            return Ok(0);
        }
        self.param_size_up_to(sig, sig.params.len() - 1)
    }

    // =========================================================================
    // Classification
    // =========================================================================

    /// True iff values of this type carry a reference count: pointers,
    /// strings, dynamic arrays, interfaces, fibers, and arrays/structs
    /// transitively containing one.
    #[must_use]
    pub fn garbage_collected(&self, id: TypeId) -> bool {
        let ty = self.get(id);
        match ty.kind {
            TypeKind::Ptr
            | TypeKind::Str
            | TypeKind::DynArray
            | TypeKind::Interface
            | TypeKind::Fiber => true,
            TypeKind::Array => ty.base.is_some_and(|base| self.garbage_collected(base)),
            TypeKind::Struct => ty.fields.iter().any(|f| self.garbage_collected(f.ty)),
            _ => false,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_structured(&self, id: TypeId) -> bool {
        self.kind(id).is_structured()
    }

    /// True when reading a value of this type loads it from its storage
    /// cell: every non-structured type, plus `str`, whose value is the
    /// single stored pointer (structured only in its passing
    /// convention). String literals push that pointer directly, so
    /// variable reads must match.
    #[inline]
    #[must_use]
    pub fn loads_value(&self, id: TypeId) -> bool {
        let kind = self.kind(id);
        !kind.is_structured() || kind == TypeKind::Str
    }

    #[inline]
    #[must_use]
    pub fn is_ordinal(&self, id: TypeId) -> bool {
        self.kind(id).is_ordinal()
    }

    // =========================================================================
    // Equivalence and compatibility
    // =========================================================================

    /// Structural equivalence. Named aliases are transparent: `decl_name`
    /// never participates.
    #[must_use]
    pub fn equivalent(&self, left: TypeId, right: TypeId) -> bool {
        if left == right {
            return true;
        }
        let (l, r) = (self.get(left), self.get(right));
        if l.kind != r.kind {
            return false;
        }
        match l.kind {
            TypeKind::Ptr | TypeKind::DynArray => self.base_equivalent(l, r),
            TypeKind::Array => l.num_items == r.num_items && self.base_equivalent(l, r),
            TypeKind::Struct | TypeKind::Interface => {
                if l.fields.len() != r.fields.len() {
                    return false;
                }
                l.fields.iter().zip(&r.fields).all(|(lf, rf)| {
                    lf.hash == rf.hash && lf.name == rf.name && self.equivalent(lf.ty, rf.ty)
                })
            }
            TypeKind::Fn => {
                let (ls, rs) = (
                    l.sig.as_ref().expect("fn type has a signature"),
                    r.sig.as_ref().expect("fn type has a signature"),
                );
                self.sig_equivalent(ls, rs)
            }
            _ => true,
        }
    }

    fn base_equivalent(&self, l: &Type, r: &Type) -> bool {
        match (l.base, r.base) {
            (Some(lb), Some(rb)) => self.equivalent(lb, rb),
            (None, None) => true,
            _ => false,
        }
    }

    fn sig_equivalent(&self, l: &Signature, r: &Signature) -> bool {
        if l.params.len() != r.params.len() || l.is_method != r.is_method {
            return false;
        }
        // Skip the receiver slot of interface methods.
        let start = if l.offset_from_self == 0 { 0 } else { 1 };
        for (lp, rp) in l.params.iter().zip(&r.params).skip(start) {
            if lp.hash != rp.hash || lp.name != rp.name {
                return false;
            }
            if !self.equivalent(lp.ty, rp.ty) {
                return false;
            }
            if lp.default_val != rp.default_val {
                return false;
            }
        }
        l.results.len() == r.results.len()
            && l.results
                .iter()
                .zip(&r.results)
                .all(|(&lt, &rt)| self.equivalent(lt, rt))
    }

    pub fn assert_equivalent(&self, left: TypeId, right: TypeId) -> Result<(), TypeError> {
        if self.equivalent(left, right) {
            Ok(())
        } else {
            Err(self.incompatible(left, right))
        }
    }

    /// Assignment (or, with `symmetric`, comparison) compatibility.
    #[must_use]
    pub fn compatible(&self, left: TypeId, right: TypeId, symmetric: bool) -> bool {
        if self.equivalent(left, right) {
            return true;
        }
        let (lk, rk) = (self.kind(left), self.kind(right));
        if lk.is_integer() && rk.is_integer() {
            return true;
        }
        if lk.is_real() && rk.is_real() {
            return true;
        }
        if lk == TypeKind::Ptr && rk == TypeKind::Ptr {
            let lb = self.kind(self.base(left));
            let rb = self.kind(self.base(right));
            // Any pointer can be assigned to an untyped pointer.
            if lb == TypeKind::Void {
                return true;
            }
            // Any pointer can be compared to an untyped pointer.
            if rb == TypeKind::Void && symmetric {
                return true;
            }
            // Null can be assigned to any pointer.
            if rb == TypeKind::Null {
                return true;
            }
            // Null can be compared to any pointer.
            if lb == TypeKind::Null && symmetric {
                return true;
            }
        }
        false
    }

    pub fn assert_compatible(
        &self,
        left: TypeId,
        right: TypeId,
        symmetric: bool,
    ) -> Result<(), TypeError> {
        if self.compatible(left, right, symmetric) {
            Ok(())
        } else {
            Err(self.incompatible(left, right))
        }
    }

    fn incompatible(&self, left: TypeId, right: TypeId) -> TypeError {
        TypeError(format!(
            "Incompatible types {} and {}",
            self.spelling(left),
            self.spelling(right)
        ))
    }

    // =========================================================================
    // Operator validity
    // =========================================================================

    /// The operator validity table: additive/multiplicative on numerics
    /// (`+` also on `str`), bitwise/modulo/shift on integers, logical on
    /// `bool`, equality on ordinals/reals/pointers/strings, ordering on
    /// ordinals/reals/strings.
    #[must_use]
    pub fn valid_operator(&self, id: TypeId, op: TokenKind) -> bool {
        let kind = self.kind(id);
        let numeric = kind.is_integer() || kind.is_real();
        match op {
            TokenKind::Plus | TokenKind::PlusEq => numeric || kind == TypeKind::Str,
            TokenKind::Minus
            | TokenKind::Mul
            | TokenKind::Div
            | TokenKind::MinusEq
            | TokenKind::MulEq
            | TokenKind::DivEq => numeric,
            TokenKind::Mod
            | TokenKind::And
            | TokenKind::Or
            | TokenKind::Xor
            | TokenKind::Shl
            | TokenKind::Shr
            | TokenKind::ModEq
            | TokenKind::AndEq
            | TokenKind::OrEq
            | TokenKind::XorEq
            | TokenKind::ShlEq
            | TokenKind::ShrEq
            | TokenKind::PlusPlus
            | TokenKind::MinusMinus => kind.is_integer(),
            TokenKind::AndAnd | TokenKind::OrOr | TokenKind::Not => kind == TypeKind::Bool,
            TokenKind::EqEq | TokenKind::NotEq => {
                kind.is_ordinal()
                    || kind.is_real()
                    || kind == TypeKind::Ptr
                    || kind == TypeKind::Str
            }
            TokenKind::Less | TokenKind::LessEq | TokenKind::Greater | TokenKind::GreaterEq => {
                kind.is_ordinal() || kind.is_real() || kind == TypeKind::Str
            }
            TokenKind::Eq => true,
            _ => false,
        }
    }

    pub fn assert_valid_operator(&self, id: TypeId, op: TokenKind) -> Result<(), TypeError> {
        if self.valid_operator(id, op) {
            Ok(())
        } else {
            Err(TypeError(format!(
                "Operator {op} is not applicable to {}",
                self.spelling(id)
            )))
        }
    }

    // =========================================================================
    // Fields
    // =========================================================================

    /// Find a field of a struct or interface by name.
    #[must_use]
    pub fn find_field(&self, struct_id: TypeId, name: &str) -> Option<&Field> {
        let ty = self.get(struct_id);
        if !matches!(ty.kind, TypeKind::Struct | TypeKind::Interface) {
            return None;
        }
        let hash = hash_name(name);
        ty.fields.iter().find(|f| f.hash == hash && f.name == name)
    }

    pub fn assert_find_field(&self, struct_id: TypeId, name: &str) -> Result<&Field, TypeError> {
        self.find_field(struct_id, name)
            .ok_or_else(|| TypeError(format!("Unknown field {name}")))
    }

    /// Append a field; the offset is the tight sum of the preceding
    /// field sizes.
    pub fn add_field(
        &mut self,
        struct_id: TypeId,
        field_ty: TypeId,
        name: &str,
    ) -> Result<(), TypeError> {
        if self.find_field(struct_id, name).is_some() {
            return Err(TypeError(format!("Duplicate field {name}")));
        }
        match self.kind(field_ty) {
            TypeKind::Forward => {
                return Err(TypeError(format!(
                    "Unresolved forward type declaration for field {name}"
                )));
            }
            TypeKind::Void => {
                return Err(TypeError(format!("Void field {name} is not allowed")));
            }
            _ => {}
        }
        if self.get(struct_id).fields.len() >= MAX_FIELDS {
            return Err(TypeError("Too many fields".into()));
        }
        let offset = self.size_of(struct_id)?;
        self.get_mut(struct_id).fields.push(Field {
            name: name.to_owned(),
            hash: hash_name(name),
            ty: field_ty,
            offset,
        });
        Ok(())
    }

    // =========================================================================
    // Forward declarations
    // =========================================================================

    /// Every `Forward` type must be resolved before compilation completes.
    pub fn assert_forwards_resolved(&self) -> Result<(), TypeError> {
        for ty in &self.types {
            if ty.kind == TypeKind::Forward {
                let name = ty.decl_name.as_deref().unwrap_or("type");
                return Err(TypeError(format!(
                    "Unresolved forward declaration of {name}"
                )));
            }
        }
        Ok(())
    }

    // =========================================================================
    // Spelling
    // =========================================================================

    /// Render a type for a diagnostic. Named types print their name;
    /// recursion is depth-capped.
    #[must_use]
    pub fn spelling(&self, id: TypeId) -> String {
        self.spelling_recursive(id, MAX_TYPE_SPELLING_DEPTH)
    }

    fn spelling_recursive(&self, id: TypeId, depth: usize) -> String {
        let ty = self.get(id);
        if let Some(name) = &ty.decl_name {
            return name.clone();
        }
        let mut buf = match ty.kind {
            TypeKind::Array => format!("[{}]", ty.num_items),
            kind => kind.spelling().to_owned(),
        };
        if matches!(ty.kind, TypeKind::Ptr | TypeKind::Array | TypeKind::DynArray) {
            if let Some(base) = ty.base {
                if depth > 0 {
                    buf.push_str(&self.spelling_recursive(base, depth - 1));
                } else {
                    buf.push_str("...");
                }
            }
        }
        buf
    }
}
