//! The identifier table.
//!
//! An append-ordered list of named entities. Lookup walks from newest to
//! oldest so inner scopes shadow outer scopes. Blocks are strictly LIFO,
//! so a dying block's idents always form a suffix of the list and
//! [`Idents::free_block`] truncates it. Prototype idents live in block 0
//! and therefore survive until end-of-module resolution.

use tarn_common::{NameHash, hash_name};
use tarn_types::{TypeError, TypeId};

use crate::consts::ConstValue;

/// What an identifier names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentKind {
    Const,
    Var,
    Type,
    Fn,
    Module,
}

/// Where the named entity lives.
#[derive(Clone, Debug, PartialEq)]
pub enum Storage {
    /// Types have no storage.
    None,
    /// Frame offset of a local variable (negative, below the frame).
    Local(i32),
    /// Data segment offset of a global variable.
    Global(u32),
    /// Code offset of a function entry (or of its prototype placeholder).
    Code(usize),
    /// Compile-time value of a constant.
    Constant(ConstValue),
    /// A builtin routine dispatched by opcode.
    Builtin(tarn_bytecode::Builtin),
}

/// A named entity: variable, constant, type, or function.
#[derive(Clone, Debug)]
pub struct Ident {
    pub kind: IdentKind,
    pub name: String,
    pub hash: NameHash,
    pub ty: TypeId,
    pub block: u32,
    pub storage: Storage,
    pub exported: bool,
    /// Code offset of the placeholder entry of a forward-declared
    /// function awaiting its body or external resolution.
    pub prototype_offset: Option<usize>,
}

/// Index of an ident in the table. Stable for as long as the ident's
/// owning block is alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdentId(u32);

impl IdentId {
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// The identifier table of the module being compiled.
#[derive(Default)]
pub struct Idents {
    list: Vec<Ident>,
}

impl Idents {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn get(&self, id: IdentId) -> &Ident {
        &self.list[id.index()]
    }

    pub fn get_mut(&mut self, id: IdentId) -> &mut Ident {
        &mut self.list[id.index()]
    }

    /// Find the innermost visible ident with this name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<IdentId> {
        let hash = hash_name(name);
        self.list
            .iter()
            .enumerate()
            .rev()
            .find(|(_, ident)| ident.hash == hash && ident.name == name)
            .map(|(index, _)| IdentId(index as u32))
    }

    pub fn assert_find(&self, name: &str) -> Result<IdentId, TypeError> {
        self.find(name)
            .ok_or_else(|| TypeError(format!("Unknown identifier {name}")))
    }

    /// Append an ident, rejecting duplicates within the same block.
    pub fn add(
        &mut self,
        kind: IdentKind,
        name: &str,
        ty: TypeId,
        block: u32,
        storage: Storage,
        exported: bool,
    ) -> Result<IdentId, TypeError> {
        let hash = hash_name(name);
        let duplicate = self
            .list
            .iter()
            .any(|i| i.block == block && i.hash == hash && i.name == name);
        if duplicate {
            return Err(TypeError(format!("Duplicate identifier {name}")));
        }
        self.list.push(Ident {
            kind,
            name: name.to_owned(),
            hash,
            ty,
            block,
            storage,
            exported,
            prototype_offset: None,
        });
        Ok(IdentId((self.list.len() - 1) as u32))
    }

    /// Remove every ident owned by `block` (always the list tail).
    pub fn free_block(&mut self, block: u32) {
        while let Some(last) = self.list.last() {
            if last.block != block {
                break;
            }
            self.list.pop();
        }
    }

    /// All ident ids, oldest first.
    #[must_use]
    pub fn ids(&self) -> Vec<IdentId> {
        (0..self.list.len() as u32).map(IdentId).collect()
    }
}
