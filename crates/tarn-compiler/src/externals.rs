//! The external symbol registry.
//!
//! Consulted at end of module: every function prototype that never
//! received a body must match an external by name, and gets a trampoline
//! emitted around its entry.

use rustc_hash::FxHashMap;

/// A host routine callable from bytecode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct External {
    pub name: String,
    pub entry: usize,
}

/// Name-indexed set of externals.
#[derive(Default)]
pub struct Externals {
    map: FxHashMap<String, External>,
}

impl Externals {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an external under `name`.
    pub fn add(&mut self, name: &str, entry: usize) {
        self.map.insert(
            name.to_owned(),
            External {
                name: name.to_owned(),
                entry,
            },
        );
    }

    /// The external with this name, if registered.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&External> {
        self.map.get(name)
    }
}
