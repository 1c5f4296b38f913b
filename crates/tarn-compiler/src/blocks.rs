//! The lexical block stack.
//!
//! Every `{...}`, every function body, and the implicit `if`/`switch`/
//! `for` headers push a block. Each block receives a fresh, globally
//! unique number; block 0 is the module's global scope and lives for the
//! whole compilation.

use tarn_common::limits::MAX_BLOCK_NESTING;
use tarn_types::TypeError;

use crate::idents::IdentId;

/// One lexical scope.
#[derive(Clone, Copy, Debug)]
pub struct Block {
    /// Globally unique, monotonically increasing block number.
    pub block: u32,
    /// The function whose body this block belongs to, if it is one.
    pub fn_ident: Option<IdentId>,
    /// Accumulated size of locals declared in this function, in bytes.
    /// Only meaningful on function blocks.
    pub local_var_size: u32,
    /// Whether a `return` statement was seen directly in this block.
    pub has_return: bool,
}

/// Stack of lexical blocks.
pub struct Blocks {
    items: Vec<Block>,
    num_blocks: u32,
}

impl Blocks {
    /// A fresh stack holding the global scope (block 0).
    #[must_use]
    pub fn new() -> Self {
        Blocks {
            items: vec![Block {
                block: 0,
                fn_ident: None,
                local_var_size: 0,
                has_return: false,
            }],
            num_blocks: 0,
        }
    }

    /// Enter a block, optionally tied to a function ident.
    pub fn enter(&mut self, fn_ident: Option<IdentId>) -> Result<(), TypeError> {
        if self.items.len() >= MAX_BLOCK_NESTING {
            return Err(TypeError("Block nesting is too deep".into()));
        }
        self.num_blocks += 1;
        self.items.push(Block {
            block: self.num_blocks,
            fn_ident,
            local_var_size: 0,
            has_return: false,
        });
        Ok(())
    }

    /// Leave the top block. The global scope is never popped.
    pub fn leave(&mut self) {
        debug_assert!(self.items.len() > 1, "cannot leave the global scope");
        self.items.pop();
    }

    /// Number of the top block.
    #[inline]
    #[must_use]
    pub fn current(&self) -> u32 {
        self.top().block
    }

    #[must_use]
    pub fn top(&self) -> &Block {
        self.items.last().expect("block stack is never empty")
    }

    pub fn top_mut(&mut self) -> &mut Block {
        self.items.last_mut().expect("block stack is never empty")
    }

    /// Blocks from innermost to outermost.
    pub fn iter_innermost_first(&self) -> impl Iterator<Item = &Block> {
        self.items.iter().rev()
    }

    /// The function whose body encloses the current position, if any.
    #[must_use]
    pub fn enclosing_fn(&self) -> Option<IdentId> {
        self.items.iter().rev().find_map(|b| b.fn_ident)
    }

    /// Reserve `size` bytes in the enclosing function's frame and return
    /// the new local's (negative) frame offset.
    ///
    /// Panics when called outside a function body; global variables are
    /// allocated in the data segment instead.
    pub fn alloc_local(&mut self, size: u32) -> i32 {
        let fn_block = self
            .items
            .iter_mut()
            .rev()
            .find(|b| b.fn_ident.is_some())
            .expect("local allocation outside a function body");
        fn_block.local_var_size += size;
        -(fn_block.local_var_size as i64) as i32
    }
}

impl Default for Blocks {
    fn default() -> Self {
        Self::new()
    }
}
