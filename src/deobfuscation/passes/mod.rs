//! Simplification passes run by the [`Simplifier`](crate::deobfuscation::Simplifier).
//!
//! # Key Components
//!
//! - [`BranchResolver`] - Conditional branches and switches decided inside their own block
//! - [`SwitchResolver`] - Predecessors redirected past a switch they feed a known index
//! - [`ConstantFolder`] - Known loads and pure computations replaced by literals
//! - [`DeadStoreRemover`] - Stores to never-read locals turned into discards
//! - [`DeadCodeRemover`] - Unused side-effect-free producers deleted
//! - [`StoreReloadFixer`] - `stloc; ldloc` of a boolean local turned into `dup; stloc`
//! - [`DupBlockFolder`] - `dup` + branch blocks copied into their predecessors
//! - [`LoopLatchFixer`] - One legacy loop latch idiom, first iteration only

mod branch;
mod constants;
mod deadcode;
mod deadstore;
mod dupblock;
mod looplatch;
mod stloc;
mod switch;

pub use branch::BranchResolver;
pub use constants::ConstantFolder;
pub use deadcode::DeadCodeRemover;
pub use deadstore::DeadStoreRemover;
pub use dupblock::DupBlockFolder;
pub use looplatch::LoopLatchFixer;
pub use stloc::StoreReloadFixer;
pub use switch::SwitchResolver;

use crate::{
    blocks::{BlockId, Blocks},
    deobfuscation::pass::PassContext,
    Result,
};

/// Returns true if `id` can only be entered at method start, with the initial local state.
pub(crate) fn is_method_entry(blocks: &Blocks, id: BlockId) -> bool {
    id == blocks.entry() && blocks.block(id).sources.is_empty()
}

/// Resets the emulator for `id` and runs it over the block's body.
pub(crate) fn emulate_body(blocks: &Blocks, id: BlockId, ctx: &mut PassContext<'_>) -> Result<()> {
    ctx.emulator.initialize(ctx.method, is_method_entry(blocks, id));
    ctx.emulator.emulate_all(blocks.block(id).body())
}
