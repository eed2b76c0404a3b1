//! Removal of stores to locals that are never read.

use std::collections::{BTreeSet, HashSet};

use crate::{
    assembly::{Instruction, OpCode},
    blocks::Blocks,
    deobfuscation::{
        events::EventKind,
        pass::{BlocksPass, PassContext},
    },
    Result,
};

/// Turns every `stloc` of a local that no live block reads or takes the address of into a
/// `pop`.
///
/// The value being stored is still computed; the `pop` is left for the
/// [`DeadCodeRemover`](crate::deobfuscation::passes::DeadCodeRemover).
#[derive(Debug, Default)]
pub struct DeadStoreRemover;

impl DeadStoreRemover {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Locals stored at least once and never loaded.
    fn dead_locals(blocks: &Blocks) -> BTreeSet<u16> {
        let mut stored = BTreeSet::new();
        let mut read = HashSet::new();

        for id in blocks.block_list() {
            for instruction in &blocks.block(id).instructions {
                let Some(local) = instruction.local_index() else {
                    continue;
                };
                if instruction.opcode == OpCode::Stloc {
                    stored.insert(local);
                } else {
                    read.insert(local);
                }
            }
        }

        stored.retain(|local| !read.contains(local));
        stored
    }
}

impl BlocksPass for DeadStoreRemover {
    fn name(&self) -> &'static str {
        "deadstore"
    }

    fn description(&self) -> &'static str {
        "Replaces stores to never-read locals with pops"
    }

    fn run(&mut self, blocks: &mut Blocks, ctx: &mut PassContext<'_>) -> Result<bool> {
        let dead = Self::dead_locals(blocks);
        if dead.is_empty() {
            return Ok(false);
        }

        let mut changed = false;
        for id in blocks.block_list() {
            let block = blocks.block(id);
            let is_dead_store = |instruction: &Instruction| {
                instruction.opcode == OpCode::Stloc && instruction.local_index().is_some_and(|l| dead.contains(&l))
            };
            let removed = block.instructions.iter().filter(|i| is_dead_store(i)).count();
            if removed == 0 {
                continue;
            }

            let code = block
                .instructions
                .iter()
                .map(|i| if is_dead_store(i) { Instruction::pop() } else { i.clone() })
                .collect();
            blocks.set_instructions(id, code)?;
            ctx.record(EventKind::StoreRemoved)
                .at_block(id)
                .pass(self.name())
                .message(format!("{removed} store(s) to unread locals"));
            changed = true;
        }

        Ok(changed)
    }
}
