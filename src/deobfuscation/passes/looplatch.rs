//! Fixup of a loop latch idiom left by older protectors.
//!
//! The latch keeps a counter `x` on the stack across iterations and tests it against itself:
//!
//! ```text
//! dup
//! dup
//! ldc.i4 k
//! add            ; or sub
//! blt target     ; or bgt
//! ```
//!
//! The comparison is `x < x + k` (or a variant), which ignoring overflow only depends on the
//! sign of `k`. The taken successor discards the counter with a leading `pop`. Net of the
//! branch the sequence leaves the stack as it found it, so it is replaced by a `br` to the
//! successor the sign selects.

use crate::{
    assembly::{Instruction, OpCode},
    blocks::{BlockId, Blocks},
    deobfuscation::{
        events::EventKind,
        pass::{BlocksPass, PassContext},
    },
    Result,
};

/// Resolves the self-comparing loop latch on the first driver iteration.
#[derive(Debug, Default)]
pub struct LoopLatchFixer;

impl LoopLatchFixer {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Successor chosen by the latch of `id`, if the block ends in one.
    fn latch_destination(blocks: &Blocks, id: BlockId) -> Option<BlockId> {
        let block = blocks.block(id);
        let terminal = block.terminal()?;
        let body = block.body();
        let [.., first, second, constant, op] = body else {
            return None;
        };
        if first.opcode != OpCode::Dup || second.opcode != OpCode::Dup {
            return None;
        }
        let k = constant.get_ldc_i32()?;

        let taken = match (op.opcode, terminal.opcode) {
            (OpCode::Add, OpCode::Blt) | (OpCode::Sub, OpCode::Bgt) => k > 0,
            (OpCode::Add, OpCode::Bgt) | (OpCode::Sub, OpCode::Blt) => k < 0,
            _ => return None,
        };
        let destination = if taken {
            block.targets.first().copied()
        } else {
            block.fallthrough
        }?;

        let starts_with_pop = blocks
            .block(destination)
            .instructions
            .first()
            .is_some_and(|i| i.opcode == OpCode::Pop);
        starts_with_pop.then_some(destination)
    }
}

impl BlocksPass for LoopLatchFixer {
    fn name(&self) -> &'static str {
        "looplatch"
    }

    fn description(&self) -> &'static str {
        "Resolves self-comparing loop latches by the sign of their step"
    }

    fn should_run(&self, ctx: &PassContext<'_>) -> bool {
        ctx.iteration == 0
    }

    fn run(&mut self, blocks: &mut Blocks, ctx: &mut PassContext<'_>) -> Result<bool> {
        let mut changed = false;

        for id in blocks.block_list() {
            let Some(destination) = Self::latch_destination(blocks, id) else {
                continue;
            };

            let block = blocks.block(id);
            let mut code = block.body()[..block.body().len() - 4].to_vec();
            code.extend(block.terminal().cloned());
            blocks.set_instructions(id, code)?;
            blocks.replace_terminal(id, Vec::new(), Some(Instruction::br(0)), vec![destination], None)?;

            ctx.record(EventKind::LoopLatchFixed)
                .at_block(id)
                .pass(self.name())
                .message(format!("latch continues at {destination}"));
            changed = true;
        }

        Ok(changed)
    }
}
