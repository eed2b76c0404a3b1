//! Folding of `dup` + branch blocks into their predecessors.

use crate::{
    assembly::{FlowType, Instruction, OpCode},
    blocks::{BlockId, Blocks},
    deobfuscation::{
        events::EventKind,
        pass::{BlocksPass, PassContext},
    },
    Result,
};

/// Copies blocks consisting of exactly `dup` and a conditional branch or switch into every
/// predecessor that jumps to them unconditionally.
///
/// The copy lets the predecessor's own value decide the branch. Only runs when the main
/// passes made no progress.
#[derive(Debug, Default)]
pub struct DupBlockFolder;

impl DupBlockFolder {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn is_dup_block(blocks: &Blocks, id: BlockId) -> bool {
        let block = blocks.block(id);
        matches!(block.body(), [dup] if dup.opcode == OpCode::Dup)
            && block
                .terminal()
                .is_some_and(|t| matches!(t.flow_type(), FlowType::ConditionalBranch | FlowType::Switch))
    }

    fn fold(&self, blocks: &mut Blocks, id: BlockId, ctx: &PassContext<'_>) -> Result<bool> {
        let block = blocks.block(id);
        let Some(terminal) = block.terminal().cloned() else {
            return Ok(false);
        };
        let (targets, fallthrough, scope) = (block.targets.clone(), block.fallthrough, block.scope);

        let mut sources = block.sources.clone();
        sources.dedup();
        let mut folded = false;

        for source in sources {
            let predecessor = blocks.block(source);
            if source == id
                || predecessor.scope != scope
                || !predecessor.ends_in_jump()
                || predecessor.sole_successor() != Some(id)
            {
                continue;
            }

            blocks.replace_terminal(
                source,
                vec![Instruction::dup()],
                Some(terminal.clone()),
                targets.clone(),
                fallthrough,
            )?;
            ctx.record(EventKind::DupBlockFolded)
                .at_block(source)
                .pass(self.name())
                .message(format!("copied {id}"));
            folded = true;
        }

        Ok(folded)
    }
}

impl BlocksPass for DupBlockFolder {
    fn name(&self) -> &'static str {
        "dupblock"
    }

    fn description(&self) -> &'static str {
        "Copies dup and branch blocks into their unconditional predecessors"
    }

    fn run(&mut self, blocks: &mut Blocks, ctx: &mut PassContext<'_>) -> Result<bool> {
        let mut changed = false;
        for id in blocks.block_list() {
            if Self::is_dup_block(blocks, id) {
                changed |= self.fold(blocks, id, ctx)?;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{resolver::MetadataStore, typesystem::ElementType},
        test::{context, method_and_blocks},
    };

    #[test]
    fn test_dup_branch_copied_into_predecessors() {
        let store = MetadataStore::new();
        // 0: ldloc 0; 1: brtrue 4; 2: ldc.i4 1; 3: br 5; 4: ldc.i4 0; 5: dup; 6: brtrue 8; 7: ret; 8: ret
        let (method, mut blocks) = method_and_blocks(
            vec![ElementType::I4],
            vec![
                Instruction::ldloc(0),
                Instruction::branch(OpCode::Brtrue, 4),
                Instruction::ldc_i4(1),
                Instruction::br(5),
                Instruction::ldc_i4(0),
                Instruction::dup(),
                Instruction::branch(OpCode::Brtrue, 8),
                Instruction::simple(OpCode::Ret),
                Instruction::simple(OpCode::Ret),
            ],
        );
        let list = blocks.block_list();
        let (left, right, dup) = (list[1], list[2], list[3]);
        let mut ctx = context(&method, &store);

        assert!(DupBlockFolder::new().run(&mut blocks, &mut ctx).unwrap());

        for source in [left, right] {
            let block = blocks.block(source);
            assert_eq!(
                block.instructions[1..],
                [Instruction::dup(), Instruction::branch(OpCode::Brtrue, 8)]
            );
            assert_eq!(block.targets, blocks.block(dup).targets);
            assert_eq!(block.fallthrough, blocks.block(dup).fallthrough);
        }
        assert!(blocks.block(dup).sources.is_empty());
        assert_eq!(ctx.events.count_kind(EventKind::DupBlockFolded), 2);
    }

    #[test]
    fn test_conditional_predecessor_is_skipped() {
        let store = MetadataStore::new();
        // 0: ldloc 0; 1: brtrue 2; 2: dup; 3: brtrue 5; 4: ret; 5: ret
        let (method, mut blocks) = method_and_blocks(
            vec![ElementType::I4],
            vec![
                Instruction::ldloc(0),
                Instruction::branch(OpCode::Brtrue, 2),
                Instruction::dup(),
                Instruction::branch(OpCode::Brtrue, 5),
                Instruction::simple(OpCode::Ret),
                Instruction::simple(OpCode::Ret),
            ],
        );
        let mut ctx = context(&method, &store);

        assert!(!DupBlockFolder::new().run(&mut blocks, &mut ctx).unwrap());
    }
}
