//! Structural cleanup shared by all passes: unreachable block removal and straight-line
//! block merging.

use std::collections::HashSet;

use crate::blocks::{BlockId, Blocks};

impl Blocks {
    /// Deletes every block that cannot be reached from the entry.
    ///
    /// Handler and filter heads count as reachable as soon as any block of their protected
    /// region is reachable. Returns the number of removed blocks.
    pub fn remove_dead_blocks(&mut self) -> usize {
        let mut reachable = HashSet::new();
        let mut worklist = vec![self.entry];

        loop {
            while let Some(id) = worklist.pop() {
                if reachable.insert(id) {
                    worklist.extend(self.blocks[id.0].successors());
                }
            }

            for region in &self.handlers {
                let protected = reachable
                    .iter()
                    .any(|id: &BlockId| self.scope_within(self.blocks[id.0].scope, region.try_scope));
                if !protected {
                    continue;
                }
                let heads = [Some(region.handler_scope), region.filter_scope]
                    .into_iter()
                    .flatten()
                    .filter_map(|scope| self.scopes[scope.0].head);
                worklist.extend(heads.filter(|head| !reachable.contains(head)));
            }

            if worklist.is_empty() {
                break;
            }
        }

        let dead: Vec<BlockId> = self
            .order
            .iter()
            .copied()
            .filter(|id| !reachable.contains(id))
            .collect();

        for id in &dead {
            self.unlink_all(*id);
        }
        for id in &dead {
            self.remove_from_order(*id);
            for scope in &mut self.scopes {
                if scope.head == Some(*id) {
                    scope.head = None;
                }
            }
        }

        dead.len()
    }

    /// Merges every block into its predecessor where that is the only way in.
    ///
    /// A block is merged when its predecessor jumps to it unconditionally, it has no other
    /// incoming edge, both live in the same scope and it is not a scope head. Returns the
    /// number of merged blocks.
    pub fn merge_blocks(&mut self) -> usize {
        let mut merged = 0;
        let mut changed = true;

        while changed {
            changed = false;
            for id in self.block_list() {
                if self.blocks[id.0].removed {
                    continue;
                }
                let Some(successor) = self.mergeable_successor(id) else {
                    continue;
                };
                if self.merge_into(successor, id).is_ok() {
                    log::trace!("merged {} into {}", successor, id);
                    merged += 1;
                    changed = true;
                }
            }
        }

        merged
    }

    fn mergeable_successor(&self, id: BlockId) -> Option<BlockId> {
        let block = &self.blocks[id.0];
        if !block.ends_in_jump() {
            return None;
        }
        let successor = block.sole_successor()?;
        let next = &self.blocks[successor.0];
        let only_source = next.sources.iter().all(|source| *source == id) && next.sources.len() == 1;

        (successor != id && only_source && next.scope == block.scope && !self.is_scope_head(successor))
            .then_some(successor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{Instruction, OpCode},
        metadata::{
            method::{ExceptionHandler, HandlerKind, MethodBody},
            token::Token,
        },
    };

    #[test]
    fn test_remove_dead_blocks() {
        // 0: br 2; 1: nop; 2: ret
        let mut blocks = Blocks::from_body(&MethodBody::new(vec![
            Instruction::br(2),
            Instruction::simple(OpCode::Nop),
            Instruction::simple(OpCode::Ret),
        ]))
        .unwrap();

        let dead = blocks.block_list()[1];
        assert_eq!(blocks.remove_dead_blocks(), 1);
        assert!(blocks.block(dead).is_removed());
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks.remove_dead_blocks(), 0);
    }

    #[test]
    fn test_dead_blocks_keep_sources_consistent() {
        // 0: br 3; 1: nop; 2: br 3; 3: ret
        let mut blocks = Blocks::from_body(&MethodBody::new(vec![
            Instruction::br(3),
            Instruction::simple(OpCode::Nop),
            Instruction::br(3),
            Instruction::simple(OpCode::Ret),
        ]))
        .unwrap();

        let exit = *blocks.block_list().last().unwrap();
        assert_eq!(blocks.block(exit).sources.len(), 2);
        assert_eq!(blocks.remove_dead_blocks(), 1);
        assert_eq!(blocks.block(exit).sources, vec![blocks.entry()]);
    }

    #[test]
    fn test_handlers_of_reachable_try_survive() {
        // 0: nop; 1: leave 4 | 2: pop; 3: leave 4 | 4: ret
        let mut blocks = Blocks::from_body(
            &MethodBody::new(vec![
                Instruction::simple(OpCode::Nop),
                Instruction::branch(OpCode::Leave, 4),
                Instruction::pop(),
                Instruction::branch(OpCode::Leave, 4),
                Instruction::simple(OpCode::Ret),
            ])
            .with_handler(ExceptionHandler {
                kind: HandlerKind::Catch(Token::new(0x0100_0001)),
                try_start: 0,
                try_end: 2,
                handler_start: 2,
                handler_end: 4,
            }),
        )
        .unwrap();

        assert_eq!(blocks.remove_dead_blocks(), 0);
        assert_eq!(blocks.len(), 3);
    }

    #[test]
    fn test_merge_chain() {
        // 0: nop; 1: br 2; 2: nop; 3: br 4; 4: ret
        let mut blocks = Blocks::from_body(&MethodBody::new(vec![
            Instruction::simple(OpCode::Nop),
            Instruction::br(2),
            Instruction::simple(OpCode::Nop),
            Instruction::br(4),
            Instruction::simple(OpCode::Ret),
        ]))
        .unwrap();

        assert_eq!(blocks.merge_blocks(), 2);
        assert_eq!(blocks.len(), 1);
        let entry = blocks.block(blocks.entry());
        assert_eq!(
            entry.instructions,
            vec![
                Instruction::simple(OpCode::Nop),
                Instruction::simple(OpCode::Nop),
                Instruction::simple(OpCode::Ret),
            ]
        );
    }

    #[test]
    fn test_no_merge_with_second_source() {
        // 0: ldloc 0; 1: brtrue 3; 2: nop; 3: ret
        let mut blocks = Blocks::from_body(&MethodBody::new(vec![
            Instruction::ldloc(0),
            Instruction::branch(OpCode::Brtrue, 3),
            Instruction::simple(OpCode::Nop),
            Instruction::simple(OpCode::Ret),
        ]))
        .unwrap();

        assert_eq!(blocks.merge_blocks(), 0);
        assert_eq!(blocks.len(), 3);
    }
}
