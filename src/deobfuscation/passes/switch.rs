//! Resolution of switches from the index their predecessors feed them.
//!
//! Flattened control flow routes every block through one dispatcher switch whose index is
//! set by the block that jumps to it. Emulating a predecessor followed by the dispatcher's
//! prefix yields the index for that edge, so the predecessor can jump straight to the case
//! it selects.
//!
//! Three dispatcher shapes are recognized:
//!
//! - **Top of stack**: `switch` alone, the index is pushed by the predecessor
//! - **Local**: `ldloc k; switch`
//! - **Stored local**: `stloc k; ldloc k; switch`, the predecessor pushes the index and the
//!   dispatcher keeps a copy in `k`
//!
//! A redirected predecessor keeps the dispatcher's side effects: it discards the index it
//! pushed, or stores it to `k` for the stored-local shape. Conditional predecessors get one
//! synthesized block per edge into the dispatcher, so each outcome jumps to its own case.

use log::debug;

use crate::{
    assembly::{FlowType, Instruction, OpCode},
    blocks::{BlockId, Blocks},
    deobfuscation::{
        events::EventKind,
        pass::{BlocksPass, PassContext},
        passes::is_method_entry,
    },
    emulation::{switch_target, Int32Value, Value},
    Result,
};

/// How the dispatcher obtains its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Tos,
    Ldloc(u16),
    StLdloc(u16),
}

impl Shape {
    fn of(block: &[Instruction]) -> Option<Self> {
        match block {
            [] => Some(Shape::Tos),
            [load] => load.local_index().filter(|_| load.opcode == OpCode::Ldloc).map(Shape::Ldloc),
            [store, load] if store.opcode == OpCode::Stloc && load.opcode == OpCode::Ldloc => {
                let local = store.local_index()?;
                (load.local_index() == Some(local)).then_some(Shape::StLdloc(local))
            }
            _ => None,
        }
    }

    /// Instructions standing in for the dispatcher prefix in a redirected predecessor.
    fn fixup(self) -> Vec<Instruction> {
        match self {
            Shape::Tos => vec![Instruction::pop()],
            Shape::Ldloc(_) => Vec::new(),
            Shape::StLdloc(local) => vec![Instruction::stloc(local)],
        }
    }
}

/// A predecessor edge that can bypass the dispatcher.
struct Redirect {
    source: BlockId,
    destination: BlockId,
    index: i32,
}

/// Redirects predecessors of a switch straight to the case their index selects.
#[derive(Debug, Default)]
pub struct SwitchResolver;

impl SwitchResolver {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Emulates `source` and the dispatcher prefix, returning the known index.
    fn index_from(
        blocks: &Blocks,
        source: BlockId,
        switch: BlockId,
        ctx: &mut PassContext<'_>,
    ) -> Result<Option<i32>> {
        let block = blocks.block(source);
        ctx.emulator.initialize(ctx.method, is_method_entry(blocks, source));
        ctx.emulator.emulate_all(block.body())?;

        if let Some(terminal) = block.terminal() {
            if terminal.is_conditional_branch() {
                let pops = if matches!(terminal.opcode, OpCode::Brtrue | OpCode::Brfalse) {
                    1
                } else {
                    2
                };
                for _ in 0..pops {
                    ctx.emulator.pop();
                }
            }
        }

        ctx.emulator.emulate_all(blocks.block(switch).body())?;
        Ok(match ctx.emulator.pop() {
            Value::Int32(index) => index.known_value(),
            _ => None,
        })
    }

    /// Returns true if `source` enters `switch` only through unconditional edges.
    fn jumps_to(blocks: &Blocks, source: BlockId, switch: BlockId) -> bool {
        let block = blocks.block(source);
        block.ends_in_jump() && block.sole_successor() == Some(switch)
    }

    /// Returns true if `source` ends in a conditional branch with an edge into `switch`.
    fn branches_to(blocks: &Blocks, source: BlockId, switch: BlockId) -> bool {
        let block = blocks.block(source);
        block.terminal().map(Instruction::flow_type) == Some(FlowType::ConditionalBranch)
            && block.successors().any(|s| s == switch)
    }

    fn resolve_switch(&self, blocks: &mut Blocks, switch: BlockId, ctx: &mut PassContext<'_>) -> Result<bool> {
        let block = blocks.block(switch);
        let Some(terminal) = block.terminal() else {
            return Ok(false);
        };
        if terminal.flow_type() != FlowType::Switch {
            return Ok(false);
        }
        let Some(shape) = Shape::of(block.body()) else {
            return Ok(false);
        };

        let scope = block.scope;
        let case_targets = block.targets.clone();
        let fallthrough = block.fallthrough;
        let switch_instruction = terminal.clone();

        let mut sources = block.sources.clone();
        sources.dedup();

        let mut unconditional = Vec::new();
        let mut conditional = Vec::new();
        let mut unresolved = 0;

        for source in sources {
            let eligible = source != switch && blocks.block(source).scope == scope;
            let jumps = eligible && Self::jumps_to(blocks, source, switch);
            let branches = eligible && !jumps && Self::branches_to(blocks, source, switch);
            if !jumps && !branches {
                unresolved += 1;
                continue;
            }

            let index = match Self::index_from(blocks, source, switch, ctx) {
                Ok(index) => index,
                Err(e) => {
                    debug!("switch: skipping {} -> {} of {}: {}", source, switch, ctx.method.name, e);
                    None
                }
            };
            let destination = index.and_then(|index| {
                match switch_target(case_targets.len(), &Int32Value::new(index))? {
                    Some(case) => case_targets.get(case).copied(),
                    None => fallthrough,
                }
            });

            match (index, destination) {
                (Some(index), Some(destination)) if jumps => unconditional.push(Redirect {
                    source,
                    destination,
                    index,
                }),
                (Some(index), Some(destination)) => conditional.push(Redirect {
                    source,
                    destination,
                    index,
                }),
                _ => unresolved += 1,
            }
        }

        if unconditional.is_empty() && conditional.is_empty() {
            return Ok(false);
        }

        // A prefix-free dispatcher fed a known index by every predecessor is copied into them
        if shape == Shape::Tos && unresolved == 0 && conditional.is_empty() {
            for redirect in &unconditional {
                blocks.replace_terminal(
                    redirect.source,
                    Vec::new(),
                    Some(switch_instruction.clone()),
                    case_targets.clone(),
                    fallthrough,
                )?;
                ctx.record(EventKind::SwitchMerged)
                    .at_block(redirect.source)
                    .pass(self.name())
                    .message(format!("switch {} merged with index {}", switch, redirect.index));
            }
            return Ok(true);
        }

        for redirect in &unconditional {
            blocks.replace_terminal(
                redirect.source,
                shape.fixup(),
                Some(Instruction::br(0)),
                vec![redirect.destination],
                None,
            )?;
            ctx.record(EventKind::SwitchResolved)
                .at_block(redirect.source)
                .pass(self.name())
                .message(format!("index {} selects {}", redirect.index, redirect.destination));
        }

        for redirect in &conditional {
            let mut code = shape.fixup();
            code.push(Instruction::br(0));
            let edge = blocks.add_block(redirect.source, code, vec![redirect.destination], None)?;
            blocks.retarget(redirect.source, switch, edge)?;
            ctx.record(EventKind::SwitchResolved)
                .at_block(redirect.source)
                .pass(self.name())
                .message(format!(
                    "index {} selects {} through {}",
                    redirect.index, redirect.destination, edge
                ));
        }

        Ok(true)
    }
}

impl BlocksPass for SwitchResolver {
    fn name(&self) -> &'static str {
        "switch"
    }

    fn description(&self) -> &'static str {
        "Redirects predecessors of a switch dispatcher to the case their index selects"
    }

    fn run(&mut self, blocks: &mut Blocks, ctx: &mut PassContext<'_>) -> Result<bool> {
        let mut changed = false;
        for id in blocks.block_list() {
            if blocks.get(id).is_some() {
                changed |= self.resolve_switch(blocks, id, ctx)?;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::typesystem::ElementType,
        metadata::resolver::MetadataStore,
        test::{context, method_and_blocks},
    };

    /// Two predecessors store distinct indices into local 0 and jump to `ldloc 0; switch`.
    ///
    /// ```text
    /// 0: ldloc 1
    /// 1: brtrue 5
    /// 2: ldc.i4 0
    /// 3: stloc 0
    /// 4: br 7
    /// 5: ldc.i4 1
    /// 6: stloc 0
    /// 7: ldloc 0
    /// 8: switch (10, 11)
    /// 9: ret
    /// 10: ret
    /// 11: ret
    /// ```
    fn dispatcher() -> Vec<Instruction> {
        vec![
            Instruction::ldloc(1),
            Instruction::branch(OpCode::Brtrue, 5),
            Instruction::ldc_i4(0),
            Instruction::stloc(0),
            Instruction::br(7),
            Instruction::ldc_i4(1),
            Instruction::stloc(0),
            Instruction::ldloc(0),
            Instruction::switch(vec![10, 11]),
            Instruction::simple(OpCode::Ret),
            Instruction::simple(OpCode::Ret),
            Instruction::simple(OpCode::Ret),
        ]
    }

    #[test]
    fn test_shapes() {
        assert_eq!(Shape::of(&[]), Some(Shape::Tos));
        assert_eq!(Shape::of(&[Instruction::ldloc(2)]), Some(Shape::Ldloc(2)));
        assert_eq!(
            Shape::of(&[Instruction::stloc(2), Instruction::ldloc(2)]),
            Some(Shape::StLdloc(2))
        );
        assert_eq!(Shape::of(&[Instruction::stloc(2), Instruction::ldloc(3)]), None);
        assert_eq!(Shape::of(&[Instruction::ldc_i4(2)]), None);
    }

    #[test]
    fn test_predecessors_bypass_ldloc_switch() {
        let store = MetadataStore::new();
        let (method, mut blocks) = method_and_blocks(vec![ElementType::I4, ElementType::I4], dispatcher());
        let list = blocks.block_list();
        // B0 cond, B1 index 0, B2 index 1 (falls into the switch), B3 switch, B4/B5/B6 ret
        let (zero, one, switch) = (list[1], list[2], list[3]);
        let (case0, case1) = (list[5], list[6]);
        let mut ctx = context(&method, &store);

        assert!(SwitchResolver::new().run(&mut blocks, &mut ctx).unwrap());

        assert_eq!(blocks.block(zero).targets, vec![case0]);
        assert_eq!(blocks.block(one).targets, vec![case1]);
        assert_eq!(blocks.block(one).fallthrough, None);
        assert!(blocks.block(switch).sources.is_empty());
        assert_eq!(ctx.events.count_kind(EventKind::SwitchResolved), 2);
    }

    #[test]
    fn test_tos_switch_is_merged_into_predecessors() {
        let store = MetadataStore::new();
        // 0: ldloc 0; 1: brtrue 4; 2: ldc.i4 1; 3: br 5; 4: ldc.i4 0; 5: switch (7, 8); 6: ret; 7: ret; 8: ret
        let (method, mut blocks) = method_and_blocks(
            vec![ElementType::I4],
            vec![
                Instruction::ldloc(0),
                Instruction::branch(OpCode::Brtrue, 4),
                Instruction::ldc_i4(1),
                Instruction::br(5),
                Instruction::ldc_i4(0),
                Instruction::switch(vec![7, 8]),
                Instruction::simple(OpCode::Ret),
                Instruction::simple(OpCode::Ret),
                Instruction::simple(OpCode::Ret),
            ],
        );
        let list = blocks.block_list();
        let (left, right, switch) = (list[1], list[2], list[3]);
        let mut ctx = context(&method, &store);

        assert!(SwitchResolver::new().run(&mut blocks, &mut ctx).unwrap());

        for source in [left, right] {
            let block = blocks.block(source);
            assert_eq!(block.terminal().map(|t| t.opcode), Some(OpCode::Switch));
            assert_eq!(block.targets, blocks.block(switch).targets);
        }
        assert!(blocks.block(switch).sources.is_empty());
        assert_eq!(ctx.events.count_kind(EventKind::SwitchMerged), 2);
    }

    #[test]
    fn test_stored_local_keeps_store() {
        let store = MetadataStore::new();
        // 0: ldc.i4 1; 1: br 2; 2: stloc 0; 3: ldloc 0; 4: switch (6, 7); 5: ret; 6: ret; 7: ret
        let (method, mut blocks) = method_and_blocks(
            vec![ElementType::I4],
            vec![
                Instruction::ldc_i4(1),
                Instruction::br(2),
                Instruction::stloc(0),
                Instruction::ldloc(0),
                Instruction::switch(vec![6, 7]),
                Instruction::simple(OpCode::Ret),
                Instruction::simple(OpCode::Ret),
                Instruction::simple(OpCode::Ret),
            ],
        );
        let list = blocks.block_list();
        let mut ctx = context(&method, &store);

        assert!(SwitchResolver::new().run(&mut blocks, &mut ctx).unwrap());
        let entry = blocks.block(list[0]);
        assert_eq!(
            entry.instructions,
            vec![Instruction::ldc_i4(1), Instruction::stloc(0), Instruction::br(0)]
        );
        assert_eq!(entry.targets, vec![list[4]]);
    }

    #[test]
    fn test_conditional_predecessor_gets_edge_block() {
        let store = MetadataStore::new();
        // 0: ldc.i4 0; 1: stloc 0; 2: ldloc 1; 3: brtrue 4; 4: ldloc 0; 5: switch (7, 8); 6: ret; 7: ret; 8: ret
        let (method, mut blocks) = method_and_blocks(
            vec![ElementType::I4, ElementType::I4],
            vec![
                Instruction::ldc_i4(0),
                Instruction::stloc(0),
                Instruction::ldloc(1),
                Instruction::branch(OpCode::Brtrue, 4),
                Instruction::ldloc(0),
                Instruction::switch(vec![7, 8]),
                Instruction::simple(OpCode::Ret),
                Instruction::simple(OpCode::Ret),
                Instruction::simple(OpCode::Ret),
            ],
        );
        let list = blocks.block_list();
        let (entry, switch, case0) = (list[0], list[1], list[3]);
        let mut ctx = context(&method, &store);

        assert!(SwitchResolver::new().run(&mut blocks, &mut ctx).unwrap());

        let edge = blocks.block(entry).targets[0];
        assert_ne!(edge, switch);
        assert_eq!(blocks.block(entry).fallthrough, Some(edge));
        assert_eq!(blocks.block(edge).targets, vec![case0]);
        assert!(blocks.block(switch).sources.is_empty());
    }
}
