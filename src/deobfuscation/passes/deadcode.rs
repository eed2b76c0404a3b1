//! Removal of side-effect-free code whose results are never used.
//!
//! Each block is analyzed on its own. A forward pass over the body connects every stack
//! value to the instruction that produced it and the one that consumed it. Starting from a
//! `pop`, a `nop` or a value the block's terminal throws away, the analysis grows a set of
//! instructions closed under both links. If every member is side-effect-free and no member
//! exchanges values with the outside of the set, deleting the whole set leaves the stack
//! seen by every other instruction unchanged.
//!
//! Values crossing the block boundary are never touched: anything that flows in from a
//! predecessor or stays on the stack for a successor pins its producer and consumer.

use std::collections::BTreeSet;

use log::trace;

use crate::{
    assembly::{Instruction, OpCode},
    blocks::{BlockId, Blocks},
    deobfuscation::{
        events::EventKind,
        pass::{BlocksPass, PassContext},
    },
    metadata::resolver::MetadataResolver,
    Result,
};

/// Where a value pushed by a body instruction ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Consumer {
    /// Popped by the body instruction at this index
    Instruction(usize),
    /// Thrown away by the terminal (`leave`, `endfinally`)
    Discarded,
    /// Consumed by the terminal, left for a successor or lost across an opaque instruction
    Escaped,
}

/// Producer and consumer links of one block body.
struct Flow {
    /// Producer of every input, bottom first; `None` for values from outside the block
    inputs: Vec<Vec<Option<usize>>>,
    /// Consumer of every output
    outputs: Vec<Vec<Consumer>>,
}

impl Flow {
    fn analyze(body: &[Instruction], terminal: Option<&Instruction>, resolver: &dyn MetadataResolver) -> Self {
        let mut inputs = vec![Vec::new(); body.len()];
        let mut outputs = vec![Vec::new(); body.len()];
        // (producer, output slot)
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for (index, instruction) in body.iter().enumerate() {
            let Some(behavior) = instruction.stack_behavior(resolver) else {
                // Effect unknown: everything below is lost from sight
                stack.clear();
                continue;
            };

            let mut consumed = Vec::with_capacity(usize::from(behavior.pops));
            for _ in 0..behavior.pops {
                consumed.push(stack.pop().map(|(producer, slot)| {
                    outputs[producer][slot] = Consumer::Instruction(index);
                    producer
                }));
            }
            consumed.reverse();
            inputs[index] = consumed;

            outputs[index] = vec![Consumer::Escaped; usize::from(behavior.pushes)];
            stack.extend((0..usize::from(behavior.pushes)).map(|slot| (index, slot)));
        }

        if terminal.is_some_and(|t| matches!(t.opcode, OpCode::Leave | OpCode::Endfinally)) {
            for (producer, slot) in stack {
                outputs[producer][slot] = Consumer::Discarded;
            }
        }

        Flow { inputs, outputs }
    }

    /// Smallest removable set containing `site`, if there is one.
    fn closure(&self, body: &[Instruction], site: usize) -> Option<BTreeSet<usize>> {
        let mut members = BTreeSet::new();
        let mut pending = vec![site];

        while let Some(index) = pending.pop() {
            if !members.insert(index) {
                continue;
            }
            if !body[index].opcode.is_side_effect_free() {
                return None;
            }
            for input in &self.inputs[index] {
                pending.push((*input)?);
            }
            for consumer in &self.outputs[index] {
                match consumer {
                    Consumer::Instruction(next) => pending.push(*next),
                    Consumer::Discarded => {}
                    Consumer::Escaped => return None,
                }
            }
        }

        Some(members)
    }

    /// Instructions whose removal is started from: `pop`s, `nop`s and discarded producers.
    fn sites<'a>(&'a self, body: &'a [Instruction]) -> impl Iterator<Item = usize> + 'a {
        body.iter().enumerate().filter_map(|(index, instruction)| {
            let is_site = matches!(instruction.opcode, OpCode::Pop | OpCode::Nop)
                || self.outputs[index].contains(&Consumer::Discarded);
            is_site.then_some(index)
        })
    }
}

/// Deletes side-effect-free instructions whose results are discarded, together with the
/// `pop`s discarding them.
#[derive(Debug, Default)]
pub struct DeadCodeRemover;

impl DeadCodeRemover {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Indices of the body instructions of `id` that can be deleted.
    fn removable(blocks: &Blocks, id: BlockId, resolver: &dyn MetadataResolver) -> BTreeSet<usize> {
        let block = blocks.block(id);
        let body = block.body();
        let flow = Flow::analyze(body, block.terminal(), resolver);

        let mut removable = BTreeSet::new();
        for site in flow.sites(body) {
            if removable.contains(&site) {
                continue;
            }
            if let Some(members) = flow.closure(body, site) {
                removable.extend(members);
            }
        }
        removable
    }
}

impl BlocksPass for DeadCodeRemover {
    fn name(&self) -> &'static str {
        "deadcode"
    }

    fn description(&self) -> &'static str {
        "Removes side-effect-free instructions whose results are never used"
    }

    fn run(&mut self, blocks: &mut Blocks, ctx: &mut PassContext<'_>) -> Result<bool> {
        let mut changed = false;

        for id in blocks.block_list() {
            let removable = Self::removable(blocks, id, ctx.resolver);
            if removable.is_empty() {
                continue;
            }

            let code = blocks
                .block(id)
                .instructions
                .iter()
                .enumerate()
                .filter(|(index, _)| !removable.contains(index))
                .map(|(_, instruction)| instruction.clone())
                .collect();
            trace!("deadcode: {} loses {:?}", id, removable);
            blocks.set_instructions(id, code)?;
            ctx.record(EventKind::CodeRemoved)
                .at_block(id)
                .pass(self.name())
                .message(format!("{} instruction(s) removed", removable.len()));
            changed = true;
        }

        Ok(changed)
    }
}
