//! Flattening a [`Blocks`] graph back into a method body, and stack depth analysis.

use std::collections::VecDeque;

use crate::{
    assembly::{FlowType, Instruction, OpCode, Operand},
    blocks::{BlockId, Blocks, ScopeId},
    metadata::{
        method::{ExceptionHandler, HandlerKind, MethodBody},
        resolver::MetadataResolver,
    },
    Error, Result,
};

/// Emission plan of one block.
struct Layout {
    id: BlockId,
    /// Drop the terminal `br`, the target being the next block
    drop_br: bool,
    /// Append a `br` to the fallthrough, which is not the next block
    append_br: bool,
    len: usize,
}

impl Blocks {
    fn layout(&self) -> Vec<Layout> {
        let mut plan = Vec::with_capacity(self.order.len());
        for (position, id) in self.order.iter().enumerate() {
            let block = &self.blocks[id.0];
            let next = self.order.get(position + 1).copied();

            let drop_br = block.terminal().is_some_and(Instruction::is_br)
                && block.targets.first().copied() == next
                && next.is_some();
            let append_br = block.fallthrough.is_some() && block.fallthrough != next;

            let len = block.instructions.len() - usize::from(drop_br) + usize::from(append_br);
            plan.push(Layout {
                id: *id,
                drop_br,
                append_br,
                len,
            });
        }
        plan
    }

    /// Half-open instruction range covered by `scope` and everything nested in it.
    fn scope_range(&self, plan: &[Layout], starts: &[usize], scope: ScopeId) -> Result<Option<(usize, usize)>> {
        let mut range: Option<(usize, usize)> = None;
        let mut left = false;

        for (layout, start) in plan.iter().zip(starts) {
            if layout.len == 0 {
                continue;
            }
            let inside = self.scope_within(self.blocks[layout.id.0].scope, scope);
            match (inside, range) {
                (true, None) => range = Some((*start, start + layout.len)),
                (true, Some((first, _))) if !left => range = Some((first, start + layout.len)),
                (true, Some(_)) => {
                    return Err(malformed_error!("Exception region is no longer contiguous at {}", layout.id));
                }
                (false, Some(_)) => left = true,
                (false, None) => {}
            }
        }

        Ok(range)
    }

    /// Serializes the graph into a flat body in layout order.
    ///
    /// Unconditional branches to the next block are dropped, fallthrough edges to a block
    /// that is not next get an explicit `br`, and branch operands are rewritten to the new
    /// instruction indices. Exception clauses whose protected region or handler became empty
    /// are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if an exception region is not contiguous in the layout.
    pub fn to_body(&self) -> Result<MethodBody> {
        let plan = self.layout();
        let mut starts = Vec::with_capacity(plan.len());
        let mut position = 0;
        for layout in &plan {
            starts.push(position);
            position += layout.len;
        }
        let start_of = |id: BlockId| -> usize {
            plan.iter()
                .position(|layout| layout.id == id)
                .map_or(position, |index| starts[index])
        };

        let mut instructions = Vec::with_capacity(position);
        for layout in &plan {
            let block = &self.blocks[layout.id.0];
            let emitted = if layout.drop_br {
                &block.instructions[..block.instructions.len() - 1]
            } else {
                &block.instructions[..]
            };

            for instruction in emitted {
                let mut instruction = instruction.clone();
                if instruction.is_terminal() {
                    match &mut instruction.operand {
                        Operand::Target(target) => {
                            if let Some(id) = block.targets.first() {
                                *target = start_of(*id);
                            }
                        }
                        Operand::Switch(targets) => {
                            *targets = block.targets.iter().map(|id| start_of(*id)).collect();
                        }
                        _ => {}
                    }
                }
                instructions.push(instruction);
            }

            if let (true, Some(fallthrough)) = (layout.append_br, block.fallthrough) {
                instructions.push(Instruction::br(start_of(fallthrough)));
            }
        }

        let mut handlers = Vec::with_capacity(self.handlers.len());
        for region in &self.handlers {
            let try_range = self.scope_range(&plan, &starts, region.try_scope)?;
            let handler_range = self.scope_range(&plan, &starts, region.handler_scope)?;
            let (Some((try_start, try_end)), Some((handler_start, handler_end))) = (try_range, handler_range) else {
                log::debug!("dropping exception clause with an empty region");
                continue;
            };

            let kind = match (region.kind, region.filter_scope) {
                (HandlerKind::Filter(_), Some(filter)) => match self.scope_range(&plan, &starts, filter)? {
                    Some((filter_start, _)) => HandlerKind::Filter(filter_start),
                    None => continue,
                },
                (kind, _) => kind,
            };

            handlers.push(ExceptionHandler {
                kind,
                try_start,
                try_end,
                handler_start,
                handler_end,
            });
        }

        Ok(MethodBody { instructions, handlers })
    }

    /// Alias of [`Blocks::to_body`] returning only the instructions.
    ///
    /// # Errors
    ///
    /// See [`Blocks::to_body`].
    pub fn get_code(&self) -> Result<Vec<Instruction>> {
        Ok(self.to_body()?.instructions)
    }

    /// Computes the maximum evaluation stack depth over all reachable blocks.
    ///
    /// Catch and filter handlers start with the exception object on the stack; every other
    /// region head starts empty. `ret`, `leave` and `endfinally` leave an empty stack.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackUnderflow`] if a block pops more than it has,
    /// [`Error::UnresolvedOperand`] for calls the resolver cannot resolve and
    /// [`Error::UnsupportedOperand`] for `calli`.
    pub fn compute_max_stack(&self, resolver: &dyn MetadataResolver) -> Result<usize> {
        let mut entry_depth: Vec<Option<i64>> = vec![None; self.blocks.len()];
        let mut queue = VecDeque::new();

        entry_depth[self.entry.0] = Some(0);
        queue.push_back(self.entry);
        for region in &self.handlers {
            let with_exception = matches!(region.kind, HandlerKind::Catch(_) | HandlerKind::Filter(_));
            let heads = [Some(region.handler_scope), region.filter_scope]
                .into_iter()
                .flatten()
                .filter_map(|scope| self.scopes[scope.0].head);
            for head in heads {
                if entry_depth[head.0].is_none() {
                    entry_depth[head.0] = Some(i64::from(with_exception));
                    queue.push_back(head);
                }
            }
        }

        let mut max = 0;
        while let Some(id) = queue.pop_front() {
            let block = &self.blocks[id.0];
            let mut depth = entry_depth[id.0].unwrap_or(0);
            max = max.max(depth);

            for instruction in &block.instructions {
                match instruction.opcode {
                    OpCode::Ret | OpCode::Leave | OpCode::Endfinally | OpCode::Jmp => {
                        depth = 0;
                        continue;
                    }
                    OpCode::Calli => return Err(Error::UnsupportedOperand("calli")),
                    _ => {}
                }

                let Some(behavior) = instruction.stack_behavior(resolver) else {
                    return Err(match instruction.token() {
                        Some(token) => Error::UnresolvedOperand(token),
                        None => Error::UnsupportedOperand(instruction.opcode.mnemonic()),
                    });
                };

                depth -= i64::from(behavior.pops);
                if depth < 0 {
                    return Err(Error::StackUnderflow { block: id.0, depth });
                }
                depth += i64::from(behavior.pushes);
                max = max.max(depth);
            }

            let leaves = block.terminal().map(Instruction::flow_type) == Some(FlowType::Leave);
            for successor in block.successors() {
                if entry_depth[successor.0].is_none() {
                    entry_depth[successor.0] = Some(if leaves { 0 } else { depth });
                    queue.push_back(successor);
                }
            }
        }

        Ok(usize::try_from(max).unwrap_or(0))
    }
}
