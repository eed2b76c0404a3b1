//! Construction of a [`Blocks`] graph from a flat method body.

use std::collections::BTreeSet;

use crate::{
    assembly::{FlowType, Instruction, Operand},
    blocks::{Block, BlockId, Blocks, HandlerRegion, ScopeBlock, ScopeId, ScopeKind},
    metadata::method::{HandlerKind, MethodBody},
    Error, Result,
};

/// A half-open instruction range belonging to one scope.
#[derive(Debug, Clone, Copy)]
struct Range {
    start: usize,
    end: usize,
    kind: ScopeKind,
}

impl Range {
    fn len(&self) -> usize {
        self.end - self.start
    }

    fn contains(&self, index: usize) -> bool {
        self.start <= index && index < self.end
    }

    fn encloses(&self, other: &Range) -> bool {
        self.start <= other.start && other.end <= self.end && self.len() > other.len()
    }
}

/// Instruction indices an instruction can branch to.
fn branch_targets(instruction: &Instruction) -> Vec<usize> {
    match &instruction.operand {
        Operand::Target(target) => vec![*target],
        Operand::Switch(targets) => targets.clone(),
        _ => Vec::new(),
    }
}

/// Index of the smallest range satisfying `pred`. Ties keep the earlier range.
fn smallest(ranges: &[Range], pred: impl Fn(&Range) -> bool) -> Option<usize> {
    ranges
        .iter()
        .enumerate()
        .filter(|(_, range)| pred(range))
        .min_by_key(|(_, range)| range.len())
        .map(|(index, _)| index)
}

impl Blocks {
    /// Splits a flat method body into basic blocks.
    ///
    /// Block leaders are the first instruction, every branch target, every instruction
    /// following a terminal and every exception region boundary. An empty body yields a
    /// single empty entry block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBranchTarget`] for branch operands outside the body and
    /// [`Error::Malformed`] for invalid exception handler ranges.
    pub fn from_body(body: &MethodBody) -> Result<Self> {
        let code = &body.instructions;
        let count = code.len();

        let mut ranges = vec![Range {
            start: 0,
            end: count,
            kind: ScopeKind::Method,
        }];
        // (try, handler, filter) range indices per clause
        let mut clauses = Vec::with_capacity(body.handlers.len());

        for handler in &body.handlers {
            if handler.try_start >= handler.try_end
                || handler.try_end > count
                || handler.handler_start >= handler.handler_end
                || handler.handler_end > count
            {
                return Err(malformed_error!(
                    "Invalid exception clause - try {}..{}, handler {}..{}",
                    handler.try_start,
                    handler.try_end,
                    handler.handler_start,
                    handler.handler_end
                ));
            }

            let try_range = match ranges.iter().position(|r| {
                r.kind == ScopeKind::Try && r.start == handler.try_start && r.end == handler.try_end
            }) {
                Some(existing) => existing,
                None => {
                    ranges.push(Range {
                        start: handler.try_start,
                        end: handler.try_end,
                        kind: ScopeKind::Try,
                    });
                    ranges.len() - 1
                }
            };

            let filter_range = match handler.kind {
                HandlerKind::Filter(filter_start) => {
                    if filter_start >= handler.handler_start {
                        return Err(malformed_error!(
                            "Filter at {} does not precede its handler at {}",
                            filter_start,
                            handler.handler_start
                        ));
                    }
                    ranges.push(Range {
                        start: filter_start,
                        end: handler.handler_start,
                        kind: ScopeKind::Filter,
                    });
                    Some(ranges.len() - 1)
                }
                _ => None,
            };

            ranges.push(Range {
                start: handler.handler_start,
                end: handler.handler_end,
                kind: ScopeKind::Handler,
            });
            clauses.push((handler.kind, try_range, ranges.len() - 1, filter_range));
        }

        let mut leaders = BTreeSet::new();
        leaders.insert(0);
        for (index, instruction) in code.iter().enumerate() {
            for target in branch_targets(instruction) {
                if target >= count {
                    return Err(Error::InvalidBranchTarget(target));
                }
                leaders.insert(target);
            }
            if instruction.is_terminal() && index + 1 < count {
                leaders.insert(index + 1);
            }
        }
        for range in ranges.iter().skip(1) {
            leaders.insert(range.start);
            if range.end < count {
                leaders.insert(range.end);
            }
        }

        let starts: Vec<usize> = leaders.into_iter().collect();
        let block_at = |index: usize| -> BlockId {
            BlockId(starts.partition_point(|start| *start <= index) - 1)
        };

        let scopes: Vec<ScopeBlock> = ranges
            .iter()
            .enumerate()
            .map(|(index, range)| ScopeBlock {
                kind: range.kind,
                parent: if index == 0 {
                    None
                } else {
                    Some(ScopeId(smallest(&ranges, |outer| outer.encloses(range)).unwrap_or(0)))
                },
                head: Some(if index == 0 { BlockId(0) } else { block_at(range.start) }),
            })
            .collect();

        let mut blocks = Vec::with_capacity(starts.len());
        for (position, start) in starts.iter().enumerate() {
            let end = starts.get(position + 1).copied().unwrap_or(count);
            let scope = smallest(&ranges, |range| range.contains(*start)).unwrap_or(0);
            blocks.push(Block::new(code[*start..end].to_vec(), ScopeId(scope)));
        }

        let block_count = blocks.len();
        for position in 0..block_count {
            let id = BlockId(position);
            let next = (position + 1 < block_count).then_some(BlockId(position + 1));
            let block = &mut blocks[position];

            let (targets, fallthrough) = match block.terminal() {
                Some(terminal) => {
                    let targets: Vec<BlockId> = branch_targets(terminal).into_iter().map(&block_at).collect();
                    match terminal.flow_type() {
                        FlowType::ConditionalBranch | FlowType::Switch => (targets, next),
                        FlowType::UnconditionalBranch | FlowType::Leave => (targets, None),
                        _ => (Vec::new(), None),
                    }
                }
                None => (Vec::new(), next),
            };

            block.targets = targets;
            block.fallthrough = fallthrough;
            let successors: Vec<BlockId> = block.successors().collect();
            for successor in successors {
                blocks[successor.0].sources.push(id);
            }
        }

        let handlers = clauses
            .into_iter()
            .map(|(kind, try_range, handler_range, filter_range)| HandlerRegion {
                kind,
                try_scope: ScopeId(try_range),
                handler_scope: ScopeId(handler_range),
                filter_scope: filter_range.map(ScopeId),
            })
            .collect();

        Ok(Blocks {
            order: (0..blocks.len()).map(BlockId).collect(),
            blocks,
            scopes,
            handlers,
            entry: BlockId(0),
        })
    }
}
