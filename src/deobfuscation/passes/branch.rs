//! Resolution of branches decided by the code of their own block.

use log::debug;

use crate::{
    assembly::Instruction,
    blocks::{BlockId, Blocks},
    deobfuscation::{
        events::EventKind,
        pass::{BlocksPass, PassContext},
        passes::emulate_body,
    },
    emulation::{emulate_branch, switch_target, BranchHandler, Int32Value},
    Result,
};

/// Outcome of a resolved terminal.
#[derive(Default)]
struct Decision {
    /// Operands consumed by the terminal
    pops: usize,
    /// `Some(case)` for a taken branch or switch case, `None` for the fallthrough
    target: Option<Option<usize>>,
    case_count: usize,
}

impl BranchHandler for Decision {
    fn handle_normal(&mut self, pops: usize, taken: bool) -> bool {
        self.pops = pops;
        self.target = Some(taken.then_some(0));
        true
    }

    fn handle_switch(&mut self, index: &Int32Value) -> bool {
        self.pops = 1;
        self.target = switch_target(self.case_count, index);
        self.target.is_some()
    }
}

/// Replaces conditional branches and switches whose outcome is fixed by their own block with
/// `pop`s for the consumed operands followed by a `br`.
///
/// The `pop`s are left for [`DeadCodeRemover`](crate::deobfuscation::passes::DeadCodeRemover)
/// together with whatever produced the operands.
#[derive(Debug, Default)]
pub struct BranchResolver;

impl BranchResolver {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn resolve(&self, blocks: &Blocks, id: BlockId, ctx: &mut PassContext<'_>) -> Result<Option<(usize, BlockId)>> {
        let block = blocks.block(id);
        let Some(terminal) = block.terminal() else {
            return Ok(None);
        };
        if !terminal.is_branch() || terminal.is_br() {
            return Ok(None);
        }

        emulate_body(blocks, id, ctx)?;
        let mut decision = Decision {
            case_count: block.targets.len(),
            ..Decision::default()
        };
        if !emulate_branch(&mut ctx.emulator, terminal, &mut decision) {
            return Ok(None);
        }

        let destination = match decision.target {
            Some(Some(case)) => block.targets.get(case).copied(),
            Some(None) => block.fallthrough,
            None => None,
        };
        Ok(destination.map(|destination| (decision.pops, destination)))
    }
}

impl BlocksPass for BranchResolver {
    fn name(&self) -> &'static str {
        "branch"
    }

    fn description(&self) -> &'static str {
        "Resolves conditional branches and switches with a statically known outcome"
    }

    fn run(&mut self, blocks: &mut Blocks, ctx: &mut PassContext<'_>) -> Result<bool> {
        let mut changed = false;

        for id in blocks.block_list() {
            let (pops, destination) = match self.resolve(blocks, id, ctx) {
                Ok(Some(resolved)) => resolved,
                Ok(None) => continue,
                Err(e) => {
                    debug!("branch: skipping {} of {}: {}", id, ctx.method.name, e);
                    continue;
                }
            };

            blocks.replace_terminal(
                id,
                vec![Instruction::pop(); pops],
                Some(Instruction::br(0)),
                vec![destination],
                None,
            )?;
            ctx.record(EventKind::BranchResolved)
                .at_block(id)
                .pass(self.name())
                .message(format!("always continues at {destination}"));
            changed = true;
        }

        Ok(changed)
    }
}
