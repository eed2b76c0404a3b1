//! Rewrites `stloc k; ldloc k` of boolean locals into `dup; stloc k`.

use crate::{
    assembly::{Instruction, OpCode},
    blocks::Blocks,
    deobfuscation::{
        events::EventKind,
        pass::{BlocksPass, PassContext},
    },
    metadata::typesystem::ElementType,
    Result,
};

/// Rewrites `stloc k; ldloc k` into `dup; stloc k` when local `k` is a boolean.
#[derive(Debug, Default)]
pub struct StoreReloadFixer;

impl StoreReloadFixer {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl BlocksPass for StoreReloadFixer {
    fn name(&self) -> &'static str {
        "stloc"
    }

    fn description(&self) -> &'static str {
        "Replaces a store and reload of a boolean local with dup and store"
    }

    fn run(&mut self, blocks: &mut Blocks, ctx: &mut PassContext<'_>) -> Result<bool> {
        let is_boolean =
            |local: u16| ctx.method.locals.get(usize::from(local)) == Some(&ElementType::Boolean);
        let mut changed = false;

        for id in blocks.block_list() {
            let mut code = blocks.block(id).instructions.clone();
            let mut fixed = 0;

            for index in 1..code.len() {
                let (store, load) = (&code[index - 1], &code[index]);
                if store.opcode != OpCode::Stloc || load.opcode != OpCode::Ldloc {
                    continue;
                }
                let Some(local) = store.local_index().filter(|&l| load.local_index() == Some(l)) else {
                    continue;
                };
                if !is_boolean(local) {
                    continue;
                }

                code[index] = code[index - 1].clone();
                code[index - 1] = Instruction::dup();
                fixed += 1;
            }

            if fixed > 0 {
                blocks.set_instructions(id, code)?;
                ctx.record(EventKind::StoreReloadFixed)
                    .at_block(id)
                    .pass(self.name())
                    .message(format!("{fixed} boolean reload(s) replaced"));
                changed = true;
            }
        }

        Ok(changed)
    }
}
