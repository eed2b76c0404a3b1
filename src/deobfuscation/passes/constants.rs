//! Constant folding over single blocks.

use log::debug;

use crate::{
    assembly::{Instruction, OpCode},
    blocks::{BlockId, Blocks},
    deobfuscation::{
        events::EventKind,
        pass::{BlocksPass, PassContext},
        passes::is_method_entry,
    },
    emulation::Value,
    Result,
};

/// Literal instruction pushing `value`, if it is fully known.
fn literal_of(value: &Value) -> Option<Instruction> {
    match value {
        Value::Int32(v) => v.known_value().map(Instruction::ldc_i4),
        Value::Int64(v) => v.known_value().map(Instruction::ldc_i8),
        Value::Real8(v) if v.is_valid => Some(Instruction::ldc_r8(v.value)),
        Value::Null => Some(Instruction::simple(OpCode::Ldnull)),
        Value::String(s) => Some(Instruction::ldstr(s)),
        _ => None,
    }
}

/// Numeric literal for the result of a folded computation.
fn numeric_literal_of(value: &Value) -> Option<Instruction> {
    match value {
        Value::Int32(_) | Value::Int64(_) | Value::Real8(_) => literal_of(value),
        _ => None,
    }
}

/// Replaces loads of known locals and arguments, and pure computations over known inputs,
/// with literals.
///
/// A folded computation keeps its operands alive through `pop`s; removing them is left to the
/// [`DeadCodeRemover`](crate::deobfuscation::passes::DeadCodeRemover).
#[derive(Debug, Default)]
pub struct ConstantFolder;

impl ConstantFolder {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Folds one block, returning the new instructions and the number of folds.
    fn fold(blocks: &Blocks, id: BlockId, ctx: &mut PassContext<'_>) -> Result<Option<(Vec<Instruction>, usize)>> {
        let block = blocks.block(id);
        ctx.emulator.initialize(ctx.method, is_method_entry(blocks, id));

        let mut code = Vec::with_capacity(block.instructions.len());
        let mut folds = 0;

        for instruction in block.body() {
            let folded = match instruction.opcode {
                OpCode::Ldloc | OpCode::Ldarg => {
                    ctx.emulator.emulate(instruction)?;
                    literal_of(&ctx.emulator.peek()).map(|literal| vec![literal])
                }
                opcode if opcode.is_pure_computation() => {
                    let pops = instruction
                        .stack_behavior(ctx.resolver)
                        .map_or(0, |behavior| usize::from(behavior.pops));
                    let inputs = ctx.emulator.stack().top(pops);
                    let inputs_known = pops > 0 && inputs.len() == pops && inputs.iter().all(Value::is_fully_known);

                    ctx.emulator.emulate(instruction)?;
                    if inputs_known {
                        numeric_literal_of(&ctx.emulator.peek()).map(|literal| {
                            let mut replacement = vec![Instruction::pop(); pops];
                            replacement.push(literal);
                            replacement
                        })
                    } else {
                        None
                    }
                }
                _ => {
                    ctx.emulator.emulate(instruction)?;
                    None
                }
            };

            match folded {
                Some(replacement) => {
                    code.extend(replacement);
                    folds += 1;
                }
                None => code.push(instruction.clone()),
            }
        }

        if folds == 0 {
            return Ok(None);
        }
        code.extend(block.terminal().cloned());
        Ok(Some((code, folds)))
    }
}

impl BlocksPass for ConstantFolder {
    fn name(&self) -> &'static str {
        "constants"
    }

    fn description(&self) -> &'static str {
        "Replaces loads and computations with a statically known value by literals"
    }

    fn run(&mut self, blocks: &mut Blocks, ctx: &mut PassContext<'_>) -> Result<bool> {
        let mut changed = false;

        for id in blocks.block_list() {
            let (code, folds) = match Self::fold(blocks, id, ctx) {
                Ok(Some(folded)) => folded,
                Ok(None) => continue,
                Err(e) => {
                    debug!("constants: skipping {} of {}: {}", id, ctx.method.name, e);
                    continue;
                }
            };

            blocks.set_instructions(id, code)?;
            ctx.record(EventKind::ConstantFolded)
                .at_block(id)
                .pass(self.name())
                .message(format!("{folds} value(s) folded"));
            changed = true;
        }

        Ok(changed)
    }
}
