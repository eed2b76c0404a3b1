//! Three-valued evaluation of block terminals.
//!
//! After a block's body has been emulated, [`emulate_branch`] consumes the operands of its
//! terminal branch and decides the outcome. A definite outcome is handed to a
//! [`BranchHandler`], which performs the rewrite; an undecidable one leaves everything
//! untouched.

use crate::{
    assembly::{FlowType, Instruction, OpCode},
    emulation::{
        emulator::InstructionEmulator,
        ops::{self, Comparison},
        value::{Bool3, Int32Value, Value},
    },
};

/// Receives the outcome of a resolved terminal.
pub trait BranchHandler {
    /// A conditional branch was decided. `pops` operands were consumed by the branch and
    /// `taken` says whether control goes to the branch target.
    ///
    /// Returns true if the handler applied its rewrite.
    fn handle_normal(&mut self, pops: usize, taken: bool) -> bool;

    /// A switch was decided with the given index. The handler maps it to a case target or
    /// the fallthrough (see [`switch_target`]).
    ///
    /// Returns true if the handler applied its rewrite.
    fn handle_switch(&mut self, index: &Int32Value) -> bool;
}

/// Resolves which successor a switch with `case_count` cases takes for `index`.
///
/// The index is compared unsigned, so negative indices select the fallthrough just like
/// indices past the last case. Returns:
///
/// - `Some(Some(case))` for a case target
/// - `Some(None)` for the fallthrough
/// - `None` if the index is not fully known
#[must_use]
pub fn switch_target(case_count: usize, index: &Int32Value) -> Option<Option<usize>> {
    let index = index.known_value()? as u32;
    match usize::try_from(index) {
        Ok(case) if case < case_count => Some(Some(case)),
        _ => Some(None),
    }
}

/// Evaluates the condition of a conditional branch whose operands are on the stack.
///
/// Operands are popped regardless of the outcome.
fn evaluate_condition(emulator: &mut InstructionEmulator<'_>, opcode: OpCode) -> Bool3 {
    match opcode {
        OpCode::Brtrue => emulator.pop().to_bool3(),
        OpCode::Brfalse => emulator.pop().to_bool3().negate(),
        _ => {
            let b = emulator.pop();
            let a = emulator.pop();
            Comparison::from_opcode(opcode).map_or(Bool3::Unknown, |cmp| ops::compare(cmp, &a, &b))
        }
    }
}

/// Resolves `terminal` against the emulator's current stack.
///
/// Returns true if the outcome was definite and the handler accepted it. Unconditional
/// branches and other terminals are never resolved.
pub fn emulate_branch(
    emulator: &mut InstructionEmulator<'_>,
    terminal: &Instruction,
    handler: &mut dyn BranchHandler,
) -> bool {
    match terminal.flow_type() {
        FlowType::ConditionalBranch => {
            let pops = if matches!(terminal.opcode, OpCode::Brtrue | OpCode::Brfalse) {
                1
            } else {
                2
            };
            match evaluate_condition(emulator, terminal.opcode).as_bool() {
                Some(taken) => handler.handle_normal(pops, taken),
                None => false,
            }
        }
        FlowType::Switch => match emulator.pop() {
            Value::Int32(index) if index.all_bits_valid() => handler.handle_switch(&index),
            _ => false,
        },
        _ => false,
    }
}
