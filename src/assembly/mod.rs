//! CIL instruction model.
//!
//! Instructions reach the simplifier already decoded and macro-expanded. This module defines
//! the canonical [`OpCode`] set together with its static control flow and stack tables, and
//! the [`Instruction`] type that flat bodies and blocks are made of.

mod instruction;
mod opcodes;

pub use instruction::{FlowType, Instruction, InstructionCategory, Operand, StackBehavior};
pub use opcodes::OpCode;
