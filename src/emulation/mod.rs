//! Bit-precise abstract interpretation of CIL.
//!
//! This module evaluates straight-line CIL over abstract values that may be only partially
//! known, which is what lets the simplifier decide opaque predicates and flattened dispatch
//! without running the code.
//!
//! # Architecture
//!
//! - [`value`] - The abstract domain: [`Value`], [`Bool3`] and the bit-masked integers
//! - [`ValueStack`] - Evaluation stack that yields `Unknown` instead of underflowing
//! - [`InstructionEmulator`] - Per-block symbolic execution over locals, arguments and stack
//! - [`emulate_branch`] - Three-valued resolution of a block's terminal branch or switch
//!
//! Emulation is per block: every block starts from the method's initial local and argument
//! state (or an unknown one) and an empty stack, so a result is only trusted if it holds for
//! every way the block can be entered.

mod branch;
mod emulator;
pub mod ops;
mod stack;
pub mod value;

pub use branch::{emulate_branch, switch_target, BranchHandler};
pub use emulator::{truncate_to, unknown_of, zero_of, InstructionEmulator};
pub use stack::ValueStack;
pub use value::{Bool3, Int32Value, Int64Value, OriginId, Real8Value, Value};
