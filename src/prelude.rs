//! # dotflow Prelude
//!
//! The types needed to describe a method, simplify it and inspect the result.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotflow operations
pub use crate::Error;

/// The result type used throughout dotflow
pub use crate::Result;

// ================================================================================================
// Instructions and Metadata
// ================================================================================================

/// Decoded CIL instructions
pub use crate::assembly::{FlowType, Instruction, OpCode, Operand};

/// Method descriptions and bodies
pub use crate::metadata::method::{
    ExceptionHandler, HandlerKind, MethodAccessFlags, MethodBody, MethodDesc, MethodModifiers, MethodSignature,
};

/// Metadata lookups
pub use crate::metadata::resolver::{MetadataResolver, MetadataStore};

/// Metadata token type for referencing table entries
pub use crate::metadata::token::Token;

/// Types, fields and assemblies
pub use crate::metadata::typesystem::{AssemblyId, ElementType, FieldDesc, TypeDesc};

// ================================================================================================
// Emulation
// ================================================================================================

/// Abstract values and the emulator
pub use crate::emulation::{Bool3, InstructionEmulator, Int32Value, Int64Value, Real8Value, Value, ValueStack};

// ================================================================================================
// Simplification
// ================================================================================================

/// Block graph
pub use crate::blocks::{BlockId, Blocks};

/// Driver, passes and reporting
pub use crate::deobfuscation::{
    AccessChecker, BlocksPass, EventKind, EventLog, MethodCallInliner, PassContext, Simplifier, SimplifierConfig,
    SimplifyStats,
};
