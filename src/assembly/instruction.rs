//! Instruction representation shared by flat bodies and blocks.
//!
//! An [`Instruction`] is an opcode plus an [`Operand`]. In a flat
//! [`crate::metadata::method::MethodBody`], branch operands hold instruction indices. Inside a
//! [`crate::blocks::Blocks`] graph the branch targets live on the block instead, and the
//! operand of a terminal branch is ignored until code is generated again.
//!
//! # Key Types
//! - [`Instruction`] - Opcode plus operand
//! - [`Operand`] - Typed operand data
//! - [`FlowType`] - How an instruction affects control flow
//! - [`StackBehavior`] - Pops and pushes of an instruction

use std::fmt;

use crate::{
    assembly::opcodes::OpCode,
    metadata::{resolver::MetadataResolver, token::Token},
};

/// Control flow classification of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Normal execution continues to next instruction
    Sequential,
    /// Conditional branch to another location
    ConditionalBranch,
    /// Always branches to another location (unconditional jump)
    UnconditionalBranch,
    /// Call to another method
    Call,
    /// Returns from current method
    Return,
    /// Multi-way branch (switch statement)
    Switch,
    /// Exception throwing
    Throw,
    /// End of finally or filter block
    EndFinally,
    /// Leave protected region (try/catch/finally)
    Leave,
}

/// Categorization of instructions by their primary function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionCategory {
    /// Arithmetic operations (add, sub, mul, div, rem, neg)
    Arithmetic,
    /// Bitwise and logical operations (and, or, xor, not, shl, shr)
    BitwiseLogical,
    /// Comparison operations (ceq, cgt, clt)
    Comparison,
    /// Control flow operations (br, switch, ret)
    ControlFlow,
    /// Type conversion operations (conv.*)
    Conversion,
    /// Load and store operations (ldloc, stloc, ldfld)
    LoadStore,
    /// Object model operations (newobj, box, call)
    ObjectModel,
    /// Instruction prefixes (volatile., tail.)
    Prefix,
    /// Miscellaneous operations (nop, break, dup, pop)
    Misc,
}

/// Stack effect of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackBehavior {
    /// Number of items popped from stack
    pub pops: u8,
    /// Number of items pushed to stack
    pub pushes: u8,
    /// Net effect on stack depth (pushes - pops)
    pub net_effect: i8,
}

impl StackBehavior {
    /// Creates a stack behavior from pop and push counts.
    #[must_use]
    pub fn new(pops: u8, pushes: u8) -> Self {
        StackBehavior {
            pops,
            pushes,
            net_effect: pushes as i8 - pops as i8,
        }
    }
}

/// Operand data of an instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand
    None,
    /// 32-bit integer immediate
    Int32(i32),
    /// 64-bit integer immediate
    Int64(i64),
    /// 32-bit float immediate
    Float32(f32),
    /// 64-bit float immediate
    Float64(f64),
    /// String literal of `ldstr`
    String(String),
    /// Metadata token (method, field, type or signature)
    Token(Token),
    /// Local variable index
    Local(u16),
    /// Argument index, `this` being 0 for instance methods
    Argument(u16),
    /// Branch target, an instruction index in flat form
    Target(usize),
    /// Switch case targets, instruction indices in flat form
    Switch(Vec<usize>),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Int32(value) => write!(f, "{value}"),
            Operand::Int64(value) => write!(f, "{value}"),
            Operand::Float32(value) => write!(f, "{value}"),
            Operand::Float64(value) => write!(f, "{value}"),
            Operand::String(value) => write!(f, "{value:?}"),
            Operand::Token(token) => write!(f, "{token}"),
            Operand::Local(index) => write!(f, "V_{index}"),
            Operand::Argument(index) => write!(f, "A_{index}"),
            Operand::Target(target) => write!(f, "IL_{target:04}"),
            Operand::Switch(targets) => {
                f.write_str("(")?;
                for (i, target) in targets.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "IL_{target:04}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// A single canonical CIL instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The opcode
    pub opcode: OpCode,
    /// The operand
    pub operand: Operand,
}

impl Instruction {
    /// Creates an instruction.
    #[must_use]
    pub fn new(opcode: OpCode, operand: Operand) -> Self {
        Instruction { opcode, operand }
    }

    /// Creates an instruction without operand.
    #[must_use]
    pub fn simple(opcode: OpCode) -> Self {
        Instruction {
            opcode,
            operand: Operand::None,
        }
    }

    /// `ldc.i4 value`
    #[must_use]
    pub fn ldc_i4(value: i32) -> Self {
        Self::new(OpCode::LdcI4, Operand::Int32(value))
    }

    /// `ldc.i8 value`
    #[must_use]
    pub fn ldc_i8(value: i64) -> Self {
        Self::new(OpCode::LdcI8, Operand::Int64(value))
    }

    /// `ldc.r8 value`
    #[must_use]
    pub fn ldc_r8(value: f64) -> Self {
        Self::new(OpCode::LdcR8, Operand::Float64(value))
    }

    /// `ldstr value`
    #[must_use]
    pub fn ldstr(value: &str) -> Self {
        Self::new(OpCode::Ldstr, Operand::String(value.to_string()))
    }

    /// `ldloc index`
    #[must_use]
    pub fn ldloc(index: u16) -> Self {
        Self::new(OpCode::Ldloc, Operand::Local(index))
    }

    /// `stloc index`
    #[must_use]
    pub fn stloc(index: u16) -> Self {
        Self::new(OpCode::Stloc, Operand::Local(index))
    }

    /// `ldarg index`
    #[must_use]
    pub fn ldarg(index: u16) -> Self {
        Self::new(OpCode::Ldarg, Operand::Argument(index))
    }

    /// `pop`
    #[must_use]
    pub fn pop() -> Self {
        Self::simple(OpCode::Pop)
    }

    /// `dup`
    #[must_use]
    pub fn dup() -> Self {
        Self::simple(OpCode::Dup)
    }

    /// `br target`, the target being an instruction index in flat form
    #[must_use]
    pub fn br(target: usize) -> Self {
        Self::new(OpCode::Br, Operand::Target(target))
    }

    /// A conditional or unconditional branch to `target`
    #[must_use]
    pub fn branch(opcode: OpCode, target: usize) -> Self {
        Self::new(opcode, Operand::Target(target))
    }

    /// `switch (targets)`
    #[must_use]
    pub fn switch(targets: Vec<usize>) -> Self {
        Self::new(OpCode::Switch, Operand::Switch(targets))
    }

    /// An instruction taking a metadata token
    #[must_use]
    pub fn with_token(opcode: OpCode, token: Token) -> Self {
        Self::new(opcode, Operand::Token(token))
    }

    /// How this instruction affects control flow.
    #[must_use]
    pub fn flow_type(&self) -> FlowType {
        self.opcode.flow_type()
    }

    /// Returns true if this instruction ends a basic block.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self.flow_type(), FlowType::Sequential | FlowType::Call)
    }

    /// Returns true for `br`, conditional branches and `switch`.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(
            self.flow_type(),
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Switch
        )
    }

    /// Returns true for conditional branches.
    #[must_use]
    pub fn is_conditional_branch(&self) -> bool {
        self.flow_type() == FlowType::ConditionalBranch
    }

    /// Returns true for `br`.
    #[must_use]
    pub fn is_br(&self) -> bool {
        self.opcode == OpCode::Br
    }

    /// Returns true for `leave`.
    #[must_use]
    pub fn is_leave(&self) -> bool {
        self.opcode == OpCode::Leave
    }

    /// Returns true for instructions pushing a literal constant.
    #[must_use]
    pub fn is_load_constant(&self) -> bool {
        matches!(
            self.opcode,
            OpCode::LdcI4 | OpCode::LdcI8 | OpCode::LdcR4 | OpCode::LdcR8 | OpCode::Ldnull | OpCode::Ldstr
        )
    }

    /// Returns the literal of an `ldc.i4`.
    #[must_use]
    pub fn get_ldc_i32(&self) -> Option<i32> {
        match (self.opcode, &self.operand) {
            (OpCode::LdcI4, Operand::Int32(value)) => Some(*value),
            _ => None,
        }
    }

    /// Returns the local index of `ldloc`, `ldloca` or `stloc`.
    #[must_use]
    pub fn local_index(&self) -> Option<u16> {
        match (self.opcode, &self.operand) {
            (OpCode::Ldloc | OpCode::Ldloca | OpCode::Stloc, Operand::Local(index)) => Some(*index),
            _ => None,
        }
    }

    /// Returns the argument index of `ldarg`, `ldarga` or `starg`.
    #[must_use]
    pub fn argument_index(&self) -> Option<u16> {
        match (self.opcode, &self.operand) {
            (OpCode::Ldarg | OpCode::Ldarga | OpCode::Starg, Operand::Argument(index)) => Some(*index),
            _ => None,
        }
    }

    /// Returns the metadata token operand, if any.
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        match &self.operand {
            Operand::Token(token) => Some(*token),
            _ => None,
        }
    }

    /// Stack effect of this instruction.
    ///
    /// Calls are resolved through `resolver`; `None` means the effect cannot be determined
    /// statically (unresolvable call target, `calli`, or an opcode emptying the stack).
    #[must_use]
    pub fn stack_behavior(&self, resolver: &dyn MetadataResolver) -> Option<StackBehavior> {
        match self.opcode {
            OpCode::Call | OpCode::Callvirt => {
                let method = resolver.method(self.token()?)?;
                let pops = u8::try_from(method.signature.arg_count()).ok()?;
                Some(StackBehavior::new(pops, u8::from(method.signature.returns_value())))
            }
            OpCode::Newobj => {
                let method = resolver.method(self.token()?)?;
                let pops = u8::try_from(method.signature.params.len()).ok()?;
                Some(StackBehavior::new(pops, 1))
            }
            _ => self.opcode.stack_behavior(),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operand {
            Operand::None => write!(f, "{}", self.opcode),
            _ => write!(f, "{} {}", self.opcode, self.operand),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        method::{MethodDesc, MethodSignature},
        resolver::MetadataStore,
        typesystem::ElementType,
    };

    #[test]
    fn test_stack_behavior_net_effect() {
        assert_eq!(StackBehavior::new(2, 1).net_effect, -1);
        assert_eq!(StackBehavior::new(1, 2).net_effect, 1);
    }

    #[test]
    fn test_instruction_predicates() {
        assert!(Instruction::branch(OpCode::Brtrue, 3).is_conditional_branch());
        assert!(Instruction::br(3).is_terminal());
        assert!(Instruction::simple(OpCode::Ret).is_terminal());
        assert!(!Instruction::with_token(OpCode::Call, Token::new(0x0600_0001)).is_terminal());
        assert!(Instruction::switch(vec![1, 2]).is_branch());
        assert!(Instruction::ldstr("x").is_load_constant());
        assert_eq!(Instruction::ldc_i4(-7).get_ldc_i32(), Some(-7));
        assert_eq!(Instruction::ldc_i8(-7).get_ldc_i32(), None);
        assert_eq!(Instruction::stloc(2).local_index(), Some(2));
        assert_eq!(Instruction::ldarg(1).argument_index(), Some(1));
    }

    #[test]
    fn test_call_stack_behavior() {
        let owner = Token::new(0x0200_0002);
        let mut store = MetadataStore::new();
        store.add_method(MethodDesc::new(
            Token::new(0x0600_0001),
            "Add",
            owner,
            MethodSignature::new_instance(
                ElementType::Class(owner),
                vec![ElementType::I4, ElementType::I4],
                ElementType::I4,
            ),
        ));
        store.add_method(MethodDesc::new(
            Token::new(0x0600_0002),
            ".ctor",
            owner,
            MethodSignature::new_instance(ElementType::Class(owner), vec![ElementType::I4], ElementType::Void),
        ));

        let call = Instruction::with_token(OpCode::Callvirt, Token::new(0x0600_0001));
        assert_eq!(call.stack_behavior(&store), Some(StackBehavior::new(3, 1)));

        let ctor = Instruction::with_token(OpCode::Newobj, Token::new(0x0600_0002));
        assert_eq!(ctor.stack_behavior(&store), Some(StackBehavior::new(1, 1)));

        let unknown = Instruction::with_token(OpCode::Call, Token::new(0x0A00_0009));
        assert_eq!(unknown.stack_behavior(&store), None);
        assert_eq!(Instruction::ldc_i4(1).stack_behavior(&store), Some(StackBehavior::new(0, 1)));
    }

    #[test]
    fn test_instruction_display() {
        assert_eq!(Instruction::ldc_i4(5).to_string(), "ldc.i4 5");
        assert_eq!(Instruction::pop().to_string(), "pop");
        assert_eq!(Instruction::switch(vec![1, 12]).to_string(), "switch (IL_0001, IL_0012)");
        assert_eq!(Instruction::ldloc(3).to_string(), "ldloc V_3");
    }
}
