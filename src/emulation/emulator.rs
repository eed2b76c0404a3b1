//! Symbolic execution of straight-line CIL.
//!
//! [`InstructionEmulator`] runs the non-terminal instructions of a block over abstract locals,
//! arguments and an abstract evaluation stack. Calls and field loads are never interpreted:
//! only their stack shape and result type are modeled, from metadata obtained through the
//! [`MetadataResolver`].
//!
//! # Per-method templates
//!
//! Initial local and argument states depend only on the method signature, so they are built
//! once per method and cloned for every block. [`InstructionEmulator::initialize`] rebuilds
//! them when a different method is passed in.
//!
//! # Example
//!
//! ```rust
//! use dotflow::{
//!     assembly::Instruction,
//!     emulation::{InstructionEmulator, Value},
//!     metadata::{
//!         method::{MethodDesc, MethodSignature},
//!         resolver::MetadataStore,
//!         token::Token,
//!         typesystem::ElementType,
//!     },
//! };
//!
//! let store = MetadataStore::new();
//! let method = MethodDesc::new(
//!     Token::new(0x0600_0001),
//!     "Run",
//!     Token::new(0x0200_0002),
//!     MethodSignature::new_static(vec![], ElementType::Void),
//! )
//! .with_locals(vec![ElementType::I4]);
//!
//! let mut emulator = InstructionEmulator::new(&store);
//! emulator.initialize(&method, true);
//! emulator.emulate(&Instruction::ldloc(0))?;
//! assert_eq!(emulator.pop().known_i32(), Some(0));
//! # Ok::<(), dotflow::Error>(())
//! ```

use std::collections::HashSet;

use log::trace;

use crate::{
    assembly::{Instruction, InstructionCategory, OpCode, Operand},
    emulation::{
        ops::{self, Comparison},
        stack::ValueStack,
        value::{Bool3, Int32Value, Int64Value, OriginId, Real8Value, Value},
    },
    metadata::{method::MethodDesc, resolver::MetadataResolver, token::Token, typesystem::ElementType},
    Error, Result,
};

/// Returns a value of `ty` about which nothing is known beyond its type.
#[must_use]
pub fn unknown_of(ty: &ElementType) -> Value {
    match ty {
        ElementType::Boolean => Int32Value::unknown_bool().into(),
        ElementType::U1 => Int32Value::unknown_u8().into(),
        ElementType::Char | ElementType::U2 => Int32Value::unknown_u16().into(),
        ElementType::I1 | ElementType::I2 | ElementType::I4 | ElementType::U4 => Int32Value::unknown().into(),
        ElementType::I8 | ElementType::U8 => Int64Value::unknown().into(),
        ElementType::R4 | ElementType::R8 => Real8Value::unknown().into(),
        _ => Value::Unknown,
    }
}

/// Returns the default value a zero-initialized slot of `ty` holds.
#[must_use]
pub fn zero_of(ty: &ElementType) -> Value {
    match ty {
        ty if ty.is_int32_on_stack() => Int32Value::new(0).into(),
        ty if ty.is_int64() => Int64Value::new(0).into(),
        ty if ty.is_float() => Real8Value::new(0.0).into(),
        ty if ty.is_reference_type() => Value::Null,
        _ => Value::Unknown,
    }
}

/// Converts `value` to what a slot of type `ty` holds after a store.
#[must_use]
pub fn truncate_to(value: Value, ty: &ElementType) -> Value {
    match (ty, &value) {
        (ElementType::Boolean | ElementType::U1, Value::Int32(v)) => v.conv_u1().into(),
        (ElementType::I1, Value::Int32(v)) => v.conv_i1().into(),
        (ElementType::I2, Value::Int32(v)) => v.conv_i2().into(),
        (ElementType::Char | ElementType::U2, Value::Int32(v)) => v.conv_u2().into(),
        (ElementType::I4 | ElementType::U4, Value::Int32(_))
        | (ElementType::I8 | ElementType::U8, Value::Int64(_))
        | (ElementType::R8, Value::Real8(_)) => value,
        (ElementType::R4, Value::Real8(v)) => v.conv_r4().into(),
        (ty, Value::Null | Value::Object(_) | Value::String(_) | Value::Boxed(_)) if ty.is_reference_type() => value,
        (ty, _) => unknown_of(ty),
    }
}

/// Abstract interpreter for the non-terminal instructions of one block.
pub struct InstructionEmulator<'a> {
    resolver: &'a dyn MetadataResolver,
    /// Method the templates were built for
    method: Option<Token>,
    local_types: Vec<ElementType>,
    arg_types: Vec<ElementType>,
    unknown_locals: Vec<Value>,
    zeroed_locals: Vec<Value>,
    unknown_args: Vec<Value>,
    /// Slots whose address escapes somewhere in the method; never tracked
    address_taken_locals: HashSet<u16>,
    address_taken_args: HashSet<u16>,
    locals: Vec<Value>,
    args: Vec<Value>,
    stack: ValueStack,
    next_origin: u32,
}

impl<'a> InstructionEmulator<'a> {
    /// Creates an emulator resolving operands through `resolver`.
    #[must_use]
    pub fn new(resolver: &'a dyn MetadataResolver) -> Self {
        InstructionEmulator {
            resolver,
            method: None,
            local_types: Vec::new(),
            arg_types: Vec::new(),
            unknown_locals: Vec::new(),
            zeroed_locals: Vec::new(),
            unknown_args: Vec::new(),
            address_taken_locals: HashSet::new(),
            address_taken_args: HashSet::new(),
            locals: Vec::new(),
            args: Vec::new(),
            stack: ValueStack::new(),
            next_origin: 0,
        }
    }

    /// The resolver used for call and field operands.
    #[must_use]
    pub fn resolver(&self) -> &'a dyn MetadataResolver {
        self.resolver
    }

    /// Resets the state for emulating one block of `method`.
    ///
    /// Locals start out zeroed only when `is_entry_block` is set and the method header asks
    /// the runtime to zero-initialize them. Any other block can be reached with arbitrary
    /// local values.
    pub fn initialize(&mut self, method: &MethodDesc, is_entry_block: bool) {
        if self.method != Some(method.token) {
            self.build_templates(method);
        }

        self.locals = if is_entry_block && method.init_locals {
            self.zeroed_locals.clone()
        } else {
            self.unknown_locals.clone()
        };
        self.args = self.unknown_args.clone();
        self.stack.clear();
    }

    fn build_templates(&mut self, method: &MethodDesc) {
        self.method = Some(method.token);
        self.local_types = method.locals.clone();
        self.arg_types = method.signature.arg_types();
        self.unknown_locals = self.local_types.iter().map(unknown_of).collect();
        self.zeroed_locals = self.local_types.iter().map(zero_of).collect();
        self.unknown_args = self.arg_types.iter().map(unknown_of).collect();

        self.address_taken_locals.clear();
        self.address_taken_args.clear();
    }

    /// Marks every local and argument whose address `code` takes as untracked.
    ///
    /// `code` must cover every block of the method as it currently stands. Replaces the
    /// result of any previous scan.
    pub fn track_address_taken<'i>(&mut self, method: &MethodDesc, code: impl IntoIterator<Item = &'i Instruction>) {
        if self.method != Some(method.token) {
            self.build_templates(method);
        }
        self.address_taken_locals.clear();
        self.address_taken_args.clear();
        for instruction in code {
            match (instruction.opcode, &instruction.operand) {
                (OpCode::Ldloca, Operand::Local(index)) => {
                    self.address_taken_locals.insert(*index);
                }
                (OpCode::Ldarga, Operand::Argument(index)) => {
                    self.address_taken_args.insert(*index);
                }
                _ => {}
            }
        }
    }

    /// Current value of local `index`.
    #[must_use]
    pub fn get_local(&self, index: u16) -> Option<&Value> {
        self.locals.get(usize::from(index))
    }

    /// Current value of argument `index`.
    #[must_use]
    pub fn get_arg(&self, index: u16) -> Option<&Value> {
        self.args.get(usize::from(index))
    }

    /// Overwrites local `index`.
    pub fn set_local(&mut self, index: u16, value: Value) -> Result<()> {
        let slot = usize::from(index);
        let ty = self
            .local_types
            .get(slot)
            .ok_or_else(|| malformed_error!("Local index {} out of range", index))?;
        let value = if self.address_taken_locals.contains(&index) {
            unknown_of(ty)
        } else {
            truncate_to(value, ty)
        };
        self.locals[slot] = value;
        Ok(())
    }

    /// Overwrites argument `index`.
    pub fn set_arg(&mut self, index: u16, value: Value) -> Result<()> {
        let slot = usize::from(index);
        let ty = self
            .arg_types
            .get(slot)
            .ok_or_else(|| malformed_error!("Argument index {} out of range", index))?;
        let value = if self.address_taken_args.contains(&index) {
            unknown_of(ty)
        } else {
            truncate_to(value, ty)
        };
        self.args[slot] = value;
        Ok(())
    }

    /// The evaluation stack.
    #[must_use]
    pub fn stack(&self) -> &ValueStack {
        &self.stack
    }

    /// Pushes a value onto the evaluation stack.
    pub fn push(&mut self, value: Value) {
        let value = self.tag(value);
        self.stack.push(value);
    }

    /// Pops the top of the evaluation stack.
    pub fn pop(&mut self) -> Value {
        self.stack.pop()
    }

    /// Returns the top of the evaluation stack.
    #[must_use]
    pub fn peek(&self) -> Value {
        self.stack.peek()
    }

    fn fresh_origin(&mut self) -> OriginId {
        let origin = OriginId(self.next_origin);
        self.next_origin = self.next_origin.wrapping_add(1);
        origin
    }

    /// Gives a partially-known integer an origin so that its copies can be recognized.
    fn tag(&mut self, value: Value) -> Value {
        match value {
            Value::Int32(v) if v.origin.is_none() && !v.all_bits_valid() => {
                Value::Int32(v.with_origin(self.fresh_origin()))
            }
            Value::Int64(v) if v.origin.is_none() && !v.all_bits_valid() => {
                Value::Int64(v.with_origin(self.fresh_origin()))
            }
            other => other,
        }
    }

    fn load_local(&mut self, index: u16) -> Result<Value> {
        let slot = usize::from(index);
        let ty = self
            .local_types
            .get(slot)
            .ok_or_else(|| malformed_error!("Local index {} out of range", index))?;
        if self.address_taken_locals.contains(&index) {
            return Ok(unknown_of(ty));
        }
        // Tag the slot itself so every load of it yields the same origin
        let value = self.tag(self.locals[slot].clone());
        self.locals[slot] = value.clone();
        Ok(value)
    }

    fn load_arg(&mut self, index: u16) -> Result<Value> {
        let slot = usize::from(index);
        let ty = self
            .arg_types
            .get(slot)
            .ok_or_else(|| malformed_error!("Argument index {} out of range", index))?;
        if self.address_taken_args.contains(&index) {
            return Ok(unknown_of(ty));
        }
        let value = self.tag(self.args[slot].clone());
        self.args[slot] = value.clone();
        Ok(value)
    }

    fn token_operand(instruction: &Instruction) -> Result<Token> {
        instruction
            .token()
            .ok_or(Error::UnsupportedOperand("expected a metadata token"))
    }

    fn field_type(&self, instruction: &Instruction) -> Result<ElementType> {
        let token = Self::token_operand(instruction)?;
        self.resolver
            .field(token)
            .map(|field| field.field_type.clone())
            .ok_or(Error::UnresolvedOperand(token))
    }

    /// Emulates one instruction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnresolvedOperand`] for a call or field operand the resolver does not
    /// know, and [`Error::Malformed`] or [`Error::UnsupportedOperand`] for operands that do
    /// not fit the opcode. The state is unspecified after an error.
    pub fn emulate(&mut self, instruction: &Instruction) -> Result<()> {
        trace!("emulate {instruction}");

        match (instruction.opcode, &instruction.operand) {
            (
                OpCode::Nop
                | OpCode::Break
                | OpCode::Unaligned
                | OpCode::Volatile
                | OpCode::Tail
                | OpCode::Constrained
                | OpCode::Readonly,
                _,
            ) => {}

            (OpCode::Ldarg, Operand::Argument(index)) => {
                let value = self.load_arg(*index)?;
                self.stack.push(value);
            }
            (OpCode::Ldloc, Operand::Local(index)) => {
                let value = self.load_local(*index)?;
                self.stack.push(value);
            }
            (OpCode::Ldarga, Operand::Argument(index)) => {
                self.address_taken_args.insert(*index);
                let ty = self
                    .arg_types
                    .get(usize::from(*index))
                    .ok_or_else(|| malformed_error!("Argument index {} out of range", index))?;
                self.args[usize::from(*index)] = unknown_of(ty);
                self.stack.push(Value::Unknown);
            }
            (OpCode::Ldloca, Operand::Local(index)) => {
                self.address_taken_locals.insert(*index);
                let ty = self
                    .local_types
                    .get(usize::from(*index))
                    .ok_or_else(|| malformed_error!("Local index {} out of range", index))?;
                self.locals[usize::from(*index)] = unknown_of(ty);
                self.stack.push(Value::Unknown);
            }
            (OpCode::Starg, Operand::Argument(index)) => {
                let value = self.stack.pop();
                self.set_arg(*index, value)?;
            }
            (OpCode::Stloc, Operand::Local(index)) => {
                let value = self.stack.pop();
                self.set_local(*index, value)?;
            }

            (OpCode::Ldnull, _) => self.stack.push(Value::Null),
            (OpCode::LdcI4, Operand::Int32(value)) => self.stack.push(Int32Value::new(*value).into()),
            (OpCode::LdcI8, Operand::Int64(value)) => self.stack.push(Int64Value::new(*value).into()),
            (OpCode::LdcR4, Operand::Float32(value)) => {
                self.stack.push(Real8Value::new(f64::from(*value)).into());
            }
            (OpCode::LdcR8, Operand::Float64(value)) => self.stack.push(Real8Value::new(*value).into()),
            (OpCode::Ldstr, Operand::String(value)) => self.stack.push(Value::String(value.clone())),

            (OpCode::Dup, _) => {
                let value = self.stack.pop();
                let value = self.tag(value);
                self.stack.push(value);
                self.stack.dup_top();
            }
            (OpCode::Pop, _) => {
                self.stack.pop();
            }

            (
                OpCode::Add
                | OpCode::Sub
                | OpCode::Mul
                | OpCode::Div
                | OpCode::DivUn
                | OpCode::Rem
                | OpCode::RemUn
                | OpCode::And
                | OpCode::Or
                | OpCode::Xor
                | OpCode::Shl
                | OpCode::Shr
                | OpCode::ShrUn
                | OpCode::AddOvf
                | OpCode::AddOvfUn
                | OpCode::SubOvf
                | OpCode::SubOvfUn
                | OpCode::MulOvf
                | OpCode::MulOvfUn,
                _,
            ) => {
                let b = self.stack.pop();
                let a = self.stack.pop();
                self.push(ops::binary(instruction.opcode, &a, &b));
            }
            (OpCode::Neg | OpCode::Not | OpCode::Ckfinite, _) => {
                let value = self.stack.pop();
                self.push(ops::unary(instruction.opcode, &value));
            }
            (OpCode::Ceq | OpCode::Cgt | OpCode::CgtUn | OpCode::Clt | OpCode::CltUn, _) => {
                let b = self.stack.pop();
                let a = self.stack.pop();
                let result = Comparison::from_opcode(instruction.opcode)
                    .map_or(Bool3::Unknown, |cmp| ops::compare(cmp, &a, &b));
                self.push(Int32Value::from_bool3(result).into());
            }
            (opcode, _) if opcode.category() == InstructionCategory::Conversion => {
                let value = self.stack.pop();
                self.push(ops::convert(opcode, &value));
            }

            (OpCode::Call | OpCode::Callvirt, _) => {
                let token = Self::token_operand(instruction)?;
                let method = self.resolver.method(token).ok_or(Error::UnresolvedOperand(token))?;
                self.stack.pop_n(method.signature.arg_count());
                if method.signature.returns_value() {
                    self.push(unknown_of(&method.signature.return_type));
                }
            }
            (OpCode::Newobj, _) => {
                let token = Self::token_operand(instruction)?;
                let method = self.resolver.method(token).ok_or(Error::UnresolvedOperand(token))?;
                self.stack.pop_n(method.signature.params.len());
                match &method.signature.this_type {
                    Some(this_type) if this_type.is_reference_type() => self.stack.push(Value::Object(None)),
                    _ => self.stack.push(Value::Unknown),
                }
            }
            (OpCode::Ldfld, _) => {
                let ty = self.field_type(instruction)?;
                self.stack.pop();
                self.push(unknown_of(&ty));
            }
            (OpCode::Ldsfld, _) => {
                let ty = self.field_type(instruction)?;
                self.push(unknown_of(&ty));
            }
            (OpCode::Box, _) => {
                let value = self.stack.pop();
                self.stack.push(Value::Boxed(Box::new(value)));
            }
            (OpCode::Newarr, _) => {
                self.stack.pop();
                self.stack.push(Value::Object(None));
            }
            (OpCode::LdindI1 | OpCode::LdindI2 | OpCode::LdindI4 | OpCode::LdindU4, _) => {
                self.stack.pop();
                self.push(Int32Value::unknown().into());
            }
            (OpCode::LdindU1, _) => {
                self.stack.pop();
                self.push(Int32Value::unknown_u8().into());
            }
            (OpCode::LdindU2, _) => {
                self.stack.pop();
                self.push(Int32Value::unknown_u16().into());
            }
            (OpCode::LdindI8, _) => {
                self.stack.pop();
                self.push(Int64Value::unknown().into());
            }
            (OpCode::LdelemI1 | OpCode::LdelemI2 | OpCode::LdelemI4 | OpCode::LdelemU4, _) => {
                self.stack.pop_n(2);
                self.push(Int32Value::unknown().into());
            }
            (OpCode::LdelemU1, _) => {
                self.stack.pop_n(2);
                self.push(Int32Value::unknown_u8().into());
            }
            (OpCode::LdelemU2, _) => {
                self.stack.pop_n(2);
                self.push(Int32Value::unknown_u16().into());
            }
            (OpCode::LdelemI8, _) => {
                self.stack.pop_n(2);
                self.push(Int64Value::unknown().into());
            }
            (OpCode::Sizeof, _) => self.push(Int32Value::unknown().into()),

            (opcode, _) => match instruction.stack_behavior(self.resolver) {
                Some(behavior) => {
                    self.stack.pop_n(usize::from(behavior.pops));
                    self.stack.push_unknown(usize::from(behavior.pushes));
                }
                None => {
                    trace!("unknown stack effect of {opcode}, clearing");
                    self.stack.clear();
                }
            },
        }

        Ok(())
    }

    /// Emulates a run of instructions, stopping at the first error.
    ///
    /// # Errors
    ///
    /// See [`InstructionEmulator::emulate`].
    pub fn emulate_all<'i>(&mut self, instructions: impl IntoIterator<Item = &'i Instruction>) -> Result<()> {
        for instruction in instructions {
            self.emulate(instruction)?;
        }
        Ok(())
    }
}
