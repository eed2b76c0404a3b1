//! The canonical CIL opcode set.
//!
//! Short branch forms (`br.s`), short operand forms (`ldloc.s`) and macro forms (`ldloc.0`,
//! `ldc.i4.m1`) are folded into their long equivalents by the frontend before a body reaches
//! the simplifier. Every remaining opcode is a variant of [`OpCode`], and the static tables here
//! give its control flow kind, category and stack behavior.

use strum::{Display, EnumCount, EnumIter, IntoStaticStr};

use crate::assembly::instruction::{FlowType, InstructionCategory, StackBehavior};

/// A canonical (macro-expanded) CIL opcode.
///
/// The `Display` form is the CIL mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumCount, IntoStaticStr)]
#[allow(missing_docs)]
pub enum OpCode {
    #[strum(serialize = "nop")]
    Nop,
    #[strum(serialize = "break")]
    Break,
    #[strum(serialize = "ldarg")]
    Ldarg,
    #[strum(serialize = "ldarga")]
    Ldarga,
    #[strum(serialize = "starg")]
    Starg,
    #[strum(serialize = "ldloc")]
    Ldloc,
    #[strum(serialize = "ldloca")]
    Ldloca,
    #[strum(serialize = "stloc")]
    Stloc,
    #[strum(serialize = "ldnull")]
    Ldnull,
    #[strum(serialize = "ldc.i4")]
    LdcI4,
    #[strum(serialize = "ldc.i8")]
    LdcI8,
    #[strum(serialize = "ldc.r4")]
    LdcR4,
    #[strum(serialize = "ldc.r8")]
    LdcR8,
    #[strum(serialize = "dup")]
    Dup,
    #[strum(serialize = "pop")]
    Pop,
    #[strum(serialize = "jmp")]
    Jmp,
    #[strum(serialize = "call")]
    Call,
    #[strum(serialize = "calli")]
    Calli,
    #[strum(serialize = "ret")]
    Ret,
    #[strum(serialize = "br")]
    Br,
    #[strum(serialize = "brfalse")]
    Brfalse,
    #[strum(serialize = "brtrue")]
    Brtrue,
    #[strum(serialize = "beq")]
    Beq,
    #[strum(serialize = "bge")]
    Bge,
    #[strum(serialize = "bgt")]
    Bgt,
    #[strum(serialize = "ble")]
    Ble,
    #[strum(serialize = "blt")]
    Blt,
    #[strum(serialize = "bne.un")]
    BneUn,
    #[strum(serialize = "bge.un")]
    BgeUn,
    #[strum(serialize = "bgt.un")]
    BgtUn,
    #[strum(serialize = "ble.un")]
    BleUn,
    #[strum(serialize = "blt.un")]
    BltUn,
    #[strum(serialize = "switch")]
    Switch,
    #[strum(serialize = "ldind.i1")]
    LdindI1,
    #[strum(serialize = "ldind.u1")]
    LdindU1,
    #[strum(serialize = "ldind.i2")]
    LdindI2,
    #[strum(serialize = "ldind.u2")]
    LdindU2,
    #[strum(serialize = "ldind.i4")]
    LdindI4,
    #[strum(serialize = "ldind.u4")]
    LdindU4,
    #[strum(serialize = "ldind.i8")]
    LdindI8,
    #[strum(serialize = "ldind.i")]
    LdindI,
    #[strum(serialize = "ldind.r4")]
    LdindR4,
    #[strum(serialize = "ldind.r8")]
    LdindR8,
    #[strum(serialize = "ldind.ref")]
    LdindRef,
    #[strum(serialize = "stind.ref")]
    StindRef,
    #[strum(serialize = "stind.i1")]
    StindI1,
    #[strum(serialize = "stind.i2")]
    StindI2,
    #[strum(serialize = "stind.i4")]
    StindI4,
    #[strum(serialize = "stind.i8")]
    StindI8,
    #[strum(serialize = "stind.r4")]
    StindR4,
    #[strum(serialize = "stind.r8")]
    StindR8,
    #[strum(serialize = "stind.i")]
    StindI,
    #[strum(serialize = "add")]
    Add,
    #[strum(serialize = "sub")]
    Sub,
    #[strum(serialize = "mul")]
    Mul,
    #[strum(serialize = "div")]
    Div,
    #[strum(serialize = "div.un")]
    DivUn,
    #[strum(serialize = "rem")]
    Rem,
    #[strum(serialize = "rem.un")]
    RemUn,
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "or")]
    Or,
    #[strum(serialize = "xor")]
    Xor,
    #[strum(serialize = "shl")]
    Shl,
    #[strum(serialize = "shr")]
    Shr,
    #[strum(serialize = "shr.un")]
    ShrUn,
    #[strum(serialize = "neg")]
    Neg,
    #[strum(serialize = "not")]
    Not,
    #[strum(serialize = "conv.i1")]
    ConvI1,
    #[strum(serialize = "conv.i2")]
    ConvI2,
    #[strum(serialize = "conv.i4")]
    ConvI4,
    #[strum(serialize = "conv.i8")]
    ConvI8,
    #[strum(serialize = "conv.r4")]
    ConvR4,
    #[strum(serialize = "conv.r8")]
    ConvR8,
    #[strum(serialize = "conv.u4")]
    ConvU4,
    #[strum(serialize = "conv.u8")]
    ConvU8,
    #[strum(serialize = "conv.u2")]
    ConvU2,
    #[strum(serialize = "conv.u1")]
    ConvU1,
    #[strum(serialize = "conv.i")]
    ConvI,
    #[strum(serialize = "conv.u")]
    ConvU,
    #[strum(serialize = "conv.r.un")]
    ConvRUn,
    #[strum(serialize = "conv.ovf.i1")]
    ConvOvfI1,
    #[strum(serialize = "conv.ovf.i2")]
    ConvOvfI2,
    #[strum(serialize = "conv.ovf.i4")]
    ConvOvfI4,
    #[strum(serialize = "conv.ovf.i8")]
    ConvOvfI8,
    #[strum(serialize = "conv.ovf.u1")]
    ConvOvfU1,
    #[strum(serialize = "conv.ovf.u2")]
    ConvOvfU2,
    #[strum(serialize = "conv.ovf.u4")]
    ConvOvfU4,
    #[strum(serialize = "conv.ovf.u8")]
    ConvOvfU8,
    #[strum(serialize = "conv.ovf.i")]
    ConvOvfI,
    #[strum(serialize = "conv.ovf.u")]
    ConvOvfU,
    #[strum(serialize = "conv.ovf.i1.un")]
    ConvOvfI1Un,
    #[strum(serialize = "conv.ovf.i2.un")]
    ConvOvfI2Un,
    #[strum(serialize = "conv.ovf.i4.un")]
    ConvOvfI4Un,
    #[strum(serialize = "conv.ovf.i8.un")]
    ConvOvfI8Un,
    #[strum(serialize = "conv.ovf.u1.un")]
    ConvOvfU1Un,
    #[strum(serialize = "conv.ovf.u2.un")]
    ConvOvfU2Un,
    #[strum(serialize = "conv.ovf.u4.un")]
    ConvOvfU4Un,
    #[strum(serialize = "conv.ovf.u8.un")]
    ConvOvfU8Un,
    #[strum(serialize = "conv.ovf.i.un")]
    ConvOvfIUn,
    #[strum(serialize = "conv.ovf.u.un")]
    ConvOvfUUn,
    #[strum(serialize = "callvirt")]
    Callvirt,
    #[strum(serialize = "cpobj")]
    Cpobj,
    #[strum(serialize = "ldobj")]
    Ldobj,
    #[strum(serialize = "ldstr")]
    Ldstr,
    #[strum(serialize = "newobj")]
    Newobj,
    #[strum(serialize = "castclass")]
    Castclass,
    #[strum(serialize = "isinst")]
    Isinst,
    #[strum(serialize = "unbox")]
    Unbox,
    #[strum(serialize = "throw")]
    Throw,
    #[strum(serialize = "ldfld")]
    Ldfld,
    #[strum(serialize = "ldflda")]
    Ldflda,
    #[strum(serialize = "stfld")]
    Stfld,
    #[strum(serialize = "ldsfld")]
    Ldsfld,
    #[strum(serialize = "ldsflda")]
    Ldsflda,
    #[strum(serialize = "stsfld")]
    Stsfld,
    #[strum(serialize = "stobj")]
    Stobj,
    #[strum(serialize = "box")]
    Box,
    #[strum(serialize = "newarr")]
    Newarr,
    #[strum(serialize = "ldlen")]
    Ldlen,
    #[strum(serialize = "ldelema")]
    Ldelema,
    #[strum(serialize = "ldelem.i1")]
    LdelemI1,
    #[strum(serialize = "ldelem.u1")]
    LdelemU1,
    #[strum(serialize = "ldelem.i2")]
    LdelemI2,
    #[strum(serialize = "ldelem.u2")]
    LdelemU2,
    #[strum(serialize = "ldelem.i4")]
    LdelemI4,
    #[strum(serialize = "ldelem.u4")]
    LdelemU4,
    #[strum(serialize = "ldelem.i8")]
    LdelemI8,
    #[strum(serialize = "ldelem.i")]
    LdelemI,
    #[strum(serialize = "ldelem.r4")]
    LdelemR4,
    #[strum(serialize = "ldelem.r8")]
    LdelemR8,
    #[strum(serialize = "ldelem.ref")]
    LdelemRef,
    #[strum(serialize = "ldelem")]
    Ldelem,
    #[strum(serialize = "stelem.i")]
    StelemI,
    #[strum(serialize = "stelem.i1")]
    StelemI1,
    #[strum(serialize = "stelem.i2")]
    StelemI2,
    #[strum(serialize = "stelem.i4")]
    StelemI4,
    #[strum(serialize = "stelem.i8")]
    StelemI8,
    #[strum(serialize = "stelem.r4")]
    StelemR4,
    #[strum(serialize = "stelem.r8")]
    StelemR8,
    #[strum(serialize = "stelem.ref")]
    StelemRef,
    #[strum(serialize = "stelem")]
    Stelem,
    #[strum(serialize = "unbox.any")]
    UnboxAny,
    #[strum(serialize = "refanyval")]
    Refanyval,
    #[strum(serialize = "ckfinite")]
    Ckfinite,
    #[strum(serialize = "mkrefany")]
    Mkrefany,
    #[strum(serialize = "ldtoken")]
    Ldtoken,
    #[strum(serialize = "add.ovf")]
    AddOvf,
    #[strum(serialize = "add.ovf.un")]
    AddOvfUn,
    #[strum(serialize = "mul.ovf")]
    MulOvf,
    #[strum(serialize = "mul.ovf.un")]
    MulOvfUn,
    #[strum(serialize = "sub.ovf")]
    SubOvf,
    #[strum(serialize = "sub.ovf.un")]
    SubOvfUn,
    #[strum(serialize = "endfinally")]
    Endfinally,
    #[strum(serialize = "leave")]
    Leave,
    #[strum(serialize = "arglist")]
    Arglist,
    #[strum(serialize = "ceq")]
    Ceq,
    #[strum(serialize = "cgt")]
    Cgt,
    #[strum(serialize = "cgt.un")]
    CgtUn,
    #[strum(serialize = "clt")]
    Clt,
    #[strum(serialize = "clt.un")]
    CltUn,
    #[strum(serialize = "ldftn")]
    Ldftn,
    #[strum(serialize = "ldvirtftn")]
    Ldvirtftn,
    #[strum(serialize = "localloc")]
    Localloc,
    #[strum(serialize = "endfilter")]
    Endfilter,
    #[strum(serialize = "unaligned.")]
    Unaligned,
    #[strum(serialize = "volatile.")]
    Volatile,
    #[strum(serialize = "tail.")]
    Tail,
    #[strum(serialize = "constrained.")]
    Constrained,
    #[strum(serialize = "readonly.")]
    Readonly,
    #[strum(serialize = "initobj")]
    Initobj,
    #[strum(serialize = "cpblk")]
    Cpblk,
    #[strum(serialize = "initblk")]
    Initblk,
    #[strum(serialize = "rethrow")]
    Rethrow,
    #[strum(serialize = "sizeof")]
    Sizeof,
    #[strum(serialize = "refanytype")]
    Refanytype,
}

impl OpCode {
    /// Returns the CIL mnemonic of this opcode.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }

    /// How this opcode affects control flow.
    #[must_use]
    pub fn flow_type(self) -> FlowType {
        match self {
            OpCode::Br => FlowType::UnconditionalBranch,
            OpCode::Brfalse
            | OpCode::Brtrue
            | OpCode::Beq
            | OpCode::Bge
            | OpCode::Bgt
            | OpCode::Ble
            | OpCode::Blt
            | OpCode::BneUn
            | OpCode::BgeUn
            | OpCode::BgtUn
            | OpCode::BleUn
            | OpCode::BltUn => FlowType::ConditionalBranch,
            OpCode::Switch => FlowType::Switch,
            OpCode::Ret | OpCode::Jmp => FlowType::Return,
            OpCode::Throw | OpCode::Rethrow => FlowType::Throw,
            OpCode::Endfinally | OpCode::Endfilter => FlowType::EndFinally,
            OpCode::Leave => FlowType::Leave,
            OpCode::Call | OpCode::Callvirt | OpCode::Calli | OpCode::Newobj => FlowType::Call,
            _ => FlowType::Sequential,
        }
    }

    /// Functional category of this opcode.
    #[must_use]
    pub fn category(self) -> InstructionCategory {
        match self {
            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::DivUn
            | OpCode::Rem
            | OpCode::RemUn
            | OpCode::Neg
            | OpCode::AddOvf
            | OpCode::AddOvfUn
            | OpCode::MulOvf
            | OpCode::MulOvfUn
            | OpCode::SubOvf
            | OpCode::SubOvfUn
            | OpCode::Ckfinite => InstructionCategory::Arithmetic,
            OpCode::And | OpCode::Or | OpCode::Xor | OpCode::Not | OpCode::Shl | OpCode::Shr | OpCode::ShrUn => {
                InstructionCategory::BitwiseLogical
            }
            OpCode::Ceq | OpCode::Cgt | OpCode::CgtUn | OpCode::Clt | OpCode::CltUn => {
                InstructionCategory::Comparison
            }
            OpCode::ConvI1
            | OpCode::ConvI2
            | OpCode::ConvI4
            | OpCode::ConvI8
            | OpCode::ConvR4
            | OpCode::ConvR8
            | OpCode::ConvU4
            | OpCode::ConvU8
            | OpCode::ConvU2
            | OpCode::ConvU1
            | OpCode::ConvI
            | OpCode::ConvU
            | OpCode::ConvRUn
            | OpCode::ConvOvfI1
            | OpCode::ConvOvfI2
            | OpCode::ConvOvfI4
            | OpCode::ConvOvfI8
            | OpCode::ConvOvfU1
            | OpCode::ConvOvfU2
            | OpCode::ConvOvfU4
            | OpCode::ConvOvfU8
            | OpCode::ConvOvfI
            | OpCode::ConvOvfU
            | OpCode::ConvOvfI1Un
            | OpCode::ConvOvfI2Un
            | OpCode::ConvOvfI4Un
            | OpCode::ConvOvfI8Un
            | OpCode::ConvOvfU1Un
            | OpCode::ConvOvfU2Un
            | OpCode::ConvOvfU4Un
            | OpCode::ConvOvfU8Un
            | OpCode::ConvOvfIUn
            | OpCode::ConvOvfUUn => InstructionCategory::Conversion,
            OpCode::Ldarg
            | OpCode::Ldarga
            | OpCode::Starg
            | OpCode::Ldloc
            | OpCode::Ldloca
            | OpCode::Stloc
            | OpCode::Ldnull
            | OpCode::LdcI4
            | OpCode::LdcI8
            | OpCode::LdcR4
            | OpCode::LdcR8
            | OpCode::LdindI1
            | OpCode::LdindU1
            | OpCode::LdindI2
            | OpCode::LdindU2
            | OpCode::LdindI4
            | OpCode::LdindU4
            | OpCode::LdindI8
            | OpCode::LdindI
            | OpCode::LdindR4
            | OpCode::LdindR8
            | OpCode::LdindRef
            | OpCode::StindRef
            | OpCode::StindI1
            | OpCode::StindI2
            | OpCode::StindI4
            | OpCode::StindI8
            | OpCode::StindR4
            | OpCode::StindR8
            | OpCode::StindI
            | OpCode::Ldfld
            | OpCode::Ldflda
            | OpCode::Stfld
            | OpCode::Ldsfld
            | OpCode::Ldsflda
            | OpCode::Stsfld
            | OpCode::Ldstr => InstructionCategory::LoadStore,
            OpCode::Unaligned | OpCode::Volatile | OpCode::Tail | OpCode::Constrained | OpCode::Readonly => {
                InstructionCategory::Prefix
            }
            OpCode::Nop | OpCode::Break | OpCode::Dup | OpCode::Pop => InstructionCategory::Misc,
            _ => match self.flow_type() {
                FlowType::Sequential | FlowType::Call => InstructionCategory::ObjectModel,
                _ => InstructionCategory::ControlFlow,
            },
        }
    }

    /// Static stack effect of this opcode.
    ///
    /// Returns `None` where the effect depends on a resolved signature (calls) or where the
    /// opcode empties the evaluation stack (`leave`, `endfinally`, `ret`, `jmp`).
    #[must_use]
    pub fn stack_behavior(self) -> Option<StackBehavior> {
        let (pops, pushes) = match self {
            OpCode::Call
            | OpCode::Callvirt
            | OpCode::Calli
            | OpCode::Newobj
            | OpCode::Ret
            | OpCode::Jmp
            | OpCode::Leave
            | OpCode::Endfinally => return None,
            OpCode::Nop
            | OpCode::Break
            | OpCode::Br
            | OpCode::Rethrow
            | OpCode::Unaligned
            | OpCode::Volatile
            | OpCode::Tail
            | OpCode::Constrained
            | OpCode::Readonly => (0, 0),
            OpCode::Ldarg
            | OpCode::Ldarga
            | OpCode::Ldloc
            | OpCode::Ldloca
            | OpCode::Ldnull
            | OpCode::LdcI4
            | OpCode::LdcI8
            | OpCode::LdcR4
            | OpCode::LdcR8
            | OpCode::Ldstr
            | OpCode::Ldsfld
            | OpCode::Ldsflda
            | OpCode::Ldtoken
            | OpCode::Arglist
            | OpCode::Ldftn
            | OpCode::Sizeof => (0, 1),
            OpCode::Starg
            | OpCode::Stloc
            | OpCode::Pop
            | OpCode::Brfalse
            | OpCode::Brtrue
            | OpCode::Switch
            | OpCode::Throw
            | OpCode::Stsfld
            | OpCode::Endfilter
            | OpCode::Initobj => (1, 0),
            OpCode::Dup => (1, 2),
            OpCode::Beq
            | OpCode::Bge
            | OpCode::Bgt
            | OpCode::Ble
            | OpCode::Blt
            | OpCode::BneUn
            | OpCode::BgeUn
            | OpCode::BgtUn
            | OpCode::BleUn
            | OpCode::BltUn
            | OpCode::StindRef
            | OpCode::StindI1
            | OpCode::StindI2
            | OpCode::StindI4
            | OpCode::StindI8
            | OpCode::StindR4
            | OpCode::StindR8
            | OpCode::StindI
            | OpCode::Cpobj
            | OpCode::Stfld
            | OpCode::Stobj => (2, 0),
            OpCode::StelemI
            | OpCode::StelemI1
            | OpCode::StelemI2
            | OpCode::StelemI4
            | OpCode::StelemI8
            | OpCode::StelemR4
            | OpCode::StelemR8
            | OpCode::StelemRef
            | OpCode::Stelem
            | OpCode::Cpblk
            | OpCode::Initblk => (3, 0),
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
            | OpCode::MulOvf
            | OpCode::MulOvfUn
            | OpCode::SubOvf
            | OpCode::SubOvfUn
            | OpCode::Ceq
            | OpCode::Cgt
            | OpCode::CgtUn
            | OpCode::Clt
            | OpCode::CltUn
            | OpCode::Ldelema
            | OpCode::LdelemI1
            | OpCode::LdelemU1
            | OpCode::LdelemI2
            | OpCode::LdelemU2
            | OpCode::LdelemI4
            | OpCode::LdelemU4
            | OpCode::LdelemI8
            | OpCode::LdelemI
            | OpCode::LdelemR4
            | OpCode::LdelemR8
            | OpCode::LdelemRef
            | OpCode::Ldelem => (2, 1),
            // Every remaining opcode replaces the top of the stack with one value
            _ => (1, 1),
        };

        Some(StackBehavior::new(pops, pushes))
    }

    /// Returns true if executing this opcode has no effect besides its stack traffic and
    /// cannot throw.
    ///
    /// Calls, stores through references, field and array accesses, allocations, division
    /// and checked arithmetic are all excluded.
    #[must_use]
    pub fn is_side_effect_free(self) -> bool {
        matches!(
            self,
            OpCode::Nop
                | OpCode::Ldarg
                | OpCode::Ldarga
                | OpCode::Ldloc
                | OpCode::Ldloca
                | OpCode::Ldnull
                | OpCode::LdcI4
                | OpCode::LdcI8
                | OpCode::LdcR4
                | OpCode::LdcR8
                | OpCode::Ldstr
                | OpCode::Dup
                | OpCode::Pop
                | OpCode::Add
                | OpCode::Sub
                | OpCode::Mul
                | OpCode::And
                | OpCode::Or
                | OpCode::Xor
                | OpCode::Shl
                | OpCode::Shr
                | OpCode::ShrUn
                | OpCode::Neg
                | OpCode::Not
                | OpCode::ConvI1
                | OpCode::ConvI2
                | OpCode::ConvI4
                | OpCode::ConvI8
                | OpCode::ConvR4
                | OpCode::ConvR8
                | OpCode::ConvU4
                | OpCode::ConvU8
                | OpCode::ConvU2
                | OpCode::ConvU1
                | OpCode::ConvI
                | OpCode::ConvU
                | OpCode::ConvRUn
                | OpCode::Ceq
                | OpCode::Cgt
                | OpCode::CgtUn
                | OpCode::Clt
                | OpCode::CltUn
                | OpCode::Ldtoken
                | OpCode::Ldftn
                | OpCode::Sizeof
                | OpCode::Arglist
        )
    }

    /// Returns true for value computations whose result depends only on their stack inputs.
    ///
    /// These may trap for some inputs (division, checked arithmetic); the emulator only
    /// produces a known result when they provably do not.
    #[must_use]
    pub fn is_pure_computation(self) -> bool {
        matches!(
            self.category(),
            InstructionCategory::Arithmetic
                | InstructionCategory::BitwiseLogical
                | InstructionCategory::Comparison
                | InstructionCategory::Conversion
        )
    }

    /// Returns true for the conditional branches comparing two operands.
    #[must_use]
    pub fn is_compare_branch(self) -> bool {
        self.flow_type() == FlowType::ConditionalBranch && !matches!(self, OpCode::Brfalse | OpCode::Brtrue)
    }
}
