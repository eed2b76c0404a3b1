//! Opcode-level dispatch onto the abstract domain.
//!
//! The value types implement the arithmetic; this module decides which implementation an
//! opcode maps to for a given pair of stack types. Mismatched or untyped operands produce
//! [`Value::Unknown`], the emulator never guesses a type.

use crate::{
    assembly::OpCode,
    emulation::value::{Bool3, Int32Value, Int64Value, Real8Value, Value},
};

/// A relational operator shared by `c*` compare instructions and compare-and-branch opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// `ceq`, `beq`
    Eq,
    /// `bne.un`
    NeUn,
    /// `cgt`, `bgt`
    Gt,
    /// `cgt.un`, `bgt.un`
    GtUn,
    /// `bge`
    Ge,
    /// `bge.un`
    GeUn,
    /// `clt`, `blt`
    Lt,
    /// `clt.un`, `blt.un`
    LtUn,
    /// `ble`
    Le,
    /// `ble.un`
    LeUn,
}

impl Comparison {
    /// Maps a compare or compare-and-branch opcode to its operator.
    #[must_use]
    pub fn from_opcode(opcode: OpCode) -> Option<Self> {
        Some(match opcode {
            OpCode::Ceq | OpCode::Beq => Comparison::Eq,
            OpCode::BneUn => Comparison::NeUn,
            OpCode::Cgt | OpCode::Bgt => Comparison::Gt,
            OpCode::CgtUn | OpCode::BgtUn => Comparison::GtUn,
            OpCode::Bge => Comparison::Ge,
            OpCode::BgeUn => Comparison::GeUn,
            OpCode::Clt | OpCode::Blt => Comparison::Lt,
            OpCode::CltUn | OpCode::BltUn => Comparison::LtUn,
            OpCode::Ble => Comparison::Le,
            OpCode::BleUn => Comparison::LeUn,
            _ => return None,
        })
    }
}

macro_rules! compare_ints {
    ($cmp:expr, $a:expr, $b:expr) => {
        match $cmp {
            Comparison::Eq => $a.compare_eq($b),
            Comparison::NeUn => $a.compare_neq($b),
            Comparison::Gt => $a.compare_gt($b),
            Comparison::GtUn => $a.compare_gt_un($b),
            Comparison::Ge => $a.compare_ge($b),
            Comparison::GeUn => $a.compare_ge_un($b),
            Comparison::Lt => $a.compare_lt($b),
            Comparison::LtUn => $a.compare_lt_un($b),
            Comparison::Le => $a.compare_le($b),
            Comparison::LeUn => $a.compare_le_un($b),
        }
    };
}

fn is_non_null_reference(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::String(_) | Value::Boxed(_))
}

/// Evaluates `a <cmp> b`.
#[must_use]
pub fn compare(cmp: Comparison, a: &Value, b: &Value) -> Bool3 {
    match (a, b) {
        (Value::Int32(a), Value::Int32(b)) => compare_ints!(cmp, a, b),
        (Value::Int64(a), Value::Int64(b)) => compare_ints!(cmp, a, b),
        (Value::Real8(a), Value::Real8(b)) => match cmp {
            Comparison::Eq => a.compare_eq(b),
            Comparison::NeUn => a.compare_neq_un(b),
            Comparison::Gt => a.compare_gt(b),
            Comparison::GtUn => a.compare_gt_un(b),
            Comparison::Ge => a.compare_ge(b),
            Comparison::GeUn => a.compare_ge_un(b),
            Comparison::Lt => a.compare_lt(b),
            Comparison::LtUn => a.compare_lt_un(b),
            Comparison::Le => a.compare_le(b),
            Comparison::LeUn => a.compare_le_un(b),
        },
        (Value::Null, Value::Null) => match cmp {
            Comparison::Eq | Comparison::GeUn | Comparison::LeUn => Bool3::True,
            Comparison::NeUn | Comparison::GtUn | Comparison::LtUn => Bool3::False,
            _ => Bool3::Unknown,
        },
        // `x != null` is commonly compiled to `cgt.un` against `ldnull`
        (r, Value::Null) | (Value::Null, r) if is_non_null_reference(r) => {
            let reference_first = !matches!(a, Value::Null);
            match cmp {
                Comparison::Eq => Bool3::False,
                Comparison::NeUn => Bool3::True,
                Comparison::GtUn => Bool3::from_bool(reference_first),
                Comparison::LtUn => Bool3::from_bool(!reference_first),
                _ => Bool3::Unknown,
            }
        }
        _ => Bool3::Unknown,
    }
}

macro_rules! int_binary {
    ($opcode:expr, $a:expr, $b:expr) => {
        match $opcode {
            OpCode::Add => Some($a.add($b)),
            OpCode::Sub => Some($a.sub($b)),
            OpCode::Mul => Some($a.mul($b)),
            OpCode::Div => Some($a.div($b)),
            OpCode::DivUn => Some($a.div_un($b)),
            OpCode::Rem => Some($a.rem($b)),
            OpCode::RemUn => Some($a.rem_un($b)),
            OpCode::And => Some($a.and($b)),
            OpCode::Or => Some($a.or($b)),
            OpCode::Xor => Some($a.xor($b)),
            OpCode::AddOvf => Some($a.add_ovf($b)),
            OpCode::AddOvfUn => Some($a.add_ovf_un($b)),
            OpCode::SubOvf => Some($a.sub_ovf($b)),
            OpCode::SubOvfUn => Some($a.sub_ovf_un($b)),
            OpCode::MulOvf => Some($a.mul_ovf($b)),
            OpCode::MulOvfUn => Some($a.mul_ovf_un($b)),
            _ => None,
        }
    };
}

/// Evaluates a two-operand arithmetic, logic or shift opcode.
#[must_use]
pub fn binary(opcode: OpCode, a: &Value, b: &Value) -> Value {
    let shift = |value: &Value, amount: &Int32Value| -> Value {
        match (opcode, value) {
            (OpCode::Shl, Value::Int32(v)) => v.shl(amount).into(),
            (OpCode::Shr, Value::Int32(v)) => v.shr(amount).into(),
            (OpCode::ShrUn, Value::Int32(v)) => v.shr_un(amount).into(),
            (OpCode::Shl, Value::Int64(v)) => v.shl(amount).into(),
            (OpCode::Shr, Value::Int64(v)) => v.shr(amount).into(),
            (OpCode::ShrUn, Value::Int64(v)) => v.shr_un(amount).into(),
            _ => Value::Unknown,
        }
    };

    if matches!(opcode, OpCode::Shl | OpCode::Shr | OpCode::ShrUn) {
        return match b {
            Value::Int32(amount) => shift(a, amount),
            _ => match a {
                Value::Int32(_) => Int32Value::unknown().into(),
                Value::Int64(_) => Int64Value::unknown().into(),
                _ => Value::Unknown,
            },
        };
    }

    match (a, b) {
        (Value::Int32(a), Value::Int32(b)) => int_binary!(opcode, a, b).map_or(Value::Unknown, Value::Int32),
        (Value::Int64(a), Value::Int64(b)) => int_binary!(opcode, a, b).map_or(Value::Unknown, Value::Int64),
        (Value::Real8(a), Value::Real8(b)) => match opcode {
            OpCode::Add => a.add(b).into(),
            OpCode::Sub => a.sub(b).into(),
            OpCode::Mul => a.mul(b).into(),
            OpCode::Div => a.div(b).into(),
            OpCode::Rem => a.rem(b).into(),
            _ => Value::Unknown,
        },
        _ => Value::Unknown,
    }
}

/// Evaluates `neg`, `not` and `ckfinite`.
#[must_use]
pub fn unary(opcode: OpCode, value: &Value) -> Value {
    match (opcode, value) {
        (OpCode::Neg, Value::Int32(v)) => v.neg().into(),
        (OpCode::Neg, Value::Int64(v)) => v.neg().into(),
        (OpCode::Neg, Value::Real8(v)) => v.neg().into(),
        (OpCode::Not, Value::Int32(v)) => v.not().into(),
        (OpCode::Not, Value::Int64(v)) => v.not().into(),
        (OpCode::Ckfinite, Value::Real8(v)) => v.ckfinite().into(),
        (OpCode::Ckfinite, _) => Real8Value::unknown().into(),
        _ => Value::Unknown,
    }
}

fn convert_int32(opcode: OpCode, v: &Int32Value) -> Value {
    match opcode {
        OpCode::ConvI1 => v.conv_i1().into(),
        OpCode::ConvU1 => v.conv_u1().into(),
        OpCode::ConvI2 => v.conv_i2().into(),
        OpCode::ConvU2 => v.conv_u2().into(),
        OpCode::ConvI4 | OpCode::ConvU4 | OpCode::ConvOvfI4 | OpCode::ConvOvfU4Un => (*v).into(),
        OpCode::ConvI8 | OpCode::ConvOvfI8 => v.conv_i8().into(),
        OpCode::ConvU8 | OpCode::ConvOvfI8Un | OpCode::ConvOvfU8Un => v.conv_u8().into(),
        OpCode::ConvR4 => v.conv_r4().into(),
        OpCode::ConvR8 => v.conv_r8().into(),
        OpCode::ConvRUn => v.conv_r_un().into(),
        OpCode::ConvOvfI1 => v.conv_ovf_i1().into(),
        OpCode::ConvOvfU1 | OpCode::ConvOvfU1Un => v.conv_ovf_u1().into(),
        OpCode::ConvOvfI2 => v.conv_ovf_i2().into(),
        OpCode::ConvOvfU2 | OpCode::ConvOvfU2Un => v.conv_ovf_u2().into(),
        OpCode::ConvOvfU4 | OpCode::ConvOvfI4Un => v.conv_ovf_non_negative().into(),
        OpCode::ConvOvfU8 => v.conv_ovf_u8().into(),
        OpCode::ConvOvfI1Un => v.conv_ovf_i1_un().into(),
        OpCode::ConvOvfI2Un => v.conv_ovf_i2_un().into(),
        _ => Value::Unknown,
    }
}

fn convert_int64(opcode: OpCode, v: &Int64Value) -> Value {
    match opcode {
        OpCode::ConvI1 => v.conv_i4().conv_i1().into(),
        OpCode::ConvU1 => v.conv_i4().conv_u1().into(),
        OpCode::ConvI2 => v.conv_i4().conv_i2().into(),
        OpCode::ConvU2 => v.conv_i4().conv_u2().into(),
        OpCode::ConvI4 | OpCode::ConvU4 => v.conv_i4().into(),
        OpCode::ConvI8 | OpCode::ConvU8 | OpCode::ConvOvfI8 | OpCode::ConvOvfU8Un => (*v).into(),
        OpCode::ConvR4 => v.conv_r4().into(),
        OpCode::ConvR8 => v.conv_r8().into(),
        OpCode::ConvRUn => v.conv_r_un().into(),
        OpCode::ConvOvfI1 => v.conv_ovf_i1().into(),
        OpCode::ConvOvfU1 | OpCode::ConvOvfU1Un => v.conv_ovf_u1().into(),
        OpCode::ConvOvfI2 => v.conv_ovf_i2().into(),
        OpCode::ConvOvfU2 | OpCode::ConvOvfU2Un => v.conv_ovf_u2().into(),
        OpCode::ConvOvfI4 => v.conv_ovf_i4().into(),
        OpCode::ConvOvfU4 | OpCode::ConvOvfU4Un => v.conv_ovf_u4().into(),
        OpCode::ConvOvfU8 | OpCode::ConvOvfI8Un => v.conv_ovf_non_negative().into(),
        OpCode::ConvOvfI1Un => v.conv_ovf_i1_un().into(),
        OpCode::ConvOvfI2Un => v.conv_ovf_i2_un().into(),
        OpCode::ConvOvfI4Un => v.conv_ovf_i4_un().into(),
        _ => Value::Unknown,
    }
}

fn convert_real8(opcode: OpCode, v: &Real8Value) -> Value {
    match opcode {
        OpCode::ConvI1 | OpCode::ConvOvfI1 => v.conv_to_int32(i64::from(i8::MIN), i64::from(i8::MAX)).into(),
        OpCode::ConvU1 | OpCode::ConvOvfU1 => v.conv_to_int32(0, i64::from(u8::MAX)).into(),
        OpCode::ConvI2 | OpCode::ConvOvfI2 => v.conv_to_int32(i64::from(i16::MIN), i64::from(i16::MAX)).into(),
        OpCode::ConvU2 | OpCode::ConvOvfU2 => v.conv_to_int32(0, i64::from(u16::MAX)).into(),
        OpCode::ConvI4 | OpCode::ConvOvfI4 => v.conv_to_int32(i64::from(i32::MIN), i64::from(i32::MAX)).into(),
        OpCode::ConvU4 | OpCode::ConvOvfU4 => v.conv_to_int32(0, i64::from(u32::MAX)).into(),
        OpCode::ConvI8 | OpCode::ConvOvfI8 => v.conv_i8().into(),
        OpCode::ConvU8 | OpCode::ConvOvfU8 => v.conv_u8().into(),
        OpCode::ConvR4 => v.conv_r4().into(),
        OpCode::ConvR8 => (*v).into(),
        _ => Value::Unknown,
    }
}

/// Result of a conversion when the source is not a tracked number.
///
/// Narrowing conversions bound their result no matter what the source was.
fn convert_untyped(opcode: OpCode) -> Value {
    let unknown = Int32Value::unknown();
    match opcode {
        OpCode::ConvI1 | OpCode::ConvU1 | OpCode::ConvI2 | OpCode::ConvU2 => convert_int32(opcode, &unknown),
        OpCode::ConvI4 | OpCode::ConvU4 | OpCode::ConvOvfI1 | OpCode::ConvOvfU1 | OpCode::ConvOvfI2 => {
            unknown.into()
        }
        OpCode::ConvI8 | OpCode::ConvU8 | OpCode::ConvOvfI8 | OpCode::ConvOvfU8 => Int64Value::unknown().into(),
        OpCode::ConvR4 | OpCode::ConvR8 | OpCode::ConvRUn => Real8Value::unknown().into(),
        _ => Value::Unknown,
    }
}

/// Evaluates a `conv.*` opcode.
#[must_use]
pub fn convert(opcode: OpCode, value: &Value) -> Value {
    match value {
        Value::Int32(v) => convert_int32(opcode, v),
        Value::Int64(v) => convert_int64(opcode, v),
        Value::Real8(v) => convert_real8(opcode, v),
        _ => convert_untyped(opcode),
    }
}
