use std::fmt;

use super::{Bool3, Int32Value, Int64Value};

/// A floating point value, either fully known or unknown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Real8Value {
    /// The value; meaningless when `is_valid` is false
    pub value: f64,
    /// True if `value` is known
    pub is_valid: bool,
}

impl Real8Value {
    /// A known value.
    #[must_use]
    pub fn new(value: f64) -> Self {
        Real8Value { value, is_valid: true }
    }

    /// An unknown value.
    #[must_use]
    pub fn unknown() -> Self {
        Real8Value {
            value: 0.0,
            is_valid: false,
        }
    }

    fn binary(&self, other: &Self, op: impl FnOnce(f64, f64) -> f64) -> Self {
        if self.is_valid && other.is_valid {
            Self::new(op(self.value, other.value))
        } else {
            Self::unknown()
        }
    }

    fn compare(&self, other: &Self, op: impl FnOnce(f64, f64) -> bool) -> Bool3 {
        if self.is_valid && other.is_valid {
            Bool3::from_bool(op(self.value, other.value))
        } else {
            Bool3::Unknown
        }
    }

    /// `add`
    #[must_use]
    pub fn add(&self, other: &Self) -> Self {
        self.binary(other, |a, b| a + b)
    }

    /// `sub`
    #[must_use]
    pub fn sub(&self, other: &Self) -> Self {
        self.binary(other, |a, b| a - b)
    }

    /// `mul`
    #[must_use]
    pub fn mul(&self, other: &Self) -> Self {
        self.binary(other, |a, b| a * b)
    }

    /// `div`, IEEE semantics (never traps)
    #[must_use]
    pub fn div(&self, other: &Self) -> Self {
        self.binary(other, |a, b| a / b)
    }

    /// `rem`, truncated remainder like C `fmod`
    #[must_use]
    pub fn rem(&self, other: &Self) -> Self {
        self.binary(other, |a, b| a % b)
    }

    /// `neg`
    #[must_use]
    pub fn neg(&self) -> Self {
        if self.is_valid {
            Self::new(-self.value)
        } else {
            Self::unknown()
        }
    }

    /// `ckfinite`
    #[must_use]
    pub fn ckfinite(&self) -> Self {
        if self.is_valid && self.value.is_finite() {
            *self
        } else {
            Self::unknown()
        }
    }

    /// `conv.r4`, rounding to single precision
    #[must_use]
    pub fn conv_r4(&self) -> Self {
        if self.is_valid {
            Self::new(f64::from(self.value as f32))
        } else {
            Self::unknown()
        }
    }

    /// Truncates toward zero if the result provably lies in `[min, max]`.
    fn truncate_within(&self, min: f64, max: f64) -> Option<f64> {
        if !self.is_valid || !self.value.is_finite() {
            return None;
        }
        let truncated = self.value.trunc();
        (truncated >= min && truncated <= max).then_some(truncated)
    }

    /// Conversion to a 32-bit stack integer, known only when the value fits the target range
    /// (`min..=max`) so that no unspecified or trapping conversion occurs.
    #[must_use]
    pub fn conv_to_int32(&self, min: i64, max: i64) -> Int32Value {
        self.truncate_within(min as f64, max as f64)
            .map_or_else(Int32Value::unknown, |v| Int32Value::new(v as i64 as i32))
    }

    /// `conv.i8`
    #[must_use]
    pub fn conv_i8(&self) -> Int64Value {
        // 2^63 is exactly representable; the upper bound must stay below it
        self.truncate_within(i64::MIN as f64, 9_223_372_036_854_774_784.0)
            .map_or_else(Int64Value::unknown, |v| Int64Value::new(v as i64))
    }

    /// `conv.u8`
    #[must_use]
    pub fn conv_u8(&self) -> Int64Value {
        self.truncate_within(0.0, 18_446_744_073_709_549_568.0)
            .map_or_else(Int64Value::unknown, |v| Int64Value::new(v as u64 as i64))
    }

    /// `ceq`/`beq`
    #[must_use]
    pub fn compare_eq(&self, other: &Self) -> Bool3 {
        self.compare(other, |a, b| a == b)
    }

    /// `bne.un`: true when unequal or unordered
    #[must_use]
    pub fn compare_neq_un(&self, other: &Self) -> Bool3 {
        self.compare(other, |a, b| a != b)
    }

    /// `cgt`/`bgt`: false when unordered
    #[must_use]
    pub fn compare_gt(&self, other: &Self) -> Bool3 {
        self.compare(other, |a, b| a > b)
    }

    /// `cgt.un`/`bgt.un`: true when unordered
    #[must_use]
    pub fn compare_gt_un(&self, other: &Self) -> Bool3 {
        self.compare(other, |a, b| a > b || a.is_nan() || b.is_nan())
    }

    /// `bge`
    #[must_use]
    pub fn compare_ge(&self, other: &Self) -> Bool3 {
        self.compare(other, |a, b| a >= b)
    }

    /// `bge.un`
    #[must_use]
    pub fn compare_ge_un(&self, other: &Self) -> Bool3 {
        self.compare(other, |a, b| a >= b || a.is_nan() || b.is_nan())
    }

    /// `clt`/`blt`
    #[must_use]
    pub fn compare_lt(&self, other: &Self) -> Bool3 {
        other.compare_gt(self)
    }

    /// `clt.un`/`blt.un`
    #[must_use]
    pub fn compare_lt_un(&self, other: &Self) -> Bool3 {
        other.compare_gt_un(self)
    }

    /// `ble`
    #[must_use]
    pub fn compare_le(&self, other: &Self) -> Bool3 {
        other.compare_ge(self)
    }

    /// `ble.un`
    #[must_use]
    pub fn compare_le_un(&self, other: &Self) -> Bool3 {
        other.compare_ge_un(self)
    }
}

impl fmt::Display for Real8Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid {
            write!(f, "{}", self.value)
        } else {
            f.write_str("?")
        }
    }
}
