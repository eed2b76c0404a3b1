//! Abstract values with partial bit knowledge.
//!
//! Every value the emulator pushes is a [`Value`]. Integers carry a validity mask: a set bit
//! in `valid_mask` means the corresponding bit of `value` is statically known, a clear bit means
//! nothing is guaranteed about it. Floats are tracked only as known or unknown.
//!
//! # Identity shortcuts
//!
//! `x - x`, `x ^ x` and `x == x` are decidable even when `x` is completely unknown, as long as
//! both operands are provably the same runtime value. The emulator tags each freshly produced
//! partially-known integer with an [`OriginId`]; copies (`dup`, loads of the same local) keep the
//! tag, so comparing tags is how the domain recognizes "the same value used twice". Values
//! without an origin never take these shortcuts.
//!
//! # Architecture
//!
//! ```text
//!            Value
//!   ┌──────┬───┴────┬───────┬────────┐
//! Unknown Null  Object  Boxed  String
//!            Int32Value  Int64Value  Real8Value
//!               │             │
//!               └── int_domain! (shared arithmetic, logic and comparisons)
//! ```

#[macro_use]
mod macros;
mod int32;
mod int64;
mod real8;

use std::fmt;

pub use int32::Int32Value;
pub use int64::Int64Value;
pub use real8::Real8Value;

use crate::metadata::token::Token;

/// Tag identifying the single emulation step that produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OriginId(pub(crate) u32);

/// Three-valued logic result of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bool3 {
    /// Provably true
    True,
    /// Provably false
    False,
    /// Not statically decidable
    Unknown,
}

impl Bool3 {
    /// Converts a concrete boolean.
    #[must_use]
    pub fn from_bool(value: bool) -> Self {
        if value {
            Bool3::True
        } else {
            Bool3::False
        }
    }

    /// Returns the concrete value, if known.
    #[must_use]
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Bool3::True => Some(true),
            Bool3::False => Some(false),
            Bool3::Unknown => None,
        }
    }

    /// Returns true if the condition is provably true.
    #[must_use]
    pub fn is_true(self) -> bool {
        self == Bool3::True
    }

    /// Returns true if the condition is provably false.
    #[must_use]
    pub fn is_false(self) -> bool {
        self == Bool3::False
    }

    /// Returns true if the condition is undecided.
    #[must_use]
    pub fn is_unknown(self) -> bool {
        self == Bool3::Unknown
    }

    /// Logical negation, `Unknown` stays `Unknown`.
    #[must_use]
    pub fn negate(self) -> Self {
        match self {
            Bool3::True => Bool3::False,
            Bool3::False => Bool3::True,
            Bool3::Unknown => Bool3::Unknown,
        }
    }

    /// Kleene conjunction.
    #[must_use]
    pub fn and(self, other: Bool3) -> Self {
        match (self, other) {
            (Bool3::False, _) | (_, Bool3::False) => Bool3::False,
            (Bool3::True, Bool3::True) => Bool3::True,
            _ => Bool3::Unknown,
        }
    }

    /// Kleene disjunction.
    #[must_use]
    pub fn or(self, other: Bool3) -> Self {
        match (self, other) {
            (Bool3::True, _) | (_, Bool3::True) => Bool3::True,
            (Bool3::False, Bool3::False) => Bool3::False,
            _ => Bool3::Unknown,
        }
    }
}

impl fmt::Display for Bool3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bool3::True => f.write_str("true"),
            Bool3::False => f.write_str("false"),
            Bool3::Unknown => f.write_str("unknown"),
        }
    }
}

/// An abstract evaluation stack, local or argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Nothing is known, not even the type
    Unknown,
    /// The null reference
    Null,
    /// A non-null object reference, optionally identified by the token that created it
    Object(Option<Token>),
    /// A boxed value
    Boxed(Box<Value>),
    /// A string literal
    String(String),
    /// A 32-bit integer (also bool, char and narrower integers)
    Int32(Int32Value),
    /// A 64-bit integer
    Int64(Int64Value),
    /// A floating point number
    Real8(Real8Value),
}

impl Value {
    /// Returns true if nothing at all is known about the value.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        match self {
            Value::Unknown => true,
            Value::Int32(v) => v.is_unknown(),
            Value::Int64(v) => v.is_unknown(),
            Value::Real8(v) => !v.is_valid,
            _ => false,
        }
    }

    /// Returns true if the value is a literal that an instruction could push.
    #[must_use]
    pub fn is_fully_known(&self) -> bool {
        match self {
            Value::Null | Value::String(_) => true,
            Value::Int32(v) => v.all_bits_valid(),
            Value::Int64(v) => v.all_bits_valid(),
            Value::Real8(v) => v.is_valid,
            _ => false,
        }
    }

    /// Returns the 32-bit integer, if this is one.
    #[must_use]
    pub fn as_int32(&self) -> Option<&Int32Value> {
        match self {
            Value::Int32(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the 64-bit integer, if this is one.
    #[must_use]
    pub fn as_int64(&self) -> Option<&Int64Value> {
        match self {
            Value::Int64(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the concrete 32-bit integer, if fully known.
    #[must_use]
    pub fn known_i32(&self) -> Option<i32> {
        self.as_int32().and_then(Int32Value::known_value)
    }

    /// Origin tag of a partially-known integer.
    #[must_use]
    pub fn origin(&self) -> Option<OriginId> {
        match self {
            Value::Int32(v) => v.origin,
            Value::Int64(v) => v.origin,
            _ => None,
        }
    }

    /// Truthiness as used by `brtrue`/`brfalse`.
    #[must_use]
    pub fn to_bool3(&self) -> Bool3 {
        match self {
            Value::Null => Bool3::False,
            Value::Object(_) | Value::Boxed(_) | Value::String(_) => Bool3::True,
            Value::Int32(v) => v.to_bool3(),
            Value::Int64(v) => v.to_bool3(),
            Value::Unknown | Value::Real8(_) => Bool3::Unknown,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unknown => f.write_str("?"),
            Value::Null => f.write_str("null"),
            Value::Object(Some(token)) => write!(f, "object({token})"),
            Value::Object(None) => f.write_str("object"),
            Value::Boxed(inner) => write!(f, "box({inner})"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Real8(v) => write!(f, "{v}"),
        }
    }
}

impl From<Int32Value> for Value {
    fn from(value: Int32Value) -> Self {
        Value::Int32(value)
    }
}

impl From<Int64Value> for Value {
    fn from(value: Int64Value) -> Self {
        Value::Int64(value)
    }
}

impl From<Real8Value> for Value {
    fn from(value: Real8Value) -> Self {
        Value::Real8(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool3_logic() {
        assert_eq!(Bool3::True.and(Bool3::Unknown), Bool3::Unknown);
        assert_eq!(Bool3::False.and(Bool3::Unknown), Bool3::False);
        assert_eq!(Bool3::True.or(Bool3::Unknown), Bool3::True);
        assert_eq!(Bool3::False.or(Bool3::False), Bool3::False);
        assert_eq!(Bool3::Unknown.negate(), Bool3::Unknown);
        assert_eq!(Bool3::from_bool(true).negate(), Bool3::False);
        assert_eq!(Bool3::False.as_bool(), Some(false));
        assert_eq!(Bool3::Unknown.as_bool(), None);
    }

    #[test]
    fn test_value_knowledge() {
        assert!(Value::Unknown.is_unknown());
        assert!(Value::Int32(Int32Value::unknown()).is_unknown());
        assert!(!Value::Int32(Int32Value::unknown_u8()).is_unknown());
        assert!(!Value::Int32(Int32Value::unknown_u8()).is_fully_known());
        assert!(Value::Null.is_fully_known());
        assert!(Value::Real8(Real8Value::new(1.5)).is_fully_known());
        assert!(!Value::Object(None).is_fully_known());
        assert_eq!(Value::Int32(Int32Value::new(9)).known_i32(), Some(9));
    }

    #[test]
    fn test_value_truthiness() {
        assert_eq!(Value::Null.to_bool3(), Bool3::False);
        assert_eq!(Value::String("a".into()).to_bool3(), Bool3::True);
        assert_eq!(Value::Int32(Int32Value::new(0)).to_bool3(), Bool3::False);
        assert_eq!(Value::Int64(Int64Value::new(-1)).to_bool3(), Bool3::True);
        assert_eq!(Value::Unknown.to_bool3(), Bool3::Unknown);
    }
}
