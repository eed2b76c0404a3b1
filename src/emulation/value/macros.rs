/// Generates a bit-precise integer domain type for one machine width.
///
/// The generated type stores the value normalized so that bits outside `valid_mask` are zero,
/// which keeps derived equality meaningful for partially-known values.
macro_rules! int_domain {
    ($(#[$meta:meta])* $name:ident, $signed:ty, $unsigned:ty, $bits:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            /// The value; bits outside `valid_mask` are zero
            pub value: $signed,
            /// Set bits are statically known
            pub valid_mask: $unsigned,
            /// Identity of the emulation step that produced this value
            pub origin: Option<OriginId>,
        }

        impl $name {
            /// Mask with every bit known.
            pub const ALL_BITS: $unsigned = <$unsigned>::MAX;
            /// Bit width of the type.
            pub const BITS: u32 = $bits;

            /// A fully known value.
            #[must_use]
            pub fn new(value: $signed) -> Self {
                $name {
                    value,
                    valid_mask: Self::ALL_BITS,
                    origin: None,
                }
            }

            /// A value where only the bits in `valid_mask` are known.
            #[must_use]
            pub fn with_mask(value: $signed, valid_mask: $unsigned) -> Self {
                $name {
                    value: ((value as $unsigned) & valid_mask) as $signed,
                    valid_mask,
                    origin: None,
                }
            }

            /// A value with no known bits.
            #[must_use]
            pub fn unknown() -> Self {
                Self::with_mask(0, 0)
            }

            /// Attaches an origin tag.
            #[must_use]
            pub fn with_origin(mut self, origin: OriginId) -> Self {
                self.origin = Some(origin);
                self
            }

            /// Returns true if every bit is known.
            #[must_use]
            pub fn all_bits_valid(&self) -> bool {
                self.valid_mask == Self::ALL_BITS
            }

            /// Returns true if no bit is known.
            #[must_use]
            pub fn is_unknown(&self) -> bool {
                self.valid_mask == 0
            }

            /// Returns true if the value is fully known and equal to `value`.
            #[must_use]
            pub fn has_value(&self, value: $signed) -> bool {
                self.all_bits_valid() && self.value == value
            }

            /// Returns the concrete value, if fully known.
            #[must_use]
            pub fn known_value(&self) -> Option<$signed> {
                if self.all_bits_valid() {
                    Some(self.value)
                } else {
                    None
                }
            }

            /// Returns true if a known bit proves the value nonzero.
            #[must_use]
            pub fn is_nonzero(&self) -> bool {
                self.uvalue() & self.valid_mask != 0
            }

            /// Truthiness of the value.
            #[must_use]
            pub fn to_bool3(&self) -> Bool3 {
                if self.is_nonzero() {
                    Bool3::True
                } else if self.all_bits_valid() {
                    Bool3::False
                } else {
                    Bool3::Unknown
                }
            }

            /// Returns true if every bit in `bits` is known to be zero.
            #[must_use]
            pub fn known_zero(&self, bits: $unsigned) -> bool {
                self.valid_mask & bits == bits && self.uvalue() & bits == 0
            }

            /// Returns true if every bit in `bits` is known to be one.
            #[must_use]
            pub fn known_ones(&self, bits: $unsigned) -> bool {
                self.valid_mask & bits == bits && self.uvalue() & bits == bits
            }

            fn uvalue(&self) -> $unsigned {
                self.value as $unsigned
            }

            fn same_origin(&self, other: &Self) -> bool {
                matches!((self.origin, other.origin), (Some(a), Some(b)) if a == b)
            }

            fn both_known(&self, other: &Self) -> Option<($signed, $signed)> {
                Some((self.known_value()?, other.known_value()?))
            }

            /// Smallest unsigned value consistent with the known bits.
            fn umin(&self) -> $unsigned {
                self.uvalue() & self.valid_mask
            }

            /// Largest unsigned value consistent with the known bits.
            fn umax(&self) -> $unsigned {
                self.uvalue() | !self.valid_mask
            }

            /// Mask of the `count` lowest bits.
            fn low_mask(count: u32) -> $unsigned {
                if count >= Self::BITS {
                    Self::ALL_BITS
                } else {
                    (1 << count) - 1
                }
            }

            /// Mask of the low bits whose value is determined by the known low bits of both
            /// operands; carries only propagate upwards.
            fn carry_mask(&self, other: &Self) -> $unsigned {
                Self::low_mask((self.valid_mask & other.valid_mask).trailing_ones())
            }

            /// Wrapping addition.
            #[must_use]
            pub fn add(&self, other: &Self) -> Self {
                if let Some((a, b)) = self.both_known(other) {
                    return Self::new(a.wrapping_add(b));
                }
                if self.same_origin(other) {
                    return Self::with_mask(self.value << 1, (self.valid_mask << 1) | 1);
                }
                Self::with_mask(self.value.wrapping_add(other.value), self.carry_mask(other))
            }

            /// Wrapping subtraction.
            #[must_use]
            pub fn sub(&self, other: &Self) -> Self {
                if let Some((a, b)) = self.both_known(other) {
                    return Self::new(a.wrapping_sub(b));
                }
                if self.same_origin(other) {
                    return Self::new(0);
                }
                Self::with_mask(self.value.wrapping_sub(other.value), self.carry_mask(other))
            }

            /// Wrapping multiplication.
            #[must_use]
            pub fn mul(&self, other: &Self) -> Self {
                if let Some((a, b)) = self.both_known(other) {
                    return Self::new(a.wrapping_mul(b));
                }
                if self.has_value(0) || other.has_value(0) {
                    return Self::new(0);
                }
                if self.has_value(1) {
                    return *other;
                }
                if other.has_value(1) {
                    return *self;
                }
                Self::with_mask(self.value.wrapping_mul(other.value), self.carry_mask(other))
            }

            /// Signed division; unknown whenever the division could trap.
            #[must_use]
            pub fn div(&self, other: &Self) -> Self {
                if let Some((a, b)) = self.both_known(other) {
                    return a.checked_div(b).map_or_else(Self::unknown, Self::new);
                }
                if self.same_origin(other) && self.is_nonzero() {
                    return Self::new(1);
                }
                if other.has_value(1) {
                    return *self;
                }
                Self::unknown()
            }

            /// Unsigned division.
            #[must_use]
            pub fn div_un(&self, other: &Self) -> Self {
                if let Some((a, b)) = self.both_known(other) {
                    return (a as $unsigned)
                        .checked_div(b as $unsigned)
                        .map_or_else(Self::unknown, |v| Self::new(v as $signed));
                }
                if self.same_origin(other) && self.is_nonzero() {
                    return Self::new(1);
                }
                if other.has_value(1) {
                    return *self;
                }
                Self::unknown()
            }

            /// Signed remainder.
            #[must_use]
            pub fn rem(&self, other: &Self) -> Self {
                if let Some((a, b)) = self.both_known(other) {
                    return a.checked_rem(b).map_or_else(Self::unknown, Self::new);
                }
                if self.same_origin(other) || other.has_value(1) {
                    return Self::new(0);
                }
                Self::unknown()
            }

            /// Unsigned remainder.
            #[must_use]
            pub fn rem_un(&self, other: &Self) -> Self {
                if let Some((a, b)) = self.both_known(other) {
                    return (a as $unsigned)
                        .checked_rem(b as $unsigned)
                        .map_or_else(Self::unknown, |v| Self::new(v as $signed));
                }
                if self.same_origin(other) || other.has_value(1) {
                    return Self::new(0);
                }
                Self::unknown()
            }

            /// Bitwise and; a known zero in either operand yields a known zero.
            #[must_use]
            pub fn and(&self, other: &Self) -> Self {
                let mask = (self.valid_mask & other.valid_mask)
                    | (self.valid_mask & !self.uvalue())
                    | (other.valid_mask & !other.uvalue());
                Self::with_mask(self.value & other.value, mask)
            }

            /// Bitwise or; a known one in either operand yields a known one.
            #[must_use]
            pub fn or(&self, other: &Self) -> Self {
                let mask = (self.valid_mask & other.valid_mask)
                    | (self.valid_mask & self.uvalue())
                    | (other.valid_mask & other.uvalue());
                Self::with_mask(self.value | other.value, mask)
            }

            /// Bitwise exclusive or.
            #[must_use]
            pub fn xor(&self, other: &Self) -> Self {
                if self.same_origin(other) {
                    return Self::new(0);
                }
                Self::with_mask(self.value ^ other.value, self.valid_mask & other.valid_mask)
            }

            /// Bitwise complement.
            #[must_use]
            pub fn not(&self) -> Self {
                Self::with_mask(!self.value, self.valid_mask)
            }

            /// Two's complement negation.
            #[must_use]
            pub fn neg(&self) -> Self {
                Self::with_mask(
                    self.value.wrapping_neg(),
                    Self::low_mask(self.valid_mask.trailing_ones()),
                )
            }

            fn shift_amount(amount: &Int32Value) -> Option<u32> {
                amount
                    .known_value()
                    .and_then(|v| u32::try_from(v).ok())
                    .filter(|v| *v < Self::BITS)
            }

            /// Left shift; the vacated low bits become known zeros.
            #[must_use]
            pub fn shl(&self, amount: &Int32Value) -> Self {
                match Self::shift_amount(amount) {
                    Some(bits) => {
                        Self::with_mask(self.value << bits, (self.valid_mask << bits) | Self::low_mask(bits))
                    }
                    None => Self::unknown(),
                }
            }

            /// Arithmetic right shift; vacated high bits are known iff the sign bit is.
            #[must_use]
            pub fn shr(&self, amount: &Int32Value) -> Self {
                match Self::shift_amount(amount) {
                    Some(bits) => Self::with_mask(
                        self.value >> bits,
                        ((self.valid_mask as $signed) >> bits) as $unsigned,
                    ),
                    None => Self::unknown(),
                }
            }

            /// Logical right shift; the vacated high bits become known zeros.
            #[must_use]
            pub fn shr_un(&self, amount: &Int32Value) -> Self {
                match Self::shift_amount(amount) {
                    Some(bits) => Self::with_mask(
                        (self.uvalue() >> bits) as $signed,
                        (self.valid_mask >> bits) | !(Self::ALL_BITS >> bits),
                    ),
                    None => Self::unknown(),
                }
            }

            fn checked(
                &self,
                other: &Self,
                op: impl FnOnce($signed, $signed) -> Option<$signed>,
            ) -> Self {
                self.both_known(other)
                    .and_then(|(a, b)| op(a, b))
                    .map_or_else(Self::unknown, Self::new)
            }

            fn checked_un(
                &self,
                other: &Self,
                op: impl FnOnce($unsigned, $unsigned) -> Option<$unsigned>,
            ) -> Self {
                self.both_known(other)
                    .and_then(|(a, b)| op(a as $unsigned, b as $unsigned))
                    .map_or_else(Self::unknown, |v| Self::new(v as $signed))
            }

            /// Signed addition trapping on overflow.
            #[must_use]
            pub fn add_ovf(&self, other: &Self) -> Self {
                self.checked(other, <$signed>::checked_add)
            }

            /// Unsigned addition trapping on overflow.
            #[must_use]
            pub fn add_ovf_un(&self, other: &Self) -> Self {
                self.checked_un(other, <$unsigned>::checked_add)
            }

            /// Signed subtraction trapping on overflow.
            #[must_use]
            pub fn sub_ovf(&self, other: &Self) -> Self {
                self.checked(other, <$signed>::checked_sub)
            }

            /// Unsigned subtraction trapping on overflow.
            #[must_use]
            pub fn sub_ovf_un(&self, other: &Self) -> Self {
                self.checked_un(other, <$unsigned>::checked_sub)
            }

            /// Signed multiplication trapping on overflow.
            #[must_use]
            pub fn mul_ovf(&self, other: &Self) -> Self {
                self.checked(other, <$signed>::checked_mul)
            }

            /// Unsigned multiplication trapping on overflow.
            #[must_use]
            pub fn mul_ovf_un(&self, other: &Self) -> Self {
                self.checked_un(other, <$unsigned>::checked_mul)
            }

            /// `==`
            #[must_use]
            pub fn compare_eq(&self, other: &Self) -> Bool3 {
                if let Some((a, b)) = self.both_known(other) {
                    return Bool3::from_bool(a == b);
                }
                if self.same_origin(other) {
                    return Bool3::True;
                }
                if (self.uvalue() ^ other.uvalue()) & self.valid_mask & other.valid_mask != 0 {
                    return Bool3::False;
                }
                Bool3::Unknown
            }

            /// `!=`
            #[must_use]
            pub fn compare_neq(&self, other: &Self) -> Bool3 {
                self.compare_eq(other).negate()
            }

            /// Signed `>`
            #[must_use]
            pub fn compare_gt(&self, other: &Self) -> Bool3 {
                if let Some((a, b)) = self.both_known(other) {
                    return Bool3::from_bool(a > b);
                }
                if self.same_origin(other) || self.has_value(<$signed>::MIN) || other.has_value(<$signed>::MAX) {
                    return Bool3::False;
                }
                Bool3::Unknown
            }

            /// Signed `>=`
            #[must_use]
            pub fn compare_ge(&self, other: &Self) -> Bool3 {
                if let Some((a, b)) = self.both_known(other) {
                    return Bool3::from_bool(a >= b);
                }
                if self.same_origin(other) || self.has_value(<$signed>::MAX) || other.has_value(<$signed>::MIN) {
                    return Bool3::True;
                }
                Bool3::Unknown
            }

            /// Signed `<`
            #[must_use]
            pub fn compare_lt(&self, other: &Self) -> Bool3 {
                other.compare_gt(self)
            }

            /// Signed `<=`
            #[must_use]
            pub fn compare_le(&self, other: &Self) -> Bool3 {
                other.compare_ge(self)
            }

            /// Unsigned `>`, decided from the value ranges the known bits allow.
            #[must_use]
            pub fn compare_gt_un(&self, other: &Self) -> Bool3 {
                if self.same_origin(other) {
                    return Bool3::False;
                }
                if self.umin() > other.umax() {
                    Bool3::True
                } else if self.umax() <= other.umin() {
                    Bool3::False
                } else {
                    Bool3::Unknown
                }
            }

            /// Unsigned `>=`
            #[must_use]
            pub fn compare_ge_un(&self, other: &Self) -> Bool3 {
                if self.same_origin(other) {
                    return Bool3::True;
                }
                if self.umin() >= other.umax() {
                    Bool3::True
                } else if self.umax() < other.umin() {
                    Bool3::False
                } else {
                    Bool3::Unknown
                }
            }

            /// Unsigned `<`
            #[must_use]
            pub fn compare_lt_un(&self, other: &Self) -> Bool3 {
                other.compare_gt_un(self)
            }

            /// Unsigned `<=`
            #[must_use]
            pub fn compare_le_un(&self, other: &Self) -> Bool3 {
                other.compare_ge_un(self)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                if self.all_bits_valid() {
                    write!(f, "{}", self.value)
                } else if self.is_unknown() {
                    f.write_str("?")
                } else {
                    write!(f, "{:#x}/{:#x}", self.uvalue(), self.valid_mask)
                }
            }
        }
    };
}
