use super::{Bool3, Int64Value, OriginId, Real8Value};

int_domain!(
    /// A 32-bit integer with per-bit knowledge.
    ///
    /// Also represents `bool`, `char` and the narrow integer types, which the evaluation stack
    /// widens to 32 bits.
    Int32Value,
    i32,
    u32,
    32
);

impl Int32Value {
    /// A boolean (`0` or `1`) of unknown value: bits 1..31 are known zero.
    #[must_use]
    pub fn unknown_bool() -> Self {
        Self::with_mask(0, !1)
    }

    /// An unknown byte zero-extended to 32 bits.
    #[must_use]
    pub fn unknown_u8() -> Self {
        Self::with_mask(0, 0xFFFF_FF00)
    }

    /// An unknown `u16` or `char` zero-extended to 32 bits.
    #[must_use]
    pub fn unknown_u16() -> Self {
        Self::with_mask(0, 0xFFFF_0000)
    }

    /// Materializes a comparison result the way `ceq`/`cgt`/`clt` push it.
    #[must_use]
    pub fn from_bool3(value: Bool3) -> Self {
        match value {
            Bool3::True => Self::new(1),
            Bool3::False => Self::new(0),
            Bool3::Unknown => Self::unknown_bool(),
        }
    }

    /// `conv.i1`: keep the low byte and sign-extend bit 7.
    #[must_use]
    pub fn conv_i1(&self) -> Self {
        let mut mask = self.valid_mask & 0xFF;
        if self.valid_mask & 0x80 != 0 {
            mask |= 0xFFFF_FF00;
        }
        Self::with_mask(i32::from(self.value as i8), mask)
    }

    /// `conv.u1`: keep the low byte, the rest becomes known zero.
    #[must_use]
    pub fn conv_u1(&self) -> Self {
        Self::with_mask(self.value & 0xFF, (self.valid_mask & 0xFF) | 0xFFFF_FF00)
    }

    /// `conv.i2`: keep the low 16 bits and sign-extend bit 15.
    #[must_use]
    pub fn conv_i2(&self) -> Self {
        let mut mask = self.valid_mask & 0xFFFF;
        if self.valid_mask & 0x8000 != 0 {
            mask |= 0xFFFF_0000;
        }
        Self::with_mask(i32::from(self.value as i16), mask)
    }

    /// `conv.u2`: keep the low 16 bits, the rest becomes known zero.
    #[must_use]
    pub fn conv_u2(&self) -> Self {
        Self::with_mask(self.value & 0xFFFF, (self.valid_mask & 0xFFFF) | 0xFFFF_0000)
    }

    /// `conv.i8`: sign-extend to 64 bits.
    #[must_use]
    pub fn conv_i8(&self) -> Int64Value {
        let mut mask = u64::from(self.valid_mask);
        if self.valid_mask & 0x8000_0000 != 0 {
            mask |= 0xFFFF_FFFF_0000_0000;
        }
        Int64Value::with_mask(i64::from(self.value), mask)
    }

    /// `conv.u8`: zero-extend to 64 bits.
    #[must_use]
    pub fn conv_u8(&self) -> Int64Value {
        Int64Value::with_mask(
            i64::from(self.value as u32),
            u64::from(self.valid_mask) | 0xFFFF_FFFF_0000_0000,
        )
    }

    /// `conv.r8`
    #[must_use]
    pub fn conv_r8(&self) -> Real8Value {
        self.known_value()
            .map_or_else(Real8Value::unknown, |v| Real8Value::new(f64::from(v)))
    }

    /// `conv.r.un`
    #[must_use]
    pub fn conv_r_un(&self) -> Real8Value {
        self.known_value()
            .map_or_else(Real8Value::unknown, |v| Real8Value::new(f64::from(v as u32)))
    }

    /// `conv.r4`
    #[must_use]
    pub fn conv_r4(&self) -> Real8Value {
        self.known_value()
            .map_or_else(Real8Value::unknown, |v| Real8Value::new(f64::from(v as f32)))
    }

    fn checked_narrow(&self, fits: bool, convert: impl FnOnce(&Self) -> Self) -> Self {
        if fits {
            convert(self)
        } else {
            Self::unknown()
        }
    }

    /// Returns true if the bits in `high` are known copies of the sign bit.
    fn fits_signed(&self, high: u32) -> bool {
        self.known_zero(high) || self.known_ones(high)
    }

    /// `conv.ovf.i1`
    #[must_use]
    pub fn conv_ovf_i1(&self) -> Self {
        self.checked_narrow(self.fits_signed(0xFFFF_FF80), Self::conv_i1)
    }

    /// `conv.ovf.u1`
    #[must_use]
    pub fn conv_ovf_u1(&self) -> Self {
        self.checked_narrow(self.known_zero(0xFFFF_FF00), Self::conv_u1)
    }

    /// `conv.ovf.i2`
    #[must_use]
    pub fn conv_ovf_i2(&self) -> Self {
        self.checked_narrow(self.fits_signed(0xFFFF_8000), Self::conv_i2)
    }

    /// `conv.ovf.u2`
    #[must_use]
    pub fn conv_ovf_u2(&self) -> Self {
        self.checked_narrow(self.known_zero(0xFFFF_0000), Self::conv_u2)
    }

    /// `conv.ovf.u4` and `conv.ovf.i4.un`: the value must be non-negative.
    #[must_use]
    pub fn conv_ovf_non_negative(&self) -> Self {
        self.checked_narrow(self.known_zero(0x8000_0000), |v| *v)
    }

    /// `conv.ovf.u8`
    #[must_use]
    pub fn conv_ovf_u8(&self) -> Int64Value {
        if self.known_zero(0x8000_0000) {
            self.conv_u8()
        } else {
            Int64Value::unknown()
        }
    }

    /// `conv.ovf.i1.un`
    #[must_use]
    pub fn conv_ovf_i1_un(&self) -> Self {
        self.checked_narrow(self.known_zero(0xFFFF_FF80), Self::conv_i1)
    }

    /// `conv.ovf.i2.un`
    #[must_use]
    pub fn conv_ovf_i2_un(&self) -> Self {
        self.checked_narrow(self.known_zero(0xFFFF_8000), Self::conv_i2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin(id: u32) -> OriginId {
        OriginId(id)
    }

    #[test]
    fn test_concrete_arithmetic() {
        let a = Int32Value::new(7);
        let b = Int32Value::new(3);
        assert_eq!(a.add(&b), Int32Value::new(10));
        assert_eq!(a.sub(&b), Int32Value::new(4));
        assert_eq!(a.mul(&b), Int32Value::new(21));
        assert_eq!(a.div(&b), Int32Value::new(2));
        assert_eq!(a.rem(&b), Int32Value::new(1));
        assert_eq!(Int32Value::new(i32::MAX).add(&Int32Value::new(1)), Int32Value::new(i32::MIN));
        assert_eq!(Int32Value::new(-7).div(&Int32Value::new(2)), Int32Value::new(-3));
        assert_eq!(Int32Value::new(-1).div_un(&Int32Value::new(2)), Int32Value::new(i32::MAX));
    }

    #[test]
    fn test_trapping_division_is_unknown() {
        assert!(Int32Value::new(5).div(&Int32Value::new(0)).is_unknown());
        assert!(Int32Value::new(i32::MIN).div(&Int32Value::new(-1)).is_unknown());
        assert!(Int32Value::new(i32::MIN).rem(&Int32Value::new(-1)).is_unknown());
        assert!(Int32Value::new(5).rem_un(&Int32Value::new(0)).is_unknown());
    }

    #[test]
    fn test_same_origin_shortcuts() {
        let x = Int32Value::unknown().with_origin(origin(1));
        assert_eq!(x.sub(&x), Int32Value::new(0));
        assert_eq!(x.xor(&x), Int32Value::new(0));
        assert_eq!(x.rem(&x), Int32Value::new(0));
        assert_eq!(x.compare_eq(&x), Bool3::True);
        assert_eq!(x.compare_ge(&x), Bool3::True);
        assert_eq!(x.compare_gt(&x), Bool3::False);
        assert_eq!(x.compare_lt_un(&x), Bool3::False);

        let doubled = x.add(&x);
        assert_eq!(doubled.valid_mask, 1);
        assert_eq!(doubled.to_bool3(), Bool3::Unknown);

        // Unknown is not proof of a nonzero divisor
        assert!(x.div(&x).is_unknown());
        let odd = Int32Value::with_mask(1, 1).with_origin(origin(2));
        assert_eq!(odd.div(&odd), Int32Value::new(1));
    }

    #[test]
    fn test_different_origins_do_not_cancel() {
        let x = Int32Value::unknown().with_origin(origin(1));
        let y = Int32Value::unknown().with_origin(origin(2));
        assert!(x.sub(&y).is_unknown());
        assert_eq!(x.compare_eq(&y), Bool3::Unknown);
        assert!(Int32Value::unknown().sub(&Int32Value::unknown()).is_unknown());
    }

    #[test]
    fn test_partial_masks() {
        let byte = Int32Value::unknown_u8();
        let masked = Int32Value::unknown().and(&Int32Value::new(0xFF));
        assert_eq!(masked.valid_mask, 0xFFFF_FF00);
        assert_eq!(masked, byte);

        let with_high_bit = Int32Value::unknown().or(&Int32Value::new(0x100));
        assert_eq!(with_high_bit.to_bool3(), Bool3::True);
        assert_eq!(with_high_bit.compare_eq(&Int32Value::new(0)), Bool3::False);

        let shifted = Int32Value::unknown().shl(&Int32Value::new(4));
        assert_eq!(shifted.valid_mask, 0xF);
        assert_eq!(shifted.and(&Int32Value::new(0xF)), Int32Value::new(0));

        let sum = Int32Value::with_mask(0x10, 0xFF).add(&Int32Value::new(0x21));
        assert_eq!(sum.valid_mask, 0xFF);
        assert_eq!(sum.value, 0x31);
    }

    #[test]
    fn test_shifts() {
        let negative = Int32Value::new(-16);
        assert_eq!(negative.shr(&Int32Value::new(2)), Int32Value::new(-4));
        assert_eq!(negative.shr_un(&Int32Value::new(28)), Int32Value::new(0xF));
        assert!(negative.shl(&Int32Value::new(32)).is_unknown());
        assert!(negative.shl(&Int32Value::unknown()).is_unknown());

        let top_unknown = Int32Value::with_mask(0, 0x7FFF_FFFF);
        assert_eq!(top_unknown.shr(&Int32Value::new(4)).valid_mask, 0x07FF_FFFF);
        assert_eq!(top_unknown.shr_un(&Int32Value::new(4)).valid_mask, 0xF7FF_FFFF);
    }

    #[test]
    fn test_multiplication_shortcuts() {
        let x = Int32Value::unknown();
        assert_eq!(x.mul(&Int32Value::new(0)), Int32Value::new(0));
        assert_eq!(Int32Value::new(1).mul(&x), x);
        assert_eq!(x.div(&Int32Value::new(1)), x);
        assert_eq!(x.rem_un(&Int32Value::new(1)), Int32Value::new(0));
    }

    #[test]
    fn test_overflow_checks() {
        assert!(Int32Value::new(i32::MAX).add_ovf(&Int32Value::new(1)).is_unknown());
        assert_eq!(Int32Value::new(2).add_ovf(&Int32Value::new(3)), Int32Value::new(5));
        assert!(Int32Value::new(0).sub_ovf_un(&Int32Value::new(1)).is_unknown());
        assert_eq!(Int32Value::new(-1).add_ovf_un(&Int32Value::new(0)), Int32Value::new(-1));
        assert!(Int32Value::new(0x10000).mul_ovf(&Int32Value::new(0x10000)).is_unknown());
    }

    #[test]
    fn test_signed_extremes() {
        let x = Int32Value::unknown();
        assert_eq!(Int32Value::new(i32::MAX).compare_ge(&x), Bool3::True);
        assert_eq!(x.compare_ge(&Int32Value::new(i32::MIN)), Bool3::True);
        assert_eq!(Int32Value::new(i32::MIN).compare_gt(&x), Bool3::False);
        assert_eq!(x.compare_lt(&Int32Value::new(i32::MIN)), Bool3::False);
        assert_eq!(x.compare_gt(&Int32Value::new(0)), Bool3::Unknown);
    }

    #[test]
    fn test_unsigned_ranges() {
        let byte = Int32Value::unknown_u8();
        assert_eq!(byte.compare_lt_un(&Int32Value::new(256)), Bool3::True);
        assert_eq!(byte.compare_gt_un(&Int32Value::new(255)), Bool3::False);
        assert_eq!(Int32Value::new(-1).compare_ge_un(&byte), Bool3::True);
        assert_eq!(byte.compare_gt_un(&Int32Value::new(10)), Bool3::Unknown);
        assert_eq!(Int32Value::new(-1).compare_gt_un(&Int32Value::new(1)), Bool3::True);
        assert_eq!(Int32Value::new(-1).compare_gt(&Int32Value::new(1)), Bool3::False);
    }

    #[test]
    fn test_narrowing_conversions() {
        assert_eq!(Int32Value::new(0x1FF).conv_i1(), Int32Value::new(-1));
        assert_eq!(Int32Value::new(0x1FF).conv_u1(), Int32Value::new(0xFF));
        assert_eq!(Int32Value::new(0x18000).conv_i2(), Int32Value::new(-32768));
        assert_eq!(Int32Value::new(-1).conv_u2(), Int32Value::new(0xFFFF));

        let unknown_byte = Int32Value::unknown().conv_u1();
        assert_eq!(unknown_byte, Int32Value::unknown_u8());
        assert_eq!(Int32Value::unknown().conv_i1().valid_mask, 0);

        assert_eq!(Int32Value::new(-1).conv_i8(), Int64Value::new(-1));
        assert_eq!(Int32Value::new(-1).conv_u8(), Int64Value::new(0xFFFF_FFFF));
        assert_eq!(Int32Value::unknown().conv_u8().valid_mask, 0xFFFF_FFFF_0000_0000);
    }

    #[test]
    fn test_checked_conversions() {
        assert_eq!(Int32Value::new(-5).conv_ovf_i1(), Int32Value::new(-5));
        assert!(Int32Value::new(200).conv_ovf_i1().is_unknown());
        assert_eq!(Int32Value::new(200).conv_ovf_u1(), Int32Value::new(200));
        assert!(Int32Value::new(-1).conv_ovf_u1().is_unknown());
        assert_eq!(Int32Value::unknown_u8().conv_ovf_u1(), Int32Value::unknown_u8());
        assert!(Int32Value::new(-1).conv_ovf_non_negative().is_unknown());
        assert!(Int32Value::new(-1).conv_ovf_i1_un().is_unknown());
        assert!(Int32Value::new(-1).conv_ovf_u8().is_unknown());
    }

    #[test]
    fn test_float_conversions() {
        assert_eq!(Int32Value::new(-2).conv_r8(), Real8Value::new(-2.0));
        assert_eq!(Int32Value::new(-1).conv_r_un(), Real8Value::new(4_294_967_295.0));
        assert!(!Int32Value::unknown_bool().conv_r8().is_valid);
    }

    const OPERANDS: [i32; 9] = [i32::MIN, i32::MIN + 1, -2, -1, 0, 1, 2, i32::MAX - 1, i32::MAX];

    // Helper function to check a binary operation on every pair of fully known operands
    fn sweep(op: &str, apply: impl Fn(&Int32Value, &Int32Value) -> Int32Value, expected: impl Fn(i32, i32) -> Option<i32>) {
        for a in OPERANDS {
            for b in OPERANDS {
                let result = apply(&Int32Value::new(a), &Int32Value::new(b));
                match expected(a, b) {
                    Some(value) => assert_eq!(result.known_value(), Some(value), "{op}({a}, {b})"),
                    None => assert!(result.is_unknown(), "{op}({a}, {b}) = {result:?}"),
                }
            }
        }
    }

    // Helper function to check a shift on every operand and every amount from the same set
    fn sweep_shift(op: &str, apply: impl Fn(&Int32Value, &Int32Value) -> Int32Value, expected: impl Fn(i32, u32) -> i32) {
        for a in OPERANDS {
            for amount in [i32::MIN, -1, 0, 1, 2, 32 - 1, 32, i32::MAX] {
                let result = apply(&Int32Value::new(a), &Int32Value::new(amount));
                match u32::try_from(amount).ok().filter(|&bits| bits < 32) {
                    Some(bits) => assert_eq!(result.known_value(), Some(expected(a, bits)), "{op}({a}, {amount})"),
                    None => assert!(result.is_unknown(), "{op}({a}, {amount}) = {result:?}"),
                }
            }
        }
    }

    #[test]
    fn test_known_operands_wrap() {
        sweep("add", Int32Value::add, |a, b| Some(a.wrapping_add(b)));
        sweep("sub", Int32Value::sub, |a, b| Some(a.wrapping_sub(b)));
        sweep("mul", Int32Value::mul, |a, b| Some(a.wrapping_mul(b)));
        sweep("and", Int32Value::and, |a, b| Some(a & b));
        sweep("or", Int32Value::or, |a, b| Some(a | b));
        sweep("xor", Int32Value::xor, |a, b| Some(a ^ b));
        sweep("div", Int32Value::div, i32::checked_div);
        sweep("rem", Int32Value::rem, i32::checked_rem);
        sweep("div.un", Int32Value::div_un, |a, b| (a as u32).checked_div(b as u32).map(|v| v as i32));
        sweep("rem.un", Int32Value::rem_un, |a, b| (a as u32).checked_rem(b as u32).map(|v| v as i32));
    }

    #[test]
    fn test_known_operands_checked() {
        sweep("add.ovf", Int32Value::add_ovf, i32::checked_add);
        sweep("sub.ovf", Int32Value::sub_ovf, i32::checked_sub);
        sweep("mul.ovf", Int32Value::mul_ovf, i32::checked_mul);
        sweep("add.ovf.un", Int32Value::add_ovf_un, |a, b| (a as u32).checked_add(b as u32).map(|v| v as i32));
        sweep("sub.ovf.un", Int32Value::sub_ovf_un, |a, b| (a as u32).checked_sub(b as u32).map(|v| v as i32));
        sweep("mul.ovf.un", Int32Value::mul_ovf_un, |a, b| (a as u32).checked_mul(b as u32).map(|v| v as i32));
    }

    #[test]
    fn test_known_operands_shift() {
        sweep_shift("shl", Int32Value::shl, |a, bits| a << bits);
        sweep_shift("shr", Int32Value::shr, |a, bits| a >> bits);
        sweep_shift("shr.un", Int32Value::shr_un, |a, bits| ((a as u32) >> bits) as i32);
    }
}
