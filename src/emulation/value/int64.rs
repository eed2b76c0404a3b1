use super::{Bool3, Int32Value, OriginId, Real8Value};

int_domain!(
    /// A 64-bit integer with per-bit knowledge.
    Int64Value,
    i64,
    u64,
    64
);

impl Int64Value {
    /// `conv.i4`/`conv.u4`: keep the low 32 bits.
    #[must_use]
    pub fn conv_i4(&self) -> Int32Value {
        Int32Value::with_mask(self.value as i32, self.valid_mask as u32)
    }

    /// `conv.r8`
    #[must_use]
    pub fn conv_r8(&self) -> Real8Value {
        self.known_value()
            .map_or_else(Real8Value::unknown, |v| Real8Value::new(v as f64))
    }

    /// `conv.r.un`
    #[must_use]
    pub fn conv_r_un(&self) -> Real8Value {
        self.known_value()
            .map_or_else(Real8Value::unknown, |v| Real8Value::new(v as u64 as f64))
    }

    /// `conv.r4`
    #[must_use]
    pub fn conv_r4(&self) -> Real8Value {
        self.known_value()
            .map_or_else(Real8Value::unknown, |v| Real8Value::new(f64::from(v as f32)))
    }

    /// Narrows with an overflow check: `fits` must prove that truncating to 32 bits and
    /// applying `convert` preserves the value.
    fn checked_narrow(&self, fits: bool, convert: impl FnOnce(&Int32Value) -> Int32Value) -> Int32Value {
        if fits {
            convert(&self.conv_i4())
        } else {
            Int32Value::unknown()
        }
    }

    fn fits_signed(&self, high: u64) -> bool {
        self.known_zero(high) || self.known_ones(high)
    }

    /// `conv.ovf.i1`
    #[must_use]
    pub fn conv_ovf_i1(&self) -> Int32Value {
        self.checked_narrow(self.fits_signed(!0x7F), Int32Value::conv_i1)
    }

    /// `conv.ovf.u1`
    #[must_use]
    pub fn conv_ovf_u1(&self) -> Int32Value {
        self.checked_narrow(self.known_zero(!0xFF), Int32Value::conv_u1)
    }

    /// `conv.ovf.i2`
    #[must_use]
    pub fn conv_ovf_i2(&self) -> Int32Value {
        self.checked_narrow(self.fits_signed(!0x7FFF), Int32Value::conv_i2)
    }

    /// `conv.ovf.u2`
    #[must_use]
    pub fn conv_ovf_u2(&self) -> Int32Value {
        self.checked_narrow(self.known_zero(!0xFFFF), Int32Value::conv_u2)
    }

    /// `conv.ovf.i4`
    #[must_use]
    pub fn conv_ovf_i4(&self) -> Int32Value {
        self.checked_narrow(self.fits_signed(!0x7FFF_FFFF), |v| *v)
    }

    /// `conv.ovf.u4`
    #[must_use]
    pub fn conv_ovf_u4(&self) -> Int32Value {
        self.checked_narrow(self.known_zero(!0xFFFF_FFFF), |v| *v)
    }

    /// `conv.ovf.u8` and `conv.ovf.i8.un`: the value must be non-negative.
    #[must_use]
    pub fn conv_ovf_non_negative(&self) -> Self {
        if self.known_zero(1 << 63) {
            *self
        } else {
            Self::unknown()
        }
    }

    /// `conv.ovf.i1.un`
    #[must_use]
    pub fn conv_ovf_i1_un(&self) -> Int32Value {
        self.checked_narrow(self.known_zero(!0x7F), Int32Value::conv_i1)
    }

    /// `conv.ovf.i2.un`
    #[must_use]
    pub fn conv_ovf_i2_un(&self) -> Int32Value {
        self.checked_narrow(self.known_zero(!0x7FFF), Int32Value::conv_i2)
    }

    /// `conv.ovf.i4.un`
    #[must_use]
    pub fn conv_ovf_i4_un(&self) -> Int32Value {
        self.checked_narrow(self.known_zero(!0x7FFF_FFFF), |v| *v)
    }
}
