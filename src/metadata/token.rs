//! Metadata tokens referencing rows of metadata tables.

use std::fmt;
use std::hash::{Hash, Hasher};

/// A metadata token referencing a row of a metadata table.
///
/// The high byte selects the table, the low 24 bits the row index. Instruction operands that
/// name methods, fields or types carry a token which is handed to the
/// [`crate::metadata::resolver::MetadataResolver`] for resolution.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Token(pub u32);

impl Token {
    /// Table id of `TypeRef` rows
    pub const TABLE_TYPE_REF: u8 = 0x01;
    /// Table id of `TypeDef` rows
    pub const TABLE_TYPE_DEF: u8 = 0x02;
    /// Table id of `Field` rows
    pub const TABLE_FIELD: u8 = 0x04;
    /// Table id of `MethodDef` rows
    pub const TABLE_METHOD_DEF: u8 = 0x06;
    /// Table id of `MemberRef` rows
    pub const TABLE_MEMBER_REF: u8 = 0x0A;
    /// Table id of `TypeSpec` rows
    pub const TABLE_TYPE_SPEC: u8 = 0x1B;
    /// Table id of `MethodSpec` rows (generic method instantiations)
    pub const TABLE_METHOD_SPEC: u8 = 0x2B;

    /// Creates a new token from a raw 32-bit value
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Token(value)
    }

    /// Creates a token from a table id and a row index
    #[must_use]
    pub fn from_parts(table: u8, row: u32) -> Self {
        Token((u32::from(table) << 24) | (row & 0x00FF_FFFF))
    }

    /// Returns the raw token value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Extracts the table type from the token (high byte)
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Extracts the row index from the token (low 24 bits)
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns true if this is a null token (value 0)
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if the token references an instantiated generic method or type
    #[must_use]
    pub fn is_generic_instantiation(&self) -> bool {
        matches!(self.table(), Self::TABLE_METHOD_SPEC | Self::TABLE_TYPE_SPEC)
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}
