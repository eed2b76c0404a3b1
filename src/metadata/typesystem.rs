//! Type descriptions consumed by the emulator, the inliner and the access checker.
//!
//! The simplifier never parses metadata itself. A frontend describes the types, fields and
//! methods it knows about with the plain structures in this module and hands them out through
//! a [`crate::metadata::resolver::MetadataResolver`].
//!
//! # Key Types
//! - [`ElementType`]: The declared type of a local, argument, field or return slot
//! - [`TypeDesc`]: A type definition with visibility, nesting and inheritance links
//! - [`FieldDesc`]: A resolved field
//! - [`TypeAttributes`] / [`FieldAttributes`]: Raw flag constants

use std::{fmt, sync::Arc};

use crate::metadata::token::Token;

/// Identity of an assembly, as assigned by the frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssemblyId(pub u32);

/// The declared type of a storage slot.
///
/// Only the distinctions the emulator and the inliner need are kept: primitive widths and
/// signedness, reference-ness, value types and managed pointers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// `void`, only valid as a return type
    Void,
    /// `bool`
    Boolean,
    /// `char`
    Char,
    /// `sbyte`
    I1,
    /// `byte`
    U1,
    /// `short`
    I2,
    /// `ushort`
    U2,
    /// `int`
    I4,
    /// `uint`
    U4,
    /// `long`
    I8,
    /// `ulong`
    U8,
    /// `float`
    R4,
    /// `double`
    R8,
    /// Native int
    I,
    /// Native unsigned int
    U,
    /// `string`
    String,
    /// `object`
    Object,
    /// A reference type
    Class(Token),
    /// A value type
    ValueType(Token),
    /// A single-dimensional array of the inner type
    SzArray(Box<ElementType>),
    /// A managed pointer to the inner type
    ByRef(Box<ElementType>),
    /// A generic type or method parameter
    GenericParam(u32),
}

impl ElementType {
    /// Returns true for types whose values are object references.
    #[must_use]
    pub fn is_reference_type(&self) -> bool {
        matches!(
            self,
            ElementType::String | ElementType::Object | ElementType::Class(_) | ElementType::SzArray(_)
        )
    }

    /// Returns true for primitive and user-defined value types.
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        matches!(
            self,
            ElementType::Boolean
                | ElementType::Char
                | ElementType::I1
                | ElementType::U1
                | ElementType::I2
                | ElementType::U2
                | ElementType::I4
                | ElementType::U4
                | ElementType::I8
                | ElementType::U8
                | ElementType::R4
                | ElementType::R8
                | ElementType::I
                | ElementType::U
                | ElementType::ValueType(_)
        )
    }

    /// Returns true for a generic parameter, whose layout is not known statically.
    #[must_use]
    pub fn is_generic_param(&self) -> bool {
        matches!(self, ElementType::GenericParam(_))
    }

    /// Returns true for integer types that are 32 bits or narrower on the evaluation stack.
    #[must_use]
    pub fn is_int32_on_stack(&self) -> bool {
        matches!(
            self,
            ElementType::Boolean
                | ElementType::Char
                | ElementType::I1
                | ElementType::U1
                | ElementType::I2
                | ElementType::U2
                | ElementType::I4
                | ElementType::U4
        )
    }

    /// Returns true for 64-bit integers.
    #[must_use]
    pub fn is_int64(&self) -> bool {
        matches!(self, ElementType::I8 | ElementType::U8)
    }

    /// Returns true for floating point types.
    #[must_use]
    pub fn is_float(&self) -> bool {
        matches!(self, ElementType::R4 | ElementType::R8)
    }

    /// Wraps this type in a managed pointer.
    #[must_use]
    pub fn by_ref(self) -> Self {
        ElementType::ByRef(Box::new(self))
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Void => f.write_str("void"),
            ElementType::Boolean => f.write_str("bool"),
            ElementType::Char => f.write_str("char"),
            ElementType::I1 => f.write_str("int8"),
            ElementType::U1 => f.write_str("uint8"),
            ElementType::I2 => f.write_str("int16"),
            ElementType::U2 => f.write_str("uint16"),
            ElementType::I4 => f.write_str("int32"),
            ElementType::U4 => f.write_str("uint32"),
            ElementType::I8 => f.write_str("int64"),
            ElementType::U8 => f.write_str("uint64"),
            ElementType::R4 => f.write_str("float32"),
            ElementType::R8 => f.write_str("float64"),
            ElementType::I => f.write_str("native int"),
            ElementType::U => f.write_str("native uint"),
            ElementType::String => f.write_str("string"),
            ElementType::Object => f.write_str("object"),
            ElementType::Class(token) => write!(f, "class {token}"),
            ElementType::ValueType(token) => write!(f, "valuetype {token}"),
            ElementType::SzArray(inner) => write!(f, "{inner}[]"),
            ElementType::ByRef(inner) => write!(f, "{inner}&"),
            ElementType::GenericParam(index) => write!(f, "!{index}"),
        }
    }
}

#[allow(non_snake_case)]
/// Type attribute flag constants for type definitions.
///
/// Only the visibility group matters for access checks. Use
/// [`TypeAttributes::VISIBILITY_MASK`] to isolate it, then compare against the constants.
pub mod TypeAttributes {
    /// Mask for extracting type visibility information.
    pub const VISIBILITY_MASK: u32 = 0x0000_0007;
    /// Type has no public scope (internal to assembly).
    pub const NOT_PUBLIC: u32 = 0x0000_0000;
    /// Type has public scope.
    pub const PUBLIC: u32 = 0x0000_0001;
    /// Nested type with public visibility.
    pub const NESTED_PUBLIC: u32 = 0x0000_0002;
    /// Nested type visible only within its enclosing type.
    pub const NESTED_PRIVATE: u32 = 0x0000_0003;
    /// Nested type visible to the enclosing type and its subtypes.
    pub const NESTED_FAMILY: u32 = 0x0000_0004;
    /// Nested type visible within the assembly.
    pub const NESTED_ASSEMBLY: u32 = 0x0000_0005;
    /// Nested type visible to subtypes within the assembly.
    pub const NESTED_FAM_AND_ASSEM: u32 = 0x0000_0006;
    /// Nested type visible to subtypes or anyone in the assembly.
    pub const NESTED_FAM_OR_ASSEM: u32 = 0x0000_0007;
    /// Type is an interface.
    pub const INTERFACE: u32 = 0x0000_0020;
    /// Type is sealed.
    pub const SEALED: u32 = 0x0000_0100;
}

#[allow(non_snake_case)]
/// Field attribute flag constants.
pub mod FieldAttributes {
    /// Mask for extracting member access information.
    pub const FIELD_ACCESS_MASK: u32 = 0x0007;
    /// Member not referenceable.
    pub const COMPILER_CONTROLLED: u32 = 0x0000;
    /// Accessible only by the parent type.
    pub const PRIVATE: u32 = 0x0001;
    /// Accessible by sub-types only in this assembly.
    pub const FAM_AND_ASSEM: u32 = 0x0002;
    /// Accessible by anyone in the assembly.
    pub const ASSEMBLY: u32 = 0x0003;
    /// Accessible only by type and sub-types.
    pub const FAMILY: u32 = 0x0004;
    /// Accessible by sub-types anywhere, plus anyone in the assembly.
    pub const FAM_OR_ASSEM: u32 = 0x0005;
    /// Accessible by anyone who has visibility to this scope.
    pub const PUBLIC: u32 = 0x0006;
    /// Defined on type, else per instance.
    pub const STATIC: u32 = 0x0010;
    /// Field can only be initialized, not written to after init.
    pub const INIT_ONLY: u32 = 0x0020;
    /// Value is compile time constant.
    pub const LITERAL: u32 = 0x0040;
}

/// A type definition as seen by the access checker.
#[derive(Debug, Clone)]
pub struct TypeDesc {
    /// Token of the type
    pub token: Token,
    /// Full name, for diagnostics
    pub name: String,
    /// Raw [`TypeAttributes`] flags
    pub flags: u32,
    /// Lexically enclosing type for nested types
    pub enclosing: Option<Token>,
    /// Base type, `None` for `System.Object` and interfaces
    pub base: Option<Token>,
    /// Assembly the type is defined in
    pub assembly: AssemblyId,
}

/// Reference-counted pointer to a [`TypeDesc`]
pub type TypeRc = Arc<TypeDesc>;

impl TypeDesc {
    /// Creates a top-level type description.
    #[must_use]
    pub fn new(token: Token, name: &str, flags: u32, assembly: AssemblyId) -> Self {
        TypeDesc {
            token,
            name: name.to_string(),
            flags,
            enclosing: None,
            base: None,
            assembly,
        }
    }

    /// Sets the lexically enclosing type.
    #[must_use]
    pub fn nested_in(mut self, enclosing: Token) -> Self {
        self.enclosing = Some(enclosing);
        self
    }

    /// Sets the base type.
    #[must_use]
    pub fn extends(mut self, base: Token) -> Self {
        self.base = Some(base);
        self
    }

    /// Returns the visibility bits of the flags.
    #[must_use]
    pub fn visibility(&self) -> u32 {
        self.flags & TypeAttributes::VISIBILITY_MASK
    }

    /// Returns true if this type is nested inside another type.
    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.enclosing.is_some()
    }
}

/// A resolved field.
#[derive(Debug, Clone)]
pub struct FieldDesc {
    /// Token of the field
    pub token: Token,
    /// Field name, for diagnostics
    pub name: String,
    /// Declaring type
    pub declaring_type: Token,
    /// Declared type of the field
    pub field_type: ElementType,
    /// Raw [`FieldAttributes`] flags
    pub flags: u32,
}

/// Reference-counted pointer to a [`FieldDesc`]
pub type FieldRc = Arc<FieldDesc>;

impl FieldDesc {
    /// Creates a field description.
    #[must_use]
    pub fn new(token: Token, name: &str, declaring_type: Token, field_type: ElementType, flags: u32) -> Self {
        FieldDesc {
            token,
            name: name.to_string(),
            declaring_type,
            field_type,
            flags,
        }
    }

    /// Returns the member access bits of the flags.
    #[must_use]
    pub fn access(&self) -> u32 {
        self.flags & FieldAttributes::FIELD_ACCESS_MASK
    }

    /// Returns true for static fields.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags & FieldAttributes::STATIC != 0
    }
}
