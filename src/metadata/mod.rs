//! Metadata descriptions consumed by the simplifier.
//!
//! This module models the slice of .NET metadata that control flow simplification needs:
//! tokens, method signatures and bodies, declared types of locals and fields, type visibility
//! and nesting, and assembly identity. All of it is supplied by a frontend through
//! [`resolver::MetadataResolver`].
//!
//! # Key Components
//!
//! - [`token::Token`] - Metadata table references used as instruction operands
//! - [`method::MethodDesc`] - Signature, locals, flags and flat body of a method
//! - [`typesystem::ElementType`] - Declared slot types driving value truncation
//! - [`typesystem::TypeDesc`] - Visibility, nesting and inheritance of a type
//! - [`resolver::MetadataResolver`] - Token resolution and friend-assembly lookups

pub mod method;
pub mod resolver;
pub mod token;
pub mod typesystem;
