//! Opaque metadata lookups provided by the bytecode frontend.
//!
//! The simplifier treats metadata as an external collaborator. Everything it needs to know
//! about a call target, a field or a type goes through [`MetadataResolver`], and a failed
//! lookup is an expected outcome that degrades to "no change" rather than an error.
//!
//! [`MetadataStore`] is a plain in-memory implementation, useful for embedders that already
//! hold the data in memory and for tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::metadata::{
    method::{MethodDesc, MethodRc},
    token::Token,
    typesystem::{AssemblyId, FieldDesc, FieldRc, TypeDesc, TypeRc},
};

/// Resolves metadata tokens found in instruction operands.
pub trait MetadataResolver {
    /// Resolves a `MethodDef`, `MemberRef` or `MethodSpec` token to a method.
    fn method(&self, token: Token) -> Option<MethodRc>;

    /// Resolves a `Field` or `MemberRef` token to a field.
    fn field(&self, token: Token) -> Option<FieldRc>;

    /// Resolves a type token to its definition.
    fn type_def(&self, token: Token) -> Option<TypeRc>;

    /// Returns true if `accessor` is declared a friend of `target`, granting it access to
    /// assembly-visible members of `target`.
    fn is_friend_assembly_of(&self, _target: AssemblyId, _accessor: AssemblyId) -> bool {
        false
    }
}

/// An in-memory [`MetadataResolver`].
#[derive(Debug, Default, Clone)]
pub struct MetadataStore {
    methods: HashMap<Token, MethodRc>,
    fields: HashMap<Token, FieldRc>,
    types: HashMap<Token, TypeRc>,
    friends: HashSet<(AssemblyId, AssemblyId)>,
}

impl MetadataStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a method under its own token and returns the shared handle.
    pub fn add_method(&mut self, method: MethodDesc) -> MethodRc {
        let method = Arc::new(method);
        self.methods.insert(method.token, method.clone());
        method
    }

    /// Registers an additional token (e.g. a `MemberRef`) resolving to an existing method.
    pub fn alias_method(&mut self, token: Token, method: &MethodRc) {
        self.methods.insert(token, method.clone());
    }

    /// Registers a field under its own token.
    pub fn add_field(&mut self, field: FieldDesc) -> FieldRc {
        let field = Arc::new(field);
        self.fields.insert(field.token, field.clone());
        field
    }

    /// Registers a type under its own token.
    pub fn add_type(&mut self, td: TypeDesc) -> TypeRc {
        let td = Arc::new(td);
        self.types.insert(td.token, td.clone());
        td
    }

    /// Declares `accessor` a friend assembly of `target`.
    pub fn add_friend(&mut self, target: AssemblyId, accessor: AssemblyId) {
        self.friends.insert((target, accessor));
    }
}

impl MetadataResolver for MetadataStore {
    fn method(&self, token: Token) -> Option<MethodRc> {
        self.methods.get(&token).cloned()
    }

    fn field(&self, token: Token) -> Option<FieldRc> {
        self.fields.get(&token).cloned()
    }

    fn type_def(&self, token: Token) -> Option<TypeRc> {
        self.types.get(&token).cloned()
    }

    fn is_friend_assembly_of(&self, target: AssemblyId, accessor: AssemblyId) -> bool {
        self.friends.contains(&(target, accessor))
    }
}
