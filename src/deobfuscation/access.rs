//! Visibility checks for members and types.
//!
//! The checker answers "may code in the accessing type reference this member?" following
//! the runtime's accessibility rules:
//!
//! - A type has full access to itself and to every type it lexically encloses, private
//!   members included.
//! - A nested type has full access to its enclosing types themselves, but sees their
//!   members with normal access, so private members stay hidden.
//! - Assembly visibility extends to friend assemblies.
//! - Family visibility requires the accessing type, or one of its enclosing types, to derive
//!   from the declaring type.
//!
//! Every answer is a [`Bool3`]. `Unknown` means some type on the way could not be resolved,
//! or no accessing type was configured; callers decide how conservative to be.

use crate::{
    emulation::Bool3,
    metadata::{
        resolver::MetadataResolver,
        token::Token,
        typesystem::{FieldAttributes, TypeAttributes, TypeDesc, TypeRc},
    },
};

/// Bound on the enclosing-type walk.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Bound on the base-type walk.
pub const MAX_INHERITANCE_DEPTH: usize = 256;

/// Access the accessing type has to a type and its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeAccess {
    /// The type is not visible
    Denied,
    /// The type is visible; members are checked by their own access
    Normal,
    /// The type encloses the accessor; members are still checked by their own access
    Full,
    /// The type is the accessor or nested in it; every member is visible
    FullMember,
}

/// Member access level, shared by methods and fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemberAccess {
    CompilerControlled,
    Private,
    FamAndAssem,
    Assembly,
    Family,
    FamOrAssem,
    Public,
}

impl MemberAccess {
    fn from_bits(bits: u32) -> Self {
        match bits & FieldAttributes::FIELD_ACCESS_MASK {
            FieldAttributes::PRIVATE => MemberAccess::Private,
            FieldAttributes::FAM_AND_ASSEM => MemberAccess::FamAndAssem,
            FieldAttributes::ASSEMBLY => MemberAccess::Assembly,
            FieldAttributes::FAMILY => MemberAccess::Family,
            FieldAttributes::FAM_OR_ASSEM => MemberAccess::FamOrAssem,
            FieldAttributes::PUBLIC => MemberAccess::Public,
            _ => MemberAccess::CompilerControlled,
        }
    }
}

/// Checks whether an accessing type may reference methods, fields and types.
///
/// # Example
///
/// ```rust
/// use dotflow::{
///     deobfuscation::AccessChecker,
///     emulation::Bool3,
///     metadata::{resolver::MetadataStore, token::Token},
/// };
///
/// let store = MetadataStore::new();
/// let checker = AccessChecker::new(&store);
/// // Nothing can be decided without an accessing type
/// assert_eq!(checker.can_access_type(Token::new(0x0200_0002)), Bool3::Unknown);
/// ```
#[derive(Clone, Copy)]
pub struct AccessChecker<'a> {
    resolver: &'a dyn MetadataResolver,
    accessor: Option<Token>,
}

impl<'a> AccessChecker<'a> {
    /// Creates a checker without an accessing type.
    #[must_use]
    pub fn new(resolver: &'a dyn MetadataResolver) -> Self {
        AccessChecker { resolver, accessor: None }
    }

    /// Sets the type whose code performs the accesses.
    #[must_use]
    pub fn with_accessor(mut self, accessor: Token) -> Self {
        self.accessor = Some(accessor);
        self
    }

    /// The configured accessing type.
    #[must_use]
    pub fn accessor(&self) -> Option<Token> {
        self.accessor
    }

    /// Can the accessing type reference the type `token`?
    #[must_use]
    pub fn can_access_type(&self, token: Token) -> Bool3 {
        let Some((accessor, td)) = self.resolve_pair(token) else {
            return Bool3::Unknown;
        };
        match self.type_access(&accessor, &td, 0) {
            Some(TypeAccess::Denied) => Bool3::False,
            Some(_) => Bool3::True,
            None => Bool3::Unknown,
        }
    }

    /// Can the accessing type reference the method `token`?
    #[must_use]
    pub fn can_access_method(&self, token: Token) -> Bool3 {
        match self.resolver.method(token) {
            Some(method) => self.can_access_member(method.declaring_type, method.access.bits()),
            None => Bool3::Unknown,
        }
    }

    /// Can the accessing type reference the field `token`?
    #[must_use]
    pub fn can_access_field(&self, token: Token) -> Bool3 {
        match self.resolver.field(token) {
            Some(field) => self.can_access_member(field.declaring_type, field.access()),
            None => Bool3::Unknown,
        }
    }

    fn resolve_pair(&self, token: Token) -> Option<(TypeRc, TypeRc)> {
        let accessor = self.resolver.type_def(self.accessor?)?;
        let td = self.resolver.type_def(token)?;
        Some((accessor, td))
    }

    fn can_access_member(&self, declaring_type: Token, access_bits: u32) -> Bool3 {
        let Some((accessor, declaring)) = self.resolve_pair(declaring_type) else {
            return Bool3::Unknown;
        };
        match self.type_access(&accessor, &declaring, 0) {
            None => return Bool3::Unknown,
            Some(TypeAccess::Denied) => return Bool3::False,
            Some(TypeAccess::FullMember) => return Bool3::True,
            Some(TypeAccess::Normal | TypeAccess::Full) => {}
        }

        let assembly = || Bool3::from_bool(self.same_assembly_or_friend(&accessor, &declaring));
        let family = || self.is_family(&accessor, declaring.token);
        match MemberAccess::from_bits(access_bits) {
            MemberAccess::Public => Bool3::True,
            MemberAccess::Private | MemberAccess::CompilerControlled => Bool3::False,
            MemberAccess::Assembly => assembly(),
            MemberAccess::Family => family(),
            MemberAccess::FamAndAssem => assembly().and(family()),
            MemberAccess::FamOrAssem => assembly().or(family()),
        }
    }

    fn same_assembly_or_friend(&self, accessor: &TypeDesc, td: &TypeDesc) -> bool {
        accessor.assembly == td.assembly || self.resolver.is_friend_assembly_of(td.assembly, accessor.assembly)
    }

    /// Is `inner` the type `outer` or lexically nested in it? `None` if the chain is broken.
    fn is_within(&self, inner: &TypeDesc, outer: Token) -> Option<bool> {
        if inner.token == outer {
            return Some(true);
        }
        let mut enclosing = inner.enclosing;
        for _ in 0..MAX_NESTING_DEPTH {
            let Some(token) = enclosing else {
                return Some(false);
            };
            if token == outer {
                return Some(true);
            }
            enclosing = self.resolver.type_def(token)?.enclosing;
        }
        None
    }

    /// Does `td` derive from `base`, directly or indirectly?
    fn derives_from(&self, td: &TypeDesc, base: Token) -> Bool3 {
        if td.token == base {
            return Bool3::True;
        }
        let mut next = td.base;
        for _ in 0..MAX_INHERITANCE_DEPTH {
            let Some(token) = next else {
                return Bool3::False;
            };
            if token == base {
                return Bool3::True;
            }
            match self.resolver.type_def(token) {
                Some(parent) => next = parent.base,
                None => return Bool3::Unknown,
            }
        }
        Bool3::Unknown
    }

    /// Does the accessor, or one of its enclosing types, derive from `declaring`?
    fn is_family(&self, accessor: &TypeDesc, declaring: Token) -> Bool3 {
        let mut result = self.derives_from(accessor, declaring);
        let mut enclosing = accessor.enclosing;

        for _ in 0..MAX_NESTING_DEPTH {
            if result.is_true() {
                return result;
            }
            let Some(token) = enclosing else {
                return result;
            };
            let Some(outer) = self.resolver.type_def(token) else {
                return Bool3::Unknown;
            };
            result = result.or(self.derives_from(&outer, declaring));
            enclosing = outer.enclosing;
        }
        if result.is_true() {
            result
        } else {
            Bool3::Unknown
        }
    }

    fn within_or_family(&self, accessor: &TypeDesc, outer: Token) -> Bool3 {
        match self.is_within(accessor, outer) {
            Some(true) => Bool3::True,
            Some(false) => self.is_family(accessor, outer),
            None => Bool3::Unknown,
        }
    }

    /// Access of `accessor` to `td`, `None` if undecidable.
    fn type_access(&self, accessor: &TypeDesc, td: &TypeDesc, depth: usize) -> Option<TypeAccess> {
        if depth > MAX_NESTING_DEPTH {
            return None;
        }
        if self.is_within(td, accessor.token)? {
            return Some(TypeAccess::FullMember);
        }
        if self.is_within(accessor, td.token)? {
            return Some(TypeAccess::Full);
        }

        let Some(enclosing) = td.enclosing else {
            let visible = td.visibility() == TypeAttributes::PUBLIC || self.same_assembly_or_friend(accessor, td);
            return Some(if visible {
                TypeAccess::Normal
            } else {
                TypeAccess::Denied
            });
        };

        let outer = self.resolver.type_def(enclosing)?;
        if self.type_access(accessor, &outer, depth + 1)? == TypeAccess::Denied {
            return Some(TypeAccess::Denied);
        }

        let assembly = || Bool3::from_bool(self.same_assembly_or_friend(accessor, td));
        let granted = match td.visibility() {
            TypeAttributes::NESTED_PUBLIC => Bool3::True,
            TypeAttributes::NESTED_PRIVATE => Bool3::from_bool(self.is_within(accessor, enclosing)?),
            TypeAttributes::NESTED_FAMILY => self.within_or_family(accessor, enclosing),
            TypeAttributes::NESTED_ASSEMBLY => assembly(),
            TypeAttributes::NESTED_FAM_AND_ASSEM => assembly().and(self.within_or_family(accessor, enclosing)),
            TypeAttributes::NESTED_FAM_OR_ASSEM => assembly().or(self.within_or_family(accessor, enclosing)),
            _ => Bool3::False,
        };

        granted
            .as_bool()
            .map(|granted| if granted { TypeAccess::Normal } else { TypeAccess::Denied })
    }
}
