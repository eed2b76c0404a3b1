//! Method descriptions, method attribute flags and flat method bodies.
//!
//! A [`MethodDesc`] carries everything the simplifier consumes about a method: its signature,
//! declared locals, the `init_locals` flag of its header, attribute flags and optionally a
//! [`MethodBody`] in flat form (an instruction list plus an exception handler table).
//!
//! Flat bodies address instructions by index. Branch operands and handler ranges are
//! instruction indices, not byte offsets, and all short and macro forms are expected to have
//! been expanded by the frontend.

use std::sync::Arc;

use bitflags::bitflags;

use crate::{
    assembly::Instruction,
    metadata::{token::Token, typesystem::ElementType},
};

/// Bitmask for `ACCESS` state extraction
pub const METHOD_ACCESS_MASK: u32 = 0x0007;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Method access flags
    pub struct MethodAccessFlags: u32 {
        /// Member not referenceable
        const COMPILER_CONTROLLED = 0x0000;
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by sub-types only in this Assembly
        const FAM_AND_ASSEM = 0x0002;
        /// Accessibly by anyone in the Assembly
        const ASSEM = 0x0003;
        /// Accessible only by type and sub-types
        const FAMILY = 0x0004;
        /// Accessibly by sub-types anywhere, plus anyone in assembly
        const FAM_OR_ASSEM = 0x0005;
        /// Accessibly by anyone who has visibility to this scope
        const PUBLIC = 0x0006;
    }
}

impl MethodAccessFlags {
    /// Extract access flags from raw method attributes
    #[must_use]
    pub fn from_method_flags(flags: u32) -> Self {
        let access = flags & METHOD_ACCESS_MASK;
        Self::from_bits_truncate(access)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Method modifiers and properties
    pub struct MethodModifiers: u32 {
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Method cannot be overridden
        const FINAL = 0x0020;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method hides by name+sig, else just by name
        const HIDE_BY_SIG = 0x0080;
        /// Method does not provide an implementation
        const ABSTRACT = 0x0400;
        /// Method is special
        const SPECIAL_NAME = 0x0800;
    }
}

impl MethodModifiers {
    /// Extract method modifiers from raw method attributes
    #[must_use]
    pub fn from_method_flags(flags: u32) -> Self {
        Self::from_bits_truncate(flags & !METHOD_ACCESS_MASK)
    }
}

/// The calling signature of a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    /// Type of the implicit `this` argument, `None` for static methods
    pub this_type: Option<ElementType>,
    /// Declared parameter types, excluding `this`
    pub params: Vec<ElementType>,
    /// Declared return type
    pub return_type: ElementType,
}

impl MethodSignature {
    /// Signature of a static method.
    #[must_use]
    pub fn new_static(params: Vec<ElementType>, return_type: ElementType) -> Self {
        MethodSignature {
            this_type: None,
            params,
            return_type,
        }
    }

    /// Signature of an instance method with the given `this` type.
    #[must_use]
    pub fn new_instance(this_type: ElementType, params: Vec<ElementType>, return_type: ElementType) -> Self {
        MethodSignature {
            this_type: Some(this_type),
            params,
            return_type,
        }
    }

    /// Returns true if the method takes an implicit `this`.
    #[must_use]
    pub fn has_this(&self) -> bool {
        self.this_type.is_some()
    }

    /// Number of stack arguments consumed by a call, including `this`.
    #[must_use]
    pub fn arg_count(&self) -> usize {
        self.params.len() + usize::from(self.has_this())
    }

    /// Argument slot types in call order, `this` first.
    #[must_use]
    pub fn arg_types(&self) -> Vec<ElementType> {
        self.this_type
            .iter()
            .cloned()
            .chain(self.params.iter().cloned())
            .collect()
    }

    /// Returns true if a call pushes a result.
    #[must_use]
    pub fn returns_value(&self) -> bool {
        self.return_type != ElementType::Void
    }
}

/// The kind of an exception handler clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// Typed catch clause
    Catch(Token),
    /// Filter clause, the filter code starts at the given instruction index
    Filter(usize),
    /// Finally clause
    Finally,
    /// Fault clause
    Fault,
}

/// An exception handler clause of a flat method body.
///
/// Ranges are half-open instruction index intervals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Kind of the clause
    pub kind: HandlerKind,
    /// First instruction of the protected region
    pub try_start: usize,
    /// One past the last instruction of the protected region
    pub try_end: usize,
    /// First instruction of the handler
    pub handler_start: usize,
    /// One past the last instruction of the handler
    pub handler_end: usize,
}

/// A method body in flat form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodBody {
    /// Instructions, branch operands are indices into this list
    pub instructions: Vec<Instruction>,
    /// Exception handler table
    pub handlers: Vec<ExceptionHandler>,
}

impl MethodBody {
    /// Creates a body without exception handlers.
    #[must_use]
    pub fn new(instructions: Vec<Instruction>) -> Self {
        MethodBody {
            instructions,
            handlers: Vec::new(),
        }
    }

    /// Adds an exception handler clause.
    #[must_use]
    pub fn with_handler(mut self, handler: ExceptionHandler) -> Self {
        self.handlers.push(handler);
        self
    }
}

/// A method as consumed by the simplifier.
#[derive(Debug, Clone)]
pub struct MethodDesc {
    /// Token of the method definition
    pub token: Token,
    /// Method name, for diagnostics
    pub name: String,
    /// Declaring type
    pub declaring_type: Token,
    /// Calling signature
    pub signature: MethodSignature,
    /// Declared local variable types
    pub locals: Vec<ElementType>,
    /// Whether the runtime zero-initializes locals on entry
    pub init_locals: bool,
    /// Number of generic method parameters
    pub generic_params: u32,
    /// Member access
    pub access: MethodAccessFlags,
    /// Modifiers
    pub modifiers: MethodModifiers,
    /// Body in flat form, `None` for abstract, extern or unresolved bodies
    pub body: Option<MethodBody>,
}

/// Reference-counted pointer to a [`MethodDesc`]
pub type MethodRc = Arc<MethodDesc>;

impl MethodDesc {
    /// Creates a public, non-generic method without locals or body.
    ///
    /// The `STATIC` modifier is derived from the signature.
    #[must_use]
    pub fn new(token: Token, name: &str, declaring_type: Token, signature: MethodSignature) -> Self {
        let modifiers = if signature.has_this() {
            MethodModifiers::empty()
        } else {
            MethodModifiers::STATIC
        };

        MethodDesc {
            token,
            name: name.to_string(),
            declaring_type,
            signature,
            locals: Vec::new(),
            init_locals: true,
            generic_params: 0,
            access: MethodAccessFlags::PUBLIC,
            modifiers,
            body: None,
        }
    }

    /// Sets the declared locals.
    #[must_use]
    pub fn with_locals(mut self, locals: Vec<ElementType>) -> Self {
        self.locals = locals;
        self
    }

    /// Sets the `init_locals` header flag.
    #[must_use]
    pub fn with_init_locals(mut self, init_locals: bool) -> Self {
        self.init_locals = init_locals;
        self
    }

    /// Sets the member access.
    #[must_use]
    pub fn with_access(mut self, access: MethodAccessFlags) -> Self {
        self.access = access;
        self
    }

    /// Adds modifiers on top of the ones derived from the signature.
    #[must_use]
    pub fn with_modifiers(mut self, modifiers: MethodModifiers) -> Self {
        self.modifiers |= modifiers;
        self
    }

    /// Sets the number of generic method parameters.
    #[must_use]
    pub fn with_generic_params(mut self, count: u32) -> Self {
        self.generic_params = count;
        self
    }

    /// Attaches a body.
    #[must_use]
    pub fn with_body(mut self, body: MethodBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Returns true for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.modifiers.contains(MethodModifiers::STATIC)
    }

    /// Returns true for virtual methods.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.modifiers.contains(MethodModifiers::VIRTUAL)
    }

    /// Returns true for generic method definitions.
    #[must_use]
    pub fn is_generic(&self) -> bool {
        self.generic_params > 0
    }

    /// Declared type of argument `index`, `this` being argument 0 of instance methods.
    #[must_use]
    pub fn arg_type(&self, index: usize) -> Option<ElementType> {
        match &self.signature.this_type {
            Some(this_type) if index == 0 => Some(this_type.clone()),
            Some(_) => self.signature.params.get(index - 1).cloned(),
            None => self.signature.params.get(index).cloned(),
        }
    }
}
