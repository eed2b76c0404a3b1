//! Inlining of trivial forwarding methods.
//!
//! Protectors hide calls, field accesses and token loads behind generated one-line methods:
//!
//! ```text
//! static int Proxy(object a, int b)
//! {
//!     ldarg.0
//!     ldarg.1
//!     callvirt int Target::Method(int)
//!     ret
//! }
//! ```
//!
//! At the call site the arguments of the proxy are already on the stack in the order the
//! trailing operation expects them, so `call Proxy` can be replaced by the trailing
//! operation itself. The rewrite is only done when:
//!
//! - the proxy is declared in the caller's own type, is not generic and is not the caller
//! - the proxy is static, or a non-virtual instance method with instance inlining enabled
//! - the proxy loads every argument exactly once, in order, then runs one operation and
//!   returns
//! - the operation's operand types and result fit the proxy's signature
//! - the caller may access the operation's target (see [`AccessChecker`])

use log::debug;

use crate::{
    assembly::{Instruction, OpCode},
    blocks::{BlockId, Blocks},
    deobfuscation::{
        access::AccessChecker,
        config::SimplifierConfig,
        events::{EventKind, EventLog},
        pass::{BlocksPass, PassContext},
    },
    emulation::Bool3,
    metadata::{method::MethodDesc, resolver::MetadataResolver, token::Token, typesystem::ElementType},
    Result,
};

/// What an operation expects in one stack slot, or produces.
#[derive(Debug, Clone, PartialEq)]
enum Slot {
    /// A value of this type
    Exact(ElementType),
    /// An instance of the given declaring type, by reference or by value
    Instance(Token),
    /// A value whose type is not modeled
    Any,
}

impl Slot {
    /// Can a value of type `actual` fill this slot?
    fn accepts(&self, actual: &ElementType) -> bool {
        match self {
            Slot::Exact(expected) => is_compatible(expected, actual),
            Slot::Instance(owner) => {
                actual.is_reference_type()
                    || matches!(actual, ElementType::ValueType(t) if t == owner)
                    || matches!(actual, ElementType::ByRef(inner) if **inner == ElementType::ValueType(*owner))
            }
            Slot::Any => *actual != ElementType::Void,
        }
    }
}

/// Exact match, two reference types, or a value-type `this` passed by reference.
fn is_compatible(expected: &ElementType, actual: &ElementType) -> bool {
    if expected == actual || (expected.is_reference_type() && actual.is_reference_type()) {
        return true;
    }
    match (expected, actual) {
        (ElementType::ValueType(_), ElementType::ByRef(inner)) => **inner == *expected,
        _ => false,
    }
}

/// Replaces calls to forwarding methods by the single operation they forward to.
pub struct MethodCallInliner<'a> {
    resolver: &'a dyn MetadataResolver,
    accessor: Option<Token>,
    inline_instance_methods: bool,
    max_iterations: usize,
}

impl<'a> MethodCallInliner<'a> {
    /// Creates an inliner with the default configuration.
    #[must_use]
    pub fn new(resolver: &'a dyn MetadataResolver) -> Self {
        Self::with_config(resolver, &SimplifierConfig::default())
    }

    /// Creates an inliner honouring the inlining settings of `config`.
    #[must_use]
    pub fn with_config(resolver: &'a dyn MetadataResolver, config: &SimplifierConfig) -> Self {
        MethodCallInliner {
            resolver,
            accessor: None,
            inline_instance_methods: config.inline_instance_methods,
            max_iterations: config.max_inline_iterations,
        }
    }

    /// Checks access as `accessor` instead of the caller's declaring type.
    #[must_use]
    pub fn with_accessor(mut self, accessor: Token) -> Self {
        self.accessor = Some(accessor);
        self
    }

    /// Inlines forwarding calls in `blocks`, the graph of `current`.
    ///
    /// Returns `true` if any call was replaced.
    ///
    /// # Errors
    ///
    /// Returns an error only if the graph rejects an edit.
    pub fn inline_calls(&self, blocks: &mut Blocks, current: &MethodDesc) -> Result<bool> {
        self.inline_all(blocks, current, None)
    }

    fn inline_all(&self, blocks: &mut Blocks, current: &MethodDesc, events: Option<&EventLog>) -> Result<bool> {
        let checker = AccessChecker::new(self.resolver).with_accessor(self.accessor.unwrap_or(current.declaring_type));
        let mut changed = false;

        for round in 0..self.max_iterations {
            let mut round_changed = false;
            for id in blocks.block_list() {
                let inlined = self.inline_block(blocks, id, current, &checker)?;
                if inlined == 0 {
                    continue;
                }
                if let Some(events) = events {
                    events
                        .record(EventKind::CallInlined)
                        .at_block(id)
                        .pass("inliner")
                        .message(format!("{inlined} forwarding call(s) inlined"));
                }
                round_changed = true;
            }

            if !round_changed {
                break;
            }
            debug!("inliner: round {} changed {}", round, current.name);
            changed = true;
        }

        Ok(changed)
    }

    fn inline_block(
        &self,
        blocks: &mut Blocks,
        id: BlockId,
        current: &MethodDesc,
        checker: &AccessChecker<'_>,
    ) -> Result<usize> {
        let mut code = blocks.block(id).instructions.clone();
        let mut inlined = 0;

        for instruction in &mut code {
            if instruction.opcode != OpCode::Call {
                continue;
            }
            if let Some(operation) = self.forwarded_operation(instruction, current, checker) {
                *instruction = operation;
                inlined += 1;
            }
        }

        if inlined > 0 {
            blocks.set_instructions(id, code)?;
        }
        Ok(inlined)
    }

    /// The operation `call` can be replaced with, if its target is an inlinable forwarder.
    fn forwarded_operation(
        &self,
        call: &Instruction,
        current: &MethodDesc,
        checker: &AccessChecker<'_>,
    ) -> Option<Instruction> {
        let target = self.resolver.method(call.token()?)?;
        if target.is_generic() || target.token == current.token || target.declaring_type != current.declaring_type {
            return None;
        }
        if !target.is_static() && !(self.inline_instance_methods && !target.is_virtual()) {
            return None;
        }

        let body = target.body.as_ref()?;
        if !body.handlers.is_empty() {
            return None;
        }
        let [loads @ .., operation, ret] = body.instructions.as_slice() else {
            return None;
        };
        if ret.opcode != OpCode::Ret || loads.len() != target.signature.arg_count() {
            return None;
        }

        // Argument types as the operation sees them
        let mut passed = Vec::with_capacity(loads.len());
        for (index, load) in loads.iter().enumerate() {
            if load.argument_index() != Some(u16::try_from(index).ok()?) {
                return None;
            }
            let ty = target.arg_type(index)?;
            match load.opcode {
                OpCode::Ldarg => passed.push(ty),
                // The caller pushes the value itself; only `ldfld` takes either form
                OpCode::Ldarga if operation.opcode == OpCode::Ldfld => passed.push(ty),
                _ => return None,
            }
        }

        let (inputs, result) = self.operation_shape(operation)?;
        if inputs.len() != passed.len()
            || !inputs.iter().zip(&passed).all(|(slot, actual)| slot.accepts(actual))
            || !result.accepts(&target.signature.return_type)
        {
            return None;
        }

        if self.operation_access(operation, checker) != Bool3::True {
            return None;
        }
        Some(operation.clone())
    }

    /// Stack inputs and result of an operation a forwarder may end in.
    fn operation_shape(&self, operation: &Instruction) -> Option<(Vec<Slot>, Slot)> {
        let token = operation.token()?;
        match operation.opcode {
            OpCode::Call | OpCode::Callvirt => {
                let callee = self.resolver.method(token)?;
                let inputs = callee.signature.arg_types().into_iter().map(Slot::Exact).collect();
                Some((inputs, Slot::Exact(callee.signature.return_type.clone())))
            }
            OpCode::Newobj => {
                let ctor = self.resolver.method(token)?;
                let inputs = ctor.signature.params.iter().cloned().map(Slot::Exact).collect();
                Some((inputs, Slot::Instance(ctor.declaring_type)))
            }
            OpCode::Ldfld | OpCode::Ldflda | OpCode::Stfld | OpCode::Ldsfld | OpCode::Ldsflda | OpCode::Stsfld => {
                let field = self.resolver.field(token)?;
                let owner = Slot::Instance(field.declaring_type);
                let value = field.field_type.clone();
                Some(match operation.opcode {
                    OpCode::Ldfld => (vec![owner], Slot::Exact(value)),
                    OpCode::Ldflda => (vec![owner], Slot::Exact(value.by_ref())),
                    OpCode::Stfld => (vec![owner, Slot::Exact(value)], Slot::Exact(ElementType::Void)),
                    OpCode::Ldsfld => (vec![], Slot::Exact(value)),
                    OpCode::Ldsflda => (vec![], Slot::Exact(value.by_ref())),
                    _ => (vec![Slot::Exact(value)], Slot::Exact(ElementType::Void)),
                })
            }
            OpCode::Ldtoken | OpCode::Ldftn => Some((vec![], Slot::Any)),
            _ => None,
        }
    }

    fn operation_access(&self, operation: &Instruction, checker: &AccessChecker<'_>) -> Bool3 {
        let Some(token) = operation.token() else {
            return Bool3::Unknown;
        };
        match operation.opcode {
            OpCode::Call | OpCode::Callvirt | OpCode::Newobj | OpCode::Ldftn => checker.can_access_method(token),
            OpCode::Ldtoken if self.resolver.method(token).is_some() => checker.can_access_method(token),
            OpCode::Ldtoken if self.resolver.field(token).is_some() => checker.can_access_field(token),
            OpCode::Ldtoken => checker.can_access_type(token),
            _ => checker.can_access_field(token),
        }
    }
}

impl BlocksPass for MethodCallInliner<'_> {
    fn name(&self) -> &'static str {
        "inliner"
    }

    fn description(&self) -> &'static str {
        "Replaces calls to forwarding methods with the operation they forward to"
    }

    fn run(&mut self, blocks: &mut Blocks, ctx: &mut PassContext<'_>) -> Result<bool> {
        self.inline_all(blocks, ctx.method, Some(&ctx.events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::Operand,
        metadata::{
            method::{MethodAccessFlags, MethodBody, MethodModifiers, MethodSignature},
            resolver::MetadataStore,
            typesystem::{AssemblyId, FieldAttributes, FieldDesc, TypeAttributes, TypeDesc},
        },
        test::{code_of, method_and_blocks, owner_type},
    };

    const TARGET_TYPE: Token = Token::new(0x0200_0010);

    fn ret() -> Instruction {
        Instruction::simple(OpCode::Ret)
    }

    // Helper function to create a store with the owner type and a public target type
    fn store() -> MetadataStore {
        let mut store = MetadataStore::new();
        store.add_type(TypeDesc::new(owner_type(), "Owner", TypeAttributes::PUBLIC, AssemblyId(1)));
        store.add_type(TypeDesc::new(TARGET_TYPE, "Target", TypeAttributes::PUBLIC, AssemblyId(2)));
        store
    }

    // Helper function to register `Target::Compute(int) -> int` with the given access
    fn compute(store: &mut MetadataStore, access: MethodAccessFlags) -> Token {
        store
            .add_method(
                MethodDesc::new(
                    Token::new(0x0A00_0001),
                    "Compute",
                    TARGET_TYPE,
                    MethodSignature::new_static(vec![ElementType::I4], ElementType::I4),
                )
                .with_access(access),
            )
            .token
    }

    // Helper function to register a static forwarder in the owner type
    fn proxy(store: &mut MetadataStore, row: u32, params: Vec<ElementType>, ret_type: ElementType, body: Vec<Instruction>) -> Token {
        store
            .add_method(
                MethodDesc::new(
                    Token::new(0x0600_0100 | row),
                    "Proxy",
                    owner_type(),
                    MethodSignature::new_static(params, ret_type),
                )
                .with_access(MethodAccessFlags::PRIVATE)
                .with_body(MethodBody::new(body)),
            )
            .token
    }

    fn caller(call: Token) -> (MethodDesc, Blocks) {
        method_and_blocks(
            vec![],
            vec![
                Instruction::ldc_i4(4),
                Instruction::with_token(OpCode::Call, call),
                Instruction::pop(),
                ret(),
            ],
        )
    }

    #[test]
    fn test_static_forwarder_is_inlined() {
        let mut store = store();
        let compute = compute(&mut store, MethodAccessFlags::PUBLIC);
        let proxy = proxy(
            &mut store,
            1,
            vec![ElementType::I4],
            ElementType::I4,
            vec![Instruction::ldarg(0), Instruction::with_token(OpCode::Call, compute), ret()],
        );
        let (method, mut blocks) = caller(proxy);

        assert!(MethodCallInliner::new(&store).inline_calls(&mut blocks, &method).unwrap());
        assert_eq!(code_of(&blocks)[1], Instruction::with_token(OpCode::Call, compute));
    }

    #[test]
    fn test_private_target_is_not_inlined() {
        let mut store = store();
        let compute = compute(&mut store, MethodAccessFlags::PRIVATE);
        let proxy = proxy(
            &mut store,
            1,
            vec![ElementType::I4],
            ElementType::I4,
            vec![Instruction::ldarg(0), Instruction::with_token(OpCode::Call, compute), ret()],
        );
        let (method, mut blocks) = caller(proxy);

        assert!(!MethodCallInliner::new(&store).inline_calls(&mut blocks, &method).unwrap());
    }

    #[test]
    fn test_signature_mismatch_is_not_inlined() {
        let mut store = store();
        let compute = compute(&mut store, MethodAccessFlags::PUBLIC);
        let proxy = proxy(
            &mut store,
            1,
            vec![ElementType::I8],
            ElementType::I4,
            vec![Instruction::ldarg(0), Instruction::with_token(OpCode::Call, compute), ret()],
        );
        let (method, mut blocks) = caller(proxy);

        assert!(!MethodCallInliner::new(&store).inline_calls(&mut blocks, &method).unwrap());
    }

    #[test]
    fn test_reordered_arguments_are_not_inlined() {
        let mut store = store();
        let field = store.add_field(FieldDesc::new(
            Token::new(0x0400_0001),
            "value",
            TARGET_TYPE,
            ElementType::I4,
            FieldAttributes::PUBLIC,
        ));
        let proxy = proxy(
            &mut store,
            1,
            vec![ElementType::Object, ElementType::I4],
            ElementType::Void,
            vec![
                Instruction::ldarg(1),
                Instruction::ldarg(0),
                Instruction::with_token(OpCode::Stfld, field.token),
                ret(),
            ],
        );
        let (method, mut blocks) = caller(proxy);

        assert!(!MethodCallInliner::new(&store).inline_calls(&mut blocks, &method).unwrap());
    }

    #[test]
    fn test_field_forwarder_is_inlined() {
        let mut store = store();
        let field = store.add_field(FieldDesc::new(
            Token::new(0x0400_0001),
            "value",
            TARGET_TYPE,
            ElementType::I4,
            FieldAttributes::PUBLIC | FieldAttributes::STATIC,
        ));
        let proxy = proxy(
            &mut store,
            1,
            vec![],
            ElementType::I4,
            vec![Instruction::with_token(OpCode::Ldsfld, field.token), ret()],
        );
        let (method, mut blocks) = method_and_blocks(
            vec![],
            vec![Instruction::with_token(OpCode::Call, proxy), Instruction::pop(), ret()],
        );

        assert!(MethodCallInliner::new(&store).inline_calls(&mut blocks, &method).unwrap());
        assert_eq!(code_of(&blocks)[0], Instruction::with_token(OpCode::Ldsfld, field.token));
    }

    #[test]
    fn test_field_load_through_argument_address() {
        let mut store = store();
        let field = store.add_field(FieldDesc::new(
            Token::new(0x0400_0002),
            "x",
            TARGET_TYPE,
            ElementType::I4,
            FieldAttributes::PUBLIC,
        ));
        let forward = |store: &mut MetadataStore, row: u32, operation: OpCode, ret_type: ElementType| {
            proxy(
                store,
                row,
                vec![ElementType::ValueType(TARGET_TYPE)],
                ret_type,
                vec![
                    Instruction::new(OpCode::Ldarga, Operand::Argument(0)),
                    Instruction::with_token(operation, field.token),
                    ret(),
                ],
            )
        };
        let load = forward(&mut store, 1, OpCode::Ldfld, ElementType::I4);
        let address = forward(&mut store, 2, OpCode::Ldflda, ElementType::I4.by_ref());

        // ldfld reads the same field from a value as from its address
        let (method, mut blocks) = caller(load);
        assert!(MethodCallInliner::new(&store).inline_calls(&mut blocks, &method).unwrap());
        assert_eq!(code_of(&blocks)[1], Instruction::with_token(OpCode::Ldfld, field.token));

        let (method, mut blocks) = caller(address);
        assert!(!MethodCallInliner::new(&store).inline_calls(&mut blocks, &method).unwrap());
    }

    #[test]
    fn test_chained_forwarders_are_inlined() {
        let mut store = store();
        let compute = compute(&mut store, MethodAccessFlags::PUBLIC);
        let inner = proxy(
            &mut store,
            1,
            vec![ElementType::I4],
            ElementType::I4,
            vec![Instruction::ldarg(0), Instruction::with_token(OpCode::Call, compute), ret()],
        );
        let outer = proxy(
            &mut store,
            2,
            vec![ElementType::I4],
            ElementType::I4,
            vec![Instruction::ldarg(0), Instruction::with_token(OpCode::Call, inner), ret()],
        );
        let (method, mut blocks) = caller(outer);

        assert!(MethodCallInliner::new(&store).inline_calls(&mut blocks, &method).unwrap());
        assert_eq!(code_of(&blocks)[1], Instruction::with_token(OpCode::Call, compute));
    }

    #[test]
    fn test_virtual_forwarder_is_never_inlined() {
        let mut store = store();
        let field = store.add_field(FieldDesc::new(
            Token::new(0x0400_0001),
            "value",
            owner_type(),
            ElementType::I4,
            FieldAttributes::PRIVATE,
        ));
        let this = ElementType::Class(owner_type());
        let getter = MethodDesc::new(
            Token::new(0x0600_0101),
            "get_Value",
            owner_type(),
            MethodSignature::new_instance(this, vec![], ElementType::I4),
        )
        .with_body(MethodBody::new(vec![
            Instruction::ldarg(0),
            Instruction::with_token(OpCode::Ldfld, field.token),
            ret(),
        ]));
        let virtual_getter = store.add_method(
            MethodDesc {
                token: Token::new(0x0600_0102),
                ..getter.clone()
            }
            .with_modifiers(MethodModifiers::VIRTUAL),
        );
        let getter = store.add_method(getter);

        let code = |target: Token| {
            vec![
                Instruction::ldarg(0),
                Instruction::with_token(OpCode::Call, target),
                Instruction::pop(),
                ret(),
            ]
        };
        let this = ElementType::Class(owner_type());
        let method = MethodDesc::new(
            Token::new(0x0600_0001),
            "Caller",
            owner_type(),
            MethodSignature::new_instance(this, vec![], ElementType::Void),
        );
        let config = SimplifierConfig::default().with_instance_inlining(true);
        let inliner = MethodCallInliner::with_config(&store, &config);

        let mut blocks = Blocks::from_body(&MethodBody::new(code(virtual_getter.token))).unwrap();
        assert!(!inliner.inline_calls(&mut blocks, &method).unwrap());

        let mut blocks = Blocks::from_body(&MethodBody::new(code(getter.token))).unwrap();
        assert!(inliner.inline_calls(&mut blocks, &method).unwrap());
        assert_eq!(code_of(&blocks)[1], Instruction::with_token(OpCode::Ldfld, field.token));

        // Without the opt-in the non-virtual getter stays a call
        let mut blocks = Blocks::from_body(&MethodBody::new(code(getter.token))).unwrap();
        assert!(!MethodCallInliner::new(&store).inline_calls(&mut blocks, &method).unwrap());
    }

    #[test]
    fn test_recursion_guard() {
        let mut store = store();
        let compute = compute(&mut store, MethodAccessFlags::PUBLIC);
        let proxy = proxy(
            &mut store,
            1,
            vec![ElementType::I4],
            ElementType::I4,
            vec![Instruction::ldarg(0), Instruction::with_token(OpCode::Call, compute), ret()],
        );
        let current = store.method(proxy).unwrap();
        let mut blocks = Blocks::from_body(&MethodBody::new(vec![
            Instruction::ldc_i4(1),
            Instruction::with_token(OpCode::Call, proxy),
            Instruction::pop(),
            ret(),
        ]))
        .unwrap();

        assert!(!MethodCallInliner::new(&store).inline_calls(&mut blocks, &current).unwrap());
    }
}
