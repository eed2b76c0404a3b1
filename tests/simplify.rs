//! End-to-end simplification tests.
//!
//! Every test builds a flat method body, runs the public passes or the full
//! [`Simplifier`] over it and checks the resulting code.

use dotflow::{
    deobfuscation::passes::{BranchResolver, DeadCodeRemover, DeadStoreRemover},
    prelude::*,
};

const OWNER: Token = Token::new(0x0200_0002);

// Helper function to create a static method with the given parameters, locals and body
fn method(params: Vec<ElementType>, ret: ElementType, locals: Vec<ElementType>, code: Vec<Instruction>) -> MethodDesc {
    MethodDesc::new(
        Token::new(0x0600_0001),
        "Obfuscated",
        OWNER,
        MethodSignature::new_static(params, ret),
    )
    .with_locals(locals)
    .with_init_locals(true)
    .with_body(MethodBody::new(code))
}

fn ret() -> Instruction {
    Instruction::simple(OpCode::Ret)
}

fn opcodes(body: &MethodBody) -> Vec<OpCode> {
    body.instructions.iter().map(|i| i.opcode).collect()
}

#[test]
fn test_constant_brtrue_becomes_pop_and_br() -> dotflow::Result<()> {
    let store = MetadataStore::new();
    // 0: ldc.i4 1; 1: brtrue 4; 2: ldc.i4 0; 3: ret; 4: ldc.i4 1; 5: ret
    let method = method(
        vec![],
        ElementType::I4,
        vec![],
        vec![
            Instruction::ldc_i4(1),
            Instruction::branch(OpCode::Brtrue, 4),
            Instruction::ldc_i4(0),
            ret(),
            Instruction::ldc_i4(1),
            ret(),
        ],
    );
    let mut blocks = Blocks::from_body(method.body.as_ref().unwrap())?;
    let list = blocks.block_list();
    let mut ctx = PassContext::new(&method, &store, InstructionEmulator::new(&store));

    assert!(BranchResolver::new().run(&mut blocks, &mut ctx)?);

    let entry = blocks.block(list[0]);
    assert_eq!(entry.instructions[..2], [Instruction::ldc_i4(1), Instruction::pop()]);
    assert_eq!(entry.terminal().map(|t| t.opcode), Some(OpCode::Br));
    assert_eq!(entry.targets, vec![list[2]]);
    assert_eq!(entry.fallthrough, None);
    assert!(ctx.events.has(EventKind::BranchResolved));
    Ok(())
}

#[test]
fn test_opaque_predicate_is_removed() -> dotflow::Result<()> {
    let store = MetadataStore::new();
    let method = method(
        vec![],
        ElementType::I4,
        vec![],
        vec![
            Instruction::ldc_i4(1),
            Instruction::branch(OpCode::Brtrue, 4),
            Instruction::ldc_i4(0),
            ret(),
            Instruction::ldc_i4(1),
            ret(),
        ],
    );

    let (body, stats) = Simplifier::new(&store).simplify_method(&method)?;
    assert_eq!(body.instructions, vec![Instruction::ldc_i4(1), ret()]);
    assert!(stats.changed);
    assert!(stats.events.has(EventKind::BranchResolved));
    assert!(stats.events.has(EventKind::BlockRemoved));
    Ok(())
}

#[test]
fn test_switch_predecessors_go_to_their_own_case() -> dotflow::Result<()> {
    let store = MetadataStore::new();
    // Two arms push 1 and 0, then share the switch at 6.
    let method = method(
        vec![ElementType::I4],
        ElementType::I4,
        vec![],
        vec![
            Instruction::ldarg(0),
            Instruction::branch(OpCode::Brtrue, 4),
            Instruction::ldc_i4(1),
            Instruction::br(6),
            Instruction::ldc_i4(0),
            Instruction::br(6),
            Instruction::switch(vec![9, 11]),
            Instruction::ldc_i4(99),
            ret(),
            Instruction::ldc_i4(10),
            ret(),
            Instruction::ldc_i4(20),
            ret(),
        ],
    );

    let (body, stats) = Simplifier::new(&store).simplify_method(&method)?;
    let code = &body.instructions;
    assert!(!code.iter().any(|i| i.opcode == OpCode::Switch));
    assert!(code.contains(&Instruction::ldc_i4(10)));
    assert!(code.contains(&Instruction::ldc_i4(20)));
    assert!(!code.contains(&Instruction::ldc_i4(99)));
    assert_eq!(code.iter().filter(|i| i.opcode == OpCode::Ret).count(), 2);
    assert_eq!(code[0], Instruction::ldarg(0));
    assert!(stats.events.has(EventKind::SwitchMerged) || stats.events.has(EventKind::SwitchResolved));
    Ok(())
}

#[test]
fn test_flattened_state_machine_is_unrolled() -> dotflow::Result<()> {
    let store = MetadataStore::new();
    // state = 0; loop { switch (state) { case 0: state = 1; continue; case 1: return; } return; }
    let method = method(
        vec![],
        ElementType::Void,
        vec![ElementType::I4],
        vec![
            Instruction::ldc_i4(0),
            Instruction::stloc(0),
            Instruction::ldloc(0),
            Instruction::switch(vec![5, 8]),
            ret(),
            Instruction::ldc_i4(1),
            Instruction::stloc(0),
            Instruction::br(2),
            ret(),
        ],
    );

    let (body, stats) = Simplifier::new(&store).simplify_method(&method)?;
    assert_eq!(body.instructions, vec![ret()]);
    assert!(stats.events.has(EventKind::SwitchResolved));
    Ok(())
}

#[test]
fn test_stores_to_unread_local_are_discarded() -> dotflow::Result<()> {
    let store = MetadataStore::new();
    let method = method(
        vec![ElementType::I4],
        ElementType::Void,
        vec![ElementType::I4],
        vec![
            Instruction::ldarg(0),
            Instruction::stloc(0),
            Instruction::ldc_i4(5),
            Instruction::stloc(0),
            ret(),
        ],
    );
    let mut blocks = Blocks::from_body(method.body.as_ref().unwrap())?;
    let mut ctx = PassContext::new(&method, &store, InstructionEmulator::new(&store));

    assert!(DeadStoreRemover::new().run(&mut blocks, &mut ctx)?);
    assert_eq!(
        blocks.get_code()?,
        vec![
            Instruction::ldarg(0),
            Instruction::pop(),
            Instruction::ldc_i4(5),
            Instruction::pop(),
            ret(),
        ]
    );

    assert!(DeadCodeRemover::new().run(&mut blocks, &mut ctx)?);
    assert_eq!(blocks.get_code()?, vec![ret()]);
    Ok(())
}

#[test]
fn test_second_run_changes_nothing() -> dotflow::Result<()> {
    let store = MetadataStore::new();
    let method = method(
        vec![ElementType::I4],
        ElementType::I4,
        vec![ElementType::I4],
        vec![
            Instruction::ldarg(0),
            Instruction::ldc_i4(3),
            Instruction::simple(OpCode::And),
            Instruction::ldc_i4(4),
            Instruction::simple(OpCode::And),
            Instruction::branch(OpCode::Brtrue, 8),
            Instruction::ldc_i4(7),
            ret(),
            Instruction::ldc_i4(8),
            ret(),
        ],
    );

    let (first, stats) = Simplifier::new(&store).simplify_method(&method)?;
    assert!(stats.changed);
    assert!(!first.instructions.iter().any(Instruction::is_conditional_branch));

    let again = MethodDesc {
        body: Some(first.clone()),
        ..method
    };
    let (second, stats) = Simplifier::new(&store).simplify_method(&again)?;
    assert_eq!(second, first);
    assert!(!stats.changed);
    assert_eq!(stats.iterations, 1);
    assert_eq!(stats.events.transformation_count(), 0);
    Ok(())
}

#[test]
fn test_calls_are_never_removed() -> dotflow::Result<()> {
    let mut store = MetadataStore::new();
    let callee = store
        .add_method(MethodDesc::new(
            Token::new(0x0A00_0001),
            "Next",
            Token::new(0x0100_0001),
            MethodSignature::new_static(vec![], ElementType::I4),
        ))
        .token;
    let code = vec![
        Instruction::with_token(OpCode::Call, callee),
        Instruction::pop(),
        Instruction::with_token(OpCode::Call, Token::new(0x0A00_0099)),
        Instruction::pop(),
        ret(),
    ];
    let method = method(vec![], ElementType::Void, vec![], code.clone());

    let (body, stats) = Simplifier::new(&store).simplify_method(&method)?;
    assert_eq!(body.instructions, code);
    assert!(!stats.events.has(EventKind::CodeRemoved));
    Ok(())
}

#[test]
fn test_exception_regions_survive_simplification() -> dotflow::Result<()> {
    let store = MetadataStore::new();
    // try { if (1) goto L; nop; L: leave End } finally { endfinally } End: ret
    let mut method = method(
        vec![],
        ElementType::Void,
        vec![],
        vec![
            Instruction::ldc_i4(1),
            Instruction::branch(OpCode::Brtrue, 3),
            Instruction::simple(OpCode::Nop),
            Instruction::branch(OpCode::Leave, 5),
            Instruction::simple(OpCode::Endfinally),
            ret(),
        ],
    );
    method.body = method.body.map(|body| {
        body.with_handler(ExceptionHandler {
            kind: HandlerKind::Finally,
            try_start: 0,
            try_end: 4,
            handler_start: 4,
            handler_end: 5,
        })
    });

    let (body, _) = Simplifier::new(&store).simplify_method(&method)?;
    let ops = opcodes(&body);
    assert_eq!(body.handlers.len(), 1);
    assert!(!ops.contains(&OpCode::Brtrue));
    assert!(ops.contains(&OpCode::Leave));
    assert!(ops.contains(&OpCode::Endfinally));
    assert_eq!(ops.last(), Some(&OpCode::Ret));
    Ok(())
}

#[test]
fn test_max_stack_of_simplified_body() -> dotflow::Result<()> {
    let store = MetadataStore::new();
    let method = method(
        vec![],
        ElementType::I4,
        vec![],
        vec![
            Instruction::ldc_i4(2),
            Instruction::ldc_i4(3),
            Instruction::branch(OpCode::Blt, 5),
            Instruction::ldc_i4(0),
            ret(),
            Instruction::ldc_i4(1),
            ret(),
        ],
    );
    let mut blocks = Blocks::from_body(method.body.as_ref().unwrap())?;
    assert_eq!(blocks.compute_max_stack(&store)?, 2);

    Simplifier::new(&store).simplify(&method, &mut blocks)?;
    assert_eq!(blocks.get_code()?, vec![Instruction::ldc_i4(1), ret()]);
    assert_eq!(blocks.compute_max_stack(&store)?, 1);
    Ok(())
}
