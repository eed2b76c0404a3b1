//! Abstract interpretation through the public emulator API.

use dotflow::{
    emulation::{emulate_branch, switch_target, BranchHandler},
    prelude::*,
};

// Helper function to create a method with `locals` and a zero-initializing header
fn method(locals: Vec<ElementType>) -> MethodDesc {
    MethodDesc::new(
        Token::new(0x0600_0001),
        "Emulated",
        Token::new(0x0200_0002),
        MethodSignature::new_static(vec![ElementType::I4], ElementType::Void),
    )
    .with_locals(locals)
    .with_init_locals(true)
}

// Helper function to run `code` from an unknown state and return the top of the stack
fn top_after(code: &[Instruction]) -> Value {
    let store = MetadataStore::new();
    let method = method(vec![ElementType::I4, ElementType::I4]);
    let mut emulator = InstructionEmulator::new(&store);
    emulator.initialize(&method, false);
    emulator.emulate_all(code).unwrap();
    emulator.peek()
}

struct Outcome(Option<bool>);

impl BranchHandler for Outcome {
    fn handle_normal(&mut self, _pops: usize, taken: bool) -> bool {
        self.0 = Some(taken);
        true
    }

    fn handle_switch(&mut self, _index: &Int32Value) -> bool {
        false
    }
}

#[test]
fn test_shift_by_unknown_amount_is_fully_unknown() {
    for opcode in [OpCode::Shl, OpCode::Shr, OpCode::ShrUn] {
        let value = top_after(&[Instruction::ldc_i4(0x0F), Instruction::ldloc(0), Instruction::simple(opcode)]);
        let int = value.as_int32().expect("shift of an int32 stays an int32");
        assert!(int.is_unknown(), "{opcode:?} kept bits: {value}");
    }
}

#[test]
fn test_shift_by_known_amount_keeps_low_bits() {
    // (x << 4) has its low four bits known zero
    let value = top_after(&[Instruction::ldloc(0), Instruction::ldc_i4(4), Instruction::simple(OpCode::Shl)]);
    let int = value.as_int32().unwrap();
    assert_eq!(int.valid_mask & 0xF, 0xF);
    assert_eq!(int.value & 0xF, 0);
    assert!(!int.all_bits_valid());
}

#[test]
fn test_parity_predicate_is_decided() {
    // ((x | 1) & 1) != 0 always holds
    let store = MetadataStore::new();
    let method = method(vec![ElementType::I4]);
    let mut emulator = InstructionEmulator::new(&store);
    emulator.initialize(&method, false);
    emulator
        .emulate_all(&[
            Instruction::ldloc(0),
            Instruction::ldc_i4(1),
            Instruction::simple(OpCode::Or),
            Instruction::ldc_i4(1),
            Instruction::simple(OpCode::And),
        ])
        .unwrap();

    let mut outcome = Outcome(None);
    assert!(emulate_branch(&mut emulator, &Instruction::branch(OpCode::Brtrue, 0), &mut outcome));
    assert_eq!(outcome.0, Some(true));
    assert!(emulator.stack().is_empty());
}

#[test]
fn test_unknown_comparison_is_not_decided() {
    let store = MetadataStore::new();
    let method = method(vec![ElementType::I4, ElementType::I4]);
    let mut emulator = InstructionEmulator::new(&store);
    emulator.initialize(&method, false);
    emulator
        .emulate_all(&[Instruction::ldloc(0), Instruction::ldloc(1)])
        .unwrap();

    let mut outcome = Outcome(None);
    assert!(!emulate_branch(&mut emulator, &Instruction::branch(OpCode::Beq, 0), &mut outcome));
    assert_eq!(outcome.0, None);
}

#[test]
fn test_entry_state_depends_on_init_locals() {
    let store = MetadataStore::new();
    let method = method(vec![ElementType::I4]);
    let mut emulator = InstructionEmulator::new(&store);

    emulator.initialize(&method, true);
    assert_eq!(emulator.get_local(0).and_then(Value::known_i32), Some(0));
    assert!(emulator.get_arg(0).unwrap().is_unknown());

    emulator.initialize(&method, false);
    assert!(emulator.get_local(0).unwrap().is_unknown());
}

#[test]
fn test_underflow_yields_unknown() {
    let mut stack = ValueStack::new();
    assert_eq!(stack.pop(), Value::Unknown);

    stack.push(Int32Value::new(7).into());
    assert_eq!(stack.peek().known_i32(), Some(7));
    assert_eq!(stack.pop().known_i32(), Some(7));
    assert!(stack.is_empty());
}

#[test]
fn test_switch_index_selection() {
    assert_eq!(switch_target(3, &Int32Value::new(1)), Some(Some(1)));
    assert_eq!(switch_target(3, &Int32Value::new(3)), Some(None));
    assert_eq!(switch_target(3, &Int32Value::new(-1)), Some(None));
    assert_eq!(switch_target(3, &Int32Value::unknown()), None);
}

#[test]
fn test_three_valued_logic() {
    assert_eq!(Bool3::Unknown.and(Bool3::False), Bool3::False);
    assert_eq!(Bool3::Unknown.or(Bool3::True), Bool3::True);
    assert_eq!(Bool3::Unknown.and(Bool3::True), Bool3::Unknown);
    assert_eq!(Bool3::from_bool(true).negate(), Bool3::False);
}
