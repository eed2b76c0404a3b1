//! Builders shared by the unit tests.

use crate::{
    assembly::Instruction,
    blocks::Blocks,
    deobfuscation::PassContext,
    emulation::InstructionEmulator,
    metadata::{
        method::{MethodBody, MethodDesc, MethodSignature},
        resolver::MetadataResolver,
        token::Token,
        typesystem::ElementType,
    },
};

// Helper function to get the type declaring all test methods
pub fn owner_type() -> Token {
    Token::new(0x0200_0002)
}

// Helper function to create a static void method with the given locals
pub fn method_with_locals(locals: Vec<ElementType>) -> MethodDesc {
    MethodDesc::new(
        Token::new(0x0600_0001),
        "Target",
        owner_type(),
        MethodSignature::new_static(Vec::new(), ElementType::Void),
    )
    .with_locals(locals)
    .with_init_locals(true)
}

// Helper function to create a method and the block graph of its body
pub fn method_and_blocks(locals: Vec<ElementType>, code: Vec<Instruction>) -> (MethodDesc, Blocks) {
    let body = MethodBody::new(code);
    let blocks = Blocks::from_body(&body).unwrap();
    (method_with_locals(locals).with_body(body), blocks)
}

// Helper function to create a pass context over a method
pub fn context<'a>(method: &'a MethodDesc, resolver: &'a dyn MetadataResolver) -> PassContext<'a> {
    PassContext::new(method, resolver, InstructionEmulator::new(resolver))
}

// Helper function to flatten a block graph into its instructions
pub fn code_of(blocks: &Blocks) -> Vec<Instruction> {
    blocks.get_code().unwrap()
}
