//! Pass trait and the per-method state shared by all passes.

use crate::{
    blocks::Blocks,
    deobfuscation::events::{EventBuilder, EventKind, EventLog},
    emulation::InstructionEmulator,
    metadata::{method::MethodDesc, resolver::MetadataResolver},
    Result,
};

/// State a pass sees while simplifying one method.
pub struct PassContext<'a> {
    /// The method being simplified
    pub method: &'a MethodDesc,
    /// Metadata lookups for call and field operands
    pub resolver: &'a dyn MetadataResolver,
    /// Emulator reused by every pass, with its per-method templates
    pub emulator: InstructionEmulator<'a>,
    /// Rewrites recorded so far
    pub events: EventLog,
    /// Current outer iteration of the driver
    pub iteration: usize,
}

impl<'a> PassContext<'a> {
    /// Creates a context for `method`.
    #[must_use]
    pub fn new(method: &'a MethodDesc, resolver: &'a dyn MetadataResolver, emulator: InstructionEmulator<'a>) -> Self {
        PassContext {
            method,
            resolver,
            emulator,
            events: EventLog::new(),
            iteration: 0,
        }
    }

    /// Starts recording an event.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        self.events.record(kind)
    }
}

/// A simplification pass over the block graph of one method.
///
/// A pass must only shrink the code or resolve a control transfer that was unknown before;
/// it must never reintroduce a shape another pass removes. The driver relies on this to
/// reach a fixed point.
pub trait BlocksPass {
    /// Unique name for logging and debugging.
    fn name(&self) -> &'static str;

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }

    /// Should this pass run on the current iteration?
    fn should_run(&self, _ctx: &PassContext<'_>) -> bool {
        true
    }

    /// Runs the pass over the graph.
    ///
    /// Returns `true` if anything changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the pass fails for the whole method. Failures local to one block
    /// are handled inside the pass by skipping that block.
    fn run(&mut self, blocks: &mut Blocks, ctx: &mut PassContext<'_>) -> Result<bool>;
}
