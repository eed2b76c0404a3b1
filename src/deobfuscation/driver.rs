//! Fixed-point driver running the simplification passes.
//!
//! The [`Simplifier`] repeats rounds until nothing changes. Every round starts by
//! normalizing the graph, then runs three ordered pass lists:
//!
//! 1. **Cleanup**: unreachable blocks are removed and straight-line chains merged
//! 2. **First iteration**: isolated legacy fixups, round 0 only
//! 3. **Always**: branch and switch resolution, constant folding, dead store and dead code
//!    removal
//! 4. **If unchanged**: pattern fixups that may expose new work, run only when the always
//!    list made no progress this round
//!
//! Termination relies on every pass shrinking the code or resolving a control transfer. A
//! round limit turns an accidental cycle between passes into
//! [`Error::OscillationDetected`].

use log::{debug, warn};

use crate::{
    blocks::Blocks,
    deobfuscation::{
        config::SimplifierConfig,
        events::{EventKind, EventLog},
        pass::{BlocksPass, PassContext},
        passes::{
            BranchResolver, ConstantFolder, DeadCodeRemover, DeadStoreRemover, DupBlockFolder, LoopLatchFixer,
            StoreReloadFixer, SwitchResolver,
        },
    },
    emulation::InstructionEmulator,
    metadata::{
        method::{MethodBody, MethodDesc},
        resolver::MetadataResolver,
    },
    Error, Result,
};

/// Outcome of simplifying one method.
#[derive(Debug, Clone, Default)]
pub struct SimplifyStats {
    /// Rounds run, including the final one that changed nothing
    pub iterations: usize,
    /// True if any round changed the graph
    pub changed: bool,
    /// Every rewrite applied
    pub events: EventLog,
}

/// Runs the simplification passes over a method to a fixed point.
///
/// # Example
///
/// ```rust
/// use dotflow::{
///     assembly::{Instruction, OpCode},
///     deobfuscation::Simplifier,
///     metadata::{
///         method::{MethodBody, MethodDesc, MethodSignature},
///         resolver::MetadataStore,
///         token::Token,
///         typesystem::ElementType,
///     },
/// };
///
/// // if (1 == 1) return; else return;
/// let body = MethodBody::new(vec![
///     Instruction::ldc_i4(1),
///     Instruction::ldc_i4(1),
///     Instruction::branch(OpCode::Beq, 4),
///     Instruction::simple(OpCode::Ret),
///     Instruction::simple(OpCode::Ret),
/// ]);
/// let method = MethodDesc::new(
///     Token::new(0x0600_0001),
///     "Run",
///     Token::new(0x0200_0002),
///     MethodSignature::new_static(vec![], ElementType::Void),
/// )
/// .with_body(body);
///
/// let store = MetadataStore::new();
/// let (body, stats) = Simplifier::new(&store).simplify_method(&method)?;
/// assert_eq!(body.instructions, vec![Instruction::simple(OpCode::Ret)]);
/// assert!(stats.changed);
/// # Ok::<(), dotflow::Error>(())
/// ```
pub struct Simplifier<'a> {
    resolver: &'a dyn MetadataResolver,
    config: SimplifierConfig,
    /// Passes run on round 0 only
    pub first_iteration: Vec<Box<dyn BlocksPass + 'a>>,
    /// Passes run every round
    pub always: Vec<Box<dyn BlocksPass + 'a>>,
    /// Passes run in rounds where the always list changed nothing
    pub if_unchanged: Vec<Box<dyn BlocksPass + 'a>>,
}

impl<'a> Simplifier<'a> {
    /// Creates a simplifier with the default configuration and passes.
    #[must_use]
    pub fn new(resolver: &'a dyn MetadataResolver) -> Self {
        Self::with_config(resolver, SimplifierConfig::default())
    }

    /// Creates a simplifier with the default passes enabled by `config`.
    #[must_use]
    pub fn with_config(resolver: &'a dyn MetadataResolver, config: SimplifierConfig) -> Self {
        let mut first_iteration: Vec<Box<dyn BlocksPass + 'a>> = Vec::new();
        if config.enable_loop_latch_fixup {
            first_iteration.push(Box::new(LoopLatchFixer::new()));
        }

        let always: Vec<Box<dyn BlocksPass + 'a>> = vec![
            Box::new(BranchResolver::new()),
            Box::new(SwitchResolver::new()),
            Box::new(DeadStoreRemover::new()),
            Box::new(DeadCodeRemover::new()),
            Box::new(ConstantFolder::new()),
        ];

        let mut if_unchanged: Vec<Box<dyn BlocksPass + 'a>> = vec![Box::new(StoreReloadFixer::new())];
        if config.enable_dup_block_folding {
            if_unchanged.push(Box::new(DupBlockFolder::new()));
        }

        Simplifier {
            resolver,
            config,
            first_iteration,
            always,
            if_unchanged,
        }
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &SimplifierConfig {
        &self.config
    }

    /// Runs one pass, turning a failure into "no change".
    fn run_pass(pass: &mut dyn BlocksPass, blocks: &mut Blocks, ctx: &mut PassContext<'_>) -> bool {
        if !pass.should_run(ctx) {
            return false;
        }

        match pass.run(blocks, ctx) {
            Ok(changed) => {
                if changed {
                    debug!("{}: pass {} changed {}", ctx.method.name, pass.name(), ctx.method.token);
                }
                changed
            }
            Err(e) => {
                debug!("{}: pass {} failed: {}", ctx.method.name, pass.name(), e);
                ctx.record(EventKind::Skipped)
                    .pass(pass.name())
                    .message(format!("failed: {e}"));
                false
            }
        }
    }

    fn run_all(passes: &mut [Box<dyn BlocksPass + '_>], blocks: &mut Blocks, ctx: &mut PassContext<'_>) -> bool {
        let mut changed = false;
        for pass in passes.iter_mut() {
            changed |= Self::run_pass(pass.as_mut(), blocks, ctx);
        }
        changed
    }

    /// Removes dead blocks and merges chains, recording what happened.
    fn normalize(blocks: &mut Blocks, ctx: &PassContext<'_>) -> bool {
        let removed = blocks.remove_dead_blocks();
        if removed > 0 {
            ctx.record(EventKind::BlockRemoved)
                .message(format!("{removed} unreachable block(s)"));
        }
        let merged = blocks.merge_blocks();
        if merged > 0 {
            ctx.record(EventKind::BlocksMerged)
                .message(format!("{merged} block(s) merged"));
        }
        removed > 0 || merged > 0
    }

    /// Simplifies the graph of `method` in place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OscillationDetected`] if the graph is still changing after the
    /// configured number of rounds. Failures of individual passes are not errors; they are
    /// logged and recorded as skipped.
    pub fn simplify(&mut self, method: &MethodDesc, blocks: &mut Blocks) -> Result<SimplifyStats> {
        let mut ctx = PassContext::new(method, self.resolver, InstructionEmulator::new(self.resolver));
        let mut stats = SimplifyStats::default();

        for iteration in 0..self.config.max_iterations {
            ctx.iteration = iteration;
            stats.iterations = iteration + 1;

            let mut changed = Self::normalize(blocks, &ctx);
            let graph: &Blocks = blocks;
            let ids = graph.block_list();
            ctx.emulator
                .track_address_taken(method, ids.iter().flat_map(|&id| &graph.block(id).instructions));

            if iteration == 0 {
                changed |= Self::run_all(&mut self.first_iteration, blocks, &mut ctx);
            }

            let always_changed = Self::run_all(&mut self.always, blocks, &mut ctx);
            changed |= always_changed;
            if !always_changed {
                changed |= Self::run_all(&mut self.if_unchanged, blocks, &mut ctx);
            }

            if !changed {
                stats.events = ctx.events;
                return Ok(stats);
            }
            stats.changed = true;
        }

        warn!(
            "{}: still changing after {} rounds, giving up",
            method.name, self.config.max_iterations
        );
        Err(Error::OscillationDetected(self.config.max_iterations))
    }

    /// Builds the graph of `method`'s body, simplifies it and lays it out again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if the method has no body, and any error from building
    /// the graph, [`simplify`](Self::simplify) or code generation.
    pub fn simplify_method(&mut self, method: &MethodDesc) -> Result<(MethodBody, SimplifyStats)> {
        let body = method
            .body
            .as_ref()
            .ok_or_else(|| malformed_error!("Method {} has no body", method.name))?;

        let mut blocks = Blocks::from_body(body)?;
        let stats = self.simplify(method, &mut blocks)?;
        Ok((blocks.to_body()?, stats))
    }
}
