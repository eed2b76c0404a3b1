//! Configuration for the simplifier.

/// Configuration for the [`Simplifier`](crate::deobfuscation::Simplifier) and the
/// [`MethodCallInliner`](crate::deobfuscation::MethodCallInliner).
#[derive(Debug, Clone)]
pub struct SimplifierConfig {
    /// Maximum outer iterations before the driver gives up (default: 100).
    pub max_iterations: usize,

    /// Run the loop latch fixup on the first iteration (default: true).
    pub enable_loop_latch_fixup: bool,

    /// Fold `dup` + branch blocks into their predecessors (default: true).
    pub enable_dup_block_folding: bool,

    /// Allow inlining of non-virtual instance forwarding methods (default: false).
    pub inline_instance_methods: bool,

    /// Maximum rounds of the inliner over one method (default: 10).
    pub max_inline_iterations: usize,
}

impl Default for SimplifierConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            enable_loop_latch_fixup: true,
            enable_dup_block_folding: true,
            inline_instance_methods: false,
            max_inline_iterations: 10,
        }
    }
}

impl SimplifierConfig {
    /// Sets the maximum outer iterations.
    #[must_use]
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    /// Enables or disables the loop latch fixup.
    #[must_use]
    pub fn with_loop_latch_fixup(mut self, enabled: bool) -> Self {
        self.enable_loop_latch_fixup = enabled;
        self
    }

    /// Enables or disables `dup` block folding.
    #[must_use]
    pub fn with_dup_block_folding(mut self, enabled: bool) -> Self {
        self.enable_dup_block_folding = enabled;
        self
    }

    /// Enables or disables inlining of instance methods.
    #[must_use]
    pub fn with_instance_inlining(mut self, enabled: bool) -> Self {
        self.inline_instance_methods = enabled;
        self
    }

    /// Sets the maximum rounds of the inliner.
    #[must_use]
    pub fn with_max_inline_iterations(mut self, max: usize) -> Self {
        self.max_inline_iterations = max;
        self
    }
}
