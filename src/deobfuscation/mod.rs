//! Fixed-point control flow simplification.
//!
//! This module turns the block graph of an obfuscated method back into straight code by
//! running a set of local rewrites until none of them applies any more. Every rewrite is
//! justified by the [`emulation`](crate::emulation) layer: a branch is only resolved when its
//! condition is known on every way into its block.
//!
//! # Architecture
//!
//! - [`BlocksPass`] - One rewrite over the graph, sharing a [`PassContext`] with the others
//! - [`passes`] - The rewrites: branch and switch resolution, constant folding, dead store
//!   and dead code removal, and the two fallback fixups
//! - [`Simplifier`] - The driver: runs the passes, cleans up the graph between rounds and
//!   stops at the fixed point or at [`SimplifierConfig::max_iterations`]
//! - [`MethodCallInliner`] - Replaces calls to one-line forwarding methods
//! - [`AccessChecker`] - Visibility rules the inliner needs before moving a member
//!   reference into another method
//!
//! # Key Components
//!
//! - [`EventLog`] - Append-only record of every rewrite, returned in [`SimplifyStats`]
//! - [`SimplifierConfig`] - Iteration limits and switches for the optional passes

mod access;
mod config;
mod driver;
mod events;
mod inliner;
mod pass;
pub mod passes;

pub use access::{AccessChecker, MAX_INHERITANCE_DEPTH, MAX_NESTING_DEPTH};
pub use config::SimplifierConfig;
pub use driver::{Simplifier, SimplifyStats};
pub use events::{Event, EventBuilder, EventKind, EventLog, EventLogIter};
pub use inliner::MethodCallInliner;
pub use pass::{BlocksPass, PassContext};
