// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]

//! # dotflow
//!
//! Control flow simplification for obfuscated .NET CIL method bodies.
//!
//! Protectors flatten methods into switch dispatchers, guard real code with opaque
//! predicates and hide member references behind one-line proxy methods. `dotflow` undoes
//! these transformations on already decoded method bodies, without running any code: a
//! bit-precise abstract interpreter decides which branches are constant, and a fixed-point
//! driver keeps rewriting the block graph until nothing changes.
//!
//! ## Features
//!
//! - **Bit-precise emulation** - Integers track which individual bits are known, so
//!   `x & 0` or `(x | 1) & 1` are decided even when `x` is not
//! - **Exception-aware block graph** - Rewrites never move code across `try` or handler
//!   boundaries
//! - **Fixed-point simplification** - Branch and switch resolution, constant folding, dead
//!   store and dead code removal, until the graph is stable
//! - **Proxy call inlining** - One-line forwarding methods replaced by the operation they
//!   wrap, subject to .NET accessibility rules
//!
//! ## Quick Start
//!
//! ```rust
//! use dotflow::prelude::*;
//!
//! // Flattened: the dispatcher always takes case 1, which returns.
//! let body = MethodBody::new(vec![
//!     Instruction::ldc_i4(1),
//!     Instruction::switch(vec![3, 5]),
//!     Instruction::simple(OpCode::Ret),
//!     Instruction::ldc_i4(7),
//!     Instruction::simple(OpCode::Ret),
//!     Instruction::ldc_i4(9),
//!     Instruction::simple(OpCode::Ret),
//! ]);
//! let method = MethodDesc::new(
//!     Token::new(0x0600_0001),
//!     "Flattened",
//!     Token::new(0x0200_0002),
//!     MethodSignature::new_static(vec![], ElementType::I4),
//! )
//! .with_body(body);
//!
//! let store = MetadataStore::new();
//! let (body, _) = Simplifier::new(&store).simplify_method(&method)?;
//! assert_eq!(
//!     body.instructions,
//!     vec![Instruction::ldc_i4(9), Instruction::simple(OpCode::Ret)]
//! );
//! # Ok::<(), dotflow::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`assembly`] - Decoded CIL instructions and opcode tables
//! - [`metadata`] - Tokens, signatures, types and the [`metadata::resolver::MetadataResolver`]
//!   a frontend implements
//! - [`emulation`] - Abstract values, the evaluation stack, the instruction emulator and
//!   branch resolution
//! - [`blocks`] - The block graph with exception scopes, its builder and code generation
//! - [`deobfuscation`] - Passes, the fixed-point driver, the inliner and access checks
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Logging
//!
//! The crate logs through the [`log`](https://docs.rs/log) facade: skipped units at
//! `debug`, per-instruction detail at `trace`, and driver give-ups at `warn`. Install any
//! logger in the host application to see them.

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use dotflow::prelude::*;
///
/// let store = MetadataStore::new();
/// let simplifier = Simplifier::new(&store);
/// assert!(simplifier.config().max_iterations > 0);
/// ```
pub mod prelude;

pub mod assembly;
pub mod blocks;
pub mod deobfuscation;
pub mod emulation;
pub mod metadata;

/// `dotflow` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dotflow` Error type
///
/// # Examples
///
/// ```rust
/// use dotflow::{blocks::Blocks, metadata::method::MethodBody, Error};
///
/// match Blocks::from_body(&MethodBody::new(vec![])) {
///     Ok(blocks) => println!("{} blocks", blocks.block_list().len()),
///     Err(Error::Malformed { message, .. }) => println!("Malformed: {}", message),
///     Err(e) => println!("Error: {}", e),
/// }
/// ```
pub use error::Error;
