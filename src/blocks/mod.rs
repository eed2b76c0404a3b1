//! Block-structured control flow graph of one method body.
//!
//! [`Blocks`] is an arena of basic blocks addressed by stable [`BlockId`]s. Every
//! simplification pass edits this graph in place; removed blocks stay in the arena flagged as
//! removed so that ids held by a pass never dangle.
//!
//! # Architecture
//!
//! - [`Block`] - Straight-line instructions, explicit `targets`, an optional `fallthrough`
//!   and one `sources` entry per incoming edge
//! - [`ScopeBlock`] - Nesting of the method body, `try` bodies, handlers and filters. Blocks
//!   are only ever merged or redirected within one scope, which keeps exception regions
//!   contiguous
//! - [`Blocks::from_body`] - Leader analysis of a flat [`MethodBody`]
//! - [`Blocks::to_body`] - Flat instructions and exception clauses in layout order
//!
//! # Mutation Primitives
//!
//! All structural edits go through [`Blocks::replace_terminal`], [`Blocks::merge_into`] and
//! [`Blocks::split_before`] (plus [`Blocks::add_block`] and [`Blocks::retarget`]). Each keeps
//! `targets`, `fallthrough` and `sources` consistent.
//!
//! # Examples
//!
//! ```rust
//! use dotflow::{
//!     assembly::{Instruction, OpCode},
//!     blocks::Blocks,
//!     metadata::method::MethodBody,
//! };
//!
//! let body = MethodBody::new(vec![
//!     Instruction::ldc_i4(1),
//!     Instruction::branch(OpCode::Brtrue, 3),
//!     Instruction::simple(OpCode::Nop),
//!     Instruction::simple(OpCode::Ret),
//! ]);
//!
//! let blocks = Blocks::from_body(&body)?;
//! assert_eq!(blocks.block_list().len(), 3);
//! assert_eq!(blocks.to_body()?, body);
//! # Ok::<(), dotflow::Error>(())
//! ```

mod builder;
mod cleanup;
mod codegen;

use std::fmt;

use crate::{
    assembly::Instruction,
    metadata::method::{HandlerKind, MethodBody},
    Error, Result,
};

/// Stable index of a block in a [`Blocks`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub(crate) usize);

impl BlockId {
    /// Returns the raw arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// Index of a [`ScopeBlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub(crate) usize);

impl ScopeId {
    /// The scope of the whole method body.
    pub const METHOD: ScopeId = ScopeId(0);
}

/// Kind of region a scope covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// The method body outside of any protected region
    Method,
    /// A protected `try` body
    Try,
    /// A `catch`, `finally` or `fault` handler
    Handler,
    /// A filter expression
    Filter,
}

/// A node of the region tree.
#[derive(Debug, Clone)]
pub struct ScopeBlock {
    /// Region kind
    pub kind: ScopeKind,
    /// Enclosing scope, `None` for the method scope
    pub parent: Option<ScopeId>,
    /// First block of the region; control can only enter a region here
    pub head: Option<BlockId>,
}

/// An exception clause, expressed over scopes.
#[derive(Debug, Clone)]
pub struct HandlerRegion {
    /// Clause kind; the filter index of [`HandlerKind::Filter`] is recomputed by code generation
    pub kind: HandlerKind,
    /// The protected region
    pub try_scope: ScopeId,
    /// The handler body
    pub handler_scope: ScopeId,
    /// The filter expression of filter clauses
    pub filter_scope: Option<ScopeId>,
}

/// A basic block.
#[derive(Debug, Clone)]
pub struct Block {
    /// Instructions; the terminal, if any, is the last one
    pub instructions: Vec<Instruction>,
    /// Explicit branch targets of the terminal, in operand order
    pub targets: Vec<BlockId>,
    /// Successor reached without taking a branch
    pub fallthrough: Option<BlockId>,
    /// Predecessors, one entry per incoming edge
    pub sources: Vec<BlockId>,
    /// Region the block belongs to
    pub scope: ScopeId,
    removed: bool,
}

impl Block {
    pub(crate) fn new(instructions: Vec<Instruction>, scope: ScopeId) -> Self {
        Block {
            instructions,
            targets: Vec::new(),
            fallthrough: None,
            sources: Vec::new(),
            scope,
            removed: false,
        }
    }

    /// The terminal instruction, if the block ends in one.
    #[must_use]
    pub fn terminal(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|instr| instr.is_terminal())
    }

    /// Instructions before the terminal.
    #[must_use]
    pub fn body(&self) -> &[Instruction] {
        match self.terminal() {
            Some(_) => &self.instructions[..self.instructions.len() - 1],
            None => &self.instructions,
        }
    }

    /// All successors: explicit targets first, then the fallthrough.
    pub fn successors(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.targets.iter().copied().chain(self.fallthrough)
    }

    /// Returns the single successor if every outgoing edge leads to the same block.
    #[must_use]
    pub fn sole_successor(&self) -> Option<BlockId> {
        let mut successors = self.successors();
        let first = successors.next()?;
        successors.all(|s| s == first).then_some(first)
    }

    /// Returns true if control leaves the block through an unconditional `br` or by falling
    /// through without a terminal.
    #[must_use]
    pub fn ends_in_jump(&self) -> bool {
        match self.terminal() {
            Some(terminal) => terminal.is_br(),
            None => self.targets.is_empty(),
        }
    }

    /// Returns true if the block was deleted from the graph.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.removed
    }
}

/// The control flow graph of one method body.
#[derive(Debug, Clone)]
pub struct Blocks {
    blocks: Vec<Block>,
    /// Live blocks in layout order
    order: Vec<BlockId>,
    scopes: Vec<ScopeBlock>,
    handlers: Vec<HandlerRegion>,
    entry: BlockId,
}

impl Blocks {
    /// The entry block.
    #[must_use]
    pub fn entry(&self) -> BlockId {
        self.entry
    }

    /// Returns the block with the given id.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not allocated by this graph.
    #[must_use]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0]
    }

    /// Returns the block with the given id, if it exists and is live.
    #[must_use]
    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.0).filter(|block| !block.removed)
    }

    fn live_mut(&mut self, id: BlockId) -> Result<&mut Block> {
        match self.blocks.get_mut(id.0) {
            Some(block) if !block.removed => Ok(block),
            _ => Err(Error::InvalidBlock(id.0)),
        }
    }

    fn check_live(&self, id: BlockId) -> Result<()> {
        self.get(id).map(|_| ()).ok_or(Error::InvalidBlock(id.0))
    }

    /// Replaces the instruction list of a block without touching its edges.
    ///
    /// The new list must keep the block's terminal shape; use [`Blocks::replace_terminal`]
    /// to change control flow.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBlock`] for a removed block and [`Error::Malformed`] if the
    /// terminal would change.
    pub fn set_instructions(&mut self, id: BlockId, instructions: Vec<Instruction>) -> Result<()> {
        let block = self.live_mut(id)?;
        let old = block.terminal().map(|t| t.opcode);
        let new = instructions.last().filter(|i| i.is_terminal()).map(|i| i.opcode);
        if old != new {
            return Err(malformed_error!("Instruction edit changes the terminal of {}", id));
        }
        block.instructions = instructions;
        Ok(())
    }

    /// Live blocks in layout order.
    #[must_use]
    pub fn block_list(&self) -> Vec<BlockId> {
        self.order.clone()
    }

    /// Number of live blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if no block is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Total number of instructions in live blocks.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.order.iter().map(|id| self.blocks[id.0].instructions.len()).sum()
    }

    /// The scope with the given id.
    #[must_use]
    pub fn scope(&self, id: ScopeId) -> &ScopeBlock {
        &self.scopes[id.0]
    }

    /// Exception clauses.
    #[must_use]
    pub fn handlers(&self) -> &[HandlerRegion] {
        &self.handlers
    }

    /// Returns true if control can enter `id` other than through its incoming edges: the
    /// entry block and the first block of every region.
    #[must_use]
    pub fn is_scope_head(&self, id: BlockId) -> bool {
        id == self.entry || self.scopes.iter().any(|scope| scope.head == Some(id))
    }

    /// Returns true if `scope` is `ancestor` or nested inside it.
    #[must_use]
    pub fn scope_within(&self, mut scope: ScopeId, ancestor: ScopeId) -> bool {
        loop {
            if scope == ancestor {
                return true;
            }
            match self.scopes[scope.0].parent {
                Some(parent) => scope = parent,
                None => return false,
            }
        }
    }

    fn link(&mut self, from: BlockId, to: BlockId) {
        self.blocks[to.0].sources.push(from);
    }

    fn unlink(&mut self, from: BlockId, to: BlockId) {
        let sources = &mut self.blocks[to.0].sources;
        if let Some(position) = sources.iter().position(|s| *s == from) {
            sources.remove(position);
        }
    }

    fn unlink_all(&mut self, id: BlockId) {
        let successors: Vec<BlockId> = self.blocks[id.0].successors().collect();
        for successor in successors {
            self.unlink(id, successor);
        }
    }

    fn link_all(&mut self, id: BlockId) {
        let successors: Vec<BlockId> = self.blocks[id.0].successors().collect();
        for successor in successors {
            self.link(id, successor);
        }
    }

    fn remove_from_order(&mut self, id: BlockId) {
        self.blocks[id.0].removed = true;
        self.order.retain(|b| *b != id);
    }

    /// Replaces the terminal of a block.
    ///
    /// The current terminal is dropped, `inserted` is appended to the body, then `terminal`
    /// (if any) becomes the new last instruction. Outgoing edges are replaced by `targets`
    /// and `fallthrough`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBlock`] if the block or one of the new successors is removed.
    pub fn replace_terminal(
        &mut self,
        id: BlockId,
        inserted: Vec<Instruction>,
        terminal: Option<Instruction>,
        targets: Vec<BlockId>,
        fallthrough: Option<BlockId>,
    ) -> Result<()> {
        self.check_live(id)?;
        for successor in targets.iter().chain(fallthrough.iter()) {
            self.check_live(*successor)?;
        }

        self.unlink_all(id);
        let block = &mut self.blocks[id.0];
        if block.terminal().is_some() {
            block.instructions.pop();
        }
        block.instructions.extend(inserted);
        block.instructions.extend(terminal);
        block.targets = targets;
        block.fallthrough = fallthrough;
        self.link_all(id);
        Ok(())
    }

    /// Appends a copy of `from` to `into`, whose only successor must be `from`.
    ///
    /// `into` loses its `br` (if any) and takes over the instructions and successors of
    /// `from`. When `into` was the last predecessor of `from`, `from` is removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBlock`] for removed blocks and [`Error::Malformed`] if `into`
    /// does not jump straight to `from`.
    pub fn merge_into(&mut self, from: BlockId, into: BlockId) -> Result<()> {
        self.check_live(from)?;
        self.check_live(into)?;
        if from == into {
            return Err(malformed_error!("Cannot merge {} into itself", from));
        }
        let target = &self.blocks[into.0];
        if !target.ends_in_jump() || target.sole_successor() != Some(from) {
            return Err(malformed_error!("{} does not jump straight to {}", into, from));
        }

        self.unlink_all(into);
        let appended = self.blocks[from.0].instructions.clone();
        let targets = self.blocks[from.0].targets.clone();
        let fallthrough = self.blocks[from.0].fallthrough;

        let block = &mut self.blocks[into.0];
        if block.terminal().is_some() {
            block.instructions.pop();
        }
        block.instructions.extend(appended);
        block.targets = targets;
        block.fallthrough = fallthrough;
        self.link_all(into);

        if self.blocks[from.0].sources.is_empty() && !self.is_scope_head(from) {
            self.unlink_all(from);
            self.remove_from_order(from);
        }
        Ok(())
    }

    /// Splits a block before instruction `index`.
    ///
    /// The returned block holds the instructions from `index` on together with the original
    /// successors; the original block keeps the prefix and falls through to it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBlock`] for a removed block and [`Error::Malformed`] if
    /// `index` is out of range.
    pub fn split_before(&mut self, id: BlockId, index: usize) -> Result<BlockId> {
        let block = self.live_mut(id)?;
        if index > block.instructions.len() {
            return Err(malformed_error!("Split index {} out of range for {}", index, id));
        }

        let tail = block.instructions.split_off(index);
        let scope = block.scope;
        let new_id = BlockId(self.blocks.len());

        self.unlink_all(id);
        let mut new_block = Block::new(tail, scope);
        new_block.targets = std::mem::take(&mut self.blocks[id.0].targets);
        new_block.fallthrough = self.blocks[id.0].fallthrough.replace(new_id);
        self.blocks.push(new_block);
        self.link_all(id);
        self.link_all(new_id);
        self.insert_after(id, new_id);
        Ok(new_id)
    }

    /// Allocates a block placed right after `anchor` in the layout, in the same scope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBlock`] if `anchor` or a successor is removed.
    pub fn add_block(
        &mut self,
        anchor: BlockId,
        instructions: Vec<Instruction>,
        targets: Vec<BlockId>,
        fallthrough: Option<BlockId>,
    ) -> Result<BlockId> {
        self.check_live(anchor)?;
        for successor in targets.iter().chain(fallthrough.iter()) {
            self.check_live(*successor)?;
        }

        let id = BlockId(self.blocks.len());
        let mut block = Block::new(instructions, self.blocks[anchor.0].scope);
        block.targets = targets;
        block.fallthrough = fallthrough;
        self.blocks.push(block);
        self.link_all(id);
        self.insert_after(anchor, id);
        Ok(id)
    }

    /// Redirects every edge from `id` to `old` so that it leads to `new` instead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBlock`] if one of the blocks is removed.
    pub fn retarget(&mut self, id: BlockId, old: BlockId, new: BlockId) -> Result<()> {
        self.check_live(id)?;
        self.check_live(new)?;

        self.unlink_all(id);
        let block = &mut self.blocks[id.0];
        for target in &mut block.targets {
            if *target == old {
                *target = new;
            }
        }
        if block.fallthrough == Some(old) {
            block.fallthrough = Some(new);
        }
        self.link_all(id);
        Ok(())
    }

    fn insert_after(&mut self, anchor: BlockId, id: BlockId) {
        let position = self
            .order
            .iter()
            .position(|b| *b == anchor)
            .map_or(self.order.len(), |p| p + 1);
        self.order.insert(position, id);
    }

    /// Renders the graph in Graphviz DOT format.
    #[must_use]
    pub fn to_dot(&self, title: Option<&str>) -> String {
        use std::fmt::Write;

        let mut dot = String::from("digraph Blocks {\n");
        if let Some(name) = title {
            let _ = writeln!(dot, "    label=\"{}\";", name.replace('"', "\\\""));
        }
        dot.push_str("    node [shape=box, fontname=\"Courier\", fontsize=10];\n");
        for id in &self.order {
            let block = &self.blocks[id.0];
            let mut label = format!("{id}\\l");
            for instruction in &block.instructions {
                let _ = write!(label, "{}\\l", instruction.to_string().replace('"', "\\\""));
            }
            let _ = writeln!(dot, "    {id} [label=\"{label}\"];");
            for target in &block.targets {
                let _ = writeln!(dot, "    {id} -> {target};");
            }
            if let Some(fallthrough) = block.fallthrough {
                let _ = writeln!(dot, "    {id} -> {fallthrough} [style=dashed];");
            }
        }
        dot.push_str("}\n");
        dot
    }
}

impl fmt::Display for Blocks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for id in &self.order {
            let block = &self.blocks[id.0];
            write!(f, "{id}:")?;
            if !block.sources.is_empty() {
                let sources: Vec<String> = block.sources.iter().map(ToString::to_string).collect();
                write!(f, " <- {}", sources.join(", "))?;
            }
            writeln!(f)?;
            for instruction in &block.instructions {
                writeln!(f, "    {instruction}")?;
            }
            let targets: Vec<String> = block.targets.iter().map(ToString::to_string).collect();
            if !targets.is_empty() {
                writeln!(f, "    -> [{}]", targets.join(", "))?;
            }
            if let Some(fallthrough) = block.fallthrough {
                writeln!(f, "    -> {fallthrough}")?;
            }
        }
        Ok(())
    }
}

impl TryFrom<&MethodBody> for Blocks {
    type Error = Error;

    fn try_from(body: &MethodBody) -> Result<Self> {
        Blocks::from_body(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::OpCode;

    /// `0: ldloc 0; 1: brtrue 3; 2: nop; 3: ret`
    fn diamond() -> Blocks {
        Blocks::from_body(&MethodBody::new(vec![
            Instruction::ldloc(0),
            Instruction::branch(OpCode::Brtrue, 3),
            Instruction::simple(OpCode::Nop),
            Instruction::simple(OpCode::Ret),
        ]))
        .unwrap()
    }

    #[test]
    fn test_edges_and_sources() {
        let blocks = diamond();
        let list = blocks.block_list();
        assert_eq!(list.len(), 3);
        let (head, middle, exit) = (list[0], list[1], list[2]);

        assert_eq!(blocks.block(head).targets, vec![exit]);
        assert_eq!(blocks.block(head).fallthrough, Some(middle));
        assert_eq!(blocks.block(middle).fallthrough, Some(exit));
        assert_eq!(blocks.block(exit).sources, vec![head, middle]);
        assert_eq!(blocks.block(head).body().len(), 1);
    }

    #[test]
    fn test_replace_terminal_rewires_edges() {
        let mut blocks = diamond();
        let list = blocks.block_list();
        let (head, middle, exit) = (list[0], list[1], list[2]);

        blocks
            .replace_terminal(head, vec![Instruction::pop()], Some(Instruction::br(0)), vec![exit], None)
            .unwrap();

        let block = blocks.block(head);
        assert_eq!(block.instructions.len(), 3);
        assert_eq!(block.instructions[1], Instruction::pop());
        assert!(block.terminal().unwrap().is_br());
        assert!(blocks.block(middle).sources.is_empty());
        assert_eq!(blocks.block(exit).sources, vec![middle, head]);
    }

    #[test]
    fn test_merge_into_removes_orphan() {
        let mut blocks = diamond();
        let list = blocks.block_list();
        let (head, middle, exit) = (list[0], list[1], list[2]);

        blocks
            .replace_terminal(head, vec![Instruction::pop()], Some(Instruction::br(0)), vec![middle], None)
            .unwrap();
        blocks.merge_into(middle, head).unwrap();

        assert!(blocks.block(middle).is_removed());
        assert_eq!(blocks.block_list(), vec![head, exit]);
        assert_eq!(blocks.block(head).fallthrough, Some(exit));
        assert_eq!(blocks.block(exit).sources, vec![head]);
        assert_eq!(
            blocks.block(head).instructions.last(),
            Some(&Instruction::simple(OpCode::Nop))
        );
    }

    #[test]
    fn test_merge_into_requires_jump() {
        let mut blocks = diamond();
        let list = blocks.block_list();
        assert!(blocks.merge_into(list[1], list[0]).is_err());
    }

    #[test]
    fn test_split_before() {
        let mut blocks = diamond();
        let head = blocks.entry();
        let exit = blocks.block_list()[2];

        let tail = blocks.split_before(head, 1).unwrap();
        assert_eq!(blocks.block_list()[1], tail);
        assert_eq!(blocks.block(head).fallthrough, Some(tail));
        assert!(blocks.block(head).targets.is_empty());
        assert_eq!(blocks.block(tail).sources, vec![head]);
        assert_eq!(blocks.block(tail).targets, vec![exit]);
        assert!(blocks.block(exit).sources.contains(&tail));
        assert!(!blocks.block(exit).sources.contains(&head));
    }

    #[test]
    fn test_retarget_and_add_block() {
        let mut blocks = diamond();
        let list = blocks.block_list();
        let (head, middle, exit) = (list[0], list[1], list[2]);

        let extra = blocks
            .add_block(head, vec![Instruction::br(0)], vec![exit], None)
            .unwrap();
        blocks.retarget(head, middle, extra).unwrap();

        assert_eq!(blocks.block(head).fallthrough, Some(extra));
        assert_eq!(blocks.block(extra).sources, vec![head]);
        assert!(blocks.block(middle).sources.is_empty());
        assert_eq!(blocks.block_list(), vec![head, extra, middle, exit]);
    }

    #[test]
    fn test_set_instructions_keeps_terminal() {
        let mut blocks = diamond();
        let head = blocks.entry();
        assert!(blocks.set_instructions(head, vec![Instruction::ldc_i4(0)]).is_err());
        blocks
            .set_instructions(head, vec![Instruction::ldc_i4(0), Instruction::branch(OpCode::Brtrue, 3)])
            .unwrap();
        assert_eq!(blocks.block(head).instructions[0], Instruction::ldc_i4(0));
    }

    #[test]
    fn test_display_and_dot() {
        let blocks = diamond();
        let text = blocks.to_string();
        assert!(text.contains("B0:"));
        assert!(text.contains("brtrue"));
        let dot = blocks.to_dot(Some("m"));
        assert!(dot.starts_with("digraph Blocks"));
        assert!(dot.contains("B0 -> B2;"));
    }
}
