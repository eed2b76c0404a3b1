//! Record of the rewrites performed while simplifying a method.
//!
//! Passes hold the log by shared reference through the pass context and append to it as
//! they commit rewrites. The driver returns the log with its statistics, which makes every
//! change observable to callers and tests without threading `&mut` state through passes.
//!
//! # Architecture
//!
//! - [`Event`] - A single recorded rewrite or diagnostic
//! - [`EventLog`] - Append-only collection with query and summary helpers
//! - [`EventBuilder`] - Fluent API returned by [`EventLog::record`]
//!
//! # Example
//!
//! ```rust
//! use dotflow::deobfuscation::{EventKind, EventLog};
//!
//! let log = EventLog::new();
//! log.record(EventKind::BranchResolved).message("brtrue always taken");
//! log.record(EventKind::CodeRemoved);
//!
//! assert_eq!(log.len(), 2);
//! assert!(log.has(EventKind::BranchResolved));
//! assert_eq!(log.summary(), "1 branch resolved, 1 code removed");
//! ```

use std::{collections::HashMap, fmt};

use strum::{EnumCount, EnumIter, IntoStaticStr};

use crate::blocks::BlockId;

/// Categories of recorded events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumCount, EnumIter, IntoStaticStr)]
pub enum EventKind {
    /// A conditional branch was replaced by an unconditional one.
    BranchResolved,
    /// A predecessor was redirected past a switch.
    SwitchResolved,
    /// A switch block was copied into its predecessors.
    SwitchMerged,
    /// A load or a pure computation was replaced by a literal.
    ConstantFolded,
    /// A store to a never-read local was turned into a discard.
    StoreRemoved,
    /// Unused side-effect-free instructions were deleted.
    CodeRemoved,
    /// A store immediately reloaded was turned into `dup` + store.
    StoreReloadFixed,
    /// A `dup` + branch block was folded into its predecessors.
    DupBlockFolded,
    /// The legacy loop latch idiom was resolved.
    LoopLatchFixed,
    /// An unreachable block was deleted.
    BlockRemoved,
    /// Straight-line blocks were merged.
    BlocksMerged,
    /// A call to a forwarding method was inlined.
    CallInlined,
    /// A pass failed on a unit and was skipped.
    Skipped,
}

impl EventKind {
    /// Returns a human-readable description of this event kind.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::BranchResolved => "branch resolved",
            Self::SwitchResolved => "switch resolved",
            Self::SwitchMerged => "switch merged",
            Self::ConstantFolded => "constant folded",
            Self::StoreRemoved => "store removed",
            Self::CodeRemoved => "code removed",
            Self::StoreReloadFixed => "store reload fixed",
            Self::DupBlockFolded => "dup block folded",
            Self::LoopLatchFixed => "loop latch fixed",
            Self::BlockRemoved => "block removed",
            Self::BlocksMerged => "blocks merged",
            Self::CallInlined => "call inlined",
            Self::Skipped => "skipped",
        }
    }

    /// Returns true if this event represents a code transformation.
    #[must_use]
    pub fn is_transformation(&self) -> bool {
        !matches!(self, Self::Skipped)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single logged event.
#[derive(Debug, Clone)]
pub struct Event {
    /// The type of event.
    pub kind: EventKind,
    /// Block the event applies to, if any.
    pub block: Option<BlockId>,
    /// Human-readable description.
    pub message: String,
    /// Name of the pass that recorded the event.
    pub pass: Option<&'static str>,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.block {
            Some(block) => write!(f, "[{}] {}: {}", self.kind, block, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

/// Builder for creating events with a fluent API.
///
/// Created by [`EventLog::record`]. The event is added to the log when the builder is
/// dropped.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    kind: EventKind,
    block: Option<BlockId>,
    message: Option<String>,
    pass: Option<&'static str>,
}

impl EventBuilder<'_> {
    /// Sets the block the event applies to.
    pub fn at_block(mut self, block: BlockId) -> Self {
        self.block = Some(block);
        self
    }

    /// Sets a custom message describing the event.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Associates this event with a pass.
    pub fn pass(mut self, name: &'static str) -> Self {
        self.pass = Some(name);
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let message = self
            .message
            .take()
            .unwrap_or_else(|| self.kind.description().to_string());

        self.log.events.push(Event {
            kind: self.kind,
            block: self.block.take(),
            message,
            pass: self.pass.take(),
        });
    }
}

/// Collection of events recorded during simplification.
///
/// Events can be appended through shared references (`&self`).
#[derive(Debug)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self {
            events: boxcar::Vec::new(),
        }
    }
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        self.iter().cloned().collect()
    }
}

impl EventLog {
    /// Creates an empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no events have been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Returns the total number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts building a new event of the given kind.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder {
            log: self,
            kind,
            block: None,
            message: None,
            pass: None,
        }
    }

    /// Appends copies of all events of `other`.
    pub fn merge(&self, other: &EventLog) {
        for event in other {
            self.events.push(event.clone());
        }
    }

    /// Returns true if any event of the given kind exists.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.iter().any(|e| e.kind == kind)
    }

    /// Counts events of the given kind.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.iter().filter(|e| e.kind == kind).count()
    }

    /// Returns an iterator over all events.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Returns the number of transformation events.
    #[must_use]
    pub fn transformation_count(&self) -> usize {
        self.iter().filter(|e| e.kind.is_transformation()).count()
    }

    /// Counts events grouped by kind.
    #[must_use]
    pub fn count_by_kind(&self) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for event in self {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Generates a human-readable summary of the transformations.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }

        let mut parts: Vec<String> = self
            .count_by_kind()
            .iter()
            .filter(|(kind, _)| kind.is_transformation())
            .map(|(kind, count)| format!("{} {}", count, kind.description()))
            .collect();

        if parts.is_empty() {
            return format!("{} events", self.len());
        }

        parts.sort();
        parts.join(", ")
    }
}

/// Iterator over the events of an [`EventLog`].
pub struct EventLogIter<'a> {
    inner: boxcar::Iter<'a, Event>,
}

impl<'a> Iterator for EventLogIter<'a> {
    type Item = &'a Event;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, e)| e)
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a Event;
    type IntoIter = EventLogIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        EventLogIter {
            inner: self.events.iter(),
        }
    }
}

impl FromIterator<Event> for EventLog {
    fn from_iter<T: IntoIterator<Item = Event>>(iter: T) -> Self {
        let log = Self::new();
        for event in iter {
            log.events.push(event);
        }
        log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_empty_log() {
        let log = EventLog::new();
        assert!(log.is_empty());
        assert_eq!(log.len(), 0);
        assert_eq!(log.summary(), "no events");
    }

    #[test]
    fn test_record_event() {
        let log = EventLog::new();
        log.record(EventKind::SwitchResolved)
            .at_block(BlockId(3))
            .pass("switch")
            .message("case 2");

        let event = log.iter().next().unwrap();
        assert_eq!(event.kind, EventKind::SwitchResolved);
        assert_eq!(event.block, Some(BlockId(3)));
        assert_eq!(event.pass, Some("switch"));
        assert_eq!(event.to_string(), "[switch resolved] B3: case 2");
    }

    #[test]
    fn test_default_message() {
        let log = EventLog::new();
        log.record(EventKind::BlocksMerged);
        assert_eq!(log.iter().next().unwrap().message, "blocks merged");
    }

    #[test]
    fn test_counts_and_merge() {
        let log = EventLog::new();
        log.record(EventKind::CodeRemoved);
        log.record(EventKind::CodeRemoved);
        log.record(EventKind::Skipped);

        assert_eq!(log.count_kind(EventKind::CodeRemoved), 2);
        assert_eq!(log.transformation_count(), 2);
        assert!(!log.has(EventKind::CallInlined));

        let other = EventLog::new();
        other.merge(&log);
        assert_eq!(other.len(), 3);
        assert_eq!(other.clone().len(), 3);
        assert_eq!(other.summary(), "2 code removed");
    }

    #[test]
    fn test_every_kind_has_a_name() {
        assert_eq!(EventKind::iter().count(), EventKind::COUNT);
        for kind in EventKind::iter() {
            let name: &'static str = kind.into();
            assert!(!name.is_empty());
            assert!(!kind.description().is_empty());
        }
    }
}
