//! Abstract evaluation stack.
//!
//! Blocks are emulated in isolation, so the stack a block starts with is usually unknown.
//! [`ValueStack`] therefore never underflows: popping an empty stack yields
//! [`Value::Unknown`], which is exactly what a value pushed by some unseen predecessor is.

use crate::emulation::value::Value;

/// LIFO stack of abstract values.
///
/// # Example
///
/// ```rust
/// use dotflow::emulation::{Value, ValueStack};
///
/// let mut stack = ValueStack::new();
/// stack.push(Value::Null);
/// assert_eq!(stack.pop(), Value::Null);
/// assert_eq!(stack.pop(), Value::Unknown);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ValueStack {
    values: Vec<Value>,
}

impl ValueStack {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        ValueStack { values: Vec::new() }
    }

    /// Number of values currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no value is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Pushes a value.
    pub fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    /// Pushes `count` unknown values.
    pub fn push_unknown(&mut self, count: usize) {
        self.values.resize(self.values.len() + count, Value::Unknown);
    }

    /// Pops the top value, `Unknown` if the stack is empty.
    pub fn pop(&mut self) -> Value {
        self.values.pop().unwrap_or(Value::Unknown)
    }

    /// Discards `count` values.
    pub fn pop_n(&mut self, count: usize) {
        let keep = self.values.len().saturating_sub(count);
        self.values.truncate(keep);
    }

    /// Returns the top value, `Unknown` if the stack is empty.
    #[must_use]
    pub fn peek(&self) -> Value {
        self.values.last().cloned().unwrap_or(Value::Unknown)
    }

    /// The topmost `count` tracked values, bottom first.
    ///
    /// Shorter than `count` if fewer values are tracked.
    #[must_use]
    pub fn top(&self, count: usize) -> &[Value] {
        &self.values[self.values.len().saturating_sub(count)..]
    }

    /// Duplicates the top value, keeping its origin.
    pub fn dup_top(&mut self) {
        let top = self.pop();
        self.values.push(top.clone());
        self.values.push(top);
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}
