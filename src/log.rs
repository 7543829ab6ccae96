//! The span log.
//!
//! Spans get written at the engine's write index, which backtracking winds
//! back, so later matches simply overwrite whatever a failed attempt left
//! behind. Storage is allocated up front and only reallocated when an index
//! runs off the end (or an offset doesn't fit): small parses stay in 16-bit
//! slots and are promoted to 32-bit ones at most once.

use std::{convert::TryFrom, fmt::Debug};

use crate::{RuleId, Span};

/// An unsigned integer type the log can pack offsets and depths into.
pub trait Width: Copy + Default + Debug + Eq {
    const BITS: u32;

    fn pack(n: usize) -> Option<Self>;
    fn unpack(self) -> usize;
}

impl Width for u16 {
    const BITS: u32 = 16;

    fn pack(n: usize) -> Option<Self> {
        u16::try_from(n).ok()
    }

    fn unpack(self) -> usize {
        self as usize
    }
}

impl Width for u32 {
    const BITS: u32 = 32;

    fn pack(n: usize) -> Option<Self> {
        u32::try_from(n).ok()
    }

    fn unpack(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Slot<W> {
    rule: RuleId,
    begin: W,
    end: W,
    depth: W,
}

impl<W: Width> Slot<W> {
    fn pack(span: &Span) -> Option<Self> {
        Some(Slot {
            rule: span.rule,
            begin: W::pack(span.begin)?,
            end: W::pack(span.end)?,
            depth: W::pack(span.depth)?,
        })
    }

    fn unpack(&self) -> Span {
        Span::new(
            self.rule,
            self.begin.unpack(),
            self.end.unpack(),
            self.depth.unpack(),
        )
    }
}

/// Fixed-capacity span storage at one width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spans<W> {
    slots: Vec<Slot<W>>,
}

impl<W: Width> Spans<W> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![Slot::default(); capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Write `span` at `index`. Hands the span back if it doesn't fit,
    /// either because the index is past the end or an offset is too wide.
    pub fn put(&mut self, index: usize, span: Span) -> Result<(), Span> {
        let slot = Slot::pack(&span).ok_or(span)?;
        match self.slots.get_mut(index) {
            Some(it) => {
                *it = slot;
                Ok(())
            }
            None => Err(span),
        }
    }

    pub fn get(&self, index: usize) -> Option<Span> {
        self.slots.get(index).map(Slot::unpack)
    }

    pub fn trim(&mut self, length: usize) {
        self.slots.truncate(length);
    }

    /// A copy of the first `length` slots.
    pub fn prefix(&self, length: usize) -> Self {
        Self {
            slots: self.slots[..length.min(self.slots.len())].to_vec(),
        }
    }

    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = Slot::default();
        }
    }

    /// Copy everything into storage of (possibly) another width with room for `capacity` slots.
    ///
    /// Returns `None` if some existing entry doesn't fit in `V`.
    pub fn widen<V: Width>(&self, capacity: usize) -> Option<Spans<V>> {
        let mut out = Spans::with_capacity(capacity.max(self.capacity()));
        for (dest, slot) in out.slots.iter_mut().zip(self.slots.iter()) {
            *dest = Slot::pack(&slot.unpack())?;
        }
        Some(out)
    }
}

/// The growable, width-adaptive log a parse writes into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanLog {
    Narrow(Spans<u16>),
    Wide(Spans<u32>),
}

impl SpanLog {
    /// A narrow log with `capacity` pre-allocated slots.
    pub fn new(capacity: usize) -> Self {
        SpanLog::Narrow(Spans::with_capacity(capacity))
    }

    pub fn capacity(&self) -> usize {
        match self {
            SpanLog::Narrow(spans) => spans.capacity(),
            SpanLog::Wide(spans) => spans.capacity(),
        }
    }

    pub fn is_wide(&self) -> bool {
        matches!(self, SpanLog::Wide(_))
    }

    /// Slot contents at `index`, written or not.
    pub fn get(&self, index: usize) -> Option<Span> {
        match self {
            SpanLog::Narrow(spans) => spans.get(index),
            SpanLog::Wide(spans) => spans.get(index),
        }
    }

    /// Write `span` at `index`, growing first if needed, and return the next write index.
    pub fn append(&mut self, index: usize, span: Span) -> usize {
        let rejected = match self {
            SpanLog::Narrow(spans) => spans.put(index, span),
            SpanLog::Wide(spans) => spans.put(index, span),
        };
        if let Err(span) = rejected {
            self.promote(index);
            let again = match self {
                SpanLog::Narrow(spans) => spans.put(index, span),
                SpanLog::Wide(spans) => spans.put(index, span),
            };
            // Wide slots hold anything the parser accepts as input.
            debug_assert!(again.is_ok(), "span {:?} does not fit a wide log", span);
        }
        index + 1
    }

    /// Make sure `min_index` is a valid slot, doubling capacity (and going wide) if it isn't.
    pub fn grow(&mut self, min_index: usize) {
        if min_index >= self.capacity() {
            self.promote(min_index);
        }
    }

    /// The one place storage gets replaced.
    fn promote(&mut self, min_index: usize) {
        let old = self.capacity();
        let capacity = if min_index >= old {
            (old * 2).max(min_index + 1)
        } else {
            old
        };
        let grown = match self {
            SpanLog::Narrow(spans) => spans.widen::<u32>(capacity),
            SpanLog::Wide(spans) => spans.widen::<u32>(capacity),
        };
        if let Some(grown) = grown {
            tracing::debug!(from = old, to = capacity, bits = u32::BITS, "span log grew");
            *self = SpanLog::Wide(grown);
        }
    }

    /// Drop everything from `length` on.
    pub fn trim(&mut self, length: usize) {
        match self {
            SpanLog::Narrow(spans) => spans.trim(length),
            SpanLog::Wide(spans) => spans.trim(length),
        }
    }

    /// A trimmed copy holding the first `length` slots, at the same width.
    pub fn prefix(&self, length: usize) -> SpanLog {
        match self {
            SpanLog::Narrow(spans) => SpanLog::Narrow(spans.prefix(length)),
            SpanLog::Wide(spans) => SpanLog::Wide(spans.prefix(length)),
        }
    }

    /// Forget every entry but keep the storage around.
    pub fn clear(&mut self) {
        match self {
            SpanLog::Narrow(spans) => spans.clear(),
            SpanLog::Wide(spans) => spans.clear(),
        }
    }

    /// Spans in the order they were recorded, up to the first slot nobody wrote.
    pub fn iter(&self) -> impl Iterator<Item = Span> + '_ {
        (0..self.capacity()).map_while(move |idx| self.get(idx).filter(|s| s.rule != RuleId::UNKNOWN))
    }

    /// How many spans [`SpanLog::iter`] will produce.
    pub fn recorded(&self) -> usize {
        self.iter().count()
    }
}

#[cfg(test)]
fn span(n: usize) -> Span {
    Span::new(RuleId(2 + n as u16 % 3), n, n + 1, n % 4)
}

#[test]
fn append_then_iter() {
    let mut log = SpanLog::new(8);
    let mut idx = 0;
    for n in 0..5 {
        idx = log.append(idx, span(n));
    }
    assert_eq!(idx, 5);
    assert!(!log.is_wide());
    assert_eq!(log.iter().collect::<Vec<_>>(), (0..5).map(span).collect::<Vec<_>>());
    assert_eq!(log.recorded(), 5);
}

#[test]
fn overwrite_after_backtrack() {
    let mut log = SpanLog::new(4);
    log.append(0, span(0));
    log.append(1, span(1));
    // the second entry was a failed attempt; the write index goes back to 1
    log.append(1, span(7));
    assert_eq!(log.get(1), Some(span(7)));
    assert_eq!(log.recorded(), 2);
}

#[test]
fn growing_keeps_indices() {
    let mut log = SpanLog::new(1);
    let mut idx = 0;
    for n in 0..20 {
        idx = log.append(idx, span(n));
    }
    assert!(log.is_wide());
    assert!(log.capacity() >= 20);
    for n in 0..20 {
        assert_eq!(log.get(n), Some(span(n)));
    }
}

#[test]
fn grow_is_a_noop_when_there_is_room() {
    let mut log = SpanLog::new(16);
    log.grow(15);
    assert_eq!(log.capacity(), 16);
    assert!(!log.is_wide());

    log.grow(16);
    assert_eq!(log.capacity(), 32);
    assert!(log.is_wide());

    log.grow(100);
    assert_eq!(log.capacity(), 101);
}

#[test]
fn wide_offsets_promote_in_place() {
    let mut log = SpanLog::new(4);
    log.append(0, span(0));
    let far = Span::new(RuleId(5), 70_000, 70_010, 1);
    log.append(1, far);
    assert!(log.is_wide());
    assert_eq!(log.capacity(), 4);
    assert_eq!(log.get(0), Some(span(0)));
    assert_eq!(log.get(1), Some(far));
}

#[test]
fn trim_is_idempotent() {
    let mut log = SpanLog::new(10);
    for n in 0..6 {
        log.append(n, span(n));
    }
    log.trim(4);
    let once = log.clone();
    log.trim(4);
    assert_eq!(log, once);
    assert_eq!(log.capacity(), 4);
    assert_eq!(log.recorded(), 4);
}

#[test]
fn clear_keeps_storage() {
    let mut log = SpanLog::new(3);
    for n in 0..5 {
        log.append(n, span(n));
    }
    let capacity = log.capacity();
    log.clear();
    assert_eq!(log.capacity(), capacity);
    assert!(log.is_wide());
    assert_eq!(log.recorded(), 0);
}

#[test]
fn prefix_leaves_the_original_alone() {
    let mut log = SpanLog::new(8);
    for n in 0..5 {
        log.append(n, span(n));
    }
    let head = log.prefix(3);
    assert_eq!(head.capacity(), 3);
    assert_eq!(head.iter().collect::<Vec<_>>(), log.iter().take(3).collect::<Vec<_>>());
    assert_eq!(log.capacity(), 8);
    assert_eq!(log.recorded(), 5);
    assert_eq!(log.prefix(100).capacity(), 8);
}
