//! # pegtree
//!
//! The runtime half of a PEG parser: run a table of rules over some input,
//! write down every successful match as a flat log of spans, and rebuild
//! the parse tree from that log when somebody asks for it.
//!
//! The log never stores parent pointers. Each span remembers how deeply
//! nested it was when it was recorded, and since PEG matches never partially
//! overlap, interval containment plus recording order is enough to get the
//! whole tree back out.

mod display;
mod engine;
mod error;
mod grammar;
mod log;
mod parse;
mod position;
mod tree;

pub use engine::{Cursor, InputError, Parser, ParserConfig, END_OF_INPUT};
pub use error::{Diagnostic, ParseError};
pub use grammar::{ClassRange, Expr, Grammar, GrammarBuilder, GrammarError, Rule};
pub use log::{SpanLog, Spans, Width};
pub use parse::LoadError;
pub use position::{translate, Position};
pub use tree::{Entry, Node, NodeKind, Ordered, SyntaxTree};

use std::{fmt, ops::Range};

#[macro_use]
extern crate derivative;

/// Identifies a rule in a [`Grammar`].
///
/// Two ids are spoken for: [`RuleId::UNKNOWN`] marks log slots that were never
/// written, and [`RuleId::TEXT`] labels captured text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RuleId(pub u16);

impl RuleId {
    pub const UNKNOWN: RuleId = RuleId(0);
    pub const TEXT: RuleId = RuleId(1);

    /// First id handed out to grammar rules.
    pub const FIRST: RuleId = RuleId(2);

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_reserved(self) -> bool {
        self < Self::FIRST
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One recorded match.
///
/// `begin..end` is half-open and counted in characters. `depth` is how many
/// recorded rules were still open around this one when it finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub rule: RuleId,
    pub begin: usize,
    pub end: usize,
    pub depth: usize,
}

impl Span {
    pub fn new(rule: RuleId, begin: usize, end: usize, depth: usize) -> Self {
        Self {
            rule,
            begin,
            end,
            depth,
        }
    }

    pub fn range(&self) -> Range<usize> {
        self.begin..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    /// Whether `other`'s interval sits inside this one's.
    pub fn covers(&self, other: &Span) -> bool {
        self.begin <= other.begin && other.end <= self.end
    }

    /// PEG matches either nest or stay apart; anything else means the log is broken.
    pub fn disjoint_or_nested(&self, other: &Span) -> bool {
        self.end <= other.begin
            || other.end <= self.begin
            || self.covers(other)
            || other.covers(self)
    }
}

#[test]
fn nesting_checks() {
    let outer = Span::new(RuleId(2), 0, 10, 0);
    let inner = Span::new(RuleId(3), 2, 5, 1);
    let after = Span::new(RuleId(3), 5, 9, 1);
    let straddle = Span::new(RuleId(4), 4, 12, 1);

    assert!(outer.covers(&inner));
    assert!(!inner.covers(&outer));
    assert!(inner.disjoint_or_nested(&after));
    assert!(outer.disjoint_or_nested(&inner));
    assert!(!inner.disjoint_or_nested(&straddle));
    assert!(!outer.disjoint_or_nested(&straddle));
}
