//! Getting a tree back out of a flat log.
//!
//! Spans are bucketed by the depth they were recorded at (see [`Ordered`]).
//! Within a bucket they are in recording order, which for spans at the same
//! depth is also left-to-right order. A span's parent is then the one
//! enclosing it in the bucket above, and a depth-first walk that keeps one
//! cursor per bucket visits every span exactly once.

use std::{cell::OnceCell, ops::Range, rc::Rc};

use crate::{log::SpanLog, Grammar, RuleId, Span};

/// A span together with where it sits in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entry {
    pub span: Span,
    /// Index in the log. Parents are recorded after their children, so this
    /// breaks ties between spans with identical intervals.
    pub ordinal: usize,
}

impl Entry {
    pub fn is_parent_of(&self, other: &Entry) -> bool {
        self.span.covers(&other.span) && self.ordinal > other.ordinal
    }
}

/// The log's spans, bucketed by depth.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ordered {
    levels: Vec<Vec<Entry>>,
}

impl Ordered {
    pub fn new(log: &SpanLog) -> Self {
        // count first so every bucket is allocated exactly once
        let mut counts: Vec<usize> = Vec::new();
        for span in log.iter() {
            if span.depth >= counts.len() {
                counts.resize(span.depth + 1, 0);
            }
            counts[span.depth] += 1;
        }

        let mut levels: Vec<Vec<Entry>> = counts.iter().map(|n| Vec::with_capacity(*n)).collect();
        for (ordinal, span) in log.iter().enumerate() {
            levels[span.depth].push(Entry { span, ordinal });
        }
        Self { levels }
    }

    /// Number of depth buckets.
    pub fn depths(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, depth: usize) -> &[Entry] {
        self.levels.get(depth).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn roots(&self) -> &[Entry] {
        self.level(0)
    }

    fn at(&self, depth: usize, idx: usize) -> Option<Entry> {
        self.levels.get(depth)?.get(idx).copied()
    }

    /// The last span recorded at each depth, deepest first.
    ///
    /// On a failed parse this is roughly the path the parser was on when it
    /// gave up: the last thing that finished at every level.
    pub fn last_attempts(&self) -> Vec<Entry> {
        self.levels
            .iter()
            .rev()
            .filter_map(|level| level.last().copied())
            .collect()
    }

    /// Rebuild the tree as a preorder listing, with gap nodes filling in
    /// whatever input the recorded spans don't cover.
    ///
    /// Each bucket is read front to back exactly once, so this is linear in
    /// the number of spans.
    pub fn preorder(&self) -> Vec<Node> {
        let mut out = Vec::with_capacity(self.levels.iter().map(Vec::len).sum());
        // how many spans of each depth have been visited
        let mut next = vec![0usize; self.levels.len() + 1];
        let mut stack: Vec<Frame> = Vec::new();

        while let Some(root) = self.at(0, next[0]) {
            next[0] += 1;
            let nested = self.first_child(&root, 1, &next).is_some();
            out.push(Node::real(&root, 0, !nested));
            if nested {
                stack.push(Frame::new(root, 1));
            }

            while let Some(&Frame {
                parent,
                depth,
                last_end,
            }) = stack.last()
            {
                let child = match self.first_child(&parent, depth, &next) {
                    Some(it) => it,
                    None => {
                        if let Some(end) = last_end.filter(|end| *end != parent.span.end) {
                            out.push(Node::gap(
                                NodeKind::TrailingGap,
                                end,
                                parent.span.end,
                                depth,
                            ));
                        }
                        stack.pop();
                        continue;
                    }
                };

                match last_end {
                    None if parent.span.begin < child.span.begin => out.push(Node::gap(
                        NodeKind::LeadingGap,
                        parent.span.begin,
                        child.span.begin,
                        depth,
                    )),
                    Some(end) if end < child.span.begin => out.push(Node::gap(
                        NodeKind::InternalGap,
                        end,
                        child.span.begin,
                        depth,
                    )),
                    _ => {}
                }
                if let Some(top) = stack.last_mut() {
                    top.last_end = Some(child.span.end);
                }

                next[depth] += 1;
                let nested = self.first_child(&child, depth + 1, &next).is_some();
                out.push(Node::real(&child, depth, !nested));
                if nested {
                    stack.push(Frame::new(child, depth + 1));
                }
            }
        }
        out
    }

    /// The next unvisited span at `depth`, if it belongs to `parent`.
    fn first_child(&self, parent: &Entry, depth: usize, next: &[usize]) -> Option<Entry> {
        self.at(depth, next[depth])
            .filter(|child| parent.is_parent_of(child))
    }
}

/// A parent whose children are being listed.
#[derive(Debug, Clone, Copy)]
struct Frame {
    parent: Entry,
    /// Depth of the children.
    depth: usize,
    /// End of the last child listed so far.
    last_end: Option<usize>,
}

impl Frame {
    fn new(parent: Entry, depth: usize) -> Self {
        Self {
            parent,
            depth,
            last_end: None,
        }
    }
}

/// What a reconstructed node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A recorded span.
    Rule(RuleId),
    /// Unrecorded input between a parent's start and its first child.
    LeadingGap,
    /// Unrecorded input between two siblings.
    InternalGap,
    /// Unrecorded input between the last child and the parent's end.
    TrailingGap,
}

impl NodeKind {
    pub fn is_gap(&self) -> bool {
        !matches!(self, NodeKind::Rule(_))
    }
}

/// One line of the preorder listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Node {
    pub kind: NodeKind,
    pub begin: usize,
    pub end: usize,
    pub depth: usize,
    pub leaf: bool,
}

impl Node {
    fn real(entry: &Entry, depth: usize, leaf: bool) -> Self {
        Self {
            kind: NodeKind::Rule(entry.span.rule),
            begin: entry.span.begin,
            end: entry.span.end,
            depth,
            leaf,
        }
    }

    fn gap(kind: NodeKind, begin: usize, end: usize, depth: usize) -> Self {
        Self {
            kind,
            begin,
            end,
            depth,
            leaf: true,
        }
    }

    pub fn range(&self) -> Range<usize> {
        self.begin..self.end
    }

    pub fn rule(&self) -> Option<RuleId> {
        match self.kind {
            NodeKind::Rule(id) => Some(id),
            _ => None,
        }
    }
}

/// A successful parse.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct SyntaxTree<'g> {
    #[derivative(Debug = "ignore")]
    grammar: &'g Grammar,
    #[derivative(Debug = "ignore")]
    input: Rc<[char]>,
    log: SpanLog,
    #[derivative(Debug = "ignore")]
    ordered: OnceCell<Ordered>,
}

impl<'g> SyntaxTree<'g> {
    pub(crate) fn new(grammar: &'g Grammar, input: Rc<[char]>, log: SpanLog) -> Self {
        Self {
            grammar,
            input,
            log,
            ordered: OnceCell::new(),
        }
    }

    pub fn grammar(&self) -> &'g Grammar {
        self.grammar
    }

    /// The trimmed log.
    pub fn log(&self) -> &SpanLog {
        &self.log
    }

    /// Every recorded span in recording order, for driving semantic actions.
    ///
    /// Children come before their parents. Spans labelled [`RuleId::TEXT`]
    /// are captures; read them with [`SyntaxTree::text`].
    pub fn events(&self) -> impl Iterator<Item = Span> + '_ {
        self.log.iter()
    }

    /// The span the start rule matched.
    pub fn root(&self) -> Option<Span> {
        self.ordered().roots().first().map(|e| e.span)
    }

    /// The input covered by `range`.
    pub fn slice(&self, range: Range<usize>) -> String {
        self.input
            .get(range)
            .map(|chars| chars.iter().collect())
            .unwrap_or_default()
    }

    pub fn text(&self, span: &Span) -> String {
        self.slice(span.range())
    }

    /// The input without its end marker.
    pub fn source(&self) -> String {
        self.slice(0..self.input.len().saturating_sub(1))
    }

    pub fn ordered(&self) -> &Ordered {
        self.ordered.get_or_init(|| Ordered::new(&self.log))
    }

    pub fn preorder(&self) -> impl Iterator<Item = Node> {
        self.ordered().preorder().into_iter()
    }

    /// Display name for a node.
    pub fn label(&self, kind: NodeKind) -> &'g str {
        match kind {
            NodeKind::Rule(id) => self.grammar.name(id),
            NodeKind::LeadingGap => "(leading)",
            NodeKind::InternalGap => "(gap)",
            NodeKind::TrailingGap => "(trailing)",
        }
    }
}

#[cfg(test)]
fn log_of(spans: &[(u16, usize, usize, usize)]) -> SpanLog {
    let mut log = SpanLog::new(spans.len());
    for (idx, &(rule, begin, end, depth)) in spans.iter().enumerate() {
        log.append(idx, Span::new(RuleId(rule), begin, end, depth));
    }
    log
}

#[cfg(test)]
fn shape(nodes: &[Node]) -> Vec<(String, usize, usize, usize)> {
    nodes
        .iter()
        .map(|n| {
            let name = match n.kind {
                NodeKind::Rule(id) => id.0.to_string(),
                NodeKind::LeadingGap => "pre".to_owned(),
                NodeKind::InternalGap => "in".to_owned(),
                NodeKind::TrailingGap => "suf".to_owned(),
            };
            (name, n.begin, n.end, n.depth)
        })
        .collect()
}

#[test]
fn buckets_keep_recording_order() {
    // recorded bottom-up, like a parse would
    let log = log_of(&[(3, 0, 1, 2), (4, 0, 2, 1), (3, 2, 3, 1), (2, 0, 3, 0)]);
    let ordered = Ordered::new(&log);
    assert_eq!(ordered.depths(), 3);
    assert_eq!(ordered.roots().len(), 1);
    assert_eq!(
        ordered.level(1).iter().map(|e| e.ordinal).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert!(ordered.level(7).is_empty());

    let last = ordered.last_attempts();
    assert_eq!(
        last.iter().map(|e| e.ordinal).collect::<Vec<_>>(),
        vec![0, 2, 3]
    );
}

#[test]
fn nested_with_gaps() {
    // S [0,10) with children A [1,4) and B [6,9); A has a child C [2,3)
    let log = log_of(&[(5, 2, 3, 2), (3, 1, 4, 1), (4, 6, 9, 1), (2, 0, 10, 0)]);
    let nodes = Ordered::new(&log).preorder();
    let s = |n: &str, b: usize, e: usize, d: usize| (n.to_owned(), b, e, d);
    assert_eq!(
        shape(&nodes),
        vec![
            s("2", 0, 10, 0),
            s("pre", 0, 1, 1),
            s("3", 1, 4, 1),
            s("pre", 1, 2, 2),
            s("5", 2, 3, 2),
            s("suf", 3, 4, 2),
            s("in", 4, 6, 1),
            s("4", 6, 9, 1),
            s("suf", 9, 10, 1),
        ]
    );
    assert!(!nodes[0].leaf);
    assert!(!nodes[2].leaf);
    assert!(nodes[4].leaf);
    assert!(nodes[7].leaf);
}

#[test]
fn cousins_stay_with_their_own_parent() {
    // S [0,4) -> P [0,2) -> x [0,1); S -> Q [2,4) -> y [3,4)
    let log = log_of(&[
        (4, 0, 1, 2),
        (3, 0, 2, 1),
        (4, 3, 4, 2),
        (3, 2, 4, 1),
        (2, 0, 4, 0),
    ]);
    let nodes = Ordered::new(&log).preorder();
    let s = |n: &str, b: usize, e: usize, d: usize| (n.to_owned(), b, e, d);
    assert_eq!(
        shape(&nodes),
        vec![
            s("2", 0, 4, 0),
            s("3", 0, 2, 1),
            s("4", 0, 1, 2),
            s("suf", 1, 2, 2),
            s("3", 2, 4, 1),
            s("pre", 2, 3, 2),
            s("4", 3, 4, 2),
        ]
    );
}

#[test]
fn empty_spans_and_lone_roots() {
    // an action-like empty span at the very start, then a childless second root
    let log = log_of(&[(3, 0, 0, 1), (4, 0, 2, 1), (2, 0, 2, 0), (2, 2, 2, 0)]);
    let nodes = Ordered::new(&log).preorder();
    let s = |n: &str, b: usize, e: usize, d: usize| (n.to_owned(), b, e, d);
    assert_eq!(
        shape(&nodes),
        vec![
            s("2", 0, 2, 0),
            s("3", 0, 0, 1),
            s("4", 0, 2, 1),
            s("2", 2, 2, 0),
        ]
    );
    assert!(nodes[3].leaf);
}
