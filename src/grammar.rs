//! Grammars as data.
//!
//! A [`Grammar`] is a table from [`RuleId`] to [`Rule`], where each rule is a
//! parsing expression. Nothing here knows how to match anything; that's the
//! engine's job.

use std::{convert::TryFrom, fmt};

use bimap::BiHashMap;
use itertools::Itertools;
use thiserror::Error;

use crate::RuleId;

/// One inclusive range in a character class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassRange {
    pub lo: char,
    pub hi: char,
}

impl ClassRange {
    pub fn new(lo: char, hi: char) -> Self {
        Self { lo, hi }
    }

    pub fn single(c: char) -> Self {
        Self { lo: c, hi: c }
    }

    pub fn contains(&self, c: char) -> bool {
        self.lo <= c && c <= self.hi
    }
}

/// A parsing expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Matches without consuming anything.
    Empty,
    /// Any single character except the end of input.
    Dot,
    Char(char),
    Literal {
        text: String,
        ignore_case: bool,
    },
    Class {
        ranges: Vec<ClassRange>,
        negated: bool,
    },
    /// Call another rule.
    Rule(RuleId),
    Sequence(Vec<Expr>),
    /// Ordered choice.
    Choice(Vec<Expr>),
    ZeroOrMore(Box<Expr>),
    OneOrMore(Box<Expr>),
    Optional(Box<Expr>),
    /// Positive lookahead.
    And(Box<Expr>),
    /// Negative lookahead.
    Not(Box<Expr>),
    /// Record the matched text as a [`RuleId::TEXT`] span.
    Capture(Box<Expr>),
}

impl Expr {
    pub fn lit<S: Into<String>>(text: S) -> Self {
        Expr::Literal {
            text: text.into(),
            ignore_case: false,
        }
    }

    pub fn lit_nocase<S: Into<String>>(text: S) -> Self {
        Expr::Literal {
            text: text.into(),
            ignore_case: true,
        }
    }

    pub fn range(lo: char, hi: char) -> Self {
        Expr::Class {
            ranges: vec![ClassRange::new(lo, hi)],
            negated: false,
        }
    }

    /// Any one of the given characters.
    pub fn set(chars: &str) -> Self {
        Expr::Class {
            ranges: chars.chars().map(ClassRange::single).collect(),
            negated: false,
        }
    }

    /// Sequence, flattening nested sequences.
    pub fn seq<I: IntoIterator<Item = Expr>>(items: I) -> Self {
        let items = items
            .into_iter()
            .flat_map(|it| match it {
                Expr::Sequence(inner) => inner,
                other => vec![other],
            })
            .collect_vec();
        match items.len() {
            0 => Expr::Empty,
            1 => items.into_iter().next().unwrap_or(Expr::Empty),
            _ => Expr::Sequence(items),
        }
    }

    /// Ordered choice, flattening nested choices.
    pub fn choice<I: IntoIterator<Item = Expr>>(alts: I) -> Self {
        let alts = alts
            .into_iter()
            .flat_map(|it| match it {
                Expr::Choice(inner) => inner,
                other => vec![other],
            })
            .collect_vec();
        if alts.len() == 1 {
            alts.into_iter().next().unwrap_or(Expr::Empty)
        } else {
            Expr::Choice(alts)
        }
    }

    pub fn star(self) -> Self {
        Expr::ZeroOrMore(Box::new(self))
    }

    pub fn plus(self) -> Self {
        Expr::OneOrMore(Box::new(self))
    }

    pub fn opt(self) -> Self {
        Expr::Optional(Box::new(self))
    }

    pub fn and(self) -> Self {
        Expr::And(Box::new(self))
    }

    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    pub fn capture(self) -> Self {
        Expr::Capture(Box::new(self))
    }

    /// `!.`, the usual way to insist on reaching the end.
    pub fn eof() -> Self {
        Expr::Dot.not()
    }

    /// Every rule this expression calls, in no particular order.
    pub fn references(&self) -> Vec<RuleId> {
        fn recur(expr: &Expr, out: &mut Vec<RuleId>) {
            match expr {
                Expr::Rule(id) => out.push(*id),
                Expr::Sequence(items) | Expr::Choice(items) => {
                    for it in items {
                        recur(it, out);
                    }
                }
                Expr::ZeroOrMore(inner)
                | Expr::OneOrMore(inner)
                | Expr::Optional(inner)
                | Expr::And(inner)
                | Expr::Not(inner)
                | Expr::Capture(inner) => recur(inner, out),
                Expr::Empty
                | Expr::Dot
                | Expr::Char(_)
                | Expr::Literal { .. }
                | Expr::Class { .. } => {}
            }
        }
        let mut out = Vec::new();
        recur(self, &mut out);
        out
    }
}

/// A named rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub expr: Expr,
    /// Silent rules match like any other but leave nothing in the log.
    pub recorded: bool,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    #[error("rule {0:?} is used but never defined")]
    Undefined(String),
    #[error("rule {0:?} is defined more than once")]
    Redefined(String),
    #[error("the grammar has no rules")]
    Empty,
    #[error("the start rule {0:?} is silent, so a parse would record no root")]
    SilentStart(String),
    #[error("a grammar can hold at most {} rules", u16::MAX - RuleId::FIRST.0)]
    TooManyRules,
}

/// A finished, checked rule table.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct Grammar {
    #[derivative(Debug = "ignore")]
    names: BiHashMap<String, RuleId>,
    /// Indexed by rule id; the reserved ids are `None`.
    rules: Vec<Option<Rule>>,
    start: RuleId,
    /// Ids in the order the rules were defined.
    order: Vec<RuleId>,
}

impl Grammar {
    pub fn start(&self) -> RuleId {
        self.start
    }

    /// The rule with this id. Ids come from this grammar, so a missing one is a bug.
    pub fn rule(&self, id: RuleId) -> &Rule {
        match self.rules.get(id.index()) {
            Some(Some(rule)) => rule,
            _ => panic!("rule {} is not in this grammar", id),
        }
    }

    pub fn get(&self, id: RuleId) -> Option<&Rule> {
        self.rules.get(id.index()).and_then(Option::as_ref)
    }

    pub fn find(&self, name: &str) -> Option<RuleId> {
        self.names.get_by_left(name).copied()
    }

    /// Display name for any id, including the reserved ones.
    pub fn name(&self, id: RuleId) -> &str {
        match id {
            RuleId::UNKNOWN => "Unknown",
            RuleId::TEXT => "Text",
            _ => self
                .names
                .get_by_right(&id)
                .map(String::as_str)
                .unwrap_or("?"),
        }
    }

    /// Rule ids in the order their names first came up.
    pub fn ids(&self) -> impl Iterator<Item = RuleId> + '_ {
        self.rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| rule.is_some())
            .map(|(idx, _)| RuleId(idx as u16))
    }

    /// Rule ids in the order the rules were defined, except that the start
    /// rule always comes first.
    pub fn definitions(&self) -> impl Iterator<Item = RuleId> + '_ {
        let start = self.start;
        std::iter::once(start).chain(self.order.iter().copied().filter(move |id| *id != start))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for id in self.definitions() {
            let rule = self.rule(id);
            let arrow = if rule.recorded { "<-" } else { "<~" };
            writeln!(f, "{} {} {}", rule.name, arrow, ExprFmt(&rule.expr, self))?;
        }
        Ok(())
    }
}

/// Writes an expression back out in PEG syntax.
struct ExprFmt<'a>(&'a Expr, &'a Grammar);

/// A character inside `[...]`, where `]`, `-` and `^` mean something.
struct ClassChar(char);

impl fmt::Display for ClassChar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            c @ (']' | '-' | '^') => write!(f, "\\{}", c),
            c => write!(f, "{}", c.escape_default()),
        }
    }
}

impl<'a> fmt::Display for ExprFmt<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ExprFmt(expr, grammar) = *self;
        let sub = |e: &'a Expr| ExprFmt(e, grammar);
        // operators take one operand each, so stacking them needs parentheses
        let grouped = |e: &Expr| {
            matches!(
                e,
                Expr::Sequence(_) | Expr::Choice(_) | Expr::And(_) | Expr::Not(_)
            )
        };
        let suffixed = |e: &Expr| {
            matches!(
                e,
                Expr::ZeroOrMore(_) | Expr::OneOrMore(_) | Expr::Optional(_)
            )
        };
        match expr {
            Expr::Empty => write!(f, "()"),
            Expr::Dot => write!(f, "."),
            Expr::Char(c) => write!(f, "'{}'", c.escape_default()),
            Expr::Literal { text, ignore_case } => {
                let quote = if *ignore_case { '"' } else { '\'' };
                write!(f, "{}{}{}", quote, text.escape_default(), quote)
            }
            Expr::Class { ranges, negated } => {
                write!(f, "[{}", if *negated { "^" } else { "" })?;
                for r in ranges {
                    if r.lo == r.hi {
                        write!(f, "{}", ClassChar(r.lo))?;
                    } else {
                        write!(f, "{}-{}", ClassChar(r.lo), ClassChar(r.hi))?;
                    }
                }
                write!(f, "]")
            }
            Expr::Rule(id) => write!(f, "{}", grammar.name(*id)),
            Expr::Sequence(items) => {
                let parts = items
                    .iter()
                    .map(|it| {
                        if matches!(it, Expr::Choice(_)) {
                            format!("({})", sub(it))
                        } else {
                            sub(it).to_string()
                        }
                    })
                    .join(" ");
                write!(f, "{}", parts)
            }
            Expr::Choice(alts) => write!(f, "{}", alts.iter().map(sub).join(" / ")),
            Expr::ZeroOrMore(inner) | Expr::OneOrMore(inner) | Expr::Optional(inner) => {
                let suffix = match expr {
                    Expr::ZeroOrMore(_) => '*',
                    Expr::OneOrMore(_) => '+',
                    _ => '?',
                };
                if grouped(inner) || suffixed(inner) {
                    write!(f, "({}){}", sub(inner), suffix)
                } else {
                    write!(f, "{}{}", sub(inner), suffix)
                }
            }
            Expr::And(inner) | Expr::Not(inner) => {
                let prefix = if matches!(expr, Expr::And(_)) { '&' } else { '!' };
                if grouped(inner) {
                    write!(f, "{}({})", prefix, sub(inner))
                } else {
                    write!(f, "{}{}", prefix, sub(inner))
                }
            }
            Expr::Capture(inner) => write!(f, "<{}>", sub(inner)),
        }
    }
}

/// Assembles a [`Grammar`].
///
/// Rules can be mentioned (with [`GrammarBuilder::rule`]) before they're defined,
/// which is how recursive grammars get written.
#[derive(Debug)]
pub struct GrammarBuilder {
    names: BiHashMap<String, RuleId>,
    rules: Vec<Option<Rule>>,
    start: Option<RuleId>,
    order: Vec<RuleId>,
    redefined: Vec<String>,
    overflowed: bool,
}

impl GrammarBuilder {
    pub fn new() -> Self {
        Self {
            names: BiHashMap::new(),
            rules: vec![None; RuleId::FIRST.index()],
            start: None,
            order: Vec::new(),
            redefined: Vec::new(),
            overflowed: false,
        }
    }

    /// Get the id for `name`, reserving a fresh one if it hasn't come up yet.
    pub fn rule(&mut self, name: &str) -> RuleId {
        if let Some(id) = self.names.get_by_left(name) {
            return *id;
        }
        let id = match u16::try_from(self.rules.len()) {
            Ok(n) if n < u16::MAX => RuleId(n),
            _ => {
                // keep handing something out; build() reports it
                self.overflowed = true;
                RuleId::UNKNOWN
            }
        };
        if id != RuleId::UNKNOWN {
            self.names.insert(name.to_owned(), id);
            self.rules.push(None);
        }
        id
    }

    /// Shorthand for `Expr::Rule(self.rule(name))`.
    pub fn call(&mut self, name: &str) -> Expr {
        Expr::Rule(self.rule(name))
    }

    /// Define a rule whose matches get recorded.
    pub fn define(&mut self, name: &str, expr: Expr) -> RuleId {
        self.insert(name, expr, true)
    }

    /// Define a rule that matches without recording anything.
    pub fn define_silent(&mut self, name: &str, expr: Expr) -> RuleId {
        self.insert(name, expr, false)
    }

    fn insert(&mut self, name: &str, expr: Expr, recorded: bool) -> RuleId {
        let id = self.rule(name);
        if let Some(slot) = self.rules.get_mut(id.index()).filter(|_| !id.is_reserved()) {
            if slot.is_some() {
                self.redefined.push(name.to_owned());
            } else {
                self.order.push(id);
            }
            *slot = Some(Rule {
                name: name.to_owned(),
                expr,
                recorded,
            });
            if self.start.is_none() {
                self.start = Some(id);
            }
        }
        id
    }

    /// Start somewhere other than the first defined rule.
    pub fn start(&mut self, name: &str) -> &mut Self {
        self.start = Some(self.rule(name));
        self
    }

    pub fn build(self) -> Result<Grammar, GrammarError> {
        let GrammarBuilder {
            names,
            rules,
            start,
            order,
            redefined,
            overflowed,
        } = self;
        if overflowed {
            return Err(GrammarError::TooManyRules);
        }
        if let Some(name) = redefined.into_iter().next() {
            return Err(GrammarError::Redefined(name));
        }
        let start = start.ok_or(GrammarError::Empty)?;

        let name_of = |id: RuleId| {
            names
                .get_by_right(&id)
                .cloned()
                .unwrap_or_else(|| id.to_string())
        };
        let defined = |id: RuleId| matches!(rules.get(id.index()), Some(Some(_)));

        // undefined names, in the order they were first mentioned
        if let Some(missing) = (RuleId::FIRST.0..rules.len() as u16)
            .map(RuleId)
            .find(|id| !defined(*id))
        {
            return Err(GrammarError::Undefined(name_of(missing)));
        }
        // ids that never went through the builder at all
        for rule in rules.iter().flatten() {
            if let Some(bad) = rule.expr.references().into_iter().find(|id| !defined(*id)) {
                return Err(GrammarError::Undefined(name_of(bad)));
            }
        }
        if !rules[start.index()].as_ref().map_or(false, |r| r.recorded) {
            return Err(GrammarError::SilentStart(name_of(start)));
        }

        Ok(Grammar {
            names,
            rules,
            start,
            order,
        })
    }
}

#[test]
fn forward_references() {
    let mut g = GrammarBuilder::new();
    let list = g.call("Item");
    g.define("List", Expr::seq(vec![list, Expr::lit(",")]).plus());
    g.define("Item", Expr::range('a', 'z'));
    let grammar = g.build().unwrap();

    // ids follow first mention, the start rule follows first definition
    assert_eq!(grammar.find("Item"), Some(RuleId(2)));
    assert_eq!(grammar.start(), RuleId(3));
    assert_eq!(grammar.name(RuleId(2)), "Item");
    assert_eq!(grammar.name(RuleId::TEXT), "Text");
    assert_eq!(grammar.len(), 2);
    assert_eq!(grammar.ids().collect_vec(), vec![RuleId(2), RuleId(3)]);
    assert_eq!(grammar.definitions().collect_vec(), vec![RuleId(3), RuleId(2)]);
}

#[test]
fn undefined_rules_are_caught() {
    let mut g = GrammarBuilder::new();
    let missing = g.call("Missing");
    g.define("S", missing);
    assert_eq!(
        g.build().unwrap_err(),
        GrammarError::Undefined("Missing".to_owned())
    );
}

#[test]
fn bad_builds() {
    assert_eq!(GrammarBuilder::new().build().unwrap_err(), GrammarError::Empty);

    let mut g = GrammarBuilder::new();
    g.define("S", Expr::Dot);
    g.define("S", Expr::Empty);
    assert_eq!(g.build().unwrap_err(), GrammarError::Redefined("S".to_owned()));

    let mut g = GrammarBuilder::new();
    g.define_silent("Ws", Expr::set(" \t").star());
    assert_eq!(g.build().unwrap_err(), GrammarError::SilentStart("Ws".to_owned()));
}

#[test]
fn flattening() {
    let e = Expr::seq(vec![
        Expr::Char('a'),
        Expr::seq(vec![Expr::Char('b'), Expr::Char('c')]),
    ]);
    assert_eq!(
        e,
        Expr::Sequence(vec![Expr::Char('a'), Expr::Char('b'), Expr::Char('c')])
    );
    assert_eq!(Expr::seq(vec![]), Expr::Empty);
    assert_eq!(Expr::choice(vec![Expr::Dot]), Expr::Dot);
}

#[test]
fn writes_peg_syntax() {
    let mut g = GrammarBuilder::new();
    let word = g.call("Word");
    let ws = g.call("Ws");
    g.define(
        "Words",
        Expr::seq(vec![word.clone(), Expr::seq(vec![ws, word]).star(), Expr::eof()]),
    );
    g.define("Word", Expr::range('a', 'z').plus().capture());
    g.define_silent("Ws", Expr::choice(vec![Expr::Char(' '), Expr::lit_nocase("tab")]));
    let grammar = g.build().unwrap();

    assert_eq!(
        grammar.to_string(),
        "Words <- Word (Ws Word)* !.\nWord <- <[a-z]+>\nWs <~ ' ' / \"tab\"\n"
    );
}
