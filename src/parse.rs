//! Reading grammars written as PEG text.
//!
//! The description language is itself parsed with a [`Grammar`], built by
//! [`Grammar::peg_syntax`]. Its rules drop zero-width `Mark*` spans wherever
//! some piece of the description is complete, and capture identifiers and
//! literal bodies as text. Replaying the finished log through a small stack
//! machine then rebuilds the described grammar.

use std::convert::TryFrom;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

use crate::{
    ClassRange, Expr, Grammar, GrammarBuilder, GrammarError, InputError, ParseError, Parser,
    ParserConfig, RuleId, SyntaxTree,
};

/// Why a grammar description couldn't be loaded.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("the grammar description doesn't parse: {0}")]
    Syntax(#[from] ParseError),
    #[error(transparent)]
    Grammar(#[from] GrammarError),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("bad escape sequence in {0:?}")]
    Escape(String),
    /// The description parsed but the log didn't replay into a grammar.
    #[error("internal error while reading the description: {0}")]
    Malformed(&'static str),
}

/// Rule ids of the description grammar.
///
/// Declared in this order, so each variant's value is the id it gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
enum Meta {
    // === Structure ===
    Description = 2,
    Definition,
    Arrow,
    Expression,
    Sequence,
    Prefix,
    Suffix,
    Primary,

    // === Lexical ===
    Identifier,
    IdentStart,
    IdentCont,
    Literal,
    Class,
    Range,
    Char,
    Slash,
    And,
    Not,
    Question,
    Star,
    Plus,
    Open,
    Close,
    OpenAngle,
    CloseAngle,
    Dot,
    Spacing,
    Comment,
    Space,
    EndOfLine,
    EndOfFile,

    // === Markers ===
    /// Opens a group of sequence items or alternatives.
    MarkBegin,
    MarkRecorded,
    MarkSilent,
    MarkDefinition,
    MarkChoice,
    MarkSequence,
    MarkAnd,
    MarkNot,
    MarkOptional,
    MarkStar,
    MarkPlus,
    MarkReference,
    MarkCapture,
    MarkLiteral,
    MarkLiteralNoCase,
    MarkClass,
    MarkDot,
}

impl Meta {
    fn expr(self) -> Expr {
        Expr::Rule(RuleId(self.into()))
    }

    fn name(self) -> String {
        format!("{:?}", self)
    }
}

impl Grammar {
    /// The grammar of grammar descriptions.
    pub fn peg_syntax() -> Result<Grammar, GrammarError> {
        use Meta::*;

        let mut g = GrammarBuilder::new();
        let mut next = u16::from(Description);
        while let Ok(meta) = Meta::try_from(next) {
            g.rule(&meta.name());
            next += 1;
        }

        let def = |g: &mut GrammarBuilder, meta: Meta, expr: Expr| {
            g.define(&meta.name(), expr);
        };
        let silent = |g: &mut GrammarBuilder, meta: Meta, expr: Expr| {
            g.define_silent(&meta.name(), expr);
        };
        let token = |g: &mut GrammarBuilder, meta: Meta, c: char| {
            g.define(&meta.name(), Expr::seq(vec![Expr::Char(c), Spacing.expr()]));
        };

        def(
            &mut g,
            Description,
            Expr::seq(vec![
                Spacing.expr(),
                Definition.expr().plus(),
                EndOfFile.expr(),
            ]),
        );
        def(
            &mut g,
            Definition,
            Expr::seq(vec![
                Identifier.expr(),
                Arrow.expr(),
                Expression.expr(),
                MarkDefinition.expr(),
            ]),
        );
        def(
            &mut g,
            Arrow,
            Expr::seq(vec![
                Expr::choice(vec![
                    Expr::seq(vec![Expr::lit("<-"), MarkRecorded.expr()]),
                    Expr::seq(vec![Expr::lit("<~"), MarkSilent.expr()]),
                ]),
                Spacing.expr(),
            ]),
        );
        def(
            &mut g,
            Expression,
            Expr::seq(vec![
                MarkBegin.expr(),
                Sequence.expr(),
                Expr::seq(vec![Slash.expr(), Sequence.expr()]).star(),
                MarkChoice.expr(),
            ]),
        );
        def(
            &mut g,
            Sequence,
            Expr::seq(vec![
                MarkBegin.expr(),
                Prefix.expr().star(),
                MarkSequence.expr(),
            ]),
        );
        def(
            &mut g,
            Prefix,
            Expr::choice(vec![
                Expr::seq(vec![And.expr(), Suffix.expr(), MarkAnd.expr()]),
                Expr::seq(vec![Not.expr(), Suffix.expr(), MarkNot.expr()]),
                Suffix.expr(),
            ]),
        );
        def(
            &mut g,
            Suffix,
            Expr::seq(vec![
                Primary.expr(),
                Expr::choice(vec![
                    Expr::seq(vec![Question.expr(), MarkOptional.expr()]),
                    Expr::seq(vec![Star.expr(), MarkStar.expr()]),
                    Expr::seq(vec![Plus.expr(), MarkPlus.expr()]),
                ])
                .opt(),
            ]),
        );
        def(
            &mut g,
            Primary,
            Expr::choice(vec![
                Expr::seq(vec![
                    Identifier.expr(),
                    Arrow.expr().not(),
                    MarkReference.expr(),
                ]),
                Expr::seq(vec![Open.expr(), Expression.expr(), Close.expr()]),
                Expr::seq(vec![
                    OpenAngle.expr(),
                    Expression.expr(),
                    CloseAngle.expr(),
                    MarkCapture.expr(),
                ]),
                Literal.expr(),
                Class.expr(),
                Expr::seq(vec![Dot.expr(), MarkDot.expr()]),
            ]),
        );

        def(
            &mut g,
            Identifier,
            Expr::seq(vec![
                Expr::seq(vec![IdentStart.expr(), IdentCont.expr().star()]).capture(),
                Spacing.expr(),
            ]),
        );
        silent(
            &mut g,
            IdentStart,
            Expr::Class {
                ranges: vec![
                    ClassRange::new('a', 'z'),
                    ClassRange::new('A', 'Z'),
                    ClassRange::single('_'),
                ],
                negated: false,
            },
        );
        silent(
            &mut g,
            IdentCont,
            Expr::choice(vec![IdentStart.expr(), Expr::range('0', '9')]),
        );
        let quoted = |quote: char, mark: Meta| {
            Expr::seq(vec![
                Expr::Char(quote),
                Expr::seq(vec![Expr::Char(quote).not(), Char.expr()])
                    .star()
                    .capture(),
                Expr::Char(quote),
                mark.expr(),
                Spacing.expr(),
            ])
        };
        def(
            &mut g,
            Literal,
            Expr::choice(vec![
                quoted('\'', MarkLiteral),
                quoted('"', MarkLiteralNoCase),
            ]),
        );
        def(
            &mut g,
            Class,
            Expr::seq(vec![
                Expr::Char('['),
                Expr::seq(vec![Expr::Char(']').not(), Range.expr()])
                    .star()
                    .capture(),
                Expr::Char(']'),
                MarkClass.expr(),
                Spacing.expr(),
            ]),
        );
        silent(
            &mut g,
            Range,
            Expr::choice(vec![
                Expr::seq(vec![
                    Char.expr(),
                    Expr::Char('-'),
                    Expr::Char(']').not(),
                    Char.expr(),
                ]),
                Char.expr(),
            ]),
        );
        let backslash = Expr::Char('\\');
        let hex = Expr::Class {
            ranges: vec![
                ClassRange::new('0', '9'),
                ClassRange::new('a', 'f'),
                ClassRange::new('A', 'F'),
            ],
            negated: false,
        };
        silent(
            &mut g,
            Char,
            Expr::choice(vec![
                Expr::seq(vec![backslash.clone(), Expr::set("abefnrtv'\"[]\\-^")]),
                Expr::seq(vec![
                    backslash.clone(),
                    Expr::lit("u{"),
                    hex.plus(),
                    Expr::Char('}'),
                ]),
                Expr::seq(vec![
                    backslash.clone(),
                    Expr::range('0', '3'),
                    Expr::range('0', '7'),
                    Expr::range('0', '7'),
                ]),
                Expr::seq(vec![
                    backslash.clone(),
                    Expr::range('0', '7'),
                    Expr::range('0', '7').opt(),
                ]),
                Expr::seq(vec![backslash.not(), Expr::Dot]),
            ]),
        );

        token(&mut g, Slash, '/');
        token(&mut g, And, '&');
        token(&mut g, Not, '!');
        token(&mut g, Question, '?');
        token(&mut g, Star, '*');
        token(&mut g, Plus, '+');
        token(&mut g, Open, '(');
        token(&mut g, Close, ')');
        token(&mut g, OpenAngle, '<');
        token(&mut g, CloseAngle, '>');
        token(&mut g, Dot, '.');

        silent(
            &mut g,
            Spacing,
            Expr::choice(vec![Space.expr(), Comment.expr()]).star(),
        );
        silent(
            &mut g,
            Comment,
            Expr::seq(vec![
                Expr::Char('#'),
                Expr::seq(vec![EndOfLine.expr().not(), Expr::Dot]).star(),
                Expr::choice(vec![EndOfLine.expr(), Expr::eof()]),
            ]),
        );
        silent(
            &mut g,
            Space,
            Expr::choice(vec![Expr::set(" \t"), EndOfLine.expr()]),
        );
        silent(
            &mut g,
            EndOfLine,
            Expr::choice(vec![Expr::lit("\r\n"), Expr::Char('\n'), Expr::Char('\r')]),
        );
        silent(&mut g, EndOfFile, Expr::eof());

        for meta in (u16::from(MarkBegin)..next).filter_map(|n| Meta::try_from(n).ok()) {
            def(&mut g, meta, Expr::Empty);
        }

        g.build()
    }

    /// Read a grammar written in PEG notation.
    ///
    /// ```text
    /// # comments run to the end of the line
    /// Sum    <- Number (Plus Number)* !.
    /// Number <- <[0-9]+> Ws
    /// Plus   <- '+' Ws
    /// Ws     <~ [ \t]*
    /// ```
    ///
    /// The first rule is the start rule; `<~` defines a silent one.
    pub fn from_peg(text: &str) -> Result<Grammar, LoadError> {
        Self::from_peg_named(text, "grammar")
    }

    /// Like [`Grammar::from_peg`], calling the text `source` in error reports.
    pub fn from_peg_named(text: &str, source: &str) -> Result<Grammar, LoadError> {
        let meta = Grammar::peg_syntax()?;
        let config = ParserConfig::default().source_name(source);
        let mut parser = Parser::with_config(&meta, text, config)?;
        let tree = parser.parse()?;

        let mut replay = Replay::new();
        for span in tree.events() {
            replay.step(&tree, span)?;
        }
        Ok(replay.finish()?.build()?)
    }
}

enum Item {
    Begin,
    Text(String),
    Arrow { recorded: bool },
    Expr(Expr),
}

struct Replay {
    stack: Vec<Item>,
    builder: GrammarBuilder,
}

impl Replay {
    fn new() -> Self {
        Self {
            stack: Vec::new(),
            builder: GrammarBuilder::new(),
        }
    }

    fn step(&mut self, tree: &SyntaxTree<'_>, span: crate::Span) -> Result<(), LoadError> {
        if span.rule == RuleId::TEXT {
            self.stack.push(Item::Text(tree.text(&span)));
            return Ok(());
        }
        let meta = match Meta::try_from(span.rule.0) {
            Ok(it) => it,
            Err(_) => return Err(LoadError::Malformed("span from an unknown rule")),
        };

        let item = match meta {
            Meta::MarkBegin => Item::Begin,
            Meta::MarkRecorded => Item::Arrow { recorded: true },
            Meta::MarkSilent => Item::Arrow { recorded: false },
            Meta::MarkDefinition => {
                let expr = self.expr()?;
                let recorded = match self.stack.pop() {
                    Some(Item::Arrow { recorded }) => recorded,
                    _ => return Err(LoadError::Malformed("definition without an arrow")),
                };
                let name = self.text()?;
                if recorded {
                    self.builder.define(&name, expr);
                } else {
                    self.builder.define_silent(&name, expr);
                }
                return Ok(());
            }
            Meta::MarkChoice => Item::Expr(Expr::choice(self.group()?)),
            Meta::MarkSequence => Item::Expr(Expr::seq(self.group()?)),
            Meta::MarkAnd => Item::Expr(self.expr()?.and()),
            Meta::MarkNot => Item::Expr(self.expr()?.not()),
            Meta::MarkOptional => Item::Expr(self.expr()?.opt()),
            Meta::MarkStar => Item::Expr(self.expr()?.star()),
            Meta::MarkPlus => Item::Expr(self.expr()?.plus()),
            Meta::MarkCapture => Item::Expr(self.expr()?.capture()),
            Meta::MarkReference => {
                let name = self.text()?;
                Item::Expr(self.builder.call(&name))
            }
            Meta::MarkLiteral => Item::Expr(literal(&self.text()?, false)?),
            Meta::MarkLiteralNoCase => Item::Expr(literal(&self.text()?, true)?),
            Meta::MarkClass => Item::Expr(class(&self.text()?)?),
            Meta::MarkDot => Item::Expr(Expr::Dot),
            // structure, only interesting when something goes wrong
            _ => return Ok(()),
        };
        self.stack.push(item);
        Ok(())
    }

    fn expr(&mut self) -> Result<Expr, LoadError> {
        match self.stack.pop() {
            Some(Item::Expr(it)) => Ok(it),
            _ => Err(LoadError::Malformed("expected an expression")),
        }
    }

    fn text(&mut self) -> Result<String, LoadError> {
        match self.stack.pop() {
            Some(Item::Text(it)) => Ok(it),
            _ => Err(LoadError::Malformed("expected captured text")),
        }
    }

    /// Everything pushed since the last [`Item::Begin`], in order.
    fn group(&mut self) -> Result<Vec<Expr>, LoadError> {
        let mut items = Vec::new();
        loop {
            match self.stack.pop() {
                Some(Item::Expr(it)) => items.push(it),
                Some(Item::Begin) => break,
                _ => return Err(LoadError::Malformed("unbalanced group")),
            }
        }
        items.reverse();
        Ok(items)
    }

    fn finish(self) -> Result<GrammarBuilder, LoadError> {
        if !self.stack.is_empty() {
            return Err(LoadError::Malformed("leftovers after the last definition"));
        }
        Ok(self.builder)
    }
}

/// Resolve escapes. The flag says whether the character was escaped.
fn unescape(raw: &str) -> Result<Vec<(char, bool)>, LoadError> {
    let bad = || LoadError::Escape(raw.to_owned());
    let mut out = Vec::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push((c, false));
            continue;
        }
        let c = match chars.next().ok_or_else(bad)? {
            'a' => '\x07',
            'b' => '\x08',
            'e' => '\x1b',
            'f' => '\x0c',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'v' => '\x0b',
            c @ ('\'' | '"' | '[' | ']' | '\\' | '-' | '^') => c,
            'u' => {
                if chars.next() != Some('{') {
                    return Err(bad());
                }
                let mut digits = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(d) if d.is_ascii_hexdigit() => digits.push(d),
                        _ => return Err(bad()),
                    }
                }
                u32::from_str_radix(&digits, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(bad)?
            }
            first @ '0'..='7' => {
                let most = if first <= '3' { 3 } else { 2 };
                let mut code = first.to_digit(8).unwrap_or_default();
                for _ in 1..most {
                    match chars.peek().and_then(|d| d.to_digit(8)) {
                        Some(d) => {
                            code = code * 8 + d;
                            chars.next();
                        }
                        None => break,
                    }
                }
                char::from_u32(code).ok_or_else(bad)?
            }
            _ => return Err(bad()),
        };
        out.push((c, true));
    }
    Ok(out)
}

fn literal(raw: &str, ignore_case: bool) -> Result<Expr, LoadError> {
    let text = unescape(raw)?.into_iter().map(|(c, _)| c).collect::<String>();
    let mut chars = text.chars();
    Ok(match (chars.next(), chars.next(), ignore_case) {
        (Some(c), None, false) => Expr::Char(c),
        _ if ignore_case => Expr::lit_nocase(text),
        _ => Expr::lit(text),
    })
}

/// The inside of `[...]`. A leading unescaped `^` negates it.
fn class(raw: &str) -> Result<Expr, LoadError> {
    let (negated, body) = match raw.strip_prefix('^') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let chars = unescape(body)?;

    let mut ranges = Vec::new();
    let mut idx = 0;
    while idx < chars.len() {
        let lo = chars[idx].0;
        if idx + 2 < chars.len() && chars[idx + 1] == ('-', false) {
            ranges.push(ClassRange::new(lo, chars[idx + 2].0));
            idx += 3;
        } else {
            ranges.push(ClassRange::single(lo));
            idx += 1;
        }
    }
    Ok(Expr::Class { ranges, negated })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_ids_line_up() {
        let meta = Grammar::peg_syntax().unwrap();
        assert_eq!(meta.start(), RuleId(Meta::Description.into()));
        assert_eq!(meta.find("MarkDot"), Some(RuleId(Meta::MarkDot.into())));
        assert_eq!(meta.find("Spacing"), Some(RuleId(Meta::Spacing.into())));
        assert!(!meta.rule(RuleId(Meta::Spacing.into())).recorded);
    }

    #[test]
    fn escapes() {
        let plain = |s: &str| {
            unescape(s)
                .unwrap()
                .into_iter()
                .map(|(c, _)| c)
                .collect::<String>()
        };
        assert_eq!(plain(r"a\tb"), "a\tb");
        assert_eq!(plain(r"\'\\\]"), "'\\]");
        assert_eq!(plain(r"\101\60\477"), "A0'7");
        assert_eq!(plain(r"\u{e9}\u{1F600}"), "é😀");
        assert!(matches!(unescape(r"\q"), Err(LoadError::Escape(_))));
        assert!(matches!(unescape(r"\u{110000}"), Err(LoadError::Escape(_))));
    }

    #[test]
    fn classes() {
        assert_eq!(
            class(r"^a-z_\-").unwrap(),
            Expr::Class {
                ranges: vec![
                    ClassRange::new('a', 'z'),
                    ClassRange::single('_'),
                    ClassRange::single('-'),
                ],
                negated: true,
            }
        );
        // a trailing dash is just a dash
        assert_eq!(
            class("a-").unwrap(),
            Expr::Class {
                ranges: vec![ClassRange::single('a'), ClassRange::single('-')],
                negated: false,
            }
        );
        assert_eq!(literal("x", false).unwrap(), Expr::Char('x'));
        assert_eq!(literal("x", true).unwrap(), Expr::lit_nocase("x"));
    }

    #[test]
    fn reads_a_grammar() {
        let grammar = Grammar::from_peg(
            "# sums\n\
             Sum    <- Number (Plus Number)* !.\n\
             Number <- <[0-9]+> Ws\n\
             Plus   <- '+' Ws   # the only operator\n\
             Ws     <~ [ \\t]*\n",
        )
        .unwrap();

        assert_eq!(grammar.name(grammar.start()), "Sum");
        assert_eq!(grammar.len(), 4);
        let ws = grammar.find("Ws").unwrap();
        assert!(!grammar.rule(ws).recorded);
        assert_eq!(
            grammar.to_string(),
            "Sum <- Number (Plus Number)* !.\n\
             Number <- <[0-9]+> Ws\n\
             Plus <- '+' Ws\n\
             Ws <~ [ \\t]*\n"
        );

        let mut parser = Parser::new(&grammar, "1 + 22+3").unwrap();
        let tree = parser.parse().unwrap();
        let numbers = tree
            .events()
            .filter(|s| s.rule == RuleId::TEXT)
            .map(|s| tree.text(&s))
            .collect::<Vec<_>>();
        assert_eq!(numbers, vec!["1", "22", "3"]);
    }

    #[test]
    fn operators_and_groups() {
        let grammar = Grammar::from_peg("S <- &'a' !(B / 'c') .? \"Hi\"+\nB <- ()\n").unwrap();
        let b = grammar.find("B").unwrap();
        assert_eq!(
            grammar.rule(grammar.start()).expr,
            Expr::seq(vec![
                Expr::Char('a').and(),
                Expr::choice(vec![Expr::Rule(b), Expr::Char('c')]).not(),
                Expr::Dot.opt(),
                Expr::lit_nocase("Hi").plus(),
            ])
        );
        assert_eq!(grammar.rule(b).expr, Expr::Empty);
    }

    #[test]
    fn printing_reads_back() {
        let meta = Grammar::peg_syntax().unwrap();
        let text = meta.to_string();
        let again = Grammar::from_peg(&text).unwrap();
        assert_eq!(again.to_string(), text);

        let stacked = Grammar::from_peg("S <- (!'x')* ('y'?)+ [\\]\\-\\^] '\\u{e9}'").unwrap();
        assert_eq!(
            Grammar::from_peg(&stacked.to_string()).unwrap().to_string(),
            stacked.to_string()
        );
    }

    #[test]
    fn errors() {
        let err = Grammar::from_peg("S <- 'a' )\n").unwrap_err();
        match err {
            LoadError::Syntax(err) => assert_eq!(err.position().column, 10),
            other => panic!("expected a syntax error, got {:?}", other),
        }
        assert!(matches!(
            Grammar::from_peg("S <- T\n"),
            Err(LoadError::Grammar(GrammarError::Undefined(name))) if name == "T"
        ));
        assert!(matches!(
            Grammar::from_peg("S <~ 'a'\n"),
            Err(LoadError::Grammar(GrammarError::SilentStart(_)))
        ));
        assert!(matches!(
            Grammar::from_peg("  # nothing\n"),
            Err(LoadError::Syntax(_))
        ));
    }
}
