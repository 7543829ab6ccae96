//! # The match engine
//!
//! Recursive descent over a [`Grammar`], with every bit of mutable parse
//! state packed into one small [`Cursor`]. Backtracking is nothing more than
//! copying the cursor before trying something and copying it back if that
//! something didn't work out.
//!
//! Recorded rules bump the nesting depth while their body runs and, if the
//! body matches, write a span at the cursor's write index. Spans written by
//! attempts that later fail aren't erased; the write index just goes back and
//! the next success writes over them.

mod execute;

use std::rc::Rc;

use thiserror::Error;

use crate::{error::ParseError, log::SpanLog, tree::SyntaxTree, Grammar, RuleId};

/// Terminates every input buffer. Never part of legal input, and no terminal matches it.
pub const END_OF_INPUT: char = '\u{4}';

/// Everything backtracking has to save and restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Cursor {
    /// Offset of the next unread character.
    pub position: usize,
    /// Number of recorded rules currently open.
    pub depth: usize,
    /// Where the next span goes in the log.
    pub write_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserConfig {
    /// Slots the span log starts out with. It grows on demand, so this is
    /// only about how soon the first reallocation happens.
    pub initial_capacity: usize,
    /// What error reports call the input.
    pub source_name: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            initial_capacity: i16::MAX as usize,
            source_name: "input".to_owned(),
        }
    }
}

impl ParserConfig {
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    pub fn source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = name.into();
        self
    }
}

/// Input the engine refuses to run on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("the input is {0} characters long, more than a span log can address")]
    TooLong(usize),
    #[error("the end-of-input marker U+0004 shows up at offset {0}")]
    EmbeddedEnd(usize),
}

/// Runs a [`Grammar`] over one input.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Parser<'g> {
    grammar: &'g Grammar,
    /// The input plus [`END_OF_INPUT`].
    #[derivative(Debug = "ignore")]
    buffer: Rc<[char]>,
    cursor: Cursor,
    /// Furthest offset any terminal has matched up to.
    furthest: usize,
    #[derivative(Debug = "ignore")]
    log: SpanLog,
    config: ParserConfig,
}

impl<'g> Parser<'g> {
    pub fn new(grammar: &'g Grammar, input: &str) -> Result<Self, InputError> {
        Self::with_config(grammar, input, ParserConfig::default())
    }

    pub fn with_config(
        grammar: &'g Grammar,
        input: &str,
        config: ParserConfig,
    ) -> Result<Self, InputError> {
        let mut buffer: Vec<char> = input.chars().collect();
        if buffer.last() != Some(&END_OF_INPUT) {
            buffer.push(END_OF_INPUT);
        }
        let len = buffer.len() - 1;
        if let Some(idx) = buffer[..len].iter().position(|c| *c == END_OF_INPUT) {
            return Err(InputError::EmbeddedEnd(idx));
        }
        if len > u32::MAX as usize {
            return Err(InputError::TooLong(len));
        }

        Ok(Self {
            grammar,
            buffer: buffer.into(),
            cursor: Cursor::default(),
            furthest: 0,
            log: SpanLog::new(config.initial_capacity),
            config,
        })
    }

    pub fn grammar(&self) -> &'g Grammar {
        self.grammar
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// The working log, as the last parse left it. Parses reuse its storage.
    pub fn log(&self) -> &SpanLog {
        &self.log
    }

    /// Number of input characters, not counting the end marker.
    pub fn input_len(&self) -> usize {
        self.buffer.len() - 1
    }

    /// Rewind to the start of the input and forget everything recorded.
    pub fn reset(&mut self) {
        self.cursor = Cursor::default();
        self.furthest = 0;
        self.log.clear();
    }

    /// Parse from the grammar's start rule.
    pub fn parse(&mut self) -> Result<SyntaxTree<'g>, ParseError> {
        self.parse_rule(self.grammar.start())
    }

    /// Parse from `start`.
    ///
    /// Succeeds if `start` matches a prefix of the input; grammars that want
    /// the whole thing say so with `!.`.
    pub fn parse_rule(&mut self, start: RuleId) -> Result<SyntaxTree<'g>, ParseError> {
        self.reset();

        let matched = self.call(start);
        let written = self.cursor.write_index;

        if matched {
            let log = self.log.prefix(written);
            tracing::debug!(
                rule = self.grammar.name(start),
                spans = written,
                consumed = self.cursor.position,
                wide = log.is_wide(),
                "parse succeeded"
            );
            Ok(SyntaxTree::new(self.grammar, self.buffer.clone(), log))
        } else {
            tracing::debug!(
                rule = self.grammar.name(start),
                furthest = self.furthest,
                "parse failed"
            );
            let input = &self.buffer[..self.input_len()];
            Err(ParseError::new(
                self.grammar,
                input,
                self.log.clone(),
                self.furthest,
                &self.config.source_name,
            ))
        }
    }
}

#[cfg(test)]
fn letters() -> Grammar {
    use crate::{Expr, GrammarBuilder};

    let mut g = GrammarBuilder::new();
    let letter = g.call("Letter");
    g.define("Word", Expr::seq(vec![letter.plus(), Expr::eof()]));
    g.define("Letter", Expr::range('a', 'z'));
    g.build().unwrap()
}

#[test]
fn input_is_checked() {
    let grammar = letters();
    assert!(Parser::new(&grammar, "abc\u{4}").is_ok());
    assert_eq!(
        Parser::new(&grammar, "ab\u{4}c").unwrap_err(),
        InputError::EmbeddedEnd(2)
    );
}

#[test]
fn parse_trims_and_resets() {
    let grammar = letters();
    let mut parser = Parser::new(&grammar, "abc").unwrap();

    let tree = parser.parse().unwrap();
    assert_eq!(tree.log().capacity(), 4);
    assert_eq!(tree.events().count(), 4);

    // same again, on the same storage
    let again = parser.parse().unwrap();
    assert_eq!(tree.log(), again.log());
    assert_eq!(parser.log().capacity(), i16::MAX as usize);
    assert_eq!(parser.log().recorded(), 4);

    parser.reset();
    assert_eq!(parser.cursor(), Cursor::default());
    assert_eq!(parser.log().recorded(), 0);
    assert_eq!(parser.log().capacity(), i16::MAX as usize);
}

#[test]
fn grown_storage_is_kept_between_parses() {
    let grammar = letters();
    let config = ParserConfig::default().initial_capacity(1);
    let mut parser = Parser::with_config(&grammar, "abcdef", config).unwrap();

    parser.parse().unwrap();
    let grown = parser.log().capacity();
    assert!(grown >= 7);
    assert!(parser.log().is_wide());

    let again = parser.parse().unwrap();
    assert_eq!(parser.log().capacity(), grown);
    assert_eq!(again.log().capacity(), 7);
}

#[test]
fn failure_rewinds_the_cursor() {
    let grammar = letters();
    let mut parser = Parser::new(&grammar, "ab1").unwrap();
    let err = parser.parse().unwrap_err();
    assert_eq!(parser.cursor(), Cursor::default());
    assert_eq!(err.furthest(), 2);
}
