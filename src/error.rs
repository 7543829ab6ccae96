use std::{
    fmt::{self, Debug},
    ops::Range,
};

use ariadne::{CharSet, Color, Label, Report, ReportKind};
use itertools::Itertools;
use thiserror::Error;

use crate::{log::SpanLog, position::translate, tree::Ordered, Grammar, Position, RuleId};

/// The last match some rule managed before the parse fell over.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Diagnostic {
    pub rule: RuleId,
    pub name: String,
    /// Character offsets.
    pub range: Range<usize>,
    pub begin: Position,
    pub end: Position,
    pub text: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {} - {}: {:?}", self.name, self.begin, self.end, self.text)
    }
}

/// The start rule didn't match.
#[derive(Error)]
#[error("no parse, gave up at {at}{}", blocks(.diagnostics))]
pub struct ParseError {
    diagnostics: Vec<Diagnostic>,
    furthest: usize,
    at: Position,
    log: SpanLog,
    report: Report<(String, Range<usize>)>,
}

fn blocks(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| format!("\n  {}", d))
        .join("")
}

impl ParseError {
    /// Work out what went wrong from what's left in `log`.
    ///
    /// `input` is the input without its end marker, and `source` is the name
    /// the report will refer to it by.
    pub(crate) fn new(
        grammar: &Grammar,
        input: &[char],
        log: SpanLog,
        furthest: usize,
        source: &str,
    ) -> ParseError {
        let path = Ordered::new(&log).last_attempts();
        let offsets = path
            .iter()
            .flat_map(|e| [e.span.begin, e.span.end])
            .chain(std::iter::once(furthest))
            .collect::<Vec<_>>();
        let positions = translate(input, &offsets);
        let position = |offset: usize| positions.get(&offset).copied().unwrap_or_default();

        let diagnostics = path
            .iter()
            .map(|e| {
                let span = e.span;
                Diagnostic {
                    rule: span.rule,
                    name: grammar.name(span.rule).to_owned(),
                    range: span.range(),
                    begin: position(span.begin),
                    end: position(span.end),
                    text: input
                        .get(span.range())
                        .map(|chars| chars.iter().collect())
                        .unwrap_or_default(),
                }
            })
            .collect::<Vec<_>>();
        let at = position(furthest);

        let mut message = format!("no parse, gave up at {}", at);
        if input.is_empty() {
            // no line for labels to point into, so say it up top
            message.push_str(&format!(" ({} is empty)", source));
        }
        let mut report = Report::build(ReportKind::Error, source.to_owned(), furthest.min(input.len()))
            .with_config(ariadne::Config::default().with_char_set(CharSet::Ascii))
            .with_message(message);
        if !input.is_empty() {
            let clamp = |range: Range<usize>| range.start.min(input.len())..range.end.min(input.len());
            report = report.with_label(
                Label::new((source.to_owned(), clamp(furthest..furthest + 1)))
                    .with_message("couldn't get any further than this")
                    .with_color(Color::Red),
            );
            for d in &diagnostics {
                report = report.with_label(
                    Label::new((source.to_owned(), clamp(d.range.clone())))
                        .with_message(format!("last {} matched here", d.name)),
                );
            }
        }

        ParseError {
            diagnostics,
            furthest,
            at,
            log,
            report: report.finish(),
        }
    }

    /// Deepest first.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Offset of the furthest character any terminal matched up to.
    pub fn furthest(&self) -> usize {
        self.furthest
    }

    /// [`ParseError::furthest`] as a line and column.
    pub fn position(&self) -> Position {
        self.at
    }

    /// The log as the failed parse left it, stale entries and all.
    pub fn log(&self) -> &SpanLog {
        &self.log
    }

    pub fn report(&self) -> &Report<(String, Range<usize>)> {
        &self.report
    }
}

impl Debug for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseError")
            .field("diagnostics", &self.diagnostics)
            .field("furthest", &self.furthest)
            .field("at", &self.at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{Expr, GrammarBuilder, Parser, Position};

    #[test]
    fn deepest_path_comes_first() {
        // Line <- Word (' ' Word)* !.
        let mut g = GrammarBuilder::new();
        let word = g.call("Word");
        let rest = Expr::seq(vec![Expr::Char(' '), word.clone()]).star();
        g.define("Line", Expr::seq(vec![word, rest, Expr::eof()]));
        let letter = g.call("Letter");
        g.define("Word", letter.plus());
        g.define("Letter", Expr::range('a', 'z'));
        let grammar = g.build().unwrap();

        let mut parser = Parser::new(&grammar, "ab cd\nef!").unwrap();
        let err = parser.parse().unwrap_err();
        assert_eq!(err.furthest(), 5);
        assert_eq!(err.position(), Position { line: 1, column: 6 });

        let names = err
            .diagnostics()
            .iter()
            .map(|d| d.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Letter", "Word"]);

        let word = &err.diagnostics()[1];
        assert_eq!(word.text, "cd");
        assert_eq!(word.range, 3..5);
        assert_eq!(word.begin, Position { line: 1, column: 4 });

        let shown = err.to_string();
        assert!(shown.starts_with("no parse, gave up at 1:6\n"));
        assert!(shown.contains("Word at 1:4 - 1:6: \"cd\""));
    }

    #[test]
    fn nothing_matched_at_all() {
        let mut g = GrammarBuilder::new();
        g.define("S", Expr::lit("yes"));
        let grammar = g.build().unwrap();

        let mut parser = Parser::new(&grammar, "").unwrap();
        let err = parser.parse().unwrap_err();
        assert!(err.diagnostics().is_empty());
        assert_eq!(err.position(), Position::START);
        assert_eq!(err.log().recorded(), 0);

        let mut printed = Vec::new();
        err.report()
            .write(ariadne::sources(std::iter::once(("input".to_owned(), ""))), &mut printed)
            .unwrap();
        let printed = String::from_utf8(printed).unwrap();
        assert!(printed.contains("no parse, gave up at 1:1 (input is empty)"));
    }

    #[test]
    fn reports_point_into_the_input() {
        let mut g = GrammarBuilder::new();
        let digit = g.call("Digit");
        g.define("Sum", Expr::seq(vec![digit.clone(), Expr::Char('+'), digit]));
        g.define("Digit", Expr::range('0', '9'));
        let grammar = g.build().unwrap();

        let mut parser = Parser::new(&grammar, "1+").unwrap();
        let err = parser.parse().unwrap_err();
        let mut printed = Vec::new();
        err.report()
            .write(ariadne::sources(std::iter::once(("input".to_owned(), "1+"))), &mut printed)
            .unwrap();
        let printed = String::from_utf8(printed).unwrap();
        assert!(printed.contains("input:1:3"));
        assert!(printed.contains("last Digit matched here"));
    }
}
