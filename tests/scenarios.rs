use pegtree::{Expr, Grammar, GrammarBuilder, NodeKind, Parser, ParserConfig, Position, Span};

mod common;

fn spans(
    log: impl Iterator<Item = Span>,
    grammar: &Grammar,
) -> Vec<(String, usize, usize, usize)> {
    log.map(|s| (grammar.name(s.rule).to_owned(), s.begin, s.end, s.depth))
        .collect()
}

fn span(name: &str, begin: usize, end: usize, depth: usize) -> (String, usize, usize, usize) {
    (name.to_owned(), begin, end, depth)
}

#[test]
fn repetition_then_literal() {
    // S <- A+ B, A <- 'a', B <- 'b'
    let mut g = GrammarBuilder::new();
    let (a, b) = (g.call("A"), g.call("B"));
    g.define("S", Expr::seq(vec![a.plus(), b]));
    g.define("A", Expr::Char('a'));
    g.define("B", Expr::Char('b'));
    let grammar = g.build().unwrap();

    let mut parser = Parser::new(&grammar, "aaab").unwrap();
    let tree = parser.parse().unwrap();
    assert_eq!(
        spans(tree.events(), &grammar),
        vec![
            span("A", 0, 1, 1),
            span("A", 1, 2, 1),
            span("A", 2, 3, 1),
            span("B", 3, 4, 1),
            span("S", 0, 4, 0),
        ]
    );
    assert!(tree.preorder().all(|n| !n.kind.is_gap()));
}

#[test]
fn silent_whitespace_leaves_a_gap() {
    let mut g = GrammarBuilder::new();
    let (a, ws, b) = (g.call("A"), g.call("Ws"), g.call("B"));
    g.define("S", Expr::seq(vec![a, ws, b]));
    g.define("A", Expr::Char('a'));
    g.define_silent("Ws", Expr::Char(' '));
    g.define("B", Expr::Char('b'));
    let grammar = g.build().unwrap();

    let mut parser = Parser::new(&grammar, "a b").unwrap();
    let tree = parser.parse().unwrap();
    assert_eq!(tree.root().map(|s| s.range()), Some(0..3));

    let nodes = tree.preorder().collect::<Vec<_>>();
    let gaps = nodes.iter().filter(|n| n.kind.is_gap()).collect::<Vec<_>>();
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0].kind, NodeKind::InternalGap);
    assert_eq!(gaps[0].range(), 1..2);
    common::check_tiling(&nodes).unwrap();
}

#[test]
fn failed_alternative_leaves_no_trace() {
    // S <- X / Y, with X getting as far as recording a span before failing
    let mut g = GrammarBuilder::new();
    let (x, y) = (g.call("X"), g.call("Y"));
    g.define("S", Expr::choice(vec![Expr::seq(vec![x, Expr::Char('!')]), y]));
    g.define("X", Expr::Char('x'));
    g.define("Y", Expr::lit("xy"));
    let grammar = g.build().unwrap();

    let mut parser = Parser::new(&grammar, "xy").unwrap();
    let tree = parser.parse().unwrap();
    assert_eq!(
        spans(tree.events(), &grammar),
        vec![span("Y", 0, 2, 1), span("S", 0, 2, 0)]
    );

    let mut g = GrammarBuilder::new();
    g.define("S", Expr::choice(vec![Expr::Char('x'), Expr::Char('y')]));
    let grammar = g.build().unwrap();
    let mut parser = Parser::new(&grammar, "y").unwrap();
    let tree = parser.parse().unwrap();
    assert_eq!(spans(tree.events(), &grammar), vec![span("S", 0, 1, 0)]);
}

#[test]
fn failure_points_past_the_last_match() {
    // S <- A B !.
    let mut g = GrammarBuilder::new();
    let (a, b) = (g.call("A"), g.call("B"));
    g.define("S", Expr::seq(vec![a, b, Expr::eof()]));
    g.define("A", Expr::Char('a'));
    g.define("B", Expr::Char('b'));
    let grammar = g.build().unwrap();

    let mut parser = Parser::new(&grammar, "ac").unwrap();
    let err = parser.parse().unwrap_err();
    let diagnostics = err.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].name, "A");
    assert_eq!(diagnostics[0].range, 0..1);
    assert_eq!(diagnostics[0].text, "a");
    assert_eq!(diagnostics[0].end, Position { line: 1, column: 2 });
    assert_eq!(err.position(), Position { line: 1, column: 2 });
}

fn json() -> Grammar {
    Grammar::from_peg(include_str!("grammars/json.peg")).unwrap()
}

const DOCUMENT: &str = r#"{"list": [1, 2, {"deep": [[[true]]]}], "s": "x\"y", "n": -0.5}"#;

#[test]
fn growing_the_log_changes_nothing() {
    let grammar = json();

    let config = |capacity| ParserConfig::default().initial_capacity(capacity);
    let mut small = Parser::with_config(&grammar, DOCUMENT, config(1)).unwrap();
    let mut large = Parser::with_config(&grammar, DOCUMENT, config(10_000)).unwrap();
    let small = small.parse().unwrap();
    let large = large.parse().unwrap();
    assert!(small.log().is_wide());
    assert!(!large.log().is_wide());

    assert_eq!(
        small.events().collect::<Vec<_>>(),
        large.events().collect::<Vec<_>>()
    );
    assert_eq!(
        small.preorder().collect::<Vec<_>>(),
        large.preorder().collect::<Vec<_>>()
    );
    assert_eq!(small.write_tree(), large.write_tree());
}

#[test]
fn replaying_twice_gives_the_same_thing() {
    let grammar = json();
    let mut parser = Parser::new(&grammar, DOCUMENT).unwrap();
    let tree = parser.parse().unwrap();

    assert_eq!(
        tree.events().collect::<Vec<_>>(),
        tree.events().collect::<Vec<_>>()
    );
    let first = tree.preorder().collect::<Vec<_>>();
    assert_eq!(first, tree.preorder().collect::<Vec<_>>());
    common::check_tiling(&first).unwrap();
    common::check_nesting(&tree.events().collect::<Vec<_>>()).unwrap();
}

#[test]
fn multiline_failures() {
    let grammar = json();
    let mut parser = Parser::new(&grammar, "{\n  \"a\": [1,\n  2,,\n]}").unwrap();
    let err = parser.parse().unwrap_err();
    assert_eq!(err.position(), Position { line: 3, column: 5 });
    // the innermost thing that worked was the number 2
    let first = &err.diagnostics()[0];
    assert_eq!(first.text, "2");
    assert_eq!(first.begin, Position { line: 3, column: 3 });
}
