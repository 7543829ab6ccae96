use proptest::prelude::*;

use pegtree::{ClassRange, Expr, Grammar, GrammarBuilder, Parser, ParserConfig, RuleId};

mod common;

const RULES: u16 = 4;

/// An expression for rule `n`, which may only call rules after it so the
/// grammar can't recurse.
fn body(n: u16) -> impl Strategy<Value = Expr> {
    let calls = ((n + 1)..RULES)
        .map(|k| Expr::Rule(RuleId(RuleId::FIRST.0 + k)))
        .collect::<Vec<_>>();
    let leaf = prop_oneof![
        Just(Expr::Empty),
        Just(Expr::Dot),
        proptest::char::range('a', 'c').prop_map(Expr::Char),
        "[abc]{1,2}".prop_map(Expr::lit),
        Just(Expr::Class {
            ranges: vec![ClassRange::new('a', 'b')],
            negated: false,
        }),
        proptest::sample::select(if calls.is_empty() {
            vec![Expr::Empty]
        } else {
            calls
        }),
    ];
    leaf.prop_recursive(3, 16, 3, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 1..4).prop_map(Expr::seq),
            proptest::collection::vec(inner.clone(), 1..4).prop_map(Expr::choice),
            inner.clone().prop_map(Expr::star),
            inner.clone().prop_map(Expr::plus),
            inner.clone().prop_map(Expr::opt),
            inner.clone().prop_map(Expr::and),
            inner.clone().prop_map(Expr::not),
            inner.prop_map(Expr::capture),
        ]
    })
}

fn grammar() -> impl Strategy<Value = Grammar> {
    (
        body(0),
        body(1),
        body(2),
        body(3),
        proptest::collection::vec(any::<bool>(), RULES as usize),
    )
        .prop_map(|(r0, r1, r2, r3, silent)| {
            let mut g = GrammarBuilder::new();
            for n in 0..RULES {
                g.rule(&format!("R{}", n));
            }
            for (n, expr) in [r0, r1, r2, r3].iter().enumerate() {
                let name = format!("R{}", n);
                // the start rule has to record something
                if n > 0 && silent[n] {
                    g.define_silent(&name, expr.clone());
                } else {
                    g.define(&name, expr.clone());
                }
            }
            g.build().unwrap()
        })
}

proptest! {
    #[test]
    fn successful_parses_are_well_formed(g in grammar(), input in "[abc]{0,10}") {
        let mut parser = Parser::new(&g, &input).unwrap();
        if let Ok(tree) = parser.parse() {
            let spans = tree.events().collect::<Vec<_>>();
            prop_assert!(common::check_nesting(&spans).is_ok(), "{:?}", common::check_nesting(&spans));

            let nodes = tree.preorder().collect::<Vec<_>>();
            prop_assert!(common::check_tiling(&nodes).is_ok(), "{:?}", common::check_tiling(&nodes));
            prop_assert_eq!(nodes.iter().filter(|n| !n.kind.is_gap()).count(), spans.len());

            // every span sits inside the root
            let root = tree.root().unwrap();
            prop_assert!(spans.iter().all(|s| root.covers(s)));
        }
    }

    #[test]
    fn log_capacity_is_invisible(g in grammar(), input in "[abc]{0,10}") {
        let config = |capacity| ParserConfig::default().initial_capacity(capacity);
        let mut small = Parser::with_config(&g, &input, config(1)).unwrap();
        let mut large = Parser::with_config(&g, &input, config(10_000)).unwrap();

        match (small.parse(), large.parse()) {
            (Ok(a), Ok(b)) => {
                prop_assert_eq!(a.events().collect::<Vec<_>>(), b.events().collect::<Vec<_>>());
                prop_assert_eq!(a.preorder().collect::<Vec<_>>(), b.preorder().collect::<Vec<_>>());
            }
            (Err(a), Err(b)) => {
                prop_assert_eq!(a.furthest(), b.furthest());
                prop_assert_eq!(a.diagnostics(), b.diagnostics());
            }
            _ => prop_assert!(false, "the two parses disagree"),
        }
    }

    #[test]
    fn trimming_twice_is_trimming_once(g in grammar(), input in "[abc]{0,10}", cut in 0usize..8) {
        let mut parser = Parser::new(&g, &input).unwrap();
        if let Ok(tree) = parser.parse() {
            let mut once = tree.log().clone();
            once.trim(cut);
            let mut twice = once.clone();
            twice.trim(cut);
            prop_assert_eq!(once, twice);
        }
    }
}
