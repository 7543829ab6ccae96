use std::{ffi::OsString, fs, path::PathBuf};

use pegtree::{Grammar, Parser};

mod common;

/// The inputs in `path`, split on `---` lines.
fn cases(path: &PathBuf) -> Vec<String> {
    match fs::read_to_string(path) {
        Ok(text) => text
            .split("\n---\n")
            .map(|case| case.strip_suffix('\n').unwrap_or(case).to_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[test]
fn suite() {
    let root = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/grammars");

    let mut paths = Vec::new();

    let mut todo = vec![PathBuf::from(root)];
    while let Some(path) = todo.pop() {
        if path.is_dir() {
            for entry in fs::read_dir(path).unwrap() {
                let entry = entry.unwrap();
                let path = entry.path();
                todo.push(path)
            }
        } else if path.extension() == Some(&OsString::from("peg")) {
            paths.push(path);
        }
    }

    paths.sort_unstable();
    assert!(!paths.is_empty(), "no grammars under {}", root);

    for path in paths {
        let name = path.to_string_lossy().into_owned();
        let description = fs::read_to_string(&path).unwrap();
        let grammar = match Grammar::from_peg_named(&description, &name) {
            Ok(it) => it,
            Err(pegtree::LoadError::Syntax(e)) => {
                e.report()
                    .eprint(ariadne::sources(std::iter::once((name, description))))
                    .unwrap();
                panic!();
            }
            Err(e) => panic!("{}: {}", name, e),
        };

        let good = cases(&path.with_extension("ok"));
        let bad = cases(&path.with_extension("err"));
        assert!(!good.is_empty(), "{} has no passing inputs", name);

        for input in &good {
            let mut parser = Parser::new(&grammar, input).unwrap();
            match parser.parse() {
                Ok(tree) => {
                    let spans = tree.events().collect::<Vec<_>>();
                    common::check_nesting(&spans).unwrap();
                    let nodes = tree.preorder().collect::<Vec<_>>();
                    common::check_tiling(&nodes).unwrap();
                    assert_eq!(tree.root().map(|s| s.range()), Some(0..input.chars().count()));
                }
                Err(e) => {
                    e.report()
                        .eprint(ariadne::sources(std::iter::once((
                            "input".to_owned(),
                            input.as_str(),
                        ))))
                        .unwrap();
                    panic!("{} should accept {:?}", name, input);
                }
            }
        }

        for input in &bad {
            let mut parser = Parser::new(&grammar, input).unwrap();
            if let Ok(tree) = parser.parse() {
                panic!(
                    "{} should reject {:?}, got\n{}",
                    name,
                    input,
                    tree.write_tree()
                );
            }
        }
    }
}
