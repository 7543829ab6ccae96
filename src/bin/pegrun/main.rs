use std::{
    fs,
    io::{self, Read},
    process,
};

use anyhow::Context;
use pegtree::{Grammar, LoadError, ParseError, Parser, ParserConfig};
use tracing::Level;

const HELP: &str = "\
pegrun: run a PEG grammar over some input

USAGE:
  pegrun [OPTIONS] GRAMMAR [INPUT]

With no INPUT, the grammar is checked and printed back out.
An INPUT of - reads standard input.

OPTIONS:
  --tokens          print recorded spans in recording order
  --highlight       print each leaf with the rules above it
  --start NAME      start from NAME instead of the first rule
  --capacity N      initial span log capacity
  -v, --verbose     trace every rule call
  -h, --help        print this
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Output {
    Tree,
    Tokens,
    Highlight,
}

struct Args {
    grammar: String,
    input: Option<String>,
    output: Output,
    start: Option<String>,
    capacity: Option<usize>,
    verbose: bool,
}

fn args() -> Result<Args, pico_args::Error> {
    let mut args = pico_args::Arguments::from_env();
    if args.contains(["-h", "--help"]) {
        print!("{}", HELP);
        process::exit(0);
    }

    let output = if args.contains("--tokens") {
        Output::Tokens
    } else if args.contains("--highlight") {
        Output::Highlight
    } else {
        Output::Tree
    };
    Ok(Args {
        output,
        verbose: args.contains(["-v", "--verbose"]),
        start: args.opt_value_from_str("--start")?,
        capacity: args.opt_value_from_str("--capacity")?,
        grammar: args.free_from_str()?,
        input: args.opt_free_from_str()?,
    })
}

fn main() -> anyhow::Result<()> {
    let args = args()?;

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            Level::TRACE
        } else {
            Level::WARN
        })
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let description = fs::read_to_string(&args.grammar)
        .with_context(|| format!("couldn't read grammar {}", args.grammar))?;
    let grammar = match Grammar::from_peg_named(&description, &args.grammar) {
        Ok(it) => it,
        Err(LoadError::Syntax(ono)) => fail(&ono, &args.grammar, &description),
        Err(ono) => anyhow::bail!("couldn't load grammar {}: {}", args.grammar, ono),
    };

    let path = match &args.input {
        Some(path) => path,
        None => {
            print!("{}", grammar);
            return Ok(());
        }
    };
    let input = if path == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(path).with_context(|| format!("couldn't read input {}", path))?
    };

    let mut config = ParserConfig::default().source_name(path.as_str());
    if let Some(capacity) = args.capacity {
        config = config.initial_capacity(capacity);
    }
    let mut parser = Parser::with_config(&grammar, &input, config)?;

    let result = match &args.start {
        Some(name) => {
            let start = grammar
                .find(name)
                .with_context(|| format!("there's no rule called {}", name))?;
            parser.parse_rule(start)
        }
        None => parser.parse(),
    };
    let tree = match result {
        Ok(it) => it,
        Err(ono) => fail(&ono, path, &input),
    };

    match args.output {
        Output::Tree => print!("{}", tree.write_tree()),
        Output::Tokens => print!("{}", tree.write_events()),
        Output::Highlight => print!("{}", tree.write_highlight()),
    }
    Ok(())
}

fn fail(ono: &ParseError, name: &str, source: &str) -> ! {
    let printed = ono
        .report()
        .eprint(ariadne::sources(std::iter::once((name.to_owned(), source))));
    if printed.is_err() {
        eprintln!("{}", ono);
    }
    process::exit(1)
}
