use std::{collections::HashMap, fmt};

/// A 1-based line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub const START: Position = Position { line: 1, column: 1 };
}

impl Default for Position {
    fn default() -> Self {
        Self::START
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Work out the line and column of every offset in `offsets`, in one pass over `input`.
///
/// A newline counts as the last character of the line it ends. Offsets at or
/// past the end of the input all land just after its last character.
pub fn translate(input: &[char], offsets: &[usize]) -> HashMap<usize, Position> {
    let mut wanted = offsets.to_vec();
    wanted.sort_unstable();
    wanted.dedup();

    let mut out = HashMap::with_capacity(wanted.len());
    let mut wanted = wanted.into_iter().peekable();
    let mut here = Position::START;

    for (offset, c) in input.iter().enumerate() {
        while let Some(want) = wanted.next_if(|w| *w == offset) {
            out.insert(want, here);
        }
        if wanted.peek().is_none() {
            return out;
        }
        if *c == '\n' {
            here.line += 1;
            here.column = 1;
        } else {
            here.column += 1;
        }
    }
    out.extend(wanted.map(|want| (want, here)));
    out
}

#[cfg(test)]
fn chars(s: &str) -> Vec<char> {
    s.chars().collect()
}

#[test]
fn lines_and_columns() {
    let input = chars("ab\ncd\n\nü");
    let got = translate(&input, &[0, 1, 2, 3, 5, 6, 7, 8, 100]);

    let at = |line, column| Position { line, column };
    assert_eq!(got[&0], at(1, 1));
    assert_eq!(got[&1], at(1, 2));
    // the newline itself is still on line 1
    assert_eq!(got[&2], at(1, 3));
    assert_eq!(got[&3], at(2, 1));
    assert_eq!(got[&5], at(2, 3));
    assert_eq!(got[&6], at(3, 1));
    assert_eq!(got[&7], at(4, 1));
    // one past the end, and way past it
    assert_eq!(got[&8], at(4, 2));
    assert_eq!(got[&100], at(4, 2));
}

#[test]
fn duplicates_and_order_dont_matter() {
    let input = chars("x\ny");
    let got = translate(&input, &[2, 0, 2, 2]);
    assert_eq!(got.len(), 2);
    assert_eq!(got[&2], Position { line: 2, column: 1 });
    assert_eq!(got[&0].to_string(), "1:1");
}

#[test]
fn empty_input() {
    let got = translate(&[], &[0, 3]);
    assert_eq!(got[&0], Position::START);
    assert_eq!(got[&3], Position::START);
    assert!(translate(&chars("abc"), &[]).is_empty());
}
