//! Print syntax trees.

use std::fmt::{self, Display, Write};

use crate::tree::SyntaxTree;

impl<'g> SyntaxTree<'g> {
    /// One line per recorded span, in the order they were recorded.
    pub fn write_events(&self) -> String {
        let mut out = String::new();
        self.events_into(&mut out).map(|_| out).unwrap_or_default()
    }

    fn events_into(&self, w: &mut impl Write) -> fmt::Result {
        for span in self.events() {
            writeln!(
                w,
                "{} {}..{} {:?}",
                self.grammar().name(span.rule),
                span.begin,
                span.end,
                self.text(&span)
            )?;
        }
        Ok(())
    }

    /// The tree as an indented outline, gaps included.
    pub fn write_tree(&self) -> String {
        self.to_string()
    }

    fn outline(&self, w: &mut impl Write) -> fmt::Result {
        for node in self.preorder() {
            write!(w, "{:width$}{}", "", self.label(node.kind), width = node.depth * 2)?;
            if node.leaf {
                write!(w, " {:?}", self.slice(node.range()))?;
            }
            writeln!(w)?;
        }
        Ok(())
    }

    /// Every leaf's text next to the path of rules leading down to it, so
    /// `Sum/Number/Digit "4"`. Concatenating the quoted bits gives back the
    /// matched input.
    pub fn write_highlight(&self) -> String {
        let mut out = String::new();
        self.highlight_into(&mut out).map(|_| out).unwrap_or_default()
    }

    fn highlight_into(&self, w: &mut impl Write) -> fmt::Result {
        let mut path: Vec<&str> = Vec::new();
        for node in self.preorder() {
            path.truncate(node.depth);
            path.push(self.label(node.kind));
            if node.leaf {
                writeln!(w, "{} {:?}", path.join("/"), self.slice(node.range()))?;
            }
        }
        Ok(())
    }
}

impl<'g> Display for SyntaxTree<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.outline(f)
    }
}
