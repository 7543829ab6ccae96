use crate::{Expr, RuleId, Span};

use super::{Parser, END_OF_INPUT};

impl<'g> Parser<'g> {
    /// Run the rule `id` at the cursor.
    pub(crate) fn call(&mut self, id: RuleId) -> bool {
        let grammar = self.grammar;
        let rule = grammar.rule(id);

        tracing::trace!(rule = %rule.name, at = self.cursor.position, "trying");
        let matched = if rule.recorded {
            self.enclose(id, &rule.expr)
        } else {
            self.attempt(&rule.expr)
        };
        tracing::trace!(
            rule = %rule.name,
            matched,
            at = self.cursor.position,
            "tried"
        );
        matched
    }

    /// Match `expr` one level deeper and record it as `id` if it works out.
    fn enclose(&mut self, id: RuleId, expr: &Expr) -> bool {
        let saved = self.cursor;
        self.cursor.depth += 1;
        if self.matches(expr) {
            self.cursor.depth -= 1;
            let span = Span::new(id, saved.position, self.cursor.position, self.cursor.depth);
            self.cursor.write_index = self.log.append(self.cursor.write_index, span);
            true
        } else {
            self.cursor = saved;
            false
        }
    }

    /// Match `expr`, leaving the cursor exactly as it was if that fails.
    pub(crate) fn attempt(&mut self, expr: &Expr) -> bool {
        let saved = self.cursor;
        let matched = self.matches(expr);
        if !matched {
            self.cursor = saved;
        }
        matched
    }

    /// Match `expr` and then put everything back, whatever happened.
    fn peek(&mut self, expr: &Expr) -> bool {
        let saved = self.cursor;
        let furthest = self.furthest;
        let matched = self.matches(expr);
        self.cursor = saved;
        self.furthest = furthest;
        matched
    }

    /// Match `expr` as many times as it will go.
    ///
    /// An iteration that matches without consuming anything stops the loop,
    /// otherwise `(a?)*` would spin forever.
    fn repeat(&mut self, expr: &Expr) {
        loop {
            let before = self.cursor.position;
            if !self.attempt(expr) || self.cursor.position == before {
                break;
            }
        }
    }

    fn matches(&mut self, expr: &Expr) -> bool {
        match expr {
            Expr::Empty => true,
            Expr::Dot => self.advance_if(|_| true),
            Expr::Char(want) => self.advance_if(|c| c == *want),
            Expr::Class { ranges, negated } => {
                self.advance_if(|c| ranges.iter().any(|r| r.contains(c)) != *negated)
            }
            Expr::Literal { text, ignore_case } => self.literal(text, *ignore_case),
            Expr::Rule(id) => self.call(*id),
            Expr::Sequence(items) => {
                let saved = self.cursor;
                for it in items {
                    if !self.matches(it) {
                        self.cursor = saved;
                        return false;
                    }
                }
                true
            }
            Expr::Choice(alts) => alts.iter().any(|alt| self.attempt(alt)),
            Expr::ZeroOrMore(inner) => {
                self.repeat(inner);
                true
            }
            Expr::OneOrMore(inner) => {
                let before = self.cursor.position;
                if !self.attempt(inner) {
                    return false;
                }
                if self.cursor.position != before {
                    self.repeat(inner);
                }
                true
            }
            Expr::Optional(inner) => {
                self.attempt(inner);
                true
            }
            Expr::And(inner) => self.peek(inner),
            Expr::Not(inner) => !self.peek(inner),
            Expr::Capture(inner) => self.enclose(RuleId::TEXT, inner),
        }
    }

    fn advance_if<F: FnOnce(char) -> bool>(&mut self, pred: F) -> bool {
        match self.buffer.get(self.cursor.position) {
            Some(&c) if c != END_OF_INPUT && pred(c) => {
                self.cursor.position += 1;
                self.furthest = self.furthest.max(self.cursor.position);
                true
            }
            _ => false,
        }
    }

    fn literal(&mut self, text: &str, ignore_case: bool) -> bool {
        let mut pos = self.cursor.position;
        for want in text.chars() {
            match self.buffer.get(pos) {
                Some(&got)
                    if got != END_OF_INPUT
                        && (got == want || (ignore_case && same_letter(got, want))) =>
                {
                    pos += 1
                }
                _ => return false,
            }
        }
        self.cursor.position = pos;
        self.furthest = self.furthest.max(pos);
        true
    }
}

fn same_letter(a: char, b: char) -> bool {
    a.to_lowercase().eq(b.to_lowercase())
}
