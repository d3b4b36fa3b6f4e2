use crate::{scanner, table::MacroTable};
use std::ops::Range;

/// Byte ranges of the invocations in a piece of plain code.
///
/// Only maximal identifier tokens count, so `FOO` does not match inside
/// `FOOBAR`, `_FOO` or `1FOO`.
pub struct Invocations<'a> {
    code: &'a str,
    table: &'a MacroTable,
    pos: usize,
}

impl<'a> Invocations<'a> {
    pub fn new(code: &'a str, table: &'a MacroTable) -> Self {
        Self {
            code,
            table,
            pos: 0,
        }
    }
}

impl Iterator for Invocations<'_> {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.code.len() {
            let rest = &self.code[self.pos..];
            let Some(offset) = rest.find(scanner::is_ident_continue) else {
                self.pos = self.code.len();
                break;
            };

            let start = self.pos + offset;
            let word = &self.code[start..];
            let len = word
                .find(|c: char| !scanner::is_ident_continue(c))
                .unwrap_or(word.len());
            self.pos = start + len;

            let token = &word[..len];
            if scanner::is_identifier(token) && self.table.contains(token) {
                return Some(start..start + len);
            }
        }

        None
    }
}
