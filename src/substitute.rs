//! Lexically aware macro substitution.
//!
//! Every plain-code identifier naming a macro is replaced by the macro body,
//! itself expanded first. Continuation lines of a multi-line body get the
//! leading whitespace of the physical line holding the invocation, also
//! when that line sits inside brackets or follows a continuation backslash.

use crate::{
    error::{Error, Result},
    locator::Invocations,
    scanner::{self, LexState},
    table::MacroTable,
};

/// Expand every invocation in `text`.
pub fn substitute(text: &str, table: &MacroTable) -> Result<String> {
    Expander::new(table).expand(text)
}

pub(crate) fn resolve(name: &str, table: &MacroTable) -> Result<String> {
    Expander::new(table).resolve(name)
}

struct Expander<'a> {
    table: &'a MacroTable,
    /// Macros currently being resolved, outermost first.
    stack: Vec<&'a str>,
}

impl<'a> Expander<'a> {
    fn new(table: &'a MacroTable) -> Self {
        Self {
            table,
            stack: Vec::new(),
        }
    }

    fn expand(&mut self, text: &str) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        let mut state = LexState::default();

        for line in text.split_inclusive('\n') {
            let indent = scanner::indentation(line);
            let (segments, next) = scanner::split_line(line, state);
            for segment in segments {
                if segment.plain {
                    self.expand_code(segment.text, indent, &mut out)?;
                } else {
                    out.push_str(segment.text);
                }
            }

            state = next;
        }

        Ok(out)
    }

    fn expand_code(&mut self, code: &str, indent: &str, out: &mut String) -> Result<()> {
        let table = self.table;
        let mut last = 0;

        for range in Invocations::new(code, table) {
            out.push_str(&code[last..range.start]);
            let body = self.resolve(&code[range.clone()])?;
            splice(out, &body, indent);
            last = range.end;
        }

        out.push_str(&code[last..]);
        Ok(())
    }

    fn resolve(&mut self, name: &str) -> Result<String> {
        let table = self.table;
        let Some(m) = table.get(name) else {
            return Ok(name.to_string());
        };

        if let Some(pos) = self.stack.iter().position(|n| *n == name) {
            let chain: Vec<&str> = self.stack[pos..]
                .iter()
                .copied()
                .chain(std::iter::once(name))
                .collect();
            return Err(Error::RecursiveMacro {
                chain: chain.join(" -> "),
            });
        }

        self.stack.push(m.name());
        let body = self.expand(m.body());
        self.stack.pop();

        body
    }
}

/// Append `body` to `out`, prefixing every line after the first with `indent`.
fn splice(out: &mut String, body: &str, indent: &str) {
    let body = body.strip_suffix('\n').unwrap_or(body);
    let mut lines = body.split('\n');

    if let Some(first) = lines.next() {
        out.push_str(first);
    }
    for line in lines {
        out.push('\n');
        out.push_str(indent);
        out.push_str(line);
    }
}
