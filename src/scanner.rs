//! Lexical classification of template text.
//!
//! The scanner never tokenizes; it only tracks whether the current character
//! sits in plain code or inside something opaque (a string or a comment), how
//! deep the bracket nesting is and whether the physical line is a
//! backslash-continuation of the previous one. Everything that looks for
//! definitions or invocations asks the scanner first.

/// Lexical mode of a position. Only `Plain` is eligible for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Plain,
    SingleQuote,
    DoubleQuote,
    /// Holds the quote character of the opening `'''` or `"""`.
    TripleQuote(char),
    LineComment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LexState {
    pub mode: Mode,
    /// Number of currently open `(`, `[` and `{`.
    pub depth: usize,
    /// The previous character was a backslash inside a string.
    pub escaped: bool,
    /// The previous physical line ended with a backslash.
    pub continued: bool,
}

impl LexState {
    pub fn is_plain(&self) -> bool {
        self.mode == Mode::Plain
    }

    /// A line beginning in this state starts a new indentation unit: it is
    /// neither inside a string, nor inside brackets, nor continued.
    pub fn starts_unit(&self) -> bool {
        self.is_plain() && self.depth == 0 && !self.continued
    }

    /// Consume the character at the start of `rest`.
    ///
    /// Returns the next state and the number of bytes consumed, which is the
    /// length of one character except for a triple-quote delimiter.
    pub fn advance(self, rest: &str) -> (LexState, usize) {
        let Some(c) = rest.chars().next() else {
            return (self, 0);
        };
        let len = c.len_utf8();
        let after = &rest[len..];

        let mut next = self;
        if c != '\n' && c != '\r' {
            next.continued = false;
        }

        match self.mode {
            Mode::Plain => match c {
                '#' => next.mode = Mode::LineComment,
                '\'' | '"' => {
                    if rest.starts_with(triple(c)) {
                        next.mode = Mode::TripleQuote(c);
                        return (next, 3 * len);
                    }
                    next.mode = if c == '\'' {
                        Mode::SingleQuote
                    } else {
                        Mode::DoubleQuote
                    };
                }
                '(' | '[' | '{' => next.depth += 1,
                ')' | ']' | '}' => next.depth = next.depth.saturating_sub(1),
                '\\' if starts_with_newline(after) => next.continued = true,
                _ => (),
            },
            Mode::SingleQuote | Mode::DoubleQuote => {
                let quote = if self.mode == Mode::SingleQuote {
                    '\''
                } else {
                    '"'
                };
                if self.escaped {
                    next.escaped = false;
                } else if c == '\\' {
                    next.escaped = true;
                } else if c == quote || c == '\n' {
                    // single-line strings cannot span an unescaped newline
                    next.mode = Mode::Plain;
                }
            }
            Mode::TripleQuote(quote) => {
                if self.escaped {
                    next.escaped = false;
                } else if c == '\\' {
                    next.escaped = true;
                } else if rest.starts_with(triple(quote)) {
                    next.mode = Mode::Plain;
                    return (next, 3 * len);
                }
            }
            Mode::LineComment => {
                if c == '\n' {
                    next.mode = Mode::Plain;
                }
            }
        }

        (next, len)
    }
}

/// A run of characters sharing one classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub text: &'a str,
    pub plain: bool,
}

/// Split one physical line into plain and opaque segments.
///
/// Quote and comment delimiters belong to the opaque segment they open or
/// close. Returns the segments and the state at the start of the next line.
pub fn split_line(line: &str, mut state: LexState) -> (Vec<Segment<'_>>, LexState) {
    let mut segments = Vec::new();
    let mut current: Option<bool> = None;
    let mut start = 0;
    let mut pos = 0;

    while pos < line.len() {
        let (next, used) = state.advance(&line[pos..]);
        let plain = state.is_plain() && next.is_plain();

        if current != Some(plain) {
            if let Some(p) = current {
                segments.push(Segment {
                    text: &line[start..pos],
                    plain: p,
                });
            }
            start = pos;
            current = Some(plain);
        }

        pos += used;
        state = next;
    }

    if let Some(p) = current {
        segments.push(Segment {
            text: &line[start..],
            plain: p,
        });
    }

    (segments, state)
}

/// Advance `state` over a whole line without collecting segments.
pub fn scan_line(line: &str, mut state: LexState) -> LexState {
    let mut pos = 0;
    while pos < line.len() {
        let (next, used) = state.advance(&line[pos..]);
        pos += used;
        state = next;
    }
    state
}

pub fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

pub fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

/// `[A-Za-z_][A-Za-z0-9_]*`, Unicode letters and digits included.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if is_ident_start(c)) && chars.all(is_ident_continue)
}

/// Leading spaces and tabs of `line`.
pub fn indentation(line: &str) -> &str {
    let end = line
        .find(|c: char| c != ' ' && c != '\t')
        .unwrap_or(line.len());
    &line[..end]
}

fn triple(quote: char) -> &'static str {
    if quote == '\'' {
        "'''"
    } else {
        "\"\"\""
    }
}

fn starts_with_newline(s: &str) -> bool {
    s.starts_with('\n') || s.starts_with("\r\n")
}
