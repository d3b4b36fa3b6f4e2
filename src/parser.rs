//! Definition extraction.
//!
//! # Grammar
//!
//! ```text
//! $Directive = $Space0 $Define | $Space0 $Macro
//!
//! $Define = #define $Space1 $ID $Space1 $Body | #define $Space1 $ID $Space0
//! $Macro = #macro $Space1 $ID $Space0 = $Space0 $Body | #macro $Space1 $ID $Space0 : $Space0
//! $EndMacro = $Space0 #endmacro $Space0
//!
//! $ID = Regex((_|[a..zA..Z])([a..zA..Z0..9]|_)*)
//! $Body = Regex(.*)
//! ```
//!
//! A `$Define` body ending with `\` continues on the next physical line.
//! A `#` comment after a one-line body, or after the last line of a continued
//! one, is not part of the body.
//! `#macro NAME:` opens a block which runs until `$EndMacro`.
//!
//! Directives are only recognized on a line that starts an indentation unit,
//! so a marker inside a string, a comment or a bracketed expression is
//! ordinary text.

use crate::{
    error::{Error, Result},
    scanner::{self, LexState, Mode},
    table::Macro,
};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{not_line_ending, satisfy, space0, space1},
    combinator::{eof, peek},
    error::{convert_error, VerboseError},
    multi::many0,
    sequence::preceded,
    Finish, IResult,
};

type PResult<'a, OUT> = IResult<&'a str, OUT, VerboseError<&'a str>>;

#[derive(Debug, PartialEq)]
enum Directive<'a> {
    /// `#define NAME body`, the body possibly ending with a continuation backslash.
    Define { name: String, body: &'a str },
    /// `#macro NAME = body`
    Macro { name: String, body: &'a str },
    /// `#macro NAME:`
    MacroBlock { name: String },
}

/// Result of scanning one template.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Definitions in source order.
    pub macros: Vec<Macro>,
    /// The template with every definition removed.
    pub code: String,
}

/// Collect the definitions of `text` and strip them from it.
pub fn extract(text: &str) -> Result<Extraction> {
    let mut result = Extraction::default();
    let mut state = LexState::default();
    let mut lines = text.split_inclusive('\n').enumerate();

    while let Some((index, line)) = lines.next() {
        if state.starts_unit() {
            if let Some(m) = parse_definition(index, line, &mut lines)? {
                tracing::debug!(name = m.name(), line = index + 1, "found definition");
                result.macros.push(m);
                continue;
            }
        }

        state = scanner::scan_line(line, state);
        result.code.push_str(line);
    }

    Ok(result)
}

fn parse_definition<'a>(
    index: usize,
    line: &'a str,
    rest: &mut impl Iterator<Item = (usize, &'a str)>,
) -> Result<Option<Macro>> {
    let content = strip_newline(line);
    if parse_marker(content).is_err() {
        return Ok(None);
    }

    let directive = match parse_directive(content).finish() {
        Ok((_, directive)) => directive,
        Err(e) => {
            return Err(Error::MalformedDefinition {
                line: index + 1,
                detail: convert_error(content, e),
            });
        }
    };

    let (name, body) = match directive {
        Directive::Define { name, body } => {
            let body = continued_body(&name, index, body, rest)?;
            (name, body)
        }
        Directive::Macro { name, body } => (name, strip_comment(body).to_string()),
        Directive::MacroBlock { name } => {
            let body = block_body(&name, index, rest)?;
            (name, body)
        }
    };

    Macro::new(name, body).map(Some)
}

/// Join the physical lines of a `#define` whose lines end with `\`.
fn continued_body<'a>(
    name: &str,
    index: usize,
    first: &'a str,
    rest: &mut impl Iterator<Item = (usize, &'a str)>,
) -> Result<String> {
    let mut parts = Vec::new();
    let mut current = first;

    while let Some(part) = current.strip_suffix('\\') {
        parts.push(part);
        match rest.next() {
            Some((_, next)) => current = strip_newline(next),
            None => {
                return Err(Error::UnterminatedDefinition {
                    name: name.to_string(),
                    line: index + 1,
                })
            }
        }
    }
    parts.push(strip_comment(current));

    if parts.len() == 1 {
        return Ok(parts[0].to_string());
    }

    // `#define NAME \` starts the body on the next line
    if parts[0].trim().is_empty() {
        parts.remove(0);
    }

    Ok(dedent(&parts).join("\n"))
}

/// Lines up to `#endmacro`, dedented, each terminated by a newline.
fn block_body<'a>(
    name: &str,
    index: usize,
    rest: &mut impl Iterator<Item = (usize, &'a str)>,
) -> Result<String> {
    let mut lines = Vec::new();

    for (_, line) in rest.by_ref() {
        let content = strip_newline(line);
        if parse_end_macro(content).is_ok() {
            return Ok(dedent(&lines)
                .iter()
                .map(|l| format!("{l}\n"))
                .collect());
        }
        lines.push(content);
    }

    Err(Error::UnterminatedDefinition {
        name: name.to_string(),
        line: index + 1,
    })
}

/// Remove the common leading whitespace of the non-blank lines.
/// Blank lines become empty.
pub(crate) fn dedent(lines: &[&str]) -> Vec<String> {
    let margin = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| scanner::indentation(l))
        .reduce(common_prefix)
        .unwrap_or("");

    lines
        .iter()
        .map(|l| {
            if l.trim().is_empty() {
                String::new()
            } else {
                l[margin.len()..].to_string()
            }
        })
        .collect()
}

fn common_prefix<'a>(a: &'a str, b: &str) -> &'a str {
    let len = a
        .bytes()
        .zip(b.bytes())
        .take_while(|(x, y)| x == y)
        .count();
    &a[..len]
}

/// `body` without a trailing `#` comment or trailing whitespace.
fn strip_comment(body: &str) -> &str {
    let mut state = LexState::default();
    let mut end = 0;

    while end < body.len() {
        let (next, used) = state.advance(&body[end..]);
        if state.is_plain() && next.mode == Mode::LineComment {
            break;
        }
        end += used;
        state = next;
    }

    body[..end].trim_end()
}

fn strip_newline(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// `#define` or `#macro` as a whole word at the start of a line.
fn parse_marker(input: &str) -> PResult<&str> {
    let (input, _) = space0(input)?;
    let (input, marker) = alt((tag("#define"), tag("#macro")))(input)?;
    let (input, _) = peek(alt((space1, eof)))(input)?;
    Ok((input, marker))
}

/// ```text
/// $Directive = $Space0 $Define | $Space0 $Macro
/// ```
fn parse_directive(input: &str) -> PResult<Directive> {
    let (input, _) = space0(input)?;
    if peek_tag("#define", input).is_ok() {
        parse_define(input)
    } else {
        parse_macro(input)
    }
}

/// ```text
/// $Define = #define $Space1 $ID $Space1 $Body | #define $Space1 $ID $Space0
/// ```
fn parse_define(input: &str) -> PResult<Directive> {
    let (input, _) = tag("#define")(input)?;
    let (input, _) = space1(input)?;
    let (input, name) = parse_identifier(input)?;

    // `#define NAME` alone defines an empty body
    let (input, body) = alt((preceded(space1, not_line_ending), eof))(input)?;
    let (input, _) = eof(input)?;

    Ok((input, Directive::Define { name, body }))
}

/// ```text
/// $Macro = #macro $Space1 $ID $Space0 = $Space0 $Body | #macro $Space1 $ID $Space0 : $Space0
/// ```
fn parse_macro(input: &str) -> PResult<Directive> {
    let (input, _) = tag("#macro")(input)?;
    let (input, _) = space1(input)?;
    let (input, name) = parse_identifier(input)?;
    let (input, _) = space0(input)?;

    if peek_tag(":", input).is_ok() {
        let (input, _) = tag(":")(input)?;
        let (input, _) = space0(input)?;
        let (input, _) = eof(input)?;
        Ok((input, Directive::MacroBlock { name }))
    } else {
        let (input, _) = tag("=")(input)?;
        let (input, _) = space0(input)?;
        let (input, body) = not_line_ending(input)?;
        let (input, _) = eof(input)?;
        Ok((input, Directive::Macro { name, body }))
    }
}

/// ```text
/// $EndMacro = $Space0 #endmacro $Space0
/// ```
fn parse_end_macro(input: &str) -> PResult<()> {
    let (input, _) = space0(input)?;
    let (input, _) = tag("#endmacro")(input)?;
    let (input, _) = space0(input)?;
    let (input, _) = eof(input)?;
    Ok((input, ()))
}

/// ```text
/// $ID = Regex((_|[a..zA..Z])([a..zA..Z0..9]|_)*)
/// ```
fn parse_identifier(input: &str) -> PResult<String> {
    let (input, head) = satisfy(scanner::is_ident_start)(input)?;
    let (input, tail) = many0(satisfy(scanner::is_ident_continue))(input)?;

    let tail: String = tail.iter().collect();
    Ok((input, format!("{head}{tail}")))
}

fn peek_tag<'a>(c: &'static str, input: &'a str) -> PResult<'a, &'a str> {
    peek(tag(c))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bodies(text: &str) -> Vec<(String, String)> {
        extract(text)
            .unwrap()
            .macros
            .iter()
            .map(|m| (m.name().to_string(), m.body().to_string()))
            .collect()
    }

    fn single(name: &str, body: &str) -> Vec<(String, String)> {
        vec![(name.to_string(), body.to_string())]
    }

    #[test]
    fn c_like_definition() {
        assert_eq!(bodies("#define TEST_VALUE 1234\n"), single("TEST_VALUE", "1234"));
        assert_eq!(
            bodies("\t#define  TEST_VALUE\t1234   \r\n"),
            single("TEST_VALUE", "1234")
        );
        assert_eq!(bodies("#define EMPTY\n"), single("EMPTY", ""));
    }

    #[test]
    fn c_like_multi_line_definition() {
        let text = "#define FOO def foo(): \\\n    print('stuff')\nFOO\n";
        assert_eq!(bodies(text), single("FOO", "def foo(): \n    print('stuff')"));
        assert_eq!(extract(text).unwrap().code, "FOO\n");
    }

    #[test]
    fn c_like_definition_starting_on_next_line_is_dedented() {
        let text = "#define FOO \\\n        a = 1 \\\n          b\n";
        assert_eq!(bodies(text), single("FOO", "a = 1 \n  b"));
    }

    #[test]
    fn py_like_definition() {
        assert_eq!(bodies("#macro TEST_VALUE = 1234\n"), single("TEST_VALUE", "1234"));
        assert_eq!(bodies("#macro TEST_VALUE=1234  \n"), single("TEST_VALUE", "1234"));
    }

    #[test]
    fn py_like_block_definition() {
        let text = "x = 1\n#macro FOO:\n    def foo():\n        print('stuff')\n#endmacro\ny = 2\n";
        assert_eq!(bodies(text), single("FOO", "def foo():\n    print('stuff')\n"));
        assert_eq!(extract(text).unwrap().code, "x = 1\ny = 2\n");
    }

    #[test]
    fn block_keeps_quotes_and_blank_lines() {
        let text = "#macro DOC:\n  s = '#endmacro'\n\n  t = 2\n  #endmacro  \n";
        assert_eq!(bodies(text), single("DOC", "s = '#endmacro'\n\nt = 2\n"));
    }

    #[test]
    fn definitions_are_yielded_in_source_order() {
        let text = "#define A 1\n#macro A = 2\n#define B 3\n";
        let found = bodies(text);
        assert_eq!(found.len(), 3);
        assert_eq!(found[0], ("A".to_string(), "1".to_string()));
        assert_eq!(found[1], ("A".to_string(), "2".to_string()));
        assert_eq!(found[2], ("B".to_string(), "3".to_string()));
    }

    #[test]
    fn markers_in_strings_and_comments_are_ignored() {
        let text = "s = \"\"\"\n#define FOO 1\n\"\"\"\nx = 2  # #define BAR 3\n'#define BAZ 4'\n";
        let extraction = extract(text).unwrap();
        assert!(extraction.macros.is_empty());
        assert_eq!(extraction.code, text);
    }

    #[test]
    fn markers_in_brackets_and_continuations_are_ignored() {
        let text = "x = (\n#define FOO 1\n)\ny = \\\n#define BAR 2\n";
        let extraction = extract(text).unwrap();
        assert!(extraction.macros.is_empty());
        assert_eq!(extraction.code, text);
    }

    #[test]
    fn similar_comments_are_not_directives() {
        let text = "#defined 1\n#macros = 2\n# define X 3\n#endmacro\n";
        let extraction = extract(text).unwrap();
        assert!(extraction.macros.is_empty());
        assert_eq!(extraction.code, text);
    }

    #[test]
    fn malformed_definition_is_an_error() {
        let err = extract("x = 1\n#define 1abc 2\n").unwrap_err();
        assert!(matches!(err, Error::MalformedDefinition { line: 2, .. }));

        let err = extract("#define FOO(x) x\n").unwrap_err();
        assert!(matches!(err, Error::MalformedDefinition { line: 1, .. }));

        let err = extract("#macro FOO 1\n").unwrap_err();
        assert!(matches!(err, Error::MalformedDefinition { line: 1, .. }));
    }

    #[test]
    fn unterminated_definitions_are_errors() {
        let err = extract("#macro FOO:\n  a = 1\n").unwrap_err();
        match err {
            Error::UnterminatedDefinition { name, line } => {
                assert_eq!(name, "FOO");
                assert_eq!(line, 1);
            }
            e => panic!("unexpected error: {e}"),
        }

        let err = extract("\n#define BAR 1 \\\n").unwrap_err();
        assert!(matches!(err, Error::UnterminatedDefinition { line: 2, .. }));
    }

    #[test]
    fn trailing_comments_are_not_part_of_the_body() {
        let result = extract(
            "#macro X = 1  # note\n#define Y 'a#b'# c\n#define Z f(1, \\\n  2)  # done\ny = X + 2\n",
        )
        .unwrap();

        let bodies: Vec<_> = result.macros.iter().map(|m| (m.name(), m.body())).collect();
        assert_eq!(bodies, [("X", "1"), ("Y", "'a#b'"), ("Z", "f(1, \n  2)")]);
        assert_eq!(result.code, "y = X + 2\n");
    }

    #[test]
    fn dedent_uses_common_whitespace() {
        assert_eq!(dedent(&["    a", "      b", "", "    c"]), ["a", "  b", "", "c"]);
        assert_eq!(dedent(&["\ta", "  b"]), ["\ta", "  b"]);
    }
}
