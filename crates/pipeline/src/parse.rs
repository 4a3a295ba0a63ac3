//! Reading model output as a list literal.
//!
//! Models are asked to answer with a Python-style list of strings. The
//! accepted grammar is the subset of Python literal syntax such lists use:
//! single, double and triple-quoted strings, `r`/`u` prefixes, the standard
//! backslash escapes, adjacent-literal concatenation and a trailing comma.
//! Anything else is a [`ParseError`], which the stage runner treats as a
//! retryable failure.

use nuggetizer_core::ParseError;
use std::fmt::Display;
use std::str::FromStr;

/// Remove Markdown code-fence decorations and surrounding whitespace.
pub fn strip_code_fence(raw: &str) -> String {
    raw.replace("```python", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Parse a (possibly fenced) list-of-strings literal.
pub fn parse_string_list(raw: &str) -> Result<Vec<String>, ParseError> {
    let cleaned = strip_code_fence(raw);
    ListParser::new(&cleaned).parse()
}

/// Parse a list of labels, requiring exactly `expected` entries, each one of
/// `allowed`.
pub fn parse_labels<L>(raw: &str, expected: usize, allowed: &[L]) -> Result<Vec<L>, ParseError>
where
    L: FromStr + Copy + PartialEq + Display,
{
    let items = parse_string_list(raw)?;
    if items.len() != expected {
        return Err(ParseError::LengthMismatch {
            expected,
            actual: items.len(),
        });
    }

    items
        .iter()
        .map(|item| match item.parse::<L>() {
            Ok(label) if allowed.contains(&label) => Ok(label),
            _ => Err(ParseError::UnknownLabel {
                label: item.clone(),
                allowed: allowed
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        })
        .collect()
}

struct ListParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> ListParser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn unexpected(&self, position: usize) -> ParseError {
        let found = self.src[position..]
            .chars()
            .next()
            .map_or_else(|| "end of input".to_string(), |c| c.to_string());
        ParseError::UnexpectedToken { position, found }
    }

    fn parse(mut self) -> Result<Vec<String>, ParseError> {
        self.skip_ws();
        if self.peek() != Some('[') {
            let preview: String = self.src.chars().take(40).collect();
            return Err(ParseError::NotAList(preview));
        }
        self.bump();

        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(']') {
                self.bump();
                break;
            }
            items.push(self.string_item()?);

            self.skip_ws();
            let at = self.pos;
            match self.bump() {
                Some(',') => {}
                Some(']') => break,
                _ => return Err(self.unexpected(at)),
            }
        }

        self.skip_ws();
        if self.peek().is_some() {
            return Err(self.unexpected(self.pos));
        }
        Ok(items)
    }

    /// One list element: a string literal, or several adjacent ones.
    fn string_item(&mut self) -> Result<String, ParseError> {
        let mut value = self.string_literal()?;
        loop {
            let save = self.pos;
            self.skip_ws();
            if self.at_string_start() {
                value.push_str(&self.string_literal()?);
            } else {
                self.pos = save;
                return Ok(value);
            }
        }
    }

    fn at_string_start(&self) -> bool {
        let mut chars = self.rest().chars();
        match chars.next() {
            Some('\'' | '"') => true,
            Some('r' | 'R' | 'u' | 'U') => matches!(chars.next(), Some('\'' | '"')),
            _ => false,
        }
    }

    fn string_literal(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        if !self.at_string_start() {
            return Err(self.unexpected(start));
        }

        let mut raw = false;
        if let Some(prefix @ ('r' | 'R' | 'u' | 'U')) = self.peek() {
            raw = matches!(prefix, 'r' | 'R');
            self.bump();
        }
        let quote = match self.bump() {
            Some(q @ ('\'' | '"')) => q,
            _ => return Err(self.unexpected(start)),
        };
        let closing_pair: String = [quote, quote].iter().collect();
        let triple = self.rest().starts_with(&closing_pair);
        if triple {
            self.bump();
            self.bump();
        }

        let mut out = String::new();
        loop {
            let c = self.bump().ok_or(ParseError::UnterminatedString(start))?;
            match c {
                c if c == quote && !triple => break,
                c if c == quote && self.rest().starts_with(&closing_pair) => {
                    self.bump();
                    self.bump();
                    break;
                }
                '\n' if !triple => return Err(ParseError::UnterminatedString(start)),
                '\\' if raw => {
                    let next = self.bump().ok_or(ParseError::UnterminatedString(start))?;
                    out.push('\\');
                    out.push(next);
                }
                '\\' => self.escape(start, &mut out)?,
                c => out.push(c),
            }
        }
        Ok(out)
    }

    fn escape(&mut self, literal_start: usize, out: &mut String) -> Result<(), ParseError> {
        let at = self.pos - 1;
        let c = self
            .bump()
            .ok_or(ParseError::UnterminatedString(literal_start))?;
        match c {
            '\n' => {}
            '\\' | '\'' | '"' => out.push(c),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'v' => out.push('\x0b'),
            '0'..='7' => {
                let mut value = c.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match self.peek().and_then(|d| d.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            self.bump();
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(value).ok_or(ParseError::InvalidEscape(at))?);
            }
            'x' => out.push(self.hex_escape(2, at)?),
            'u' => out.push(self.hex_escape(4, at)?),
            'U' => out.push(self.hex_escape(8, at)?),
            'N' => self.named_escape(out),
            // Unrecognized escapes are kept verbatim.
            other => {
                out.push('\\');
                out.push(other);
            }
        }
        Ok(())
    }

    /// `\N{NAME}`. Common typographic names resolve; any other name, or a
    /// malformed reference, is kept as written.
    fn named_escape(&mut self, out: &mut String) {
        let name = self
            .rest()
            .strip_prefix('{')
            .and_then(|r| r.find('}').map(|end| &r[..end]))
            .filter(|name| !name.contains(|c: char| matches!(c, '\'' | '"' | '\n' | '\\')));
        let Some(name) = name else {
            out.push_str("\\N");
            return;
        };
        self.pos += name.len() + 2;
        match named_char(name) {
            Some(c) => out.push(c),
            None => {
                out.push_str("\\N{");
                out.push_str(name);
                out.push('}');
            }
        }
    }

    fn hex_escape(&mut self, digits: usize, at: usize) -> Result<char, ParseError> {
        let mut value = 0u32;
        for _ in 0..digits {
            let d = self
                .bump()
                .and_then(|c| c.to_digit(16))
                .ok_or(ParseError::InvalidEscape(at))?;
            value = value * 16 + d;
        }
        char::from_u32(value).ok_or(ParseError::InvalidEscape(at))
    }
}

const NAMED_CHARS: &[(&str, char)] = &[
    ("NO-BREAK SPACE", '\u{a0}'),
    ("COPYRIGHT SIGN", '\u{a9}'),
    ("REGISTERED SIGN", '\u{ae}'),
    ("DEGREE SIGN", '\u{b0}'),
    ("PLUS-MINUS SIGN", '\u{b1}'),
    ("MICRO SIGN", '\u{b5}'),
    ("MULTIPLICATION SIGN", '\u{d7}'),
    ("EN DASH", '\u{2013}'),
    ("EM DASH", '\u{2014}'),
    ("LEFT SINGLE QUOTATION MARK", '\u{2018}'),
    ("RIGHT SINGLE QUOTATION MARK", '\u{2019}'),
    ("LEFT DOUBLE QUOTATION MARK", '\u{201c}'),
    ("RIGHT DOUBLE QUOTATION MARK", '\u{201d}'),
    ("BULLET", '\u{2022}'),
    ("HORIZONTAL ELLIPSIS", '\u{2026}'),
    ("EURO SIGN", '\u{20ac}'),
    ("TRADE MARK SIGN", '\u{2122}'),
    ("RIGHTWARDS ARROW", '\u{2192}'),
    ("LESS-THAN OR EQUAL TO", '\u{2264}'),
    ("GREATER-THAN OR EQUAL TO", '\u{2265}'),
];

fn named_char(name: &str) -> Option<char> {
    NAMED_CHARS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name.trim()))
        .map(|&(_, c)| c)
}
