// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! vCard (RFC 6350 / RFC 2426 / vCard 2.1) content-line parser, built on a
//! logos lexer and a chumsky grammar.
//!
//! Only the framing and content-line grammar are interpreted: property values
//! are kept verbatim so that cards round-trip unchanged through a local cache.

use std::fmt;

use chumsky::extra::ParserExtra;
use chumsky::input::ValueInput;
use chumsky::prelude::*;
use logos::Logos;

/// vCard parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VCardError {
    /// Input contained no content lines.
    #[error("Empty vCard")]
    Empty,

    /// First content line was not `BEGIN:VCARD`.
    #[error("Expected 'BEGIN:VCARD', got '{0}'")]
    MissingBegin(String),

    /// The card was not terminated by `END:VCARD`.
    #[error("Missing 'END:VCARD'")]
    MissingEnd,

    /// Content after `END:VCARD`.
    #[error("Unexpected content after 'END:VCARD' at line {0}")]
    TrailingContent(usize),

    /// A content line that does not match `name *(";" param) ":" value`.
    #[error("Malformed content line {line}: {reason}")]
    MalformedLine {
        /// 1-based line number after unfolding.
        line: usize,
        /// What is wrong with it.
        reason: String,
    },
}

/// A property parameter, e.g. `TYPE=work,voice`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VCardParameter {
    /// Upper-cased parameter name.
    pub name: String,
    /// Values with surrounding quotes removed.
    pub values: Vec<String>,
}

/// A single content line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VCardProperty {
    /// Property group, e.g. `item1` in `item1.EMAIL`.
    pub group: Option<String>,
    /// Upper-cased property name.
    pub name: String,
    /// Parameters in input order.
    pub params: Vec<VCardParameter>,
    /// Raw value.
    pub value: String,
}

impl VCardProperty {
    /// Values of the parameter `name`, case-insensitively.
    pub fn param<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.params
            .iter()
            .filter(move |p| p.name.eq_ignore_ascii_case(name))
            .flat_map(|p| p.values.iter().map(String::as_str))
    }

    /// A quoted-printable value ending in a soft line break.
    fn has_soft_break(&self) -> bool {
        self.value.ends_with('=')
            && self
                .params
                .iter()
                .flat_map(|p| &p.values)
                .any(|v| v.eq_ignore_ascii_case("QUOTED-PRINTABLE"))
    }
}

/// A parsed vCard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VCard {
    properties: Vec<VCardProperty>,
}

impl VCard {
    /// All properties between `BEGIN` and `END`, in input order.
    #[must_use]
    pub fn properties(&self) -> &[VCardProperty] {
        &self.properties
    }

    /// First property named `name`.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&VCardProperty> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// All properties named `name`.
    pub fn properties_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a VCardProperty> + 'a {
        self.properties
            .iter()
            .filter(move |p| p.name.eq_ignore_ascii_case(name))
    }

    /// The `FN` value.
    #[must_use]
    pub fn formatted_name(&self) -> Option<&str> {
        self.property("FN").map(|p| p.value.as_str())
    }

    /// The `UID` value.
    #[must_use]
    pub fn uid(&self) -> Option<&str> {
        self.property("UID").map(|p| p.value.as_str())
    }

    /// The `VERSION` value.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.property("VERSION").map(|p| p.value.as_str())
    }
}

impl fmt::Display for VCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BEGIN:VCARD\r\n")?;
        for prop in &self.properties {
            if let Some(group) = &prop.group {
                write!(f, "{group}.")?;
            }
            write!(f, "{}", prop.name)?;
            for param in &prop.params {
                write!(f, ";{}=", param.name)?;
                for (i, value) in param.values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    if value.contains([':', ';', ',']) {
                        write!(f, "\"{value}\"")?;
                    } else {
                        write!(f, "{value}")?;
                    }
                }
            }
            write!(f, ":{}\r\n", prop.value)?;
        }
        write!(f, "END:VCARD\r\n")
    }
}

/// Parses a single vCard.
///
/// Folded lines are joined before parsing. In properties encoded as
/// `QUOTED-PRINTABLE` (vCard 2.1), a value ending in `=` continues on the
/// next line and the soft break is removed, so `first=` followed by
/// `second` yields the still-encoded value `firstsecond`.
///
/// # Errors
///
/// Returns an error if the input is not a single well-framed vCard.
pub fn parse(input: &str) -> Result<VCard, VCardError> {
    let lines = content_lines(input)?;
    let mut lines = lines
        .iter()
        .enumerate()
        .map(|(i, tokens)| (i + 1, tokens.as_slice()))
        .filter(|(_, tokens)| !is_blank(tokens));

    let (_, first) = lines.next().ok_or(VCardError::Empty)?;
    let begins = parse_content_line(first)
        .is_ok_and(|p| p.name == "BEGIN" && p.value.trim().eq_ignore_ascii_case("VCARD"));
    if !begins {
        return Err(VCardError::MissingBegin(concat(first).trim().to_string()));
    }

    let mut properties: Vec<VCardProperty> = Vec::new();
    let mut depth = 1usize;
    for (line_no, tokens) in lines.by_ref() {
        if let Some(prev) = properties.last_mut().filter(|p| p.has_soft_break()) {
            prev.value.pop();
            prev.value.push_str(&concat(tokens));
            continue;
        }

        let prop = parse_content_line(tokens)
            .map_err(|reason| VCardError::MalformedLine { line: line_no, reason })?;
        let is_vcard = prop.value.trim().eq_ignore_ascii_case("VCARD");
        match prop.name.as_str() {
            "END" if is_vcard => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            "BEGIN" if is_vcard => depth += 1,
            _ => {}
        }
        properties.push(prop);
    }

    if depth != 0 {
        return Err(VCardError::MissingEnd);
    }
    if let Some((line_no, _)) = lines.next() {
        return Err(VCardError::TrailingContent(line_no));
    }

    Ok(VCard { properties })
}

/// Token emitted by the vCard lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Logos)]
#[logos(skip r"\r?\n[ \t]")] // folding
enum Token<'a> {
    #[token("\"")]
    DQuote,

    #[token(",")]
    Comma,

    #[token(":")]
    Colon,

    #[token(";")]
    Semicolon,

    #[token("=")]
    Equal,

    /// Group separator in names, plain text elsewhere.
    #[token(".")]
    Dot,

    /// CRLF, or a bare LF as some servers send.
    #[regex(r"\r?\n")]
    Newline,

    /// Name characters: 0-9, A-Z, a-z, underscore and hyphen.
    #[regex("[0-9A-Za-z_-]+")]
    Word(&'a str),

    /// Anything else printable, including spaces, tabs and non-ASCII text.
    #[regex(r#"[^\x00-\x08\x0A-\x1F\x7F",:;=.0-9A-Za-z_-]+"#)]
    Text(&'a str),
}

impl<'a> Token<'a> {
    fn as_str(&self) -> &'a str {
        match *self {
            Token::DQuote => "\"",
            Token::Comma => ",",
            Token::Colon => ":",
            Token::Semicolon => ";",
            Token::Equal => "=",
            Token::Dot => ".",
            Token::Newline => "\r\n",
            Token::Word(s) | Token::Text(s) => s,
        }
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

/// Splits the source into unfolded content lines of tokens.
fn content_lines(src: &str) -> Result<Vec<Vec<Token<'_>>>, VCardError> {
    let mut lines = vec![Vec::new()];
    for token in Token::lexer(src) {
        match token {
            Ok(Token::Newline) => lines.push(Vec::new()),
            Ok(token) => {
                if let Some(line) = lines.last_mut() {
                    line.push(token);
                }
            }
            Err(()) => {
                return Err(VCardError::MalformedLine {
                    line: lines.len(),
                    reason: "control character".to_string(),
                });
            }
        }
    }
    Ok(lines)
}

fn concat(tokens: &[Token<'_>]) -> String {
    tokens.iter().map(Token::as_str).collect()
}

fn is_blank(tokens: &[Token<'_>]) -> bool {
    tokens.iter().all(|t| t.as_str().trim().is_empty())
}

fn parse_content_line(tokens: &[Token<'_>]) -> Result<VCardProperty, String> {
    content_line::<_, extra::Err<Rich<'_, Token<'_>>>>()
        .parse(tokens)
        .into_result()
        .map_err(|errs| match errs.first() {
            Some(e) => e.reason().to_string(),
            None => "invalid content line".to_string(),
        })
}

/// `[group "."] name *(";" param) ":" value`
fn content_line<'tokens, 'src: 'tokens, I, E>()
-> impl Parser<'tokens, I, VCardProperty, E> + Clone
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SimpleSpan>,
    E: ParserExtra<'tokens, I>,
{
    let name = select! { Token::Word(s) => s }
        .separated_by(just(Token::Dot))
        .at_least(1)
        .collect::<Vec<&'src str>>();

    let params = just(Token::Semicolon)
        .ignore_then(parameter())
        .repeated()
        .collect::<Vec<_>>();

    let value = any()
        .repeated()
        .collect::<Vec<Token<'src>>>()
        .map(|tokens| concat(&tokens));

    name.then(params)
        .then_ignore(just(Token::Colon))
        .then(value)
        .then_ignore(end())
        .map(|((mut segments, params), value)| {
            let name = segments.pop().unwrap_or_default().to_ascii_uppercase();
            let group = (!segments.is_empty()).then(|| segments.join("."));
            VCardProperty {
                group,
                name,
                params,
                value,
            }
        })
}

/// `name "=" value *("," value)`, or a bare vCard 2.1 type such as `CELL`.
fn parameter<'tokens, 'src: 'tokens, I, E>()
-> impl Parser<'tokens, I, VCardParameter, E> + Clone
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SimpleSpan>,
    E: ParserExtra<'tokens, I>,
{
    let quoted = any()
        .filter(|t: &Token<'src>| *t != Token::DQuote)
        .repeated()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::DQuote), just(Token::DQuote))
        .map(|tokens| concat(&tokens));

    // safe characters
    let paramtext = any()
        .filter(|t: &Token<'src>| {
            !matches!(
                t,
                Token::DQuote | Token::Comma | Token::Colon | Token::Semicolon
            )
        })
        .repeated()
        .collect::<Vec<_>>()
        .map(|tokens| concat(&tokens));

    let values = choice((quoted, paramtext))
        .separated_by(just(Token::Comma))
        .collect::<Vec<String>>();

    select! { Token::Word(s) => s }
        .then(just(Token::Equal).ignore_then(values).or_not())
        .map(|(name, values)| match values {
            Some(values) => VCardParameter {
                name: name.to_ascii_uppercase(),
                values,
            },
            None => VCardParameter {
                name: "TYPE".to_string(),
                values: vec![name.to_string()],
            },
        })
}
