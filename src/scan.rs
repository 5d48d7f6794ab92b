use std::ops::Range;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"@(\w+)").expect("mention pattern"));
static EMOJI: Lazy<Regex> = Lazy::new(|| Regex::new(r":(\w+):").expect("emoji pattern"));
static PARTIAL_EMOJI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":(\w+):?").expect("partial emoji pattern"));

/// What a token refers to. The derived order is the tie-break used when two
/// tokens start at the same offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TokenKind {
    Mention,
    Emoji,
}

impl TokenKind {
    pub fn sigil(&self) -> char {
        match self {
            TokenKind::Mention => '@',
            TokenKind::Emoji => ':',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub range: Range<usize>,
    pub matched: &'a str,
    pub name: &'a str,
}

impl<'a> Token<'a> {
    fn from_captures(kind: TokenKind, caps: Captures<'a>) -> Option<Self> {
        let whole = caps.get(0)?;
        let name = caps.get(1)?;
        Some(Token {
            kind,
            range: whole.range(),
            matched: whole.as_str(),
            name: name.as_str(),
        })
    }

    pub fn start(&self) -> usize {
        self.range.start
    }

    pub fn end(&self) -> usize {
        self.range.end
    }
}

fn scan<'a>(
    pattern: &'static Regex,
    kind: TokenKind,
    text: &'a str,
) -> impl Iterator<Item = Token<'a>> + 'a {
    pattern
        .captures_iter(text)
        .filter_map(move |caps| Token::from_captures(kind, caps))
}

pub fn mentions(text: &str) -> impl Iterator<Item = Token<'_>> + '_ {
    scan(&MENTION, TokenKind::Mention, text)
}

pub fn emojis(text: &str) -> impl Iterator<Item = Token<'_>> + '_ {
    scan(&EMOJI, TokenKind::Emoji, text)
}

pub fn partial_mentions(text: &str) -> impl Iterator<Item = Token<'_>> + '_ {
    mentions(text)
}

pub fn partial_emojis(text: &str) -> impl Iterator<Item = Token<'_>> + '_ {
    scan(&PARTIAL_EMOJI, TokenKind::Emoji, text)
}
