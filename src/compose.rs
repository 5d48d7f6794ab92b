use std::ops::Range;

use crate::emoji::{self, CustomEmoji};
use crate::scan::{self, Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub cursor: usize,
}

pub fn token_at_cursor<'a>(
    text: &'a str,
    selection: Range<usize>,
    kind: TokenKind,
) -> Option<Token<'a>> {
    let before = selection.start.checked_sub(1);
    let after = selection.end.checked_add(1);
    let touches = |token: &Token<'_>| {
        before.is_some_and(|offset| token.range.contains(&offset))
            || after.is_some_and(|offset| token.range.contains(&offset))
    };
    match kind {
        TokenKind::Mention => scan::partial_mentions(text).find(|token| touches(token)),
        TokenKind::Emoji => scan::partial_emojis(text).find(|token| touches(token)),
    }
}

pub fn query_at_cursor(text: &str, selection: Range<usize>, kind: TokenKind) -> Option<&str> {
    token_at_cursor(text, selection, kind).map(|token| token.name)
}

pub fn complete(text: &str, token: &Token<'_>, name: &str) -> Completion {
    let replacement = match token.kind {
        TokenKind::Mention => format!("@{name} "),
        TokenKind::Emoji => format!(":{name}: "),
    };
    let mut out = String::with_capacity(text.len() + replacement.len());
    out.push_str(&text[..token.start()]);
    out.push_str(&replacement);
    out.push_str(&text[token.end()..]);
    Completion {
        text: out,
        cursor: token.start() + replacement.len(),
    }
}

pub fn emoji_suggestions<'a>(
    listing: &'a [CustomEmoji],
    text: &str,
    selection: Range<usize>,
) -> Vec<&'a CustomEmoji> {
    match query_at_cursor(text, selection, TokenKind::Emoji) {
        Some(query) => emoji::search(listing, query),
        None => Vec::new(),
    }
}
