use std::collections::HashSet;

use crate::scan::{self, Token, TokenKind};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownMentions {
    usernames: HashSet<String>,
}

impl KnownMentions {
    pub fn new<I, S>(usernames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            usernames: usernames.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, username: &str) -> bool {
        self.usernames.contains(username)
    }
}

impl<S: Into<String>> FromIterator<S> for KnownMentions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

pub fn merge<'a>(text: &'a str, known: &KnownMentions) -> Vec<Token<'a>> {
    let mut tokens: Vec<Token<'a>> = scan::mentions(text)
        .filter(|token| known.contains(token.name))
        .chain(scan::emojis(text))
        .collect();
    tokens.sort_by_key(|token| (token.start(), token.kind));
    tokens
}

pub(crate) fn count_kind(tokens: &[Token<'_>], kind: TokenKind) -> usize {
    tokens.iter().filter(|token| token.kind == kind).count()
}
