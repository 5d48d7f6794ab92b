use std::collections::BTreeMap;
use std::ops::Range;

use serde::Serialize;

use crate::cache::EmojiCache;
use crate::emoji::CustomEmoji;
use crate::merge::{self, KnownMentions};
use crate::scan::TokenKind;

pub const USER_MENTION: &str = "userMention";
pub const DEFAULT_EMOJI_SIZE: u16 = 24;

pub trait EmojiLookup {
    fn lookup(&self, host: &str, shortcode: &str) -> Option<CustomEmoji>;
    fn has_listing(&self, host: &str) -> bool;
    fn request_refresh(&self, host: &str) -> bool;
}

impl EmojiLookup for EmojiCache {
    fn lookup(&self, host: &str, shortcode: &str) -> Option<CustomEmoji> {
        EmojiCache::lookup(self, host, shortcode)
    }

    fn has_listing(&self, host: &str) -> bool {
        self.is_fresh(host)
    }

    fn request_refresh(&self, host: &str) -> bool {
        tracing::debug!(host, "no refresher attached, emoji stay literal");
        false
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatusContext {
    pub known_mentions: KnownMentions,
    pub author_host: Option<String>,
}

impl StatusContext {
    pub fn new(known_mentions: KnownMentions, author_host: Option<String>) -> Self {
        Self {
            known_mentions,
            author_host: author_host.filter(|host| !host.trim().is_empty()),
        }
    }

    pub fn from_profile_url(known_mentions: KnownMentions, profile_url: Option<&str>) -> Self {
        Self::new(known_mentions, profile_url.and_then(host_from_profile_url))
    }
}

pub fn host_from_profile_url(profile_url: &str) -> Option<String> {
    let parsed = url::Url::parse(profile_url.trim()).ok()?;
    parsed
        .host_str()
        .filter(|host| !host.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotateOptions {
    pub emoji_size: u16,
}

impl Default for AnnotateOptions {
    fn default() -> Self {
        Self {
            emoji_size: DEFAULT_EMOJI_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Run {
    Plain {
        text: String,
        source: Range<usize>,
    },
    Mention {
        text: String,
        username: String,
        source: Range<usize>,
    },
    Inline {
        key: String,
        alternate: String,
        source: Range<usize>,
    },
}

impl Run {
    pub fn source(&self) -> &Range<usize> {
        match self {
            Run::Plain { source, .. } | Run::Mention { source, .. } | Run::Inline { source, .. } => {
                source
            }
        }
    }

    pub fn source_text(&self) -> &str {
        match self {
            Run::Plain { text, .. } | Run::Mention { text, .. } => text,
            Run::Inline { alternate, .. } => alternate,
        }
    }

    pub fn display_text(&self) -> Option<&str> {
        match self {
            Run::Plain { text, .. } | Run::Mention { text, .. } => Some(text),
            Run::Inline { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineImage {
    pub shortcode: String,
    pub url: String,
    pub width: u16,
    pub height: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Annotation<'a> {
    pub tag: &'static str,
    pub payload: &'a str,
    pub range: &'a Range<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnnotatedText {
    runs: Vec<Run>,
    inline_content: BTreeMap<String, InlineImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_requested: Option<String>,
}

impl AnnotatedText {
    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    pub fn inline_content(&self) -> &BTreeMap<String, InlineImage> {
        &self.inline_content
    }

    pub fn refresh_requested(&self) -> Option<&str> {
        self.refresh_requested.as_deref()
    }

    pub fn source_text(&self) -> String {
        self.runs.iter().map(Run::source_text).collect()
    }

    pub fn display_text(&self) -> String {
        self.runs.iter().filter_map(Run::display_text).collect()
    }

    pub fn annotations(&self) -> impl Iterator<Item = Annotation<'_>> {
        self.runs.iter().filter_map(|run| match run {
            Run::Mention {
                username, source, ..
            } => Some(Annotation {
                tag: USER_MENTION,
                payload: username,
                range: source,
            }),
            _ => None,
        })
    }

    pub fn annotation_at(&self, offset: usize) -> Option<Annotation<'_>> {
        self.annotations()
            .find(|annotation| annotation.range.contains(&offset))
    }

    fn push_plain(&mut self, text: &str, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        let piece = &text[range.clone()];
        if let Some(Run::Plain {
            text: last,
            source,
        }) = self.runs.last_mut()
        {
            if source.end == range.start {
                last.push_str(piece);
                source.end = range.end;
                return;
            }
        }
        self.runs.push(Run::Plain {
            text: piece.to_string(),
            source: range,
        });
    }
}

pub fn annotate(
    text: &str,
    context: &StatusContext,
    emojis: &dyn EmojiLookup,
    options: &AnnotateOptions,
) -> AnnotatedText {
    let tokens = merge::merge(text, &context.known_mentions);
    tracing::trace!(
        mentions = merge::count_kind(&tokens, TokenKind::Mention),
        emojis = merge::count_kind(&tokens, TokenKind::Emoji),
        "annotating status text"
    );

    let mut out = AnnotatedText::default();
    let mut refresh_attempted = false;
    let mut cursor = 0;
    for token in tokens {
        if token.start() < cursor {
            continue;
        }
        out.push_plain(text, cursor..token.start());

        match token.kind {
            TokenKind::Mention => out.runs.push(Run::Mention {
                text: token.matched.to_string(),
                username: token.name.to_string(),
                source: token.range.clone(),
            }),
            TokenKind::Emoji => {
                let resolved = context
                    .author_host
                    .as_deref()
                    .and_then(|host| {
                        resolve_emoji(&mut out, &mut refresh_attempted, emojis, host, token.name)
                    });
                match resolved {
                    Some(emoji) => {
                        out.inline_content
                            .entry(emoji.shortcode.clone())
                            .or_insert_with(|| InlineImage {
                                shortcode: emoji.shortcode.clone(),
                                url: emoji.url.clone(),
                                width: options.emoji_size,
                                height: options.emoji_size,
                            });
                        out.runs.push(Run::Inline {
                            key: emoji.shortcode,
                            alternate: token.matched.to_string(),
                            source: token.range.clone(),
                        });
                    }
                    None => out.push_plain(text, token.range.clone()),
                }
            }
        }
        cursor = token.end();
    }
    out.push_plain(text, cursor..text.len());
    out
}

fn resolve_emoji(
    out: &mut AnnotatedText,
    refresh_attempted: &mut bool,
    emojis: &dyn EmojiLookup,
    host: &str,
    shortcode: &str,
) -> Option<CustomEmoji> {
    let found = emojis.lookup(host, shortcode);
    if found.is_none() && !*refresh_attempted && !emojis.has_listing(host) {
        *refresh_attempted = true;
        if emojis.request_refresh(host) {
            out.refresh_requested = Some(host.to_string());
        }
    }
    found
}
