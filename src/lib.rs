#![allow(clippy::uninlined_format_args)]

pub mod annotate;
pub mod app;
pub mod cache;
pub mod compose;
pub mod config;
pub mod emoji;
pub mod merge;
pub mod progress;
pub mod refresh;
pub mod render;
pub mod scan;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use annotate::{annotate, AnnotatedText, EmojiLookup, StatusContext};
pub use app::run;
pub use cache::EmojiCache;
pub use merge::KnownMentions;
