use std::str::FromStr;

use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};

use crate::annotate::{AnnotatedText, Run};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    pub mention: Style,
    pub emoji: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            mention: Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
            emoji: Style::default().fg(Color::Yellow),
        }
    }
}

impl Theme {
    pub fn with_mention_color(color: &str) -> Self {
        let mut theme = Self::default();
        if let Ok(parsed) = Color::from_str(color.trim()) {
            theme.mention = theme.mention.fg(parsed);
        }
        theme
    }
}

#[derive(Default)]
pub struct Renderer {
    theme: Theme,
}

impl Renderer {
    pub fn new(theme: Theme) -> Self {
        Self { theme }
    }

    pub fn render(&self, annotated: &AnnotatedText) -> Text<'static> {
        let mut lines: Vec<Line<'static>> = Vec::new();
        let mut current: Vec<Span<'static>> = Vec::new();

        for run in annotated.runs() {
            let (content, style) = match run {
                Run::Plain { text, .. } => (text.as_str(), Style::default()),
                Run::Mention { text, .. } => (text.as_str(), self.theme.mention),
                Run::Inline { alternate, .. } => (alternate.as_str(), self.theme.emoji),
            };

            let mut pieces = content.split('\n').peekable();
            while let Some(piece) = pieces.next() {
                if !piece.is_empty() {
                    current.push(Span::styled(piece.to_string(), style));
                }
                if pieces.peek().is_some() {
                    lines.push(Line::from(std::mem::take(&mut current)));
                }
            }
        }
        lines.push(Line::from(current));
        Text::from(lines)
    }
}

pub fn to_plain(text: &Text<'_>) -> String {
    text.lines
        .iter()
        .map(|line| {
            line.spans
                .iter()
                .map(|span| span.content.as_ref())
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}
