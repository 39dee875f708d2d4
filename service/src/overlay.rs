use std::sync::{Arc, Mutex, PoisonError};

use coreply_core::geometry::Anchor;
use coreply_core::text::is_punctuation;
use serde::Deserialize;
use unicode_segmentation::UnicodeSegmentation;

/// Rough average glyph advance as a fraction of the text size. Only used to
/// decide whether a suggestion still fits inline.
const GLYPH_WIDTH_EM: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Suggestion,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OverlayContent {
    #[default]
    Empty,
    Suggestion {
        full_text: String,
        tokens: Vec<String>,
    },
    Error {
        message: String,
    },
}

impl OverlayContent {
    pub fn suggestion(text: &str) -> Self {
        OverlayContent::Suggestion {
            full_text: text.to_string(),
            tokens: tokenize(text.trim_end()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        OverlayContent::Error {
            message: message.into(),
        }
    }

    pub fn content_type(&self) -> ContentType {
        match self {
            OverlayContent::Empty | OverlayContent::Suggestion { .. } => ContentType::Suggestion,
            OverlayContent::Error { .. } => ContentType::Error,
        }
    }

    pub fn full_text(&self) -> &str {
        match self {
            OverlayContent::Empty => "",
            OverlayContent::Suggestion { full_text, .. } => full_text,
            OverlayContent::Error { message } => message,
        }
    }

    /// The next word to insert on a short tap. A leading blank token is joined
    /// with the word after it.
    pub fn first_token(&self) -> String {
        let OverlayContent::Suggestion { tokens, .. } = self else {
            return String::new();
        };
        match tokens.as_slice() {
            [] => String::new(),
            [first, second, ..] if first.trim().is_empty() => format!("{first}{second}"),
            [first, ..] => first.clone(),
        }
    }

    /// Text shown inside the input field.
    pub fn inline_text(&self, presentation: Presentation) -> &str {
        match (self.content_type(), presentation) {
            (ContentType::Error, _) | (_, Presentation::Bubble) => "",
            _ => self.full_text().trim_end(),
        }
    }

    /// Text shown in the trailing bubble. In `Both` mode the bubble only
    /// appears once the suggestion no longer fits in the field.
    pub fn bubble_text(
        &self,
        presentation: Presentation,
        text_size_px: f32,
        field_width: i32,
    ) -> &str {
        let text = self.full_text().trim_end();
        if self.content_type() == ContentType::Error {
            return text;
        }
        match presentation {
            Presentation::Inline => "",
            Presentation::Bubble => text,
            Presentation::Both if approximate_width(text, text_size_px) > field_width as f32 => {
                text
            }
            Presentation::Both => "",
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Presentation {
    Inline,
    Bubble,
    Both,
}

fn approximate_width(text: &str, text_size_px: f32) -> f32 {
    text.chars().count() as f32 * text_size_px * GLYPH_WIDTH_EM
}

/// Word-boundary tokens; a trailing lone punctuation mark is folded into the
/// token before it.
fn tokenize(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let mut tokens: Vec<String> = text.split_word_bounds().map(str::to_string).collect();
    if tokens.len() >= 2 {
        let mut last = tokens[tokens.len() - 1].chars();
        if let (Some(mark), None) = (last.next(), last.next()) {
            if is_punctuation(mark) {
                tokens.pop();
                if let Some(previous) = tokens.last_mut() {
                    previous.push(mark);
                }
            }
        }
    }
    tokens
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptMode {
    Full,
    FirstToken,
}

/// New field text after accepting `content` on top of `draft`.
pub fn accept_text(draft: &str, content: &OverlayContent, mode: AcceptMode) -> Option<String> {
    if !matches!(content, OverlayContent::Suggestion { .. }) {
        return None;
    }
    let addition = match mode {
        AcceptMode::Full => content.full_text().trim_end().to_string(),
        AcceptMode::FirstToken => content.first_token(),
    };
    if addition.is_empty() {
        return None;
    }
    Some(format!("{draft}{addition}"))
}

/// Renders overlay content. Implemented by the platform bridge.
pub trait OverlaySink: Send + Sync {
    fn show(&self, content: OverlayContent);
    fn place(&self, anchor: Anchor);
}

/// Forwards to another sink and remembers what is currently shown.
pub struct TrackingSink {
    inner: Arc<dyn OverlaySink>,
    current: Mutex<OverlayContent>,
}

impl TrackingSink {
    pub fn new(inner: Arc<dyn OverlaySink>) -> Self {
        Self {
            inner,
            current: Mutex::new(OverlayContent::Empty),
        }
    }

    pub fn current(&self) -> OverlayContent {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl OverlaySink for TrackingSink {
    fn show(&self, content: OverlayContent) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = content.clone();
        self.inner.show(content);
    }

    fn place(&self, anchor: Anchor) {
        self.inner.place(anchor);
    }
}
