use tracing::debug;

use crate::text::trailing_word;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Sender {
    Me,
    Other(String),
}

impl Sender {
    pub fn other(name: impl Into<String>) -> Self {
        Sender::Other(name.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
    pub timestamp: String,
}

impl ChatMessage {
    pub fn new(sender: Sender, text: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            sender,
            text: text.into(),
            timestamp: timestamp.into(),
        }
    }

    pub fn is_mine(&self) -> bool {
        self.sender == Sender::Me
    }

    /// Transcript merging ignores timestamps: most apps only render them on
    /// some bubbles, so the same message can be read with and without one.
    pub fn same_content(&self, other: &ChatMessage) -> bool {
        self.sender == other.sender && self.text == other.text
    }

    pub fn to_coreply2_string(&self) -> String {
        let label = if self.is_mine() {
            "Message I sent:"
        } else {
            "Message I received:"
        };
        format!("{label}\n{}\n", self.text)
    }

    pub fn to_fim_string(&self) -> String {
        let call = if self.is_mine() {
            "send_message"
        } else {
            "mock_received"
        };
        format!("{call}(\"{}\")\n", self.text)
    }
}

/// Running transcript of one conversation, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatContents {
    messages: Vec<ChatMessage>,
}

impl ChatContents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Merges freshly extracted on-screen messages into the transcript.
    ///
    /// Returns `true` when the transcript changed, which means suggestions
    /// computed against the old context are no longer valid.
    pub fn combine(&mut self, fresh: Vec<ChatMessage>) -> bool {
        if fresh.is_empty() {
            return false;
        }
        if self.messages.is_empty() {
            self.messages = fresh;
            return true;
        }
        if contains_run(&self.messages, &fresh) {
            return false;
        }

        let overlap = longest_overlap(&self.messages, &fresh);
        if overlap == 0 {
            debug!(
                previous = self.messages.len(),
                fresh = fresh.len(),
                "visible messages no longer match transcript, replacing it"
            );
            self.messages = fresh;
            return true;
        }

        self.messages.extend(fresh.into_iter().skip(overlap));
        true
    }

    pub fn coreply2_format(&self) -> String {
        self.messages
            .iter()
            .map(ChatMessage::to_coreply2_string)
            .collect()
    }

    pub fn fim_format(&self) -> String {
        self.messages.iter().map(ChatMessage::to_fim_string).collect()
    }
}

impl From<Vec<ChatMessage>> for ChatContents {
    fn from(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }
}

fn runs_match(left: &[ChatMessage], right: &[ChatMessage]) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .zip(right)
            .all(|(left, right)| left.same_content(right))
}

fn contains_run(haystack: &[ChatMessage], run: &[ChatMessage]) -> bool {
    haystack.windows(run.len()).any(|window| runs_match(window, run))
}

/// Length of the longest suffix of `existing` that is also a prefix of `fresh`.
fn longest_overlap(existing: &[ChatMessage], fresh: &[ChatMessage]) -> usize {
    let max = existing.len().min(fresh.len());
    (1..=max)
        .rev()
        .find(|&size| runs_match(&existing[existing.len() - size..], &fresh[..size]))
        .unwrap_or(0)
}

/// What the backend sees for one request: the transcript and the draft.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypingInfo {
    pub past_messages: ChatContents,
    pub current_typing: String,
}

impl TypingInfo {
    pub fn new(past_messages: ChatContents, current_typing: impl Into<String>) -> Self {
        Self {
            past_messages,
            current_typing: current_typing.into(),
        }
    }

    /// The draft without the word currently being typed.
    pub fn current_typing_trimmed(&self) -> &str {
        let typing = self.current_typing.as_str();
        typing[..typing.len() - trailing_word(typing).len()].trim_end()
    }
}
