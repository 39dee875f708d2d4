use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::chat::TypingInfo;
use crate::text::{
    collapse_whitespace, ends_with_punctuation, is_punctuation, normalize_reply,
    split_keep_punctuation, strip_prefix_ignore_case, trailing_word,
};

/// Key under which a typed prefix is stored: punctuation and whitespace
/// removed, lowercased, with a `-` marker when the text ended in punctuation
/// so that `"hello."` and `"hello"` stay distinct.
pub fn prefix_key(text: &str) -> String {
    let trimmed = text.trim();
    let mut key: String = trimmed
        .chars()
        .filter(|ch| !is_punctuation(*ch) && !ch.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    if !trimmed.is_empty() && ends_with_punctuation(text) {
        key.push('-');
    }
    key
}

/// Whether `full` is a continuation of `draft` once both are normalized.
pub fn extends_draft(full: &str, draft: &str) -> bool {
    strip_prefix_ignore_case(&normalize_reply(full), &normalize_reply(draft)).is_some()
}

/// Cleans raw backend output: line breaks become spaces, a leading space is
/// kept as exactly one, trailing whitespace is dropped.
pub fn clean_completion(raw: &str) -> String {
    let flattened = raw.replace('\n', " ");
    if flattened.starts_with(' ') {
        format!(" {}", flattened.trim())
    } else {
        flattened.trim_end().to_string()
    }
}

/// Turns what a backend returned into a full message that starts with the
/// draft. Backends either echo the whole message, restate the word being
/// typed, or return only the continuation.
pub fn full_suggestion(draft: &str, completion: &str) -> String {
    if extends_draft(completion, draft) {
        return completion.to_string();
    }

    let partial = trailing_word(draft);
    let restates_partial = !partial.is_empty()
        && !completion.starts_with(char::is_whitespace)
        && strip_prefix_ignore_case(completion, partial).is_some();
    if restates_partial {
        let stem = &draft[..draft.len() - partial.len()];
        return format!("{stem}{completion}");
    }

    format!("{draft}{completion}")
}

/// Maps normalized typed prefixes to predicted continuations.
///
/// Entries are only ever inserted when absent: a user may still be typing
/// along a cached path and replacing it would make the overlay flicker.
#[derive(Debug)]
pub struct SuggestionCache {
    capacity: usize,
    entries: HashMap<String, String>,
    order: VecDeque<String>,
}

impl SuggestionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    fn insert_if_absent(&mut self, key: String, continuation: String) -> bool {
        if self.capacity == 0 || continuation.is_empty() || self.entries.contains_key(&key) {
            return false;
        }
        if self.entries.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, continuation);
        true
    }

    /// Continuation for `typed`, served from the longest stored prefix whose
    /// continuation is still consistent with what was typed after it.
    pub fn lookup(&self, typed: &str) -> Option<String> {
        if typed.trim().is_empty() {
            return self.get("").map(str::to_string);
        }

        let ends = typed
            .char_indices()
            .map(|(offset, _)| offset)
            .chain(std::iter::once(typed.len()));
        let ends: Vec<usize> = ends.collect();

        for &end in ends.iter().rev() {
            let candidate = &typed[..end];
            let Some(continuation) = self.get(&prefix_key(candidate)) else {
                continue;
            };
            // Keys drop trailing spaces, so this entry may belong to the
            // unspaced prefix. Those continuations open with a space or a mark.
            if candidate.ends_with(char::is_whitespace)
                && continuation.starts_with(|ch: char| ch.is_whitespace() || is_punctuation(ch))
            {
                continue;
            }
            let remainder = &typed[end..];
            if let Some(rest) = continuation.strip_prefix(remainder) {
                if !rest.is_empty() {
                    return Some(rest.to_string());
                }
            }
        }
        None
    }

    /// Stores every incremental prefix of `full_suggestion` beyond the draft
    /// in `typing`. Returns `false` when the suggestion does not extend the
    /// draft and nothing was stored.
    pub fn populate(&mut self, typing: &TypingInfo, full_suggestion: &str) -> bool {
        let typed = normalize_reply(&typing.current_typing);
        let suggestion = normalize_reply(full_suggestion);
        let Some(continuation) = strip_prefix_ignore_case(&suggestion, &typed) else {
            debug!(
                draft = %typing.current_typing,
                suggestion = %full_suggestion,
                "suggestion does not extend draft"
            );
            return false;
        };

        let tokens = split_keep_punctuation(continuation);
        let mut prefix = collapse_whitespace(&typing.current_typing);
        for pair in tokens.windows(2) {
            prefix.push_str(&pair[0]);
            self.insert_if_absent(prefix_key(&prefix), pair[1].clone());
        }
        if let Some(first) = tokens.first() {
            self.insert_if_absent(prefix_key(&typing.current_typing), first.clone());
        }
        debug!(tokens = tokens.len(), entries = self.entries.len(), "cached suggestion");
        true
    }
}
