/// Punctuation that closes a clause. Used both for cache keys and for
/// splitting suggestions into incremental tokens.
pub const PUNCTUATIONS: [char; 20] = [
    '!', '"', ')', ',', '.', ':', ';', '?', ']', '~',
    '，', '。', '：', '；', '？', '）', '】', '！', '、', '」',
];

const ECHO_LABELS: [&str; 2] = ["Message I sent: ", "Message I received: "];

pub fn is_punctuation(ch: char) -> bool {
    PUNCTUATIONS.contains(&ch)
}

pub fn ends_with_punctuation(text: &str) -> bool {
    text.chars().next_back().is_some_and(is_punctuation)
}

/// Collapses every whitespace run into a single ASCII space.
pub fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_run = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !in_run {
                out.push(' ');
            }
            in_run = true;
        } else {
            out.push(ch);
            in_run = false;
        }
    }
    out
}

/// Models sometimes echo the transcript label they were prompted with.
pub fn strip_echo_label(text: &str) -> &str {
    ECHO_LABELS
        .iter()
        .find_map(|label| text.strip_prefix(label))
        .unwrap_or(text)
}

/// Whitespace-collapsed text without a leading transcript label.
pub fn normalize_reply(text: &str) -> String {
    strip_echo_label(&collapse_whitespace(text)).to_string()
}

/// Case-insensitive `strip_prefix`. Returns the rest of `text` after `prefix`.
pub fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let mut rest = text.char_indices();
    for expected in prefix.chars() {
        let (_, actual) = rest.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }
    match rest.next() {
        Some((offset, _)) => Some(&text[offset..]),
        None => Some(""),
    }
}

/// Splits before every punctuation mark, keeping the mark with the text that
/// follows it. A trailing lone mark is folded into the previous piece.
///
/// `"time, works for you?"` -> `["time", ", works for you?"]`
pub fn split_keep_punctuation(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if is_punctuation(ch) && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    if !current.is_empty() {
        parts.push(current);
    }

    if parts.len() >= 2 {
        let last = &parts[parts.len() - 1];
        let mut chars = last.chars();
        if let (Some(only), None) = (chars.next(), chars.next()) {
            if is_punctuation(only) {
                parts.pop();
                if let Some(previous) = parts.last_mut() {
                    previous.push(only);
                }
            }
        }
    }
    parts
}

/// The word being typed at the end of `text`, split on spaces. Empty when the
/// text ends with a space.
pub fn trailing_word(text: &str) -> &str {
    match text.rfind(' ') {
        Some(position) => &text[position + 1..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn splits_before_punctuation_and_merges_tail() {
        assert_eq!(
            split_keep_punctuation("Sounds good, see you at 7."),
            vec!["Sounds good".to_string(), ", see you at 7.".to_string()]
        );
        assert_eq!(split_keep_punctuation("wow!!"), vec!["wow".to_string(), "!!".to_string()]);
        assert_eq!(split_keep_punctuation("."), vec![".".to_string()]);
        assert!(split_keep_punctuation("").is_empty());
    }

    #[test]
    fn strips_prefix_without_case() {
        assert_eq!(strip_prefix_ignore_case("Sure, What time", "sure, what"), Some(" time"));
        assert_eq!(strip_prefix_ignore_case("Sure", "sure"), Some(""));
        assert_eq!(strip_prefix_ignore_case("Sur", "sure"), None);
        assert_eq!(strip_prefix_ignore_case("好的，明天见", "好的"), Some("，明天见"));
    }

    #[test]
    fn normalizes_echoed_replies() {
        assert_eq!(normalize_reply("Message I sent: ok  see\nyou"), "ok see you");
        assert_eq!(collapse_whitespace(" a\t\tb "), " a b ");
    }

    #[test]
    fn finds_trailing_word() {
        assert_eq!(trailing_word("Sure, what t"), "t");
        assert_eq!(trailing_word("Sure, what "), "");
        assert_eq!(trailing_word("hello"), "hello");
    }
}
