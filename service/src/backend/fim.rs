use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use coreply_core::text::collapse_whitespace;
use coreply_core::TypingInfo;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::SuggestionBackend;
use crate::config::ApiConfig;

const MAX_TOKENS: u32 = 100;
const CALL_CLOSE: &str = "\")";

/// Fill-in-the-middle `completions` endpoint. The conversation is rendered as
/// a mock script and the model completes the open `send_message("` call.
pub struct FimBackend {
    client: Client,
}

impl FimBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn build_prompt(typing: &TypingInfo) -> String {
    format!(
        "# Mocking a texting conversation. Messages never repeat. send_message() sends a message. mock_received() means receiving a message from others.\n# Start of Chat History\n{}\n# Craft a new text\nsend_message(\"{}",
        typing.past_messages.fim_format(),
        collapse_whitespace(&typing.current_typing)
    )
}

fn build_request(typing: &TypingInfo, api: &ApiConfig) -> FimRequest {
    FimRequest {
        model: api.model.clone(),
        temperature: api.temperature,
        top_p: api.top_p,
        max_tokens: MAX_TOKENS,
        stream: false,
        stop: CALL_CLOSE.to_string(),
        suffix: CALL_CLOSE.to_string(),
        prompt: build_prompt(typing),
    }
}

/// Returns the whole message: the draft followed by the generated middle.
fn parse_response(body: &str, typing: &TypingInfo) -> Result<String> {
    let parsed: FimResponse =
        serde_json::from_str(body).context("invalid fim response format")?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("fim completion returned no choices"))?;
    // Some servers answer in the chat shape even on this endpoint.
    let middle = choice
        .text
        .or_else(|| choice.message.and_then(|message| message.content))
        .ok_or_else(|| anyhow!("fim completion carried no text"))?;
    let draft = collapse_whitespace(&typing.current_typing);
    Ok(format!("{draft}{middle}").trim().to_string())
}

#[async_trait]
impl SuggestionBackend for FimBackend {
    async fn request_completion(&self, typing: &TypingInfo, api: &ApiConfig) -> Result<String> {
        let endpoint = format!("{}completions", api.base_url());
        let response = self
            .client
            .post(endpoint)
            .bearer_auth(&api.key)
            .json(&build_request(typing, api))
            .send()
            .await
            .context("failed to call fim completion API")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("failed to read fim response body")?;

        if !status.is_success() {
            return Err(anyhow!("fim completion API failed ({status}): {body}"));
        }
        parse_response(&body, typing)
    }
}

#[derive(Debug, Serialize)]
struct FimRequest {
    model: String,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    stream: bool,
    stop: String,
    suffix: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct FimResponse {
    choices: Vec<FimChoice>,
}

#[derive(Debug, Deserialize)]
struct FimChoice {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    message: Option<FimChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct FimChoiceMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use coreply_core::{ChatContents, ChatMessage, Sender};
    use pretty_assertions::assert_eq;

    fn typing(draft: &str) -> TypingInfo {
        let transcript = ChatContents::from(vec![ChatMessage::new(
            Sender::other("Sam"),
            "Hey, dinner tonight?",
            "",
        )]);
        TypingInfo::new(transcript, draft)
    }

    #[test]
    fn prompt_opens_send_message_call() {
        let prompt = build_prompt(&typing("Sure,\nwhat t"));
        assert!(prompt.contains("mock_received(\"Hey, dinner tonight?\")\n\n# Craft a new text\n"));
        assert!(prompt.ends_with("send_message(\"Sure, what t"));
    }

    #[test]
    fn request_stops_at_call_close() {
        let json = serde_json::to_value(build_request(&typing(""), &ApiConfig::default())).unwrap();
        assert_eq!(json["stop"], "\")");
        assert_eq!(json["suffix"], "\")");
        assert_eq!(json["max_tokens"], 100);
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn response_is_prefixed_with_draft() {
        let body = r#"{"choices":[{"text":"ime works for you? "}]}"#;
        assert_eq!(
            parse_response(body, &typing("Sure, what t")).unwrap(),
            "Sure, what time works for you?"
        );

        let chat_shaped = r#"{"choices":[{"message":{"content":"ime works"}}]}"#;
        assert_eq!(
            parse_response(chat_shaped, &typing("Sure, what t")).unwrap(),
            "Sure, what time works"
        );
        assert!(parse_response(r#"{"choices":[{}]}"#, &typing("x")).is_err());
    }
}
