use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use coreply_core::text::collapse_whitespace;
use coreply_core::TypingInfo;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::SuggestionBackend;
use crate::config::ApiConfig;

const MAX_TOKENS: u32 = 1000;

/// OpenAI-compatible `chat/completions` endpoint.
pub struct ChatBackend {
    client: Client,
}

impl ChatBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn build_user_prompt(typing: &TypingInfo) -> String {
    let mut prompt = format!(
        "Given this chat history\n{}\nIn addition to the message I sent,\nWhat else should I send? Or start a new topic?",
        typing.past_messages.coreply2_format()
    );
    if !typing.current_typing.trim().is_empty() {
        prompt.push_str(&format!(
            "The reply should start with '{}'\n",
            collapse_whitespace(&typing.current_typing)
        ));
    }
    prompt
}

fn build_request(typing: &TypingInfo, api: &ApiConfig) -> ChatRequest {
    ChatRequest {
        model: api.model.clone(),
        temperature: api.temperature,
        top_p: api.top_p,
        max_tokens: MAX_TOKENS,
        messages: vec![
            ChatRequestMessage {
                role: "system".to_string(),
                content: api.effective_system_prompt().to_string(),
            },
            ChatRequestMessage {
                role: "user".to_string(),
                content: build_user_prompt(typing),
            },
        ],
    }
}

fn parse_response(body: &str) -> Result<String> {
    let parsed: ChatResponse =
        serde_json::from_str(body).context("invalid chat completion response format")?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("chat completion returned no choices"))?;
    Ok(choice.message.content.unwrap_or_default().trim().to_string())
}

#[async_trait]
impl SuggestionBackend for ChatBackend {
    async fn request_completion(&self, typing: &TypingInfo, api: &ApiConfig) -> Result<String> {
        let endpoint = format!("{}chat/completions", api.base_url());
        let response = self
            .client
            .post(endpoint)
            .bearer_auth(&api.key)
            .header("HTTP-Referer", "https://coreply.app")
            .header("X-Title", "Coreply: Autocomplete for Texting")
            .json(&build_request(typing, api))
            .send()
            .await
            .context("failed to call chat completion API")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("failed to read chat completion response body")?;

        if !status.is_success() {
            return Err(anyhow!("chat completion API failed ({status}): {body}"));
        }
        parse_response(&body)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    messages: Vec<ChatRequestMessage>,
}

#[derive(Debug, Serialize)]
struct ChatRequestMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use coreply_core::{ChatContents, ChatMessage, Sender};
    use pretty_assertions::assert_eq;

    fn typing(draft: &str) -> TypingInfo {
        let transcript = ChatContents::from(vec![
            ChatMessage::new(Sender::other("Sam"), "Hey, dinner tonight?", ""),
            ChatMessage::new(Sender::Me, "maybe", ""),
        ]);
        TypingInfo::new(transcript, draft)
    }

    #[test]
    fn prompt_carries_history_and_draft() {
        let prompt = build_user_prompt(&typing("Sure,   what t"));
        assert_eq!(
            prompt,
            "Given this chat history\nMessage I received:\nHey, dinner tonight?\nMessage I sent:\nmaybe\n\nIn addition to the message I sent,\nWhat else should I send? Or start a new topic?The reply should start with 'Sure, what t'\n"
        );
    }

    #[test]
    fn blank_draft_adds_no_constraint() {
        let prompt = build_user_prompt(&typing("  "));
        assert!(prompt.ends_with("Or start a new topic?"));
    }

    #[test]
    fn request_uses_configured_sampling() {
        let request = build_request(&typing(""), &ApiConfig::default());
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4.1-mini");
        assert_eq!(json["max_tokens"], 1000);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
    }

    #[test]
    fn parses_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  time works for you? "}}]}"#;
        assert_eq!(parse_response(body).unwrap(), "time works for you?");
        assert!(parse_response(r#"{"choices":[]}"#).is_err());
        assert!(parse_response("not json").is_err());
    }
}
