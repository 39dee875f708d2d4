use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use coreply_core::text::collapse_whitespace;
use coreply_core::{ChatMessage, TypingInfo};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::SuggestionBackend;
use crate::config::ApiConfig;

/// The coreply hosted completion service.
pub struct HostedBackend {
    client: Client,
}

impl HostedBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn wire_role(message: &ChatMessage) -> &'static str {
    if message.is_mine() {
        "sent"
    } else {
        "received"
    }
}

fn build_request(typing: &TypingInfo) -> HostedRequest {
    HostedRequest {
        typing: collapse_whitespace(&typing.current_typing),
        action: "completion",
        messages: typing
            .past_messages
            .messages()
            .iter()
            .map(|message| HostedMessage {
                role: wire_role(message),
                content: message.text.clone(),
            })
            .collect(),
    }
}

/// The service answers `{"completion": ...}` or `{"message": <error>}`.
fn parse_response(body: &str) -> Result<String> {
    let parsed: HostedResponse =
        serde_json::from_str(body).context("invalid hosted response format")?;
    match parsed {
        HostedResponse {
            completion: Some(completion),
            ..
        } => Ok(completion.trim_end().trim_end_matches('>').trim_end().to_string()),
        HostedResponse {
            message: Some(message),
            ..
        } => Err(anyhow!("hosted service rejected request: {message}")),
        _ => Err(anyhow!("hosted service returned neither completion nor message")),
    }
}

#[async_trait]
impl SuggestionBackend for HostedBackend {
    async fn request_completion(&self, typing: &TypingInfo, api: &ApiConfig) -> Result<String> {
        let response = self
            .client
            .post(&api.hosted_endpoint)
            .bearer_auth(&api.hosted_key)
            .json(&build_request(typing))
            .send()
            .await
            .context("failed to call hosted completion service")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("failed to read hosted response body")?;

        match parse_response(&body) {
            Ok(completion) => Ok(completion),
            Err(error) if status.is_success() => Err(error),
            Err(error) => Err(error.context(format!("hosted service failed ({status})"))),
        }
    }
}

#[derive(Debug, Serialize)]
struct HostedRequest {
    typing: String,
    action: &'static str,
    messages: Vec<HostedMessage>,
}

#[derive(Debug, Serialize)]
struct HostedMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct HostedResponse {
    #[serde(default)]
    completion: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use coreply_core::{ChatContents, Sender};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn request_maps_senders_to_wire_roles() {
        let transcript = ChatContents::from(vec![
            ChatMessage::new(Sender::other("Sam"), "Hey, dinner tonight?", ""),
            ChatMessage::new(Sender::Me, "sure", ""),
        ]);
        let request = build_request(&TypingInfo::new(transcript, "what  time"));
        assert_eq!(
            serde_json::to_value(request).unwrap(),
            json!({
                "typing": "what time",
                "action": "completion",
                "messages": [
                    {"role": "received", "content": "Hey, dinner tonight?"},
                    {"role": "sent", "content": "sure"},
                ],
            })
        );
    }

    #[test]
    fn completion_loses_trailing_markers() {
        assert_eq!(
            parse_response(r#"{"completion":" works for you?>> "}"#).unwrap(),
            " works for you?"
        );
    }

    #[test]
    fn service_message_becomes_error() {
        let error = parse_response(r#"{"message":"quota exceeded"}"#).unwrap_err();
        assert!(error.to_string().contains("quota exceeded"));
        assert!(parse_response("{}").is_err());
    }
}
