//! Fakes shared by the service tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use coreply_core::geometry::Anchor;
use coreply_core::tree::EDIT_TEXT_CLASS;
use coreply_core::{NodeHandle, NodeInfo, Rect, ScreenArena, TypingInfo};

use crate::backend::SuggestionBackend;
use crate::config::ApiConfig;
use crate::overlay::{OverlayContent, OverlaySink};

pub const CHAT_PACKAGE: &str = "com.whatsapp";
const ENTRY_ID: &str = "com.whatsapp:id/entry";
const MESSAGE_ID: &str = "com.whatsapp:id/message_text";

pub fn selected() -> HashSet<String> {
    HashSet::from([CHAT_PACKAGE.to_string()])
}

pub struct ScriptedBackend {
    reply: Result<String, String>,
    delay: Duration,
    calls: Mutex<Vec<TypingInfo>>,
}

impl ScriptedBackend {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            delay: Duration::from_millis(50),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            ..Self::replying("")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<TypingInfo> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SuggestionBackend for ScriptedBackend {
    async fn request_completion(&self, typing: &TypingInfo, _api: &ApiConfig) -> Result<String> {
        self.calls.lock().unwrap().push(typing.clone());
        tokio::time::sleep(self.delay).await;
        self.reply.clone().map_err(|message| anyhow!(message))
    }
}

#[derive(Default)]
pub struct RecordingSink {
    shown: Mutex<Vec<OverlayContent>>,
    anchors: Mutex<Vec<Anchor>>,
}

impl RecordingSink {
    pub fn shown(&self) -> Vec<OverlayContent> {
        self.shown.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<OverlayContent> {
        self.shown.lock().unwrap().last().cloned()
    }

    pub fn anchors(&self) -> Vec<Anchor> {
        self.anchors.lock().unwrap().clone()
    }
}

impl OverlaySink for RecordingSink {
    fn show(&self, content: OverlayContent) {
        self.shown.lock().unwrap().push(content);
    }

    fn place(&self, anchor: Anchor) {
        self.anchors.lock().unwrap().push(anchor);
    }
}

/// A chat screen with one received message and a focused compose field.
pub struct ChatScreen {
    pub arena: Arc<ScreenArena>,
    pub root: NodeHandle,
    pub input: NodeHandle,
}

impl ChatScreen {
    pub fn new(draft: &str) -> Self {
        let arena = ScreenArena::new();
        let root = arena
            .insert(
                None,
                NodeInfo::new(CHAT_PACKAGE, "FrameLayout").with_bounds(Rect::new(0, 0, 1080, 2000)),
            )
            .unwrap();
        arena
            .insert(
                Some(root),
                NodeInfo::new(CHAT_PACKAGE, "TextView")
                    .with_view_id(MESSAGE_ID)
                    .with_text("Hey, dinner tonight?")
                    .with_bounds(Rect::new(40, 300, 500, 360)),
            )
            .unwrap();
        let input = arena
            .insert(
                Some(root),
                NodeInfo::new(CHAT_PACKAGE, EDIT_TEXT_CLASS)
                    .with_view_id(ENTRY_ID)
                    .with_bounds(Rect::new(100, 1800, 900, 1900))
                    .focused_input(),
            )
            .unwrap();
        let screen = Self {
            arena: Arc::new(arena),
            root,
            input,
        };
        screen.type_draft(draft);
        screen
    }

    /// Sets the field text the way a keyboard would, including per-character
    /// boxes and the hint flag.
    pub fn type_draft(&self, draft: &str) {
        self.arena
            .update(self.input, |info| {
                info.showing_hint_text = draft.is_empty();
                info.text = Some(draft.to_string());
                info.char_bounds = (0..draft.chars().count() as i32)
                    .map(|index| Some(Rect::new(110 + index * 20, 1820, 130 + index * 20, 1870)))
                    .collect();
            })
            .unwrap();
    }

    pub fn add_message(&self, text: &str, top: i32) {
        self.arena
            .insert(
                Some(self.root),
                NodeInfo::new(CHAT_PACKAGE, "TextView")
                    .with_view_id(MESSAGE_ID)
                    .with_text(text)
                    .with_bounds(Rect::new(40, top, 500, top + 60)),
            )
            .unwrap();
    }
}
