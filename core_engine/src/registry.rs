use std::sync::Arc;

use crate::extract::Extractor;
use crate::geometry::is_content_above_input;
use crate::tree::{NodeHandle, NodeInfo, ScreenTree, TreeError};

pub const CONTENT_CONTAINER_ID: &str = "android:id/content";

/// How a supported app's compose field is recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputRule {
    /// The focused field has this view id.
    ViewId(String),
    /// Any of these views is on screen.
    AnyViewPresent(Vec<String>),
    /// Any focused field of the package.
    PackageOnly,
    /// Apps that reuse a generic field id everywhere: exactly one content
    /// container of the same package must sit above the focused field.
    ContentAboveInput { require_edit_text: bool },
    /// Synthesized for user-selected apps without a descriptor.
    Always,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDescriptor {
    pub package: String,
    pub input_rule: InputRule,
    /// Views whose presence means the screen is not a compose screen, e.g. a
    /// message-selection toolbar.
    pub excluded_widget_ids: Vec<String>,
    pub extractor: Extractor,
}

impl AppDescriptor {
    pub fn new(package: &str, input_rule: InputRule, extractor: Extractor) -> Self {
        Self {
            package: package.to_string(),
            input_rule,
            excluded_widget_ids: Vec::new(),
            extractor,
        }
    }

    fn excluding(mut self, ids: &[&str]) -> Self {
        self.excluded_widget_ids = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    /// Descriptor for a selected app that has no dedicated support.
    pub fn generic(package: &str) -> Self {
        Self::new(package, InputRule::Always, Extractor::OnScreen)
    }

    /// Evaluates the input rule against the focused field. Returns the node
    /// messages should be read from, or `None` to deny.
    pub fn judge_input(
        &self,
        tree: &dyn ScreenTree,
        root: NodeHandle,
        focused: NodeHandle,
        focused_info: &NodeInfo,
    ) -> Result<Option<NodeHandle>, TreeError> {
        for excluded in &self.excluded_widget_ids {
            if !tree.find_by_view_id(root, excluded)?.is_empty() {
                return Ok(None);
            }
        }

        let matched = match &self.input_rule {
            InputRule::ViewId(id) => {
                (focused_info.view_id.as_deref() == Some(id.as_str())).then_some(root)
            }
            InputRule::AnyViewPresent(ids) => {
                let mut present = false;
                for id in ids {
                    if !tree.find_by_view_id(root, id)?.is_empty() {
                        present = true;
                        break;
                    }
                }
                present.then_some(root)
            }
            InputRule::PackageOnly | InputRule::Always => Some(root),
            InputRule::ContentAboveInput { require_edit_text } => {
                if *require_edit_text && !focused_info.is_edit_text() {
                    return Ok(None);
                }
                self.content_above(tree, root, focused, focused_info)?
            }
        };
        Ok(matched)
    }

    fn content_above(
        &self,
        tree: &dyn ScreenTree,
        root: NodeHandle,
        focused: NodeHandle,
        focused_info: &NodeInfo,
    ) -> Result<Option<NodeHandle>, TreeError> {
        let containers = tree.find_by_view_id(root, CONTENT_CONTAINER_ID)?;
        // More than one candidate is ambiguous and treated as no match.
        let [container] = containers.as_slice() else {
            return Ok(None);
        };
        if *container == focused {
            return Ok(None);
        }
        let content = tree.refresh(*container)?;
        let same_package = content.package == self.package && focused_info.package == self.package;
        if same_package && is_content_above_input(content.bounds, focused_info.bounds) {
            Ok(Some(*container))
        } else {
            Ok(None)
        }
    }
}

/// Supported apps, looked up by exact package name.
#[derive(Debug, Clone, Default)]
pub struct AppRegistry {
    apps: Vec<Arc<AppDescriptor>>,
}

impl AppRegistry {
    pub fn new(apps: Vec<AppDescriptor>) -> Self {
        Self {
            apps: apps.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn find(&self, package: &str) -> Option<&Arc<AppDescriptor>> {
        self.apps.iter().find(|app| app.package == package)
    }

    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.apps.iter().map(|app| app.package.as_str())
    }

    pub fn builtin() -> Self {
        let view_id = |id: &str| InputRule::ViewId(id.to_string());
        let structural = InputRule::ContentAboveInput {
            require_edit_text: true,
        };

        Self::new(vec![
            AppDescriptor::new(
                "com.whatsapp",
                view_id("com.whatsapp:id/entry"),
                Extractor::view_ids(&["com.whatsapp:id/message_text", "com.whatsapp:id/caption"]),
            )
            .excluding(&["com.whatsapp:id/menuitem_delete"]),
            AppDescriptor::new(
                "com.whatsapp.w4b",
                view_id("com.whatsapp.w4b:id/entry"),
                Extractor::view_ids(&[
                    "com.whatsapp.w4b:id/message_text",
                    "com.whatsapp.w4b:id/caption",
                ]),
            )
            .excluding(&["com.whatsapp.w4b:id/menuitem_delete"]),
            AppDescriptor::new(
                "jp.naver.line.android",
                view_id("jp.naver.line.android:id/chat_ui_message_edit"),
                Extractor::view_ids(&["jp.naver.line.android:id/chat_ui_message_text"]),
            ),
            AppDescriptor::new(
                "com.instagram.android",
                view_id("com.instagram.android:id/row_thread_composer_edittext"),
                Extractor::view_ids(&["com.instagram.android:id/direct_text_message_text_view"]),
            ),
            AppDescriptor::new(
                "org.thoughtcrime.securesms",
                view_id("org.thoughtcrime.securesms:id/embedded_text_editor"),
                Extractor::view_ids(&["org.thoughtcrime.securesms:id/conversation_item_body"]),
            ),
            AppDescriptor::new(
                "co.hinge.app",
                view_id("co.hinge.app:id/messageComposition"),
                Extractor::view_ids(&["co.hinge.app:id/chatBubble"]),
            ),
            AppDescriptor::new(
                "com.tinder",
                view_id("com.tinder:id/textMessageInput"),
                Extractor::view_ids(&["com.tinder:id/chatTextMessageContent"]),
            ),
            AppDescriptor::new(
                "com.vr.heymandi",
                view_id("com.vr.heymandi:id/messageInput"),
                Extractor::view_ids(&["com.vr.heymandi:id/messageText"]),
            ),
            AppDescriptor::new(
                "com.google.android.gm",
                view_id("com.google.android.gm:id/inline_reply_compose_edit_text"),
                Extractor::view_ids(&[
                    "com.google.android.gm:id/subject_and_folder_view",
                    "com.google.android.gm:id/email_snippet",
                ]),
            ),
            AppDescriptor::new(
                "com.android.systemui",
                InputRule::AnyViewPresent(vec![
                    "com.android.systemui:id/expandableNotificationRow".to_string(),
                    "com.android.systemui:id/expanded".to_string(),
                ]),
                Extractor::Notification,
            ),
            AppDescriptor::new("org.telegram.messenger", structural.clone(), Extractor::OnScreen),
            AppDescriptor::new(
                "org.telegram.messenger.web",
                structural.clone(),
                Extractor::OnScreen,
            ),
            AppDescriptor::new("tw.nekomimi.nekogram", structural, Extractor::OnScreen),
            AppDescriptor::new(
                "com.beeper.android",
                InputRule::ContentAboveInput {
                    require_edit_text: false,
                },
                Extractor::OnScreen,
            ),
            AppDescriptor::new("com.facebook.orca", InputRule::PackageOnly, Extractor::OnScreen),
            AppDescriptor::new(
                "com.mattermost.rn",
                view_id("channel.post_draft.post.input"),
                Extractor::SenderBody {
                    item_id: "channel.post_list.post".to_string(),
                    sender_id: "channel.post_list.post.header.display_name".to_string(),
                    body_id: "channel.post_list.post.message".to_string(),
                },
            ),
            AppDescriptor::new(
                "com.google.android.apps.messaging",
                view_id("com.google.android.apps.messaging:id/compose_message_text"),
                Extractor::view_ids(&["com.google.android.apps.messaging:id/message_text"]),
            ),
            AppDescriptor::new(
                "com.snapchat.android",
                view_id("com.snapchat.android:id/chat_input_text_field"),
                Extractor::OnScreen,
            ),
            AppDescriptor::new(
                "com.microsoft.teams",
                view_id("com.microsoft.teams:id/message_area_edit_text"),
                Extractor::view_ids(&["com.microsoft.teams:id/rich_text_layout"]),
            ),
            AppDescriptor::new(
                "com.viber.voip",
                view_id("com.viber.voip:id/send_text"),
                Extractor::view_ids(&["com.viber.voip:id/textMessageView"]),
            ),
            AppDescriptor::new(
                "com.discord",
                view_id("com.discord:id/chat_input_edit_text"),
                Extractor::ViewIds {
                    ids: vec!["com.discord:id/accessories_view".to_string()],
                    first_child: true,
                },
            ),
        ])
    }
}
