//! Per-app strategies that read chat messages out of a screen tree.

use crate::chat::{ChatMessage, Sender};
use crate::tree::{NodeHandle, NodeInfo, Rect, ScreenTree, TreeError};

pub const UNKNOWN_SENDER: &str = "Other";

const NOTIFICATION_ROW_ID: &str = "com.android.systemui:id/expandableNotificationRow";
const NOTIFICATION_TITLE_ID: &str = "android:id/title";
const NOTIFICATION_BODY_IDS: [&str; 3] = [
    "android:id/text",
    "android:id/big_text",
    "android:id/message_text",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extractor {
    /// Message bubbles identified by view id; the sender is inferred from the
    /// side of the screen the bubble sits on.
    ViewIds {
        ids: Vec<String>,
        /// Read the bubble's first child instead of the bubble itself.
        first_child: bool,
    },
    /// Notification shade rows: the row title names the sender.
    Notification,
    /// Items carrying separate sender and body views. Items without a
    /// sender view belong to the previous sender.
    SenderBody {
        item_id: String,
        sender_id: String,
        body_id: String,
    },
    /// Every non-editable text on screen, top to bottom.
    OnScreen,
}

impl Extractor {
    pub fn view_ids(ids: &[&str]) -> Self {
        Extractor::ViewIds {
            ids: ids.iter().map(|id| id.to_string()).collect(),
            first_child: false,
        }
    }

    /// Messages below `source`, oldest first.
    pub fn extract(
        &self,
        tree: &dyn ScreenTree,
        source: NodeHandle,
    ) -> Result<Vec<ChatMessage>, TreeError> {
        let frame = tree.refresh(source)?.bounds;
        let mut positioned = match self {
            Extractor::ViewIds { ids, first_child } => {
                extract_view_ids(tree, source, frame, ids, *first_child)?
            }
            Extractor::Notification => extract_notifications(tree, source)?,
            Extractor::SenderBody {
                item_id,
                sender_id,
                body_id,
            } => extract_sender_body(tree, source, frame, item_id, sender_id, body_id)?,
            Extractor::OnScreen => extract_on_screen(tree, source, frame)?,
        };
        positioned.sort_by_key(|(top, _)| *top);
        Ok(positioned.into_iter().map(|(_, message)| message).collect())
    }
}

type Positioned = Vec<(i32, ChatMessage)>;

/// Outgoing bubbles hug the right edge of the conversation.
fn side_sender(frame: Rect, bubble: Rect) -> Sender {
    let to_right = frame.right - bubble.right;
    let to_left = bubble.left - frame.left;
    if to_right < to_left {
        Sender::Me
    } else {
        Sender::other(UNKNOWN_SENDER)
    }
}

fn text_of(
    tree: &dyn ScreenTree,
    node: NodeHandle,
) -> Result<Option<(NodeInfo, String)>, TreeError> {
    let info = tree.refresh(node)?;
    let text = info.visible_text().map(str::to_string);
    Ok(text.map(|text| (info, text)))
}

fn first_text_with_id(
    tree: &dyn ScreenTree,
    root: NodeHandle,
    view_id: &str,
) -> Result<Option<String>, TreeError> {
    for node in tree.find_by_view_id(root, view_id)? {
        if let Some((_, text)) = text_of(tree, node)? {
            return Ok(Some(text));
        }
    }
    Ok(None)
}

fn extract_view_ids(
    tree: &dyn ScreenTree,
    source: NodeHandle,
    frame: Rect,
    ids: &[String],
    first_child: bool,
) -> Result<Positioned, TreeError> {
    let mut out = Vec::new();
    for id in ids {
        for bubble in tree.find_by_view_id(source, id)? {
            let target = if first_child {
                tree.children(bubble)?.first().copied().unwrap_or(bubble)
            } else {
                bubble
            };
            if let Some((info, text)) = text_of(tree, target)? {
                let sender = side_sender(frame, info.bounds);
                out.push((info.bounds.top, ChatMessage::new(sender, text, "")));
            }
        }
    }
    Ok(out)
}

fn extract_notifications(
    tree: &dyn ScreenTree,
    source: NodeHandle,
) -> Result<Positioned, TreeError> {
    let mut out = Vec::new();
    for row in tree.find_by_view_id(source, NOTIFICATION_ROW_ID)? {
        let title = first_text_with_id(tree, row, NOTIFICATION_TITLE_ID)?
            .unwrap_or_else(|| UNKNOWN_SENDER.to_string());
        for body_id in NOTIFICATION_BODY_IDS {
            for body in tree.find_by_view_id(row, body_id)? {
                if let Some((info, text)) = text_of(tree, body)? {
                    out.push((
                        info.bounds.top,
                        ChatMessage::new(Sender::other(title.clone()), text, ""),
                    ));
                }
            }
        }
    }
    Ok(out)
}

fn extract_sender_body(
    tree: &dyn ScreenTree,
    source: NodeHandle,
    frame: Rect,
    item_id: &str,
    sender_id: &str,
    body_id: &str,
) -> Result<Positioned, TreeError> {
    let mut items = Vec::new();
    for item in tree.find_by_view_id(source, item_id)? {
        items.push((tree.refresh(item)?.bounds, item));
    }
    items.sort_by_key(|(bounds, _)| bounds.top);

    let mut out = Vec::new();
    let mut previous: Option<String> = None;
    for (bounds, item) in items {
        let Some(body) = first_text_with_id(tree, item, body_id)? else {
            continue;
        };
        if let Some(name) = first_text_with_id(tree, item, sender_id)? {
            previous = Some(name);
        }
        let sender = match (side_sender(frame, bounds), &previous) {
            (Sender::Me, _) => Sender::Me,
            (_, Some(name)) => Sender::other(name.clone()),
            (other, None) => other,
        };
        out.push((bounds.top, ChatMessage::new(sender, body, "")));
    }
    Ok(out)
}

fn extract_on_screen(
    tree: &dyn ScreenTree,
    source: NodeHandle,
    frame: Rect,
) -> Result<Positioned, TreeError> {
    let mut out = Vec::new();
    for node in tree.descendants(source)? {
        if node == source {
            continue;
        }
        let info = tree.refresh(node)?;
        if info.editable || info.bounds.is_empty() {
            continue;
        }
        if let Some(text) = info.visible_text() {
            let sender = side_sender(frame, info.bounds);
            out.push((info.bounds.top, ChatMessage::new(sender, text, "")));
        }
    }
    Ok(out)
}
