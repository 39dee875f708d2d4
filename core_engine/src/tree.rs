//! Read-only view of the foreground window's node tree.
//!
//! The platform owns the tree and may invalidate any node at any time, so
//! nodes are addressed through [`NodeHandle`]s carrying a generation. Every
//! read goes through [`ScreenTree::refresh`], which fails with
//! [`TreeError::Stale`] once the node behind a handle is gone.

use std::sync::{PoisonError, RwLock};

use thiserror::Error;

pub const EDIT_TEXT_CLASS: &str = "android.widget.EditText";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    index: u32,
    generation: u32,
}

impl NodeHandle {
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    pub fn center_x(&self) -> i32 {
        (self.left + self.right) / 2
    }

    pub fn center_y(&self) -> i32 {
        (self.top + self.bottom) / 2
    }
}

/// Attributes of a node as of its last refresh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeInfo {
    pub package: String,
    pub class_name: String,
    pub view_id: Option<String>,
    pub text: Option<String>,
    pub content_description: Option<String>,
    pub bounds: Rect,
    pub editable: bool,
    pub input_focused: bool,
    pub showing_hint_text: bool,
    /// Screen boxes of each character of `text`, when the platform reports them.
    pub char_bounds: Vec<Option<Rect>>,
    pub text_size_px: Option<f32>,
}

impl NodeInfo {
    pub fn new(package: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            class_name: class_name.into(),
            ..Self::default()
        }
    }

    pub fn with_view_id(mut self, view_id: impl Into<String>) -> Self {
        self.view_id = Some(view_id.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_bounds(mut self, bounds: Rect) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn focused_input(mut self) -> Self {
        self.editable = true;
        self.input_focused = true;
        self
    }

    /// Visible text, falling back to the content description.
    pub fn visible_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .or(self.content_description.as_deref())
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    pub fn is_edit_text(&self) -> bool {
        self.class_name.contains(EDIT_TEXT_CLASS)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("node {0:?} is no longer part of the screen")]
    Stale(NodeHandle),
    #[error("screen tree is in a transient state: {0}")]
    Transient(String),
}

pub trait ScreenTree: Send + Sync {
    fn root(&self) -> Option<NodeHandle>;

    /// Re-reads a node. A failure means the handle must not be trusted again.
    fn refresh(&self, node: NodeHandle) -> Result<NodeInfo, TreeError>;

    fn children(&self, node: NodeHandle) -> Result<Vec<NodeHandle>, TreeError>;

    /// `node` and everything below it, in pre-order.
    fn descendants(&self, node: NodeHandle) -> Result<Vec<NodeHandle>, TreeError> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            out.push(current);
            let children = self.children(current)?;
            stack.extend(children.into_iter().rev());
        }
        Ok(out)
    }

    fn find_input_focus(&self, root: NodeHandle) -> Result<Option<NodeHandle>, TreeError> {
        for node in self.descendants(root)? {
            if self.refresh(node)?.input_focused {
                return Ok(Some(node));
            }
        }
        Ok(None)
    }

    fn find_by_view_id(
        &self,
        root: NodeHandle,
        view_id: &str,
    ) -> Result<Vec<NodeHandle>, TreeError> {
        let mut found = Vec::new();
        for node in self.descendants(root)? {
            if self.refresh(node)?.view_id.as_deref() == Some(view_id) {
                found.push(node);
            }
        }
        Ok(found)
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<ArenaNode>,
}

#[derive(Debug)]
struct ArenaNode {
    info: NodeInfo,
    parent: Option<NodeHandle>,
    children: Vec<NodeHandle>,
}

#[derive(Debug, Default)]
struct ArenaInner {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: Option<NodeHandle>,
}

impl ArenaInner {
    fn node(&self, handle: NodeHandle) -> Result<&ArenaNode, TreeError> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.node.as_ref())
            .ok_or(TreeError::Stale(handle))
    }

    fn node_mut(&mut self, handle: NodeHandle) -> Result<&mut ArenaNode, TreeError> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or(TreeError::Stale(handle))
    }

    fn release(&mut self, handle: NodeHandle) {
        let children = match self.node(handle) {
            Ok(node) => node.children.clone(),
            Err(_) => return,
        };
        for child in children {
            self.release(child);
        }
        if let Some(slot) = self.slots.get_mut(handle.index as usize) {
            slot.node = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(handle.index);
        }
    }
}

/// In-memory [`ScreenTree`] with generation-checked slots.
///
/// Bridges mirror the platform tree into it; removed nodes bump their slot
/// generation so outstanding handles fail to refresh.
#[derive(Debug, Default)]
pub struct ScreenArena {
    inner: RwLock<ArenaInner>,
}

impl ScreenArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node. Without a parent it replaces the current root, and the old
    /// tree is released.
    pub fn insert(
        &self,
        parent: Option<NodeHandle>,
        info: NodeInfo,
    ) -> Result<NodeHandle, TreeError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(parent) = parent {
            inner.node(parent)?;
        } else if let Some(old_root) = inner.root.take() {
            inner.release(old_root);
        }

        let node = ArenaNode {
            info,
            parent,
            children: Vec::new(),
        };
        let handle = match inner.free.pop() {
            Some(index) => {
                let slot = &mut inner.slots[index as usize];
                slot.node = Some(node);
                NodeHandle::new(index, slot.generation)
            }
            None => {
                let index = inner.slots.len() as u32;
                inner.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeHandle::new(index, 0)
            }
        };

        match parent {
            Some(parent) => inner.node_mut(parent)?.children.push(handle),
            None => inner.root = Some(handle),
        }
        Ok(handle)
    }

    pub fn update(
        &self,
        node: NodeHandle,
        apply: impl FnOnce(&mut NodeInfo),
    ) -> Result<(), TreeError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut inner.node_mut(node)?.info);
        Ok(())
    }

    /// Drops a node and its subtree.
    pub fn remove(&self, node: NodeHandle) -> Result<(), TreeError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let parent = inner.node(node)?.parent;
        match parent {
            Some(parent) => {
                if let Ok(parent) = inner.node_mut(parent) {
                    parent.children.retain(|child| *child != node);
                }
            }
            None => inner.root = None,
        }
        inner.release(node);
        Ok(())
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(root) = inner.root.take() {
            inner.release(root);
        }
    }
}

impl ScreenTree for ScreenArena {
    fn root(&self) -> Option<NodeHandle> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .root
    }

    fn refresh(&self, node: NodeHandle) -> Result<NodeInfo, TreeError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.node(node)?.info.clone())
    }

    fn children(&self, node: NodeHandle) -> Result<Vec<NodeHandle>, TreeError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.node(node)?.children.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_nodes_fail_to_refresh() {
        let arena = ScreenArena::new();
        let root = arena.insert(None, NodeInfo::new("pkg", "FrameLayout")).unwrap();
        let input = arena
            .insert(Some(root), NodeInfo::new("pkg", EDIT_TEXT_CLASS).focused_input())
            .unwrap();
        assert!(arena.refresh(input).is_ok());

        arena.remove(input).unwrap();
        assert_eq!(arena.refresh(input), Err(TreeError::Stale(input)));

        let reused = arena.insert(Some(root), NodeInfo::new("pkg", "TextView")).unwrap();
        assert_eq!(reused.index(), input.index());
        assert_ne!(reused.generation(), input.generation());
        assert!(arena.refresh(input).is_err());
    }

    #[test]
    fn replacing_root_invalidates_old_tree() {
        let arena = ScreenArena::new();
        let root = arena.insert(None, NodeInfo::new("a", "FrameLayout")).unwrap();
        let child = arena.insert(Some(root), NodeInfo::new("a", "TextView")).unwrap();
        let new_root = arena.insert(None, NodeInfo::new("b", "FrameLayout")).unwrap();

        assert_eq!(arena.root(), Some(new_root));
        assert!(arena.refresh(child).is_err());
        assert!(arena.refresh(root).is_err());
    }

    #[test]
    fn searches_by_view_id_and_focus() {
        let arena = ScreenArena::new();
        let root = arena.insert(None, NodeInfo::new("pkg", "FrameLayout")).unwrap();
        let list = arena
            .insert(Some(root), NodeInfo::new("pkg", "ListView").with_view_id("pkg:id/list"))
            .unwrap();
        arena
            .insert(Some(list), NodeInfo::new("pkg", "TextView").with_view_id("pkg:id/msg"))
            .unwrap();
        arena
            .insert(Some(list), NodeInfo::new("pkg", "TextView").with_view_id("pkg:id/msg"))
            .unwrap();
        let input = arena
            .insert(Some(root), NodeInfo::new("pkg", EDIT_TEXT_CLASS).focused_input())
            .unwrap();

        assert_eq!(arena.find_by_view_id(root, "pkg:id/msg").unwrap().len(), 2);
        assert_eq!(arena.find_input_focus(root).unwrap(), Some(input));
    }
}
