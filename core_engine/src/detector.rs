use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::registry::{AppDescriptor, AppRegistry};
use crate::tree::{NodeHandle, NodeInfo, ScreenTree, TreeError};

/// Outcome of one detection pass.
#[derive(Debug, Clone, Default)]
pub struct DetectionResult {
    pub app: Option<Arc<AppDescriptor>>,
    pub input: Option<NodeHandle>,
    pub message_list: Option<NodeHandle>,
}

impl DetectionResult {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn matched(app: Arc<AppDescriptor>, input: NodeHandle, message_list: NodeHandle) -> Self {
        Self {
            app: Some(app),
            input: Some(input),
            message_list: Some(message_list),
        }
    }

    pub fn is_match(&self) -> bool {
        self.app.is_some() && self.input.is_some()
    }
}

/// Decides whether the focused field belongs to a supported chat screen.
///
/// Tree errors fail closed: the next event simply tries again.
pub fn detect(
    tree: &dyn ScreenTree,
    registry: &AppRegistry,
    selected_apps: &HashSet<String>,
) -> DetectionResult {
    match try_detect(tree, registry, selected_apps) {
        Ok(result) => result,
        Err(error) => {
            debug!(%error, "detection skipped");
            DetectionResult::none()
        }
    }
}

fn try_detect(
    tree: &dyn ScreenTree,
    registry: &AppRegistry,
    selected_apps: &HashSet<String>,
) -> Result<DetectionResult, TreeError> {
    let Some(root) = tree.root() else {
        return Ok(DetectionResult::none());
    };
    let Some(focused) = tree.find_input_focus(root)? else {
        return Ok(DetectionResult::none());
    };
    let info = tree.refresh(focused)?;

    if let Some(app) = registry.find(&info.package) {
        if !selected_apps.contains(&app.package) {
            return Ok(DetectionResult::none());
        }
        return Ok(match app.judge_input(tree, root, focused, &info)? {
            Some(message_list) => {
                debug!(package = %app.package, "supported input detected");
                DetectionResult::matched(app.clone(), focused, message_list)
            }
            None => DetectionResult::none(),
        });
    }

    if is_generic_candidate(&info, selected_apps) {
        debug!(package = %info.package, "using on-screen fallback");
        let app = Arc::new(AppDescriptor::generic(&info.package));
        return Ok(DetectionResult::matched(app, focused, root));
    }

    Ok(DetectionResult::none())
}

fn is_generic_candidate(info: &NodeInfo, selected_apps: &HashSet<String>) -> bool {
    selected_apps.contains(&info.package) && info.is_edit_text()
}
