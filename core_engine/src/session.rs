use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::cache::{extends_draft, SuggestionCache};
use crate::chat::{ChatContents, TypingInfo};
use crate::detector::DetectionResult;
use crate::extract::Extractor;
use crate::geometry::{measure_anchor, Anchor, InputStatus};
use crate::registry::AppDescriptor;
use crate::tree::{NodeHandle, ScreenTree};

/// Placeholder some apps report as the field text while it is empty.
const COMPOSE_PLACEHOLDER: &str = "Compose Message";

/// A draft snapshot bound to the session it was taken from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionTicket {
    pub generation: u64,
    pub typing: TypingInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Cached; carries the suggestion for the live draft, if any.
    Applied(Option<String>),
    /// The session was reset or the draft moved past the response.
    Stale,
    /// The response does not extend the draft it was requested for.
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptUpdate {
    /// The message-list node is gone and the session was reset.
    Invalid,
    Unchanged,
    /// The transcript changed and cached suggestions were dropped.
    Changed { draft_is_empty: bool },
}

#[derive(Debug)]
struct SessionState {
    generation: u64,
    running: bool,
    app: Option<Arc<AppDescriptor>>,
    input: Option<NodeHandle>,
    message_list: Option<NodeHandle>,
    transcript: ChatContents,
    cache: SuggestionCache,
    current_typing: Option<String>,
    status: InputStatus,
}

impl SessionState {
    fn reset(&mut self) {
        self.generation += 1;
        self.app = None;
        self.input = None;
        self.message_list = None;
        self.transcript.clear();
        self.cache.clear();
        self.current_typing = None;
        self.status = InputStatus::Unknown;
    }
}

/// State of the tracked input session. Every transition happens under one
/// lock because accessibility callbacks and background lanes overlap.
#[derive(Debug)]
pub struct ScreenContext {
    state: Mutex<SessionState>,
}

impl ScreenContext {
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            state: Mutex::new(SessionState {
                generation: 0,
                running: false,
                app: None,
                input: None,
                message_list: None,
                transcript: ChatContents::new(),
                cache: SuggestionCache::new(cache_capacity),
                current_typing: None,
                status: InputStatus::Unknown,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn current_app(&self) -> Option<Arc<AppDescriptor>> {
        self.lock().app.clone()
    }

    pub fn current_typing(&self) -> Option<String> {
        self.lock().current_typing.clone()
    }

    pub fn transcript(&self) -> ChatContents {
        self.lock().transcript.clone()
    }

    /// The tracked app and nodes, as a detection result.
    pub fn tracked(&self) -> DetectionResult {
        let state = self.lock();
        DetectionResult {
            app: state.app.clone(),
            input: state.input,
            message_list: state.message_list,
        }
    }

    /// Starts or continues tracking a detected input. Switching apps resets
    /// the session first.
    pub fn enable(&self, detection: &DetectionResult) -> bool {
        let (Some(app), Some(input)) = (&detection.app, detection.input) else {
            return false;
        };
        let mut state = self.lock();
        let switched = state
            .app
            .as_ref()
            .is_some_and(|current| current.package != app.package);
        if switched {
            debug!(package = %app.package, "app switched, resetting session");
            state.reset();
        }
        state.running = true;
        state.app = Some(app.clone());
        state.input = Some(input);
        state.message_list = detection.message_list;
        true
    }

    /// Confirms the tracked input still exists. A failed refresh resets the
    /// session.
    pub fn refresh_input(&self, tree: &dyn ScreenTree) -> bool {
        let mut state = self.lock();
        let valid = state
            .input
            .is_some_and(|input| tree.refresh(input).is_ok());
        if !valid {
            state.reset();
        }
        valid
    }

    /// Re-reads the draft. Returns the new draft when it changed.
    pub fn refresh_text(&self, tree: &dyn ScreenTree) -> Option<String> {
        let mut state = self.lock();
        let input = state.input?;
        let info = match tree.refresh(input) {
            Ok(info) => info,
            Err(error) => {
                debug!(%error, "input vanished while reading draft");
                state.reset();
                return None;
            }
        };

        let mut draft = info
            .text
            .as_deref()
            .unwrap_or("")
            .replace(COMPOSE_PLACEHOLDER, "");
        if state.status == InputStatus::HintText || info.showing_hint_text {
            draft.clear();
        }
        if state.current_typing.as_deref() == Some(draft.as_str()) {
            return None;
        }
        state.current_typing = Some(draft.clone());
        Some(draft)
    }

    /// Measures where the overlay goes.
    pub fn measure(&self, tree: &dyn ScreenTree, default_text_size_px: f32) -> Option<Anchor> {
        let mut state = self.lock();
        let input = state.input?;
        match tree.refresh(input) {
            Ok(info) => {
                let anchor = measure_anchor(&info, default_text_size_px);
                state.status = anchor.status;
                Some(anchor)
            }
            Err(error) => {
                debug!(%error, "input vanished while measuring");
                state.reset();
                None
            }
        }
    }

    /// Reads the message list and merges it into the transcript.
    ///
    /// Extraction walks the tree without holding the session lock; the merge
    /// is dropped if the session was reset meanwhile.
    pub fn refresh_message_list(&self, tree: &dyn ScreenTree) -> TranscriptUpdate {
        let (generation, node, extractor) = {
            let mut state = self.lock();
            let tracked = state
                .message_list
                .zip(state.app.as_ref().map(|app| app.extractor.clone()));
            match tracked {
                Some((node, extractor)) if tree.refresh(node).is_ok() => {
                    (state.generation, node, extractor)
                }
                _ => {
                    state.reset();
                    return TranscriptUpdate::Invalid;
                }
            }
        };

        let messages = match Extractor::extract(&extractor, tree, node) {
            Ok(messages) => messages,
            Err(error) => {
                debug!(%error, "message list vanished during extraction");
                self.reset_if_current(generation);
                return TranscriptUpdate::Invalid;
            }
        };

        let mut state = self.lock();
        if state.generation != generation {
            return TranscriptUpdate::Unchanged;
        }
        if !state.transcript.combine(messages) {
            return TranscriptUpdate::Unchanged;
        }
        state.cache.clear();
        debug!(messages = state.transcript.len(), "transcript updated");
        TranscriptUpdate::Changed {
            draft_is_empty: state.current_typing.as_deref() == Some(""),
        }
    }

    fn reset_if_current(&self, generation: u64) {
        let mut state = self.lock();
        if state.generation == generation {
            state.reset();
        }
    }

    /// Drops the tracked app, nodes, transcript, cache and draft.
    pub fn reset(&self) {
        self.lock().reset();
    }

    /// Stops tracking because no supported context is on screen.
    pub fn disable(&self) {
        let mut state = self.lock();
        state.reset();
        state.running = false;
    }

    pub fn ticket(&self) -> SuggestionTicket {
        let state = self.lock();
        SuggestionTicket {
            generation: state.generation,
            typing: TypingInfo::new(
                state.transcript.clone(),
                state.current_typing.clone().unwrap_or_default(),
            ),
        }
    }

    pub fn lookup(&self, draft: &str) -> Option<String> {
        self.lock().cache.lookup(draft)
    }

    /// Caches a backend response if it still belongs to the live session and
    /// still extends the live draft.
    pub fn apply_suggestion(
        &self,
        ticket: &SuggestionTicket,
        full_suggestion: &str,
    ) -> ApplyOutcome {
        let mut state = self.lock();
        if !state.running || state.generation != ticket.generation {
            return ApplyOutcome::Stale;
        }
        let live = state.current_typing.clone().unwrap_or_default();
        if !extends_draft(full_suggestion, &live) {
            return ApplyOutcome::Stale;
        }
        if !state.cache.populate(&ticket.typing, full_suggestion) {
            return ApplyOutcome::Rejected;
        }
        ApplyOutcome::Applied(state.cache.lookup(&live))
    }
}
