use std::sync::Arc;
use std::time::Duration;

use coreply_core::{detect, AppRegistry, ScreenContext, ScreenTree, TranscriptUpdate};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::backend::SuggestionBackend;
use crate::config::{ConfigHandle, CoreplyConfig};
use crate::lanes::LatestSlot;
use crate::orchestrator::{Phase, SuggestionOrchestrator};
use crate::overlay::{accept_text, AcceptMode, OverlayContent, OverlaySink, TrackingSink};

/// Events from our own overlay windows.
const OWN_PACKAGE_PREFIX: &str = "app.coreply";

/// The parts of an accessibility event the service looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScreenEvent {
    pub package: Option<String>,
    pub class_name: Option<String>,
}

impl ScreenEvent {
    pub fn new(package: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            package: Some(package.into()),
            class_name: Some(class_name.into()),
        }
    }
}

type SharedTree = Arc<dyn ScreenTree>;

/// Entry point for the platform bridge. `on_event` runs detection on the
/// caller's thread; the transcript walk and network calls happen on
/// background lanes.
pub struct ScreenService {
    inner: Arc<Inner>,
}

struct Inner {
    config: ConfigHandle,
    registry: AppRegistry,
    context: Arc<ScreenContext>,
    sink: Arc<TrackingSink>,
    orchestrator: SuggestionOrchestrator,
    measure_lane: LatestSlot<SharedTree>,
    transcript_lane: LatestSlot<SharedTree>,
}

impl ScreenService {
    pub fn new(
        config: CoreplyConfig,
        backend: Arc<dyn SuggestionBackend>,
        sink: Arc<dyn OverlaySink>,
    ) -> Self {
        let context = Arc::new(ScreenContext::new(config.suggest.cache_capacity));
        let config = ConfigHandle::new(config);
        let sink = Arc::new(TrackingSink::new(sink));
        let orchestrator =
            SuggestionOrchestrator::new(context.clone(), backend, config.clone(), sink.clone());

        Self {
            inner: Arc::new(Inner {
                config,
                registry: AppRegistry::builtin(),
                context,
                sink,
                orchestrator,
                measure_lane: LatestSlot::new(),
                transcript_lane: LatestSlot::new(),
            }),
        }
    }

    /// Starts the request loop and both lane workers.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let measure = self.inner.clone();
        let transcript = self.inner.clone();
        vec![
            self.inner.orchestrator.spawn(),
            tokio::spawn(async move {
                while let Some(tree) = measure.measure_lane.next().await {
                    measure.measure(tree.as_ref());
                }
            }),
            tokio::spawn(async move {
                loop {
                    let quiet = Duration::from_millis(
                        transcript.config.snapshot().suggest.transcript_debounce_ms,
                    );
                    let Some(tree) = transcript.transcript_lane.next_debounced(quiet).await else {
                        break;
                    };
                    transcript.refresh_transcript(tree.as_ref());
                }
            }),
        ]
    }

    pub fn update_config(&self, config: CoreplyConfig) {
        info!(
            enabled = config.suggest.enable,
            api = ?config.api.kind,
            apps = config.apps.selected.len(),
            "config updated"
        );
        self.inner.config.replace(config);
    }

    /// Handles one accessibility event. Returns whether a supported input is
    /// being tracked afterwards.
    pub fn on_event(&self, event: &ScreenEvent, tree: SharedTree) -> bool {
        let inner = &self.inner;
        let (Some(package), Some(_)) = (event.package.as_deref(), event.class_name.as_deref())
        else {
            return false;
        };
        if package.starts_with(OWN_PACKAGE_PREFIX) {
            return false;
        }

        let config = inner.config.snapshot();
        let selected = config.apps.selected_set();
        let detection = if config.suggest.enable && inner.context.refresh_input(tree.as_ref()) {
            inner.context.tracked()
        } else if config.suggest.enable {
            detect(tree.as_ref(), &inner.registry, &selected)
        } else {
            Default::default()
        };
        let still_selected = detection
            .app
            .as_ref()
            .is_some_and(|app| selected.contains(&app.package));

        if detection.is_match() && still_selected && inner.context.enable(&detection) {
            inner.measure_lane.push(tree.clone());
            inner.transcript_lane.push(tree);
            return true;
        }

        if inner.context.is_running() {
            debug!(%package, "no supported input, hiding overlay");
            inner.context.disable();
            inner.sink.show(OverlayContent::Empty);
        }
        false
    }

    /// Field text after accepting the shown suggestion, for the bridge to set.
    pub fn accept(&self, mode: AcceptMode) -> Option<String> {
        let draft = self.inner.context.current_typing()?;
        accept_text(&draft, &self.inner.sink.current(), mode)
    }

    pub fn phase(&self) -> Phase {
        self.inner.orchestrator.phase()
    }

    pub fn shutdown(&self) {
        self.inner.orchestrator.shutdown();
        self.inner.measure_lane.close();
        self.inner.transcript_lane.close();
        self.inner.context.disable();
        self.inner.sink.show(OverlayContent::Empty);
    }
}

impl Inner {
    fn measure(&self, tree: &dyn ScreenTree) {
        let text_size = self.config.snapshot().ui.default_text_size_px;
        if let Some(anchor) = self.context.measure(tree, text_size) {
            self.sink.place(anchor);
            self.refresh_draft(tree);
        }
    }

    fn refresh_transcript(&self, tree: &dyn ScreenTree) {
        match self.context.refresh_message_list(tree) {
            TranscriptUpdate::Changed {
                draft_is_empty: true,
            } => self.on_draft_changed(""),
            TranscriptUpdate::Changed { .. } | TranscriptUpdate::Unchanged => {}
            TranscriptUpdate::Invalid => debug!("message list gone"),
        }
    }

    fn refresh_draft(&self, tree: &dyn ScreenTree) {
        if let Some(draft) = self.context.refresh_text(tree) {
            self.on_draft_changed(&draft);
        }
    }

    fn on_draft_changed(&self, draft: &str) {
        match self.context.lookup(draft) {
            Some(suggestion) => self.sink.show(OverlayContent::suggestion(&suggestion)),
            None => {
                self.sink.show(OverlayContent::Empty);
                self.orchestrator.submit(self.context.ticket());
            }
        }
    }
}
