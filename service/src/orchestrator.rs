use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use coreply_core::cache::{clean_completion, full_suggestion};
use coreply_core::{ApplyOutcome, ScreenContext, SuggestionTicket};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::SuggestionBackend;
use crate::config::ConfigHandle;
use crate::lanes::LatestSlot;
use crate::overlay::{OverlayContent, OverlaySink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Debouncing,
    InFlight,
}

/// Debounces draft changes and turns each settled draft into one backend
/// request. Responses may arrive in any order; each is validated against the
/// live session before it is cached.
#[derive(Clone)]
pub struct SuggestionOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    lane: LatestSlot<SuggestionTicket>,
    context: Arc<ScreenContext>,
    backend: Arc<dyn SuggestionBackend>,
    config: ConfigHandle,
    sink: Arc<dyn OverlaySink>,
    debouncing: AtomicBool,
    in_flight: AtomicUsize,
}

impl SuggestionOrchestrator {
    pub fn new(
        context: Arc<ScreenContext>,
        backend: Arc<dyn SuggestionBackend>,
        config: ConfigHandle,
        sink: Arc<dyn OverlaySink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                lane: LatestSlot::new(),
                context,
                backend,
                config,
                sink,
                debouncing: AtomicBool::new(false),
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    pub fn submit(&self, ticket: SuggestionTicket) {
        self.inner.debouncing.store(true, Ordering::SeqCst);
        self.inner.lane.push(ticket);
    }

    pub fn phase(&self) -> Phase {
        if self.inner.debouncing.load(Ordering::SeqCst) {
            Phase::Debouncing
        } else if self.inner.in_flight.load(Ordering::SeqCst) > 0 {
            Phase::InFlight
        } else {
            Phase::Idle
        }
    }

    /// Runs the debounce loop until [`shutdown`](Self::shutdown).
    pub fn spawn(&self) -> JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            loop {
                let quiet = Duration::from_millis(inner.config.snapshot().suggest.debounce_ms);
                let Some(ticket) = inner.lane.next_debounced(quiet).await else {
                    break;
                };
                if !inner.lane.is_pending() {
                    inner.debouncing.store(false, Ordering::SeqCst);
                }
                inner.in_flight.fetch_add(1, Ordering::SeqCst);
                let worker = inner.clone();
                tokio::spawn(async move {
                    worker.fetch(ticket).await;
                    worker.in_flight.fetch_sub(1, Ordering::SeqCst);
                });
            }
            debug!("suggestion lane closed");
        })
    }

    pub fn shutdown(&self) {
        self.inner.lane.close();
    }
}

impl Inner {
    async fn fetch(&self, ticket: SuggestionTicket) {
        let typing = &ticket.typing;
        if typing.current_typing.trim().is_empty() && typing.past_messages.is_empty() {
            debug!("nothing to complete yet");
            return;
        }

        let config = self.config.snapshot();
        let timeout = Duration::from_millis(config.suggest.request_timeout_ms);
        let started = Instant::now();
        let result = match tokio::time::timeout(
            timeout,
            self.backend.request_completion(typing, &config.api),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "suggestion request timed out after {}ms",
                config.suggest.request_timeout_ms
            )),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let raw = match result {
            Ok(raw) => raw,
            Err(error) => {
                warn!(elapsed_ms, "suggestion request failed: {error:#}");
                if config.suggest.show_errors && self.context.is_running() {
                    self.sink.show(OverlayContent::error(format!("{error:#}")));
                }
                return;
            }
        };

        let full = full_suggestion(&typing.current_typing, &clean_completion(&raw));
        match self.context.apply_suggestion(&ticket, &full) {
            ApplyOutcome::Applied(Some(suggestion)) => {
                debug!(elapsed_ms, "suggestion ready");
                self.sink.show(OverlayContent::suggestion(&suggestion));
            }
            ApplyOutcome::Applied(None) => {
                debug!(elapsed_ms, "suggestion cached, nothing left to show");
            }
            ApplyOutcome::Stale => {
                debug!(elapsed_ms, "discarding suggestion for an outdated draft");
            }
            ApplyOutcome::Rejected => {
                debug!(elapsed_ms, suggestion = %full, "backend reply does not extend draft");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreplyConfig;
    use crate::testing::{selected, ChatScreen, RecordingSink, ScriptedBackend};
    use coreply_core::{detect, AppRegistry};
    use pretty_assertions::assert_eq;
    use tokio::time::sleep;

    struct Harness {
        screen: ChatScreen,
        context: Arc<ScreenContext>,
        backend: Arc<ScriptedBackend>,
        sink: Arc<RecordingSink>,
        orchestrator: SuggestionOrchestrator,
    }

    fn harness(draft: &str, backend: ScriptedBackend, config: CoreplyConfig) -> Harness {
        let screen = ChatScreen::new(draft);
        let context = Arc::new(ScreenContext::new(64));
        let detection = detect(screen.arena.as_ref(), &AppRegistry::builtin(), &selected());
        assert!(context.enable(&detection));
        context.refresh_message_list(screen.arena.as_ref());
        context.refresh_text(screen.arena.as_ref());

        let backend = Arc::new(backend);
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = SuggestionOrchestrator::new(
            context.clone(),
            backend.clone(),
            ConfigHandle::new(config),
            sink.clone(),
        );
        orchestrator.spawn();
        Harness {
            screen,
            context,
            backend,
            sink,
            orchestrator,
        }
    }

    impl Harness {
        fn type_and_submit(&self, draft: &str) {
            self.screen.type_draft(draft);
            self.context.refresh_text(self.screen.arena.as_ref());
            self.orchestrator.submit(self.context.ticket());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn caches_reply_for_following_keystrokes() {
        let h = harness(
            "Sure, what t",
            ScriptedBackend::replying("time works for you?"),
            CoreplyConfig::default(),
        );
        h.orchestrator.submit(h.context.ticket());
        sleep(Duration::from_secs(1)).await;

        assert_eq!(
            h.sink.last(),
            Some(OverlayContent::suggestion("ime works for you?"))
        );
        h.screen.type_draft("Sure, what ti");
        h.context.refresh_text(h.screen.arena.as_ref());
        assert_eq!(
            h.context.lookup("Sure, what ti").as_deref(),
            Some("me works for you?")
        );
        assert_eq!(h.backend.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn only_settled_draft_is_requested() {
        let h = harness("S", ScriptedBackend::replying("Sure thing"), CoreplyConfig::default());
        h.type_and_submit("Su");
        sleep(Duration::from_millis(100)).await;
        h.type_and_submit("Sur");
        sleep(Duration::from_millis(100)).await;
        h.type_and_submit("Sure");
        assert_eq!(h.orchestrator.phase(), Phase::Debouncing);

        sleep(Duration::from_millis(380)).await;
        assert_eq!(h.orchestrator.phase(), Phase::InFlight);
        sleep(Duration::from_secs(1)).await;

        let calls = h.backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].current_typing, "Sure");
        assert_eq!(h.orchestrator.phase(), Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn reply_after_reset_is_dropped() {
        let h = harness(
            "Sure, what t",
            ScriptedBackend::replying("time works for you?").with_delay(Duration::from_millis(500)),
            CoreplyConfig::default(),
        );
        h.orchestrator.submit(h.context.ticket());
        sleep(Duration::from_millis(400)).await;
        assert_eq!(h.backend.calls().len(), 1);

        h.context.reset();
        sleep(Duration::from_secs(1)).await;
        assert!(h.sink.shown().is_empty());
        assert_eq!(h.context.lookup("Sure, what t"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn blank_draft_without_history_is_skipped() {
        let h = harness("", ScriptedBackend::replying("hi"), CoreplyConfig::default());
        h.context.reset();
        h.orchestrator.submit(h.context.ticket());
        sleep(Duration::from_secs(1)).await;
        assert!(h.backend.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn errors_surface_only_when_enabled() {
        let mut config = CoreplyConfig::default();
        config.suggest.show_errors = true;
        let h = harness("Sure", ScriptedBackend::failing("quota exceeded"), config);
        h.orchestrator.submit(h.context.ticket());
        sleep(Duration::from_secs(1)).await;
        assert_eq!(h.sink.last(), Some(OverlayContent::error("quota exceeded")));

        let quiet = harness(
            "Sure",
            ScriptedBackend::failing("quota exceeded"),
            CoreplyConfig::default(),
        );
        quiet.orchestrator.submit(quiet.context.ticket());
        sleep(Duration::from_secs(1)).await;
        assert!(quiet.sink.shown().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_backend_times_out() {
        let mut config = CoreplyConfig::default();
        config.suggest.show_errors = true;
        config.suggest.request_timeout_ms = 1_000;
        let h = harness(
            "Sure",
            ScriptedBackend::replying("Sure thing").with_delay(Duration::from_secs(60)),
            config,
        );
        h.orchestrator.submit(h.context.ticket());
        sleep(Duration::from_secs(2)).await;

        let Some(OverlayContent::Error { message }) = h.sink.last() else {
            panic!("expected a timeout error");
        };
        assert!(message.contains("timed out"));
        assert_eq!(h.context.lookup("Sure"), None);
    }
}
