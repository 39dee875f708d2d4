use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{sleep, Instant};

/// Single-slot queue that keeps only the newest value. One consumer.
#[derive(Debug)]
pub struct LatestSlot<T> {
    slot: Mutex<Option<T>>,
    notify: Notify,
    closed: AtomicBool,
}

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Replaces any pending value.
    pub fn push(&self, value: T) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
        self.notify.notify_one();
    }

    pub fn take(&self) -> Option<T> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    pub fn is_pending(&self) -> bool {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Waits for the next value. `None` once closed.
    pub async fn next(&self) -> Option<T> {
        loop {
            if self.is_closed() {
                return None;
            }
            if let Some(value) = self.take() {
                return Some(value);
            }
            self.notify.notified().await;
        }
    }

    /// Waits for a value, then keeps replacing it with newer pushes until
    /// `quiet` passes without one.
    pub async fn next_debounced(&self, quiet: Duration) -> Option<T> {
        let mut latest = self.next().await?;
        let deadline = sleep(quiet);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                () = &mut deadline => return Some(latest),
                () = self.notify.notified() => {
                    if self.is_closed() {
                        return None;
                    }
                    if let Some(value) = self.take() {
                        latest = value;
                        deadline.as_mut().reset(Instant::now() + quiet);
                    }
                }
            }
        }
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn keeps_only_latest() {
        let slot = LatestSlot::new();
        slot.push(1);
        slot.push(2);
        assert_eq!(slot.next().await, Some(2));
        assert!(!slot.is_pending());
        slot.close();
        assert_eq!(slot.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_waits_for_quiet_period() {
        let slot = Arc::new(LatestSlot::new());
        let started = Instant::now();
        let pusher = slot.clone();
        tokio::spawn(async move {
            pusher.push("D1");
            sleep(Duration::from_millis(100)).await;
            pusher.push("D2");
            sleep(Duration::from_millis(100)).await;
            pusher.push("D3");
        });

        let value = slot.next_debounced(Duration::from_millis(360)).await;
        assert_eq!(value, Some("D3"));
        assert!(started.elapsed() >= Duration::from_millis(560));
    }

    #[tokio::test(start_paused = true)]
    async fn close_interrupts_debounce() {
        let slot = Arc::new(LatestSlot::new());
        slot.push(7);
        let closer = slot.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            closer.close();
        });
        assert_eq!(slot.next_debounced(Duration::from_millis(360)).await, None);
    }
}
