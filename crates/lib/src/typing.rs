//! Typing indicator loop: keeps "typing…" visible in a chat while an answer is pending.
//!
//! [`TypingSignal::start`] spawns the loop and returns a guard. The guard must be released with
//! [`TypingSignal::stop`], which clears the shared flag, wakes the loop and joins it. If the guard
//! is dropped without `stop` (cancelled or panicking handler), the flag is cleared and the task
//! aborted.

use crate::channels::ChannelHandle;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::{JoinError, JoinHandle};

/// Default pause between two typing indicators. Telegram shows one for about five seconds.
pub const DEFAULT_TYPING_DELAY: Duration = Duration::from_secs(4);

/// Send a typing indicator to `chat_id` every `delay` while `active` is set.
///
/// The first indicator goes out immediately. The flag is checked before each send, so no
/// indicator is sent once it is cleared. Send failures are logged and the loop carries on.
pub async fn run(
    channel: Arc<dyn ChannelHandle>,
    chat_id: String,
    active: Arc<AtomicBool>,
    delay: Duration,
    wake: Arc<Notify>,
) {
    while active.load(Ordering::SeqCst) {
        if let Err(e) = channel.send_typing(&chat_id).await {
            log::debug!("typing: indicator for chat {} failed: {}", chat_id, e);
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = wake.notified() => {}
        }
    }
    log::debug!("typing: loop for chat {} stopped", chat_id);
}

/// Running typing loop for one pending answer.
pub struct TypingSignal {
    active: Arc<AtomicBool>,
    wake: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

impl TypingSignal {
    pub fn start(channel: Arc<dyn ChannelHandle>, chat_id: impl Into<String>, delay: Duration) -> Self {
        let active = Arc::new(AtomicBool::new(true));
        let wake = Arc::new(Notify::new());
        let handle = tokio::spawn(run(
            channel,
            chat_id.into(),
            active.clone(),
            delay,
            wake.clone(),
        ));
        Self {
            active,
            wake,
            handle: Some(handle),
        }
    }

    #[cfg(test)]
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Clear the flag and wait for the loop to exit.
    pub async fn stop(mut self) -> Result<(), JoinError> {
        self.active.store(false, Ordering::SeqCst);
        // notify_one keeps a permit if the loop is mid-send, so its next wait returns at once.
        self.wake.notify_one();
        match self.handle.take() {
            Some(handle) => handle.await,
            None => Ok(()),
        }
    }
}

impl Drop for TypingSignal {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.active.store(false, Ordering::SeqCst);
            handle.abort();
        }
    }
}
