//! Tag-indexed receive queue.
//!
//! Incoming envelopes are pushed here by the connection readers and taken
//! out by tag. Order within one tag is FIFO; nothing is promised across tags.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use log::warn;
use tokio::sync::Notify;

use crate::error::{GraderError, Result};
use crate::ipc::messages::{BROADCAST, Tag};

#[derive(Debug, Default)]
struct MailboxState {
    queues: HashMap<Tag, VecDeque<String>>,
    /// Sources whose connection has ended
    closed: HashSet<Tag>,
}

impl MailboxState {
    /// A point-to-point tag is closed when its own source is gone; the shared
    /// control tags are closed as soon as any source is gone.
    fn is_closed(&self, tag: Tag) -> bool {
        if tag >= BROADCAST {
            !self.closed.is_empty()
        } else {
            self.closed.contains(&tag)
        }
    }
}

#[derive(Debug, Default)]
pub struct Mailbox {
    state: Mutex<MailboxState>,
    notify: Notify,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MailboxState>> {
        self.state
            .lock()
            .map_err(|_| GraderError::Channel("mailbox lock poisoned".into()))
    }

    /// Queue a message under `tag`
    pub fn push(&self, tag: Tag, text: String) {
        match self.lock() {
            Ok(mut state) => state.queues.entry(tag).or_default().push_back(text),
            Err(e) => warn!("Dropping message on tag {}: {}", tag, e),
        }
        self.notify.notify_waiters();
    }

    /// Mark a source as gone. Queued messages stay readable.
    pub fn close(&self, source: Tag) {
        match self.lock() {
            Ok(mut state) => {
                state.closed.insert(source);
            }
            Err(e) => warn!("Lost close of source {}: {}", source, e),
        }
        self.notify.notify_waiters();
    }

    /// Non-blocking receive: `Ok(None)` when nothing is queued.
    pub fn try_take(&self, tag: Tag) -> Result<Option<String>> {
        let mut state = self.lock()?;
        if let Some(text) = state.queues.get_mut(&tag).and_then(|q| q.pop_front()) {
            return Ok(Some(text));
        }
        if state.is_closed(tag) {
            return Err(GraderError::Disconnected(tag));
        }
        Ok(None)
    }

    /// Blocking receive: waits until a message for `tag` arrives.
    pub async fn take(&self, tag: Tag) -> Result<String> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a push between check and await is not lost
            notified.as_mut().enable();

            if let Some(text) = self.try_take(tag)? {
                return Ok(text);
            }
            notified.await;
        }
    }

    /// Number of messages waiting under `tag`
    pub fn pending(&self, tag: Tag) -> usize {
        self.lock()
            .map(|s| s.queues.get(&tag).map_or(0, |q| q.len()))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::messages::ACK;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_fifo_within_tag() {
        let mailbox = Mailbox::new();
        mailbox.push(1, "a".into());
        mailbox.push(2, "x".into());
        mailbox.push(1, "b".into());

        assert_eq!(mailbox.pending(1), 2);
        assert_eq!(mailbox.try_take(1).unwrap().as_deref(), Some("a"));
        assert_eq!(mailbox.try_take(1).unwrap().as_deref(), Some("b"));
        assert_eq!(mailbox.try_take(1).unwrap(), None);
        assert_eq!(mailbox.try_take(2).unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn test_closed_source_drains_before_error() {
        let mailbox = Mailbox::new();
        mailbox.push(3, "DONE".into());
        mailbox.close(3);

        assert_eq!(mailbox.try_take(3).unwrap().as_deref(), Some("DONE"));
        assert!(matches!(mailbox.try_take(3), Err(GraderError::Disconnected(3))));
        assert_eq!(mailbox.try_take(4).unwrap(), None);
        assert!(mailbox.try_take(ACK).is_err());
    }

    #[test]
    fn test_poisoned_mailbox_surfaces_channel_error() {
        let mailbox = Arc::new(Mailbox::new());
        let holder = Arc::clone(&mailbox);
        let _ = std::thread::spawn(move || {
            let _guard = holder.state.lock().unwrap();
            panic!("reader died holding the lock");
        })
        .join();

        // Neither call may panic; both are logged and dropped
        mailbox.push(1, "late".into());
        mailbox.close(1);
        assert!(matches!(mailbox.try_take(1), Err(GraderError::Channel(_))));
    }

    #[tokio::test]
    async fn test_take_waits_for_push() {
        let mailbox = Arc::new(Mailbox::new());
        let producer = Arc::clone(&mailbox);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.push(7, "late".into());
        });

        let text = tokio::time::timeout(Duration::from_secs(2), mailbox.take(7))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(text, "late");
    }

    #[tokio::test]
    async fn test_take_wakes_on_close() {
        let mailbox = Arc::new(Mailbox::new());
        let closer = Arc::clone(&mailbox);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            closer.close(5);
        });

        let result = tokio::time::timeout(Duration::from_secs(2), mailbox.take(5)).await.unwrap();
        assert!(matches!(result, Err(GraderError::Disconnected(5))));
    }
}
