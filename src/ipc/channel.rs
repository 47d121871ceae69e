//! The message channel abstraction and its in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{GraderError, Result};
use crate::ipc::mailbox::Mailbox;
use crate::ipc::messages::{BROADCAST, Tag};

/// A tagged, multi-party message channel.
///
/// `recv` selects by exact tag and suspends until a message arrives;
/// `try_recv` returns `Ok(None)` instead of suspending. Both fail with
/// `Disconnected` once the peer behind the tag is gone and its queue is empty.
#[async_trait]
pub trait MessageChannel: Send {
    async fn send(&mut self, tag: Tag, text: &str) -> Result<()>;

    async fn recv(&mut self, tag: Tag) -> Result<String>;

    fn try_recv(&mut self, tag: Tag) -> Result<Option<String>>;
}

/// Coordinator end of an in-process channel.
pub struct MemoryHub {
    inbox: Arc<Mailbox>,
    outboxes: HashMap<Tag, Arc<Mailbox>>,
}

/// Worker end of an in-process channel.
pub struct MemoryEndpoint {
    worker_id: Tag,
    inbox: Arc<Mailbox>,
    coordinator: Arc<Mailbox>,
}

/// Build a hub with `workers` endpoints, tagged 1..=workers.
pub fn memory_channel(workers: u32) -> (MemoryHub, Vec<MemoryEndpoint>) {
    let inbox = Arc::new(Mailbox::new());
    let mut outboxes = HashMap::new();
    let mut endpoints = Vec::new();

    for worker_id in 1..=workers {
        let worker_inbox = Arc::new(Mailbox::new());
        outboxes.insert(worker_id, Arc::clone(&worker_inbox));
        endpoints.push(MemoryEndpoint {
            worker_id,
            inbox: worker_inbox,
            coordinator: Arc::clone(&inbox),
        });
    }

    (MemoryHub { inbox, outboxes }, endpoints)
}

impl MemoryEndpoint {
    pub fn worker_id(&self) -> Tag {
        self.worker_id
    }
}

#[async_trait]
impl MessageChannel for MemoryHub {
    async fn send(&mut self, tag: Tag, text: &str) -> Result<()> {
        if tag == BROADCAST {
            for outbox in self.outboxes.values() {
                outbox.push(tag, text.to_string());
            }
            return Ok(());
        }
        let outbox = self
            .outboxes
            .get(&tag)
            .ok_or_else(|| GraderError::Channel(format!("no worker on tag {}", tag)))?;
        outbox.push(tag, text.to_string());
        Ok(())
    }

    async fn recv(&mut self, tag: Tag) -> Result<String> {
        self.inbox.take(tag).await
    }

    fn try_recv(&mut self, tag: Tag) -> Result<Option<String>> {
        self.inbox.try_take(tag)
    }
}

impl Drop for MemoryHub {
    fn drop(&mut self) {
        for (tag, outbox) in &self.outboxes {
            outbox.close(*tag);
        }
    }
}

#[async_trait]
impl MessageChannel for MemoryEndpoint {
    async fn send(&mut self, tag: Tag, text: &str) -> Result<()> {
        self.coordinator.push(tag, text.to_string());
        Ok(())
    }

    async fn recv(&mut self, tag: Tag) -> Result<String> {
        self.inbox.take(tag).await
    }

    fn try_recv(&mut self, tag: Tag) -> Result<Option<String>> {
        self.inbox.try_take(tag)
    }
}

impl Drop for MemoryEndpoint {
    fn drop(&mut self) {
        self.coordinator.close(self.worker_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::messages::ACK;

    #[tokio::test]
    async fn test_point_to_point_routing() {
        let (mut hub, mut workers) = memory_channel(2);
        hub.send(2, "for two").await.unwrap();

        assert_eq!(workers[0].try_recv(2).unwrap(), None);
        assert_eq!(workers[1].recv(2).await.unwrap(), "for two");
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_worker() {
        let (mut hub, mut workers) = memory_channel(3);
        hub.send(BROADCAST, "SYNACK").await.unwrap();

        for worker in workers.iter_mut() {
            assert_eq!(worker.recv(BROADCAST).await.unwrap(), "SYNACK");
        }
    }

    #[tokio::test]
    async fn test_workers_share_ack_tag() {
        let (mut hub, mut workers) = memory_channel(2);
        for worker in workers.iter_mut() {
            worker.send(ACK, "ACK").await.unwrap();
        }
        assert_eq!(hub.recv(ACK).await.unwrap(), "ACK");
        assert_eq!(hub.recv(ACK).await.unwrap(), "ACK");
        assert_eq!(hub.try_recv(ACK).unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_tag_is_error() {
        let (mut hub, _workers) = memory_channel(1);
        assert!(hub.send(9, "x").await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_endpoint_disconnects_its_tag() {
        let (mut hub, mut workers) = memory_channel(2);
        let second = workers.pop().unwrap();
        drop(second);

        assert!(matches!(hub.try_recv(2), Err(GraderError::Disconnected(2))));
        assert_eq!(hub.try_recv(1).unwrap(), None);
    }

    #[tokio::test]
    async fn test_dropped_hub_disconnects_workers() {
        let (hub, mut workers) = memory_channel(1);
        drop(hub);

        assert!(matches!(workers[0].recv(1).await, Err(GraderError::Disconnected(1))));
        assert!(workers[0].recv(BROADCAST).await.is_err());
    }
}
