//! Unix socket realisation of the message channel.
//!
//! The coordinator binds one socket per run. Each worker connects, announces
//! itself with an `ATTACH` frame on its own tag, and from then on every frame
//! it sends lands in the coordinator's mailbox under the frame's tag.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use log::{debug, warn};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::error::{GraderError, Result};
use crate::ipc::channel::MessageChannel;
use crate::ipc::codec::NdJsonCodec;
use crate::ipc::mailbox::Mailbox;
use crate::ipc::messages::{ACK, ATTACH, BROADCAST, Envelope, Tag, worker_tag};

type FrameReader = FramedRead<OwnedReadHalf, NdJsonCodec<Envelope>>;
type FrameWriter = FramedWrite<OwnedWriteHalf, NdJsonCodec<Envelope>>;

/// Per-run socket path inside `dir`
pub fn socket_path(dir: &Path) -> PathBuf {
    dir.join(format!("gradepool-{}.sock", std::process::id()))
}

fn channel_err(op: &str, e: impl std::fmt::Display) -> GraderError {
    GraderError::Channel(format!("{}: {}", op, e))
}

/// Move frames from one connection into the mailbox until it closes.
fn spawn_reader(mut frames: FrameReader, mailbox: Arc<Mailbox>, source: Tag, accepts: fn(Tag, Tag) -> bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(envelope) if accepts(source, envelope.tag) => mailbox.push(envelope.tag, envelope.text),
                Ok(envelope) => warn!("Dropping frame with tag {} from source {}", envelope.tag, source),
                Err(e) => {
                    warn!("Connection for tag {} failed: {}", source, e);
                    break;
                }
            }
        }
        debug!("Connection for tag {} closed", source);
        mailbox.close(source);
    })
}

/// A worker may only speak on its own tag or the shared ack tag.
fn coordinator_accepts(source: Tag, tag: Tag) -> bool {
    tag == source || tag == ACK
}

/// The coordinator only speaks to a worker on its tag or the broadcast tag.
fn worker_accepts(source: Tag, tag: Tag) -> bool {
    tag == source || tag == BROADCAST
}

/// Coordinator end: listener plus one connection per attached worker.
pub struct SocketHub {
    path: PathBuf,
    listener: UnixListener,
    writers: HashMap<Tag, FrameWriter>,
    mailbox: Arc<Mailbox>,
    readers: Vec<JoinHandle<()>>,
}

impl SocketHub {
    /// Bind the channel socket, replacing a stale file at `path`.
    pub fn bind(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener =
            UnixListener::bind(&path).map_err(|e| channel_err(&format!("bind {}", path.display()), e))?;
        debug!("Channel listening on {}", path.display());

        Ok(Self {
            path,
            listener,
            writers: HashMap::new(),
            mailbox: Arc::new(Mailbox::new()),
            readers: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept the next connection and require it to be `worker_id`.
    pub async fn attach(&mut self, worker_id: Tag, timeout: Duration) -> Result<()> {
        let tag = worker_tag(worker_id)?;

        let (stream, _) = tokio::time::timeout(timeout, self.listener.accept())
            .await
            .map_err(|_| GraderError::Channel(format!("worker {} did not connect within {:?}", worker_id, timeout)))?
            .map_err(|e| channel_err("accept", e))?;

        let (read_half, write_half) = stream.into_split();
        let mut frames: FrameReader = FramedRead::new(read_half, NdJsonCodec::new());

        let hello = tokio::time::timeout(timeout, frames.next())
            .await
            .map_err(|_| GraderError::Channel(format!("worker {} never announced itself", worker_id)))?;
        match hello {
            Some(Ok(envelope)) if envelope.tag == tag && envelope.text == ATTACH => {}
            Some(Ok(envelope)) => {
                return Err(GraderError::Channel(format!(
                    "expected ATTACH from worker {}, got tag {} '{}'",
                    worker_id, envelope.tag, envelope.text
                )));
            }
            Some(Err(e)) => return Err(channel_err("read ATTACH", e)),
            None => return Err(GraderError::Disconnected(tag)),
        }

        self.readers
            .push(spawn_reader(frames, Arc::clone(&self.mailbox), tag, coordinator_accepts));
        self.writers
            .insert(tag, FramedWrite::new(write_half, NdJsonCodec::new()));
        debug!("Worker {} attached", worker_id);
        Ok(())
    }

    /// Number of attached workers
    pub fn attached(&self) -> usize {
        self.writers.len()
    }

    /// Release the channel: drop every connection and remove the socket file.
    pub fn close(mut self) -> Result<()> {
        for reader in self.readers.drain(..) {
            reader.abort();
        }
        self.writers.clear();
        std::fs::remove_file(&self.path).map_err(|e| channel_err(&format!("remove {}", self.path.display()), e))?;
        debug!("Channel {} removed", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl MessageChannel for SocketHub {
    async fn send(&mut self, tag: Tag, text: &str) -> Result<()> {
        if tag == BROADCAST {
            for (worker, writer) in self.writers.iter_mut() {
                writer
                    .send(Envelope::new(tag, text))
                    .await
                    .map_err(|e| channel_err(&format!("broadcast to worker {}", worker), e))?;
            }
            return Ok(());
        }

        let writer = self
            .writers
            .get_mut(&tag)
            .ok_or_else(|| GraderError::Channel(format!("no worker attached on tag {}", tag)))?;
        writer
            .send(Envelope::new(tag, text))
            .await
            .map_err(|e| channel_err(&format!("send to worker {}", tag), e))
    }

    async fn recv(&mut self, tag: Tag) -> Result<String> {
        self.mailbox.take(tag).await
    }

    fn try_recv(&mut self, tag: Tag) -> Result<Option<String>> {
        self.mailbox.try_take(tag)
    }
}

/// Worker end: one connection to the coordinator.
pub struct SocketEndpoint {
    worker_id: Tag,
    writer: FrameWriter,
    mailbox: Arc<Mailbox>,
    reader: JoinHandle<()>,
}

impl SocketEndpoint {
    /// Connect to the coordinator and announce `worker_id`.
    pub async fn connect(path: &Path, worker_id: Tag) -> Result<Self> {
        let tag = worker_tag(worker_id)?;
        let stream = UnixStream::connect(path)
            .await
            .map_err(|e| channel_err(&format!("connect {}", path.display()), e))?;

        let (read_half, write_half) = stream.into_split();
        let mut writer: FrameWriter = FramedWrite::new(write_half, NdJsonCodec::new());
        writer
            .send(Envelope::new(tag, ATTACH))
            .await
            .map_err(|e| channel_err("send ATTACH", e))?;

        let mailbox = Arc::new(Mailbox::new());
        let reader = spawn_reader(
            FramedRead::new(read_half, NdJsonCodec::new()),
            Arc::clone(&mailbox),
            tag,
            worker_accepts,
        );

        Ok(Self {
            worker_id: tag,
            writer,
            mailbox,
            reader,
        })
    }

    pub fn worker_id(&self) -> Tag {
        self.worker_id
    }

    /// Flush and shut down the write side.
    pub async fn close(mut self) -> Result<()> {
        self.writer.close().await.map_err(|e| channel_err("close", e))?;
        self.reader.abort();
        Ok(())
    }
}

#[async_trait]
impl MessageChannel for SocketEndpoint {
    async fn send(&mut self, tag: Tag, text: &str) -> Result<()> {
        self.writer
            .send(Envelope::new(tag, text))
            .await
            .map_err(|e| channel_err(&format!("send on tag {}", tag), e))
    }

    async fn recv(&mut self, tag: Tag) -> Result<String> {
        self.mailbox.take(tag).await
    }

    fn try_recv(&mut self, tag: Tag) -> Result<Option<String>> {
        self.mailbox.try_take(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::messages::{ACK_TEXT, PROCEED};
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_attach_and_exchange() {
        let tmp = TempDir::new().unwrap();
        let mut hub = SocketHub::bind(socket_path(tmp.path())).unwrap();
        let path = hub.path().to_path_buf();

        let worker = tokio::spawn(async move {
            let mut endpoint = SocketEndpoint::connect(&path, 1).await.unwrap();
            let count = endpoint.recv(1).await.unwrap();
            endpoint.send(ACK, ACK_TEXT).await.unwrap();
            let proceed = endpoint.recv(BROADCAST).await.unwrap();
            endpoint.send(1, "result line").await.unwrap();
            endpoint.close().await.unwrap();
            (count, proceed)
        });

        hub.attach(1, WAIT).await.unwrap();
        assert_eq!(hub.attached(), 1);
        hub.send(1, "3").await.unwrap();
        assert_eq!(hub.recv(ACK).await.unwrap(), ACK_TEXT);
        hub.send(BROADCAST, PROCEED).await.unwrap();
        assert_eq!(hub.recv(1).await.unwrap(), "result line");

        let (count, proceed) = worker.await.unwrap();
        assert_eq!(count, "3");
        assert_eq!(proceed, PROCEED);

        assert!(matches!(hub.recv(1).await, Err(GraderError::Disconnected(1))));
        hub.close().unwrap();
        assert!(!socket_path(tmp.path()).exists());
    }

    #[tokio::test]
    async fn test_attach_rejects_wrong_identity() {
        let tmp = TempDir::new().unwrap();
        let mut hub = SocketHub::bind(socket_path(tmp.path())).unwrap();
        let path = hub.path().to_path_buf();

        let _impostor = tokio::spawn(async move { SocketEndpoint::connect(&path, 2).await });

        let err = hub.attach(1, WAIT).await.unwrap_err();
        assert!(err.to_string().contains("expected ATTACH from worker 1"));
    }

    #[tokio::test]
    async fn test_attach_times_out() {
        let tmp = TempDir::new().unwrap();
        let mut hub = SocketHub::bind(socket_path(tmp.path())).unwrap();
        let err = hub.attach(1, Duration::from_millis(50)).await.unwrap_err();
        assert!(err.to_string().contains("did not connect"));
    }

    #[tokio::test]
    async fn test_worker_cannot_spoof_other_tags() {
        let tmp = TempDir::new().unwrap();
        let mut hub = SocketHub::bind(socket_path(tmp.path())).unwrap();
        let path = hub.path().to_path_buf();

        let worker = tokio::spawn(async move {
            let mut endpoint = SocketEndpoint::connect(&path, 1).await.unwrap();
            endpoint.send(2, "not mine").await.unwrap();
            endpoint.send(1, "mine").await.unwrap();
            endpoint.close().await.unwrap();
        });

        hub.attach(1, WAIT).await.unwrap();
        worker.await.unwrap();
        assert_eq!(hub.recv(1).await.unwrap(), "mine");
        assert_eq!(hub.try_recv(2).unwrap(), None);
    }
}
