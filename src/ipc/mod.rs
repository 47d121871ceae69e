//! Message channel between coordinator and workers
//!
//! This module provides:
//! - Tagged envelopes and the text payload formats
//! - A per-tag FIFO mailbox with blocking and non-blocking receive
//! - The `MessageChannel` trait, realised over a Unix socket or in memory
//! - Newline-delimited JSON framing

pub mod channel;
pub mod codec;
pub mod mailbox;
pub mod messages;
pub mod socket;

pub use channel::{MemoryEndpoint, MemoryHub, MessageChannel, memory_channel};
pub use codec::NdJsonCodec;
pub use mailbox::Mailbox;
pub use messages::{ACK, ACK_TEXT, ATTACH, BROADCAST, DONE, Envelope, PROCEED, Tag};
pub use socket::{SocketEndpoint, SocketHub, socket_path};
