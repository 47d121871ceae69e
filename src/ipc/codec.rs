//! Newline-delimited JSON framing for channel envelopes.
//!
//! Each frame is one compact JSON object followed by `\n`.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Serialize, de::DeserializeOwned};
use std::marker::PhantomData;
use tokio_util::codec::{Decoder, Encoder};

/// Default frame limit. Payloads are a path plus a couple of integers.
pub const DEFAULT_MAX_FRAME: usize = 64 * 1024;

/// Newline-delimited JSON codec.
#[derive(Debug)]
pub struct NdJsonCodec<T> {
    _phantom: PhantomData<T>,
    max_length: usize,
}

impl<T> NdJsonCodec<T> {
    /// Create a codec with the default max frame length.
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_FRAME)
    }

    /// Create a codec with a custom max frame length.
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            _phantom: PhantomData,
            max_length,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl<T> Default for NdJsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for NdJsonCodec<T> {
    fn clone(&self) -> Self {
        Self::with_max_length(self.max_length)
    }
}

fn too_large(len: usize, max: usize) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("Frame too large: {} > {}", len, max),
    )
}

fn json_error(e: serde_json::Error) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, format!("JSON error: {}", e))
}

impl<T: DeserializeOwned> Decoder for NdJsonCodec<T> {
    type Item = T;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> std::result::Result<Option<Self::Item>, Self::Error> {
        match src.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                if pos > self.max_length {
                    return Err(too_large(pos, self.max_length));
                }

                let line = src.split_to(pos);
                src.advance(1);

                serde_json::from_slice(&line).map(Some).map_err(json_error)
            }
            None => {
                if src.len() > self.max_length {
                    return Err(too_large(src.len(), self.max_length));
                }
                Ok(None)
            }
        }
    }
}

impl<T: Serialize> Encoder<T> for NdJsonCodec<T> {
    type Error = std::io::Error;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> std::result::Result<(), Self::Error> {
        // serde_json's compact form never contains a raw newline
        let json = serde_json::to_vec(&item).map_err(json_error)?;

        if json.len() > self.max_length {
            return Err(too_large(json.len(), self.max_length));
        }

        dst.reserve(json.len() + 1);
        dst.put_slice(&json);
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::messages::Envelope;

    #[test]
    fn test_codec_default_max_length() {
        let codec: NdJsonCodec<Envelope> = NdJsonCodec::new();
        assert_eq!(codec.max_length(), DEFAULT_MAX_FRAME);
        assert_eq!(codec.clone().max_length(), DEFAULT_MAX_FRAME);
    }

    #[test]
    fn test_encode_appends_newline() {
        let mut codec: NdJsonCodec<Envelope> = NdJsonCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Envelope::new(3, "DONE"), &mut buf).unwrap();
        assert_eq!(buf[buf.len() - 1], b'\n');
        assert_eq!(buf.iter().filter(|&&b| b == b'\n').count(), 1);
    }

    #[test]
    fn test_partial_frame_waits() {
        let mut codec: NdJsonCodec<Envelope> = NdJsonCodec::new();
        let mut buf = BytesMut::from(&br#"{"tag":1,"text":"AC"#[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_multiple_frames_in_one_buffer() {
        let mut codec: NdJsonCodec<Envelope> = NdJsonCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Envelope::new(1, "2"), &mut buf).unwrap();
        codec.encode(Envelope::new(1, "path with\nnewline 4"), &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), Envelope::new(1, "2"));
        assert_eq!(
            codec.decode(&mut buf).unwrap().unwrap(),
            Envelope::new(1, "path with\nnewline 4")
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_oversized_frames_rejected() {
        let mut codec: NdJsonCodec<Envelope> = NdJsonCodec::with_max_length(16);
        let mut buf = BytesMut::new();
        assert!(codec.encode(Envelope::new(1, "a fairly long payload"), &mut buf).is_err());

        let mut incoming = BytesMut::from(&[b'x'; 32][..]);
        assert!(codec.decode(&mut incoming).is_err());
    }

    #[test]
    fn test_garbage_frame_is_error() {
        let mut codec: NdJsonCodec<Envelope> = NdJsonCodec::new();
        let mut buf = BytesMut::from(&b"not json\n"[..]);
        assert!(codec.decode(&mut buf).is_err());
    }
}
