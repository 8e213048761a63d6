//! Fixed-size frame codec
//!
//! Every message on the wire occupies exactly one frame of `frame_size`
//! bytes: the text, a terminating NUL and NUL padding. There is no length
//! prefix. The codec buffers until a whole frame has arrived, so a
//! transport read returning part of a frame, or several frames at once,
//! still yields one message per frame.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Size of the registration frame (identifier plus terminating NUL)
pub const REGISTRATION_FRAME_SIZE: usize = 21;

/// Default size of message frames
pub const DEFAULT_FRAME_SIZE: usize = 300;

/// Decode the text payload of one frame
///
/// Stops at the first NUL or at the end of the slice. Invalid UTF-8 is
/// replaced rather than rejected.
pub fn decode_payload(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Encode text into one NUL-padded frame of `frame_size` bytes
///
/// Text longer than `frame_size - 1` bytes is truncated at a character
/// boundary so the frame always carries a terminating NUL.
pub fn encode_payload(text: &str, frame_size: usize, dst: &mut BytesMut) {
    let body = truncate_to(text, frame_size.saturating_sub(1));
    dst.reserve(frame_size);
    dst.put_slice(body.as_bytes());
    dst.put_bytes(0, frame_size - body.len());
}

fn truncate_to(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Codec for fixed-size, NUL-terminated text frames
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    frame_size: usize,
}

impl FrameCodec {
    /// Create a codec for frames of `frame_size` bytes
    pub fn new(frame_size: usize) -> Self {
        assert!(frame_size > 0, "frame size must be non-zero");
        Self { frame_size }
    }

    /// Codec for the registration frame
    pub fn registration() -> Self {
        Self::new(REGISTRATION_FRAME_SIZE)
    }

    /// Switch frame size, e.g. from registration to message frames
    ///
    /// Bytes already buffered are decoded with the new size.
    pub fn set_frame_size(&mut self, frame_size: usize) {
        assert!(frame_size > 0, "frame size must be non-zero");
        self.frame_size = frame_size;
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < self.frame_size {
            src.reserve(self.frame_size - src.len());
            return Ok(None);
        }
        let frame = src.split_to(self.frame_size);
        Ok(Some(decode_payload(&frame)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(text) => Ok(Some(text)),
            None if src.is_empty() => Ok(None),
            None => {
                // Peer wrote a short final frame before closing
                let rest = src.split();
                Ok(Some(decode_payload(&rest)))
            }
        }
    }
}

impl Encoder<String> for FrameCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_payload(&item, self.frame_size, dst);
        Ok(())
    }
}
