//! Chunk codec.
//!
//! A chunk is the textual content of one chat message: a body of up to
//! [`MSG_SIZE`](crate::limits::MSG_SIZE) base64 characters (or the
//! literal blank-file body), an `@` separator, and a next-pointer.

use crate::address::NextPointer;
use crate::error::DriveError;

/// A decoded chunk: its body text and where the chain continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub body: String,
    pub next: NextPointer,
}

impl Chunk {
    pub fn new(body: impl Into<String>, next: NextPointer) -> Self {
        Self {
            body: body.into(),
            next,
        }
    }

    /// Byte length of the body — the quantity bucket accounting tracks.
    pub fn content_len(&self) -> usize {
        self.body.len()
    }

    /// Render as the literal message content stored on the chat platform.
    pub fn encode(&self) -> String {
        format!("{}@{}", self.body, self.next)
    }

    /// Parse a chat message's content into a chunk. The `@` is the sole
    /// parse anchor; content without one is rejected rather than assumed
    /// to be a bare body, since a real chunk always carries a pointer.
    pub fn decode(content: &str) -> Result<Self, DriveError> {
        let (body, next) = content.split_once('@').ok_or(DriveError::BrokenMemory)?;
        let next: NextPointer = next.parse().map_err(|_| DriveError::BrokenMemory)?;
        Ok(Self {
            body: body.to_string(),
            next,
        })
    }

    /// The body length of a chunk's raw content, without fully decoding
    /// the next-pointer. Used by cache accounting and `rebuild_cache`,
    /// which only ever need the byte count before `@`.
    pub fn content_len_of(content: &str) -> usize {
        content.split_once('@').map_or(content.len(), |(b, _)| b.len())
    }
}

/// Split a base64 body into `<=chunk_size`-byte pieces, the way
/// `write_file` divides an encoded file's content across its chain.
/// Base64 text is pure ASCII, so byte slicing never lands mid-character.
pub fn split_body(body: &str, chunk_size: usize) -> Vec<String> {
    let bytes = body.as_bytes();
    bytes
        .chunks(chunk_size)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect()
}
