// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! C3: the encapsulated-message framer.
//!
//! Every message on the wire has the same shape:
//!
//! ```text
//! [continuation: u32 = 0xFFFFFFFF][metadata_len: i32 LE][metadata][padding][body]
//! ```
//!
//! `metadata` is a FlatBuffer-encoded `Message` table (built in
//! [`crate::format`]); `metadata_len` counts only the metadata bytes, not
//! the continuation marker, the length field itself, or the padding.
//! `padding` is zero or more `0x00` bytes bringing the end of `metadata`
//! up to the next 8-byte boundary measured from the start of the message,
//! so the body that follows always starts 8-byte aligned. The end of a
//! stream is a message with `metadata_len == 0` and no body.

use std::io::{Read, Write};

use bytes::Bytes;

use crate::error::{IpcError, OutOfSpecSnafu, Result, TruncatedSnafu};

pub(crate) const CONTINUATION_MARKER: u32 = 0xFFFF_FFFF;
pub(crate) const ALIGNMENT: usize = 8;

/// Rounds `len` up to the next multiple of [`ALIGNMENT`].
pub(crate) fn align(len: usize) -> usize {
    (len + ALIGNMENT - 1) / ALIGNMENT * ALIGNMENT
}

/// Writes one encapsulated message: the continuation marker, the metadata
/// length, the metadata bytes, zero padding out to 8-byte alignment, and
/// finally `body`. Returns `(metadata_length, body_length)` for the file
/// footer's block index: `metadata_length` counts the 4-byte length prefix
/// plus the padded metadata, but not the continuation marker, matching the
/// footer's own `Block.metaDataLength` convention.
pub(crate) fn write_message<W: Write>(writer: &mut W, metadata: &[u8], body: &[u8]) -> Result<(i64, i64)> {
    let padded_metadata_len = align(metadata.len());
    writer.write_all(&CONTINUATION_MARKER.to_le_bytes())?;
    writer.write_all(&(padded_metadata_len as i32).to_le_bytes())?;
    writer.write_all(metadata)?;
    write_zeros(writer, padded_metadata_len - metadata.len())?;
    writer.write_all(body)?;
    Ok((4 + padded_metadata_len as i64, body.len() as i64))
}

/// Writes the end-of-stream sentinel: a continuation marker followed by a
/// zero metadata length and nothing else.
pub(crate) fn write_eos<W: Write>(writer: &mut W) -> Result<()> {
    writer.write_all(&CONTINUATION_MARKER.to_le_bytes())?;
    writer.write_all(&0i32.to_le_bytes())?;
    Ok(())
}

fn write_zeros<W: Write>(writer: &mut W, n: usize) -> Result<()> {
    const ZEROS: [u8; ALIGNMENT] = [0; ALIGNMENT];
    let mut remaining = n;
    while remaining > 0 {
        let chunk = remaining.min(ZEROS.len());
        writer.write_all(&ZEROS[..chunk])?;
        remaining -= chunk;
    }
    Ok(())
}

/// The decoded prefix of a message: its FlatBuffer metadata bytes, and how
/// many body bytes follow it. `None` means the end-of-stream sentinel was
/// read; the caller consumes no further bytes.
pub(crate) struct MessagePrefix {
    pub metadata: Vec<u8>,
}

/// Reads the continuation marker, length prefix and metadata bytes of the
/// next message from `reader`. Returns `Ok(None)` at a clean end of
/// stream: either the EOS sentinel, or the reader being empty exactly at a
/// message boundary (the legacy, pre-continuation-marker framing some
/// writers still produce).
pub(crate) fn next_message<R: Read>(reader: &mut R) -> Result<Option<MessagePrefix>> {
    let mut len_or_marker = [0u8; 4];
    match read_exact_or_eof(reader, &mut len_or_marker)? {
        false => return Ok(None),
        true => {}
    };

    let first = u32::from_le_bytes(len_or_marker);
    let metadata_len = if first == CONTINUATION_MARKER {
        let mut len_bytes = [0u8; 4];
        read_exact(reader, &mut len_bytes)?;
        i32::from_le_bytes(len_bytes)
    } else {
        // Pre-continuation-marker streams (Arrow format version <= 0.7)
        // wrote the metadata length directly with no marker at all.
        first as i32
    };

    if metadata_len == 0 {
        return Ok(None);
    }
    if metadata_len < 0 {
        return Err(IpcError::OutOfSpec {
            msg: format!("negative metadata length {metadata_len}"),
            location: snafu::Location::new(file!(), line!(), column!()),
        });
    }

    let mut metadata = vec![0u8; metadata_len as usize];
    read_exact(reader, &mut metadata)?;
    Ok(Some(MessagePrefix { metadata }))
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            TruncatedSnafu {
                needed: buf.len(),
                got: 0usize,
            }
            .build()
        } else {
            e.into()
        }
    })
}

/// Like `read_exact`, but treats a zero-byte read at the very start as a
/// clean EOF rather than an error, and a partial read as truncation.
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return if filled == 0 {
                    Ok(false)
                } else {
                    TruncatedSnafu {
                        needed: buf.len(),
                        got: filled,
                    }
                    .fail()
                }
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

/// A message's metadata, sliced zero-copy out of a contiguous,
/// already-in-memory input buffer: a cheap `Bytes` clone of the original
/// rather than an owned copy. Used by the one-shot `deserialize_all` path.
/// The chunked reader cannot offer this (it must buffer fragments before a
/// full message exists) and instead reuses [`next_message`] against its
/// internal accumulator, which owns what it buffers.
///
/// Only the metadata's bounds are known from framing alone; the body's
/// length comes from the parsed `Message.bodyLength` field, so callers
/// fetch it afterwards with [`take_body`].
pub(crate) fn next_message_metadata_in_bytes(buf: &Bytes, pos: &mut usize) -> Result<Option<Bytes>> {
    if *pos == buf.len() {
        return Ok(None);
    }
    let marker = read_u32(buf, *pos)?;
    let (header_len, metadata_len) = if marker == CONTINUATION_MARKER {
        (8usize, read_i32(buf, *pos + 4)?)
    } else {
        // Pre-continuation-marker streams (Arrow format version <= 0.7)
        // wrote the metadata length directly with no marker at all.
        (4usize, marker as i32)
    };

    if metadata_len == 0 {
        *pos += header_len;
        return Ok(None);
    }
    if metadata_len < 0 {
        return OutOfSpecSnafu {
            msg: format!("negative metadata length {metadata_len}"),
        }
        .fail();
    }

    let metadata_start = *pos + header_len;
    let metadata_end = metadata_start + metadata_len as usize;
    if metadata_end > buf.len() {
        return TruncatedSnafu {
            needed: metadata_end - *pos,
            got: buf.len() - *pos,
        }
        .fail();
    }
    *pos = metadata_start + align(metadata_len as usize);
    Ok(Some(buf.slice(metadata_start..metadata_end)))
}

/// Slices `len` body bytes out of `buf` starting at `*pos`, advancing `*pos`
/// past them (including their alignment padding).
pub(crate) fn take_body(buf: &Bytes, pos: &mut usize, len: usize) -> Result<Bytes> {
    let end = *pos + len;
    if end > buf.len() {
        return TruncatedSnafu {
            needed: end - *pos,
            got: buf.len().saturating_sub(*pos),
        }
        .fail();
    }
    let body = buf.slice(*pos..end);
    *pos = end + (align(len) - len);
    Ok(body)
}

fn read_u32(buf: &Bytes, at: usize) -> Result<u32> {
    if at + 4 > buf.len() {
        return TruncatedSnafu {
            needed: at + 4,
            got: buf.len(),
        }
        .fail();
    }
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[at..at + 4]);
    Ok(u32::from_le_bytes(b))
}

fn read_i32(buf: &Bytes, at: usize) -> Result<i32> {
    read_u32(buf, at).map(|v| v as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_aligned_frames() {
        let mut buf = Vec::new();
        write_message(&mut buf, &[1, 2, 3], &[9, 9]).unwrap();
        // marker(4) + len(4) + padded metadata(8) + body(2)
        assert_eq!(buf.len(), 4 + 4 + 8 + 2);
        assert_eq!(&buf[0..4], &CONTINUATION_MARKER.to_le_bytes());
    }

    #[test]
    fn round_trips_a_single_message() {
        let mut buf = Vec::new();
        write_message(&mut buf, b"hello!!!", &[1, 2, 3, 4]).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let msg = next_message(&mut cursor).unwrap().unwrap();
        assert_eq!(msg.metadata, b"hello!!!");
        let mut body = Vec::new();
        cursor.read_to_end(&mut body).unwrap();
        assert_eq!(body, vec![1, 2, 3, 4]);
    }

    #[test]
    fn eos_sentinel_reads_as_none() {
        let mut buf = Vec::new();
        write_eos(&mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        assert!(next_message(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn empty_input_reads_as_none() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        assert!(next_message(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn buffer_based_reader_slices_metadata_zero_copy() {
        let mut buf = Vec::new();
        write_message(&mut buf, b"hello!!!", &[1, 2, 3, 4]).unwrap();
        write_eos(&mut buf).unwrap();
        let buf = Bytes::from(buf);
        let mut pos = 0;
        let metadata = next_message_metadata_in_bytes(&buf, &mut pos).unwrap().unwrap();
        assert_eq!(&metadata[..], b"hello!!!");
        let body = take_body(&buf, &mut pos, 4).unwrap();
        assert_eq!(&body[..], &[1, 2, 3, 4]);
        assert!(next_message_metadata_in_bytes(&buf, &mut pos).unwrap().is_none());
    }
}
