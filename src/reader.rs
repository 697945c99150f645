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

//! C5 read side: one-shot and incremental stream readers, plus the file
//! format wrapper.
//!
//! The read-side state machine is `EXPECT_SCHEMA -> EXPECT_BATCH_OR_EOS ->
//! (EXPECT_BATCH_OR_EOS | TERMINATED)`: the first message must be a schema,
//! after which any number of record batches are accepted until the
//! end-of-stream sentinel. A second schema, or a record batch before the
//! first schema, or any other message kind, is an error.

use std::ops::Range;
use std::sync::Arc;

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use bytes::{Bytes, BytesMut};

use crate::error::{
    BadMagicSnafu, FormatParseSnafu, InvalidStateSnafu, OutOfSpecSnafu, Result, TruncatedSnafu,
    UnexpectedMessageSnafu, UnsupportedMessageSnafu,
};
use crate::format::gen;
use crate::message;
use crate::record_batch;
use crate::schema;

/// Parses a complete Arrow IPC stream already fully in memory: a schema
/// message, zero or more record-batch messages, and an end-of-stream
/// sentinel. Metadata is sliced zero-copy from `bytes`; buffers are
/// zero-copy when the stream is uncompressed and owned when it isn't.
pub fn deserialize_all(bytes: Bytes) -> Result<Vec<RecordBatch>> {
    let mut pos = 0usize;
    let mut schema: Option<SchemaRef> = None;
    let mut batches = Vec::new();

    loop {
        let Some(metadata) = message::next_message_metadata_in_bytes(&bytes, &mut pos)? else {
            return Ok(batches);
        };
        let parsed = gen::root_as_message(&metadata).map_err(|e| {
            FormatParseSnafu {
                format: "Message".to_string(),
                reason: e.to_string(),
            }
            .build()
        })?;

        match parsed.header_type() {
            gen::MessageHeader::Schema => {
                if schema.is_some() {
                    return UnexpectedMessageSnafu {
                        kind: gen::MessageHeader::Schema,
                        expected: "record batch or end of stream",
                    }
                    .fail();
                }
                let fb_schema = parsed.header_as_schema().ok_or_else(|| {
                    OutOfSpecSnafu {
                        msg: "schema message missing its header table".to_string(),
                    }
                    .build()
                })?;
                schema = Some(Arc::new(schema::decode_schema(fb_schema)?));
            }
            gen::MessageHeader::RecordBatch => {
                let Some(schema) = schema.as_ref() else {
                    return UnexpectedMessageSnafu {
                        kind: gen::MessageHeader::RecordBatch,
                        expected: "schema",
                    }
                    .fail();
                };
                let body = message::take_body(&bytes, &mut pos, parsed.body_length() as usize)?;
                let rb = parsed.header_as_record_batch().ok_or_else(|| {
                    OutOfSpecSnafu {
                        msg: "record batch message missing its header table".to_string(),
                    }
                    .build()
                })?;
                batches.push(record_batch::decode_record_batch(schema, rb, body)?);
            }
            other => {
                return UnsupportedMessageSnafu {
                    msg: format!("{other:?}"),
                }
                .fail()
            }
        }
    }
}

enum Peeked {
    NeedMoreData,
    Eos { consumed: usize },
    Message {
        metadata_range: Range<usize>,
        body_range: Range<usize>,
        consumed: usize,
    },
}

/// Looks for one complete message at the start of `buf` without consuming
/// anything. Returns `NeedMoreData` rather than an error when `buf` simply
/// doesn't yet hold a full message — the distinction a one-shot reader
/// doesn't need to make, since it expects all bytes to already be present.
fn peek_message(buf: &[u8]) -> Result<Peeked> {
    if buf.len() < 4 {
        return Ok(Peeked::NeedMoreData);
    }
    let marker = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    let (header_len, metadata_len) = if marker == message::CONTINUATION_MARKER {
        if buf.len() < 8 {
            return Ok(Peeked::NeedMoreData);
        }
        (8usize, i32::from_le_bytes(buf[4..8].try_into().unwrap()))
    } else {
        (4usize, marker as i32)
    };

    if metadata_len == 0 {
        return Ok(Peeked::Eos { consumed: header_len });
    }
    if metadata_len < 0 {
        return OutOfSpecSnafu {
            msg: format!("negative metadata length {metadata_len}"),
        }
        .fail();
    }

    let metadata_len = metadata_len as usize;
    let padded_metadata = message::align(metadata_len);
    let metadata_start = header_len;
    let metadata_end = metadata_start + metadata_len;
    if buf.len() < metadata_start + padded_metadata {
        return Ok(Peeked::NeedMoreData);
    }

    let parsed = gen::root_as_message(&buf[metadata_start..metadata_end]).map_err(|e| {
        FormatParseSnafu {
            format: "Message".to_string(),
            reason: e.to_string(),
        }
        .build()
    })?;
    let body_start = metadata_start + padded_metadata;
    let body_len = parsed.body_length() as usize;
    let total = body_start + message::align(body_len);
    if buf.len() < total {
        return Ok(Peeked::NeedMoreData);
    }

    Ok(Peeked::Message {
        metadata_range: metadata_start..metadata_end,
        body_range: body_start..body_start + body_len,
        consumed: total,
    })
}

/// Incrementally parses an Arrow IPC stream fed one chunk at a time,
/// preserving the schema across calls to [`StreamReader::push`].
#[derive(Default)]
pub struct StreamReader {
    buf: BytesMut,
    schema: Option<SchemaRef>,
    terminated: bool,
}

impl StreamReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema(&self) -> Option<&SchemaRef> {
        self.schema.as_ref()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Appends `chunk` and parses as many complete messages as are now
    /// available, pushing each completed record batch onto `out` in order.
    /// Schema and end-of-stream messages are consumed without producing an
    /// entry in `out`. Calling this again after the end of stream has been
    /// reached is an error.
    pub fn push(&mut self, chunk: &[u8], out: &mut Vec<RecordBatch>) -> Result<()> {
        if self.terminated {
            return InvalidStateSnafu {
                msg: "stream reader has already reached end of stream",
            }
            .fail();
        }
        self.buf.extend_from_slice(chunk);

        loop {
            match peek_message(&self.buf)? {
                Peeked::NeedMoreData => break,
                Peeked::Eos { consumed } => {
                    let _ = self.buf.split_to(consumed);
                    self.terminated = true;
                    break;
                }
                Peeked::Message {
                    metadata_range,
                    body_range,
                    consumed,
                } => {
                    let frame = self.buf.split_to(consumed).freeze();
                    let metadata = frame.slice(metadata_range);
                    let parsed = gen::root_as_message(&metadata).map_err(|e| {
                        FormatParseSnafu {
                            format: "Message".to_string(),
                            reason: e.to_string(),
                        }
                        .build()
                    })?;

                    match parsed.header_type() {
                        gen::MessageHeader::Schema => {
                            if self.schema.is_some() {
                                return UnexpectedMessageSnafu {
                                    kind: gen::MessageHeader::Schema,
                                    expected: "record batch or end of stream",
                                }
                                .fail();
                            }
                            let fb_schema = parsed.header_as_schema().ok_or_else(|| {
                                OutOfSpecSnafu {
                                    msg: "schema message missing its header table".to_string(),
                                }
                                .build()
                            })?;
                            self.schema = Some(Arc::new(schema::decode_schema(fb_schema)?));
                        }
                        gen::MessageHeader::RecordBatch => {
                            let Some(schema) = self.schema.clone() else {
                                return UnexpectedMessageSnafu {
                                    kind: gen::MessageHeader::RecordBatch,
                                    expected: "schema",
                                }
                                .fail();
                            };
                            let body = frame.slice(body_range);
                            let rb = parsed.header_as_record_batch().ok_or_else(|| {
                                OutOfSpecSnafu {
                                    msg: "record batch message missing its header table".to_string(),
                                }
                                .build()
                            })?;
                            out.push(record_batch::decode_record_batch(&schema, rb, body)?);
                        }
                        other => {
                            return UnsupportedMessageSnafu {
                                msg: format!("{other:?}"),
                            }
                            .fail()
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

const FILE_MAGIC: &[u8] = b"ARROW1";
const HEADER_LEN: usize = 8;
const FOOTER_SIZE_FIELD_LEN: usize = 4;
const TRAILING_MAGIC_LEN: usize = 6;

/// Reads the Arrow IPC *file* format: validates both magic occurrences,
/// reads the footer, and hands the stream region in between off to
/// [`deserialize_all`]. The footer's block index is not consulted for
/// anything beyond existing; sequential stream parsing already recovers
/// every record batch in order.
pub struct FileReader {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl FileReader {
    pub fn try_new(bytes: Bytes) -> Result<Self> {
        let min_len = HEADER_LEN + FOOTER_SIZE_FIELD_LEN + TRAILING_MAGIC_LEN;
        if bytes.len() < min_len {
            return TruncatedSnafu {
                needed: min_len,
                got: bytes.len(),
            }
            .fail();
        }
        if &bytes[0..6] != FILE_MAGIC {
            return BadMagicSnafu {
                expected: FILE_MAGIC,
                got: bytes[0..6].to_vec(),
            }
            .fail();
        }
        let tail_start = bytes.len() - TRAILING_MAGIC_LEN;
        if &bytes[tail_start..] != FILE_MAGIC {
            return BadMagicSnafu {
                expected: FILE_MAGIC,
                got: bytes[tail_start..].to_vec(),
            }
            .fail();
        }

        let footer_size_at = tail_start - FOOTER_SIZE_FIELD_LEN;
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&bytes[footer_size_at..footer_size_at + 4]);
        let footer_size = i32::from_le_bytes(len_bytes);
        if footer_size < 0 || footer_size as usize > footer_size_at.saturating_sub(HEADER_LEN) {
            return OutOfSpecSnafu {
                msg: format!("footer_size {footer_size} exceeds the space available in the file"),
            }
            .fail();
        }
        let footer_start = footer_size_at - footer_size as usize;
        let footer_bytes = bytes.slice(footer_start..footer_size_at);
        let footer = gen::root_as_footer(&footer_bytes).map_err(|e| {
            FormatParseSnafu {
                format: "Footer".to_string(),
                reason: e.to_string(),
            }
            .build()
        })?;
        let fb_schema = footer.schema().ok_or_else(|| {
            OutOfSpecSnafu {
                msg: "file footer missing its schema".to_string(),
            }
            .build()
        })?;
        let schema = Arc::new(schema::decode_schema(fb_schema)?);

        let stream_region = bytes.slice(HEADER_LEN..footer_start);
        let batches = deserialize_all(stream_region)?;
        Ok(Self { schema, batches })
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn into_batches(self) -> Vec<RecordBatch> {
        self.batches
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow_array::{Int32Array, StringArray};
    use arrow_schema::{DataType, Field, Schema};

    use super::*;
    use crate::sink::ContiguousSink;
    use crate::writer::{FileWriter, IpcWriteOptions, StreamWriter};

    fn two_batches() -> (RecordBatch, RecordBatch) {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int32, false),
            Field::new("name", DataType::Utf8, false),
        ]));
        let first = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int32Array::from(vec![1, 2, 3])),
                Arc::new(StringArray::from(vec!["a", "b", "c"])),
            ],
        )
        .unwrap();
        let second = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int32Array::from(vec![4, 5])),
                Arc::new(StringArray::from(vec!["d", "e"])),
            ],
        )
        .unwrap();
        (first, second)
    }

    #[test]
    fn stream_round_trip_two_batches() {
        let (first, second) = two_batches();
        let mut writer = StreamWriter::try_new(ContiguousSink::new(), IpcWriteOptions::new()).unwrap();
        writer.write(&first).unwrap();
        writer.write(&second).unwrap();
        writer.end().unwrap();
        let bytes = Bytes::from(writer.into_inner().into_inner());

        let batches = deserialize_all(bytes).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], first);
        assert_eq!(batches[1], second);
    }

    #[test]
    fn chunked_reader_accepts_arbitrary_splits() {
        let (first, second) = two_batches();
        let mut writer = StreamWriter::try_new(ContiguousSink::new(), IpcWriteOptions::new()).unwrap();
        writer.write(&first).unwrap();
        writer.write(&second).unwrap();
        writer.end().unwrap();
        let bytes = writer.into_inner().into_inner();

        let mut reader = StreamReader::new();
        let mut out = Vec::new();
        for byte in &bytes {
            reader.push(std::slice::from_ref(byte), &mut out).unwrap();
        }
        assert!(reader.is_terminated());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], first);
        assert_eq!(out[1], second);
    }

    #[test]
    fn file_round_trip() {
        let (first, second) = two_batches();
        let mut writer = FileWriter::try_new(ContiguousSink::new(), IpcWriteOptions::new()).unwrap();
        writer.write(&first).unwrap();
        writer.write(&second).unwrap();
        writer.end().unwrap();
        let bytes = Bytes::from(writer.into_inner().into_inner());

        let reader = FileReader::try_new(bytes).unwrap();
        assert_eq!(reader.batches().len(), 2);
        assert_eq!(reader.batches()[0], first);
        assert_eq!(reader.batches()[1], second);
    }

    #[test]
    fn empty_stream_with_no_schema_yields_no_batches() {
        let mut buf = Vec::new();
        message::write_eos(&mut buf).unwrap();
        let batches = deserialize_all(Bytes::from(buf)).unwrap();
        assert!(batches.is_empty());
    }
}
