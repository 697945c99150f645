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

//! C5 write side: schema-first stream sequencing, plus the file-format
//! wrapper that adds a magic header, a footer, and the footer-size suffix.

use std::sync::Arc;

use arrow_array::RecordBatch;
use arrow_schema::{DataType, SchemaRef};
use flatbuffers::{FlatBufferBuilder, WIPOffset};

use crate::compress::{Compression, CompressionCache};
use crate::error::{InvalidStateSnafu, Result, SchemaMismatchSnafu};
use crate::format::{self, gen};
use crate::message;
use crate::record_batch::build_record_batch_message;
use crate::schema::{self, fingerprint, SchemaFingerprint};
use crate::sink::{Sink, SinkWriter};

/// Per-writer tuning. The only knob either orchestrator needs: whether (and
/// with what codec) to compress record-batch body buffers.
#[derive(Debug, Clone, Copy, Default)]
pub struct IpcWriteOptions {
    pub compression: Option<Compression>,
}

impl IpcWriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = Some(compression);
        self
    }
}

enum WriterState {
    BeforeSchema,
    Writing(SchemaFingerprint, SchemaRef),
    Ended,
    Poisoned,
}

/// Writes the Arrow IPC *stream* format: a schema message (emitted lazily,
/// on the first batch), record-batch messages in call order, then the
/// end-of-stream sentinel.
pub struct StreamWriter<S: Sink> {
    sink: S,
    options: IpcWriteOptions,
    cache: CompressionCache,
    state: WriterState,
}

impl<S: Sink> StreamWriter<S> {
    pub fn try_new(sink: S, options: IpcWriteOptions) -> Result<Self> {
        Ok(Self {
            sink,
            options,
            cache: CompressionCache::new(),
            state: WriterState::BeforeSchema,
        })
    }

    /// Writes `batch`, emitting the schema message first if this is the
    /// first call. A schema that doesn't structurally match the first
    /// batch's is rejected with `SchemaMismatch` and writes nothing for
    /// this batch; any other failure poisons the writer.
    pub fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        self.write_core(batch).map(|_| ())
    }

    /// Writes each of `batches` in order, stopping at the first error.
    pub fn write_batches<'b>(&mut self, batches: impl IntoIterator<Item = &'b RecordBatch>) -> Result<()> {
        for batch in batches {
            self.write(batch)?;
        }
        Ok(())
    }

    /// Emits the end-of-stream sentinel. A no-op if already called.
    pub fn end(&mut self) -> Result<()> {
        match self.state {
            WriterState::Ended => return Ok(()),
            WriterState::Poisoned => {
                return InvalidStateSnafu {
                    msg: "writer is poisoned after a previous error",
                }
                .fail()
            }
            _ => {}
        }
        message::write_eos(&mut SinkWriter(&mut self.sink))?;
        self.state = WriterState::Ended;
        Ok(())
    }

    pub fn into_inner(self) -> S {
        self.sink
    }

    pub fn get_ref(&self) -> &S {
        &self.sink
    }

    /// Ensures the schema is emitted and the schema-consistency check
    /// passes, then writes the record-batch message. Returns the
    /// `(metadata_length, body_length)` pair the file writer's footer
    /// block index needs.
    fn write_core(&mut self, batch: &RecordBatch) -> Result<(i64, i64)> {
        match &self.state {
            WriterState::Poisoned => {
                return InvalidStateSnafu {
                    msg: "writer is poisoned after a previous error",
                }
                .fail()
            }
            WriterState::Ended => {
                return InvalidStateSnafu {
                    msg: "writer has already been ended",
                }
                .fail()
            }
            _ => {}
        }

        if matches!(self.state, WriterState::BeforeSchema) {
            self.write_schema_message(batch.schema_ref())?;
            self.state = WriterState::Writing(fingerprint(batch.schema_ref()), batch.schema_ref().clone());
        } else if let WriterState::Writing(known_fingerprint, known_schema) = &self.state {
            let this_fingerprint = fingerprint(batch.schema_ref());
            if this_fingerprint != *known_fingerprint {
                let stream = Box::new(DataType::Struct(known_schema.fields().clone()));
                let batch_type = Box::new(DataType::Struct(batch.schema_ref().fields().clone()));
                return SchemaMismatchSnafu {
                    stream,
                    batch: batch_type,
                }
                .fail();
            }
        }

        match self.write_batch_message(batch) {
            Ok(sizes) => Ok(sizes),
            Err(err) => {
                self.state = WriterState::Poisoned;
                Err(err)
            }
        }
    }

    fn write_schema_message(&mut self, schema: &SchemaRef) -> Result<()> {
        let mut fbb = FlatBufferBuilder::new();
        let schema_off = schema::build_schema(&mut fbb, schema)?;
        format::finish_message(&mut fbb, gen::MessageHeader::Schema, schema_off.as_union_value(), 0);
        message::write_message(&mut SinkWriter(&mut self.sink), fbb.finished_data(), &[])?;
        tracing::debug!(fields = schema.fields().len(), "wrote schema message");
        Ok(())
    }

    fn write_batch_message(&mut self, batch: &RecordBatch) -> Result<(i64, i64)> {
        let mut fbb = FlatBufferBuilder::new();
        let (union_off, body) =
            build_record_batch_message(&mut fbb, batch, self.options.compression, Some(&mut self.cache))?;
        format::finish_message(&mut fbb, gen::MessageHeader::RecordBatch, union_off, body.bytes.len() as i64);
        let sizes = message::write_message(&mut SinkWriter(&mut self.sink), fbb.finished_data(), &body.bytes)?;
        tracing::debug!(rows = batch.num_rows(), body_bytes = body.bytes.len(), "wrote record batch message");
        Ok(sizes)
    }
}

const FILE_MAGIC: &[u8] = b"ARROW1";

/// Writes the Arrow IPC *file* format: `ARROW1` magic, the stream body, a
/// footer (schema plus a block index), the footer size, and the trailing
/// magic.
pub struct FileWriter<S: Sink> {
    inner: StreamWriter<S>,
    blocks: Vec<gen::Block>,
    schema: Option<SchemaRef>,
    finished: bool,
}

impl<S: Sink> FileWriter<S> {
    pub fn try_new(mut sink: S, options: IpcWriteOptions) -> Result<Self> {
        sink.write(FILE_MAGIC)?;
        sink.write_fill(0, 2)?;
        Ok(Self {
            inner: StreamWriter::try_new(sink, options)?,
            blocks: Vec::new(),
            schema: None,
            finished: false,
        })
    }

    pub fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        if self.schema.is_none() {
            self.schema = Some(batch.schema_ref().clone());
        }
        let offset = self.inner.sink.size() as i64;
        let (metadata_length, body_length) = self.inner.write_core(batch)?;
        self.blocks.push(gen::Block {
            offset,
            meta_data_length: metadata_length as i32,
            padding: 0,
            body_length,
        });
        Ok(())
    }

    pub fn write_batches<'b>(&mut self, batches: impl IntoIterator<Item = &'b RecordBatch>) -> Result<()> {
        for batch in batches {
            self.write(batch)?;
        }
        Ok(())
    }

    /// Writes the end-of-stream sentinel, then the footer, footer size and
    /// trailing magic. Idempotent.
    pub fn end(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.inner.end()?;

        let schema = self
            .schema
            .clone()
            .unwrap_or_else(|| Arc::new(arrow_schema::Schema::empty()));
        let mut fbb = FlatBufferBuilder::new();
        let schema_off = schema::build_schema(&mut fbb, &schema)?;
        let blocks_vec = fbb.create_vector(&self.blocks);
        let mut w = gen::TableWriter::start(&mut fbb);
        w.push_scalar(gen::Footer::VT_VERSION, format::METADATA_VERSION, gen::MetadataVersion::V1);
        w.push_offset(gen::Footer::VT_SCHEMA, Some(schema_off));
        w.push_offset(gen::Footer::VT_RECORD_BATCHES, Some(blocks_vec));
        let footer_off: WIPOffset<gen::Footer> = w.finish();
        fbb.finish(footer_off, None);

        let footer_bytes = fbb.finished_data();
        self.inner.sink.write(footer_bytes)?;
        self.inner.sink.write(&(footer_bytes.len() as i32).to_le_bytes())?;
        self.inner.sink.write(FILE_MAGIC)?;
        self.finished = true;
        Ok(())
    }

    pub fn into_inner(self) -> S {
        self.inner.into_inner()
    }
}

impl<S: Sink> Drop for FileWriter<S> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(err) = self.end() {
                tracing::warn!(error = %err, "failed to finalize Arrow IPC file on drop; sink is left as a valid stream prefix only");
            }
        }
    }
}
