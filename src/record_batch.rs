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

//! C4: the record-batch (de)serializer.
//!
//! Both directions walk a record batch's arrays depth-first, in the same
//! order `schema::build_schema`/`decode_schema` walk the accompanying
//! field tree. The walk is expressed directly over `arrow_data::ArrayData`
//! rather than a second columnar representation of our own: `ArrayData`'s
//! `buffers()`/`child_data()`/`nulls()` already carry the per-node buffer
//! list the wire format wants, in the order the Arrow columnar spec
//! defines for each type.

use std::borrow::Cow;

use arrow_array::{make_array, Array, ArrayRef, RecordBatch};
use arrow_buffer::Buffer;
use arrow_data::{ArrayData, ArrayDataBuilder};
use arrow_schema::{DataType, Field, IntervalUnit, SchemaRef, UnionMode};
use bytes::Bytes;
use flatbuffers::{FlatBufferBuilder, UnionWIPOffset, WIPOffset};
use snafu::ResultExt;

use crate::compress::{self, Compression, CompressionCache};
use crate::error::{ArrowSnafu, OutOfSpecSnafu, Result, TruncatedSnafu, UnknownTypeSnafu};
use crate::format::gen;
use crate::message::align;

/// The flat, depth-first-ordered body this module produces on the write
/// side: the concatenated (and 8-byte-padded) buffer bytes, plus one
/// `Buffer{offset, length}` descriptor per buffer in traversal order.
pub(crate) struct EncodedBody {
    pub bytes: Vec<u8>,
    pub buffers: Vec<gen::Buffer>,
}

struct BodyBuilder {
    bytes: Vec<u8>,
    buffers: Vec<gen::Buffer>,
}

impl BodyBuilder {
    fn new() -> Self {
        Self {
            bytes: Vec::new(),
            buffers: Vec::new(),
        }
    }

    /// Appends one buffer's bytes to the body (optionally passing them
    /// through C2 first), records its descriptor, and pads the body out to
    /// the next 8-byte boundary.
    fn push(
        &mut self,
        raw: &[u8],
        compression: Option<Compression>,
        cache: Option<&mut CompressionCache>,
    ) -> Result<()> {
        let offset = self.bytes.len() as i64;
        let framed: Cow<'_, [u8]> = match compression {
            Some(codec) => Cow::Owned(match cache {
                Some(cache) => cache.get_or_compress(codec, raw)?,
                None => compress::compress(codec, raw)?,
            }),
            None => Cow::Borrowed(raw),
        };
        let length = framed.len() as i64;
        self.bytes.extend_from_slice(&framed);
        let pad = align(framed.len()) - framed.len();
        self.bytes.resize(self.bytes.len() + pad, 0);
        self.buffers.push(gen::Buffer { offset, length });
        Ok(())
    }

    fn finish(self) -> EncodedBody {
        EncodedBody {
            bytes: self.bytes,
            buffers: self.buffers,
        }
    }
}

/// Byte width of one element for the fixed-width scalar types whose single
/// data buffer isn't bit-packed and isn't itself an offsets buffer. `None`
/// means `data_type` needs special handling (`Boolean`, variable-length,
/// nested, or `Null`).
fn element_byte_width(data_type: &DataType) -> Option<usize> {
    use DataType::*;
    Some(match data_type {
        Int8 | UInt8 => 1,
        Int16 | UInt16 | Float16 => 2,
        Int32 | UInt32 | Float32 | Date32 | Time32(_) => 4,
        Int64 | UInt64 | Float64 | Date64 | Time64(_) | Timestamp(_, _) | Duration(_) => 8,
        Interval(IntervalUnit::YearMonth) => 4,
        Interval(IntervalUnit::DayTime) => 8,
        Interval(IntervalUnit::MonthDayNano) => 16,
        Decimal128(_, _) => 16,
        Decimal256(_, _) => 32,
        FixedSizeBinary(width) => (*width).max(0) as usize,
        _ => return None,
    })
}

/// Rebuilds the LSB-first validity bitmap for `data`, honoring its logical
/// `offset()`/`len()` rather than assuming it starts at a byte boundary.
/// Returns an empty vec when there is no materialized bitmap at all ("no
/// nulls"), per spec's zero-length-validity-buffer convention.
fn validity_bytes(data: &ArrayData) -> Vec<u8> {
    match data.nulls() {
        None => Vec::new(),
        Some(nulls) => {
            let len = data.len();
            let mut out = vec![0u8; len.div_ceil(8)];
            for i in 0..len {
                if nulls.is_valid(i) {
                    out[i / 8] |= 1 << (i % 8);
                }
            }
            out
        }
    }
}

/// Repacks a bit-packed buffer (the `Boolean` data buffer) starting at
/// `offset` for `len` bits into a freshly 0-based bitmap.
fn bitpacked_bytes(buf: &Buffer, offset: usize, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len.div_ceil(8)];
    for i in 0..len {
        if arrow_buffer::bit_util::get_bit(buf.as_slice(), offset + i) {
            arrow_buffer::bit_util::set_bit(&mut out, i);
        }
    }
    out
}

/// Rebases an offsets buffer (`i32` for `List`/`Binary`/`Utf8`/`Map`, `i64`
/// for the `Large*` variants) to start at zero after slicing to
/// `[offset, offset+len]`, per spec's `offsets[0] == 0` invariant.
/// Returns the rebased offsets bytes, and the `[start, start+len)` byte (or
/// element, for the caller to scale) range of the referenced child data.
fn rebase_offsets(buf: &Buffer, offset: usize, len: usize, large: bool) -> (Vec<u8>, usize, usize) {
    if large {
        let offsets = buf.typed_data::<i64>();
        let slice = &offsets[offset..=offset + len];
        let base = slice[0];
        let mut out = Vec::with_capacity(slice.len() * 8);
        for v in slice {
            out.extend_from_slice(&(v - base).to_le_bytes());
        }
        (out, base as usize, (slice[len] - base) as usize)
    } else {
        let offsets = buf.typed_data::<i32>();
        let slice = &offsets[offset..=offset + len];
        let base = slice[0];
        let mut out = Vec::with_capacity(slice.len() * 4);
        for v in slice {
            out.extend_from_slice(&(v - base).to_le_bytes());
        }
        (out, base as usize, (slice[len] - base) as usize)
    }
}

/// Appends one array's field node(s) and buffers to `nodes`/`body`,
/// recursing depth-first into children in the same order the schema's
/// `Field` tree was written.
fn visit(
    data: ArrayData,
    nodes: &mut Vec<gen::FieldNode>,
    body: &mut BodyBuilder,
    compression: Option<Compression>,
    mut cache: Option<&mut CompressionCache>,
) -> Result<()> {
    nodes.push(gen::FieldNode {
        length: data.len() as i64,
        null_count: data.null_count() as i64,
    });

    match data.data_type().clone() {
        DataType::Null => {}
        DataType::Union(_, mode) => {
            // Unions carry no validity bitmap: nullability lives in the
            // children (sparse) or is absent (dense, no empty slots).
            let type_ids = &data.buffers()[0];
            let bytes = &type_ids.as_slice()[data.offset()..data.offset() + data.len()];
            body.push(bytes, compression, cache.as_deref_mut())?;
            if matches!(mode, UnionMode::Dense) {
                let offsets = &data.buffers()[1];
                let start = data.offset() * 4;
                let bytes = &offsets.as_slice()[start..start + data.len() * 4];
                body.push(bytes, compression, cache.as_deref_mut())?;
            }
            for child in data.child_data() {
                visit(child.clone(), nodes, body, compression, cache.as_deref_mut())?;
            }
        }
        DataType::Struct(_) => {
            body.push(&validity_bytes(&data), compression, cache.as_deref_mut())?;
            for child in data.child_data() {
                let sliced = child.clone().slice(data.offset(), data.len());
                visit(sliced, nodes, body, compression, cache.as_deref_mut())?;
            }
        }
        DataType::FixedSizeList(_, size) => {
            body.push(&validity_bytes(&data), compression, cache.as_deref_mut())?;
            let size = size as usize;
            let child = data.child_data()[0]
                .clone()
                .slice(data.offset() * size, data.len() * size);
            visit(child, nodes, body, compression, cache.as_deref_mut())?;
        }
        ref dt @ (DataType::List(_) | DataType::LargeList(_) | DataType::Map(_, _)) => {
            body.push(&validity_bytes(&data), compression, cache.as_deref_mut())?;
            let large = matches!(dt, DataType::LargeList(_));
            let (offsets_bytes, child_start, child_len) =
                rebase_offsets(&data.buffers()[0], data.offset(), data.len(), large);
            body.push(&offsets_bytes, compression, cache.as_deref_mut())?;
            let child = data.child_data()[0].clone().slice(child_start, child_len);
            visit(child, nodes, body, compression, cache.as_deref_mut())?;
        }
        ref dt @ (DataType::Utf8 | DataType::Binary | DataType::LargeUtf8 | DataType::LargeBinary) => {
            body.push(&validity_bytes(&data), compression, cache.as_deref_mut())?;
            let large = matches!(dt, DataType::LargeUtf8 | DataType::LargeBinary);
            let (offsets_bytes, data_start, data_len) =
                rebase_offsets(&data.buffers()[0], data.offset(), data.len(), large);
            body.push(&offsets_bytes, compression, cache.as_deref_mut())?;
            let values = &data.buffers()[1];
            body.push(
                &values.as_slice()[data_start..data_start + data_len],
                compression,
                cache.as_deref_mut(),
            )?;
        }
        DataType::Boolean => {
            body.push(&validity_bytes(&data), compression, cache.as_deref_mut())?;
            let bits = bitpacked_bytes(&data.buffers()[0], data.offset(), data.len());
            body.push(&bits, compression, cache.as_deref_mut())?;
        }
        other => {
            body.push(&validity_bytes(&data), compression, cache.as_deref_mut())?;
            let width = element_byte_width(&other).ok_or_else(|| {
                UnknownTypeSnafu {
                    msg: format!("cannot compute a buffer layout for {other:?}"),
                }
                .build()
            })?;
            let values = &data.buffers()[0];
            let start = data.offset() * width;
            body.push(
                &values.as_slice()[start..start + data.len() * width],
                compression,
                cache.as_deref_mut(),
            )?;
        }
    }
    Ok(())
}

fn encode_columns(
    columns: &[ArrayRef],
    compression: Option<Compression>,
    mut cache: Option<&mut CompressionCache>,
) -> Result<(Vec<gen::FieldNode>, EncodedBody)> {
    let mut nodes = Vec::new();
    let mut body = BodyBuilder::new();
    for col in columns {
        visit(col.to_data(), &mut nodes, &mut body, compression, cache.as_deref_mut())?;
    }
    Ok((nodes, body.finish()))
}

/// Builds the `RecordBatch` FlatBuffer table for `batch`, wrapped as a
/// union value ready to hang off a `Message`, plus the serialized body.
pub(crate) fn build_record_batch_message<'a>(
    fbb: &mut FlatBufferBuilder<'a>,
    batch: &RecordBatch,
    compression: Option<Compression>,
    cache: Option<&mut CompressionCache>,
) -> Result<(WIPOffset<UnionWIPOffset>, EncodedBody)> {
    let (nodes, body) = encode_columns(batch.columns(), compression, cache)?;

    let nodes_vec = fbb.create_vector(&nodes);
    let buffers_vec = fbb.create_vector(&body.buffers);
    let compression_off = compression.map(|codec| {
        let mut w = gen::TableWriter::start(fbb);
        w.push_scalar(gen::BodyCompression::VT_CODEC, codec.to_wire(), gen::CompressionType::Lz4Frame);
        w.push_scalar(
            gen::BodyCompression::VT_METHOD,
            gen::BodyCompressionMethod::Buffer,
            gen::BodyCompressionMethod::Buffer,
        );
        let off: WIPOffset<gen::BodyCompression<'a>> = w.finish();
        off
    });

    let mut w = gen::TableWriter::start(fbb);
    w.push_scalar(gen::RecordBatch::VT_LENGTH, batch.num_rows() as i64, 0);
    w.push_offset(gen::RecordBatch::VT_NODES, Some(nodes_vec));
    w.push_offset(gen::RecordBatch::VT_BUFFERS, Some(buffers_vec));
    w.push_offset(gen::RecordBatch::VT_COMPRESSION, compression_off);
    let off: WIPOffset<gen::RecordBatch<'a>> = w.finish();
    Ok((off.as_union_value(), body))
}

/// Cursor over a parsed `RecordBatch` message's field-node and buffer
/// lists, consumed depth-first by [`build_array`] in lockstep with the
/// schema's `Field` tree.
struct Cursor<'a> {
    nodes: &'a [gen::FieldNode],
    buffers: &'a [gen::Buffer],
    node_idx: usize,
    buf_idx: usize,
    body: &'a Bytes,
    compression: Option<Compression>,
}

impl<'a> Cursor<'a> {
    fn next_node(&mut self) -> Result<(i64, i64)> {
        let node = self.nodes.get(self.node_idx).ok_or_else(|| {
            TruncatedSnafu {
                needed: self.node_idx + 1,
                got: self.nodes.len(),
            }
            .build()
        })?;
        self.node_idx += 1;
        Ok((node.length, node.null_count))
    }

    /// Fetches the next buffer, decompressing it through C2 if the batch
    /// carries a `BodyCompression`. The uncompressed path slices `body`
    /// zero-copy; the compressed path always owns its bytes, since a
    /// decompressed buffer has no backing region in the original input to
    /// borrow from.
    fn next_buffer(&mut self) -> Result<Buffer> {
        let desc = self.buffers.get(self.buf_idx).ok_or_else(|| {
            TruncatedSnafu {
                needed: self.buf_idx + 1,
                got: self.buffers.len(),
            }
            .build()
        })?;
        self.buf_idx += 1;
        let start = desc.offset as usize;
        let len = desc.length as usize;
        let end = start.checked_add(len).ok_or_else(|| {
            OutOfSpecSnafu {
                msg: "buffer offset overflowed".to_string(),
            }
            .build()
        })?;
        if end > self.body.len() {
            return OutOfSpecSnafu {
                msg: format!("buffer range {start}..{end} exceeds body of {} bytes", self.body.len()),
            }
            .fail();
        }
        let framed = self.body.slice(start..end);
        Ok(match self.compression {
            None => Buffer::from(framed),
            Some(codec) => match compress::decompress(codec, &framed)? {
                Cow::Borrowed(_) => Buffer::from(framed.slice(8..)),
                Cow::Owned(owned) => Buffer::from_vec(owned),
            },
        })
    }
}

fn apply_validity(builder: ArrayDataBuilder, validity: Buffer, null_count: i64, _length: usize) -> ArrayDataBuilder {
    if validity.is_empty() {
        // A zero-length validity buffer means "no nulls"; the metadata's own
        // null_count is not trusted in this case.
        builder.null_count(0)
    } else {
        builder.null_bit_buffer(Some(validity)).null_count(null_count as usize)
    }
}

fn build_array(field: &Field, cursor: &mut Cursor<'_>) -> Result<ArrayRef> {
    let (length, null_count) = cursor.next_node()?;
    let length = length as usize;
    let data_type = field.data_type().clone();

    let data = match data_type.clone() {
        DataType::Null => ArrayData::new_null(&data_type, length),
        DataType::Union(fields, mode) => {
            let type_ids = cursor.next_buffer()?;
            let offsets = matches!(mode, UnionMode::Dense).then(|| cursor.next_buffer()).transpose()?;
            let mut builder = ArrayDataBuilder::new(data_type.clone()).len(length).add_buffer(type_ids);
            if let Some(offsets) = offsets {
                builder = builder.add_buffer(offsets);
            }
            for (_, child_field) in fields.iter() {
                let child = build_array(&child_field, cursor)?;
                builder = builder.add_child_data(child.to_data());
            }
            builder.build().context(ArrowSnafu)?
        }
        DataType::Struct(fields) => {
            let validity = cursor.next_buffer()?;
            let mut builder = ArrayDataBuilder::new(data_type.clone()).len(length);
            builder = apply_validity(builder, validity, null_count, length);
            for child_field in fields.iter() {
                let child = build_array(child_field, cursor)?;
                builder = builder.add_child_data(child.to_data());
            }
            builder.build().context(ArrowSnafu)?
        }
        DataType::FixedSizeList(child_field, _) => {
            let validity = cursor.next_buffer()?;
            let child = build_array(&child_field, cursor)?;
            let mut builder = ArrayDataBuilder::new(data_type.clone())
                .len(length)
                .add_child_data(child.to_data());
            builder = apply_validity(builder, validity, null_count, length);
            builder.build().context(ArrowSnafu)?
        }
        DataType::List(child_field) | DataType::LargeList(child_field) | DataType::Map(child_field, _) => {
            let validity = cursor.next_buffer()?;
            let offsets = cursor.next_buffer()?;
            let child = build_array(&child_field, cursor)?;
            let mut builder = ArrayDataBuilder::new(data_type.clone())
                .len(length)
                .add_buffer(offsets)
                .add_child_data(child.to_data());
            builder = apply_validity(builder, validity, null_count, length);
            builder.build().context(ArrowSnafu)?
        }
        DataType::Utf8 | DataType::Binary | DataType::LargeUtf8 | DataType::LargeBinary => {
            let validity = cursor.next_buffer()?;
            let offsets = cursor.next_buffer()?;
            let values = cursor.next_buffer()?;
            let mut builder = ArrayDataBuilder::new(data_type.clone())
                .len(length)
                .add_buffer(offsets)
                .add_buffer(values);
            builder = apply_validity(builder, validity, null_count, length);
            builder.build().context(ArrowSnafu)?
        }
        _ => {
            let validity = cursor.next_buffer()?;
            let values = cursor.next_buffer()?;
            let mut builder = ArrayDataBuilder::new(data_type.clone()).len(length).add_buffer(values);
            builder = apply_validity(builder, validity, null_count, length);
            builder.build().context(ArrowSnafu)?
        }
    };
    Ok(make_array(data))
}

/// Reconstructs a `RecordBatch` from a parsed `RecordBatch` FlatBuffer
/// message and its body, walking `schema`'s fields depth-first in lockstep
/// with the field-node and buffer cursors.
pub(crate) fn decode_record_batch(
    schema: &SchemaRef,
    rb: gen::RecordBatch<'_>,
    body: Bytes,
) -> Result<RecordBatch> {
    let nodes: Vec<gen::FieldNode> = rb.nodes().map(|v| v.iter().collect()).unwrap_or_default();
    let buffers: Vec<gen::Buffer> = rb.buffers().map(|v| v.iter().collect()).unwrap_or_default();
    let compression = rb
        .compression()
        .map(|c| Compression::from_wire(c.codec()))
        .transpose()?;

    let mut cursor = Cursor {
        nodes: &nodes,
        buffers: &buffers,
        node_idx: 0,
        buf_idx: 0,
        body: &body,
        compression,
    };

    let mut columns = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        columns.push(build_array(field, &mut cursor)?);
    }
    if cursor.node_idx != nodes.len() || cursor.buf_idx != buffers.len() {
        return OutOfSpecSnafu {
            msg: "record batch metadata had leftover field nodes or buffers after decoding its schema's fields",
        }
        .fail();
    }
    RecordBatch::try_new(schema.clone(), columns).context(ArrowSnafu)
}
