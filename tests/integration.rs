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

//! Multi-batch stream/file scenarios, schema-consistency enforcement, and
//! cross-validation against the `arrow` crate's own IPC reader/writer
//! (spec.md §8's scenario 1 and 6, plus the file-format and chunked-reader
//! boundary properties).

use std::io::Cursor;
use std::sync::Arc;

use arrow_array::builder::{ListBuilder, StringBuilder};
use arrow_array::{Int32Array, Int64Array, RecordBatch, StringArray, StructArray};
use arrow_schema::{DataType, Field, Fields, Schema};
use pretty_assertions::assert_eq;
use std::collections::HashMap;

use arrow_ipc_codec::{
    Compression, ContiguousSink, FileReader, FileWriter, IpcWriteOptions, StreamReader, StreamWriter,
};

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
fn two_batches_round_trip_in_order() {
    let (first, second) = two_batches();
    let mut writer = StreamWriter::try_new(ContiguousSink::new(), IpcWriteOptions::new()).unwrap();
    writer.write(&first).unwrap();
    writer.write(&second).unwrap();
    writer.end().unwrap();
    let bytes = bytes::Bytes::from(writer.into_inner().into_inner());

    let batches = arrow_ipc_codec::deserialize_all(bytes).unwrap();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0], first);
    assert_eq!(batches[1], second);
}

#[test]
fn schema_mismatch_rejects_the_offending_batch_only() {
    let schema_a = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int32, false),
        Field::new("name", DataType::Utf8, false),
    ]));
    let schema_b = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, false),
    ]));
    let first = RecordBatch::try_new(
        schema_a,
        vec![
            Arc::new(Int32Array::from(vec![1, 2, 3])),
            Arc::new(StringArray::from(vec!["a", "b", "c"])),
        ],
    )
    .unwrap();
    let second = RecordBatch::try_new(
        schema_b,
        vec![
            Arc::new(Int64Array::from(vec![4i64, 5])),
            Arc::new(StringArray::from(vec!["d", "e"])),
        ],
    )
    .unwrap();

    let mut writer = StreamWriter::try_new(ContiguousSink::new(), IpcWriteOptions::new()).unwrap();
    writer.write(&first).unwrap();
    let bytes_before = writer.get_ref().size();

    let err = writer.write(&second).unwrap_err();
    assert!(matches!(err, arrow_ipc_codec::IpcError::SchemaMismatch { .. }));
    assert_eq!(writer.get_ref().size(), bytes_before, "rejected batch wrote no bytes");

    // The mismatch check runs before any bytes are written for `second`, so
    // the writer itself is not poisoned; the stream can still be closed
    // normally and contains exactly the one accepted batch.
    writer.end().unwrap();

    let bytes = bytes::Bytes::from(writer.into_inner().into_inner());
    let batches = arrow_ipc_codec::deserialize_all(bytes).unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0], first);
}

#[test]
fn file_format_round_trips_with_correct_magic_and_size_accounting() {
    let (first, second) = two_batches();
    let mut writer = FileWriter::try_new(ContiguousSink::new(), IpcWriteOptions::new()).unwrap();
    writer.write(&first).unwrap();
    writer.write(&second).unwrap();
    writer.end().unwrap();
    let bytes = writer.into_inner().into_inner();

    assert_eq!(&bytes[0..6], b"ARROW1");
    assert_eq!(&bytes[bytes.len() - 6..], b"ARROW1");

    let footer_size_at = bytes.len() - 6 - 4;
    let footer_size =
        i32::from_le_bytes(bytes[footer_size_at..footer_size_at + 4].try_into().unwrap()) as usize;
    assert_eq!(bytes.len(), 8 + (footer_size_at - 8) + footer_size + 4 + 6);

    let reader = FileReader::try_new(bytes::Bytes::from(bytes)).unwrap();
    assert_eq!(reader.batches().len(), 2);
    assert_eq!(reader.batches()[0], first);
    assert_eq!(reader.batches()[1], second);
}

#[test]
fn chunked_reader_handles_byte_at_a_time_input() {
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
    assert_eq!(out, vec![first, second]);
}

#[test]
fn incompressible_buffers_round_trip_via_uncompressed_fallback() {
    // A tiny batch compresses worse than it starts: every buffer should take
    // the `-1`-header uncompressed path and still round-trip exactly.
    let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int32, false)]));
    let batch = RecordBatch::try_new(schema, vec![Arc::new(Int32Array::from(vec![1, 2]))]).unwrap();

    for codec in [Compression::Lz4Frame, Compression::Zstd] {
        let options = IpcWriteOptions::new().with_compression(codec);
        let mut writer = StreamWriter::try_new(ContiguousSink::new(), options).unwrap();
        writer.write(&batch).unwrap();
        writer.end().unwrap();
        let bytes = bytes::Bytes::from(writer.into_inner().into_inner());
        let batches = arrow_ipc_codec::deserialize_all(bytes).unwrap();
        assert_eq!(batches, vec![batch.clone()]);
    }
}

#[test]
fn compressible_buffers_round_trip_both_codecs() {
    let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int32, false)]));
    let batch = RecordBatch::try_new(
        schema,
        vec![Arc::new(Int32Array::from(vec![7; 4096]))],
    )
    .unwrap();

    for codec in [Compression::Lz4Frame, Compression::Zstd] {
        let options = IpcWriteOptions::new().with_compression(codec);
        let mut writer = StreamWriter::try_new(ContiguousSink::new(), options).unwrap();
        writer.write(&batch).unwrap();
        writer.end().unwrap();
        let bytes = bytes::Bytes::from(writer.into_inner().into_inner());
        let batches = arrow_ipc_codec::deserialize_all(bytes).unwrap();
        assert_eq!(batches, vec![batch.clone()]);
    }
}

/// Cross-validates this crate's stream output against the reference
/// `arrow-ipc` implementation: bytes this crate writes must be readable by
/// any conforming Arrow implementation, not just by this crate's own reader.
#[test]
fn output_is_readable_by_the_reference_arrow_ipc_reader() {
    let (first, second) = two_batches();
    let mut writer = StreamWriter::try_new(ContiguousSink::new(), IpcWriteOptions::new()).unwrap();
    writer.write(&first).unwrap();
    writer.write(&second).unwrap();
    writer.end().unwrap();
    let bytes = writer.into_inner().into_inner();

    let reference_reader = arrow::ipc::reader::StreamReader::try_new(Cursor::new(bytes), None).unwrap();
    let batches: Vec<_> = reference_reader.collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0], first);
    assert_eq!(batches[1], second);
}

/// Same cross-validation as `output_is_readable_by_the_reference_arrow_ipc_reader`,
/// but over a schema with `children` on the `Field` table (a `List` and a
/// `Struct`) and field-level `custom_metadata`. A self-round-trip through
/// this crate's own reader can't catch a vtable offset bug shared by both the
/// write and read sides of `Field`; only the reference implementation, which
/// reads the table against the published offsets, can.
#[test]
fn nested_schema_with_field_metadata_is_readable_by_the_reference_arrow_ipc_reader() {
    let tags_item = Arc::new(Field::new("item", DataType::Utf8, true));
    let tags_field = Field::new("tags", DataType::List(tags_item), false).with_metadata(HashMap::from([(
        "unit".to_string(),
        "label".to_string(),
    )]));
    let point_fields = Fields::from(vec![
        Field::new("x", DataType::Int32, false),
        Field::new("y", DataType::Int32, false),
    ]);
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int32, false),
        tags_field,
        Field::new("point", DataType::Struct(point_fields.clone()), false),
    ]));

    let mut tags_builder = ListBuilder::new(StringBuilder::new());
    tags_builder.values().append_value("a");
    tags_builder.values().append_value("b");
    tags_builder.append(true);
    tags_builder.append(true); // empty list
    let tags = tags_builder.finish();

    let xs = Arc::new(Int32Array::from(vec![1, 2]));
    let ys = Arc::new(Int32Array::from(vec![10, 20]));
    let point = StructArray::new(point_fields, vec![xs, ys], None);

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int32Array::from(vec![1, 2])),
            Arc::new(tags),
            Arc::new(point),
        ],
    )
    .unwrap();

    let mut writer = StreamWriter::try_new(ContiguousSink::new(), IpcWriteOptions::new()).unwrap();
    writer.write(&batch).unwrap();
    writer.end().unwrap();
    let bytes = writer.into_inner().into_inner();

    let reference_reader = arrow::ipc::reader::StreamReader::try_new(Cursor::new(bytes), None).unwrap();
    let batches: Vec<_> = reference_reader.collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0], batch);
    assert_eq!(batches[0].schema().field(1).metadata().get("unit"), Some(&"label".to_string()));
}

/// And the reverse direction: this crate's reader must accept a stream
/// produced by the reference implementation.
#[test]
fn reference_arrow_ipc_output_is_readable_by_this_crate() {
    let (first, second) = two_batches();
    let mut buf = Vec::new();
    {
        let mut reference_writer =
            arrow::ipc::writer::StreamWriter::try_new(&mut buf, &first.schema()).unwrap();
        reference_writer.write(&first).unwrap();
        reference_writer.write(&second).unwrap();
        reference_writer.finish().unwrap();
    }

    let batches = arrow_ipc_codec::deserialize_all(bytes::Bytes::from(buf)).unwrap();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0], first);
    assert_eq!(batches[1], second);
}

#[test]
fn empty_stream_produces_exactly_one_end_of_stream_sentinel() {
    let mut writer = StreamWriter::try_new(ContiguousSink::new(), IpcWriteOptions::new()).unwrap();
    writer.end().unwrap();
    let bytes = writer.into_inner().into_inner();
    // continuation marker (4) + zero metadata length (4), nothing else.
    assert_eq!(bytes.len(), 8);
    assert_eq!(&bytes[0..4], &0xFFFF_FFFFu32.to_le_bytes());
    assert_eq!(&bytes[4..8], &0i32.to_le_bytes());
}
