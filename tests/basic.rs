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

//! Single-feature round trips: one batch, one column, exercising one type
//! or edge case at a time (spec.md §8's concrete scenarios 2-5).

use std::sync::Arc;

use arrow_array::builder::{ListBuilder, StringBuilder};
use arrow_array::{Array, Decimal128Array, FixedSizeBinaryArray, Int32Array, RecordBatch};
use arrow_schema::{DataType, Field, Schema};
use pretty_assertions::assert_eq;

use arrow_ipc_codec::{deserialize_all, ContiguousSink, IpcWriteOptions, StreamWriter};

fn round_trip(batch: &RecordBatch) -> RecordBatch {
    let mut writer = StreamWriter::try_new(ContiguousSink::new(), IpcWriteOptions::new()).unwrap();
    writer.write(batch).unwrap();
    writer.end().unwrap();
    let bytes = bytes::Bytes::from(writer.into_inner().into_inner());
    let mut batches = deserialize_all(bytes).unwrap();
    assert_eq!(batches.len(), 1);
    batches.remove(0)
}

#[test]
fn nulls_preserve_bitmap_and_null_count() {
    let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int32, true)]));
    let values = Int32Array::from(vec![Some(10), None, Some(30), None, Some(50)]);
    let batch = RecordBatch::try_new(schema, vec![Arc::new(values)]).unwrap();

    let decoded = round_trip(&batch);
    assert_eq!(decoded, batch);

    let column = decoded.column(0).as_any().downcast_ref::<Int32Array>().unwrap();
    assert_eq!(column.null_count(), 2);
    assert!(column.is_null(1));
    assert!(column.is_null(3));
    assert!(!column.is_null(0));
}

#[test]
fn fixed_size_binary_round_trips_exact_bytes() {
    let schema = Arc::new(Schema::new(vec![Field::new(
        "payload",
        DataType::FixedSizeBinary(4),
        false,
    )]));
    let values = FixedSizeBinaryArray::try_from_iter(
        vec![b"abcd".as_ref(), b"efgh".as_ref(), b"ijkl".as_ref()].into_iter(),
    )
    .unwrap();
    let batch = RecordBatch::try_new(schema, vec![Arc::new(values)]).unwrap();

    let decoded = round_trip(&batch);
    assert_eq!(decoded, batch);
    let column = decoded
        .column(0)
        .as_any()
        .downcast_ref::<FixedSizeBinaryArray>()
        .unwrap();
    assert_eq!(column.value(0), b"abcd");
    assert_eq!(column.value(1), b"efgh");
    assert_eq!(column.value(2), b"ijkl");
}

#[test]
fn decimal128_preserves_integer_payload_and_format() {
    let data_type = DataType::Decimal128(9, 2);
    let schema = Arc::new(Schema::new(vec![Field::new("price", data_type.clone(), false)]));
    let values = Decimal128Array::from(vec![123i128, 45600, -9900])
        .with_precision_and_scale(9, 2)
        .unwrap();
    let batch = RecordBatch::try_new(schema, vec![Arc::new(values)]).unwrap();

    assert_eq!(arrow_ipc_codec::schema::encode_format(&data_type).unwrap(), "d:9,2");

    let decoded = round_trip(&batch);
    assert_eq!(decoded, batch);
    let column = decoded
        .column(0)
        .as_any()
        .downcast_ref::<Decimal128Array>()
        .unwrap();
    assert_eq!(column.value(0), 123);
    assert_eq!(column.value(1), 45600);
    assert_eq!(column.value(2), -9900);
}

#[test]
fn nested_list_of_utf8_round_trips() {
    let item_field = Arc::new(Field::new("item", DataType::Utf8, true));
    let schema = Arc::new(Schema::new(vec![Field::new(
        "tags",
        DataType::List(item_field),
        false,
    )]));

    let mut builder = ListBuilder::new(StringBuilder::new());
    builder.values().append_value("x");
    builder.values().append_value("y");
    builder.append(true);
    builder.append(true); // empty list
    builder.values().append_value("z");
    builder.append(true);
    let values = builder.finish();

    let batch = RecordBatch::try_new(schema, vec![Arc::new(values)]).unwrap();
    let decoded = round_trip(&batch);
    assert_eq!(decoded, batch);
}

#[test]
fn zero_row_batch_round_trips_and_produces_non_empty_message() {
    let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int32, false)]));
    let batch = RecordBatch::try_new(schema, vec![Arc::new(Int32Array::from(Vec::<i32>::new()))]).unwrap();

    let mut writer = StreamWriter::try_new(ContiguousSink::new(), IpcWriteOptions::new()).unwrap();
    writer.write(&batch).unwrap();
    writer.end().unwrap();
    let bytes = writer.into_inner().into_inner();
    assert!(!bytes.is_empty(), "schema + batch + EOS must produce a non-empty stream");

    let decoded = round_trip(&batch);
    assert_eq!(decoded, batch);
    assert_eq!(decoded.num_rows(), 0);
}

#[test]
fn all_valid_column_accepts_either_bitmap_shape_on_read() {
    // `Int32Array::from(Vec<i32>)` builds an `ArrayData` with no materialized
    // null buffer at all, so the writer's `validity_bytes` emits a
    // zero-length buffer for this column (it only builds a bitmap when
    // `ArrayData::nulls()` is `Some`). This pins the zero-length-validity-
    // buffer half of the read-side contract: `apply_validity` must treat an
    // empty buffer as "no nulls" rather than trying to interpret it as a
    // bitmap.
    let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int32, false)]));
    let values = Int32Array::from(vec![1, 2, 3, 4]);
    let batch = RecordBatch::try_new(schema, vec![Arc::new(values)]).unwrap();

    let decoded = round_trip(&batch);
    let column = decoded.column(0).as_any().downcast_ref::<Int32Array>().unwrap();
    assert_eq!(column.null_count(), 0);
}
