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

use std::sync::Arc;

use arrow_array::{Float64Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};

use arrow_ipc_codec::{deserialize_all, Compression, ContiguousSink, IpcWriteOptions, StreamWriter};

fn sample_batch(rows: usize) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("value", DataType::Float64, true),
        Field::new("label", DataType::Utf8, false),
    ]));
    let ids: Int64Array = (0..rows as i64).collect();
    let values: Float64Array = (0..rows)
        .map(|i| if i % 7 == 0 { None } else { Some(i as f64 * 0.5) })
        .collect();
    let labels = StringArray::from_iter_values((0..rows).map(|i| format!("row-{i}")));
    RecordBatch::try_new(schema, vec![Arc::new(ids), Arc::new(values), Arc::new(labels)]).unwrap()
}

fn write_stream(batch: &RecordBatch, options: IpcWriteOptions) -> Vec<u8> {
    let mut writer = StreamWriter::try_new(ContiguousSink::new(), options).unwrap();
    writer.write(batch).unwrap();
    writer.end().unwrap();
    writer.into_inner().into_inner()
}

fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_write");
    for rows in [1_000usize, 50_000] {
        let batch = sample_batch(rows);
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_function(format!("{rows}_rows_uncompressed"), |b| {
            b.iter_batched(
                || batch.clone(),
                |batch| black_box(write_stream(&batch, IpcWriteOptions::new())),
                BatchSize::SmallInput,
            )
        });
        group.bench_function(format!("{rows}_rows_lz4"), |b| {
            b.iter_batched(
                || batch.clone(),
                |batch| black_box(write_stream(&batch, IpcWriteOptions::new().with_compression(Compression::Lz4Frame))),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_read");
    for rows in [1_000usize, 50_000] {
        let batch = sample_batch(rows);
        let uncompressed = write_stream(&batch, IpcWriteOptions::new());
        let compressed = write_stream(&batch, IpcWriteOptions::new().with_compression(Compression::Lz4Frame));
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_function(format!("{rows}_rows_uncompressed"), |b| {
            b.iter_batched(
                || bytes::Bytes::from(uncompressed.clone()),
                |bytes| black_box(deserialize_all(bytes).unwrap()),
                BatchSize::SmallInput,
            )
        });
        group.bench_function(format!("{rows}_rows_lz4"), |b| {
            b.iter_batched(
                || bytes::Bytes::from(compressed.clone()),
                |bytes| black_box(deserialize_all(bytes).unwrap()),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_write, bench_read);
criterion_main!(benches);
