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

//! A standalone encoder/decoder for the Apache Arrow IPC stream and file
//! formats, independent of any particular transport.
//!
//! - [`StreamWriter`] and [`FileWriter`] serialize [`arrow_array::RecordBatch`]
//!   values to any [`Sink`].
//! - [`deserialize_all`], [`StreamReader`] and [`FileReader`] reverse the
//!   process, the latter accepting input one chunk at a time for callers
//!   that don't have the whole stream in memory up front.
//!
//! ```
//! use std::sync::Arc;
//!
//! use arrow_array::{Int32Array, RecordBatch};
//! use arrow_schema::{DataType, Field, Schema};
//! use arrow_ipc_codec::{deserialize_all, ContiguousSink, IpcWriteOptions, StreamWriter};
//!
//! let schema = Arc::new(Schema::new(vec![Field::new("n", DataType::Int32, false)]));
//! let batch = RecordBatch::try_new(schema, vec![Arc::new(Int32Array::from(vec![1, 2, 3]))]).unwrap();
//!
//! let mut writer = StreamWriter::try_new(ContiguousSink::new(), IpcWriteOptions::new()).unwrap();
//! writer.write(&batch).unwrap();
//! writer.end().unwrap();
//!
//! let bytes = bytes::Bytes::from(writer.into_inner().into_inner());
//! let batches = deserialize_all(bytes).unwrap();
//! assert_eq!(batches[0], batch);
//! ```

pub mod compress;
pub mod error;
pub mod format;
pub mod message;
pub mod reader;
pub mod record_batch;
pub mod schema;
pub mod sink;
pub mod writer;

pub use compress::{Compression, CompressionCache};
pub use error::{IpcError, Result};
pub use reader::{deserialize_all, FileReader, StreamReader};
pub use sink::{ChunkedSink, ContiguousSink, FileSink, Sink};
pub use writer::{FileWriter, IpcWriteOptions, StreamWriter};
