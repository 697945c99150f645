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

use arrow_schema::{ArrowError, DataType as ArrowDataType};
use snafu::prelude::*;
use snafu::Location;

use crate::format::gen::MessageHeader;

/// Errors produced while encoding or decoding Arrow IPC messages.
///
/// A single sum type covers every failure mode described by the format:
/// truncated input, malformed framing, unsupported message kinds and
/// compression failures all surface here rather than through panics.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum IpcError {
    #[snafu(display("Truncated input: needed at least {} bytes, got {}", needed, got))]
    Truncated {
        needed: usize,
        got: usize,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Bad magic bytes: expected {:?}, got {:?}", expected, got))]
    BadMagic {
        expected: &'static [u8],
        got: Vec<u8>,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Unexpected message kind {:?}, expected {}", kind, expected))]
    UnexpectedMessage {
        kind: MessageHeader,
        expected: &'static str,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Unsupported message kind: {}", msg))]
    UnsupportedMessage {
        msg: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Unknown or unsupported Arrow type: {}", msg))]
    UnknownType {
        msg: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to parse format string '{}': {}", format, reason))]
    FormatParse {
        format: String,
        reason: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display(
        "Schema mismatch: stream schema is {:?}, batch schema is {:?}",
        stream,
        batch
    ))]
    SchemaMismatch {
        stream: Box<ArrowDataType>,
        batch: Box<ArrowDataType>,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Compression error ({}): {}", codec, msg))]
    CompressionError {
        codec: &'static str,
        msg: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Decompression error ({}): {}", codec, msg))]
    DecompressionError {
        codec: &'static str,
        msg: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display(
        "Size mismatch after decompression: expected {} bytes, got {}",
        expected,
        got
    ))]
    SizeMismatch {
        expected: i64,
        got: usize,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Invalid state: {}", msg))]
    InvalidState {
        msg: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Out of spec: {}", msg))]
    OutOfSpec {
        msg: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("I/O error: {}", source))]
    Io {
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Arrow error: {}", source))]
    Arrow {
        source: ArrowError,
        #[snafu(implicit)]
        location: Location,
    },
}

pub type Result<T, E = IpcError> = std::result::Result<T, E>;

impl From<IpcError> for ArrowError {
    fn from(value: IpcError) -> Self {
        ArrowError::ExternalError(Box::new(value))
    }
}

impl From<std::io::Error> for IpcError {
    fn from(source: std::io::Error) -> Self {
        IpcError::Io {
            source,
            location: Location::new(file!(), line!(), column!()),
        }
    }
}
