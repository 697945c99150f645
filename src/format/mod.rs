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

//! The FlatBuffer metadata layer: the generated-style bindings in
//! [`gen`], and the small amount of glue `crate::schema`, `crate::message`
//! and `crate::file` share when building or reading them.

pub mod gen;

use flatbuffers::{FlatBufferBuilder, WIPOffset};

/// The metadata version this crate writes. Readers accept anything back to
/// V4; this crate has no reason to ever emit less than the current version.
pub const METADATA_VERSION: gen::MetadataVersion = gen::MetadataVersion::V5;

/// Builds a root `Message` table wrapping a `Schema`, `RecordBatch` or
/// (unsupported) `DictionaryBatch` header, and finishes the builder.
///
/// The builder is left holding the plain (not size-prefixed) finished
/// FlatBuffer; the encapsulated-message framing in `crate::message` writes
/// its length as a separate i32 ahead of these bytes, so the buffer itself
/// must not carry its own size prefix.
pub(crate) fn finish_message<'a>(
    fbb: &mut FlatBufferBuilder<'a>,
    header_type: gen::MessageHeader,
    header: WIPOffset<flatbuffers::UnionWIPOffset>,
    body_length: i64,
) {
    let mut msg = gen::TableWriter::start(fbb);
    msg.push_scalar(gen::Message::VT_VERSION, METADATA_VERSION, gen::MetadataVersion::V1);
    msg.push_scalar(gen::Message::VT_HEADER_TYPE, header_type, gen::MessageHeader::NONE);
    msg.push_offset(gen::Message::VT_HEADER, Some(header));
    msg.push_scalar(gen::Message::VT_BODY_LENGTH, body_length, 0);
    let offset: WIPOffset<gen::Message<'a>> = msg.finish();
    fbb.finish(offset, None);
}
