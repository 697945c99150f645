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

//! C2: body compression.
//!
//! Each buffer in a compressed record batch's body is prefixed with an
//! 8-byte little-endian `i64` giving the buffer's uncompressed length,
//! followed by the compressed bytes. If compression would not have made
//! the buffer smaller, the writer stores it verbatim instead and writes
//! `-1` in the length prefix to say so — a buffer a few bytes long never
//! pays for a codec's frame overhead.

use crate::error::{CompressionSnafu, DecompressionSnafu, Result, SizeMismatchSnafu};
use crate::format::gen::CompressionType;

/// Sentinel written in place of the uncompressed-length prefix when a
/// buffer is stored verbatim because compressing it did not shrink it.
const UNCOMPRESSED_SENTINEL: i64 = -1;

const LENGTH_PREFIX_SIZE: usize = 8;

/// The compression codec applied to a record batch's body, mirroring the
/// `BodyCompression.codec` field of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Lz4Frame,
    Zstd,
}

impl Compression {
    pub(crate) fn from_wire(codec: CompressionType) -> Result<Self> {
        match codec {
            CompressionType::Lz4Frame => Ok(Compression::Lz4Frame),
            CompressionType::Zstd => Ok(Compression::Zstd),
            other => DecompressionSnafu {
                codec: "unknown",
                msg: format!("unsupported compression codec id {:?}", other.0),
            }
            .fail(),
        }
    }

    pub(crate) fn to_wire(self) -> CompressionType {
        match self {
            Compression::Lz4Frame => CompressionType::Lz4Frame,
            Compression::Zstd => CompressionType::Zstd,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Compression::Lz4Frame => "lz4",
            Compression::Zstd => "zstd",
        }
    }

    fn decompress_raw(self, input: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        let out = match self {
            Compression::Lz4Frame => {
                let mut decoder = lz4_flex::frame::FrameDecoder::new(input);
                let mut out = Vec::with_capacity(expected_len);
                std::io::Read::read_to_end(&mut decoder, &mut out).map_err(|e| {
                    DecompressionSnafu {
                        codec: self.name(),
                        msg: e.to_string(),
                    }
                    .build()
                })?;
                out
            }
            Compression::Zstd => zstd::stream::decode_all(input).map_err(|e| {
                DecompressionSnafu {
                    codec: self.name(),
                    msg: e.to_string(),
                }
                .build()
            })?,
        };
        if out.len() != expected_len {
            return SizeMismatchSnafu {
                expected: expected_len as i64,
                got: out.len(),
            }
            .fail();
        }
        Ok(out)
    }
}

/// Compresses `buffer`, returning the framed bytes: an 8-byte length
/// prefix followed by either the compressed payload, or (if compression
/// did not help) the original bytes verbatim.
pub(crate) fn compress(codec: Compression, buffer: &[u8]) -> Result<Vec<u8>> {
    let compressed = match codec {
        Compression::Lz4Frame => lz4_flex::compress_prepend_size(buffer)
            .split_off(4), // drop lz4_flex's own 4-byte size prefix; we frame independently
        Compression::Zstd => zstd::stream::encode_all(buffer, 0).map_err(|e| {
            CompressionSnafu {
                codec: codec.name(),
                msg: e.to_string(),
            }
            .build()
        })?,
    };

    let mut out = Vec::with_capacity(LENGTH_PREFIX_SIZE + compressed.len().min(buffer.len()));
    if compressed.len() < buffer.len() {
        out.extend_from_slice(&(buffer.len() as i64).to_le_bytes());
        out.extend_from_slice(&compressed);
    } else {
        out.extend_from_slice(&UNCOMPRESSED_SENTINEL.to_le_bytes());
        out.extend_from_slice(buffer);
    }
    Ok(out)
}

/// Reverses [`compress`]: reads the 8-byte length prefix from the front of
/// `framed` and either returns the remaining bytes unchanged (sentinel
/// case) or decompresses them to the recorded length.
pub(crate) fn decompress(codec: Compression, framed: &[u8]) -> Result<std::borrow::Cow<'_, [u8]>> {
    if framed.len() < LENGTH_PREFIX_SIZE {
        return DecompressionSnafu {
            codec: codec.name(),
            msg: format!(
                "buffer shorter than the {LENGTH_PREFIX_SIZE}-byte compression length prefix"
            ),
        }
        .fail();
    }
    let mut len_bytes = [0u8; LENGTH_PREFIX_SIZE];
    len_bytes.copy_from_slice(&framed[..LENGTH_PREFIX_SIZE]);
    let prefix = i64::from_le_bytes(len_bytes);
    let payload = &framed[LENGTH_PREFIX_SIZE..];

    if prefix == UNCOMPRESSED_SENTINEL {
        Ok(std::borrow::Cow::Borrowed(payload))
    } else if prefix < 0 {
        DecompressionSnafu {
            codec: codec.name(),
            msg: format!("invalid uncompressed-length prefix {prefix}"),
        }
        .fail()
    } else {
        Ok(std::borrow::Cow::Owned(codec.decompress_raw(payload, prefix as usize)?))
    }
}

/// Memoizes the framed bytes produced by [`compress`] for a given source
/// buffer, keyed by the buffer's identity (pointer address and length)
/// rather than its contents, so a caller computing sizes ahead of a write
/// never pays to compress the same buffer twice. Owned by the caller for
/// the duration of one batch; this crate's own writer never compresses a
/// buffer more than once per batch internally, so it has no call site that
/// needs the cache itself, but exposes it for callers doing their own
/// two-pass size estimation upstream.
#[derive(Debug, Default)]
pub struct CompressionCache {
    entries: std::collections::HashMap<(usize, usize), Vec<u8>>,
}

impl CompressionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached framed bytes for `buffer` under `codec`, computing
    /// and storing them on a cache miss.
    pub(crate) fn get_or_compress(&mut self, codec: Compression, buffer: &[u8]) -> Result<Vec<u8>> {
        let key = (buffer.as_ptr() as usize, buffer.len());
        if let Some(framed) = self.entries.get(&key) {
            return Ok(framed.clone());
        }
        let framed = compress(codec, buffer)?;
        self.entries.insert(key, framed.clone());
        Ok(framed)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_lz4_frame() {
        let data = vec![7u8; 4096];
        let framed = compress(Compression::Lz4Frame, &data).unwrap();
        let back = decompress(Compression::Lz4Frame, &framed).unwrap();
        assert_eq!(back.as_ref(), data.as_slice());
    }

    #[test]
    fn round_trips_zstd() {
        let data = (0u8..=255).cycle().take(8192).collect::<Vec<_>>();
        let framed = compress(Compression::Zstd, &data).unwrap();
        let back = decompress(Compression::Zstd, &framed).unwrap();
        assert_eq!(back.as_ref(), data.as_slice());
    }

    #[test]
    fn falls_back_to_uncompressed_for_small_inputs() {
        let data = vec![1u8, 2, 3];
        let framed = compress(Compression::Zstd, &data).unwrap();
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&framed[..8]);
        assert_eq!(i64::from_le_bytes(len_bytes), UNCOMPRESSED_SENTINEL);
        let back = decompress(Compression::Zstd, &framed).unwrap();
        assert_eq!(back.as_ref(), data.as_slice());
    }

    #[test]
    fn rejects_truncated_frame() {
        let err = decompress(Compression::Lz4Frame, &[0u8; 3]);
        assert!(err.is_err());
    }

    #[test]
    fn cache_memoizes_by_buffer_identity() {
        let data = vec![9u8; 4096];
        let mut cache = CompressionCache::new();
        let first = cache.get_or_compress(Compression::Lz4Frame, &data).unwrap();
        let second = cache.get_or_compress(Compression::Lz4Frame, &data).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.entries.len(), 1);
    }
}
