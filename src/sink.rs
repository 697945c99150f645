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

//! The output-sink abstraction: a narrow, `Write`-like interface the writer
//! side is generic over, plus the three concrete variants this crate
//! targets (an in-memory contiguous buffer, an in-memory chunked buffer,
//! and a file).
//!
//! Generic code (`crate::writer`) is parameterized over `S: Sink` so the
//! per-buffer write loop monomorphizes; `Box<dyn Sink>` is only used at the
//! crate's top-level constructors, to keep virtual dispatch out of the hot
//! path.

use std::fs::File;
use std::io::{self, Write};

use crate::error::Result;

/// A byte-oriented output accepting appends and reporting how many bytes
/// have been committed so far. `size()` must always reflect exactly the
/// number of bytes written through this sink, since the file writer uses it
/// to record each record batch's starting offset for the footer's block
/// index.
pub trait Sink {
    /// Appends `bytes` to the sink.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Appends `count` copies of `byte`. The default implementation writes
    /// in fixed-size chunks so callers padding to an alignment don't need to
    /// allocate a buffer sized to the padding.
    fn write_fill(&mut self, byte: u8, count: usize) -> Result<()> {
        const CHUNK: [u8; 64] = [0u8; 64];
        let mut chunk = CHUNK;
        if byte != 0 {
            chunk = [byte; 64];
        }
        let mut remaining = count;
        while remaining > 0 {
            let n = remaining.min(chunk.len());
            self.write(&chunk[..n])?;
            remaining -= n;
        }
        Ok(())
    }

    /// Total bytes committed through this sink so far.
    fn size(&self) -> usize;

    /// Hints that at least `additional` more bytes are coming, so an
    /// implementation backed by a growable buffer can reserve capacity up
    /// front. A no-op by default; sinks that can't benefit (a file) ignore
    /// it.
    fn reserve(&mut self, additional: usize) {
        let _ = additional;
    }
}

/// A sink backed by a single growable, contiguous in-memory buffer.
#[derive(Debug, Default, Clone)]
pub struct ContiguousSink {
    buf: Vec<u8>,
}

impl ContiguousSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

impl Sink for ContiguousSink {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    fn size(&self) -> usize {
        self.buf.len()
    }

    fn reserve(&mut self, additional: usize) {
        self.buf.reserve(additional);
    }
}

/// A sink backed by a sequence of independently allocated chunks: each call
/// to [`Sink::write`] appends a brand-new chunk rather than extending the
/// previous one. Useful for callers who want to hand owned chunks off to a
/// downstream transport (e.g. one gRPC message per chunk) without copying
/// everything into one contiguous buffer first.
#[derive(Debug, Default, Clone)]
pub struct ChunkedSink {
    chunks: Vec<Vec<u8>>,
    size: usize,
}

impl ChunkedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunks(&self) -> &[Vec<u8>] {
        &self.chunks
    }

    pub fn into_chunks(self) -> Vec<Vec<u8>> {
        self.chunks
    }
}

impl Sink for ChunkedSink {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.size += bytes.len();
        self.chunks.push(bytes.to_vec());
        Ok(())
    }

    fn size(&self) -> usize {
        self.size
    }
}

/// A sink backed by a file, tracking its own byte count rather than
/// re-querying the file's length on every write.
pub struct FileSink {
    file: File,
    size: usize,
}

impl FileSink {
    pub fn new(file: File) -> Self {
        Self { file, size: 0 }
    }
}

impl Sink for FileSink {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.file.write_all(bytes)?;
        self.size += bytes.len();
        Ok(())
    }

    fn size(&self) -> usize {
        self.size
    }
}

impl Sink for Box<dyn Sink> {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write(bytes)
    }

    fn write_fill(&mut self, byte: u8, count: usize) -> Result<()> {
        (**self).write_fill(byte, count)
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn reserve(&mut self, additional: usize) {
        (**self).reserve(additional)
    }
}

/// Adapts any [`Sink`] to [`std::io::Write`], so it can be passed to the
/// `std::io::Write`-generic helpers in `crate::message`.
pub(crate) struct SinkWriter<'a, S: Sink + ?Sized>(pub &'a mut S);

impl<'a, S: Sink + ?Sized> Write for SinkWriter<'a, S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Sink::write(self.0, buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_tracks_size() {
        let mut sink = ContiguousSink::new();
        sink.write(b"abc").unwrap();
        sink.write(b"de").unwrap();
        assert_eq!(sink.size(), 5);
        assert_eq!(sink.as_slice(), b"abcde");
    }

    #[test]
    fn chunked_keeps_writes_separate() {
        let mut sink = ChunkedSink::new();
        sink.write(b"abc").unwrap();
        sink.write(b"de").unwrap();
        assert_eq!(sink.size(), 5);
        assert_eq!(sink.chunks(), &[b"abc".to_vec(), b"de".to_vec()]);
    }

    #[test]
    fn write_fill_writes_requested_byte() {
        let mut sink = ContiguousSink::new();
        sink.write_fill(0, 3).unwrap();
        sink.write_fill(0xAB, 2).unwrap();
        assert_eq!(sink.as_slice(), &[0, 0, 0, 0xAB, 0xAB]);
    }
}
