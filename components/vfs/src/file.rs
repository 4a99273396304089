use std::{cmp::min, os::unix::fs::FileExt};

use snafu::OptionExt;
use tracing::debug;
use vbsfs_types::chunk::{Chunk, Chunks};

use crate::err::{InvalidArgumentSnafu, Result};

/// Origin for [seek](crate::seek), mirroring lseek(2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

/// An open recording: the discovered chunks in number order, stitched into
/// one contiguous read-only byte stream.
#[derive(Debug)]
pub(crate) struct VirtualFile {
    chunks: Vec<Chunk>,
    size: u64,
    pos: u64,
    /// Index of the chunk holding `pos`; `chunks.len()` is the end sentinel.
    cursor: usize,
}

impl VirtualFile {
    /// Assign logical offsets in chunk-number order and fix the total size.
    /// Chunk numbers may be sparse; the logical stream never is.
    pub(crate) fn new(found: Chunks) -> Self {
        let present = found.len() as u64;
        let span = found.max_number().map_or(0, |n| u64::from(n) + 1);

        let mut chunks: Vec<Chunk> = found.into_iter().collect();
        let mut size = 0u64;
        for chunk in &mut chunks {
            chunk.offset = size;
            size += chunk.size;
        }
        if !chunks.is_empty() {
            debug!(
                "found {} bytes in {} chunks, {:.1}%",
                size,
                present,
                (present as f64 / span as f64) * 100.0
            );
        }
        VirtualFile {
            chunks,
            size,
            pos: 0,
            cursor: 0,
        }
    }

    pub(crate) fn size(&self) -> u64 {
        self.size
    }

    /// Serve up to `buf.len()` bytes from the current position. A short
    /// count is legal: the end of the stream, or a chunk that refuses to
    /// open or read mid-way, both end the call with whatever was already
    /// served; the next call may pick up where this one stopped.
    pub(crate) fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut served = 0;
        while served < buf.len() {
            let pos = self.pos;
            let chunk = match self.chunks.get_mut(self.cursor) {
                Some(chunk) => chunk,
                // past the last chunk: end of stream
                None => break,
            };

            let available = chunk.end().saturating_sub(pos);
            if available == 0 {
                // this chunk is spent; its lazy descriptor can go
                chunk.release();
                self.cursor += 1;
                continue;
            }

            let want = min((buf.len() - served) as u64, available) as usize;
            let number = chunk.number;
            let into_chunk = pos - chunk.offset;
            let (file, base) = match chunk.reader() {
                Ok(reader) => reader,
                Err(e) => {
                    debug!("cannot open chunk {} - {}", number, e);
                    break;
                }
            };
            match file.read_at(&mut buf[served..served + want], base + into_chunk) {
                // the physical file is shorter than it was at discovery;
                // treat it like any other mid-stream failure
                Ok(0) => break,
                Ok(n) => {
                    served += n;
                    self.pos += n as u64;
                }
                Err(e) => {
                    debug!("read fails on chunk {} - {}", number, e);
                    break;
                }
            }
        }
        served
    }

    /// Reposition the stream. Positions past the end are legal and park the
    /// cursor on the end sentinel; reads from there return 0.
    pub(crate) fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let base = match whence {
            Whence::Set => 0i64,
            Whence::Cur => self.pos as i64,
            Whence::End => self.size as i64,
        };
        let newpos = base
            .checked_add(offset)
            .filter(|pos| *pos >= 0)
            .context(InvalidArgumentSnafu)? as u64;

        if newpos == self.pos {
            return Ok(self.pos);
        }

        let cursor = self.chunks.partition_point(|chunk| chunk.end() <= newpos);
        if cursor != self.cursor {
            // leaving a chunk behind releases its lazy descriptor
            if let Some(old) = self.chunks.get_mut(self.cursor) {
                old.release();
            }
        }
        self.pos = newpos;
        self.cursor = cursor;
        Ok(newpos)
    }
}

impl Clone for VirtualFile {
    /// A copy reads independently: its own cursor into its own chunks, its
    /// own lazy descriptors, position back at the start.
    fn clone(&self) -> Self {
        VirtualFile {
            chunks: self.chunks.clone(),
            size: self.size,
            pos: 0,
            cursor: 0,
        }
    }
}
