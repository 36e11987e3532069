//! Sequential byte source feeding the frame extractor.

use std::io::{self, Read};

/// Sequential reader the stream is pulled from.
///
/// `Ok(0)` means the source is exhausted. No seeking is required.
pub trait ByteSource {
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl<R: Read> ByteSource for R {
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                res => return res,
            }
        }
    }
}

/// Source that hands out at most `chunk` bytes per read, like a slow card or
/// a socket. Useful to push frame markers across read boundaries.
#[derive(Debug, Clone)]
pub struct ChunkedSource {
    data: Vec<u8>,
    pos: usize,
    chunk: usize,
}

impl ChunkedSource {
    pub fn new(data: Vec<u8>, chunk: usize) -> Self {
        Self {
            data,
            pos: 0,
            chunk: chunk.max(1),
        }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

impl Read for ChunkedSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.chunk).min(self.remaining());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
