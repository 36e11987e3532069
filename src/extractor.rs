//! Splits a concatenated MJPEG byte stream into single JPEG frames.
//!
//! The reader owns one fixed read buffer. Bytes that were read but not yet
//! handed out always stay in it and are moved to the front before the next
//! read, so a marker split across two reads is never lost.

use log::{error, info, warn};

use crate::error::{PlayerError, PlayerResult};
use crate::source::ByteSource;

/// Start of image.
pub const SOI: [u8; 2] = [0xFF, 0xD8];
/// End of image.
pub const EOI: [u8; 2] = [0xFF, 0xD9];

fn find_marker(hay: &[u8], marker: [u8; 2]) -> Option<usize> {
    hay.windows(2).position(|w| w == marker)
}

pub struct StreamReader<S> {
    source: S,
    read_buf: Box<[u8]>,
    /// first unread byte
    start: usize,
    /// end of valid data
    end: usize,
    consumed: u64,
    bytes_read: u64,
}

impl<S: ByteSource> StreamReader<S> {
    pub fn new(source: S, read_buffer_size: usize) -> Self {
        Self {
            source,
            read_buf: vec![0u8; read_buffer_size.max(2)].into_boxed_slice(),
            start: 0,
            end: 0,
            consumed: 0,
            bytes_read: 0,
        }
    }

    /// Bytes read from the source but not yet handed out.
    pub fn pending(&self) -> &[u8] {
        &self.read_buf[self.start..self.end]
    }

    /// Stream offset of the first pending byte.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn capacity(&self) -> usize {
        self.read_buf.len()
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Swap in a new source and forget everything buffered from the old one.
    pub fn replace_source(&mut self, source: S) -> S {
        self.reset();
        std::mem::replace(&mut self.source, source)
    }

    /// Clear cursors and buffered bytes. The read buffer itself is kept.
    pub fn reset(&mut self) {
        self.start = 0;
        self.end = 0;
        self.consumed = 0;
        self.bytes_read = 0;
    }

    fn compact(&mut self) {
        if self.start > 0 {
            self.read_buf.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
    }

    fn advance(&mut self, n: usize) {
        self.start += n;
        self.consumed += n as u64;
    }

    /// Move pending bytes to the front and append one read's worth of data.
    fn fill(&mut self) -> PlayerResult<usize> {
        self.compact();
        let n = self.source.read_bytes(&mut self.read_buf[self.end..])?;
        if n == 0 {
            return Err(PlayerError::EndOfStream);
        }
        self.end += n;
        self.bytes_read += n as u64;
        Ok(n)
    }

    /// Assemble the next frame into `frame`, starting at offset 0.
    ///
    /// Returns the frame length; the frame ends with the EOI marker. On
    /// overflow nothing is written past `frame.len()` and the frame is
    /// abandoned.
    pub fn extract_frame(&mut self, frame: &mut [u8]) -> PlayerResult<usize> {
        if self.start == self.end {
            if let Err(err) = self.fill() {
                info!("Failed to read initial buffer: {err}");
                return Err(err);
            }
        }

        let mut len = 0usize;
        loop {
            let pending = &self.read_buf[self.start..self.end];
            if let Some(i) = find_marker(pending, EOI) {
                let take = i + EOI.len();
                if len + take > frame.len() {
                    warn!("MJPEG buffer overflow! frame > {} bytes", frame.len());
                    // the whole oversized frame is known, drop it through its EOI
                    self.advance(take);
                    self.compact();
                    return Err(PlayerError::FrameBufferOverflow {
                        capacity: frame.len(),
                    });
                }
                frame[len..len + take].copy_from_slice(&pending[..take]);
                len += take;
                self.advance(take);
                self.compact();
                return Ok(len);
            }

            // A trailing 0xFF may be the first half of an EOI; keep it for the next scan.
            let keep = usize::from(pending.last() == Some(&0xFF));
            let take = pending.len() - keep;
            if len + take > frame.len() {
                warn!("MJPEG buffer overflow while loading frame! frame > {} bytes", frame.len());
                self.advance(1.min(pending.len()));
                return Err(PlayerError::FrameBufferOverflow {
                    capacity: frame.len(),
                });
            }
            frame[len..len + take].copy_from_slice(&pending[..take]);
            len += take;
            self.advance(take);

            if let Err(err) = self.fill() {
                match &err {
                    PlayerError::EndOfStream => info!("End of file inside a frame, {len} bytes dropped"),
                    _ => error!("Read error while loading frame: {err}"),
                }
                return Err(err);
            }
        }
    }

    /// Scan forward to the next SOI marker and leave it at the front of the
    /// pending bytes, so the next extraction starts a fresh frame there.
    pub fn skip_to_next_frame(&mut self) -> PlayerResult<()> {
        info!("Skipping to the next frame...");
        loop {
            let pending = &self.read_buf[self.start..self.end];
            if let Some(i) = find_marker(pending, SOI) {
                self.advance(i);
                self.compact();
                info!("Found next frame at stream offset {}", self.consumed);
                return Ok(());
            }

            let keep = usize::from(pending.last() == Some(&0xFF));
            let skipped = pending.len() - keep;
            self.advance(skipped);

            if let Err(err) = self.fill() {
                match &err {
                    PlayerError::EndOfStream => info!("End of file while skipping frames."),
                    _ => error!("Read error while skipping frames: {err}"),
                }
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ChunkedSource;
    use std::io::{self, Cursor, Read};

    /// Hands out its bytes, then fails every read after that.
    struct BrokenSource(Cursor<Vec<u8>>);

    impl Read for BrokenSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.read(buf)? {
                0 => Err(io::Error::new(io::ErrorKind::Other, "card removed")),
                n => Ok(n),
            }
        }
    }

    fn jpeg(payload_len: usize, fill: u8) -> Vec<u8> {
        let mut v = SOI.to_vec();
        v.extend(std::iter::repeat(fill).take(payload_len));
        v.extend_from_slice(&EOI);
        v
    }

    #[test]
    fn extracts_two_frames_then_end_of_stream() {
        let mut stream = jpeg(1000, 0x11);
        stream.extend(jpeg(500, 0x22));
        let mut reader = StreamReader::new(Cursor::new(stream), 4096);
        let mut frame = vec![0u8; 4096];

        let n = reader.extract_frame(&mut frame).unwrap();
        assert_eq!(n, 1004);
        assert_eq!(&frame[..2], &SOI);
        assert_eq!(&frame[n - 2..n], &EOI);

        let n = reader.extract_frame(&mut frame).unwrap();
        assert_eq!(n, 504);
        assert_eq!(&frame[n - 2..n], &EOI);
        assert_eq!(frame[2], 0x22);

        assert!(matches!(
            reader.extract_frame(&mut frame),
            Err(PlayerError::EndOfStream)
        ));
        assert_eq!(reader.consumed(), 1004 + 504);
    }

    #[test]
    fn frames_survive_every_read_split() {
        // 0xFF right before the EOI makes the marker straddle many boundaries
        let frames = vec![jpeg(37, 0xFF), jpeg(0, 0), jpeg(90, 0xAB), jpeg(5, 0xFF)];
        let stream: Vec<u8> = frames.concat();
        for read_size in 2..=11 {
            for chunk in 1..=7 {
                let src = ChunkedSource::new(stream.clone(), chunk);
                let mut reader = StreamReader::new(src, read_size);
                let mut frame = vec![0u8; 256];
                for expected in &frames {
                    let n = reader.extract_frame(&mut frame).unwrap_or_else(|e| {
                        panic!("read_size {read_size} chunk {chunk}: {e}")
                    });
                    assert_eq!(&frame[..n], expected.as_slice(), "read_size {read_size} chunk {chunk}");
                }
                assert!(matches!(
                    reader.extract_frame(&mut frame),
                    Err(PlayerError::EndOfStream)
                ));
                assert_eq!(reader.consumed(), stream.len() as u64);
            }
        }
    }

    #[test]
    fn overflow_never_writes_past_capacity() {
        let mut stream = jpeg(300, 0x33);
        stream.extend(jpeg(10, 0x44));
        let mut backing = vec![0xA5u8; 128 + 16];
        {
            let (frame, _guard) = backing.split_at_mut(128);
            let mut reader = StreamReader::new(ChunkedSource::new(stream, 50), 64);
            assert!(matches!(
                reader.extract_frame(frame),
                Err(PlayerError::FrameBufferOverflow { capacity: 128 })
            ));
            reader.skip_to_next_frame().unwrap();
            let n = reader.extract_frame(frame).unwrap();
            assert_eq!(&frame[..n], jpeg(10, 0x44).as_slice());
        }
        assert!(backing[128..].iter().all(|&b| b == 0xA5));
    }

    #[test]
    fn overflow_with_known_end_drops_whole_frame() {
        let mut stream = jpeg(100, 0x01);
        stream.extend(jpeg(3, 0x02));
        let mut reader = StreamReader::new(Cursor::new(stream), 4096);
        let mut frame = vec![0u8; 50];
        assert!(reader.extract_frame(&mut frame).is_err());
        assert_eq!(reader.pending(), jpeg(3, 0x02).as_slice());
        let n = reader.extract_frame(&mut frame).unwrap();
        assert_eq!(n, 7);
    }

    #[test]
    fn skip_lands_on_next_soi() {
        let mut stream = vec![0x00, 0x12, 0xFF, 0x00, 0xFF];
        stream.extend(jpeg(20, 0x55));
        let at = 5u64;
        for chunk in 1..=6 {
            let mut reader = StreamReader::new(ChunkedSource::new(stream.clone(), chunk), 4);
            reader.skip_to_next_frame().unwrap();
            assert_eq!(reader.consumed(), at, "chunk {chunk}");
            assert_eq!(&reader.pending()[..2], &SOI);
            let mut frame = vec![0u8; 64];
            let n = reader.extract_frame(&mut frame).unwrap();
            assert_eq!(&frame[..n], jpeg(20, 0x55).as_slice());
        }
    }

    #[test]
    fn skip_without_soi_reports_end_of_stream() {
        let mut reader = StreamReader::new(Cursor::new(vec![0x01u8, 0xFF, 0xD9, 0x00, 0xFF]), 3);
        assert!(matches!(
            reader.skip_to_next_frame(),
            Err(PlayerError::EndOfStream)
        ));
    }

    #[test]
    fn truncated_frame_is_end_of_stream() {
        let mut stream = jpeg(10, 0x10);
        stream.extend_from_slice(&[0xFF, 0xD8, 1, 2, 3]);
        let mut reader = StreamReader::new(Cursor::new(stream), 8);
        let mut frame = vec![0u8; 64];
        assert_eq!(reader.extract_frame(&mut frame).unwrap(), 14);
        assert!(matches!(
            reader.extract_frame(&mut frame),
            Err(PlayerError::EndOfStream)
        ));
    }

    #[test]
    fn replace_source_clears_pending() {
        let mut reader = StreamReader::new(Cursor::new(jpeg(4, 0)), 4096);
        let mut frame = vec![0u8; 64];
        reader.skip_to_next_frame().unwrap();
        assert!(!reader.pending().is_empty());
        reader.replace_source(Cursor::new(jpeg(2, 9)));
        assert!(reader.pending().is_empty());
        assert_eq!(reader.extract_frame(&mut frame).unwrap(), 6);
        assert_eq!(frame[2], 9);
    }

    #[test]
    fn read_failure_inside_frame_is_read_error() {
        let mut stream = jpeg(4, 0x61);
        stream.extend_from_slice(&[0xFF, 0xD8, 7, 7, 7]);
        let mut reader = StreamReader::new(BrokenSource(Cursor::new(stream)), 4);
        let mut frame = vec![0u8; 64];
        assert_eq!(reader.extract_frame(&mut frame).unwrap(), 8);
        assert!(matches!(
            reader.extract_frame(&mut frame),
            Err(PlayerError::ReadError(_))
        ));
    }

    #[test]
    fn read_failure_while_skipping_is_read_error() {
        let src = BrokenSource(Cursor::new(vec![0x00, 0x11, 0xFF, 0x22, 0x33]));
        let mut reader = StreamReader::new(src, 2);
        let err = reader.skip_to_next_frame().unwrap_err();
        assert!(matches!(err, PlayerError::ReadError(_)));
        assert!(!err.is_recoverable());
        assert_eq!(reader.consumed(), 5);
    }
}
