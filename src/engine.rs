//! Interface to the JPEG decoding engine.
//!
//! The engine pulls compressed bytes from a [`DecodeSession`] and pushes
//! decoded RGB888 blocks back into it, followed by a row-group notification
//! once every block of a band has been delivered.

use std::fmt;

/// Block position in image pixels, bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockRect {
    pub left: u16,
    pub right: u16,
    pub top: u16,
    pub bottom: u16,
}

impl BlockRect {
    pub fn new(left: u16, right: u16, top: u16, bottom: u16) -> Self {
        Self {
            left,
            right,
            top,
            bottom,
        }
    }

    pub fn width(&self) -> u16 {
        self.right + 1 - self.left
    }

    pub fn height(&self) -> u16 {
        self.bottom + 1 - self.top
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u16,
    pub height: u16,
}

/// Engine result codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Input stream ended early or was rejected
    Input,
    /// A session callback asked to stop
    Interrupted,
    /// Not enough working memory
    Memory,
    /// Bad parameter
    Parameter,
    /// Malformed or unsupported JPEG
    Format(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Input => write!(f, "JDR_INP"),
            EngineError::Interrupted => write!(f, "JDR_INTR"),
            EngineError::Memory => write!(f, "JDR_MEM"),
            EngineError::Parameter => write!(f, "JDR_PAR"),
            EngineError::Format(msg) => write!(f, "JDR_FMT: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Callbacks bound to one frame's decode.
pub trait DecodeSession {
    /// Copy the next frame bytes into `buf`. Returning fewer than
    /// `buf.len()` bytes signals the end of the frame.
    fn pull_read(&mut self, buf: &mut [u8]) -> usize;

    /// One decoded block of packed RGB888, `rect.width() * 3` bytes per row.
    /// Returning false aborts the decode.
    fn on_block(&mut self, rect: &BlockRect, rgb: &[u8]) -> bool;

    /// Every block covering image rows `[top, top + rows)` has been delivered.
    fn on_row_group(&mut self, top: u16, rows: u16) -> bool;
}

pub trait JpegEngine {
    /// Parse the frame headers through `session.pull_read`.
    fn prepare(&mut self, session: &mut dyn DecodeSession) -> Result<ImageInfo, EngineError>;

    /// Decode the prepared frame into `session`.
    fn decode(&mut self, session: &mut dyn DecodeSession) -> Result<(), EngineError>;
}

/// Turns a left-to-right, top-to-bottom block sequence into row-group
/// notifications: a band ends when a block starts on a new row.
#[derive(Debug, Default)]
pub struct BandTracker {
    band: Option<(u16, u16)>,
}

impl BandTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call before handing `rect` to the session.
    pub fn block(&mut self, session: &mut dyn DecodeSession, rect: &BlockRect) -> bool {
        match self.band {
            Some((top, bottom)) if top == rect.top => {
                self.band = Some((top, bottom.max(rect.bottom)));
                true
            }
            Some((top, bottom)) => {
                self.band = Some((rect.top, rect.bottom));
                session.on_row_group(top, bottom + 1 - top)
            }
            None => {
                self.band = Some((rect.top, rect.bottom));
                true
            }
        }
    }

    /// Flush the last band.
    pub fn finish(&mut self, session: &mut dyn DecodeSession) -> bool {
        match self.band.take() {
            Some((top, bottom)) => session.on_row_group(top, bottom + 1 - top),
            None => true,
        }
    }
}

/// Pull the whole frame out of `session` into `data`.
pub fn read_all(session: &mut dyn DecodeSession, data: &mut Vec<u8>) -> usize {
    let mut chunk = [0u8; 512];
    data.clear();
    loop {
        let n = session.pull_read(&mut chunk);
        data.extend_from_slice(&chunk[..n]);
        if n < chunk.len() {
            return data.len();
        }
    }
}
