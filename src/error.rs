//! Player error types.

use thiserror::Error;

/// Errors reported by the playback core.
///
/// Extraction and decode failures are returned to the caller; the only
/// recovery the core performs on its own is the resync scan, and only when
/// the caller asks for it.
#[derive(Error, Debug)]
pub enum PlayerError {
    /// The byte source has no more data.
    #[error("end of stream")]
    EndOfStream,

    /// The byte source failed abnormally.
    #[error("read error: {0}")]
    ReadError(#[from] std::io::Error),

    /// The assembled frame does not fit the caller's frame buffer.
    #[error("frame buffer overflow (capacity {capacity} bytes)")]
    FrameBufferOverflow { capacity: usize },

    /// The engine rejected the frame headers.
    #[error("prepare failed: {0}")]
    DecodePrepareFailed(String),

    /// The engine failed while decoding the frame body.
    #[error("decomp failed: {0}")]
    DecodeFailed(String),

    /// A decoded band does not fit one transfer buffer.
    #[error("row group overflow: {rows} rows, buffer holds {capacity}")]
    RowGroupOverflow { rows: u32, capacity: u32 },

    /// The display bus reported an error.
    #[error("display error: {0}")]
    Display(String),

    /// Decoding was requested before a frame was extracted.
    #[error("no frame loaded")]
    NotReady,

    /// A transfer buffer could not be allocated.
    #[error("out of memory allocating {0} bytes")]
    OutOfMemory(usize),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl PlayerError {
    /// Whether playback can continue by resyncing to the next frame.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PlayerError::FrameBufferOverflow { .. }
                | PlayerError::DecodePrepareFailed(_)
                | PlayerError::DecodeFailed(_)
                | PlayerError::RowGroupOverflow { .. }
        )
    }
}

pub type PlayerResult<T> = Result<T, PlayerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "card removed");
        let err: PlayerError = io_err.into();
        assert!(matches!(err, PlayerError::ReadError(_)));
        assert!(err.to_string().contains("card removed"));
    }

    #[test]
    fn overflow_display() {
        let err = PlayerError::FrameBufferOverflow { capacity: 1024 };
        assert_eq!(err.to_string(), "frame buffer overflow (capacity 1024 bytes)");
    }

    #[test]
    fn recoverable_kinds() {
        assert!(PlayerError::FrameBufferOverflow { capacity: 1 }.is_recoverable());
        assert!(PlayerError::DecodeFailed("FMT1".into()).is_recoverable());
        assert!(PlayerError::DecodePrepareFailed("INP".into()).is_recoverable());
        assert!(!PlayerError::EndOfStream.is_recoverable());
        assert!(!PlayerError::Display("spi".into()).is_recoverable());
    }
}
