//! Streaming Motion-JPEG playback for small RGB565 panels.
//!
//! Frames are cut out of a byte stream at their end markers, decoded block
//! by block and streamed to the panel through two alternating transfer
//! buffers. See [`player::MjpegPlayer`] for the entry point.

pub mod color;
pub mod config;
pub mod display;
pub mod dma;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod geometry;
pub mod player;
pub mod scheduler;
pub mod software;
pub mod source;
#[cfg(feature = "tjpgd")]
pub mod tjpgd;

pub use config::PlayerConfig;
pub use display::{DisplayDevice, DrawTargetDisplay, MemoryDisplay, Window};
pub use dma::{DmaAllocator, HeapAllocator};
pub use engine::{BlockRect, DecodeSession, ImageInfo, JpegEngine};
pub use error::{PlayerError, PlayerResult};
pub use geometry::Geometry;
pub use player::{MjpegPlayer, PlaybackStats};
pub use software::SoftwareDecoder;
pub use source::ByteSource;
