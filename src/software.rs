//! Reference engine on top of the `image` crate's JPEG decoder.
//!
//! The whole frame is decoded at once and then replayed to the session as
//! fixed-size blocks in raster order, the way an MCU decoder emits them.

use std::io::Cursor;

use image::{codecs::jpeg::JpegDecoder, ImageDecoder, ImageFormat};
use log::debug;

use crate::engine::{read_all, BandTracker, BlockRect, DecodeSession, EngineError, ImageInfo, JpegEngine};

pub struct SoftwareDecoder {
    data: Vec<u8>,
    block_width: u16,
    block_height: u16,
    rgb: Vec<u8>,
}

impl Default for SoftwareDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareDecoder {
    /// 16x16 blocks, the MCU size of 4:2:0 streams.
    pub fn new() -> Self {
        Self::with_block_size(16, 16)
    }

    pub fn with_block_size(block_width: u16, block_height: u16) -> Self {
        Self {
            data: Vec::new(),
            block_width: block_width.max(1),
            block_height: block_height.max(1),
            rgb: Vec::new(),
        }
    }
}

impl JpegEngine for SoftwareDecoder {
    fn prepare(&mut self, session: &mut dyn DecodeSession) -> Result<ImageInfo, EngineError> {
        if read_all(session, &mut self.data) == 0 {
            return Err(EngineError::Input);
        }
        let decoder = JpegDecoder::new(Cursor::new(self.data.as_slice()))
            .map_err(|err| EngineError::Format(err.to_string()))?;
        let (width, height) = decoder.dimensions();
        let width = u16::try_from(width).map_err(|_| EngineError::Parameter)?;
        let height = u16::try_from(height).map_err(|_| EngineError::Parameter)?;
        debug!("jpeg {width}x{height}, {} bytes", self.data.len());
        Ok(ImageInfo { width, height })
    }

    fn decode(&mut self, session: &mut dyn DecodeSession) -> Result<(), EngineError> {
        if self.data.is_empty() {
            return Err(EngineError::Parameter);
        }
        let image = image::load_from_memory_with_format(&self.data, ImageFormat::Jpeg)
            .map_err(|err| EngineError::Format(err.to_string()))?
            .to_rgb8();
        self.data.clear();

        let (width, height) = (image.width() as u16, image.height() as u16);
        let stride = image.width() as usize * 3;
        let raw = image.as_raw();
        let mut tracker = BandTracker::new();

        for top in (0..height).step_by(self.block_height as usize) {
            let bottom = (top + self.block_height).min(height) - 1;
            for left in (0..width).step_by(self.block_width as usize) {
                let right = (left + self.block_width).min(width) - 1;
                let rect = BlockRect::new(left, right, top, bottom);

                self.rgb.clear();
                for y in top..=bottom {
                    let start = y as usize * stride + left as usize * 3;
                    self.rgb
                        .extend_from_slice(&raw[start..start + rect.width() as usize * 3]);
                }
                if !tracker.block(session, &rect) || !session.on_block(&rect, &self.rgb) {
                    return Err(EngineError::Interrupted);
                }
            }
        }
        if !tracker.finish(session) {
            return Err(EngineError::Interrupted);
        }
        Ok(())
    }
}
