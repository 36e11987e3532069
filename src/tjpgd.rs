//! MCU-streaming engine on `tjpgdec-rs`, the decoder used on the device.

use log::debug;
use tjpgdec_rs::{Error, JpegDecoder, MemoryPool, RECOMMENDED_POOL_SIZE};

use crate::engine::{read_all, BandTracker, BlockRect, DecodeSession, EngineError, ImageInfo, JpegEngine};

fn engine_error(err: Error) -> EngineError {
    match err {
        Error::Interrupted => EngineError::Interrupted,
        Error::Input | Error::InsufficientBuffer => EngineError::Input,
        Error::InsufficientMemory => EngineError::Memory,
        Error::Parameter => EngineError::Parameter,
        other => EngineError::Format(other.as_str().to_string()),
    }
}

/// Parse `data` with tables carved out of `pool`. The decoder borrows the
/// pool, so it lives no longer than one call.
fn parse<'p>(data: &[u8], pool: &'p mut [u8]) -> Result<JpegDecoder<'p>, EngineError> {
    let mut pool = MemoryPool::new(pool);
    let mut decoder = JpegDecoder::new();
    decoder.prepare(data, &mut pool).map_err(engine_error)?;
    Ok(decoder)
}

/// Keeps its workspace pool and MCU/work buffers across frames. The pool is
/// allocated once; the MCU buffers only grow when a frame needs a larger MCU.
pub struct TjpgdDecoder {
    pool: Box<[u8]>,
    data: Vec<u8>,
    mcu: Vec<i16>,
    work: Vec<u8>,
    rgb: Vec<u8>,
    prepared: bool,
}

impl Default for TjpgdDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TjpgdDecoder {
    pub fn new() -> Self {
        Self::with_pool_size(RECOMMENDED_POOL_SIZE)
    }

    pub fn with_pool_size(size: usize) -> Self {
        Self {
            pool: vec![0u8; size].into_boxed_slice(),
            data: Vec::new(),
            mcu: Vec::new(),
            work: Vec::new(),
            rgb: Vec::new(),
            prepared: false,
        }
    }
}

impl JpegEngine for TjpgdDecoder {
    fn prepare(&mut self, session: &mut dyn DecodeSession) -> Result<ImageInfo, EngineError> {
        self.prepared = false;
        if read_all(session, &mut self.data) == 0 {
            return Err(EngineError::Input);
        }
        let decoder = parse(&self.data, &mut self.pool)?;

        let mcu_size = decoder.mcu_buffer_size();
        let work_size = decoder.work_buffer_size();
        if self.mcu.len() < mcu_size {
            self.mcu.resize(mcu_size, 0);
        }
        if self.work.len() < work_size {
            self.work.resize(work_size, 0);
        }
        debug!(
            "tjpgd {}x{}, mcu buffer {mcu_size}, work buffer {work_size}",
            decoder.width(),
            decoder.height()
        );
        self.prepared = true;
        Ok(ImageInfo {
            width: decoder.width(),
            height: decoder.height(),
        })
    }

    fn decode(&mut self, session: &mut dyn DecodeSession) -> Result<(), EngineError> {
        if !std::mem::take(&mut self.prepared) {
            return Err(EngineError::Parameter);
        }
        // headers are parsed again into the same pool
        let mut decoder = parse(&self.data, &mut self.pool)?;
        // grayscale frames come out one byte per pixel
        let gray = decoder.components() == 1;
        let mut tracker = BandTracker::new();
        let rgb = &mut self.rgb;

        let res = decoder.decompress(
            &self.data,
            0,
            &mut self.mcu,
            &mut self.work,
            &mut |_decoder, bitmap, rect| {
                let rect = BlockRect::new(rect.left, rect.right, rect.top, rect.bottom);
                let pixels = if gray {
                    rgb.clear();
                    let count = rect.width() as usize * rect.height() as usize;
                    for &v in bitmap.iter().take(count) {
                        rgb.extend_from_slice(&[v, v, v]);
                    }
                    rgb.as_slice()
                } else {
                    bitmap
                };
                Ok(tracker.block(session, &rect) && session.on_block(&rect, pixels))
            },
        );
        res.map_err(engine_error)?;
        if !tracker.finish(session) {
            return Err(EngineError::Interrupted);
        }
        Ok(())
    }
}
