//! Frame-by-frame MJPEG playback: extraction, decode and display transfer.

use log::{error, info, warn};
use serde::Serialize;

use crate::color::write_block;
use crate::config::PlayerConfig;
use crate::display::{DisplayDevice, Window};
use crate::dma::DmaAllocator;
use crate::engine::{BlockRect, DecodeSession, JpegEngine};
use crate::error::{PlayerError, PlayerResult};
use crate::extractor::StreamReader;
use crate::geometry::Geometry;
use crate::scheduler::{OutputScheduler, RowPipe, TransferWorker};
use crate::source::ByteSource;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlaybackStats {
    pub frames_extracted: u64,
    pub frames_rendered: u64,
    pub frames_dropped: u64,
    pub resyncs: u64,
    pub bytes_consumed: u64,
}

/// Pull-read cursor over the extracted frame.
struct FrameInput<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl<'a> FrameInput<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, cursor: 0 }
    }

    fn remain(&self) -> usize {
        self.data.len() - self.cursor
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let len = buf.len().min(self.remain());
        buf[..len].copy_from_slice(&self.data[self.cursor..self.cursor + len]);
        self.cursor += len;
        len
    }
}

/// Header parsing produces no pixels; output callbacks stop the engine.
impl DecodeSession for FrameInput<'_> {
    fn pull_read(&mut self, buf: &mut [u8]) -> usize {
        self.read(buf)
    }

    fn on_block(&mut self, _rect: &BlockRect, _rgb: &[u8]) -> bool {
        false
    }

    fn on_row_group(&mut self, _top: u16, _rows: u16) -> bool {
        false
    }
}

/// Session handed to the engine for one frame body.
struct FrameSession<'p, 'a, 'r, D> {
    input: FrameInput<'a>,
    geometry: Geometry,
    window: Window,
    /// image row where the current row group starts
    band_top: u32,
    pipe: &'p mut RowPipe<'r, D>,
    failure: Option<PlayerError>,
}

impl<D: DisplayDevice> DecodeSession for FrameSession<'_, '_, '_, D> {
    fn pull_read(&mut self, buf: &mut [u8]) -> usize {
        self.input.read(buf)
    }

    fn on_block(&mut self, rect: &BlockRect, rgb: &[u8]) -> bool {
        let origin = self.band_top.max(self.geometry.crop_y);
        let res = self
            .pipe
            .active_buffer()
            .and_then(|out| write_block(out, &self.geometry, origin, rect, rgb));
        match res {
            Ok(_) => true,
            Err(err) => {
                self.failure = Some(err);
                false
            }
        }
    }

    fn on_row_group(&mut self, top: u16, rows: u16) -> bool {
        let (first, count) = self.geometry.visible_rows(top as u32, rows as u32);
        self.band_top = top as u32 + rows as u32;
        if count == 0 {
            return true;
        }
        match self.pipe.flush_row_group(self.window, first, count) {
            Ok(()) => true,
            Err(err) => {
                self.failure = Some(err);
                false
            }
        }
    }
}

fn render<E, D>(
    engine: &mut E,
    input: FrameInput<'_>,
    geometry: Geometry,
    pipe: &mut RowPipe<'_, D>,
) -> PlayerResult<()>
where
    E: JpegEngine + ?Sized,
    D: DisplayDevice,
{
    let window = Window::new(
        geometry.place_x as u16,
        geometry.place_y as u16,
        geometry.out_width as u16,
        geometry.out_height as u16,
    );
    let mut session = FrameSession {
        input,
        geometry,
        window,
        band_top: 0,
        pipe,
        failure: None,
    };
    let res = engine.decode(&mut session);
    match (res, session.failure.take()) {
        (_, Some(err)) => Err(err),
        (Err(err), None) => Err(PlayerError::DecodeFailed(err.to_string())),
        (Ok(()), None) => Ok(()),
    }
}

fn display_lost() -> PlayerError {
    PlayerError::Display("display lost with the transfer thread".into())
}

pub struct MjpegPlayer<'f, S, D, E> {
    reader: StreamReader<S>,
    frame_buf: &'f mut [u8],
    frame_len: usize,
    /// `None` only after the transfer thread died mid-frame.
    display: Option<D>,
    engine: E,
    scheduler: OutputScheduler,
    worker: Option<TransferWorker<D>>,
    geometry: Option<Geometry>,
    stats: PlaybackStats,
}

impl<'f, S, D, E> MjpegPlayer<'f, S, D, E>
where
    S: ByteSource,
    D: DisplayDevice + Send + 'static,
    E: JpegEngine,
{
    /// Allocate the read buffer and both transfer buffers, and start the
    /// transfer thread when `config.overlapped` is set. Nothing is allocated
    /// or spawned per frame after this.
    pub fn setup<A: DmaAllocator + ?Sized>(
        source: S,
        frame_buf: &'f mut [u8],
        display: D,
        engine: E,
        allocator: &mut A,
        config: &PlayerConfig,
    ) -> PlayerResult<Self> {
        config.validate()?;
        let worker = if config.overlapped {
            Some(TransferWorker::spawn(config.transfer_stack_size)?)
        } else {
            None
        };
        Self::build(source, frame_buf, display, engine, allocator, config, worker)
    }
}

impl<'f, S, D, E> MjpegPlayer<'f, S, D, E>
where
    S: ByteSource,
    D: DisplayDevice,
    E: JpegEngine,
{
    /// Like [`MjpegPlayer::setup`] for displays that cannot move to the
    /// transfer thread, such as borrowed ones. Overlapped mode is rejected.
    pub fn setup_single_context<A: DmaAllocator + ?Sized>(
        source: S,
        frame_buf: &'f mut [u8],
        display: D,
        engine: E,
        allocator: &mut A,
        config: &PlayerConfig,
    ) -> PlayerResult<Self> {
        config.validate()?;
        if config.overlapped {
            return Err(PlayerError::InvalidConfig(
                "overlapped mode needs an owned display".into(),
            ));
        }
        Self::build(source, frame_buf, display, engine, allocator, config, None)
    }

    fn build<A: DmaAllocator + ?Sized>(
        source: S,
        frame_buf: &'f mut [u8],
        display: D,
        engine: E,
        allocator: &mut A,
        config: &PlayerConfig,
        worker: Option<TransferWorker<D>>,
    ) -> PlayerResult<Self> {
        if frame_buf.is_empty() {
            return Err(PlayerError::InvalidConfig("empty frame buffer".into()));
        }
        let (width, height) = display.size();
        if width == 0 || height == 0 {
            return Err(PlayerError::InvalidConfig(format!("display size {width}x{height}")));
        }
        let transfer_size = width as usize * config.row_group_height as usize * 2;
        let scheduler = OutputScheduler::new(allocator, transfer_size)?;
        info!(
            "player setup: display {width}x{height}, read buffer {}, frame buffer {}, overlapped {}",
            config.read_buffer_size,
            frame_buf.len(),
            worker.is_some()
        );
        Ok(Self {
            reader: StreamReader::new(source, config.read_buffer_size),
            frame_buf,
            frame_len: 0,
            display: Some(display),
            engine,
            scheduler,
            worker,
            geometry: None,
            stats: PlaybackStats::default(),
        })
    }

    /// Load the next frame into the frame buffer.
    pub fn extract_frame(&mut self) -> PlayerResult<usize> {
        self.frame_len = 0;
        let res = self.reader.extract_frame(self.frame_buf);
        self.stats.bytes_consumed = self.reader.consumed();
        match res {
            Ok(len) => {
                self.frame_len = len;
                self.stats.frames_extracted += 1;
                Ok(len)
            }
            Err(err) => {
                if matches!(err, PlayerError::FrameBufferOverflow { .. }) {
                    self.stats.frames_dropped += 1;
                }
                Err(err)
            }
        }
    }

    /// Decode the loaded frame and stream it to the display.
    pub fn decode_and_render_frame(&mut self) -> PlayerResult<Geometry> {
        if self.frame_len == 0 {
            return Err(PlayerError::NotReady);
        }
        let data = &self.frame_buf[..self.frame_len];
        let mut input = FrameInput::new(data);
        let info = match self.engine.prepare(&mut input) {
            Ok(info) => info,
            Err(err) => {
                error!("prepare failed! {err}");
                self.stats.frames_dropped += 1;
                self.reset();
                return Err(PlayerError::DecodePrepareFailed(err.to_string()));
            }
        };

        let Some((width, height)) = self.display.as_ref().map(|d| d.size()) else {
            return Err(display_lost());
        };
        let geometry = Geometry::new(
            info.width as u32,
            info.height as u32,
            width as u32,
            height as u32,
        );

        let engine = &mut self.engine;
        let res = if geometry.is_empty() {
            Ok(())
        } else {
            match (&self.worker, self.display.take()) {
                (Some(worker), Some(display)) => {
                    let (display, res) = self.scheduler.with_worker(worker, display, |pipe| {
                        render(engine, input, geometry, pipe)
                    });
                    self.display = display;
                    res
                }
                (None, Some(mut display)) => {
                    let res = self
                        .scheduler
                        .with_direct(&mut display, |pipe| render(engine, input, geometry, pipe));
                    self.display = Some(display);
                    res
                }
                (_, None) => Err(display_lost()),
            }
        };

        match res {
            Ok(()) => {
                self.geometry = Some(geometry);
                self.stats.frames_rendered += 1;
                Ok(geometry)
            }
            Err(err) => {
                error!("decomp failed! {err}");
                self.stats.frames_dropped += 1;
                self.reset();
                Err(err)
            }
        }
    }

    /// Rescan for the next SOI marker after a failed frame.
    pub fn skip_to_next_frame(&mut self) -> PlayerResult<()> {
        self.stats.resyncs += 1;
        let res = self.reader.skip_to_next_frame();
        self.stats.bytes_consumed = self.reader.consumed();
        res
    }

    /// Clear per-frame cursors. Allocated buffers and bytes already read
    /// from the source are kept.
    pub fn reset(&mut self) {
        self.frame_len = 0;
        self.geometry = None;
        self.scheduler.reset();
    }

    /// Start over on a new or rewound source, dropping anything buffered.
    pub fn restart(&mut self, source: S) -> S {
        self.reset();
        self.stats.bytes_consumed = 0;
        self.reader.replace_source(source)
    }

    /// Extract and render frames until the stream ends or `max_frames`
    /// frames were shown, resyncing past bad frames.
    pub fn play(&mut self, max_frames: Option<u64>) -> PlayerResult<PlaybackStats> {
        let mut rendered = 0u64;
        while max_frames.map_or(true, |max| rendered < max) {
            let res = self
                .extract_frame()
                .and_then(|_| self.decode_and_render_frame().map(|_| ()));
            match res {
                Ok(()) => rendered += 1,
                Err(PlayerError::EndOfStream) => break,
                Err(err) if err.is_recoverable() => {
                    warn!("dropping frame: {err}");
                    self.reset();
                    match self.skip_to_next_frame() {
                        Ok(()) => {}
                        Err(PlayerError::EndOfStream) => break,
                        Err(err) => return Err(err),
                    }
                }
                Err(err) => return Err(err),
            }
        }
        Ok(self.stats)
    }

    /// The frame loaded by the last successful extraction.
    pub fn frame(&self) -> &[u8] {
        &self.frame_buf[..self.frame_len]
    }

    pub fn geometry(&self) -> Option<Geometry> {
        self.geometry
    }

    pub fn stats(&self) -> PlaybackStats {
        self.stats
    }

    pub fn reader(&self) -> &StreamReader<S> {
        &self.reader
    }

    pub fn display(&self) -> Option<&D> {
        self.display.as_ref()
    }

    pub fn display_mut(&mut self) -> Option<&mut D> {
        self.display.as_mut()
    }

    /// Stops the transfer thread, if any, and returns the display.
    pub fn into_display(self) -> Option<D> {
        self.display
    }
}
