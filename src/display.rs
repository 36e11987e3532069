use std::path::Path;

use anyhow::Result;
use embedded_graphics::{
    draw_target::DrawTarget,
    geometry::Point,
    pixelcolor::{raw::RawU16, Rgb565},
    prelude::Pixel,
};
use image::RgbImage;
use log::debug;

use crate::color::rgb565_to_rgb888;
use crate::error::{PlayerError, PlayerResult};

/// Panel area subsequent writes fill, row by row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Window {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Window {
    pub fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// A panel reached through window addressing and a byte stream of
/// big-endian RGB565 pixels.
pub trait DisplayDevice {
    fn size(&self) -> (u16, u16);

    fn set_window(&mut self, window: Window) -> PlayerResult<()>;

    fn begin_transfer(&mut self) -> PlayerResult<()> {
        Ok(())
    }

    fn write_bytes(&mut self, data: &[u8]) -> PlayerResult<()>;

    fn end_transfer(&mut self) -> PlayerResult<()> {
        Ok(())
    }
}

impl<D: DisplayDevice + ?Sized> DisplayDevice for &mut D {
    fn size(&self) -> (u16, u16) {
        (**self).size()
    }

    fn set_window(&mut self, window: Window) -> PlayerResult<()> {
        (**self).set_window(window)
    }

    fn begin_transfer(&mut self) -> PlayerResult<()> {
        (**self).begin_transfer()
    }

    fn write_bytes(&mut self, data: &[u8]) -> PlayerResult<()> {
        (**self).write_bytes(data)
    }

    fn end_transfer(&mut self) -> PlayerResult<()> {
        (**self).end_transfer()
    }
}

/// Walks a window in row-major order, pairing streamed bytes into pixels.
#[derive(Debug, Default)]
struct WindowCursor {
    window: Window,
    index: u32,
    high: Option<u8>,
}

impl WindowCursor {
    fn set(&mut self, window: Window) {
        self.window = window;
        self.index = 0;
        self.high = None;
    }

    /// Feed bytes, calling `put(x, y, rgb565)` for every completed pixel.
    fn feed(&mut self, data: &[u8], mut put: impl FnMut(u16, u16, u16)) {
        let w = self.window.width as u32;
        let total = w * self.window.height as u32;
        for &b in data {
            let Some(hi) = self.high.take() else {
                self.high = Some(b);
                continue;
            };
            if total == 0 {
                continue;
            }
            let i = self.index % total;
            let x = self.window.x as u32 + i % w;
            let y = self.window.y as u32 + i / w;
            put(x as u16, y as u16, u16::from_be_bytes([hi, b]));
            self.index += 1;
        }
    }
}

/// RGB565 framebuffer in memory.
pub struct MemoryDisplay {
    width: u16,
    height: u16,
    pixels: Vec<u16>,
    cursor: WindowCursor,
    windows: Vec<Window>,
    transfers: usize,
    in_transfer: bool,
}

impl MemoryDisplay {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            pixels: vec![0u16; width as usize * height as usize],
            cursor: WindowCursor::default(),
            windows: Vec::new(),
            transfers: 0,
            in_transfer: false,
        }
    }

    pub fn pixel(&self, x: u16, y: u16) -> u16 {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    pub fn fill(&mut self, color: u16) {
        self.pixels.fill(color);
    }

    /// Every window set so far.
    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    /// Completed begin/end transfer pairs.
    pub fn transfers(&self) -> usize {
        self.transfers
    }

    pub fn to_rgb_image(&self) -> RgbImage {
        let mut img = RgbImage::new(self.width as u32, self.height as u32);
        for (px, &c) in img.pixels_mut().zip(self.pixels.iter()) {
            let (r, g, b) = rgb565_to_rgb888(c);
            px.0 = [r, g, b];
        }
        img
    }

    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        self.to_rgb_image().save(path)?;
        Ok(())
    }
}

impl DisplayDevice for MemoryDisplay {
    fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    fn set_window(&mut self, window: Window) -> PlayerResult<()> {
        debug!("set window {window:?}");
        self.cursor.set(window);
        self.windows.push(window);
        Ok(())
    }

    fn begin_transfer(&mut self) -> PlayerResult<()> {
        if self.in_transfer {
            return Err(PlayerError::Display("transfer already started".into()));
        }
        self.in_transfer = true;
        Ok(())
    }

    fn write_bytes(&mut self, data: &[u8]) -> PlayerResult<()> {
        if !self.in_transfer {
            return Err(PlayerError::Display("write outside transfer".into()));
        }
        let (width, height) = (self.width, self.height);
        let pixels = &mut self.pixels;
        self.cursor.feed(data, |x, y, c| {
            if x < width && y < height {
                pixels[y as usize * width as usize + x as usize] = c;
            }
        });
        Ok(())
    }

    fn end_transfer(&mut self) -> PlayerResult<()> {
        if !self.in_transfer {
            return Err(PlayerError::Display("transfer not started".into()));
        }
        self.in_transfer = false;
        self.transfers += 1;
        Ok(())
    }
}

/// Streams into any `embedded-graphics` target with RGB565 color, e.g. a
/// `mipidsi` panel.
pub struct DrawTargetDisplay<T> {
    target: T,
    cursor: WindowCursor,
    batch: Vec<Pixel<Rgb565>>,
}

impl<T> DrawTargetDisplay<T>
where
    T: DrawTarget<Color = Rgb565>,
    T::Error: core::fmt::Debug,
{
    pub fn new(target: T) -> Self {
        Self {
            target,
            cursor: WindowCursor::default(),
            batch: Vec::new(),
        }
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn into_inner(self) -> T {
        self.target
    }
}

impl<T> DisplayDevice for DrawTargetDisplay<T>
where
    T: DrawTarget<Color = Rgb565>,
    T::Error: core::fmt::Debug,
{
    fn size(&self) -> (u16, u16) {
        let size = self.target.bounding_box().size;
        (size.width as u16, size.height as u16)
    }

    fn set_window(&mut self, window: Window) -> PlayerResult<()> {
        self.cursor.set(window);
        Ok(())
    }

    fn write_bytes(&mut self, data: &[u8]) -> PlayerResult<()> {
        let batch = &mut self.batch;
        batch.clear();
        self.cursor.feed(data, |x, y, c| {
            batch.push(Pixel(
                Point::new(x as i32, y as i32),
                Rgb565::from(RawU16::new(c)),
            ));
        });
        self.target
            .draw_iter(self.batch.drain(..))
            .map_err(|err| PlayerError::Display(format!("draw error:{err:?}")))
    }
}
