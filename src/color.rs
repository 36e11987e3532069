//! RGB888 blocks to big-endian RGB565 rows.

use crate::engine::BlockRect;
use crate::error::{PlayerError, PlayerResult};
use crate::geometry::Geometry;

/// Truncating RGB888 to RGB565 pack, no rounding or dithering.
#[inline(always)]
pub fn rgb888_to_rgb565(r: u8, g: u8, b: u8) -> u16 {
    ((r as u16 & 0xF8) << 8) | ((g as u16 & 0xFC) << 3) | (b as u16 >> 3)
}

#[inline(always)]
pub fn rgb565_to_rgb888(pixel: u16) -> (u8, u8, u8) {
    let r = ((pixel >> 11) & 0x1F) as u8;
    let g = ((pixel >> 5) & 0x3F) as u8;
    let b = (pixel & 0x1F) as u8;

    let r8 = (r as u16 * 255 / 31) as u8;
    let g8 = (g as u16 * 255 / 63) as u8;
    let b8 = (b as u16 * 255 / 31) as u8;

    (r8, g8, b8)
}

/// Convert one row of packed RGB888 into RGB565, high byte first as the
/// panel expects it on the bus.
#[inline]
pub fn convert_row(src: &[u8], dst: &mut [u8]) {
    for (px, out) in src.chunks_exact(3).zip(dst.chunks_exact_mut(2)) {
        let r8 = (px[0] & 0xF8) | (px[1] >> 5);
        let b5 = ((px[1] & 0x1C) << 3) | (px[2] >> 3);
        out[0] = r8;
        out[1] = b5;
    }
}

/// Write the visible part of a decoded block into a transfer buffer.
///
/// `out` holds rows of `geometry.out_width` pixels; buffer row 0 is image row
/// `band_top`. Blocks outside the visible region are skipped. Returns the
/// number of pixels written.
pub fn write_block(
    out: &mut [u8],
    geometry: &Geometry,
    band_top: u32,
    rect: &BlockRect,
    rgb: &[u8],
) -> PlayerResult<usize> {
    let x = rect.left as u32;
    let y = rect.top as u32;
    let right = rect.right as u32;
    let bottom = rect.bottom as u32;
    let w = rect.width() as usize;
    let out_width = geometry.out_width;
    let vis_right = geometry.crop_x + out_width;
    let vis_bottom = geometry.crop_y + geometry.out_height;

    if right < geometry.crop_x || x >= vis_right {
        return Ok(0);
    }
    if bottom < geometry.crop_y || y >= vis_bottom {
        return Ok(0);
    }

    let mut src_off = 0usize;
    let mut top = y;
    let mut rows = bottom.min(vis_bottom - 1) + 1 - y;
    if geometry.crop_y > y {
        let lines_to_skip = geometry.crop_y - y;
        src_off += lines_to_skip as usize * w * 3;
        rows -= lines_to_skip;
        top = geometry.crop_y;
    }

    let o_l = geometry.crop_x.saturating_sub(x) as usize;
    let o_r = (right + 1).saturating_sub(vis_right) as usize;
    let line = w - o_l - o_r;

    let dst_row = top.checked_sub(band_top).ok_or_else(|| {
        PlayerError::DecodeFailed(format!("block at row {top} precedes row group at {band_top}"))
    })?;
    let row_bytes = geometry.row_bytes();
    let capacity = if row_bytes == 0 { 0 } else { out.len() / row_bytes };
    if (dst_row + rows) as usize > capacity {
        return Err(PlayerError::RowGroupOverflow {
            rows: dst_row + rows,
            capacity: capacity as u32,
        });
    }

    let needed = src_off + (rows as usize - 1) * w * 3 + (o_l + line) * 3;
    if rgb.len() < needed {
        return Err(PlayerError::DecodeFailed(format!(
            "block {rect:?} has {} bytes, needs {needed}",
            rgb.len()
        )));
    }

    let dst_col = (x as usize + o_l) - geometry.crop_x as usize;
    src_off += o_l * 3;
    for r in 0..rows as usize {
        let src = &rgb[src_off + r * w * 3..][..line * 3];
        let dst = &mut out[(dst_row as usize + r) * row_bytes + dst_col * 2..][..line * 2];
        convert_row(src, dst);
    }

    Ok(rows as usize * line)
}
