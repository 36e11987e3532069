use std::io::Cursor;
use std::num::NonZero;

use image::{ImageFormat, Rgb, RgbImage};
use mjpeg_player::{
    color::rgb565_to_rgb888, source::ChunkedSource, HeapAllocator, MemoryDisplay, MjpegPlayer, PlaybackStats,
    PlayerConfig, PlayerError, SoftwareDecoder, Window,
};

fn jpeg(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb(color));
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)
        .unwrap();
    out
}

/// Left half red, right half blue.
fn split_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgb([255, 0, 0])
        } else {
            Rgb([0, 0, 255])
        }
    });
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)
        .unwrap();
    out
}

fn noise_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let v = (x.wrapping_mul(37) ^ y.wrapping_mul(91) ^ (x * y)) as u8;
        Rgb([v, v.rotate_left(3), !v])
    });
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)
        .unwrap();
    out
}

fn config(width: u16, height: u16, overlapped: bool) -> PlayerConfig {
    PlayerConfig::new(NonZero::new(width).unwrap(), NonZero::new(height).unwrap())
        .with_overlapped(overlapped)
}

fn assert_near(display: &MemoryDisplay, x: u16, y: u16, color: [u8; 3]) {
    let (r, g, b) = rgb565_to_rgb888(display.pixel(x, y));
    let got = [r, g, b];
    for (a, e) in got.iter().zip(color.iter()) {
        assert!(
            (*a as i32 - *e as i32).abs() <= 24,
            "pixel ({x},{y}) = {got:?}, want about {color:?}"
        );
    }
}

fn play(
    stream: Vec<u8>,
    display: MemoryDisplay,
    cfg: &PlayerConfig,
    frame_size: usize,
) -> (PlaybackStats, MemoryDisplay) {
    let mut frame = vec![0u8; frame_size];
    let mut player = MjpegPlayer::setup(
        Cursor::new(stream),
        &mut frame,
        display,
        SoftwareDecoder::new(),
        &mut HeapAllocator,
        cfg,
    )
    .unwrap();
    let stats = player.play(None).unwrap();
    (stats, player.into_display().unwrap())
}

#[test]
fn plays_every_frame_in_order() {
    let mut stream = jpeg(64, 48, [255, 0, 0]);
    stream.extend(jpeg(64, 48, [0, 255, 0]));
    stream.extend(jpeg(64, 48, [0, 0, 255]));
    let total = stream.len() as u64;

    let (stats, display) = play(stream, MemoryDisplay::new(64, 48), &config(64, 48, false), 32 * 1024);
    assert_eq!(stats.frames_extracted, 3);
    assert_eq!(stats.frames_rendered, 3);
    assert_eq!(stats.frames_dropped, 0);
    assert_eq!(stats.bytes_consumed, total);
    assert_near(&display, 0, 0, [0, 0, 255]);
    assert_near(&display, 63, 47, [0, 0, 255]);
    assert_eq!(display.windows().len(), 3);
}

#[test]
fn overlapped_output_matches_single_context() {
    let mut stream = split_jpeg(96, 200);
    stream.extend(split_jpeg(96, 200));

    let (_, direct) = play(stream.clone(), MemoryDisplay::new(96, 120), &config(96, 120, false), 32 * 1024);
    let (stats, overlapped) = play(stream, MemoryDisplay::new(96, 120), &config(96, 120, true), 32 * 1024);

    assert_eq!(stats.frames_rendered, 2);
    assert_eq!(direct.pixels(), overlapped.pixels());
    assert_eq!(direct.windows(), overlapped.windows());
    assert_near(&overlapped, 10, 60, [255, 0, 0]);
    assert_near(&overlapped, 90, 60, [0, 0, 255]);
}

#[test]
fn small_frame_is_centered() {
    let (_, display) = play(jpeg(32, 32, [255, 255, 255]), MemoryDisplay::new(64, 64), &config(64, 64, false), 16 * 1024);
    assert_eq!(display.windows(), &[Window::new(16, 16, 32, 32)]);
    assert_near(&display, 16, 16, [255, 255, 255]);
    assert_near(&display, 47, 47, [255, 255, 255]);
    assert_eq!(display.pixel(15, 16), 0);
    assert_eq!(display.pixel(48, 47), 0);
}

#[test]
fn wide_frame_is_center_cropped() {
    // 160 wide on a 64 wide panel: columns 48..112 are shown
    let (_, display) = play(split_jpeg(160, 32), MemoryDisplay::new(64, 32), &config(64, 32, false), 16 * 1024);
    assert_eq!(display.windows(), &[Window::new(0, 0, 64, 32)]);
    assert_near(&display, 2, 16, [255, 0, 0]);
    assert_near(&display, 61, 16, [0, 0, 255]);
}

#[test]
fn corrupt_frame_is_dropped_and_playback_resyncs() {
    let mut stream = jpeg(32, 32, [255, 0, 0]);
    stream.extend([0xFF, 0xD8, 0x00, 0x11, 0x22, 0x33, 0xFF, 0xD9]);
    stream.extend([0xAB; 17]);
    stream.extend(jpeg(32, 32, [0, 255, 0]));

    let (stats, display) = play(stream, MemoryDisplay::new(32, 32), &config(32, 32, false), 16 * 1024);
    assert_eq!(stats.frames_rendered, 2);
    assert_eq!(stats.frames_dropped, 1);
    assert_eq!(stats.resyncs, 1);
    assert_near(&display, 16, 16, [0, 255, 0]);
}

#[test]
fn frame_larger_than_buffer_is_skipped() {
    let small = jpeg(16, 16, [255, 0, 0]);
    let big = noise_jpeg(128, 128);
    assert!(big.len() > 2048 && small.len() < 2048);

    let mut stream = big;
    stream.extend(small);
    let (stats, display) = play(stream, MemoryDisplay::new(16, 16), &config(16, 16, false), 2048);
    assert_eq!(stats.frames_rendered, 1);
    assert_eq!(stats.frames_dropped, 1);
    assert_near(&display, 8, 8, [255, 0, 0]);
}

#[test]
fn tiny_reads_give_the_same_frames() {
    let mut stream = jpeg(40, 24, [0, 0, 255]);
    stream.extend(jpeg(40, 24, [255, 255, 0]));

    let mut frame = vec![0u8; 16 * 1024];
    let mut display = MemoryDisplay::new(40, 24);
    let mut player = MjpegPlayer::setup_single_context(
        ChunkedSource::new(stream.clone(), 7),
        &mut frame,
        &mut display,
        SoftwareDecoder::new(),
        &mut HeapAllocator,
        &config(40, 24, false),
    )
    .unwrap();
    let first = player.extract_frame().unwrap();
    assert_eq!(player.frame(), &stream[..first]);
    player.decode_and_render_frame().unwrap();
    let second = player.extract_frame().unwrap();
    assert_eq!(player.frame(), &stream[first..first + second]);
    player.decode_and_render_frame().unwrap();
    assert!(matches!(player.extract_frame(), Err(PlayerError::EndOfStream)));
    drop(player);
    assert_near(&display, 20, 12, [255, 255, 0]);
}

#[test]
fn empty_source_ends_immediately() {
    let (stats, display) = play(Vec::new(), MemoryDisplay::new(8, 8), &config(8, 8, true), 1024);
    assert_eq!(stats, Default::default());
    assert!(display.windows().is_empty());
}
