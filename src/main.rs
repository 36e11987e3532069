use std::{env, fs::File, io::BufReader};

use anyhow::{anyhow, Result};
use log::{error, info};

use mjpeg_player::{
    config::{self, PlayerConfig},
    HeapAllocator, JpegEngine, MemoryDisplay, MjpegPlayer,
};

const USAGE: &str = "usage: mjpeg-player <file.mjpeg> [config.json] [snapshot.png]";

#[cfg(feature = "tjpgd")]
fn engine() -> impl JpegEngine {
    mjpeg_player::tjpgd::TjpgdDecoder::new()
}

#[cfg(not(feature = "tjpgd"))]
fn engine() -> impl JpegEngine {
    mjpeg_player::SoftwareDecoder::new()
}

fn main() -> Result<()> {
    let _ = env_logger::builder().is_test(false).try_init();

    let mut args = env::args().skip(1);
    let video = args.next().ok_or_else(|| anyhow!(USAGE))?;
    let config = match args.next() {
        Some(path) => config::read_config(&path).unwrap_or_else(|err| {
            error!("config read fail:{err:?}");
            PlayerConfig::default()
        }),
        None => PlayerConfig::default(),
    };
    let snapshot = args.next();

    let (width, height) = config.get_screen_size();
    let source = BufReader::new(File::open(&video)?);
    let mut frame_buf = vec![0u8; config.frame_buffer_size];
    let display = MemoryDisplay::new(width, height);

    let mut player = MjpegPlayer::setup(
        source,
        &mut frame_buf,
        display,
        engine(),
        &mut HeapAllocator,
        &config,
    )?;
    let stats = player.play(None)?;
    info!(
        "{video}: {} frames shown, {} dropped, {} resyncs, {} bytes",
        stats.frames_rendered, stats.frames_dropped, stats.resyncs, stats.bytes_consumed
    );
    println!("{}", serde_json::to_string(&stats)?);

    if let Some(path) = snapshot {
        let display = player
            .into_display()
            .ok_or_else(|| anyhow!("display lost with the transfer thread"))?;
        display.save_png(&path)?;
        info!("last frame saved to {path}");
    }
    Ok(())
}
