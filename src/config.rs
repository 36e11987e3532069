use std::{num::NonZero, path::Path};

use anyhow::{anyhow, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{PlayerError, PlayerResult};

pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;
pub const DEFAULT_ROW_GROUP_HEIGHT: u16 = 48;
pub const DEFAULT_FRAME_BUFFER_SIZE: usize = 100 * 1024;
pub const DEFAULT_TRANSFER_STACK_SIZE: usize = 16 * 1024;

const DEFAULT_WIDTH: NonZero<u16> = match NonZero::new(320) {
    Some(w) => w,
    None => panic!("zero width"),
};
const DEFAULT_HEIGHT: NonZero<u16> = match NonZero::new(240) {
    Some(h) => h,
    None => panic!("zero height"),
};

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct PlayerConfig {
    pub display_width: NonZero<u16>,
    pub display_height: NonZero<u16>,
    /// Bytes pulled from the source per read call
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// Rows held by one transfer buffer
    #[serde(default = "default_row_group_height")]
    pub row_group_height: u16,
    /// Size of the frame buffer the binary allocates for the caller
    #[serde(default = "default_frame_buffer_size")]
    pub frame_buffer_size: usize,
    /// Decode and transfer on two threads
    #[serde(default)]
    pub overlapped: bool,
    #[serde(default = "default_transfer_stack_size")]
    pub transfer_stack_size: usize,
}

fn default_read_buffer_size() -> usize {
    DEFAULT_READ_BUFFER_SIZE
}

fn default_row_group_height() -> u16 {
    DEFAULT_ROW_GROUP_HEIGHT
}

fn default_frame_buffer_size() -> usize {
    DEFAULT_FRAME_BUFFER_SIZE
}

fn default_transfer_stack_size() -> usize {
    DEFAULT_TRANSFER_STACK_SIZE
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }
}

impl PlayerConfig {
    pub fn new(display_width: NonZero<u16>, display_height: NonZero<u16>) -> Self {
        Self {
            display_width,
            display_height,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            row_group_height: DEFAULT_ROW_GROUP_HEIGHT,
            frame_buffer_size: DEFAULT_FRAME_BUFFER_SIZE,
            overlapped: false,
            transfer_stack_size: DEFAULT_TRANSFER_STACK_SIZE,
        }
    }

    pub fn with_overlapped(mut self, overlapped: bool) -> Self {
        self.overlapped = overlapped;
        self
    }

    pub fn get_screen_size(&self) -> (u16, u16) {
        (self.display_width.get(), self.display_height.get())
    }

    /// Bytes of one transfer buffer: a full display row band in RGB565.
    pub fn transfer_buffer_size(&self) -> usize {
        self.display_width.get() as usize * self.row_group_height as usize * 2
    }

    pub fn validate(&self) -> PlayerResult<()> {
        if self.read_buffer_size < 2 {
            return Err(PlayerError::InvalidConfig(format!(
                "read_buffer_size {} < 2",
                self.read_buffer_size
            )));
        }
        if self.row_group_height == 0 {
            return Err(PlayerError::InvalidConfig("row_group_height == 0".into()));
        }
        if self.frame_buffer_size == 0 {
            return Err(PlayerError::InvalidConfig("frame_buffer_size == 0".into()));
        }
        Ok(())
    }
}

pub fn parse_player_config(data: Vec<u8>) -> Result<PlayerConfig> {
    let data_str = String::from_utf8(data)?;
    info!("Receive Data:{data_str}");
    let config = serde_json::from_str::<PlayerConfig>(&data_str)?;
    config.validate().map_err(|err| anyhow!("{err}"))?;
    Ok(config)
}

pub fn read_config(path: impl AsRef<Path>) -> Result<PlayerConfig> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|err| anyhow!("{}: {err}", path.display()))?;
    parse_player_config(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_applies_defaults() {
        let cfg = parse_player_config(br#"{"display_width":320,"display_height":240}"#.to_vec())
            .unwrap();
        assert_eq!(cfg.get_screen_size(), (320, 240));
        assert_eq!(cfg.read_buffer_size, 4096);
        assert_eq!(cfg.row_group_height, 48);
        assert!(!cfg.overlapped);
        assert_eq!(cfg.transfer_buffer_size(), 320 * 48 * 2);
    }

    #[test]
    fn default_is_qvga() {
        let cfg = PlayerConfig::default();
        assert_eq!(cfg.get_screen_size(), (320, 240));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn parse_rejects_zero_width() {
        assert!(parse_player_config(br#"{"display_width":0,"display_height":240}"#.to_vec()).is_err());
    }

    #[test]
    fn parse_rejects_tiny_read_buffer() {
        let json = br#"{"display_width":10,"display_height":10,"read_buffer_size":1}"#;
        assert!(parse_player_config(json.to_vec()).is_err());
    }

    #[test]
    fn roundtrip_overlapped_flag() {
        let cfg = PlayerConfig::new(NonZero::new(240).unwrap(), NonZero::new(135).unwrap())
            .with_overlapped(true);
        let json = serde_json::to_string(&cfg).unwrap();
        let back = parse_player_config(json.into_bytes()).unwrap();
        assert_eq!(back, cfg);
    }
}
