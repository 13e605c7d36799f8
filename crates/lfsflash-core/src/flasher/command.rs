//! Flashing tool command line
//!
//! The tool is invoked as
//!
//! ```text
//! <tool> --chip <chip> [--port <port>] --baud <baud> write_flash \
//!     --flash_mode <mode> --flash_size <size> --flash_freq <freq> <offset> <image>
//! ```

use std::path::PathBuf;

/// Default flashing tool
pub const DEFAULT_TOOL: &str = "esptool.py";
/// Default target chip
pub const DEFAULT_CHIP: &str = "esp32s3";
/// Default serial baud rate
pub const DEFAULT_BAUD: u32 = 921_600;
/// Default SPI flash mode
pub const DEFAULT_FLASH_MODE: &str = "dio";
/// Default flash size
pub const DEFAULT_FLASH_SIZE: &str = "4MB";
/// Default SPI flash frequency
pub const DEFAULT_FLASH_FREQ: &str = "80m";

/// Default flash offset of the LittleFS partition
///
/// Matches the layout nvs@0x9000 (24 KiB), phy_init@0xF000 (4 KiB),
/// factory@0x10000 (1 MiB), leaving the filesystem at 0x110000.
pub const DEFAULT_OFFSET: u32 = 0x11_0000;

/// Flash sector size; offsets should be aligned to it
pub const SECTOR_SIZE: u32 = 0x1000;

/// Fixed parameters passed to the flashing tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashSettings {
    /// Program to run
    pub tool: String,
    /// Chip identifier understood by the tool
    pub chip: String,
    /// Serial baud rate
    pub baud: u32,
    /// SPI flash mode (qio, qout, dio, dout)
    pub flash_mode: String,
    /// Flash size (e.g. "4MB")
    pub flash_size: String,
    /// SPI flash frequency (e.g. "80m")
    pub flash_freq: String,
}

impl Default for FlashSettings {
    fn default() -> Self {
        Self {
            tool: DEFAULT_TOOL.to_string(),
            chip: DEFAULT_CHIP.to_string(),
            baud: DEFAULT_BAUD,
            flash_mode: DEFAULT_FLASH_MODE.to_string(),
            flash_size: DEFAULT_FLASH_SIZE.to_string(),
            flash_freq: DEFAULT_FLASH_FREQ.to_string(),
        }
    }
}

/// A complete flashing tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashCommand {
    /// Tool parameters
    pub settings: FlashSettings,
    /// Serial port; `None` lets the tool auto-detect
    pub port: Option<String>,
    /// Flash offset to write the image at
    pub offset: u32,
    /// Image file to write
    pub image: PathBuf,
}

impl FlashCommand {
    /// Create a command with default settings
    pub fn new(image: impl Into<PathBuf>, port: Option<String>, offset: u32) -> Self {
        Self {
            settings: FlashSettings::default(),
            port,
            offset,
            image: image.into(),
        }
    }

    /// Replace the tool settings
    pub fn with_settings(mut self, settings: FlashSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Program to run
    pub fn program(&self) -> &str {
        &self.settings.tool
    }

    /// Argument vector, without the program name
    pub fn args(&self) -> Vec<String> {
        let s = &self.settings;
        let mut args = vec!["--chip".to_string(), s.chip.clone()];

        if let Some(port) = &self.port {
            args.push("--port".to_string());
            args.push(port.clone());
        }

        args.extend([
            "--baud".to_string(),
            s.baud.to_string(),
            "write_flash".to_string(),
            "--flash_mode".to_string(),
            s.flash_mode.clone(),
            "--flash_size".to_string(),
            s.flash_size.clone(),
            "--flash_freq".to_string(),
            s.flash_freq.clone(),
            format!("0x{:X}", self.offset),
            self.image.display().to_string(),
        ]);
        args
    }

    /// The full command line, for display
    pub fn command_line(&self) -> String {
        let mut line = self.program().to_string();
        for arg in self.args() {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }

    /// Whether the offset sits on a flash sector boundary
    pub fn is_sector_aligned(&self) -> bool {
        self.offset % SECTOR_SIZE == 0
    }
}
