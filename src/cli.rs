//! CLI argument parsing

use clap::Parser;
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

#[derive(Parser, Debug)]
#[command(name = "lfsflash")]
#[command(
    author,
    version,
    about = "Create a LittleFS image from a directory and flash it",
    long_about = "Create a LittleFS image from a directory and flash it.\n\n\
                  By default the image is built and then written with esptool.py. \
                  Settings not given on the command line are taken from the \
                  profile (--config), then from the built-in defaults."
)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Source directory to package [default: assets]
    #[arg(short, long)]
    pub source: Option<PathBuf>,

    /// Image file to write [default: littlefs.bin]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Block size in bytes [default: 4096]
    #[arg(long, value_parser = parse_hex_u32)]
    pub block_size: Option<u32>,

    /// Number of blocks [default: 128]
    #[arg(long, value_parser = parse_hex_u32)]
    pub block_count: Option<u32>,

    /// Serial port (auto-detected by the flashing tool if not given)
    #[arg(short, long)]
    pub port: Option<String>,

    /// Flash offset, hex or decimal [default: 0x110000]
    #[arg(long, value_parser = parse_hex_u32)]
    pub offset: Option<u32>,

    /// Flash to the named partition from the profile's partition table
    #[arg(long)]
    pub partition: Option<String>,

    /// Profile file (TOML) with image, flash and partition settings
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Only create the image, do not flash it
    #[arg(long, conflicts_with = "upload_only")]
    pub create_only: bool,

    /// Only flash an existing image, do not rebuild it
    #[arg(long)]
    pub upload_only: bool,

    /// List the files in the image
    #[arg(short, long)]
    pub list: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_hex_u32() {
        assert_eq!(parse_hex_u32("0x110000"), Ok(0x110000));
        assert_eq!(parse_hex_u32("0X1000"), Ok(0x1000));
        assert_eq!(parse_hex_u32("1114112"), Ok(0x110000));
        assert!(parse_hex_u32("0xG").is_err());
        assert!(parse_hex_u32("").is_err());
    }

    #[test]
    fn test_defaults_are_unset() {
        let cli = Cli::try_parse_from(["lfsflash"]).unwrap();
        assert_eq!(cli.source, None);
        assert_eq!(cli.offset, None);
        assert!(!cli.create_only && !cli.upload_only && !cli.list);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from([
            "lfsflash",
            "-s",
            "web",
            "-o",
            "fs.bin",
            "--block-size",
            "512",
            "--block-count",
            "0x40",
            "-p",
            "/dev/ttyUSB0",
            "--offset",
            "0x290000",
            "--create-only",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.source, Some(PathBuf::from("web")));
        assert_eq!(cli.output, Some(PathBuf::from("fs.bin")));
        assert_eq!(cli.block_size, Some(512));
        assert_eq!(cli.block_count, Some(64));
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(cli.offset, Some(0x290000));
        assert!(cli.create_only);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_create_and_upload_only_conflict() {
        let err = Cli::try_parse_from(["lfsflash", "--create-only", "--upload-only"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_bad_offset_rejected() {
        assert!(Cli::try_parse_from(["lfsflash", "--offset", "0xnope"]).is_err());
    }
}
