//! lfsflash - package a directory as a LittleFS image and flash it
//!
//! Two steps, either of which can be skipped:
//! - **create**: walk the source directory and write every regular file
//!   into a LittleFS image of a fixed block geometry
//! - **upload**: hand the image to `esptool.py` (or another tool from the
//!   profile) to write it at the filesystem partition's flash offset

mod cli;
mod commands;

use clap::Parser;
use cli::Cli;
use std::error::Error as _;

fn main() {
    let cli = Cli::parse();

    // Initialize logger; -v raises the default level, RUST_LOG still wins
    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = commands::run(&cli) {
        eprintln!("Error: {}", e);
        let mut source = e.source();
        while let Some(cause) = source {
            eprintln!("  caused by: {}", cause);
            source = cause.source();
        }
        std::process::exit(1);
    }
}
