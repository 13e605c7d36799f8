//! lfsflash-core - LittleFS image building and flashing for lfsflash
//!
//! This crate packages a host directory into a LittleFS image and hands the
//! image to an external flashing utility. It is split into:
//!
//! - [`geometry`] - block geometry of the image (block size, count, caches)
//! - [`lfs`] - a safe wrapper around the LittleFS C library over a RAM device
//! - [`image`] - walking a source tree and assembling the image file
//! - [`flasher`] - building the flashing tool's command line and running it
//! - [`config`] - TOML profiles with flash settings and a partition table
//! - [`dispatch`] - the build-then-flash sequence selected by the CLI
//!
//! # Example
//!
//! ```no_run
//! use lfsflash_core::geometry::Geometry;
//! use lfsflash_core::image::{build_image_file, NoProgress};
//!
//! let geometry = Geometry::new(4096, 128);
//! let image = build_image_file("assets", "littlefs.bin", &geometry, &mut NoProgress)?;
//! println!("{} files, {} bytes", image.files.len(), image.data.len());
//! # Ok::<(), lfsflash_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod flasher;
pub mod geometry;
pub mod image;
pub mod lfs;

pub use error::{Error, Result};
