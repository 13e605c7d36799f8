//! Error types for lfsflash-core
//!
//! Every failure a run can hit ends up in [`Error`]. The CLI prints it
//! together with its `source()` chain and exits non-zero; nothing is retried.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::flasher::FlashError;
use crate::image::ImageError;

/// Top-level error for build and flash runs
#[derive(Debug, Error)]
pub enum Error {
    /// The source directory to package does not exist
    #[error("source directory '{}' does not exist", .0.display())]
    MissingSource(PathBuf),

    /// The image file to flash does not exist
    #[error("image file '{}' does not exist", .0.display())]
    MissingImage(PathBuf),

    /// Building the LittleFS image failed
    #[error("failed to create LittleFS image")]
    Build(#[from] ImageError),

    /// Running the flashing tool failed
    #[error("upload failed")]
    Flash(#[from] FlashError),

    /// Loading or resolving the profile failed
    #[error("invalid configuration")]
    Config(#[from] ConfigError),

    /// The image does not fit the selected partition
    #[error("image is {image} bytes but partition '{partition}' only holds {capacity} bytes")]
    ImageTooLarge {
        /// Image size in bytes
        image: u64,
        /// Partition name
        partition: String,
        /// Partition size in bytes
        capacity: u32,
    },
}

/// Result type alias using the crate Error type
pub type Result<T> = std::result::Result<T, Error>;
