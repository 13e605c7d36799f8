//! LittleFS block geometry
//!
//! The geometry fixes the size of the image: the backing buffer is always
//! `block_size * block_count` bytes, no matter how much payload is stored.
//!
//! Read, program and cache sizes default to the block size and the lookahead
//! buffer to 8 bytes, which is what the Python `littlefs` package produces.
//! Devices mounting the image must agree on the block size; the other
//! parameters only need to be compatible with it.

use crate::image::ImageError;

/// Default filesystem block size (ESP32 flash sector)
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

/// Default number of blocks (512 KiB at the default block size)
pub const DEFAULT_BLOCK_COUNT: u32 = 128;

/// Smallest block size LittleFS accepts
pub const MIN_BLOCK_SIZE: u32 = 128;

/// Default lookahead buffer size in bytes
pub const DEFAULT_LOOKAHEAD_SIZE: u32 = 8;

/// Geometry of a LittleFS image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Erase unit size in bytes
    pub block_size: u32,
    /// Number of blocks in the image
    pub block_count: u32,
    /// Minimum read size in bytes
    pub read_size: u32,
    /// Minimum program size in bytes
    pub prog_size: u32,
    /// Per-file and block cache size in bytes
    pub cache_size: u32,
    /// Lookahead buffer size in bytes
    pub lookahead_size: u32,
    /// Erase cycles before metadata is moved; -1 disables wear levelling
    pub block_cycles: i32,
}

impl Geometry {
    /// Geometry with the given block size and count and derived defaults
    pub fn new(block_size: u32, block_count: u32) -> Self {
        Self {
            block_size,
            block_count,
            read_size: block_size,
            prog_size: block_size,
            cache_size: block_size,
            lookahead_size: DEFAULT_LOOKAHEAD_SIZE,
            block_cycles: -1,
        }
    }

    /// Size of the image in bytes, or `None` if it does not fit in memory
    pub fn checked_image_size(&self) -> Option<usize> {
        (self.block_size as usize).checked_mul(self.block_count as usize)
    }

    /// Size of the image in bytes
    ///
    /// Only meaningful on a validated geometry; saturates otherwise.
    pub fn image_size(&self) -> usize {
        self.checked_image_size().unwrap_or(usize::MAX)
    }

    /// Check the geometry against the constraints of the LittleFS library
    ///
    /// The C library asserts on most of these, so they are rejected here
    /// with a readable error instead.
    pub fn validate(&self) -> Result<(), ImageError> {
        let invalid = |msg: String| Err(ImageError::InvalidGeometry(msg));

        if self.block_size < MIN_BLOCK_SIZE {
            return invalid(format!(
                "block size {} is below the minimum of {}",
                self.block_size, MIN_BLOCK_SIZE
            ));
        }
        if self.block_count < 2 {
            return invalid(format!(
                "block count {} is too small, need at least 2 blocks for the superblock pair",
                self.block_count
            ));
        }
        if self.read_size == 0 || self.prog_size == 0 || self.cache_size == 0 {
            return invalid("read, program and cache sizes must be non-zero".to_string());
        }
        if self.cache_size % self.read_size != 0 || self.cache_size % self.prog_size != 0 {
            return invalid(format!(
                "cache size {} must be a multiple of read size {} and program size {}",
                self.cache_size, self.read_size, self.prog_size
            ));
        }
        if self.block_size % self.cache_size != 0 {
            return invalid(format!(
                "block size {} must be a multiple of cache size {}",
                self.block_size, self.cache_size
            ));
        }
        if self.lookahead_size == 0 || self.lookahead_size % 8 != 0 {
            return invalid(format!(
                "lookahead size {} must be a non-zero multiple of 8",
                self.lookahead_size
            ));
        }
        if self.block_cycles == 0 {
            return invalid("block cycles must be positive or -1".to_string());
        }
        if self.checked_image_size().is_none()
            || self.block_size.checked_mul(self.block_count).is_none()
        {
            return invalid(format!(
                "{} blocks of {} bytes exceed the addressable image size",
                self.block_count, self.block_size
            ));
        }

        Ok(())
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_SIZE, DEFAULT_BLOCK_COUNT)
    }
}

/// Format a byte count as a human-readable string
pub fn format_size(size: u64) -> String {
    if size >= 1024 * 1024 && size % (1024 * 1024) == 0 {
        format!("{} MiB", size / (1024 * 1024))
    } else if size >= 1024 && size % 1024 == 0 {
        format!("{} KiB", size / 1024)
    } else {
        format!("{} bytes", size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_geometry() {
        let geometry = Geometry::default();
        assert_eq!(geometry.block_size, 4096);
        assert_eq!(geometry.block_count, 128);
        assert_eq!(geometry.image_size(), 512 * 1024);
        assert!(geometry.validate().is_ok());
    }

    #[test]
    fn test_derived_sizes_follow_block_size() {
        let geometry = Geometry::new(512, 16);
        assert_eq!(geometry.read_size, 512);
        assert_eq!(geometry.prog_size, 512);
        assert_eq!(geometry.cache_size, 512);
        assert_eq!(geometry.lookahead_size, 8);
        assert_eq!(geometry.block_cycles, -1);
    }

    #[test]
    fn test_rejects_small_blocks() {
        assert!(Geometry::new(64, 16).validate().is_err());
        assert!(Geometry::new(4096, 1).validate().is_err());
        assert!(Geometry::new(4096, 0).validate().is_err());
    }

    #[test]
    fn test_rejects_misaligned_cache() {
        let mut geometry = Geometry::new(4096, 16);
        geometry.cache_size = 3000;
        assert!(geometry.validate().is_err());

        geometry.cache_size = 1024;
        geometry.read_size = 256;
        geometry.prog_size = 256;
        assert!(geometry.validate().is_ok());

        geometry.prog_size = 768;
        assert!(geometry.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_lookahead_and_cycles() {
        let mut geometry = Geometry::new(4096, 16);
        geometry.lookahead_size = 12;
        assert!(geometry.validate().is_err());

        let mut geometry = Geometry::new(4096, 16);
        geometry.block_cycles = 0;
        assert!(geometry.validate().is_err());
    }

    #[test]
    fn test_rejects_overflowing_product() {
        assert!(Geometry::new(1 << 20, u32::MAX).validate().is_err());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512 * 1024), "512 KiB");
        assert_eq!(format_size(4 * 1024 * 1024), "4 MiB");
        assert_eq!(format_size(1000), "1000 bytes");
    }
}
