//! In-memory block device backing the LittleFS instance
//!
//! The device is a flat byte buffer of `block_size * block_count` bytes that
//! starts out erased (0xFF). Once the filesystem is unmounted the buffer is
//! the image, byte for byte.

use std::ffi::{c_int, c_void};
use std::slice;

use littlefs2_sys as ll;

use super::error::LfsError;

/// Value of an erased flash byte
pub const ERASED: u8 = 0xFF;

/// RAM-backed block device
#[derive(Debug)]
pub(crate) struct RamStorage {
    data: Vec<u8>,
    block_size: usize,
}

impl RamStorage {
    /// Create a fully erased device
    pub fn erased(block_size: usize, block_count: usize) -> Self {
        Self {
            data: vec![ERASED; block_size * block_count],
            block_size,
        }
    }

    /// Create a device holding an existing image
    pub fn with_data(block_size: usize, data: Vec<u8>) -> Self {
        Self { data, block_size }
    }

    /// Take the device contents, leaving it empty
    pub fn take_data(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }

    fn range(&self, block: u32, off: u32, len: usize) -> Result<std::ops::Range<usize>, LfsError> {
        let off = off as usize;
        if off + len > self.block_size {
            log::error!(
                "access past block end: block {} offset {} length {}",
                block,
                off,
                len
            );
            return Err(LfsError::Io);
        }
        let start = block as usize * self.block_size + off;
        let end = start + len;
        if end > self.data.len() {
            log::error!("access past device end: block {}", block);
            return Err(LfsError::Io);
        }
        Ok(start..end)
    }

    pub fn read(&self, block: u32, off: u32, buf: &mut [u8]) -> Result<(), LfsError> {
        let range = self.range(block, off, buf.len())?;
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    pub fn prog(&mut self, block: u32, off: u32, data: &[u8]) -> Result<(), LfsError> {
        let range = self.range(block, off, data.len())?;
        self.data[range].copy_from_slice(data);
        Ok(())
    }

    pub fn erase(&mut self, block: u32) -> Result<(), LfsError> {
        let range = self.range(block, 0, self.block_size)?;
        self.data[range].fill(ERASED);
        Ok(())
    }
}

fn status(result: Result<(), LfsError>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(e) => e.code(),
    }
}

/// `lfs_config::read` callback
///
/// # Safety
///
/// `c.context` must point to a live `RamStorage` and `buffer` must be valid
/// for `size` bytes, which the library guarantees for the configs built in
/// [`super::LittleFs`].
pub(crate) unsafe extern "C" fn lfs_read(
    c: *const ll::lfs_config,
    block: ll::lfs_block_t,
    off: ll::lfs_off_t,
    buffer: *mut c_void,
    size: ll::lfs_size_t,
) -> c_int {
    let storage = &*((*c).context as *const RamStorage);
    let buf = slice::from_raw_parts_mut(buffer as *mut u8, size as usize);
    status(storage.read(block, off, buf))
}

/// `lfs_config::prog` callback
///
/// # Safety
///
/// Same contract as [`lfs_read`].
pub(crate) unsafe extern "C" fn lfs_prog(
    c: *const ll::lfs_config,
    block: ll::lfs_block_t,
    off: ll::lfs_off_t,
    buffer: *const c_void,
    size: ll::lfs_size_t,
) -> c_int {
    let storage = &mut *((*c).context as *mut RamStorage);
    let data = slice::from_raw_parts(buffer as *const u8, size as usize);
    status(storage.prog(block, off, data))
}

/// `lfs_config::erase` callback
///
/// # Safety
///
/// `c.context` must point to a live `RamStorage`.
pub(crate) unsafe extern "C" fn lfs_erase(
    c: *const ll::lfs_config,
    block: ll::lfs_block_t,
) -> c_int {
    let storage = &mut *((*c).context as *mut RamStorage);
    status(storage.erase(block))
}

/// `lfs_config::sync` callback, nothing is cached below the library
pub(crate) unsafe extern "C" fn lfs_sync(_c: *const ll::lfs_config) -> c_int {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_erased() {
        let mut storage = RamStorage::erased(128, 4);
        let mut buf = [0u8; 16];
        storage.read(3, 112, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == ERASED));
        assert_eq!(storage.take_data().len(), 512);
    }

    #[test]
    fn test_prog_and_erase() {
        let mut storage = RamStorage::erased(128, 4);
        storage.prog(1, 8, b"abcd").unwrap();

        let mut buf = [0u8; 4];
        storage.read(1, 8, &mut buf).unwrap();
        assert_eq!(&buf, b"abcd");

        storage.erase(1).unwrap();
        storage.read(1, 8, &mut buf).unwrap();
        assert_eq!(buf, [ERASED; 4]);
    }

    #[test]
    fn test_out_of_bounds() {
        let mut storage = RamStorage::erased(128, 4);
        let mut buf = [0u8; 16];
        assert_eq!(storage.read(4, 0, &mut buf), Err(LfsError::Io));
        assert_eq!(storage.read(0, 120, &mut buf), Err(LfsError::Io));
        assert_eq!(storage.prog(9, 0, b"x"), Err(LfsError::Io));
        assert_eq!(storage.erase(4), Err(LfsError::Io));
    }
}
