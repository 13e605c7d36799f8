//! Safe wrapper around the LittleFS C library
//!
//! [`LittleFs`] owns everything the library keeps pointers to: the `lfs_t`
//! state, the `lfs_config`, the cache buffers and the RAM block device. All
//! of them are heap allocated once and never moved, so the pointers handed
//! to C stay valid for the lifetime of the value.
//!
//! The geometry is a runtime value, so this talks to `littlefs2-sys`
//! directly rather than through the typenum-sized `littlefs2::driver::Storage`.
//!
//! ```ignore
//! let mut fs = LittleFs::format(&Geometry::new(4096, 8))?;
//! fs.create_dir_all("sub")?;
//! fs.write_file("sub/b.txt", b"world")?;
//! let image: Vec<u8> = fs.into_image()?;
//! ```

mod error;
mod storage;

use std::ffi::{CStr, CString};
use std::mem;
use std::ptr::NonNull;

use littlefs2_sys as ll;

use crate::geometry::Geometry;
use error::check;
use storage::RamStorage;

pub use error::LfsError;
pub use storage::ERASED;

// Open flags and entry types from lfs.h
const LFS_O_RDONLY: i32 = 1;
const LFS_O_WRONLY: i32 = 2;
const LFS_O_CREAT: i32 = 0x0100;
const LFS_O_TRUNC: i32 = 0x0400;
const LFS_TYPE_REG: u8 = 0x001;
const LFS_TYPE_DIR: u8 = 0x002;

/// Chunk size used when reading files back out of the image
const READ_CHUNK_SIZE: usize = 4096;

/// Kind of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory
    Dir,
}

/// An entry returned by [`LittleFs::read_dir`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name (single path component)
    pub name: String,
    /// File or directory
    pub kind: EntryKind,
    /// Size in bytes (0 for directories)
    pub size: u32,
}

/// A regular file found by [`LittleFs::walk`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path relative to the filesystem root, `/`-separated
    pub path: String,
    /// Size in bytes
    pub size: u32,
}

/// A mounted LittleFS instance over a RAM block device
pub struct LittleFs {
    lfs: Box<ll::lfs_t>,
    config: Box<ll::lfs_config>,
    storage: NonNull<RamStorage>,
    _read_buffer: Vec<u8>,
    _prog_buffer: Vec<u8>,
    _lookahead_buffer: Vec<u64>,
    geometry: Geometry,
    mounted: bool,
}

/// An open file together with the buffers the library points into
struct OpenFile {
    file: Box<ll::lfs_file_t>,
    config: Box<ll::lfs_file_config>,
    _cache: Vec<u8>,
}

impl OpenFile {
    fn new(cache_size: usize) -> Self {
        let mut cache = vec![0u8; cache_size];
        // SAFETY: both are plain C structs of integers and pointers; all-zero
        // is their documented default state.
        let file: Box<ll::lfs_file_t> = Box::new(unsafe { mem::zeroed() });
        let mut config: Box<ll::lfs_file_config> = Box::new(unsafe { mem::zeroed() });
        config.buffer = cache.as_mut_ptr().cast();
        Self {
            file,
            config,
            _cache: cache,
        }
    }
}

impl LittleFs {
    /// Format a fresh, erased device with the given geometry and mount it
    pub fn format(geometry: &Geometry) -> Result<Self, LfsError> {
        geometry.validate().map_err(|_| LfsError::Invalid)?;
        let storage = RamStorage::erased(
            geometry.block_size as usize,
            geometry.block_count as usize,
        );
        let mut fs = Self::with_storage(geometry, storage);

        // SAFETY: `lfs` and `config` are heap allocated and outlive the call.
        check(unsafe { ll::lfs_format(fs.lfs_ptr(), fs.config_ptr()) })?;
        fs.mount_inner()?;
        log::debug!(
            "formatted LittleFS: {} blocks of {} bytes",
            geometry.block_count,
            geometry.block_size
        );
        Ok(fs)
    }

    /// Mount an existing image
    ///
    /// `image` must be exactly `block_size * block_count` bytes long.
    pub fn mount(geometry: &Geometry, image: Vec<u8>) -> Result<Self, LfsError> {
        geometry.validate().map_err(|_| LfsError::Invalid)?;
        if image.len() != geometry.image_size() {
            return Err(LfsError::Invalid);
        }
        let storage = RamStorage::with_data(geometry.block_size as usize, image);
        let mut fs = Self::with_storage(geometry, storage);
        fs.mount_inner()?;
        Ok(fs)
    }

    fn with_storage(geometry: &Geometry, storage: RamStorage) -> Self {
        let storage = NonNull::from(Box::leak(Box::new(storage)));

        let mut read_buffer = vec![0u8; geometry.cache_size as usize];
        let mut prog_buffer = vec![0u8; geometry.cache_size as usize];
        // u64 words keep the lookahead buffer 8-byte aligned
        let mut lookahead_buffer = vec![0u64; (geometry.lookahead_size as usize).div_ceil(8)];

        // SAFETY: `lfs_t` and `lfs_config` are C structs of integers, pointers
        // and nullable function pointers. Zero selects the library defaults
        // for every field not set below.
        let lfs: Box<ll::lfs_t> = Box::new(unsafe { mem::zeroed() });
        let mut config: Box<ll::lfs_config> = Box::new(unsafe { mem::zeroed() });

        config.context = storage.as_ptr().cast();
        config.read = Some(storage::lfs_read);
        config.prog = Some(storage::lfs_prog);
        config.erase = Some(storage::lfs_erase);
        config.sync = Some(storage::lfs_sync);
        config.read_size = geometry.read_size;
        config.prog_size = geometry.prog_size;
        config.block_size = geometry.block_size;
        config.block_count = geometry.block_count;
        config.block_cycles = geometry.block_cycles;
        config.cache_size = geometry.cache_size;
        config.lookahead_size = geometry.lookahead_size;
        config.read_buffer = read_buffer.as_mut_ptr().cast();
        config.prog_buffer = prog_buffer.as_mut_ptr().cast();
        config.lookahead_buffer = lookahead_buffer.as_mut_ptr().cast();

        Self {
            lfs,
            config,
            storage,
            _read_buffer: read_buffer,
            _prog_buffer: prog_buffer,
            _lookahead_buffer: lookahead_buffer,
            geometry: *geometry,
            mounted: false,
        }
    }

    fn lfs_ptr(&mut self) -> *mut ll::lfs_t {
        &mut *self.lfs
    }

    fn config_ptr(&self) -> *const ll::lfs_config {
        &*self.config
    }

    fn mount_inner(&mut self) -> Result<(), LfsError> {
        // SAFETY: see `format`.
        check(unsafe { ll::lfs_mount(self.lfs_ptr(), self.config_ptr()) })?;
        self.mounted = true;
        Ok(())
    }

    fn unmount(&mut self) -> Result<(), LfsError> {
        if self.mounted {
            self.mounted = false;
            // SAFETY: the filesystem is mounted on `lfs`.
            check(unsafe { ll::lfs_unmount(self.lfs_ptr()) })?;
        }
        Ok(())
    }

    /// Geometry this filesystem was created with
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Create a directory; an existing directory is not an error
    pub fn create_dir(&mut self, path: &str) -> Result<(), LfsError> {
        let c_path = c_path(path)?;
        // SAFETY: mounted filesystem, NUL-terminated path.
        match check(unsafe { ll::lfs_mkdir(self.lfs_ptr(), c_path.as_ptr().cast()) }) {
            Ok(_) | Err(LfsError::Exists) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Create a directory and all of its missing ancestors
    pub fn create_dir_all(&mut self, path: &str) -> Result<(), LfsError> {
        let mut current = String::new();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(component);
            self.create_dir(&current)?;
        }
        Ok(())
    }

    /// Create or truncate a file and write `data` into it
    ///
    /// The parent directory must exist.
    pub fn write_file(&mut self, path: &str, data: &[u8]) -> Result<(), LfsError> {
        let len = u32::try_from(data.len()).map_err(|_| LfsError::FileTooBig)?;
        let c_path = c_path(path)?;
        let mut open = OpenFile::new(self.geometry.cache_size as usize);
        let lfs = self.lfs_ptr();

        // SAFETY: `open` keeps the file state and its cache alive until the
        // file is closed below; the library unlinks it from `lfs` on close.
        unsafe {
            check(ll::lfs_file_opencfg(
                lfs,
                &mut *open.file,
                c_path.as_ptr().cast(),
                LFS_O_WRONLY | LFS_O_CREAT | LFS_O_TRUNC,
                &*open.config,
            ))?;
            let written = ll::lfs_file_write(lfs, &mut *open.file, data.as_ptr().cast(), len);
            // Close flushes the cache, which can itself run out of space
            let closed = ll::lfs_file_close(lfs, &mut *open.file);
            let written = check(written)?;
            check(closed)?;
            if written != data.len() {
                return Err(LfsError::NoSpace);
            }
        }
        Ok(())
    }

    /// Read a whole file
    pub fn read_file(&mut self, path: &str) -> Result<Vec<u8>, LfsError> {
        let c_path = c_path(path)?;
        let mut open = OpenFile::new(self.geometry.cache_size as usize);
        let lfs = self.lfs_ptr();
        let mut contents = Vec::new();
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];

        // SAFETY: as in `write_file`.
        unsafe {
            check(ll::lfs_file_opencfg(
                lfs,
                &mut *open.file,
                c_path.as_ptr().cast(),
                LFS_O_RDONLY,
                &*open.config,
            ))?;
            let result = loop {
                let n = ll::lfs_file_read(
                    lfs,
                    &mut *open.file,
                    chunk.as_mut_ptr().cast(),
                    chunk.len() as ll::lfs_size_t,
                );
                match check(n) {
                    Ok(0) => break Ok(()),
                    Ok(n) => contents.extend_from_slice(&chunk[..n]),
                    Err(e) => break Err(e),
                }
            };
            let closed = ll::lfs_file_close(lfs, &mut *open.file);
            result?;
            check(closed)?;
        }
        Ok(contents)
    }

    /// List a directory, without the `.` and `..` entries
    pub fn read_dir(&mut self, path: &str) -> Result<Vec<DirEntry>, LfsError> {
        let c_path = c_path(path)?;
        let lfs = self.lfs_ptr();
        // SAFETY: zeroed `lfs_dir_t` is the unopened state.
        let mut dir: Box<ll::lfs_dir_t> = Box::new(unsafe { mem::zeroed() });
        let mut entries = Vec::new();

        // SAFETY: `dir` stays alive and unmoved until it is closed.
        unsafe {
            check(ll::lfs_dir_open(lfs, &mut *dir, c_path.as_ptr().cast()))?;
            let result = loop {
                let mut info: ll::lfs_info = mem::zeroed();
                match check(ll::lfs_dir_read(lfs, &mut *dir, &mut info)) {
                    Ok(0) => break Ok(()),
                    Ok(_) => {
                        let name = CStr::from_ptr(info.name.as_ptr().cast())
                            .to_string_lossy()
                            .into_owned();
                        if name == "." || name == ".." {
                            continue;
                        }
                        let kind = match info.type_ {
                            LFS_TYPE_DIR => EntryKind::Dir,
                            LFS_TYPE_REG => EntryKind::File,
                            other => {
                                log::warn!("skipping '{}' with unknown type {}", name, other);
                                continue;
                            }
                        };
                        let size = if kind == EntryKind::File { info.size } else { 0 };
                        entries.push(DirEntry { name, kind, size });
                    }
                    Err(e) => break Err(e),
                }
            };
            let closed = ll::lfs_dir_close(lfs, &mut *dir);
            result?;
            check(closed)?;
        }
        Ok(entries)
    }

    /// Recursively list every regular file, sorted by path
    pub fn walk(&mut self) -> Result<Vec<FileEntry>, LfsError> {
        let mut files = Vec::new();
        let mut pending = vec![String::new()];

        while let Some(dir) = pending.pop() {
            let lookup = if dir.is_empty() { "/" } else { dir.as_str() };
            for entry in self.read_dir(lookup)? {
                let path = if dir.is_empty() {
                    entry.name
                } else {
                    format!("{}/{}", dir, entry.name)
                };
                match entry.kind {
                    EntryKind::Dir => pending.push(path),
                    EntryKind::File => files.push(FileEntry {
                        path,
                        size: entry.size,
                    }),
                }
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    /// Number of blocks currently in use
    pub fn used_blocks(&mut self) -> Result<usize, LfsError> {
        // SAFETY: mounted filesystem.
        check(unsafe { ll::lfs_fs_size(self.lfs_ptr()) })
    }

    /// Unmount and return the backing buffer, which is the finished image
    pub fn into_image(mut self) -> Result<Vec<u8>, LfsError> {
        self.unmount()?;
        // SAFETY: unmounted, so the library no longer touches the storage.
        Ok(unsafe { self.storage.as_mut() }.take_data())
    }
}

impl Drop for LittleFs {
    fn drop(&mut self) {
        if let Err(e) = self.unmount() {
            log::warn!("failed to unmount LittleFS: {}", e);
        }
        // SAFETY: `storage` came from `Box::leak` in `with_storage` and is
        // freed exactly once, after the library is done with it.
        drop(unsafe { Box::from_raw(self.storage.as_ptr()) });
    }
}

impl std::fmt::Debug for LittleFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LittleFs")
            .field("geometry", &self.geometry)
            .field("mounted", &self.mounted)
            .finish()
    }
}

fn c_path(path: &str) -> Result<CString, LfsError> {
    CString::new(path).map_err(|_| LfsError::Invalid)
}
