//! LittleFS image building
//!
//! The builder copies every regular file under a source directory into a
//! freshly formatted [`LittleFs`] and then dumps the whole backing buffer.
//! The output file is written only once the image is complete in memory,
//! so a failed build never leaves a partial image behind.

mod walk;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::lfs::{FileEntry, LfsError, LittleFs};

pub use walk::{collect_files, image_path, SourceFile};

/// Errors raised while building or reading an image
#[derive(Debug, Error)]
pub enum ImageError {
    /// The geometry cannot be used by LittleFS
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// A LittleFS operation failed
    #[error("LittleFS {op} failed for '{path}'")]
    Lfs {
        /// Operation that failed
        op: &'static str,
        /// Path inside the image
        path: String,
        /// Library error
        #[source]
        source: LfsError,
    },

    /// Reading a source file failed
    #[error("failed to read '{}'", path.display())]
    Read {
        /// Host path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Writing the image file failed
    #[error("failed to write image '{}'", path.display())]
    Write {
        /// Output path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Removing a stale image file failed
    #[error("failed to remove stale image '{}'", path.display())]
    RemoveStale {
        /// Output path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Walking the source directory failed
    #[error("failed to walk source directory")]
    Walk(#[from] walkdir::Error),

    /// A source path is not valid UTF-8 and cannot be stored in the image
    #[error("path '{}' is not valid UTF-8", .0.display())]
    NonUtf8Path(PathBuf),

    /// A walked path does not lie under the source root
    #[error("path '{}' is not inside the source directory", .0.display())]
    OutsideSource(PathBuf),

    /// An existing image does not match the geometry
    #[error("image '{}' is {actual} bytes, expected {expected} for this geometry", path.display())]
    SizeMismatch {
        /// Image path
        path: PathBuf,
        /// Size found on disk
        actual: u64,
        /// `block_size * block_count`
        expected: u64,
    },
}

impl ImageError {
    fn lfs<'a>(op: &'static str, path: &'a str) -> impl FnOnce(LfsError) -> Self + 'a {
        move |source| Self::Lfs {
            op,
            path: path.to_string(),
            source,
        }
    }
}

/// A finished image held in memory
#[derive(Debug, Clone)]
pub struct BuiltImage {
    /// Raw image bytes, exactly `block_size * block_count` long
    pub data: Vec<u8>,
    /// Files stored in the image, sorted by image path
    pub files: Vec<SourceFile>,
    /// Blocks in use after the last file was written
    pub used_blocks: usize,
    /// Geometry of the image
    pub geometry: Geometry,
}

impl BuiltImage {
    /// Total payload bytes stored in the image
    pub fn payload_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Write the full image buffer to `path`
    pub fn write_to(&self, path: &Path) -> std::result::Result<(), ImageError> {
        fs::write(path, &self.data).map_err(|source| ImageError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Progress reporting for image builds
pub trait BuildProgress {
    /// Called once the source tree has been walked
    fn started(&mut self, total_files: usize, total_bytes: u64);

    /// Called before a file is added to the image
    fn adding(&mut self, file: &SourceFile);

    /// Called when the image is complete in memory
    fn finished(&mut self, image: &BuiltImage);
}

/// A no-op progress reporter
pub struct NoProgress;

impl BuildProgress for NoProgress {
    fn started(&mut self, _total_files: usize, _total_bytes: u64) {}
    fn adding(&mut self, _file: &SourceFile) {}
    fn finished(&mut self, _image: &BuiltImage) {}
}

/// Builds a LittleFS image from a directory tree
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    source: PathBuf,
    geometry: Geometry,
}

impl ImageBuilder {
    /// Create a builder for `source` with the given geometry
    pub fn new(source: impl Into<PathBuf>, geometry: Geometry) -> Self {
        Self {
            source: source.into(),
            geometry,
        }
    }

    /// Source directory
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Assemble the image in memory
    pub fn build(&self, progress: &mut dyn BuildProgress) -> Result<BuiltImage> {
        if !self.source.is_dir() {
            return Err(Error::MissingSource(self.source.clone()));
        }
        self.geometry.validate()?;

        let files = collect_files(&self.source)?;
        let total_bytes = files.iter().map(|f| f.size).sum();
        log::debug!(
            "found {} files ({} bytes) under {}",
            files.len(),
            total_bytes,
            self.source.display()
        );
        progress.started(files.len(), total_bytes);

        let mut lfs = LittleFs::format(&self.geometry).map_err(ImageError::lfs("format", "/"))?;

        for file in &files {
            progress.adding(file);
            log::debug!("adding {}", file.image_path);

            let data = fs::read(&file.host_path).map_err(|source| ImageError::Read {
                path: file.host_path.clone(),
                source,
            })?;

            if let Some(parent) = file.image_parent() {
                lfs.create_dir_all(parent)
                    .map_err(ImageError::lfs("mkdir", parent))?;
            }
            lfs.write_file(&file.image_path, &data)
                .map_err(ImageError::lfs("write", &file.image_path))?;
        }

        let used_blocks = lfs.used_blocks().map_err(ImageError::lfs("stat", "/"))?;
        let data = lfs.into_image().map_err(ImageError::lfs("unmount", "/"))?;

        let image = BuiltImage {
            data,
            files,
            used_blocks,
            geometry: self.geometry,
        };
        progress.finished(&image);
        Ok(image)
    }
}

/// Build an image from `source` and write it to `output`
///
/// A file already at `output` is removed first, so a failed build leaves
/// no image behind and a successful one only reflects the current tree.
pub fn build_image_file(
    source: impl AsRef<Path>,
    output: impl AsRef<Path>,
    geometry: &Geometry,
    progress: &mut dyn BuildProgress,
) -> Result<BuiltImage> {
    let source = source.as_ref();
    let output = output.as_ref();

    if !source.is_dir() {
        return Err(Error::MissingSource(source.to_path_buf()));
    }
    remove_stale(output)?;

    let image = ImageBuilder::new(source, *geometry).build(progress)?;
    image.write_to(output)?;
    log::info!(
        "wrote {} ({} bytes, {} files)",
        output.display(),
        image.data.len(),
        image.files.len()
    );
    Ok(image)
}

fn remove_stale(output: &Path) -> std::result::Result<(), ImageError> {
    match fs::remove_file(output) {
        Ok(()) => {
            log::debug!("removed stale image {}", output.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ImageError::RemoveStale {
            path: output.to_path_buf(),
            source,
        }),
    }
}

/// Summary of an image re-opened from disk
#[derive(Debug, Clone)]
pub struct ImageListing {
    /// Regular files, sorted by path
    pub files: Vec<FileEntry>,
    /// Blocks in use
    pub used_blocks: usize,
    /// Geometry used to mount the image
    pub geometry: Geometry,
}

impl ImageListing {
    /// Bytes in use
    pub fn used_bytes(&self) -> u64 {
        self.used_blocks as u64 * self.geometry.block_size as u64
    }

    /// Total capacity in bytes
    pub fn total_bytes(&self) -> u64 {
        self.geometry.image_size() as u64
    }
}

/// Mount an in-memory image and list its files
pub fn list_image(data: Vec<u8>, geometry: &Geometry) -> std::result::Result<ImageListing, ImageError> {
    geometry.validate()?;
    let mut lfs = LittleFs::mount(geometry, data).map_err(ImageError::lfs("mount", "/"))?;
    let files = lfs.walk().map_err(ImageError::lfs("list", "/"))?;
    let used_blocks = lfs.used_blocks().map_err(ImageError::lfs("stat", "/"))?;
    Ok(ImageListing {
        files,
        used_blocks,
        geometry: *geometry,
    })
}

/// Read an image file from disk and list its files
pub fn inspect_image(path: impl AsRef<Path>, geometry: &Geometry) -> Result<ImageListing> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::MissingImage(path.to_path_buf()));
    }
    geometry.validate()?;

    let data = fs::read(path).map_err(|source| ImageError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if data.len() != geometry.image_size() {
        return Err(ImageError::SizeMismatch {
            path: path.to_path_buf(),
            actual: data.len() as u64,
            expected: geometry.image_size() as u64,
        }
        .into());
    }
    Ok(list_image(data, geometry)?)
}
