//! Source tree traversal
//!
//! Collects the regular files under a source directory together with the
//! path each one gets inside the image.

use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use super::ImageError;

/// A regular file to be copied into the image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Location on the host
    pub host_path: PathBuf,
    /// Location inside the image, relative to its root, `/`-separated
    pub image_path: String,
    /// Size on disk at the time of the walk
    pub size: u64,
}

impl SourceFile {
    /// Parent directory inside the image, if the file is not at the root
    pub fn image_parent(&self) -> Option<&str> {
        self.image_path.rsplit_once('/').map(|(parent, _)| parent)
    }
}

/// Build the image path of `file` relative to `root`
///
/// Components are joined with `/` whatever the host separator is.
pub fn image_path(root: &Path, file: &Path) -> Result<String, ImageError> {
    let relative = file
        .strip_prefix(root)
        .map_err(|_| ImageError::OutsideSource(file.to_path_buf()))?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(name) => parts.push(
                name.to_str()
                    .ok_or_else(|| ImageError::NonUtf8Path(file.to_path_buf()))?,
            ),
            Component::CurDir => {}
            _ => return Err(ImageError::OutsideSource(file.to_path_buf())),
        }
    }

    if parts.is_empty() {
        return Err(ImageError::OutsideSource(file.to_path_buf()));
    }
    Ok(parts.join("/"))
}

/// Collect every regular file under `root`, sorted by image path
///
/// Symbolic links are not followed and are not payload; directories only
/// matter through the files they contain.
pub fn collect_files(root: &Path) -> Result<Vec<SourceFile>, ImageError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            log::debug!("skipping symlink {}", entry.path().display());
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        let size = entry.metadata()?.len();
        files.push(SourceFile {
            image_path: image_path(root, entry.path())?,
            host_path: entry.into_path(),
            size,
        });
    }

    files.sort_by(|a, b| a.image_path.cmp(&b.image_path));
    Ok(files)
}
