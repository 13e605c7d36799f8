//! LittleFS error codes
//!
//! The C library reports failures as negative `int` codes (`enum lfs_error`
//! in `lfs.h`). They are mapped to [`LfsError`] at the FFI boundary.

use thiserror::Error;

pub(crate) const LFS_ERR_OK: i32 = 0;
pub(crate) const LFS_ERR_IO: i32 = -5;
pub(crate) const LFS_ERR_CORRUPT: i32 = -84;
pub(crate) const LFS_ERR_NOENT: i32 = -2;
pub(crate) const LFS_ERR_EXIST: i32 = -17;
pub(crate) const LFS_ERR_NOTDIR: i32 = -20;
pub(crate) const LFS_ERR_ISDIR: i32 = -21;
pub(crate) const LFS_ERR_NOTEMPTY: i32 = -39;
pub(crate) const LFS_ERR_BADF: i32 = -9;
pub(crate) const LFS_ERR_FBIG: i32 = -27;
pub(crate) const LFS_ERR_INVAL: i32 = -22;
pub(crate) const LFS_ERR_NOSPC: i32 = -28;
pub(crate) const LFS_ERR_NOMEM: i32 = -12;
pub(crate) const LFS_ERR_NOATTR: i32 = -61;
pub(crate) const LFS_ERR_NAMETOOLONG: i32 = -36;

/// Error reported by the LittleFS library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LfsError {
    /// Error during device operation
    #[error("I/O error on the block device")]
    Io,
    /// Filesystem metadata is corrupted
    #[error("filesystem is corrupted")]
    Corrupt,
    /// No such file or directory
    #[error("no such file or directory")]
    NoEntry,
    /// Entry already exists
    #[error("entry already exists")]
    Exists,
    /// Path component is not a directory
    #[error("not a directory")]
    NotDir,
    /// Entry is a directory
    #[error("is a directory")]
    IsDir,
    /// Directory is not empty
    #[error("directory not empty")]
    NotEmpty,
    /// Bad file handle
    #[error("bad file handle")]
    BadFile,
    /// File exceeds the maximum file size
    #[error("file too large")]
    FileTooBig,
    /// Invalid parameter
    #[error("invalid parameter")]
    Invalid,
    /// No space left on the filesystem
    #[error("no space left on device")]
    NoSpace,
    /// The library ran out of memory
    #[error("out of memory")]
    NoMemory,
    /// No such attribute
    #[error("no such attribute")]
    NoAttribute,
    /// File name exceeds the maximum name length
    #[error("file name too long")]
    NameTooLong,
    /// Any code not listed in `lfs.h`
    #[error("unknown LittleFS error {0}")]
    Other(i32),
}

impl LfsError {
    /// Map a negative library return code to an error
    pub fn from_code(code: i32) -> Self {
        match code {
            LFS_ERR_IO => Self::Io,
            LFS_ERR_CORRUPT => Self::Corrupt,
            LFS_ERR_NOENT => Self::NoEntry,
            LFS_ERR_EXIST => Self::Exists,
            LFS_ERR_NOTDIR => Self::NotDir,
            LFS_ERR_ISDIR => Self::IsDir,
            LFS_ERR_NOTEMPTY => Self::NotEmpty,
            LFS_ERR_BADF => Self::BadFile,
            LFS_ERR_FBIG => Self::FileTooBig,
            LFS_ERR_INVAL => Self::Invalid,
            LFS_ERR_NOSPC => Self::NoSpace,
            LFS_ERR_NOMEM => Self::NoMemory,
            LFS_ERR_NOATTR => Self::NoAttribute,
            LFS_ERR_NAMETOOLONG => Self::NameTooLong,
            other => Self::Other(other),
        }
    }

    /// The library return code for this error
    pub fn code(&self) -> i32 {
        match self {
            Self::Io => LFS_ERR_IO,
            Self::Corrupt => LFS_ERR_CORRUPT,
            Self::NoEntry => LFS_ERR_NOENT,
            Self::Exists => LFS_ERR_EXIST,
            Self::NotDir => LFS_ERR_NOTDIR,
            Self::IsDir => LFS_ERR_ISDIR,
            Self::NotEmpty => LFS_ERR_NOTEMPTY,
            Self::BadFile => LFS_ERR_BADF,
            Self::FileTooBig => LFS_ERR_FBIG,
            Self::Invalid => LFS_ERR_INVAL,
            Self::NoSpace => LFS_ERR_NOSPC,
            Self::NoMemory => LFS_ERR_NOMEM,
            Self::NoAttribute => LFS_ERR_NOATTR,
            Self::NameTooLong => LFS_ERR_NAMETOOLONG,
            Self::Other(code) => *code,
        }
    }
}

/// Turn a library return value into a result
///
/// Non-negative values are byte counts or entry flags and are passed through.
pub(crate) fn check(ret: i32) -> Result<usize, LfsError> {
    if ret >= LFS_ERR_OK {
        Ok(ret as usize)
    } else {
        Err(LfsError::from_code(ret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_mapping_is_symmetric() {
        for code in [-5, -84, -2, -17, -20, -21, -39, -9, -27, -22, -28, -12, -61, -36] {
            assert_eq!(LfsError::from_code(code).code(), code);
        }
        assert_eq!(LfsError::from_code(-1000), LfsError::Other(-1000));
    }

    #[test]
    fn test_check() {
        assert_eq!(check(0), Ok(0));
        assert_eq!(check(42), Ok(42));
        assert_eq!(check(-28), Err(LfsError::NoSpace));
    }
}
