//! Profile files
//!
//! A profile is an optional TOML file describing the image geometry, the
//! flashing tool parameters and the target's partition table:
//!
//! ```toml
//! [image]
//! source = "assets"
//! output = "littlefs.bin"
//! block_size = 4096
//! block_count = 128
//!
//! [flash]
//! chip = "esp32s3"
//! baud = 921600
//! port = "/dev/ttyUSB0"
//! partition = "lfs"
//!
//! [[partition]]
//! name = "factory"
//! offset = 0x10000
//! size = "1 MiB"
//!
//! [[partition]]
//! name = "lfs"
//! offset = 0x110000
//! size = "512 KiB"
//! ```
//!
//! Every field is optional. Numbers may be integers or strings in hex
//! (`0x...`) or decimal; sizes also accept `B`, `KB`/`KiB` and `MB`/`MiB`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Errors from loading a profile
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The profile file could not be read
    #[error("failed to read profile '{}'", path.display())]
    Io {
        /// Profile path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The profile is not valid TOML or has wrong field types
    #[error("failed to parse profile")]
    Parse(#[from] toml::de::Error),

    /// `--partition` or `flash.partition` names an unknown partition
    #[error("partition '{0}' not found in the partition table")]
    PartitionNotFound(String),

    /// Two partitions share address space
    #[error("partitions '{first}' and '{second}' overlap")]
    OverlappingPartitions {
        /// First partition
        first: String,
        /// Second partition
        second: String,
    },

    /// Two partitions have the same name
    #[error("duplicate partition name '{0}'")]
    DuplicatePartition(String),

    /// A partition is empty or runs past the 32-bit address space
    #[error("partition '{0}' has an invalid size")]
    InvalidPartition(String),
}

/// `[image]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageSection {
    /// Directory to package
    pub source: Option<PathBuf>,
    /// Image file to write
    pub output: Option<PathBuf>,
    /// Erase block size in bytes
    #[serde(deserialize_with = "deserialize_opt_size")]
    pub block_size: Option<u32>,
    /// Number of blocks
    #[serde(deserialize_with = "deserialize_opt_number")]
    pub block_count: Option<u32>,
    /// Minimum read size
    #[serde(deserialize_with = "deserialize_opt_size")]
    pub read_size: Option<u32>,
    /// Minimum program size
    #[serde(deserialize_with = "deserialize_opt_size")]
    pub prog_size: Option<u32>,
    /// Cache size
    #[serde(deserialize_with = "deserialize_opt_size")]
    pub cache_size: Option<u32>,
    /// Lookahead buffer size
    #[serde(deserialize_with = "deserialize_opt_size")]
    pub lookahead_size: Option<u32>,
    /// Erase cycles before relocation, -1 disables wear levelling
    pub block_cycles: Option<i32>,
}

/// `[flash]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlashSection {
    /// Flashing program
    pub tool: Option<String>,
    /// Target chip
    pub chip: Option<String>,
    /// Serial baud rate
    #[serde(deserialize_with = "deserialize_opt_number")]
    pub baud: Option<u32>,
    /// SPI flash mode
    pub flash_mode: Option<String>,
    /// Flash size as understood by the tool
    pub flash_size: Option<String>,
    /// SPI flash frequency
    pub flash_freq: Option<String>,
    /// Serial port
    pub port: Option<String>,
    /// Flash offset of the image
    #[serde(deserialize_with = "deserialize_opt_number")]
    pub offset: Option<u32>,
    /// Partition to flash to, looked up in the partition table
    pub partition: Option<String>,
}

/// A named flash partition
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Partition {
    /// Partition name (matched case-insensitively)
    pub name: String,
    /// Start offset in flash
    #[serde(deserialize_with = "deserialize_number")]
    pub offset: u32,
    /// Size in bytes
    #[serde(deserialize_with = "deserialize_size")]
    pub size: u32,
}

impl Partition {
    /// Create a partition
    pub fn new(name: impl Into<String>, offset: u32, size: u32) -> Self {
        Self {
            name: name.into(),
            offset,
            size,
        }
    }

    /// Exclusive end offset
    pub fn end(&self) -> u64 {
        u64::from(self.offset) + u64::from(self.size)
    }

    /// Check if this partition shares any byte with another
    pub fn overlaps(&self, other: &Partition) -> bool {
        u64::from(self.offset) < other.end() && u64::from(other.offset) < self.end()
    }
}

/// The target's partition table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionTable {
    partitions: Vec<Partition>,
}

impl PartitionTable {
    /// Create a table from a list of partitions, without validating it
    pub fn new(partitions: Vec<Partition>) -> Self {
        Self { partitions }
    }

    /// Find a partition by name (case-insensitive)
    pub fn find(&self, name: &str) -> Option<&Partition> {
        self.partitions
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Look up a partition, failing if it does not exist
    pub fn get(&self, name: &str) -> Result<&Partition, ConfigError> {
        self.find(name)
            .ok_or_else(|| ConfigError::PartitionNotFound(name.to_string()))
    }

    /// All partitions in file order
    pub fn iter(&self) -> impl Iterator<Item = &Partition> {
        self.partitions.iter()
    }

    /// Number of partitions
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Reject empty, out-of-range, overlapping or duplicate partitions
    pub fn validate(&self) -> Result<(), ConfigError> {
        for p in &self.partitions {
            if p.size == 0 || p.end() > u64::from(u32::MAX) + 1 {
                return Err(ConfigError::InvalidPartition(p.name.clone()));
            }
        }

        for (i, p1) in self.partitions.iter().enumerate() {
            for p2 in self.partitions.iter().skip(i + 1) {
                if p1.name.eq_ignore_ascii_case(&p2.name) {
                    return Err(ConfigError::DuplicatePartition(p2.name.clone()));
                }
                if p1.overlaps(p2) {
                    return Err(ConfigError::OverlappingPartitions {
                        first: p1.name.clone(),
                        second: p2.name.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// A loaded profile
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    /// Image settings
    pub image: ImageSection,
    /// Flashing tool settings
    pub flash: FlashSection,
    /// Partition table
    pub partitions: PartitionTable,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfileFile {
    #[serde(default)]
    image: ImageSection,
    #[serde(default)]
    flash: FlashSection,
    #[serde(default)]
    partition: Vec<Partition>,
}

impl Profile {
    /// Load a profile from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("loaded profile {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Parse a profile from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ProfileFile = toml::from_str(content)?;

        let partitions = PartitionTable::new(file.partition);
        partitions.validate()?;

        if let Some(name) = &file.flash.partition {
            partitions.get(name)?;
        }

        Ok(Self {
            image: file.image,
            flash: file.flash,
            partitions,
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HexOrInt {
    Int(u32),
    Str(String),
}

fn deserialize_number<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match HexOrInt::deserialize(deserializer)? {
        HexOrInt::Int(n) => Ok(n),
        HexOrInt::Str(s) => parse_number(&s).map_err(serde::de::Error::custom),
    }
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match HexOrInt::deserialize(deserializer)? {
        HexOrInt::Int(n) => Ok(n),
        HexOrInt::Str(s) => parse_size(&s).map_err(serde::de::Error::custom),
    }
}

fn deserialize_opt_number<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize_number(deserializer).map(Some)
}

fn deserialize_opt_size<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize_size(deserializer).map(Some)
}

/// Parse a number that can be hex (0x...) or decimal
pub fn parse_number(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("invalid hex: {}", e))
    } else {
        s.parse().map_err(|e| format!("invalid number: {}", e))
    }
}

/// Parse a size string like "512 KiB", "0x80000" or "4096"
pub fn parse_size(s: &str) -> Result<u32, String> {
    let s = s.trim();

    if let Ok(n) = parse_number(s) {
        return Ok(n);
    }

    let s_lower = s.to_lowercase();
    let (num_str, multiplier) = if let Some(n) = s_lower.strip_suffix("mib") {
        (n.trim(), 1024 * 1024)
    } else if let Some(n) = s_lower.strip_suffix("mb") {
        (n.trim(), 1024 * 1024)
    } else if let Some(n) = s_lower.strip_suffix("kib") {
        (n.trim(), 1024)
    } else if let Some(n) = s_lower.strip_suffix("kb") {
        (n.trim(), 1024)
    } else if let Some(n) = s_lower.strip_suffix('b') {
        (n.trim(), 1)
    } else {
        return Err(format!("invalid size: {}", s));
    };

    let num: u32 = num_str.parse().map_err(|_| format!("invalid size: {}", s))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size too large: {}", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        [image]
        source = "web"
        output = "out/fs.bin"
        block_size = "4 KiB"
        block_count = 256
        lookahead_size = 16
        block_cycles = 500

        [flash]
        tool = "esptool"
        chip = "esp32"
        baud = "115200"
        port = "/dev/ttyACM0"
        partition = "LFS"

        [[partition]]
        name = "factory"
        offset = 0x10000
        size = "1 MiB"

        [[partition]]
        name = "lfs"
        offset = "0x110000"
        size = "0x100000"
    "#;

    #[test]
    fn test_parse_full_profile() {
        let profile = Profile::from_toml_str(FULL).unwrap();

        assert_eq!(profile.image.source, Some(PathBuf::from("web")));
        assert_eq!(profile.image.output, Some(PathBuf::from("out/fs.bin")));
        assert_eq!(profile.image.block_size, Some(4096));
        assert_eq!(profile.image.block_count, Some(256));
        assert_eq!(profile.image.lookahead_size, Some(16));
        assert_eq!(profile.image.block_cycles, Some(500));
        assert_eq!(profile.image.read_size, None);

        assert_eq!(profile.flash.tool.as_deref(), Some("esptool"));
        assert_eq!(profile.flash.baud, Some(115_200));
        assert_eq!(profile.flash.offset, None);

        assert_eq!(profile.partitions.len(), 2);
        let lfs = profile.partitions.find("lfs").unwrap();
        assert_eq!(lfs.offset, 0x110000);
        assert_eq!(lfs.size, 0x100000);
    }

    #[test]
    fn test_empty_profile() {
        let profile = Profile::from_toml_str("").unwrap();
        assert_eq!(profile, Profile::default());
        assert!(profile.partitions.is_empty());
    }

    #[test]
    fn test_find_is_case_insensitive() {
        let table = PartitionTable::new(vec![Partition::new("Storage", 0x200000, 0x10000)]);
        assert!(table.find("storage").is_some());
        assert!(table.find("STORAGE").is_some());
        assert!(matches!(
            table.get("spiffs"),
            Err(ConfigError::PartitionNotFound(name)) if name == "spiffs"
        ));
    }

    #[test]
    fn test_overlapping_partitions_rejected() {
        let table = PartitionTable::new(vec![
            Partition::new("app", 0x10000, 0x100000),
            Partition::new("lfs", 0x100000, 0x80000),
        ]);
        assert!(matches!(
            table.validate(),
            Err(ConfigError::OverlappingPartitions { .. })
        ));

        let adjacent = PartitionTable::new(vec![
            Partition::new("app", 0x10000, 0x100000),
            Partition::new("lfs", 0x110000, 0x80000),
        ]);
        assert!(adjacent.validate().is_ok());
    }

    #[test]
    fn test_duplicate_and_empty_partitions_rejected() {
        let table = PartitionTable::new(vec![
            Partition::new("lfs", 0x100000, 0x1000),
            Partition::new("LFS", 0x200000, 0x1000),
        ]);
        assert!(matches!(
            table.validate(),
            Err(ConfigError::DuplicatePartition(_))
        ));

        let table = PartitionTable::new(vec![Partition::new("lfs", 0x100000, 0)]);
        assert!(matches!(
            table.validate(),
            Err(ConfigError::InvalidPartition(_))
        ));
    }

    #[test]
    fn test_unknown_flash_partition_rejected() {
        let err = Profile::from_toml_str("[flash]\npartition = \"nope\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::PartitionNotFound(_)));
    }

    #[test]
    fn test_bad_values_rejected() {
        assert!(matches!(
            Profile::from_toml_str("[image]\nblock_size = \"lots\"\n"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            Profile::from_toml_str("[image]\nblok_size = 4096\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Profile::from_toml_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("0x110000"), Ok(0x110000));
        assert_eq!(parse_number("0X10"), Ok(16));
        assert_eq!(parse_number(" 4096 "), Ok(4096));
        assert!(parse_number("0xZZ").is_err());
        assert!(parse_number("-1").is_err());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("512 KiB"), Ok(512 * 1024));
        assert_eq!(parse_size("4MB"), Ok(4 * 1024 * 1024));
        assert_eq!(parse_size("4kb"), Ok(4096));
        assert_eq!(parse_size("100 B"), Ok(100));
        assert_eq!(parse_size("0x1000"), Ok(4096));
        assert!(parse_size("8192 MiB").is_err());
        assert!(parse_size("12 parsecs").is_err());
    }
}
