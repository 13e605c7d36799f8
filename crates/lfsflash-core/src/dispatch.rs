//! Step selection and the build-then-flash sequence
//!
//! [`JobOptions`] carries what was given on the command line. [`Job::resolve`]
//! merges it with a [`Profile`] and the built-in defaults (command line
//! first, then profile, then default) and [`Job::run`] executes the steps.

use std::fs;
use std::path::PathBuf;

use crate::config::{Partition, Profile};
use crate::error::{Error, Result};
use crate::flasher::{
    flash_image, FlashCommand, FlashReport, FlashSettings, ProcessRunner, DEFAULT_OFFSET,
};
use crate::geometry::{Geometry, DEFAULT_BLOCK_COUNT, DEFAULT_BLOCK_SIZE};
use crate::image::{build_image_file, inspect_image, BuildProgress, BuiltImage, ImageListing};

/// Default source directory
pub const DEFAULT_SOURCE: &str = "assets";

/// Default image file
pub const DEFAULT_OUTPUT: &str = "littlefs.bin";

/// Which steps a run performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Steps {
    /// Build the image from the source tree
    pub build: bool,
    /// Flash the image
    pub flash: bool,
}

impl Steps {
    /// Map the `--create-only` / `--upload-only` flags to steps
    ///
    /// The flags are mutually exclusive at the CLI level; if both are set
    /// anyway, `create_only` wins so nothing is flashed.
    pub fn from_flags(create_only: bool, upload_only: bool) -> Self {
        match (create_only, upload_only) {
            (true, _) => Self {
                build: true,
                flash: false,
            },
            (false, true) => Self {
                build: false,
                flash: true,
            },
            (false, false) => Self {
                build: true,
                flash: true,
            },
        }
    }
}

/// Settings given on the command line; `None` means "not given"
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOptions {
    /// `--source`
    pub source: Option<PathBuf>,
    /// `--output`
    pub output: Option<PathBuf>,
    /// `--block-size`
    pub block_size: Option<u32>,
    /// `--block-count`
    pub block_count: Option<u32>,
    /// `--port`
    pub port: Option<String>,
    /// `--offset`
    pub offset: Option<u32>,
    /// `--partition`
    pub partition: Option<String>,
    /// `--create-only`
    pub create_only: bool,
    /// `--upload-only`
    pub upload_only: bool,
    /// `--list`
    pub list: bool,
}

/// A fully resolved run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Steps to perform
    pub steps: Steps,
    /// Source directory
    pub source: PathBuf,
    /// Image file
    pub output: PathBuf,
    /// Image geometry
    pub geometry: Geometry,
    /// Flashing tool invocation for `output`
    pub flash: FlashCommand,
    /// Partition the offset came from, if any
    pub partition: Option<Partition>,
    /// List the image contents after building
    pub list: bool,
}

/// What a run produced
#[derive(Debug, Default)]
pub struct JobReport {
    /// The image, if it was built
    pub built: Option<BuiltImage>,
    /// Image contents, if listing was requested
    pub listing: Option<ImageListing>,
    /// Flashing tool output, if the image was flashed
    pub flashed: Option<FlashReport>,
}

impl Job {
    /// Merge command line options with a profile and the defaults
    pub fn resolve(options: JobOptions, profile: &Profile) -> Result<Self> {
        let image = &profile.image;
        let flash = &profile.flash;

        let source = options
            .source
            .or_else(|| image.source.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SOURCE));
        let output = options
            .output
            .or_else(|| image.output.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));

        let block_size = options
            .block_size
            .or(image.block_size)
            .unwrap_or(DEFAULT_BLOCK_SIZE);
        let block_count = options
            .block_count
            .or(image.block_count)
            .unwrap_or(DEFAULT_BLOCK_COUNT);
        let mut geometry = Geometry::new(block_size, block_count);
        if let Some(v) = image.read_size {
            geometry.read_size = v;
        }
        if let Some(v) = image.prog_size {
            geometry.prog_size = v;
        }
        if let Some(v) = image.cache_size {
            geometry.cache_size = v;
        }
        if let Some(v) = image.lookahead_size {
            geometry.lookahead_size = v;
        }
        if let Some(v) = image.block_cycles {
            geometry.block_cycles = v;
        }

        let partition_name = options.partition.as_ref().or(flash.partition.as_ref());
        let partition = match partition_name {
            Some(name) => Some(profile.partitions.get(name)?.clone()),
            None => None,
        };

        let (offset, partition) = match (options.offset, partition) {
            (Some(offset), Some(p)) => {
                log::warn!(
                    "--offset 0x{:X} overrides partition '{}' at 0x{:X}",
                    offset,
                    p.name,
                    p.offset
                );
                (offset, None)
            }
            (Some(offset), None) => (offset, None),
            (None, Some(p)) => (p.offset, Some(p)),
            (None, None) => (flash.offset.unwrap_or(DEFAULT_OFFSET), None),
        };

        let defaults = FlashSettings::default();
        let settings = FlashSettings {
            tool: flash.tool.clone().unwrap_or(defaults.tool),
            chip: flash.chip.clone().unwrap_or(defaults.chip),
            baud: flash.baud.unwrap_or(defaults.baud),
            flash_mode: flash.flash_mode.clone().unwrap_or(defaults.flash_mode),
            flash_size: flash.flash_size.clone().unwrap_or(defaults.flash_size),
            flash_freq: flash.flash_freq.clone().unwrap_or(defaults.flash_freq),
        };
        let port = options.port.or_else(|| flash.port.clone());

        Ok(Self {
            steps: Steps::from_flags(options.create_only, options.upload_only),
            flash: FlashCommand::new(output.clone(), port, offset).with_settings(settings),
            source,
            output,
            geometry,
            partition,
            list: options.list,
        })
    }

    /// Run the selected steps in order, stopping at the first failure
    pub fn run(
        &self,
        runner: &dyn ProcessRunner,
        progress: &mut dyn BuildProgress,
    ) -> Result<JobReport> {
        let mut report = JobReport::default();

        if self.steps.build {
            log::info!(
                "Creating LittleFS image from {} ({} x {} bytes)",
                self.source.display(),
                self.geometry.block_count,
                self.geometry.block_size
            );
            report.built = Some(build_image_file(
                &self.source,
                &self.output,
                &self.geometry,
                progress,
            )?);
        }

        if self.list {
            report.listing = Some(inspect_image(&self.output, &self.geometry)?);
        }

        if self.steps.flash {
            self.check_fits()?;
            report.flashed = Some(flash_image(runner, &self.flash)?);
        }

        Ok(report)
    }

    fn check_fits(&self) -> Result<()> {
        let Some(partition) = &self.partition else {
            return Ok(());
        };

        let image = fs::metadata(&self.output)
            .map_err(|_| Error::MissingImage(self.output.clone()))?
            .len();
        if image > u64::from(partition.size) {
            return Err(Error::ImageTooLarge {
                image,
                partition: partition.name.clone(),
                capacity: partition.size,
            });
        }
        Ok(())
    }
}
