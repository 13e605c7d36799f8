//! CLI command implementation
//!
//! Resolves the command line and profile into a [`Job`], runs it with the
//! terminal progress display and prints what it produced.

mod list;
mod progress;

use crate::cli::Cli;
use lfsflash_core::config::Profile;
use lfsflash_core::dispatch::{Job, JobOptions};
use lfsflash_core::flasher::SystemRunner;
use lfsflash_core::Result;

pub use list::print_listing;
pub use progress::{BuildBar, SpinnerRunner};

/// Convert parsed arguments into job options
pub fn job_options(cli: &Cli) -> JobOptions {
    JobOptions {
        source: cli.source.clone(),
        output: cli.output.clone(),
        block_size: cli.block_size,
        block_count: cli.block_count,
        port: cli.port.clone(),
        offset: cli.offset,
        partition: cli.partition.clone(),
        create_only: cli.create_only,
        upload_only: cli.upload_only,
        list: cli.list,
    }
}

/// Load the profile named by `--config`, or an empty one
pub fn load_profile(cli: &Cli) -> Result<Profile> {
    match &cli.config {
        Some(path) => Ok(Profile::from_toml_file(path)?),
        None => Ok(Profile::default()),
    }
}

/// Run the build and/or flash steps selected on the command line
pub fn run(cli: &Cli) -> Result<()> {
    let profile = load_profile(cli)?;
    let job = Job::resolve(job_options(cli), &profile)?;
    log::debug!("resolved job: {:?}", job);

    let system = SystemRunner;
    let runner = SpinnerRunner::new(&system);
    let mut progress = BuildBar::new();

    let report = job.run(&runner, &mut progress)?;

    if let Some(built) = &report.built {
        println!("Created {}", job.output.display());
        for file in &built.files {
            log::debug!("  {} ({} bytes)", file.image_path, file.size);
        }
    }

    if let Some(listing) = &report.listing {
        print_listing(&job.output, listing);
    }

    if let Some(flashed) = &report.flashed {
        if !flashed.stdout.trim().is_empty() {
            println!("{}", flashed.stdout.trim_end());
        }
        println!(
            "Uploaded {} to offset 0x{:X}",
            job.output.display(),
            job.flash.offset
        );
    }

    Ok(())
}
