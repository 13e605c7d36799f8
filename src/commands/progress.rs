//! Terminal progress display

use indicatif::{ProgressBar, ProgressStyle};
use lfsflash_core::flasher::{FlashError, ProcessRunner, ToolOutput};
use lfsflash_core::geometry::format_size;
use lfsflash_core::image::{BuildProgress, BuiltImage, SourceFile};
use std::time::Duration;

/// Progress bar over the bytes copied into the image
#[derive(Default)]
pub struct BuildBar {
    bar: Option<ProgressBar>,
    pending: u64,
}

impl BuildBar {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BuildProgress for BuildBar {
    fn started(&mut self, total_files: usize, total_bytes: u64) {
        println!("Packaging {} files ({})", total_files, format_size(total_bytes));

        let pb = ProgressBar::new(total_bytes);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        self.bar = Some(pb);
    }

    fn adding(&mut self, file: &SourceFile) {
        if let Some(pb) = &self.bar {
            pb.inc(self.pending);
            pb.set_message(file.image_path.clone());
        }
        self.pending = file.size;
    }

    fn finished(&mut self, image: &BuiltImage) {
        if let Some(pb) = self.bar.take() {
            pb.inc(self.pending);
            pb.finish_with_message("done");
        }
        self.pending = 0;

        println!(
            "Image: {} files, {} of payload, {} ({} of {} blocks used)",
            image.files.len(),
            format_size(image.payload_bytes()),
            format_size(image.data.len() as u64),
            image.used_blocks,
            image.geometry.block_count
        );
    }
}

/// Wraps a runner with a spinner while the child process runs
pub struct SpinnerRunner<'a> {
    inner: &'a dyn ProcessRunner,
}

impl<'a> SpinnerRunner<'a> {
    pub fn new(inner: &'a dyn ProcessRunner) -> Self {
        Self { inner }
    }
}

impl ProcessRunner for SpinnerRunner<'_> {
    fn run(&self, program: &str, args: &[String]) -> Result<ToolOutput, FlashError> {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("Flashing with {}...", program));
        pb.enable_steady_tick(Duration::from_millis(100));

        let result = self.inner.run(program, args);
        match &result {
            Ok(output) if output.success() => pb.finish_with_message("Flash complete"),
            _ => pb.abandon_with_message("Flash failed"),
        }
        result
    }
}
