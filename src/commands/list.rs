//! Image listing output

use lfsflash_core::geometry::format_size;
use lfsflash_core::image::ImageListing;
use std::path::Path;

/// Print the files in an image and its usage
pub fn print_listing(path: &Path, listing: &ImageListing) {
    let geometry = &listing.geometry;

    println!("Image Contents");
    println!("==============");
    println!("File:     {}", path.display());
    println!(
        "Geometry: {} blocks x {} bytes ({})",
        geometry.block_count,
        geometry.block_size,
        format_size(listing.total_bytes())
    );
    println!(
        "Used:     {} blocks ({})",
        listing.used_blocks,
        format_size(listing.used_bytes())
    );

    println!("\nFiles ({}):", listing.files.len());
    println!("{:>10}  {}", "Size", "Path");
    println!("{:-<50}", "");

    for file in &listing.files {
        println!("{:>10}  /{}", file.size, file.path);
    }
}
