use clap::Parser;
use pst_image::PstImage;
use std::fs;

mod args;

fn main() -> anyhow::Result<()> {
    args::init_logging();
    let args = args::Args::try_parse()?;

    let (image, findings) = PstImage::inspect(fs::read(&args.file)?)?;
    let header = image.header();

    println!("File Version: {:?}", header.version());
    println!("File Size: 0x{:X}", header.file_size());
    println!("NBT BlockRef: {:?}", header.nbt());
    println!("BBT BlockRef: {:?}", header.bbt());
    println!("Root Folder: {:?}", header.root_folder());
    println!("Density: {}%", header.density());

    if findings.is_empty() {
        println!("Header OK");
    }
    for finding in findings {
        println!("Finding: {finding}");
    }

    Ok(())
}
