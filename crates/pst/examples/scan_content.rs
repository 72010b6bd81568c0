use clap::Parser;
use pst_image::scan::{text_at, ContentLocator, SignatureScan, StrideScan};
use std::fs;

mod args;

const PREVIEW_LEN: usize = 64;

fn main() -> anyhow::Result<()> {
    args::init_logging();
    let args = args::Args::try_parse()?;
    let data = fs::read(&args.file)?;

    let signatures = SignatureScan::default();
    let matches: Vec<_> = signatures.matches(&data).collect();
    println!("Signature Matches: {}", matches.len());
    for (offset, signature) in matches.iter() {
        println!(" 0x{offset:08X}: {signature:?}");
    }

    let locator: Box<dyn ContentLocator> = if matches.is_empty() {
        Box::new(StrideScan::default())
    } else {
        Box::new(signatures)
    };

    println!();
    for offset in locator.locate(&data).take(20) {
        let len = PREVIEW_LEN.min(data.len().saturating_sub(offset as usize));
        let text = text_at(&data, offset, len)?;
        let preview: String = text
            .chars()
            .map(|ch| if ch.is_control() { '.' } else { ch })
            .collect();
        println!("0x{offset:08X}: {preview}");
    }

    Ok(())
}
