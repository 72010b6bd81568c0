use clap::Parser;
use pst_image::PstImage;

mod args;

fn main() -> anyhow::Result<()> {
    args::init_logging();
    let args = args::Args::try_parse()?;
    let image = PstImage::read(&args.file)?;

    let block_btree = image.bbt();
    println!("Block Page Entries: {}", block_btree.entries().len());
    for entry in block_btree.entries() {
        println!(" Block: {:?}", entry.block());
        println!("  Location: {:?}", entry.locator());
        println!("  Ref-Count: {:?}", entry.ref_count());
    }
    println!();

    let node_btree = image.nbt();
    println!("Node Page Entries: {}", node_btree.entries().len());
    for entry in node_btree.entries() {
        println!(" Node: {:?}", entry.node());
        println!("  Data Block: {:?}", entry.data());
        match image.resolve(entry.node()) {
            Ok(locator) => println!("  Location: {locator:?}"),
            Err(err) => println!("  Location: {err}"),
        }
        println!("  Sub-Node Block: {:?}", entry.sub_node());
        println!("  Parent Node: {:?}", entry.parent());
    }

    let issues = image.issues();
    println!();
    println!("Structural Issues: {}", issues.len());
    for issue in issues {
        println!(" {issue}");
    }

    Ok(())
}
