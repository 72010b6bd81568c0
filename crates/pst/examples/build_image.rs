use clap::Parser;
use pst_image::{
    ndb::node_id::NID_INBOX, ImageOptions, MessageContent, NdbVersion, PstImage, PstImageBuilder,
};

mod args;

#[derive(Parser)]
#[command(version, about = "Build a sample image with generated messages")]
struct BuildArgs {
    /// Output path
    file: String,
    /// Number of messages to file in the Inbox
    #[arg(short, long, default_value_t = 10)]
    messages: usize,
    /// Write the 32-bit ANSI layout instead of Unicode
    #[arg(long)]
    ansi: bool,
    /// Display name of the message store
    #[arg(long, default_value = "Personal Folders")]
    store_name: String,
}

fn main() -> anyhow::Result<()> {
    args::init_logging();
    let args = BuildArgs::try_parse()?;

    let mut builder = PstImageBuilder::new(ImageOptions {
        version: if args.ansi {
            NdbVersion::Ansi
        } else {
            NdbVersion::Unicode
        },
        store_name: args.store_name,
        max_messages: args.messages,
        ..Default::default()
    });
    builder.create_system_nodes()?;

    let mut source = (0..args.messages).map(|index| {
        MessageContent::new(
            format!("Message {index}"),
            format!("sender{index}@example.com"),
            format!("Body of message {index}"),
        )
    });
    let added = builder.add_messages(NID_INBOX, &mut source)?;
    builder.write_to(&args.file)?;

    let image = PstImage::read(&args.file)?;
    println!("Wrote {} messages to {}", added.len(), args.file);
    println!("File Size: 0x{:X}", image.header().file_size());
    println!("Nodes: {}", image.nbt().entries().len());
    println!("Blocks: {}", image.bbt().entries().len());

    Ok(())
}
