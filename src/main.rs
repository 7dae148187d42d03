use anyhow::Result;
use clap::Parser;
use colored::*;

use page_snap::{CloneCommand, PageCloner};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CloneCommand::parse();
    let config = args.into_config();

    let cloner = PageCloner::new(config)?;
    cloner.run().await?;

    println!("{}", "✅ Page snapshot completed successfully!".green());
    Ok(())
}
