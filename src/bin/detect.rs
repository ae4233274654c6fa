use clap::Parser;

use safetext::cli::{self, DetectArgs};

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    cli::run(DetectArgs::parse())
}
