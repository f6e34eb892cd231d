mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::compile::{BatchArgs, CompileArgs};
use commands::decode::DecodeArgs;
use commands::plate::PlateCommands;

#[derive(Parser)]
#[command(name = "bitmap-toolkit")]
#[command(about = "Compile color plates into game-ready bitmap data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile one image (color plate or plain texture)
    Compile(CompileArgs),
    /// Compile every image under a directory in parallel
    CompileBatch(BatchArgs),
    /// Decode compiled bitmap data back into PNG files
    Decode(DecodeArgs),
    /// Color plate blob operations (Pack/Unpack)
    #[command(subcommand)]
    Plate(PlateCommands),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Compile(args) => commands::compile::handle(args)?,
        Commands::CompileBatch(args) => commands::compile::handle_batch(args)?,
        Commands::Decode(args) => commands::decode::handle(args)?,
        Commands::Plate(cmd) => commands::plate::handle(cmd)?,
    }

    Ok(())
}
