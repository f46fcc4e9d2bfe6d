use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;

use tracing::info;

use deltapack::progress::ProgressFn;
use deltapack::{apply_delta, build_delta};

#[derive(Parser)]
#[command(name = "deltapack", about = "Delta package builder and applier for release archives")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a delta package from a base and a newer full package
    Build {
        /// Path to the base (older) package archive
        #[arg(long)]
        base: PathBuf,
        /// Path to the new (updated) package archive
        #[arg(long)]
        new: PathBuf,
        /// Output path for the delta package
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Reconstruct a full package by applying a delta onto a base
    Apply {
        /// Path to the base (older) package archive
        #[arg(long)]
        base: PathBuf,
        /// Path to the delta package
        #[arg(long)]
        delta: PathBuf,
        /// Output path for the reconstructed package
        #[arg(long, short)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { base, new, output } => {
            println!("Building delta package...");
            println!("  Base: {}", base.display());
            println!("  New: {}", new.display());
            println!("  Output: {}", output.display());

            let start = Instant::now();
            let stats = build_delta(&base, &new, &output).await?;
            let elapsed = start.elapsed();

            println!("\nDelta package created successfully!");
            println!("  Files processed: {}", stats.processed);
            println!("  Files added: {}", stats.added);
            println!("  Files changed: {}", stats.changed);
            println!("  Files unchanged: {}", stats.unchanged);
            println!("  Files removed: {}", stats.removed);
            println!("  Warnings: {}", stats.warnings);
            println!("  Time elapsed: {:.3}s", elapsed.as_secs_f64());
        }
        Commands::Apply {
            base,
            delta,
            output,
        } => {
            println!("Applying delta package...");
            println!("  Base: {}", base.display());
            println!("  Delta: {}", delta.display());
            println!("  Output: {}", output.display());

            let progress: ProgressFn = Box::new(|percent| info!("apply progress: {percent}%"));

            let start = Instant::now();
            let summary = apply_delta(&base, &delta, &output, Some(progress)).await?;
            let elapsed = start.elapsed();

            println!("\nDelta package applied successfully!");
            println!("  Files patched: {}", summary.files_patched);
            println!("  Files copied: {}", summary.files_copied);
            println!("  Files unchanged: {}", summary.files_unchanged);
            println!("  Files deleted: {}", summary.files_deleted);
            println!("  Metadata files: {}", summary.metadata_copied);
            println!("  Time elapsed: {:.3}s", elapsed.as_secs_f64());
        }
    }

    Ok(())
}
