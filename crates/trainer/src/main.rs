use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tch::Device;

use trainer::{run_evaluation, run_training, TrainerConfig};

#[derive(Parser)]
#[command(author, version, about = "Fine-tune multilingual BERT for sentiment classification", long_about = None)]
struct Cli {
    /// Training config; defaults are used when the file does not exist
    #[arg(short, long, default_value = "configs/training_config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fine-tune and keep the checkpoint with the best validation accuracy
    Train,
    /// Score the saved checkpoint on the validation split
    Evaluate,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = TrainerConfig::load_or_default(&cli.config)?;

    let device = Device::cuda_if_available();
    log::info!("Using device: {:?}", device);

    match cli.command.unwrap_or(Commands::Train) {
        Commands::Train => {
            run_training(&config, device)?;
            log::info!("Training complete!");
        }
        Commands::Evaluate => {
            run_evaluation(&config, device)?;
        }
    }

    Ok(())
}
