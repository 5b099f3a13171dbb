// Line-follower control CLI
// Trains or replays the Q-learning policy against the simulator

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use linefollow_agent::QLearningConfig;
use linefollow_client::{RunMode, StopToken, Trainer, TrainerConfig};

#[derive(Parser)]
#[command(name = "linefollow")]
#[command(about = "Q-learning line-follower client", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the policy against the simulator
    Train {
        /// Simulator host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Simulator port
        #[arg(long, default_value = "50002")]
        port: u16,

        /// Snapshot file path
        #[arg(long, default_value = "q_table.json")]
        snapshot: PathBuf,

        /// Learning rate (alpha)
        #[arg(long, default_value = "0.1")]
        learning_rate: f64,

        /// Discount factor (gamma)
        #[arg(long, default_value = "0.9")]
        discount: f64,

        /// Starting exploration rate (epsilon)
        #[arg(long, default_value = "0.2")]
        epsilon: f64,

        /// Per-tick exploration decay factor (1.0 disables decay)
        #[arg(long, default_value = "1.0")]
        epsilon_decay: f64,

        /// Floor for the decayed exploration rate
        #[arg(long, default_value = "0.01")]
        epsilon_min: f64,

        /// Ticks between snapshot saves
        #[arg(long, default_value = "100")]
        save_interval: u64,
    },

    /// Replay the trained policy without learning
    Run {
        /// Simulator host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Simulator port
        #[arg(long, default_value = "50002")]
        port: u16,

        /// Snapshot file path
        #[arg(long, default_value = "q_table.json")]
        snapshot: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let (config, mode) = match cli.command {
        Commands::Train {
            host,
            port,
            snapshot,
            learning_rate,
            discount,
            epsilon,
            epsilon_decay,
            epsilon_min,
            save_interval,
        } => (
            TrainerConfig {
                host,
                port,
                snapshot_path: snapshot,
                learning: QLearningConfig {
                    learning_rate,
                    discount_factor: discount,
                    epsilon,
                },
                epsilon_decay,
                epsilon_min,
                save_interval,
                ..TrainerConfig::default()
            },
            RunMode::Train,
        ),
        Commands::Run {
            host,
            port,
            snapshot,
        } => (
            TrainerConfig {
                host,
                port,
                snapshot_path: snapshot,
                ..TrainerConfig::default()
            },
            RunMode::Evaluate,
        ),
    };

    let stop = StopToken::new();
    let handler_token = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping gracefully");
            handler_token.cancel();
        }
    });

    let mut trainer = Trainer::new(config, mode).await?;
    if let Err(err) = trainer.run(stop).await {
        error!(%err, "control loop failed");
        return Err(err.into());
    }
    Ok(())
}
