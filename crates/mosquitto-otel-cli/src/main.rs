//! CLI for mosquitto-otel: Mosquitto `$SYS` statistics into OpenTelemetry.

mod broker;
mod commands;
mod config;
mod telemetry;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mosquitto-otel")]
#[command(about = "mosquitto-otel: bridge Mosquitto $SYS statistics into OpenTelemetry")]
#[command(version = mosquitto_otel_core::VERSION)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the broker and export $SYS statistics (default)
    Run {
        /// Poll System V message-queue depth regardless of config.
        #[arg(long)]
        msgqueue: bool,
    },

    /// Query one System V message queue and print its statistics as JSON
    Msgqueue {
        /// Kernel queue table index (defaults to `msgqueue_index` from config, or 0)
        #[arg(long)]
        index: Option<i32>,
    },

    /// List the $SYS topics that are bridged and their instruments
    Topics,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command.unwrap_or(Commands::Run { msgqueue: false }) {
        Commands::Run { msgqueue } => commands::run::run(&cli.config, msgqueue),
        Commands::Msgqueue { index } => commands::msgqueue::run(&cli.config, index),
        Commands::Topics => {
            commands::topics::run();
            Ok(())
        }
    };

    if let Err(e) = result {
        log::error!("{e}");
        std::process::exit(1);
    }
}
