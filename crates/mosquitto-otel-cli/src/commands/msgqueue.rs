use std::path::Path;

use mosquitto_otel_core::{MsgctlSource, QueueStats, QueueStatsSource};

use super::CliError;
use crate::config::Config;

/// Print one queue's statistics as JSON.
///
/// The config file is optional here; without one the index defaults to 0.
pub fn run(config_path: &Path, index: Option<i32>) -> Result<(), CliError> {
    let index = match index {
        Some(i) => i,
        None if config_path.exists() => Config::load(config_path)?.msgqueue_index,
        None => 0,
    };

    let stats = QueueStats::from(MsgctlSource::new(index).query()?);
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
