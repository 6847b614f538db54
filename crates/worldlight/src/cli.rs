use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "worldlight",
    author,
    version,
    about = "Replicated light daemon",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Card configuration TOML file (defaults apply when omitted).
    #[arg(value_name = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the card's background data location (path or http(s) URL).
    #[arg(long, value_name = "LOCATION")]
    pub data_location: Option<String>,

    /// Override the animation duration (e.g. `1600ms`, `2s`).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration_arg)]
    pub duration: Option<Duration>,

    /// Interval between simulated stimulus taps.
    #[arg(
        long,
        value_name = "DURATION",
        value_parser = parse_duration_arg,
        default_value = "3s"
    )]
    pub trigger_every: Duration,

    /// Exit after this long instead of running until interrupted.
    #[arg(long, value_name = "DURATION", value_parser = parse_duration_arg)]
    pub run_for: Option<Duration>,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_duration_arg(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("duration must not be empty".to_string());
    }

    let duration = humantime::parse_duration(trimmed)
        .map_err(|err| format!("invalid duration '{trimmed}': {err}"))?;
    if duration.is_zero() {
        return Err("duration must be greater than zero".to_string());
    }
    Ok(duration)
}
