//! COM radio monitor.
//!
//! Subscribes to the COM1/COM2 active and standby frequencies, prints every
//! change and reads new COM1 standby frequencies (MHz) from stdin.
//!
//! ```text
//! simbridge-com [LIBRARY_DIR] [--config FILE]
//! ```

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, bail};
use futures::StreamExt;
use simbridge::{BridgeConfig, BridgeEvent, DisconnectReason, Frequency, SampleReport, SimBridge};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

const PROMPT: &str = "Enter new COM1 Standby frequency (MHz, e.g. 123.450): ";

const USAGE: &str = "Usage: simbridge-com [LIBRARY_DIR] [--config FILE]

  LIBRARY_DIR       directory containing SimConnect.dll
  -c, --config FILE YAML bridge configuration
  -h, --help        print this help";

#[derive(Debug, Default)]
struct Args {
    library_path: Option<PathBuf>,
    config: Option<PathBuf>,
}

impl Args {
    /// `Ok(None)` means help was requested.
    fn parse(mut raw: impl Iterator<Item = String>) -> anyhow::Result<Option<Self>> {
        let mut args = Args::default();
        while let Some(arg) = raw.next() {
            match arg.as_str() {
                "-h" | "--help" => return Ok(None),
                "-c" | "--config" => {
                    let path = raw.next().context("--config needs a file argument")?;
                    args.config = Some(PathBuf::from(path));
                }
                flag if flag.starts_with('-') => bail!("unknown option '{}'\n\n{}", flag, USAGE),
                path => {
                    if args.library_path.is_some() {
                        bail!("unexpected argument '{}'\n\n{}", path, USAGE);
                    }
                    args.library_path = Some(PathBuf::from(path));
                }
            }
        }
        Ok(Some(args))
    }

    fn into_config(self) -> anyhow::Result<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => BridgeConfig::from_file(path)?,
            None => BridgeConfig::default(),
        };
        if self.library_path.is_some() {
            config.library_path = self.library_path;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let Some(args) = Args::parse(std::env::args().skip(1))? else {
        println!("{}", USAGE);
        return Ok(());
    };
    let config = args.into_config()?;

    let connection =
        SimBridge::connect(&config).await.context("failed to connect to the simulator")?;
    let mut events = connection.events();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted");
                break;
            }
            event = events.next() => match event {
                Some(BridgeEvent::Connected) => {
                    println!("Connected to Flight Simulator.");
                    print_prompt();
                }
                Some(BridgeEvent::Sample(report)) => println!("{}", format_report(&report)),
                Some(BridgeEvent::Exception { code, send_id, index }) => {
                    println!(
                        "SimConnect exception {} (send id {}, index {})",
                        code, send_id, index
                    );
                }
                Some(BridgeEvent::Disconnected(reason)) => {
                    if let DisconnectReason::TransportFailure(cause) = &reason {
                        warn!("Dispatch failed: {}", cause);
                    }
                    println!("Disconnected from Flight Simulator.");
                    break;
                }
                None => break,
            },
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !line.trim().is_empty() {
                        match Frequency::parse_mhz(&line) {
                            Ok(frequency) => match connection.set_standby(frequency).await {
                                Ok(command) => println!(
                                    "COM1 Standby set to {} (payload 0x{:08X})",
                                    frequency, command.payload
                                ),
                                Err(e) if e.is_fatal() => return Err(e.into()),
                                Err(e) => println!("Could not set frequency: {}", e),
                            },
                            Err(e) => println!("Invalid frequency '{}': {}", line.trim(), e),
                        }
                    }
                    print_prompt();
                }
                Ok(None) => {
                    debug!("stdin closed");
                    break;
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    break;
                }
            },
        }
    }

    let exit = connection.shutdown().await?;
    debug!(
        "Bridge stopped ({:?}) after {} frames, {} samples",
        exit.reason, exit.frames, exit.samples
    );
    Ok(())
}

fn print_prompt() {
    use std::io::Write;

    print!("{}", PROMPT);
    let _ = std::io::stdout().flush();
}

fn format_report(report: &SampleReport) -> String {
    format!(
        "[{}] [#{}] {}: {:.3} {}",
        time_of_day(report.sample.received_at),
        report.sequence,
        report.name(),
        report.value(),
        report.unit()
    )
}

/// `HH:MM:SS.mmm` in UTC.
fn time_of_day(at: SystemTime) -> String {
    let since_epoch = at.duration_since(UNIX_EPOCH).unwrap_or_default();
    let millis = since_epoch.as_millis() % 86_400_000;
    let (hours, rest) = (millis / 3_600_000, millis % 3_600_000);
    let (minutes, rest) = (rest / 60_000, rest % 60_000);
    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, rest / 1000, rest % 1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn parse(args: &[&str]) -> anyhow::Result<Option<Args>> {
        Args::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn positional_argument_is_library_path() {
        let args = parse(&["C:\\MSFS SDK\\SimConnect SDK\\lib"]).unwrap().unwrap();
        assert_eq!(args.library_path, Some(PathBuf::from("C:\\MSFS SDK\\SimConnect SDK\\lib")));
        assert!(args.config.is_none());
    }

    #[test]
    fn config_flag_and_help() {
        let args = parse(&["--config", "bridge.yaml"]).unwrap().unwrap();
        assert_eq!(args.config, Some(PathBuf::from("bridge.yaml")));

        assert!(parse(&["-h"]).unwrap().is_none());
        assert!(parse(&["--config"]).is_err());
        assert!(parse(&["--verbose"]).is_err());
        assert!(parse(&["a", "b"]).is_err());
    }

    #[test]
    fn time_of_day_wraps_at_midnight() {
        let at = UNIX_EPOCH + Duration::from_millis(86_400_000 * 3 + 3_723_045);
        assert_eq!(time_of_day(at), "01:02:03.045");
    }
}
