//! CLI argument parsing for graphtrace

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for the replay report
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "graphtrace")]
#[command(version)]
#[command(about = "Resolver metrics and outlier sampling", long_about = None)]
pub struct Cli {
    /// Recorded requests (JSON array)
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Agent configuration file (TOML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Close a flush window every N requests
    #[arg(short = 'w', long = "window", value_name = "N", default_value = "1")]
    pub window: usize,

    /// Force a sample every N windows (overrides config)
    #[arg(long = "force-every", value_name = "N")]
    pub force_every: Option<u64>,

    /// Archive size for the outlier test (overrides config)
    #[arg(long = "archive-size", value_name = "N")]
    pub archive_size: Option<usize>,

    /// Robust z-score threshold (overrides config)
    #[arg(long = "max-z-score", value_name = "Z")]
    pub max_z_score: Option<f64>,

    /// Enable debug logging to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_input() {
        let cli = Cli::parse_from(["graphtrace", "requests.json"]);
        assert_eq!(cli.input, PathBuf::from("requests.json"));
        assert_eq!(cli.format, OutputFormat::Text);
        assert_eq!(cli.window, 1);
        assert!(cli.config.is_none());
        assert!(!cli.debug);
    }

    #[test]
    fn test_cli_requires_input() {
        assert!(Cli::try_parse_from(["graphtrace"]).is_err());
    }

    #[test]
    fn test_cli_json_format() {
        let cli = Cli::parse_from(["graphtrace", "--format", "json", "in.json"]);
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn test_cli_window_and_overrides() {
        let cli = Cli::parse_from([
            "graphtrace",
            "-w",
            "5",
            "--force-every",
            "10",
            "--archive-size",
            "20",
            "--max-z-score",
            "2.5",
            "in.json",
        ]);
        assert_eq!(cli.window, 5);
        assert_eq!(cli.force_every, Some(10));
        assert_eq!(cli.archive_size, Some(20));
        assert_eq!(cli.max_z_score, Some(2.5));
    }

    #[test]
    fn test_cli_config_path() {
        let cli = Cli::parse_from(["graphtrace", "--config", "agent.toml", "in.json"]);
        assert_eq!(cli.config, Some(PathBuf::from("agent.toml")));
    }
}
