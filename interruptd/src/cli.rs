//! CLI argument parsing for interruptd

use std::path::PathBuf;

use clap::Parser;

/// interruptd - remediates nodes on cloud interruption notices
#[derive(Debug, Parser)]
#[command(name = "interruptd")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/interruptd/config.yaml")]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "INTERRUPTD_LOG_LEVEL")]
    pub log_level: String,

    /// Output logs in JSON format
    #[arg(long, default_value = "false", env = "INTERRUPTD_LOG_JSON")]
    pub log_json: bool,

    /// Dry run mode - log remediation but don't mutate the cluster
    #[arg(long, default_value = "false")]
    pub dry_run: bool,

    /// Run a single reconciliation and exit
    #[arg(long)]
    pub once: bool,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["interruptd"]).unwrap();
        assert_eq!(cli.config.to_str().unwrap(), "/etc/interruptd/config.yaml");
        assert_eq!(cli.log_level, "info");
        assert!(!cli.log_json);
        assert!(!cli.dry_run);
        assert!(!cli.once);
    }

    #[test]
    fn test_cli_custom_config() {
        let cli = Cli::try_parse_from(["interruptd", "-c", "/custom/config.yaml"]).unwrap();
        assert_eq!(cli.config.to_str().unwrap(), "/custom/config.yaml");
    }

    #[test]
    fn test_cli_once_dry_run() {
        let cli = Cli::try_parse_from(["interruptd", "--once", "--dry-run"]).unwrap();
        assert!(cli.once);
        assert!(cli.dry_run);
    }

    #[test]
    fn test_cli_rejects_unknown_flag() {
        assert!(Cli::try_parse_from(["interruptd", "--node-name", "x"]).is_err());
    }
}
