use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::engine::EngineConfig;
use crate::provider::SCHEMA_URL;

/// Weekly flow-schedule XML tool
#[derive(Parser, Debug, Clone)]
#[command(name = "flow-schedule")]
#[command(about = "Import, export and validate weekly flow-schedule XML files")]
#[command(version)]
pub struct Cli {
    /// Schema URL tried before the embedded fallback copy
    #[arg(long = "schema-url", default_value = SCHEMA_URL)]
    pub schema_url: String,

    /// Schema fetch timeout in seconds
    #[arg(long = "timeout", default_value = "3")]
    pub timeout: u64,

    /// Pause between progress ticks, in milliseconds
    #[arg(long = "tick-delay", default_value = "0")]
    pub tick_delay_ms: u64,

    /// Enable verbose logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Parse a schedule file and validate it against the schema
    Check {
        /// Schedule XML file to check
        file: PathBuf,
    },
    /// Import a schedule file and print a summary of the resulting store
    Import {
        /// Schedule XML file to import
        file: PathBuf,
    },
    /// Import a schedule file and re-export it, normalizing formatting
    Convert {
        /// Schedule XML file to read
        input: PathBuf,
        /// Destination file to write
        output: PathBuf,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            schema_url: self.schema_url.clone(),
            fetch_timeout: Duration::from_secs(self.timeout),
            tick_delay: if self.tick_delay_ms > 0 {
                Some(Duration::from_millis(self.tick_delay_ms))
            } else {
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_cli_parsing() {
        let cli = Cli::try_parse_from(["flow-schedule", "check", "week.xml"]).unwrap();
        assert_eq!(cli.schema_url, SCHEMA_URL);
        assert!(matches!(cli.command, Command::Check { ref file } if file == &PathBuf::from("week.xml")));
    }

    #[test]
    fn test_engine_config_from_flags() {
        let cli = Cli::try_parse_from([
            "flow-schedule",
            "--schema-url",
            "http://localhost/schema.xsd",
            "--timeout",
            "7",
            "--tick-delay",
            "100",
            "convert",
            "in.xml",
            "out.xml",
        ])
        .unwrap();
        let config = cli.engine_config();
        assert_eq!(config.schema_url, "http://localhost/schema.xsd");
        assert_eq!(config.fetch_timeout, Duration::from_secs(7));
        assert_eq!(config.tick_delay, Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_missing_subcommand_rejected() {
        assert!(Cli::try_parse_from(["flow-schedule"]).is_err());
    }
}
