use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "storefront")]
#[command(about = "Storefront API with coordinated local datastores")]
#[command(version)]
pub struct Cli {
    /// Override the configured log format
    #[arg(long, value_enum, global = true)]
    pub log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the API server with the given configuration
    Start {
        /// Path to the configuration file
        #[arg(short, long, default_value = "storefront.yaml")]
        config: PathBuf,

        /// Override HTTP port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the name this instance registers under
        #[arg(short, long)]
        instance: Option<String>,
    },

    /// Validate configuration without starting the server
    Validate {
        /// Path to the configuration file
        #[arg(short, long, default_value = "storefront.yaml")]
        config: PathBuf,
    },

    /// Initialize a new configuration file with all defaults
    Init {
        /// Output path for the new configuration file
        #[arg(short, long, default_value = "storefront.yaml")]
        output: PathBuf,
    },

    /// Apply the coordination schema to the configured PostgreSQL database
    Migrate {
        /// Path to the configuration file
        #[arg(short, long, default_value = "storefront.yaml")]
        config: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormatArg {
    /// Human-readable, colored
    Pretty,
    /// One JSON object per line
    Json,
    /// Single-line text
    Compact,
}

impl LogFormatArg {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormatArg::Pretty => "pretty",
            LogFormatArg::Json => "json",
            LogFormatArg::Compact => "compact",
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_with_overrides() {
        let cli = Cli::try_parse_from([
            "storefront",
            "start",
            "--config",
            "conf/api.yaml",
            "--port",
            "8080",
            "--instance",
            "api-1",
        ])
        .unwrap();

        match cli.command {
            Commands::Start { config, port, instance } => {
                assert_eq!(config, PathBuf::from("conf/api.yaml"));
                assert_eq!(port, Some(8080));
                assert_eq!(instance.as_deref(), Some("api-1"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_defaults_and_global_log_format() {
        let cli = Cli::try_parse_from(["storefront", "migrate", "--log-format", "json"]).unwrap();

        assert_eq!(cli.log_format, Some(LogFormatArg::Json));
        assert!(matches!(
            cli.command,
            Commands::Migrate { ref config } if config == &PathBuf::from("storefront.yaml")
        ));
    }

    #[test]
    fn test_rejects_bad_port() {
        assert!(Cli::try_parse_from(["storefront", "start", "--port", "70000"]).is_err());
    }
}
