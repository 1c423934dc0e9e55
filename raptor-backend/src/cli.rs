use clap::Parser;

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "raptor-backend", version, about = "RAPTOR quantification job service")]
pub struct CliArgs {
    /// Path to configuration file (overrides RAPTOR_CONFIG_PATH env var)
    #[arg(short = 'c', long = "config-path")]
    pub config_path: Option<String>,
}
