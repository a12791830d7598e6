//! Command-line interface

use std::path::PathBuf;

use clap::Parser;

/// Edge gateway for the patient-record platform
#[derive(Parser, Debug)]
#[command(name = "medigate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "MEDIGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "MEDIGATE_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "MEDIGATE_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MEDIGATE_LOG_LEVEL")]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "MEDIGATE_LOG_FORMAT")]
    pub log_format: Option<String>,
}
