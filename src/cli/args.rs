use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Command line arguments for serialmon
#[derive(Parser, Debug)]
#[command(
    name = "serialmon",
    version = env!("CARGO_PKG_VERSION"),
    about = "Interactive serial monitor for embedded devices",
    long_about = "Opens a serial port, mirrors device output to the terminal and a session log, and sends typed lines to the device."
)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress diagnostic logging
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List available serial ports
    Ports,
    /// Open an interactive serial monitor
    Monitor(MonitorArgs),
    /// Open a port, send data once and close it
    Send(SendArgs),
    /// Configuration management commands
    Config(ConfigArgs),
    /// Display version information
    Version,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
    /// Table output
    Table,
    /// CSV output
    Csv,
}

/// Port selection shared by monitor and send
#[derive(ClapArgs, Debug, Clone)]
pub struct PortArgs {
    /// Serial port path (defaults to the configured port)
    #[arg(short, long)]
    pub port: Option<String>,

    /// Baud rate (defaults to the configured rate)
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// Skip the test write issued right after opening
    #[arg(long)]
    pub no_validate: bool,

    /// Session log file
    #[arg(short, long)]
    pub log: Option<PathBuf>,
}

/// Interactive monitor arguments
#[derive(ClapArgs, Debug)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub port: PortArgs,
}

/// One-shot send arguments
#[derive(ClapArgs, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub port: PortArgs,

    /// Data to send
    pub data: String,

    /// Send without appending a line terminator
    #[arg(short, long)]
    pub raw: bool,

    /// Data format (text, hex, base64)
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: DataFormat,
}

/// Configuration management arguments
#[derive(ClapArgs, Debug)]
pub struct ConfigArgs {
    /// Configuration subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Configuration management subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,
    /// Validate a configuration file
    Validate {
        /// Configuration file path
        file: Option<PathBuf>,
    },
    /// Create a default configuration file
    Init,
}

/// Data format argument
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Text,
    Hex,
    Base64,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

impl std::fmt::Display for DataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataFormat::Text => write!(f, "text"),
            DataFormat::Hex => write!(f, "hex"),
            DataFormat::Base64 => write!(f, "base64"),
        }
    }
}
