use crate::cli::args::OutputFormat;
use crate::core::transport::PortDetail;
use crate::domain::config::SerialMonConfig;
use std::io;
use tabled::{Table, Tabled};

/// Output writer trait for different formats
pub trait OutputWriter {
    fn write_ports(&self, ports: &[PortDetail]) -> Result<(), OutputError>;
    fn write_config(&self, config: &SerialMonConfig) -> Result<(), OutputError>;
    fn write_message(&self, message: &str) -> Result<(), OutputError>;
    fn write_error(&self, error: &str) -> Result<(), OutputError>;
}

/// Output formatting errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl From<OutputError> for crate::domain::error::SerialMonError {
    fn from(err: OutputError) -> Self {
        Self::Output(err.to_string())
    }
}

/// Console output writer
pub struct ConsoleWriter {
    format: OutputFormat,
}

impl ConsoleWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn render_ports(&self, ports: &[PortDetail]) -> Result<String, OutputError> {
        let rendered = match self.format {
            OutputFormat::Text => {
                if ports.is_empty() {
                    return Ok("No serial ports found".to_string());
                }
                let mut text = String::from("Available serial ports:");
                for port in ports {
                    text.push_str(&format!("\n  {}", port.path));
                    if let Some(manufacturer) = &port.manufacturer {
                        text.push_str(&format!(" - {}", manufacturer));
                    }
                    if let (Some(vid), Some(pid)) = (&port.vendor_id, &port.product_id) {
                        text.push_str(&format!(" ({}:{})", vid, pid));
                    }
                }
                text
            }
            OutputFormat::Json => serde_json::to_string_pretty(ports)?,
            OutputFormat::Table => {
                let rows: Vec<PortTableRow> = ports.iter().map(PortTableRow::from).collect();
                Table::new(rows).to_string()
            }
            OutputFormat::Csv => {
                let mut csv = String::from("path,manufacturer,vendor_id,product_id");
                for port in ports {
                    csv.push_str(&format!(
                        "\n{},{},{},{}",
                        port.path,
                        port.manufacturer.as_deref().unwrap_or_default(),
                        port.vendor_id.as_deref().unwrap_or_default(),
                        port.product_id.as_deref().unwrap_or_default()
                    ));
                }
                csv
            }
        };
        Ok(rendered)
    }

    pub fn render_config(&self, config: &SerialMonConfig) -> Result<String, OutputError> {
        let rendered = match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(config)?,
            OutputFormat::Text | OutputFormat::Table | OutputFormat::Csv => {
                let monitor = &config.monitor;
                let mut text = String::from("serialmon Configuration:");
                text.push_str(&format!("\n  Log level: {}", config.global.log_level));
                text.push_str(&format!(
                    "\n  Test write on open: {}",
                    if monitor.disable_testing_open { "disabled" } else { "enabled" }
                ));
                text.push_str(&format!(
                    "\n  Tolerated test write errors: {:?}",
                    monitor.benign_write_error_codes
                ));
                text.push_str(&format!("\n  Default baud rate: {}", monitor.default_baud_rate));
                if let Some(port) = &monitor.default_port {
                    text.push_str(&format!("\n  Default port: {}", port));
                }
                if let Some(log_file) = &monitor.log_file {
                    text.push_str(&format!("\n  Log file: {}", log_file.display()));
                }
                text
            }
        };
        Ok(rendered)
    }
}

impl OutputWriter for ConsoleWriter {
    fn write_ports(&self, ports: &[PortDetail]) -> Result<(), OutputError> {
        println!("{}", self.render_ports(ports)?);
        Ok(())
    }

    fn write_config(&self, config: &SerialMonConfig) -> Result<(), OutputError> {
        println!("{}", self.render_config(config)?);
        Ok(())
    }

    fn write_message(&self, message: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "message": message,
                    "level": "info"
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            _ => {
                println!("{}", message);
            }
        }
        Ok(())
    }

    fn write_error(&self, error: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "error": error,
                    "level": "error"
                });
                eprintln!("{}", serde_json::to_string_pretty(&output)?);
            }
            _ => {
                eprintln!("Error: {}", error);
            }
        }
        Ok(())
    }
}

/// Table row for a serial port
#[derive(Tabled)]
struct PortTableRow {
    path: String,
    manufacturer: String,
    vendor_id: String,
    product_id: String,
}

impl From<&PortDetail> for PortTableRow {
    fn from(port: &PortDetail) -> Self {
        Self {
            path: port.path.clone(),
            manufacturer: port.manufacturer.clone().unwrap_or_default(),
            vendor_id: port.vendor_id.clone().unwrap_or_default(),
            product_id: port.product_id.clone().unwrap_or_default(),
        }
    }
}
