// Logging module - Logging infrastructure
use crate::domain::error::{SerialMonError, SerialMonResult};
use std::io::{self, Write};
use tracing_subscriber::{
    fmt::writer::BoxMakeWriter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Directive used when `RUST_LOG` is not set
pub fn default_directive(level: &str, verbose: bool) -> String {
    let level = if verbose {
        "debug"
    } else {
        match level {
            "error" | "warn" | "info" | "debug" | "trace" => level,
            _ => "info",
        }
    };
    format!("serialmon={},warn", level)
}

/// Writer that ends lines with CRLF, so log output stays aligned while the
/// terminal is in raw mode.
pub struct CrlfWriter<W> {
    inner: W,
}

impl<W: Write> CrlfWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: Write> Write for CrlfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut translated = Vec::with_capacity(buf.len() + 8);
        let mut previous = None;
        for &byte in buf {
            if byte == b'\n' && previous != Some(b'\r') {
                translated.push(b'\r');
            }
            translated.push(byte);
            previous = Some(byte);
        }
        self.inner.write_all(&translated)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Initialize logging system. `raw_terminal` selects CRLF line endings on stderr.
pub fn init_logging(level: &str, verbose: bool, raw_terminal: bool) -> SerialMonResult<()> {
    let writer = if raw_terminal {
        BoxMakeWriter::new(|| CrlfWriter::new(io::stderr()))
    } else {
        BoxMakeWriter::new(io::stderr)
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level, verbose)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_level(true)
                .with_file(verbose)
                .with_line_number(verbose),
        )
        .try_init()
        .map_err(|e| SerialMonError::Config {
            message: format!("Failed to initialize logging: {}", e),
        })?;

    tracing::debug!("serialmon logging system initialized");
    Ok(())
}
