use crate::cli::args::{Args, Command, ConfigCommand, DataFormat, PortArgs, SendArgs};
use crate::cli::output::{ConsoleWriter, OutputWriter};
use crate::core::router::LINE_TERMINATOR;
use crate::core::{
    ConnectionController, DualSink, InteractiveSink, LineBufferedInputRouter, PortDetail,
    PortEnumerator, SharedRouter,
};
use crate::domain::config::{next_baud_rate, MonitorSettings, SerialMonConfig};
use crate::domain::error::{SerialMonError, SerialMonResult};
use crate::infrastructure::config::ConfigManager;
use crate::infrastructure::logging::init_logging;
use crate::infrastructure::serial::{SerialPortFactory, SystemPortEnumerator};
use crate::infrastructure::sinks::FileLogSink;
use crate::tui::{spawn_input_pump, ConsoleTerminal, LocalCommand, RawModeGuard, TerminalInput};
use base64::Engine;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Execute CLI command
pub async fn execute_command(args: Args) -> SerialMonResult<()> {
    let writer = ConsoleWriter::new(args.output);

    let config_manager = match &args.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let config = config_manager.load_config()?;

    if !args.quiet {
        let raw_terminal = matches!(args.command, Command::Monitor(_));
        init_logging(&config.global.log_level, args.verbose, raw_terminal)?;
    }

    match args.command {
        Command::Ports => {
            let ports = SystemPortEnumerator::new().list().await?;
            writer.write_ports(&ports)?;
            Ok(())
        }
        Command::Monitor(monitor_args) => execute_monitor(monitor_args.port, &config).await,
        Command::Send(send_args) => execute_send(send_args, &writer, &config).await,
        Command::Config(config_args) => {
            execute_config_command(config_args.command, &writer, &config, &config_manager)
        }
        Command::Version => {
            writer.write_message(&format!("serialmon {}", env!("CARGO_PKG_VERSION")))?;
            Ok(())
        }
    }
}

/// Everything a session needs, wired against the real port and console
struct SessionParts {
    controller: Arc<ConnectionController>,
    router: SharedRouter,
    terminal: Arc<ConsoleTerminal>,
}

async fn build_session(args: &PortArgs, config: &SerialMonConfig) -> SerialMonResult<SessionParts> {
    let mut settings = config.monitor.clone();
    if args.no_validate {
        settings.disable_testing_open = true;
    }

    let port = match args.port.clone().or_else(|| settings.default_port.clone()) {
        Some(port) => port,
        None => first_available_port().await?,
    };
    let baud_rate = args.baud.unwrap_or(settings.default_baud_rate);

    let log_path = match args.log.clone().or_else(|| settings.log_file.clone()) {
        Some(path) => path,
        None => ConfigManager::default_log_path()?,
    };
    let log = Arc::new(FileLogSink::open(&log_path)?);
    let terminal = Arc::new(ConsoleTerminal::new());
    let sink = Arc::new(DualSink::new(log, terminal.clone()));
    let router = LineBufferedInputRouter::shared(sink.clone());
    let settings: Arc<MonitorSettings> = Arc::new(settings);

    let controller = ConnectionController::new(
        port,
        baud_rate,
        sink,
        router.clone(),
        Arc::new(SerialPortFactory::new()),
        settings,
    );
    info!(
        "Session {} writing its log to {}",
        controller.session_id(),
        log_path.display()
    );

    Ok(SessionParts {
        controller,
        router,
        terminal,
    })
}

async fn first_available_port() -> SerialMonResult<String> {
    SystemPortEnumerator::new()
        .list()
        .await?
        .into_iter()
        .next()
        .map(|port| port.path)
        .ok_or_else(|| SerialMonError::InvalidInput("No serial port given and none found".to_string()))
}

/// Port after `current` in the enumerated list, wrapping around
fn next_port(ports: &[PortDetail], current: &str) -> Option<String> {
    if ports.is_empty() {
        return None;
    }
    let next = ports
        .iter()
        .position(|port| port.path == current)
        .map_or(0, |index| (index + 1) % ports.len());
    Some(ports[next].path.clone())
}

async fn execute_monitor(args: PortArgs, config: &SerialMonConfig) -> SerialMonResult<()> {
    let parts = build_session(&args, config).await?;
    let controller = parts.controller;

    let _raw_mode = RawModeGuard::enter()?;
    let mut input = spawn_input_pump();

    // Lifecycle calls are awaited inline: while an open stalls in the driver,
    // further keys (Ctrl-] included) wait until it resolves.
    if let Err(e) = controller.open().await {
        warn!("Initial open failed: {}", e);
    }

    while let Some(event) = input.recv().await {
        match event {
            TerminalInput::Chunk(chunk) => {
                parts.router.lock().await.handle_input(&chunk).await;
            }
            TerminalInput::Resize(columns, rows) => {
                parts.terminal.set_dimensions(columns, rows);
            }
            TerminalInput::Command(LocalCommand::Quit) => break,
            TerminalInput::Command(LocalCommand::CycleBaudRate) => {
                let baud_rate = next_baud_rate(controller.baud_rate());
                if let Err(e) = controller.change_baud_rate(baud_rate).await {
                    warn!("Baud rate change failed: {}", e);
                }
            }
            TerminalInput::Command(LocalCommand::NextPort) => {
                let ports = match SystemPortEnumerator::new().list().await {
                    Ok(ports) => ports,
                    Err(e) => {
                        warn!("Port enumeration failed: {}", e);
                        continue;
                    }
                };
                let Some(port) = next_port(&ports, &controller.current_port()) else {
                    continue;
                };
                if let Err(e) = controller.change_port(&port).await {
                    warn!("Port change failed: {}", e);
                }
                if let Err(e) = controller.open().await {
                    warn!("Open of '{}' failed: {}", port, e);
                }
            }
            TerminalInput::Command(LocalCommand::Reopen) => {
                if let Err(e) = controller.open().await {
                    warn!("Reopen failed: {}", e);
                }
            }
        }
    }

    controller.stop().await?;
    Ok(())
}

async fn execute_send(
    args: SendArgs,
    writer: &ConsoleWriter,
    config: &SerialMonConfig,
) -> SerialMonResult<()> {
    let payload = outbound_payload(&args.data, args.format, args.raw)?;
    let parts = build_session(&args.port, config).await?;
    let controller = parts.controller;

    controller.open().await?;
    let sent = controller.send_bytes(&payload).await;
    let stopped = controller.stop().await;
    sent?;
    stopped?;

    writer.write_message(&format!(
        "Sent {} bytes to {}",
        payload.len(),
        controller.current_port()
    ))?;
    Ok(())
}

/// Bytes written by `send`: text gets a line terminator unless `raw`.
fn outbound_payload(data: &str, format: DataFormat, raw: bool) -> SerialMonResult<Vec<u8>> {
    let mut payload = parse_data(data, format)?;
    if format == DataFormat::Text && !raw && !payload.is_empty() {
        payload.extend_from_slice(LINE_TERMINATOR.as_bytes());
    }
    Ok(payload)
}

fn execute_config_command(
    command: ConfigCommand,
    writer: &ConsoleWriter,
    config: &SerialMonConfig,
    config_manager: &ConfigManager,
) -> SerialMonResult<()> {
    match command {
        ConfigCommand::Show => {
            writer.write_config(config)?;
        }
        ConfigCommand::Validate { file } => {
            let path: PathBuf = file.unwrap_or_else(|| config_manager.config_path().to_path_buf());
            config_manager.load_config_from_path(&path)?;
            writer.write_message(&format!("Configuration at {} is valid", path.display()))?;
        }
        ConfigCommand::Init => {
            config_manager.init_config()?;
            writer.write_message(&format!(
                "Created default configuration at {}",
                config_manager.config_path().display()
            ))?;
        }
    }
    Ok(())
}

/// Decode command line data in the requested format
pub fn parse_data(data: &str, format: DataFormat) -> SerialMonResult<Vec<u8>> {
    match format {
        DataFormat::Text => Ok(data.as_bytes().to_vec()),
        DataFormat::Hex => {
            let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
            hex::decode(cleaned)
                .map_err(|e| SerialMonError::InvalidInput(format!("Invalid hex data: {}", e)))
        }
        DataFormat::Base64 => base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| SerialMonError::InvalidInput(format!("Invalid base64 data: {}", e))),
    }
}
