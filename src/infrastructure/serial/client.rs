use crate::core::transport::{
    ControlLines, OpenOptions, PortUpdate, SerialTransport, TransportEvent, TransportEvents,
    TransportFactory, TransportResult,
};
use crate::domain::error::TransportError;
use async_trait::async_trait;
use serialport::SerialPort;
use std::io::{self, ErrorKind, Read, Write};
#[cfg(unix)]
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Read timeout for the receive loop; bounds how long close waits for it
const READ_TIMEOUT: Duration = Duration::from_millis(50);

const READ_BUFFER_SIZE: usize = 1024;

type PortHandle = Arc<Mutex<Option<Box<dyn SerialPort>>>>;

/// Opens system serial ports through the `serialport` crate
#[derive(Debug, Default, Clone)]
pub struct SerialPortFactory;

impl SerialPortFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransportFactory for SerialPortFactory {
    async fn open(
        &self,
        options: &OpenOptions,
    ) -> TransportResult<(Arc<dyn SerialTransport>, TransportEvents)> {
        let path = options.path.clone();
        let baud_rate = options.baud_rate;
        let hang_up_on_close = options.hang_up_on_close;
        let (port, reader) = tokio::task::spawn_blocking(move || {
            open_port(&path, baud_rate, hang_up_on_close)
        })
        .await??;

        info!("Serial port '{}' opened at {} baud", options.path, options.baud_rate);

        let open = Arc::new(AtomicBool::new(true));
        let (event_sender, event_receiver) = mpsc::unbounded_channel();
        let rx_handle = spawn_reader(reader, Arc::clone(&open), event_sender);

        let transport = SerialPortTransport {
            path: options.path.clone(),
            port: Arc::new(Mutex::new(Some(port))),
            open,
            rx_handle: Mutex::new(Some(rx_handle)),
        };
        Ok((Arc::new(transport), event_receiver))
    }
}

type OpenedPort = (Box<dyn SerialPort>, Box<dyn SerialPort>);

#[cfg(unix)]
fn open_port(path: &str, baud_rate: u32, hang_up_on_close: bool) -> serialport::Result<OpenedPort> {
    let port = serialport::new(path, baud_rate)
        .timeout(READ_TIMEOUT)
        .open_native()?;
    if !hang_up_on_close {
        clear_hang_up_on_close(port.as_raw_fd())?;
    }
    let reader = port.try_clone()?;
    let port: Box<dyn SerialPort> = Box::new(port);
    Ok((port, reader))
}

#[cfg(not(unix))]
fn open_port(path: &str, baud_rate: u32, hang_up_on_close: bool) -> serialport::Result<OpenedPort> {
    if !hang_up_on_close {
        debug!("Hang-up-on-close left to the driver default for '{}'", path);
    }
    let port = serialport::new(path, baud_rate)
        .timeout(READ_TIMEOUT)
        .open()?;
    let reader = port.try_clone()?;
    Ok((port, reader))
}

/// Clear HUPCL so that closing the port leaves DTR asserted.
#[cfg(unix)]
fn clear_hang_up_on_close(fd: RawFd) -> io::Result<()> {
    // SAFETY: `termios` is plain data filled in by tcgetattr before it is read,
    // and `fd` belongs to a port the caller keeps open for the whole call.
    unsafe {
        let mut termios: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut termios) != 0 {
            return Err(io::Error::last_os_error());
        }
        if termios.c_cflag & libc::HUPCL == 0 {
            return Ok(());
        }
        termios.c_cflag &= !libc::HUPCL;
        if libc::tcsetattr(fd, libc::TCSANOW, &termios) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

// Receive loop - forwards incoming bytes until the port closes or fails
fn spawn_reader(
    mut reader: Box<dyn SerialPort>,
    open: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<TransportEvent>,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];

        while open.load(Ordering::SeqCst) {
            match reader.read(&mut buffer) {
                Ok(0) => continue,
                Ok(n) => {
                    debug!("Received {} bytes over serial", n);
                    if events.send(TransportEvent::Data(buffer[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::TimedOut => continue,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    // The handle is dead once reads fail; report it closed.
                    if open.swap(false, Ordering::SeqCst) {
                        error!("Failed to read from serial port: {}", e);
                        let _ = events.send(TransportEvent::Error(e.to_string()));
                    }
                    break;
                }
            }
        }
    })
}

/// A serial port opened by [`SerialPortFactory`]
pub struct SerialPortTransport {
    path: String,
    port: PortHandle,
    open: Arc<AtomicBool>,
    rx_handle: Mutex<Option<JoinHandle<()>>>,
}

impl SerialPortTransport {
    /// Run a blocking operation against the open port.
    async fn with_port<T, F>(&self, op: F) -> TransportResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Box<dyn SerialPort>) -> TransportResult<T> + Send + 'static,
    {
        let port = Arc::clone(&self.port);
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&*port);
            match guard.as_mut() {
                Some(port) => op(port),
                None => Err(TransportError::Closed),
            }
        })
        .await?
    }
}

#[async_trait]
impl SerialTransport for SerialPortTransport {
    fn path(&self) -> &str {
        &self.path
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn write(&self, data: &[u8]) -> TransportResult<()> {
        let data = data.to_vec();
        self.with_port(move |port| {
            port.write_all(&data)?;
            port.flush()?;
            Ok(())
        })
        .await
    }

    async fn update(&self, update: PortUpdate) -> TransportResult<()> {
        self.with_port(move |port| Ok(port.set_baud_rate(update.baud_rate)?))
            .await
    }

    async fn set(&self, lines: ControlLines) -> TransportResult<()> {
        self.with_port(move |port| {
            port.write_data_terminal_ready(lines.dtr)?;
            port.write_request_to_send(lines.rts)?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> TransportResult<()> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let rx_handle = lock(&self.rx_handle).take();
        if let Some(handle) = rx_handle {
            if let Err(e) = handle.await {
                warn!("Serial receive task completed with error: {}", e);
            }
        }

        let port = Arc::clone(&self.port);
        tokio::task::spawn_blocking(move || drop(lock(&*port).take())).await?;

        info!("Serial port '{}' closed", self.path);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
