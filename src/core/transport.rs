use crate::domain::error::{SerialMonResult, TransportError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

pub type TransportResult<T> = Result<T, TransportError>;

/// Parameters used to construct a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOptions {
    pub path: String,
    pub baud_rate: u32,
    /// Drop the modem control lines when the port closes
    pub hang_up_on_close: bool,
}

/// Live update applied to an open transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortUpdate {
    pub baud_rate: u32,
}

/// Hardware control line levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlLines {
    /// Data terminal ready
    pub dtr: bool,
    /// Request to send
    pub rts: bool,
}

impl ControlLines {
    /// Both lines asserted, signalling host readiness.
    pub const ASSERTED: ControlLines = ControlLines { dtr: true, rts: true };
}

/// Notification raised by an open transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Bytes received from the device
    Data(Vec<u8>),
    /// Driver-level error outside of any pending operation
    Error(String),
}

pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

/// A live serial line
#[async_trait]
pub trait SerialTransport: Send + Sync {
    /// Path the transport is bound to
    fn path(&self) -> &str;

    /// Whether the underlying handle is still open
    fn is_open(&self) -> bool;

    /// Write bytes to the device
    async fn write(&self, data: &[u8]) -> TransportResult<()>;

    /// Apply new line settings without reopening
    async fn update(&self, update: PortUpdate) -> TransportResult<()>;

    /// Set the hardware control lines
    async fn set(&self, lines: ControlLines) -> TransportResult<()>;

    /// Close the handle; no further events are delivered afterwards
    async fn close(&self) -> TransportResult<()>;
}

/// Constructs transports. Resolving `open` is the connect confirmation.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn open(
        &self,
        options: &OpenOptions,
    ) -> TransportResult<(Arc<dyn SerialTransport>, TransportEvents)>;
}

/// A serial port visible to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDetail {
    pub path: String,
    pub manufacturer: Option<String>,
    pub vendor_id: Option<String>,
    pub product_id: Option<String>,
}

/// Lists serial ports. Failures are passed through untranslated.
#[async_trait]
pub trait PortEnumerator: Send + Sync {
    async fn list(&self) -> SerialMonResult<Vec<PortDetail>>;
}
