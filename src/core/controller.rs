//! Connection lifecycle for a single serial session.
//!
//! The controller owns at most one live transport. Lifecycle operations
//! (open, port/baud changes, stop) are serialized; writes only look at the
//! current handle and never wait for a lifecycle operation to finish.

use crate::core::router::{SharedRouter, LINE_TERMINATOR};
use crate::core::sink::DualSink;
use crate::core::transport::{
    ControlLines, OpenOptions, PortUpdate, SerialTransport, TransportEvent, TransportEvents,
    TransportFactory,
};
use crate::domain::config::{MonitorSettings, SettingsSource};
use crate::domain::error::{SerialMonError, SerialMonResult};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Line written right after connecting to confirm the driver accepted the open
pub const VALIDATION_SENTINEL: &str = "TestingOpen";

/// Observable connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Inactive,
    Opening,
    Active,
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Inactive => write!(f, "Inactive"),
            ConnectionState::Opening => write!(f, "Opening"),
            ConnectionState::Active => write!(f, "Active"),
            ConnectionState::Closing => write!(f, "Closing"),
        }
    }
}

struct ActiveLink {
    transport: Arc<dyn SerialTransport>,
    forwarder: JoinHandle<()>,
}

enum Link {
    Inactive,
    Opening,
    Active(ActiveLink),
    Closing,
}

struct Session {
    port: String,
    baud_rate: u32,
    link: Link,
}

pub struct ConnectionController {
    session_id: Uuid,
    this: Weak<ConnectionController>,
    session: Mutex<Session>,
    lifecycle: tokio::sync::Mutex<()>,
    factory: Arc<dyn TransportFactory>,
    settings: Arc<dyn SettingsSource>,
    sink: Arc<DualSink>,
    router: SharedRouter,
}

impl ConnectionController {
    pub fn new(
        port: impl Into<String>,
        baud_rate: u32,
        sink: Arc<DualSink>,
        router: SharedRouter,
        factory: Arc<dyn TransportFactory>,
        settings: Arc<dyn SettingsSource>,
    ) -> Arc<Self> {
        let port = port.into();
        let session_id = Uuid::new_v4();
        debug!("Created serial session {} for '{}' at {} baud", session_id, port, baud_rate);

        Arc::new_cyclic(|this| Self {
            session_id,
            this: this.clone(),
            session: Mutex::new(Session {
                port,
                baud_rate,
                link: Link::Inactive,
            }),
            lifecycle: tokio::sync::Mutex::new(()),
            factory,
            settings,
            sink,
            router,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn current_port(&self) -> String {
        self.session().port.clone()
    }

    pub fn baud_rate(&self) -> u32 {
        self.session().baud_rate
    }

    pub fn state(&self) -> ConnectionState {
        match &self.session().link {
            Link::Inactive => ConnectionState::Inactive,
            Link::Opening => ConnectionState::Opening,
            Link::Active(_) => ConnectionState::Active,
            Link::Closing => ConnectionState::Closing,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active_transport().is_some()
    }

    /// Open the stored port, closing and reopening if a handle is already live.
    pub async fn open(&self) -> SerialMonResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.router
            .lock()
            .await
            .set_connection_controller(Some(self.this.clone()));

        loop {
            let port = self.current_port();
            self.sink
                .append_line(&format!("[Starting] Opening the serial port - {}", port));

            let Some(active) = self.take_active() else {
                break;
            };
            info!("Closing '{}' before reopening", port);
            self.close_link(active).await?;
        }

        self.connect().await
    }

    /// Switch to another port. A live handle is closed; the caller reopens.
    pub async fn change_port(&self, new_port: &str) -> SerialMonResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        {
            let mut session = self.session();
            if session.port == new_port {
                return Ok(());
            }
            session.port = new_port.to_string();
        }
        info!("Serial session {} switched to port '{}'", self.session_id, new_port);

        match self.take_active() {
            Some(active) => self.close_link(active).await,
            None => Ok(()),
        }
    }

    /// Store a new baud rate and apply it in place when connected.
    pub async fn change_baud_rate(&self, baud_rate: u32) -> SerialMonResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.session().baud_rate = baud_rate;

        let Some(transport) = self.active_transport() else {
            return Ok(());
        };

        transport
            .update(PortUpdate { baud_rate })
            .await
            .map_err(|e| self.report(SerialMonError::Update(e)))?;
        transport
            .set(ControlLines::ASSERTED)
            .await
            .map_err(|e| self.report(SerialMonError::Update(e)))?;

        info!("Serial port '{}' now at {} baud", transport.path(), baud_rate);
        Ok(())
    }

    /// Write `text` followed by a line terminator.
    pub async fn send_message(&self, text: &str) -> SerialMonResult<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.send_bytes(format!("{}{}", text, LINE_TERMINATOR).as_bytes())
            .await
    }

    /// Write `text` verbatim.
    pub async fn send_raw(&self, text: &str) -> SerialMonResult<()> {
        self.send_bytes(text.as_bytes()).await
    }

    /// Write bytes verbatim. Empty input, or no live handle, is a no-op.
    pub async fn send_bytes(&self, data: &[u8]) -> SerialMonResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let Some(transport) = self.active_transport() else {
            debug!("Serial session {} inactive, dropping {} bytes", self.session_id, data.len());
            return Ok(());
        };

        transport
            .write(data)
            .await
            .map_err(|e| self.report(SerialMonError::Write(e)))?;
        debug!("Sent {} bytes over serial", data.len());
        Ok(())
    }

    /// Detach from the input router and close any live handle.
    /// Resolves `true` if a handle was closed.
    pub async fn stop(&self) -> SerialMonResult<bool> {
        self.router.lock().await.set_connection_controller(None);

        let _lifecycle = self.lifecycle.lock().await;
        let Some(active) = self.take_active() else {
            return Ok(false);
        };

        let result = active.transport.close().await;
        self.set_link(Link::Inactive);
        self.sink.append_line("[Done] Closed the serial port");

        match result {
            Ok(()) => {
                info!("Serial session {} stopped", self.session_id);
                Ok(true)
            }
            Err(e) => {
                active.forwarder.abort();
                Err(self.report(SerialMonError::Close(e)))
            }
        }
    }

    async fn connect(&self) -> SerialMonResult<()> {
        let settings = self.settings.monitor_settings();
        let options = {
            let session = self.session();
            OpenOptions {
                path: session.port.clone(),
                baud_rate: session.baud_rate,
                hang_up_on_close: false,
            }
        };

        self.set_link(Link::Opening);
        self.sink.show_log();

        let (transport, events) = match self.factory.open(&options).await {
            Ok(opened) => opened,
            Err(source) => {
                self.set_link(Link::Inactive);
                return Err(self.report(SerialMonError::Open {
                    port: options.path,
                    source,
                }));
            }
        };
        let forwarder = self.forward_events(events);

        if let Err(e) = self.validate(transport.as_ref(), &options, &settings).await {
            forwarder.abort();
            if let Err(close_err) = transport.close().await {
                warn!("Failed to release '{}' after open failure: {}", options.path, close_err);
            }
            self.set_link(Link::Inactive);
            return Err(e);
        }

        self.set_link(Link::Active(ActiveLink {
            transport,
            forwarder,
        }));
        info!(
            "Serial session {} active on '{}' at {} baud",
            self.session_id, options.path, options.baud_rate
        );
        Ok(())
    }

    async fn validate(
        &self,
        transport: &dyn SerialTransport,
        options: &OpenOptions,
        settings: &MonitorSettings,
    ) -> SerialMonResult<()> {
        if settings.disable_testing_open {
            self.sink
                .append_line("[Warning] Auto checking serial port open is disabled");
        } else {
            let sentinel = format!("{}{}", VALIDATION_SENTINEL, LINE_TERMINATOR);
            match transport.write(sentinel.as_bytes()).await {
                Ok(()) => {}
                Err(e) if settings.is_benign_write_error(e.os_code()) => {
                    debug!("Ignoring benign test write error on '{}': {}", options.path, e);
                }
                Err(source) => {
                    return Err(self.report(SerialMonError::Open {
                        port: options.path.clone(),
                        source,
                    }));
                }
            }
            self.sink
                .append_line(&format!("[Info] Opened the serial port - {}", options.path));
        }

        transport
            .set(ControlLines::ASSERTED)
            .await
            .map_err(|e| self.report(SerialMonError::Update(e)))
    }

    async fn close_link(&self, active: ActiveLink) -> SerialMonResult<()> {
        match active.transport.close().await {
            Ok(()) => {
                self.set_link(Link::Inactive);
                info!("Closed serial port '{}'", active.transport.path());
                Ok(())
            }
            Err(e) => {
                self.set_link(Link::Active(active));
                Err(self.report(SerialMonError::Close(e)))
            }
        }
    }

    fn forward_events(&self, mut events: TransportEvents) -> JoinHandle<()> {
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            let mut decoder = Utf8Decoder::default();
            while let Some(event) = events.recv().await {
                match event {
                    TransportEvent::Data(bytes) => {
                        let text = decoder.decode(&bytes);
                        if !text.is_empty() {
                            sink.append(&text);
                        }
                    }
                    TransportEvent::Error(message) => {
                        sink.append_line(&format!("[Error] {}", message));
                    }
                }
            }
        })
    }

    /// Take the live handle out of the session, leaving it `Closing`.
    fn take_active(&self) -> Option<ActiveLink> {
        let mut session = self.session();
        match std::mem::replace(&mut session.link, Link::Inactive) {
            Link::Active(active) if active.transport.is_open() => {
                session.link = Link::Closing;
                Some(active)
            }
            Link::Active(stale) => {
                stale.forwarder.abort();
                None
            }
            other => {
                session.link = other;
                None
            }
        }
    }

    fn active_transport(&self) -> Option<Arc<dyn SerialTransport>> {
        let session = self.session();
        match &session.link {
            Link::Active(active) if active.transport.is_open() => {
                Some(Arc::clone(&active.transport))
            }
            _ => None,
        }
    }

    fn set_link(&self, link: Link) {
        self.session().link = link;
    }

    fn report(&self, error: SerialMonError) -> SerialMonError {
        warn!("Serial session {}: {}", self.session_id, error);
        self.sink.append_line(&format!("[Error] {}", error));
        error
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Decodes inbound bytes, holding back a multi-byte sequence split across reads.
#[derive(Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut text = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.pending.clear();
                    return text;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.pending[..valid_up_to]));
                    match e.error_len() {
                        Some(invalid) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid_up_to + invalid);
                        }
                        None => {
                            self.pending.drain(..valid_up_to);
                            return text;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::router::LineBufferedInputRouter;
    use crate::infrastructure::serial::mock::{MockFailure, MockTransportFactory, TransportCall};
    use crate::infrastructure::sinks::MemorySink;

    struct Fixture {
        factory: MockTransportFactory,
        terminal: Arc<MemorySink>,
        log: Arc<MemorySink>,
        router: SharedRouter,
        controller: Arc<ConnectionController>,
    }

    fn fixture(settings: MonitorSettings) -> Fixture {
        let factory = MockTransportFactory::new();
        let log = Arc::new(MemorySink::new());
        let terminal = Arc::new(MemorySink::new());
        let sink = Arc::new(DualSink::new(log.clone(), terminal.clone()));
        let router = LineBufferedInputRouter::shared(Arc::clone(&sink));
        let controller = ConnectionController::new(
            "/dev/ttyUSB0",
            9600,
            sink,
            Arc::clone(&router),
            Arc::new(factory.clone()),
            Arc::new(settings),
        );
        Fixture {
            factory,
            terminal,
            log,
            router,
            controller,
        }
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_open_validates_then_asserts_lines() {
        let f = fixture(MonitorSettings::default());

        f.controller.open().await.unwrap();

        assert_eq!(f.controller.state(), ConnectionState::Active);
        assert_eq!(
            f.factory.calls(),
            vec![
                TransportCall::Open(OpenOptions {
                    path: "/dev/ttyUSB0".to_string(),
                    baud_rate: 9600,
                    hang_up_on_close: false,
                }),
                TransportCall::Write(b"TestingOpen\r\n".to_vec()),
                TransportCall::Set(ControlLines::ASSERTED),
            ]
        );
        assert_eq!(f.log.show_count(), 1);
        assert!(f.terminal.contents().contains("[Info] Opened the serial port - /dev/ttyUSB0"));
        assert!(f.router.lock().await.is_attached());
    }

    #[tokio::test]
    async fn test_open_without_validation() {
        let settings = MonitorSettings {
            disable_testing_open: true,
            ..MonitorSettings::default()
        };
        let f = fixture(settings);

        f.controller.open().await.unwrap();

        assert!(f.controller.is_active());
        assert!(!f.factory.calls().iter().any(|c| matches!(c, TransportCall::Write(_))));
        assert!(f.terminal.contents().contains("[Warning] Auto checking serial port open is disabled"));
    }

    #[tokio::test]
    async fn test_benign_validation_error_is_tolerated() {
        let f = fixture(MonitorSettings::default());
        f.factory.fail_next_write(MockFailure::os(121));

        f.controller.open().await.unwrap();

        assert!(f.controller.is_active());
        assert_eq!(f.factory.calls().last(), Some(&TransportCall::Set(ControlLines::ASSERTED)));
    }

    #[tokio::test]
    async fn test_validation_failure_returns_to_inactive() {
        let f = fixture(MonitorSettings::default());
        f.factory.fail_next_write(MockFailure::message("device not responding"));

        let err = f.controller.open().await.unwrap_err();

        assert!(matches!(err, SerialMonError::Open { .. }));
        assert_eq!(f.controller.state(), ConnectionState::Inactive);
        assert_eq!(f.factory.live_handles(), 0);
        assert!(!f.factory.calls().iter().any(|c| matches!(c, TransportCall::Set(_))));
        assert!(f.log.contents().contains("device not responding"));
        assert!(f.terminal.contents().contains("device not responding"));
    }

    #[tokio::test]
    async fn test_connect_failure_returns_to_inactive() {
        let f = fixture(MonitorSettings::default());
        f.factory.fail_next_open(MockFailure::message("no such device"));

        assert!(f.controller.open().await.is_err());
        assert_eq!(f.controller.state(), ConnectionState::Inactive);
        assert_eq!(f.factory.live_handles(), 0);
    }

    #[tokio::test]
    async fn test_control_line_failure_rejects_open() {
        let f = fixture(MonitorSettings::default());
        f.factory.fail_next_set(MockFailure::message("ioctl failed"));

        let err = f.controller.open().await.unwrap_err();

        assert!(matches!(err, SerialMonError::Update(_)));
        assert!(!f.controller.is_active());
        assert_eq!(f.factory.live_handles(), 0);
    }

    #[tokio::test]
    async fn test_reopen_closes_first() {
        let f = fixture(MonitorSettings::default());
        f.controller.open().await.unwrap();
        f.factory.clear_calls();

        f.controller.open().await.unwrap();

        let calls = f.factory.calls();
        assert_eq!(calls[0], TransportCall::Close);
        assert!(matches!(calls[1], TransportCall::Open(_)));
        assert_eq!(f.factory.live_handles(), 1);
        assert_eq!(f.terminal.contents().matches("[Starting]").count(), 3);
    }

    #[tokio::test]
    async fn test_reopen_close_failure_keeps_handle() {
        let f = fixture(MonitorSettings::default());
        f.controller.open().await.unwrap();
        f.factory.fail_next_close(MockFailure::message("busy"));

        let err = f.controller.open().await.unwrap_err();

        assert!(matches!(err, SerialMonError::Close(_)));
        assert!(f.controller.is_active());
        assert_eq!(f.factory.open_count(), 1);
    }

    #[tokio::test]
    async fn test_change_port_to_same_port_is_noop() {
        let f = fixture(MonitorSettings::default());
        f.controller.open().await.unwrap();
        f.factory.clear_calls();

        f.controller.change_port("/dev/ttyUSB0").await.unwrap();

        assert!(f.factory.calls().is_empty());
        assert!(f.controller.is_active());
        assert_eq!(f.controller.current_port(), "/dev/ttyUSB0");
    }

    #[tokio::test]
    async fn test_change_port_closes_without_reopen() {
        let f = fixture(MonitorSettings::default());
        f.controller.open().await.unwrap();
        f.factory.clear_calls();

        f.controller.change_port("/dev/ttyUSB1").await.unwrap();

        assert_eq!(f.factory.calls(), vec![TransportCall::Close]);
        assert_eq!(f.controller.state(), ConnectionState::Inactive);
        assert_eq!(f.controller.current_port(), "/dev/ttyUSB1");
    }

    #[tokio::test]
    async fn test_change_baud_rate_inactive_only_stores() {
        let f = fixture(MonitorSettings::default());

        f.controller.change_baud_rate(115200).await.unwrap();

        assert_eq!(f.controller.baud_rate(), 115200);
        assert!(f.factory.calls().is_empty());
    }

    #[tokio::test]
    async fn test_change_baud_rate_reasserts_lines() {
        let f = fixture(MonitorSettings::default());
        f.controller.open().await.unwrap();
        f.factory.clear_calls();

        f.controller.change_baud_rate(57600).await.unwrap();

        assert_eq!(
            f.factory.calls(),
            vec![
                TransportCall::Update(PortUpdate { baud_rate: 57600 }),
                TransportCall::Set(ControlLines::ASSERTED),
            ]
        );
    }

    #[tokio::test]
    async fn test_change_baud_rate_update_failure_skips_reassert() {
        let f = fixture(MonitorSettings::default());
        f.controller.open().await.unwrap();
        f.factory.clear_calls();
        f.factory.fail_next_update(MockFailure::message("unsupported rate"));

        let err = f.controller.change_baud_rate(74880).await.unwrap_err();

        assert!(matches!(err, SerialMonError::Update(_)));
        assert_eq!(
            f.factory.calls(),
            vec![TransportCall::Update(PortUpdate { baud_rate: 74880 })]
        );
        assert_eq!(f.controller.baud_rate(), 74880);
        assert!(f.controller.is_active());
    }

    #[tokio::test]
    async fn test_send_is_noop_when_empty_or_inactive() {
        let f = fixture(MonitorSettings::default());

        f.controller.send_message("hello").await.unwrap();
        f.controller.send_raw("hello").await.unwrap();
        assert!(f.factory.calls().is_empty());

        f.controller.open().await.unwrap();
        f.factory.clear_calls();
        f.controller.send_message("").await.unwrap();
        f.controller.send_raw("").await.unwrap();
        assert!(f.factory.calls().is_empty());
    }

    #[tokio::test]
    async fn test_send_message_and_raw() {
        let f = fixture(MonitorSettings::default());
        f.controller.open().await.unwrap();
        f.factory.clear_calls();

        f.controller.send_message("AT").await.unwrap();
        f.controller.send_raw("+++").await.unwrap();

        assert_eq!(
            f.factory.calls(),
            vec![
                TransportCall::Write(b"AT\r\n".to_vec()),
                TransportCall::Write(b"+++".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn test_send_failure_is_reported() {
        let f = fixture(MonitorSettings::default());
        f.controller.open().await.unwrap();
        f.factory.fail_next_write(MockFailure::message("cable unplugged"));

        let err = f.controller.send_message("ping").await.unwrap_err();

        assert!(matches!(err, SerialMonError::Write(_)));
        assert!(f.terminal.contents().contains("cable unplugged"));
    }

    #[tokio::test]
    async fn test_stop_inactive_returns_false() {
        let f = fixture(MonitorSettings::default());

        assert!(!f.controller.stop().await.unwrap());
        assert!(f.factory.calls().is_empty());
        assert!(f.terminal.contents().is_empty());
    }

    #[tokio::test]
    async fn test_stop_active_closes_and_detaches() {
        let f = fixture(MonitorSettings::default());
        f.controller.open().await.unwrap();

        assert!(f.controller.stop().await.unwrap());

        assert_eq!(f.factory.calls().last(), Some(&TransportCall::Close));
        assert!(f.terminal.contents().ends_with("[Done] Closed the serial port\r\n"));
        assert!(!f.router.lock().await.is_attached());
        assert_eq!(f.controller.state(), ConnectionState::Inactive);
    }

    #[tokio::test]
    async fn test_inbound_events_reach_both_sinks() {
        let f = fixture(MonitorSettings::default());
        f.controller.open().await.unwrap();

        f.factory.emit(TransportEvent::Data(b"boot ok\r\n".to_vec()));
        f.factory.emit(TransportEvent::Error("framing error".to_string()));
        settle().await;

        assert!(f.log.contents().contains("boot ok\r\n"));
        assert!(f.terminal.contents().ends_with("boot ok\r\n[Error] framing error\r\n"));
    }

    #[test]
    fn test_utf8_decoder_holds_split_sequence() {
        let mut decoder = Utf8Decoder::default();
        let bytes = "µs".as_bytes();

        assert_eq!(decoder.decode(&bytes[..1]), "");
        assert_eq!(decoder.decode(&bytes[1..]), "µs");
        assert_eq!(decoder.decode(&[0xff, b'a']), "\u{fffd}a");
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Inactive.to_string(), "Inactive");
        assert_eq!(ConnectionState::Active.to_string(), "Active");
    }
}
