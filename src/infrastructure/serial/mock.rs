//! Scriptable in-memory transport.
//!
//! Records every call made against the transports it hands out, lets tests
//! queue one-shot failures per operation, and injects inbound events into the
//! most recently opened handle.

use crate::core::transport::{
    ControlLines, OpenOptions, PortUpdate, SerialTransport, TransportEvent, TransportEvents,
    TransportFactory, TransportResult,
};
use crate::domain::error::TransportError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// A transport operation, in the order it was issued
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Open(OpenOptions),
    Write(Vec<u8>),
    Update(PortUpdate),
    Set(ControlLines),
    Close,
}

/// Description of an injected driver failure
#[derive(Debug, Clone)]
pub enum MockFailure {
    Os(i32),
    Message(String),
}

impl MockFailure {
    pub fn os(code: i32) -> Self {
        MockFailure::Os(code)
    }

    pub fn message(message: impl Into<String>) -> Self {
        MockFailure::Message(message.into())
    }

    fn into_error(self) -> TransportError {
        match self {
            MockFailure::Os(code) => TransportError::Io(io::Error::from_raw_os_error(code)),
            MockFailure::Message(message) => {
                TransportError::Io(io::Error::new(io::ErrorKind::Other, message))
            }
        }
    }
}

#[derive(Default)]
struct Failures {
    open: VecDeque<MockFailure>,
    write: VecDeque<MockFailure>,
    update: VecDeque<MockFailure>,
    set: VecDeque<MockFailure>,
    close: VecDeque<MockFailure>,
}

#[derive(Default)]
struct MockState {
    calls: Vec<TransportCall>,
    failures: Failures,
    opened: usize,
    live: usize,
    events: Option<mpsc::UnboundedSender<TransportEvent>>,
}

/// Factory handing out [`MockTransport`]s that share one recorder
#[derive(Clone, Default)]
pub struct MockTransportFactory {
    state: Arc<Mutex<MockState>>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Number of writes recorded so far
    pub fn write_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, TransportCall::Write(_)))
            .count()
    }

    /// Transports successfully opened so far
    pub fn open_count(&self) -> usize {
        self.lock().opened
    }

    /// Transports opened and not yet closed
    pub fn live_handles(&self) -> usize {
        self.lock().live
    }

    pub fn fail_next_open(&self, failure: MockFailure) {
        self.lock().failures.open.push_back(failure);
    }

    pub fn fail_next_write(&self, failure: MockFailure) {
        self.lock().failures.write.push_back(failure);
    }

    pub fn fail_next_update(&self, failure: MockFailure) {
        self.lock().failures.update.push_back(failure);
    }

    pub fn fail_next_set(&self, failure: MockFailure) {
        self.lock().failures.set.push_back(failure);
    }

    pub fn fail_next_close(&self, failure: MockFailure) {
        self.lock().failures.close.push_back(failure);
    }

    /// Deliver an event on the most recently opened, still open transport.
    /// Returns `false` when there is none.
    pub fn emit(&self, event: TransportEvent) -> bool {
        match &self.lock().events {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    async fn open(
        &self,
        options: &OpenOptions,
    ) -> TransportResult<(Arc<dyn SerialTransport>, TransportEvents)> {
        let mut state = self.lock();
        state.calls.push(TransportCall::Open(options.clone()));
        if let Some(failure) = state.failures.open.pop_front() {
            return Err(failure.into_error());
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        state.events = Some(sender.clone());
        state.opened += 1;
        state.live += 1;

        let transport = MockTransport {
            path: options.path.clone(),
            open: AtomicBool::new(true),
            events: Mutex::new(Some(sender)),
            state: Arc::clone(&self.state),
        };
        Ok((Arc::new(transport), receiver))
    }
}

/// Transport handed out by [`MockTransportFactory`]
pub struct MockTransport {
    path: String,
    open: AtomicBool,
    events: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    fn record(
        &self,
        call: TransportCall,
        pick: fn(&mut Failures) -> &mut VecDeque<MockFailure>,
    ) -> TransportResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.calls.push(call);
        match pick(&mut state.failures).pop_front() {
            Some(failure) => Err(failure.into_error()),
            None => Ok(()),
        }
    }

    fn ensure_open(&self) -> TransportResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(TransportError::Closed)
        }
    }
}

#[async_trait]
impl SerialTransport for MockTransport {
    fn path(&self) -> &str {
        &self.path
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn write(&self, data: &[u8]) -> TransportResult<()> {
        self.ensure_open()?;
        self.record(TransportCall::Write(data.to_vec()), |f| &mut f.write)
    }

    async fn update(&self, update: PortUpdate) -> TransportResult<()> {
        self.ensure_open()?;
        self.record(TransportCall::Update(update), |f| &mut f.update)
    }

    async fn set(&self, lines: ControlLines) -> TransportResult<()> {
        self.ensure_open()?;
        self.record(TransportCall::Set(lines), |f| &mut f.set)
    }

    async fn close(&self) -> TransportResult<()> {
        self.ensure_open()?;
        self.record(TransportCall::Close, |f| &mut f.close)?;

        self.open.store(false, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.live -= 1;
        state.events = None;
        Ok(())
    }
}
