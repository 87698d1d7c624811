// Core module - Serial session lifecycle, input routing and output fan-out
pub mod controller;
pub mod router;
pub mod sink;
pub mod transport;

pub use controller::{ConnectionController, ConnectionState};
pub use router::{LineBufferedInputRouter, SharedRouter};
pub use sink::{DualSink, InteractiveSink, LogSink};
pub use transport::{PortDetail, PortEnumerator, SerialTransport, TransportFactory};
