// Serial module - Serial port transport and enumeration
pub mod client;
pub mod enumerator;
pub mod mock;

pub use client::{SerialPortFactory, SerialPortTransport};
pub use enumerator::SystemPortEnumerator;
pub use mock::{MockFailure, MockTransportFactory, TransportCall};
