use thiserror::Error;

/// serialmon unified error type
#[derive(Error, Debug)]
pub enum SerialMonError {
    #[error("Failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: TransportError,
    },

    #[error("Failed to write to serial port: {0}")]
    Write(#[source] TransportError),

    #[error("Failed to close serial port: {0}")]
    Close(#[source] TransportError),

    #[error("Failed to update serial port: {0}")]
    Update(#[source] TransportError),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Output error: {0}")]
    Output(String),

    #[error("Terminal error: {0}")]
    Terminal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SerialMonResult<T> = Result<T, SerialMonError>;

/// Failure reported by a transport capability
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Serial(#[from] serialport::Error),

    #[error("port is not open")]
    Closed,

    #[error("transport task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl TransportError {
    /// OS error code carried by the driver, if any.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            TransportError::Io(e) => e.raw_os_error(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_code_from_raw_io_error() {
        let err = TransportError::from(std::io::Error::from_raw_os_error(121));
        assert_eq!(err.os_code(), Some(121));
        assert_eq!(TransportError::Closed.os_code(), None);
    }

    #[test]
    fn test_open_error_display_names_port() {
        let err = SerialMonError::Open {
            port: "/dev/ttyACM0".to_string(),
            source: TransportError::Closed,
        };
        let display = err.to_string();
        assert!(display.contains("/dev/ttyACM0"));
        assert!(display.contains("port is not open"));
    }
}
