//! Error types for the lock-controller link and its owner.
//!
//! [`LinkError`] is what the serial link reports after its own retry and
//! reopen logic has given up. [`HardwareError`] covers everything a caller
//! of the controller handle can see.

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Terminal outcome of a serial transaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// The port could not be opened (missing device, permissions).
    #[error("Serial port unavailable: {message}")]
    PortUnavailable { message: String },

    /// Every attempt transmitted but no reply arrived.
    #[error("No response after {attempts} attempts")]
    Timeout { attempts: u32 },

    /// The liveness probe failed and the port could not be reopened.
    #[error("Serial port frozen: {message}")]
    Frozen { message: String },
}

impl LinkError {
    pub fn port_unavailable(message: impl Into<String>) -> Self {
        Self::PortUnavailable {
            message: message.into(),
        }
    }

    pub fn frozen(message: impl Into<String>) -> Self {
        Self::Frozen {
            message: message.into(),
        }
    }

    /// Whether the frame left the host at least once.
    pub fn transmitted(&self) -> bool {
        matches!(self, LinkError::Timeout { .. })
    }
}

/// Errors that can occur while talking to the lock controller.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// The controller owner has stopped.
    #[error("Controller disconnected: {device}")]
    Disconnected { device: String },

    /// A capped call did not complete in time.
    #[error("Controller request timed out after {duration_ms}ms")]
    RequestTimeout { duration_ms: u64 },

    /// Serial link failure.
    #[error(transparent)]
    Link(#[from] LinkError),

    /// The controller thread could not be started.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new request timeout error.
    pub fn request_timeout(duration_ms: u64) -> Self {
        Self::RequestTimeout { duration_ms }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_timeout_display() {
        let error = LinkError::Timeout { attempts: 3 };
        assert_eq!(error.to_string(), "No response after 3 attempts");
        assert!(error.transmitted());
    }

    #[test]
    fn test_port_unavailable_not_transmitted() {
        let error = LinkError::port_unavailable("/dev/ttyUSB0: No such file or directory");
        assert!(!error.transmitted());
        assert_eq!(
            error.to_string(),
            "Serial port unavailable: /dev/ttyUSB0: No such file or directory"
        );
    }

    #[test]
    fn test_request_timeout_error() {
        let error = HardwareError::request_timeout(10_000);
        assert!(matches!(error, HardwareError::RequestTimeout { .. }));
        assert_eq!(
            error.to_string(),
            "Controller request timed out after 10000ms"
        );
    }

    #[test]
    fn test_link_error_is_transparent() {
        let error: HardwareError = LinkError::frozen("probe failed").into();
        assert_eq!(error.to_string(), "Serial port frozen: probe failed");
    }
}
