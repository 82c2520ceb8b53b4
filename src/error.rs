use std::io::Error as IoError;

#[cfg(any(feature = "rusb", target_os = "windows"))]
use rusb::Error as UsbError;
use thiserror::Error;

use crate::application::Application;
use crate::command::ResponseStatus;

/// Failures raised by the USB HID and smart-card backends.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] IoError),
    #[cfg(any(feature = "rusb", target_os = "windows"))]
    #[error("USB error: {0}")]
    Usb(#[from] UsbError),
    #[error("PC/SC error: {0}")]
    Pcsc(#[from] pcsc::Error),
    #[error("Device not found")]
    DeviceNotFound,
    #[error("Can not open device")]
    OpenDeviceError,
    #[error("Can not write to device")]
    CanNotWriteToDevice,
    #[error("Can not read from device")]
    CanNotReadFromDevice,
    #[error("Wrong CRC")]
    WrongCrc,
    #[error("Timed out waiting for the device")]
    Timeout,
    #[error("Timed out resetting the write state")]
    ResetTimeout,
    #[error("Response too short: {0} bytes")]
    ShortResponse(usize),
}

/// Errors surfaced by [`SessionClient`](crate::SessionClient) and
/// [`Connection`](crate::Connection).
#[derive(Debug, Error)]
pub enum SessionError {
    /// The platform transport could not be reached at all.
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(#[source] TransportError),

    /// The application could not be opened on the device.
    #[error("Could not connect to {application} on {path}: {reason}")]
    ConnectionFailed {
        path: String,
        application: Application,
        reason: String,
    },

    /// The command or its response was lost on the wire.
    #[error("Transmission error: {0}")]
    Transmission(#[from] TransportError),

    /// Raised by [`Response::check`](crate::Response::check) and the payload
    /// accessors of a failed response.
    #[error("Command failed: {0}")]
    CommandFailed(ResponseStatus),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Command not supported over a {0} connection")]
    CommandNotSupported(Application),

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("IO error: {0}")]
    Io(#[from] IoError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apdu::StatusWord;

    #[test]
    fn test_error_display() {
        let err = SessionError::ConnectionFailed {
            path: "usb:001:002".to_string(),
            application: Application::Piv,
            reason: "no smart card interface".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Could not connect to PIV on usb:001:002: no smart card interface"
        );

        let err = SessionError::CommandFailed(ResponseStatus::Failed(StatusWord::INS_NOT_SUPPORTED));
        assert_eq!(err.to_string(), "Command failed: status word 6D00");
    }

    #[test]
    fn test_transport_error_conversion() {
        let err: SessionError = TransportError::WrongCrc.into();
        assert!(matches!(err, SessionError::Transmission(TransportError::WrongCrc)));
    }
}
