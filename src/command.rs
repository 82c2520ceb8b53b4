use std::fmt;

use crate::apdu::{CommandApdu, StatusWord};
use crate::application::Application;
use crate::error::SessionError;
use crate::usb::Frame;

/// What a command puts on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// A command APDU for the selected smart-card application.
    Apdu(CommandApdu),
    /// A HID slot frame answered by `response_len` bytes plus a CRC.
    Frame { frame: Frame, response_len: usize },
    /// A plain read of the HID status report.
    ReadStatus,
}

/// A request to one application, together with the parser of its answer.
pub trait Command {
    type Data;

    fn application(&self) -> Application;

    fn request(&self) -> Request;

    /// Decodes the payload of a successful answer.
    fn parse(&self, payload: &[u8]) -> Result<Self::Data, SessionError>;
}

/// Outcome reported by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Success,
    /// The card answered with a status word other than `9000`.
    Failed(StatusWord),
    /// The key did not answer the slot command.
    NoData,
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ResponseStatus::Success => write!(f, "success"),
            ResponseStatus::Failed(sw) => write!(f, "status word {}", sw),
            ResponseStatus::NoData => write!(f, "no data returned"),
        }
    }
}

/// The answer to a [`Command`]. The payload can only be reached once the
/// status is known to be [`ResponseStatus::Success`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response<T> {
    status: ResponseStatus,
    data: Option<T>,
}

impl<T> Response<T> {
    pub fn success(data: T) -> Self {
        Response {
            status: ResponseStatus::Success,
            data: Some(data),
        }
    }

    /// # Panics
    ///
    /// When called with [`ResponseStatus::Success`], which needs a payload.
    pub fn failed(status: ResponseStatus) -> Self {
        assert_ne!(status, ResponseStatus::Success);
        Response { status, data: None }
    }

    pub fn status(&self) -> ResponseStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    /// Fails with [`SessionError::CommandFailed`] unless the command succeeded.
    pub fn check(&self) -> Result<(), SessionError> {
        match self.data {
            Some(_) => Ok(()),
            None => Err(SessionError::CommandFailed(self.status)),
        }
    }

    pub fn data(&self) -> Result<&T, SessionError> {
        self.data
            .as_ref()
            .ok_or(SessionError::CommandFailed(self.status))
    }

    pub fn into_data(self) -> Result<T, SessionError> {
        self.data.ok_or(SessionError::CommandFailed(self.status))
    }
}
