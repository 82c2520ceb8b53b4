use std::fmt;
use std::time::Duration;

use tracing::{debug, warn};

use crate::application::Application;
use crate::command::{Command, Request, Response, ResponseStatus};
use crate::error::{SessionError, TransportError};
use crate::sec::{crc16, CRC_RESIDUAL_OK};
use crate::smartcard::{self, CardBackend};
use crate::usb::{Backend, Flags, REPORT_SIZE, RESPONSE_SIZE};

/// Size of the CRC trailing a slot response.
const CRC_SIZE: usize = 2;

enum Channel<U: Backend, C: CardBackend> {
    Hid {
        backend: U,
        handle: U::Handle,
        interfaces: Vec<U::Interface>,
    },
    SmartCard {
        backend: C,
        card: C::Card,
    },
}

/// An open session with one application of one key.
///
/// The channel is released by [`close`](Connection::close) or when the
/// connection is dropped.
pub struct Connection<U: Backend, C: CardBackend> {
    path: String,
    application: Application,
    response_timeout: Duration,
    channel: Option<Channel<U, C>>,
}

impl<U: Backend, C: CardBackend> fmt::Debug for Connection<U, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("path", &self.path)
            .field("application", &self.application)
            .field("open", &self.channel.is_some())
            .finish()
    }
}

impl<U: Backend, C: CardBackend> Connection<U, C> {
    pub(crate) fn hid(
        path: String,
        application: Application,
        response_timeout: Duration,
        backend: U,
        handle: U::Handle,
        interfaces: Vec<U::Interface>,
    ) -> Self {
        Connection {
            path,
            application,
            response_timeout,
            channel: Some(Channel::Hid {
                backend,
                handle,
                interfaces,
            }),
        }
    }

    pub(crate) fn smart_card(
        path: String,
        application: Application,
        response_timeout: Duration,
        backend: C,
        card: C::Card,
    ) -> Self {
        Connection {
            path,
            application,
            response_timeout,
            channel: Some(Channel::SmartCard { backend, card }),
        }
    }

    pub fn application(&self) -> Application {
        self.application
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    /// Sends `command` and waits for its answer.
    ///
    /// Transport failures are errors; a command the application turns down
    /// comes back as a failed [`Response`].
    pub fn send<K: Command>(&mut self, command: &K) -> Result<Response<K::Data>, SessionError> {
        if command.application() != self.application {
            return Err(SessionError::CommandNotSupported(self.application));
        }
        let timeout = self.response_timeout;
        let channel = self.channel.as_mut().ok_or(SessionError::ConnectionClosed)?;

        match (channel, command.request()) {
            (Channel::SmartCard { backend, card }, Request::Apdu(apdu)) => {
                let response = smartcard::exchange(backend, card, &apdu)?;
                if !response.is_success() {
                    debug!("{} rejected the command with {}", self.path, response.status);
                    return Ok(Response::failed(ResponseStatus::Failed(response.status)));
                }
                command.parse(&response.data).map(Response::success)
            }
            (
                Channel::Hid {
                    backend, handle, ..
                },
                Request::Frame {
                    frame,
                    response_len,
                },
            ) => {
                let mut buf = [0; REPORT_SIZE];
                backend.wait(
                    handle,
                    |f| !f.contains(Flags::SLOT_WRITE_FLAG),
                    &mut buf,
                    timeout,
                )?;
                backend.write_frame(handle, &frame, timeout)?;

                let mut response = [0; RESPONSE_SIZE];
                let read = match backend.read_response(handle, &mut response, timeout) {
                    Ok(read) => read,
                    Err(TransportError::Timeout) => {
                        debug!("{} did not answer slot {:#04x}", self.path, frame.slot());
                        return Ok(Response::failed(ResponseStatus::NoData));
                    }
                    Err(e) => return Err(e.into()),
                };

                let checked = response_len + CRC_SIZE;
                if read < checked || crc16(&response[..checked]) != CRC_RESIDUAL_OK {
                    return Err(TransportError::WrongCrc.into());
                }
                command.parse(&response[..response_len]).map(Response::success)
            }
            (
                Channel::Hid {
                    backend, handle, ..
                },
                Request::ReadStatus,
            ) => {
                let mut report = [0; REPORT_SIZE];
                backend.read(handle, &mut report)?;
                command
                    .parse(&report[1..REPORT_SIZE - 1])
                    .map(Response::success)
            }
            _ => Err(SessionError::CommandNotSupported(self.application)),
        }
    }

    /// Releases the channel. Calling it again, or after a failed send, is a
    /// no-op apart from a logged warning if the release itself fails.
    pub fn close(&mut self) {
        match self.channel.take() {
            Some(Channel::Hid {
                backend,
                handle,
                interfaces,
            }) => {
                if let Err(e) = backend.close_device(handle, interfaces) {
                    warn!("releasing {} failed: {}", self.path, e);
                }
            }
            Some(Channel::SmartCard { backend, card }) => {
                if let Err(e) = backend.disconnect(card) {
                    warn!("disconnecting {} failed: {}", self.path, e);
                }
            }
            None => return,
        }
        debug!("closed {} connection to {}", self.application, self.path);
    }
}

impl<U: Backend, C: CardBackend> Drop for Connection<U, C> {
    fn drop(&mut self) {
        self.close();
    }
}
