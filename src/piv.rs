//! Commands of the PIV application.

use crate::apdu::CommandApdu;
use crate::application::Application;
use crate::command::{Command, Request};
use crate::error::SessionError;
use crate::version::Version;

const INS_GET_VERSION: u8 = 0xfd;

/// Reads the firmware version from the PIV application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VersionCommand;

impl Command for VersionCommand {
    type Data = Version;

    fn application(&self) -> Application {
        Application::Piv
    }

    fn request(&self) -> Request {
        Request::Apdu(CommandApdu::new(0x00, INS_GET_VERSION, 0x00, 0x00))
    }

    fn parse(&self, payload: &[u8]) -> Result<Version, SessionError> {
        match payload {
            [major, minor, patch, ..] => Ok(Version::new(*major, *minor, *patch)),
            _ => Err(SessionError::MalformedResponse(format!(
                "version needs 3 bytes, got {}",
                payload.len()
            ))),
        }
    }
}
