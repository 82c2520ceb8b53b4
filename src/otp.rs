//! Commands of the OTP application.

use crate::application::Application;
use crate::command::{Command, Request};
use crate::error::SessionError;
use crate::usb::{Frame, PAYLOAD_SIZE};
use crate::version::Version;

/// Slot command returning the serial number.
pub const SLOT_DEVICE_SERIAL: u8 = 0x10;

const SERIAL_SIZE: usize = 4;

const CONFIG1_VALID: u16 = 0x01;
const CONFIG2_VALID: u16 = 0x02;

/// Reads the serial number over the HID keyboard interface.
///
/// Keys configured to hide their serial do not answer; the response then
/// carries [`ResponseStatus::NoData`](crate::ResponseStatus::NoData).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GetSerialNumberCommand;

impl Command for GetSerialNumberCommand {
    type Data = u32;

    fn application(&self) -> Application {
        Application::Otp
    }

    fn request(&self) -> Request {
        Request::Frame {
            frame: Frame::new([0; PAYLOAD_SIZE], SLOT_DEVICE_SERIAL),
            response_len: SERIAL_SIZE,
        }
    }

    fn parse(&self, payload: &[u8]) -> Result<u32, SessionError> {
        if payload.len() < SERIAL_SIZE {
            return Err(SessionError::MalformedResponse(format!(
                "serial needs {} bytes, got {}",
                SERIAL_SIZE,
                payload.len()
            )));
        }
        let s = structure!(">I");
        let (serial,) = s
            .unpack(&payload[..SERIAL_SIZE])
            .map_err(|e| SessionError::MalformedResponse(e.to_string()))?;
        Ok(serial)
    }
}

/// The two configuration slots of the OTP application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Slot1,
    Slot2,
}

/// Content of the HID status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub version: Version,
    /// Programming sequence, zero when no slot was ever written.
    pub pgm_seq: u8,
    pub touch_level: u16,
}

impl Status {
    pub fn is_configured(&self, slot: Slot) -> bool {
        if self.pgm_seq == 0 {
            return false;
        }

        match slot {
            Slot::Slot1 => self.touch_level & CONFIG1_VALID != 0,
            Slot::Slot2 => self.touch_level & CONFIG2_VALID != 0,
        }
    }
}

/// Reads the status report: firmware version and slot configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GetStatusCommand;

impl Command for GetStatusCommand {
    type Data = Status;

    fn application(&self) -> Application {
        Application::Otp
    }

    fn request(&self) -> Request {
        Request::ReadStatus
    }

    fn parse(&self, payload: &[u8]) -> Result<Status, SessionError> {
        let s = structure!("<BBBBH");
        let (major, minor, patch, pgm_seq, touch_level) = s
            .unpack(payload)
            .map_err(|e| SessionError::MalformedResponse(e.to_string()))?;
        Ok(Status {
            version: Version::new(major, minor, patch),
            pgm_seq,
            touch_level,
        })
    }
}
