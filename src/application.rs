use std::fmt;

use crate::device::Capabilities;

/// AID of the PIV application.
pub const PIV_AID: [u8; 5] = [0xa0, 0x00, 0x00, 0x03, 0x08];

/// Applications a connection can be scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Application {
    /// Personal Identity Verification, reached over the smart-card interface.
    Piv,
    /// One-time password application, reached over the HID keyboard interface.
    Otp,
}

impl Application {
    /// The USB interface a device must expose for this application.
    pub fn required_capability(self) -> Capabilities {
        match self {
            Application::Piv => Capabilities::SMART_CARD,
            Application::Otp => Capabilities::HID_KEYBOARD,
        }
    }
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Application::Piv => write!(f, "PIV"),
            Application::Otp => write!(f, "OTP"),
        }
    }
}
