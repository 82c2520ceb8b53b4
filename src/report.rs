//! The per-device summary printed by `ykinfo`.

use std::io::Write;

use tracing::error;

use crate::error::SessionError;
use crate::otp::GetSerialNumberCommand;
use crate::piv::VersionCommand;
use crate::smartcard::CardBackend;
use crate::usb::Backend;
use crate::{Application, Device, Result, SessionClient};

/// Writes one block per attached key: a header line, the PIV firmware
/// version and the OTP serial number. Returns the number of keys described
/// in full.
///
/// A key that cannot be connected to is logged and skipped; a command the key
/// answers with a failure aborts the report.
pub fn write_report<U: Backend, C: CardBackend, W: Write>(
    client: &SessionClient<U, C>,
    out: &mut W,
) -> Result<usize> {
    let mut described = 0;
    for (i, device) in client.enumerate_devices()?.iter().enumerate() {
        writeln!(
            out,
            "YubiKey #{} [ Path: {} HasSmartCard: {} HasHidFido: {} HasHidKeyboard: {} ]",
            i,
            device.path,
            flag(device.has_smart_card()),
            flag(device.has_hid_fido()),
            flag(device.has_hid_keyboard())
        )?;

        match describe(client, device, out) {
            Ok(()) => described += 1,
            Err(e @ SessionError::ConnectionFailed { .. }) => error!("{}", e),
            Err(e) => return Err(e),
        }
    }
    Ok(described)
}

/// Capability flags are printed as `True` or `False`.
fn flag(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

fn describe<U: Backend, C: CardBackend, W: Write>(
    client: &SessionClient<U, C>,
    device: &Device,
    out: &mut W,
) -> Result<()> {
    let mut piv = client.connect(device, Application::Piv)?;
    let response = piv.send(&VersionCommand)?;
    response.check()?;
    writeln!(out, "\tFWV   : {}", response.data()?)?;
    piv.close();

    let mut otp = client.connect(device, Application::Otp)?;
    let response = otp.send(&GetSerialNumberCommand)?;
    response.check()?;
    writeln!(out, "\tSerial: {}\n", response.data()?)?;
    otp.close();

    Ok(())
}
