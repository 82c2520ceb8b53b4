//! HID access to the OTP interface of a key.
//!
//! Slot commands travel as 70-byte frames split over 8-byte feature reports:
//! seven data bytes plus a flag byte carrying `SLOT_WRITE_FLAG` and the
//! packet sequence number. The key answers with reports flagged
//! `RESP_PENDING_FLAG` until the sequence wraps back to zero.

use std::thread;
use std::time::{Duration, Instant};

use bitflags::bitflags;
use tracing::debug;

use crate::config::Config;
use crate::error::TransportError;
use crate::sec::crc16;

#[cfg(all(feature = "nusb", not(feature = "rusb"), not(target_os = "windows")))]
mod nusb;
#[cfg(any(feature = "rusb", target_os = "windows"))]
mod rusb;

#[cfg(all(feature = "nusb", not(feature = "rusb"), not(target_os = "windows")))]
pub use self::nusb::NusbBackend;
#[cfg(any(feature = "rusb", target_os = "windows"))]
pub use self::rusb::RusbBackend;

/// The backend picked by the enabled features.
#[cfg(any(feature = "rusb", target_os = "windows"))]
pub type BackendType = RusbBackend;
#[cfg(all(feature = "nusb", not(feature = "rusb"), not(target_os = "windows")))]
pub type BackendType = NusbBackend;

/// The size of the payload carried by a slot frame.
pub const PAYLOAD_SIZE: usize = 64;
/// The size of a whole slot frame: payload, slot, crc and filler.
pub const FRAME_SIZE: usize = 70;
/// The size of a single feature report.
pub const REPORT_SIZE: usize = 8;
/// The size of the buffer a response is collected in.
pub const RESPONSE_SIZE: usize = 36;

pub const HID_GET_REPORT: u8 = 0x01;
pub const HID_SET_REPORT: u8 = 0x09;
pub const REPORT_TYPE_FEATURE: u16 = 0x03;

/// Written to abort a pending response and return the key to idle.
pub const WRITE_RESET_PAYLOAD: [u8; REPORT_SIZE] = [0, 0, 0, 0, 0, 0, 0, 0x8f];

const POLL_INTERVAL: Duration = Duration::from_millis(1);

bitflags! {
    /// Flags in the last byte of a feature report.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u8 {
        const SLOT_WRITE_FLAG = 0x80;
        const RESP_PENDING_FLAG = 0x40;
        const RESP_TIMEOUT_WAIT_FLAG = 0x20;
    }
}

/// Mask of the sequence number carried next to the flags.
pub const SEQUENCE_MASK: u8 = 0x1f;

/// A USB device with the Yubico vendor ID, as listed by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDevice {
    pub name: Option<String>,
    pub vendor_id: u16,
    pub product_id: u16,
    pub bus_id: u8,
    pub address_id: u8,
}

/// A slot command ready to be written to the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: [u8; FRAME_SIZE],
}

impl Frame {
    pub fn new(payload: [u8; PAYLOAD_SIZE], slot: u8) -> Self {
        let mut bytes = [0; FRAME_SIZE];
        bytes[..PAYLOAD_SIZE].copy_from_slice(&payload);
        bytes[PAYLOAD_SIZE] = slot;
        let crc = crc16(&payload);
        bytes[PAYLOAD_SIZE + 1..PAYLOAD_SIZE + 3].copy_from_slice(&crc.to_le_bytes());
        Frame { bytes }
    }

    pub fn slot(&self) -> u8 {
        self.bytes[PAYLOAD_SIZE]
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_SIZE] {
        &self.bytes
    }

    /// The feature reports the frame is written as. All-zero packets other
    /// than the first and the last are skipped; the key zero-fills them.
    pub fn packets(&self) -> Vec<[u8; REPORT_SIZE]> {
        let chunks = self.bytes.chunks(REPORT_SIZE - 1);
        let last = chunks.len() - 1;

        chunks
            .enumerate()
            .filter(|(seq, chunk)| *seq == 0 || *seq == last || chunk.iter().any(|&x| x != 0))
            .map(|(seq, chunk)| {
                let mut packet = [0; REPORT_SIZE];
                packet[..REPORT_SIZE - 1].copy_from_slice(chunk);
                packet[REPORT_SIZE - 1] = Flags::SLOT_WRITE_FLAG.bits() | seq as u8;
                packet
            })
            .collect()
    }
}

/// Raw feature-report access to the OTP interface, implemented per USB
/// library. The provided methods carry the frame protocol on top of it.
pub trait Backend: Clone + Sized {
    type Handle;
    type Interface;

    fn new(config: &Config) -> Result<Self, TransportError>;

    /// Lists the devices carrying the Yubico vendor ID.
    fn list_devices(&self) -> Result<Vec<UsbDevice>, TransportError>;

    fn open_device(
        &self,
        bus_id: u8,
        address_id: u8,
    ) -> Result<(Self::Handle, Vec<Self::Interface>), TransportError>;

    fn close_device(
        &self,
        handle: Self::Handle,
        interfaces: Vec<Self::Interface>,
    ) -> Result<(), TransportError>;

    /// Reads one feature report into an 8-byte buffer.
    fn read(&self, handle: &mut Self::Handle, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Writes one 8-byte feature report.
    fn raw_write(&self, handle: &mut Self::Handle, packet: &[u8]) -> Result<(), TransportError>;

    /// Polls feature reports into `buf` until `f` accepts their flags.
    fn wait<F: Fn(Flags) -> bool>(
        &self,
        handle: &mut Self::Handle,
        f: F,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            self.read(handle, buf)?;
            let flags = Flags::from_bits_truncate(buf[REPORT_SIZE - 1]);
            if f(flags) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(TransportError::Timeout);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn write_frame(
        &self,
        handle: &mut Self::Handle,
        frame: &Frame,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let mut buf = [0; REPORT_SIZE];
        for packet in frame.packets() {
            self.wait(
                handle,
                |f| !f.contains(Flags::SLOT_WRITE_FLAG),
                &mut buf,
                timeout,
            )?;
            self.raw_write(handle, &packet)?;
        }
        debug!("wrote frame for slot {:#04x}", frame.slot());
        Ok(())
    }

    /// Reset the write state after a read.
    fn write_reset(&self, handle: &mut Self::Handle, timeout: Duration) -> Result<(), TransportError> {
        self.raw_write(handle, &WRITE_RESET_PAYLOAD)?;
        let mut buf = [0; REPORT_SIZE];
        self.wait(
            handle,
            |f| !f.contains(Flags::SLOT_WRITE_FLAG),
            &mut buf,
            timeout,
        )?;
        Ok(())
    }

    /// Collects the response to the last frame, returning the number of data
    /// bytes gathered in `response`. `Timeout` means the key never answered;
    /// a key stuck after the trailing reset gives `ResetTimeout`.
    fn read_response(
        &self,
        handle: &mut Self::Handle,
        response: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        let mut r0 = 0;
        self.wait(
            handle,
            |f| f.contains(Flags::RESP_PENDING_FLAG),
            &mut response[..REPORT_SIZE],
            timeout,
        )?;
        r0 += REPORT_SIZE - 1;
        while r0 + REPORT_SIZE <= response.len() {
            if self.read(handle, &mut response[r0..r0 + REPORT_SIZE])? < REPORT_SIZE {
                break;
            }
            let flags = Flags::from_bits_truncate(response[r0 + REPORT_SIZE - 1]);
            if flags.contains(Flags::RESP_PENDING_FLAG) {
                let seq = response[r0 + REPORT_SIZE - 1] & SEQUENCE_MASK;
                if seq == 0 {
                    // The sequence wrapped: everything has been read.
                    break;
                }
            } else {
                break;
            }
            r0 += REPORT_SIZE - 1;
        }
        self.write_reset(handle, timeout).map_err(|e| match e {
            TransportError::Timeout => TransportError::ResetTimeout,
            e => e,
        })?;
        Ok(r0)
    }
}
