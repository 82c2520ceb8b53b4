#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use yubikey_session::application::PIV_AID;
use yubikey_session::config::Config;
use yubikey_session::error::TransportError;
use yubikey_session::smartcard::CardBackend;
use yubikey_session::usb::{
    Backend, UsbDevice, FRAME_SIZE, PAYLOAD_SIZE, REPORT_SIZE, SEQUENCE_MASK, WRITE_RESET_PAYLOAD,
};

pub const YUBICO: u16 = 0x1050;
pub const OTP_CCID: u16 = 0x0405;
pub const OTP_FIDO_CCID: u16 = 0x0407;
pub const FIDO_ONLY: u16 = 0x0402;

const SLOT_WRITE_FLAG: u8 = 0x80;
const RESP_PENDING: u8 = 0x40;
const SLOT_DEVICE_SERIAL: u8 = 0x10;

pub fn config() -> Config {
    Config::default().with_response_timeout(Duration::from_millis(20))
}

fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xffff;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            let carry = crc & 1;
            crc >>= 1;
            if carry != 0 {
                crc ^= 0x8408;
            }
        }
    }
    crc
}

/// The OTP side of a key: answers slot frames over feature reports.
#[derive(Debug, Clone)]
pub struct FakeOtpKey {
    pub serial: Option<u32>,
    pub version: [u8; 3],
    pub pgm_seq: u8,
    pub touch_level: u16,
    pub corrupt: bool,
    pub present: bool,
    /// Keeps the write flag raised once the host resets the write state.
    pub stuck_after_reset: bool,
    busy: bool,
    frame: [u8; FRAME_SIZE],
    outgoing: VecDeque<[u8; REPORT_SIZE]>,
}

impl FakeOtpKey {
    pub fn new(serial: Option<u32>) -> Self {
        FakeOtpKey {
            serial,
            version: [5, 4, 3],
            pgm_seq: 1,
            touch_level: 0x01,
            corrupt: false,
            present: true,
            stuck_after_reset: false,
            busy: false,
            frame: [0; FRAME_SIZE],
            outgoing: VecDeque::new(),
        }
    }

    fn status_report(&self) -> [u8; REPORT_SIZE] {
        let touch = self.touch_level.to_le_bytes();
        [
            0,
            self.version[0],
            self.version[1],
            self.version[2],
            self.pgm_seq,
            touch[0],
            touch[1],
            if self.busy { SLOT_WRITE_FLAG } else { 0 },
        ]
    }

    fn receive(&mut self, packet: &[u8]) {
        if packet == &WRITE_RESET_PAYLOAD[..] {
            self.outgoing.clear();
            self.busy = self.stuck_after_reset;
            return;
        }

        let seq = (packet[REPORT_SIZE - 1] & SEQUENCE_MASK) as usize;
        let start = seq * (REPORT_SIZE - 1);
        self.frame[start..start + REPORT_SIZE - 1].copy_from_slice(&packet[..REPORT_SIZE - 1]);
        if start + REPORT_SIZE - 1 == FRAME_SIZE {
            let frame = std::mem::replace(&mut self.frame, [0; FRAME_SIZE]);
            self.process(&frame);
        }
    }

    fn process(&mut self, frame: &[u8; FRAME_SIZE]) {
        let crc = u16::from_le_bytes([frame[PAYLOAD_SIZE + 1], frame[PAYLOAD_SIZE + 2]]);
        if crc != crc16(&frame[..PAYLOAD_SIZE]) || frame[PAYLOAD_SIZE] != SLOT_DEVICE_SERIAL {
            return;
        }
        let serial = match self.serial {
            Some(serial) => serial,
            None => return,
        };

        let mut data = serial.to_be_bytes().to_vec();
        let crc = !crc16(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        if self.corrupt {
            data[0] ^= 0xff;
        }

        let mut report = [0; REPORT_SIZE];
        report[..data.len()].copy_from_slice(&data);
        report[REPORT_SIZE - 1] = RESP_PENDING;
        self.outgoing.push_back(report);

        let mut wrapped = [0; REPORT_SIZE];
        wrapped[REPORT_SIZE - 1] = RESP_PENDING;
        self.outgoing.push_back(wrapped);
    }
}

#[derive(Debug, Default)]
pub struct UsbState {
    pub devices: Vec<(UsbDevice, FakeOtpKey)>,
    pub unavailable: bool,
    pub opened: usize,
    pub closed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FakeUsb {
    pub state: Rc<RefCell<UsbState>>,
}

impl FakeUsb {
    pub fn with_key(self, address_id: u8, product_id: u16, name: &str, key: FakeOtpKey) -> Self {
        let device = UsbDevice {
            name: Some(name.to_string()),
            vendor_id: YUBICO,
            product_id,
            bus_id: 1,
            address_id,
        };
        self.state.borrow_mut().devices.push((device, key));
        self
    }

    pub fn unplug(&self, address_id: u8) {
        for (device, key) in self.state.borrow_mut().devices.iter_mut() {
            if device.address_id == address_id {
                key.present = false;
            }
        }
    }

    pub fn opened(&self) -> usize {
        self.state.borrow().opened
    }

    pub fn closed(&self) -> usize {
        self.state.borrow().closed
    }

    fn with_present_key<T>(
        &self,
        handle: &(u8, u8),
        error: TransportError,
        f: impl FnOnce(&mut FakeOtpKey) -> T,
    ) -> Result<T, TransportError> {
        let mut state = self.state.borrow_mut();
        match state
            .devices
            .iter_mut()
            .find(|(device, key)| (device.bus_id, device.address_id) == *handle && key.present)
        {
            Some((_, key)) => Ok(f(key)),
            None => Err(error),
        }
    }
}

impl Backend for FakeUsb {
    type Handle = (u8, u8);
    type Interface = u8;

    fn new(_config: &Config) -> Result<Self, TransportError> {
        Ok(FakeUsb::default())
    }

    fn list_devices(&self) -> Result<Vec<UsbDevice>, TransportError> {
        let state = self.state.borrow();
        if state.unavailable {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no USB access").into());
        }
        Ok(state
            .devices
            .iter()
            .filter(|(_, key)| key.present)
            .map(|(device, _)| device.clone())
            .collect())
    }

    fn open_device(&self, bus_id: u8, address_id: u8) -> Result<((u8, u8), Vec<u8>), TransportError> {
        let handle = (bus_id, address_id);
        self.with_present_key(&handle, TransportError::DeviceNotFound, |_| ())?;
        self.state.borrow_mut().opened += 1;
        Ok((handle, vec![0]))
    }

    fn close_device(&self, handle: (u8, u8), _interfaces: Vec<u8>) -> Result<(), TransportError> {
        self.state.borrow_mut().closed += 1;
        self.with_present_key(&handle, TransportError::DeviceNotFound, |_| ())
    }

    fn read(&self, handle: &mut (u8, u8), buf: &mut [u8]) -> Result<usize, TransportError> {
        let report = self.with_present_key(handle, TransportError::CanNotReadFromDevice, |key| {
            key.outgoing.pop_front().unwrap_or_else(|| key.status_report())
        })?;
        buf.copy_from_slice(&report);
        Ok(REPORT_SIZE)
    }

    fn raw_write(&self, handle: &mut (u8, u8), packet: &[u8]) -> Result<(), TransportError> {
        self.with_present_key(handle, TransportError::CanNotWriteToDevice, |key| key.receive(packet))
    }
}

/// The PIV side of a key, behind a PC/SC reader.
#[derive(Debug, Clone)]
pub struct FakePiv {
    pub version: Option<[u8; 3]>,
    pub has_piv: bool,
    pub chained: bool,
    pub present: bool,
    pending: Vec<u8>,
}

impl FakePiv {
    pub fn new(version: Option<[u8; 3]>) -> Self {
        FakePiv {
            version,
            has_piv: true,
            chained: false,
            present: true,
            pending: Vec::new(),
        }
    }

    fn answer(&mut self, apdu: &[u8]) -> Vec<u8> {
        match apdu[1] {
            0xa4 if self.has_piv && apdu.len() > 5 && apdu[5..] == PIV_AID => vec![0x90, 0x00],
            0xa4 => vec![0x6a, 0x82],
            0xfd => match self.version {
                Some(version) if self.chained => {
                    self.pending = version[2..].to_vec();
                    vec![version[0], version[1], 0x61, self.pending.len() as u8]
                }
                Some(version) => vec![version[0], version[1], version[2], 0x90, 0x00],
                None => vec![0x6d, 0x00],
            },
            0xc0 => {
                let mut response = std::mem::take(&mut self.pending);
                response.extend_from_slice(&[0x90, 0x00]);
                response
            }
            _ => vec![0x6d, 0x00],
        }
    }
}

#[derive(Debug, Default)]
pub struct CardState {
    pub readers: Vec<(String, FakePiv)>,
    pub unavailable: bool,
    pub connected: usize,
    pub disconnected: usize,
    pub sent: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeCard {
    pub state: Rc<RefCell<CardState>>,
}

impl FakeCard {
    pub fn with_reader(self, name: &str, piv: FakePiv) -> Self {
        self.state.borrow_mut().readers.push((name.to_string(), piv));
        self
    }

    pub fn unavailable(self) -> Self {
        self.state.borrow_mut().unavailable = true;
        self
    }

    pub fn unplug(&self, name: &str) {
        for (reader, piv) in self.state.borrow_mut().readers.iter_mut() {
            if reader == name {
                piv.present = false;
            }
        }
    }

    pub fn connected(&self) -> usize {
        self.state.borrow().connected
    }

    pub fn disconnected(&self) -> usize {
        self.state.borrow().disconnected
    }

    pub fn sent(&self) -> Vec<String> {
        self.state.borrow().sent.iter().map(hex::encode).collect()
    }
}

impl CardBackend for FakeCard {
    type Card = String;

    fn list_readers(&self) -> Result<Vec<String>, TransportError> {
        let state = self.state.borrow();
        if state.unavailable {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no PC/SC service").into());
        }
        Ok(state
            .readers
            .iter()
            .filter(|(_, piv)| piv.present)
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn connect(&self, reader: &str) -> Result<String, TransportError> {
        let mut state = self.state.borrow_mut();
        if !state.readers.iter().any(|(name, piv)| name == reader && piv.present) {
            return Err(TransportError::DeviceNotFound);
        }
        state.connected += 1;
        Ok(reader.to_string())
    }

    fn transmit(&self, card: &mut String, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        let mut state = self.state.borrow_mut();
        state.sent.push(apdu.to_vec());
        match state
            .readers
            .iter_mut()
            .find(|(name, piv)| name == card && piv.present)
        {
            Some((_, piv)) => Ok(piv.answer(apdu)),
            None => Err(TransportError::CanNotReadFromDevice),
        }
    }

    fn disconnect(&self, card: String) -> Result<(), TransportError> {
        let mut state = self.state.borrow_mut();
        state.disconnected += 1;
        if state.readers.iter().any(|(name, piv)| *name == card && piv.present) {
            Ok(())
        } else {
            Err(TransportError::DeviceNotFound)
        }
    }
}
