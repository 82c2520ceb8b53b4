//! Short ISO 7816-4 APDUs, as far as the PIV commands of this crate need them.

use std::fmt;

use crate::error::TransportError;

/// Trailing status word of a response APDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord(pub u16);

impl StatusWord {
    pub const SUCCESS: StatusWord = StatusWord(0x9000);
    pub const WRONG_LENGTH: StatusWord = StatusWord(0x6700);
    pub const SECURITY_STATUS_NOT_SATISFIED: StatusWord = StatusWord(0x6982);
    pub const FILE_NOT_FOUND: StatusWord = StatusWord(0x6a82);
    pub const INS_NOT_SUPPORTED: StatusWord = StatusWord(0x6d00);
    pub const CLA_NOT_SUPPORTED: StatusWord = StatusWord(0x6e00);

    pub const fn from_bytes(sw1: u8, sw2: u8) -> Self {
        StatusWord(((sw1 as u16) << 8) | sw2 as u16)
    }

    pub const fn sw1(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub const fn sw2(self) -> u8 {
        self.0 as u8
    }

    pub const fn is_success(self) -> bool {
        self.0 == 0x9000
    }

    /// `61xx`: more response data can be fetched with GET RESPONSE.
    pub const fn bytes_available(self) -> Option<u8> {
        if self.sw1() == 0x61 {
            Some(self.sw2())
        } else {
            None
        }
    }

    /// `6Cxx`: the command must be repeated with `Le` set to `xx`.
    pub const fn correct_le(self) -> Option<u8> {
        if self.sw1() == 0x6c {
            Some(self.sw2())
        } else {
            None
        }
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

const INS_SELECT: u8 = 0xa4;
const INS_GET_RESPONSE: u8 = 0xc0;

/// A command APDU in short form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandApdu {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
    /// Expected response length, `Some(0)` meaning 256 bytes.
    pub le: Option<u8>,
}

impl CommandApdu {
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        CommandApdu {
            cla,
            ins,
            p1,
            p2,
            data: Vec::new(),
            le: None,
        }
    }

    /// Maximum command data of a short APDU.
    pub const MAX_DATA_LEN: usize = 255;

    /// # Panics
    ///
    /// When `data` exceeds [`MAX_DATA_LEN`](Self::MAX_DATA_LEN); extended
    /// length APDUs are not supported.
    pub fn with_data(mut self, data: &[u8]) -> Self {
        assert!(
            data.len() <= Self::MAX_DATA_LEN,
            "short APDU data is limited to {} bytes, got {}",
            Self::MAX_DATA_LEN,
            data.len()
        );
        self.data = data.to_vec();
        self
    }

    pub fn with_le(mut self, le: u8) -> Self {
        self.le = Some(le);
        self
    }

    /// SELECT by application identifier.
    pub fn select(aid: &[u8]) -> Self {
        CommandApdu::new(0x00, INS_SELECT, 0x04, 0x00).with_data(aid)
    }

    pub fn get_response(le: u8) -> Self {
        CommandApdu::new(0x00, INS_GET_RESPONSE, 0x00, 0x00).with_le(le)
    }

    /// # Panics
    ///
    /// When `data` was set directly to more than
    /// [`MAX_DATA_LEN`](Self::MAX_DATA_LEN) bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        assert!(self.data.len() <= Self::MAX_DATA_LEN);
        let mut bytes = Vec::with_capacity(5 + self.data.len() + 1);
        bytes.extend_from_slice(&[self.cla, self.ins, self.p1, self.p2]);
        if !self.data.is_empty() {
            bytes.push(self.data.len() as u8);
            bytes.extend_from_slice(&self.data);
        }
        if let Some(le) = self.le {
            bytes.push(le);
        }
        bytes
    }
}

/// A response APDU split into data and status word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseApdu {
    pub data: Vec<u8>,
    pub status: StatusWord,
}

impl ResponseApdu {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransportError> {
        if bytes.len() < 2 {
            return Err(TransportError::ShortResponse(bytes.len()));
        }
        let (data, sw) = bytes.split_at(bytes.len() - 2);
        Ok(ResponseApdu {
            data: data.to_vec(),
            status: StatusWord::from_bytes(sw[0], sw[1]),
        })
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_encoding() {
        let apdu = CommandApdu::select(&crate::application::PIV_AID);
        assert_eq!(hex::encode(apdu.to_bytes()), "00a4040005a000000308");
    }

    #[test]
    fn test_case_1_and_2_encoding() {
        assert_eq!(hex::encode(CommandApdu::new(0x00, 0xfd, 0x00, 0x00).to_bytes()), "00fd0000");
        assert_eq!(hex::encode(CommandApdu::get_response(0x10).to_bytes()), "00c0000010");
    }

    #[test]
    fn test_parse_response() {
        let response = ResponseApdu::from_bytes(&hex::decode("0504039000").unwrap()).unwrap();
        assert_eq!(response.data, vec![5, 4, 3]);
        assert!(response.is_success());

        let response = ResponseApdu::from_bytes(&[0x6a, 0x82]).unwrap();
        assert!(response.data.is_empty());
        assert_eq!(response.status, StatusWord::FILE_NOT_FOUND);
        assert!(!response.is_success());
    }

    #[test]
    fn test_parse_short_response() {
        assert!(matches!(
            ResponseApdu::from_bytes(&[0x90]),
            Err(TransportError::ShortResponse(1))
        ));
    }

    #[test]
    fn test_status_word_helpers() {
        assert_eq!(StatusWord(0x6110).bytes_available(), Some(0x10));
        assert_eq!(StatusWord(0x6c03).correct_le(), Some(0x03));
        assert_eq!(StatusWord::SUCCESS.bytes_available(), None);
        assert_eq!(StatusWord::INS_NOT_SUPPORTED.to_string(), "6D00");
    }

    #[test]
    fn test_longest_short_apdu() {
        let apdu = CommandApdu::new(0x00, 0xdb, 0x3f, 0xff).with_data(&[0xaa; 255]);
        let bytes = apdu.to_bytes();
        assert_eq!(bytes.len(), 4 + 1 + 255);
        assert_eq!(bytes[4], 0xff);
    }

    #[test]
    #[should_panic]
    fn test_data_beyond_short_apdu_is_refused() {
        let _ = CommandApdu::new(0x00, 0xdb, 0x3f, 0xff).with_data(&[0xaa; 256]);
    }
}
