//! Smart-card access through the platform PC/SC service.

use std::ffi::CString;

use pcsc::{Card, Context, Disposition, Protocols, MAX_BUFFER_SIZE};
use tracing::debug;

use crate::apdu::{CommandApdu, ResponseApdu};
use crate::config::{Config, Scope, ShareMode};
use crate::error::TransportError;

/// Raw APDU exchange with the cards behind named readers.
pub trait CardBackend: Clone + Sized {
    type Card;

    /// Names of the readers currently attached. No readers is not an error.
    fn list_readers(&self) -> Result<Vec<String>, TransportError>;

    fn connect(&self, reader: &str) -> Result<Self::Card, TransportError>;

    /// Sends one command APDU and returns the raw response, status word
    /// included.
    fn transmit(&self, card: &mut Self::Card, apdu: &[u8]) -> Result<Vec<u8>, TransportError>;

    fn disconnect(&self, card: Self::Card) -> Result<(), TransportError>;
}

/// Sends `command`, following `61xx` with GET RESPONSE and repeating the
/// command on `6Cxx` with the length the card asked for.
pub fn exchange<C: CardBackend>(
    backend: &C,
    card: &mut C::Card,
    command: &CommandApdu,
) -> Result<ResponseApdu, TransportError> {
    let mut response = ResponseApdu::from_bytes(&backend.transmit(card, &command.to_bytes())?)?;

    if let Some(le) = response.status.correct_le() {
        let retry = command.clone().with_le(le);
        response = ResponseApdu::from_bytes(&backend.transmit(card, &retry.to_bytes())?)?;
    }

    let mut data = std::mem::take(&mut response.data);
    while let Some(available) = response.status.bytes_available() {
        debug!("fetching {} more response bytes", available);
        let next = CommandApdu::get_response(available);
        response = ResponseApdu::from_bytes(&backend.transmit(card, &next.to_bytes())?)?;
        data.append(&mut response.data);
    }

    debug!("APDU {:02x}{:02x} -> {}", command.cla, command.ins, response.status);
    Ok(ResponseApdu {
        data,
        status: response.status,
    })
}

#[derive(Debug, Clone)]
pub struct PcscBackend {
    scope: Scope,
    share_mode: ShareMode,
}

impl PcscBackend {
    pub fn new(config: &Config) -> Self {
        PcscBackend {
            scope: config.scope,
            share_mode: config.share_mode,
        }
    }

    fn context(&self) -> Result<Context, TransportError> {
        Ok(Context::establish(self.scope.into())?)
    }
}

impl CardBackend for PcscBackend {
    type Card = Card;

    fn list_readers(&self) -> Result<Vec<String>, TransportError> {
        let readers = match self.context()?.list_readers_owned() {
            Ok(readers) => readers,
            Err(pcsc::Error::NoReadersAvailable) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(readers
            .into_iter()
            .map(|reader| reader.to_string_lossy().into_owned())
            .collect())
    }

    fn connect(&self, reader: &str) -> Result<Card, TransportError> {
        let reader = CString::new(reader).map_err(|_| TransportError::DeviceNotFound)?;
        match self
            .context()?
            .connect(&reader, self.share_mode.into(), Protocols::ANY)
        {
            Ok(card) => Ok(card),
            Err(pcsc::Error::NoSmartcard) | Err(pcsc::Error::UnknownReader) => {
                Err(TransportError::DeviceNotFound)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn transmit(&self, card: &mut Card, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        let mut buf = [0; MAX_BUFFER_SIZE];
        let response = card.transmit(apdu, &mut buf)?;
        Ok(response.to_vec())
    }

    fn disconnect(&self, card: Card) -> Result<(), TransportError> {
        card.disconnect(Disposition::LeaveCard)
            .map_err(|(_, e)| TransportError::from(e))
    }
}
