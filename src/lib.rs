#![doc = include_str!("../README.md")]

#[cfg(not(any(feature = "rusb", feature = "nusb", target_os = "windows")))]
compile_error!("Either the rusb or nusb feature must be enabled for this crate");

#[macro_use]
extern crate structure;

pub mod apdu;
pub mod application;
pub mod command;
pub mod config;
pub mod connection;
pub mod device;
pub mod error;
pub mod otp;
pub mod piv;
pub mod report;
mod sec;
pub mod smartcard;
pub mod usb;
pub mod version;

use tracing::{debug, info, warn};

use apdu::CommandApdu;
use application::PIV_AID;
use device::claim_reader;
use error::{SessionError, TransportError};
use smartcard::{CardBackend, PcscBackend};
use usb::{Backend, BackendType};

pub use application::Application;
pub use command::{Command, Response, ResponseStatus};
pub use config::Config;
pub use connection::Connection;
pub use device::{Capabilities, Device};
pub use version::Version;

/// The `Result` type used in this crate.
pub type Result<T> = ::std::result::Result<T, SessionError>;

/// Finds keys and opens application sessions on them.
#[derive(Debug, Clone)]
pub struct SessionClient<U: Backend = BackendType, C: CardBackend = PcscBackend> {
    usb: U,
    card: C,
    config: Config,
}

impl SessionClient {
    /// Creates a client on the platform backends.
    pub fn new(config: Config) -> Result<Self> {
        let usb = BackendType::new(&config).map_err(SessionError::TransportUnavailable)?;
        let card = PcscBackend::new(&config);
        Ok(SessionClient::with_backends(usb, card, config))
    }
}

impl<U: Backend, C: CardBackend> SessionClient<U, C> {
    pub fn with_backends(usb: U, card: C, config: Config) -> Self {
        SessionClient { usb, card, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Lists the keys currently attached, in platform order. Finding none is
    /// not an error.
    pub fn enumerate_devices(&self) -> Result<Vec<Device>> {
        let usb_devices = self
            .usb
            .list_devices()
            .map_err(SessionError::TransportUnavailable)?;
        let mut readers = self.yubikey_readers();

        let known: Vec<_> = usb_devices
            .into_iter()
            .filter_map(|usb_device| match Capabilities::from_product_id(usb_device.product_id) {
                Some(capabilities) => Some((usb_device, capabilities)),
                None => {
                    debug!("skipping unknown product {:#06x}", usb_device.product_id);
                    None
                }
            })
            .collect();
        let names: Vec<String> = known
            .iter()
            .filter(|(_, capabilities)| capabilities.contains(Capabilities::SMART_CARD))
            .filter_map(|(usb_device, _)| usb_device.name.clone())
            .collect();
        let products: Vec<&str> = names.iter().map(String::as_str).collect();

        let mut devices = Vec::new();
        for (usb_device, capabilities) in known {
            let reader = if capabilities.contains(Capabilities::SMART_CARD) {
                claim_reader(&mut readers, usb_device.name.as_deref(), &products)
            } else {
                None
            };
            if capabilities.contains(Capabilities::SMART_CARD) && reader.is_none() {
                debug!("no reader left for {:03}:{:03}", usb_device.bus_id, usb_device.address_id);
            }
            devices.push(Device::from_usb(usb_device, capabilities, reader));
        }

        info!("found {} device(s)", devices.len());
        Ok(devices)
    }

    /// PC/SC readers matching the configured filter. An unreachable PC/SC
    /// service leaves keys without a reader rather than failing enumeration.
    fn yubikey_readers(&self) -> Vec<String> {
        match self.card.list_readers() {
            Ok(readers) => readers
                .into_iter()
                .filter(|reader| self.config.matches_reader(reader))
                .collect(),
            Err(e) => {
                warn!("smart card readers unavailable: {}", e);
                Vec::new()
            }
        }
    }

    /// Opens `application` on `device`.
    pub fn connect(&self, device: &Device, application: Application) -> Result<Connection<U, C>> {
        let failed = |reason: String| SessionError::ConnectionFailed {
            path: device.path.clone(),
            application,
            reason,
        };

        if !device.supports(application) {
            return Err(failed(format!(
                "device does not expose {:?}",
                application.required_capability()
            )));
        }

        match application {
            Application::Piv => {
                let reader = device
                    .reader
                    .as_deref()
                    .ok_or_else(|| failed("no smart card reader for this device".to_string()))?;
                let mut card = self
                    .card
                    .connect(reader)
                    .map_err(|e| failed(e.to_string()))?;

                let selected = smartcard::exchange(&self.card, &mut card, &CommandApdu::select(&PIV_AID));
                let reason = match selected {
                    Ok(response) if response.is_success() => None,
                    Ok(response) => Some(format!("SELECT returned {}", response.status)),
                    Err(e) => Some(e.to_string()),
                };
                if let Some(reason) = reason {
                    if let Err(e) = self.card.disconnect(card) {
                        warn!("disconnecting {} failed: {}", reader, e);
                    }
                    return Err(failed(reason));
                }

                debug!("selected PIV on {}", reader);
                Ok(Connection::smart_card(
                    device.path.clone(),
                    application,
                    self.config.response_timeout,
                    self.card.clone(),
                    card,
                ))
            }
            Application::Otp => {
                let (handle, interfaces) = self
                    .usb
                    .open_device(device.bus_id, device.address_id)
                    .map_err(|e: TransportError| failed(e.to_string()))?;

                debug!("opened OTP on {}", device.path);
                Ok(Connection::hid(
                    device.path.clone(),
                    application,
                    self.config.response_timeout,
                    self.usb.clone(),
                    handle,
                    interfaces,
                ))
            }
        }
    }
}
