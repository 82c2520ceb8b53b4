use bitflags::bitflags;

use crate::application::Application;
use crate::usb::UsbDevice;

/// USB vendor ID assigned to Yubico.
pub const VENDOR_ID: u16 = 0x1050;

bitflags! {
    /// USB interfaces a key exposes, as advertised by its product ID.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        const SMART_CARD = 0x01;
        const HID_FIDO = 0x02;
        const HID_KEYBOARD = 0x04;
    }
}

impl Capabilities {
    /// Interfaces enabled for a Yubico product ID, `None` for products this
    /// crate does not know.
    pub fn from_product_id(product_id: u16) -> Option<Self> {
        let otp = Capabilities::HID_KEYBOARD;
        let fido = Capabilities::HID_FIDO;
        let ccid = Capabilities::SMART_CARD;

        let capabilities = match product_id {
            // YubiKey and YubiKey NEO
            0x0010 | 0x0110 => otp,
            0x0111 => otp | ccid,
            0x0112 => ccid,
            0x0113 => fido,
            0x0114 => otp | fido,
            0x0115 => fido | ccid,
            0x0116 => otp | fido | ccid,
            // Security Key and Gnubby
            0x0120 | 0x0200 => fido,
            // YubiKey 4 and later
            0x0401 => otp,
            0x0402 => fido,
            0x0403 => otp | fido,
            0x0404 => ccid,
            0x0405 => otp | ccid,
            0x0406 => fido | ccid,
            0x0407 => otp | fido | ccid,
            // YubiKey Plus
            0x0410 => otp | fido,
            _ => return None,
        };
        Some(capabilities)
    }
}

/// A YubiKey found by [`SessionClient::enumerate_devices`](crate::SessionClient::enumerate_devices).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub path: String,
    pub name: Option<String>,
    pub product_id: u16,
    pub vendor_id: u16,
    pub bus_id: u8,
    pub address_id: u8,
    pub capabilities: Capabilities,
    /// PC/SC reader the smart-card interface of this key shows up as.
    pub reader: Option<String>,
}

impl Device {
    pub(crate) fn from_usb(usb: UsbDevice, capabilities: Capabilities, reader: Option<String>) -> Self {
        Device {
            path: format!("usb:{:03}:{:03}", usb.bus_id, usb.address_id),
            name: usb.name,
            product_id: usb.product_id,
            vendor_id: usb.vendor_id,
            bus_id: usb.bus_id,
            address_id: usb.address_id,
            capabilities,
            reader,
        }
    }

    pub fn has_smart_card(&self) -> bool {
        self.capabilities.contains(Capabilities::SMART_CARD)
    }

    pub fn has_hid_fido(&self) -> bool {
        self.capabilities.contains(Capabilities::HID_FIDO)
    }

    pub fn has_hid_keyboard(&self) -> bool {
        self.capabilities.contains(Capabilities::HID_KEYBOARD)
    }

    pub fn supports(&self, application: Application) -> bool {
        self.capabilities.contains(application.required_capability())
    }
}

/// Removes and returns the reader that belongs to a key named `product`.
///
/// Readers are named after the product string of the key, e.g.
/// `Yubico YubiKey OTP+FIDO+CCID 00 00` for `YubiKey OTP+FIDO+CCID`, so a
/// reader carrying the product name wins. A named key otherwise only takes a
/// reader that carries none of the attached `products`; a key without a name
/// takes the first reader left, which keeps enumeration order.
pub(crate) fn claim_reader(
    readers: &mut Vec<String>,
    product: Option<&str>,
    products: &[&str],
) -> Option<String> {
    let index = match product {
        Some(product) => readers
            .iter()
            .position(|reader| reader.contains(product))
            .or_else(|| {
                readers.iter().position(|reader| {
                    !products
                        .iter()
                        .any(|other| *other != product && reader.contains(other))
                })
            }),
        None if readers.is_empty() => None,
        None => Some(0),
    }?;

    Some(readers.remove(index))
}
