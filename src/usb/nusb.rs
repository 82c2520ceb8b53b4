use std::time::Duration;

use nusb::transfer::{Control, ControlType, Recipient};
use nusb::{Device, Interface};
use tracing::debug;

use crate::config::Config;
use crate::device::VENDOR_ID;
use crate::error::TransportError;
use crate::usb::{Backend, UsbDevice, HID_GET_REPORT, HID_SET_REPORT, REPORT_SIZE, REPORT_TYPE_FEATURE};

#[derive(Debug, Clone)]
pub struct NusbBackend {
    timeout: Duration,
}

impl NusbBackend {
    fn feature_report(request: u8) -> Control {
        Control {
            control_type: ControlType::Class,
            recipient: Recipient::Interface,
            request,
            value: REPORT_TYPE_FEATURE << 8,
            index: 0,
        }
    }
}

impl Backend for NusbBackend {
    type Handle = Device;
    type Interface = Interface;

    fn new(config: &Config) -> Result<Self, TransportError> {
        Ok(Self {
            timeout: config.usb_timeout,
        })
    }

    fn list_devices(&self) -> Result<Vec<UsbDevice>, TransportError> {
        let devices = nusb::list_devices()?
            .filter(|device_info| device_info.vendor_id() == VENDOR_ID)
            .map(|device_info| UsbDevice {
                name: device_info.product_string().map(str::to_string),
                vendor_id: device_info.vendor_id(),
                product_id: device_info.product_id(),
                bus_id: device_info.bus_number(),
                address_id: device_info.device_address(),
            })
            .collect();
        Ok(devices)
    }

    fn open_device(&self, bus_id: u8, address_id: u8) -> Result<(Device, Vec<Interface>), TransportError> {
        for device_info in nusb::list_devices()? {
            if device_info.bus_number() != bus_id || device_info.device_address() != address_id {
                continue;
            }

            let device = match device_info.open() {
                Ok(d) => d,
                Err(_) => return Err(TransportError::OpenDeviceError),
            };

            let mut interfaces: Vec<Interface> = Vec::new();
            for interface in device_info.interfaces() {
                match device.detach_and_claim_interface(interface.interface_number()) {
                    Ok(interface) => interfaces.push(interface),
                    Err(_) => continue,
                };
            }
            debug!("opened {:03}:{:03}, claimed {} interfaces", bus_id, address_id, interfaces.len());
            return Ok((device, interfaces));
        }

        Err(TransportError::DeviceNotFound)
    }

    fn close_device(&self, _handle: Device, _interfaces: Vec<Interface>) -> Result<(), TransportError> {
        Ok(())
    }

    fn read(&self, handle: &mut Device, buf: &mut [u8]) -> Result<usize, TransportError> {
        assert_eq!(buf.len(), REPORT_SIZE);

        match handle.control_in_blocking(Self::feature_report(HID_GET_REPORT), buf, self.timeout) {
            Ok(r) => Ok(r),
            Err(_) => Err(TransportError::CanNotReadFromDevice),
        }
    }

    fn raw_write(&self, handle: &mut Device, packet: &[u8]) -> Result<(), TransportError> {
        match handle.control_out_blocking(Self::feature_report(HID_SET_REPORT), packet, self.timeout) {
            Ok(bytes_written) if bytes_written == REPORT_SIZE => Ok(()),
            _ => Err(TransportError::CanNotWriteToDevice),
        }
    }
}
