use std::fmt;
use std::time::Duration;

use rusb::{request_type, Context, DeviceHandle, Direction, Recipient, RequestType, UsbContext};
use tracing::debug;

use crate::config::Config;
use crate::device::VENDOR_ID;
use crate::error::TransportError;
use crate::usb::{Backend, UsbDevice, HID_GET_REPORT, HID_SET_REPORT, REPORT_SIZE, REPORT_TYPE_FEATURE};

#[derive(Clone)]
pub struct RusbBackend {
    context: Context,
    timeout: Duration,
}

impl fmt::Debug for RusbBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RusbBackend")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Backend for RusbBackend {
    type Handle = DeviceHandle<Context>;
    type Interface = u8;

    fn new(config: &Config) -> Result<Self, TransportError> {
        let context = Context::new()?;
        Ok(Self {
            context,
            timeout: config.usb_timeout,
        })
    }

    fn list_devices(&self) -> Result<Vec<UsbDevice>, TransportError> {
        let mut result = Vec::new();
        for device in self.context.devices()?.iter() {
            let descr = device.device_descriptor()?;
            if descr.vendor_id() != VENDOR_ID {
                continue;
            }

            let name = device
                .open()
                .ok()
                .and_then(|handle| handle.read_product_string_ascii(&descr).ok());
            result.push(UsbDevice {
                name,
                vendor_id: descr.vendor_id(),
                product_id: descr.product_id(),
                bus_id: device.bus_number(),
                address_id: device.address(),
            });
        }
        Ok(result)
    }

    fn open_device(
        &self,
        bus_id: u8,
        address_id: u8,
    ) -> Result<(DeviceHandle<Context>, Vec<u8>), TransportError> {
        let devices = match self.context.devices() {
            Ok(devices) => devices,
            Err(_) => return Err(TransportError::DeviceNotFound),
        };

        for device in devices.iter() {
            if device.bus_number() != bus_id || device.address() != address_id {
                continue;
            }

            let mut handle = match device.open() {
                Ok(handle) => handle,
                Err(_) => return Err(TransportError::OpenDeviceError),
            };
            let config = device.config_descriptor(0)?;

            let mut interfaces = Vec::new();
            for interface in config.interfaces() {
                for usb_int in interface.descriptors() {
                    match handle.kernel_driver_active(usb_int.interface_number()) {
                        Ok(true) => {
                            #[cfg(not(any(target_os = "macos", target_os = "windows")))]
                            handle.detach_kernel_driver(usb_int.interface_number())?;
                        }
                        _ => continue,
                    };

                    if handle.active_configuration()? != config.number() {
                        handle.set_active_configuration(config.number())?;
                    }
                    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
                    {
                        handle.claim_interface(usb_int.interface_number())?;
                        interfaces.push(usb_int.interface_number());
                    }
                }
            }

            debug!("opened {:03}:{:03}, claimed interfaces {:?}", bus_id, address_id, interfaces);
            return Ok((handle, interfaces));
        }

        Err(TransportError::DeviceNotFound)
    }

    #[cfg(any(target_os = "macos", target_os = "windows"))]
    fn close_device(&self, _handle: DeviceHandle<Context>, _interfaces: Vec<u8>) -> Result<(), TransportError> {
        Ok(())
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    fn close_device(&self, mut handle: DeviceHandle<Context>, interfaces: Vec<u8>) -> Result<(), TransportError> {
        for interface in interfaces {
            handle.release_interface(interface)?;
            handle.attach_kernel_driver(interface)?;
        }
        Ok(())
    }

    fn read(&self, handle: &mut DeviceHandle<Context>, buf: &mut [u8]) -> Result<usize, TransportError> {
        assert_eq!(buf.len(), REPORT_SIZE);
        let reqtype = request_type(Direction::In, RequestType::Class, Recipient::Interface);
        let value = REPORT_TYPE_FEATURE << 8;
        Ok(handle.read_control(reqtype, HID_GET_REPORT, value, 0, buf, self.timeout)?)
    }

    fn raw_write(&self, handle: &mut DeviceHandle<Context>, packet: &[u8]) -> Result<(), TransportError> {
        let reqtype = request_type(Direction::Out, RequestType::Class, Recipient::Interface);
        let value = REPORT_TYPE_FEATURE << 8;
        if handle.write_control(reqtype, HID_SET_REPORT, value, 0, packet, self.timeout)? != REPORT_SIZE {
            Err(TransportError::CanNotWriteToDevice)
        } else {
            Ok(())
        }
    }
}
