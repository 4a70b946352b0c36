//! USB bulk transport.
//!
//! Some thermal printers of this family enumerate as a plain USB device with
//! a single bulk OUT endpoint. [`UsbTransport`] implements [`std::io::Write`]
//! so it plugs straight into the printer driver.

use log::{debug, info};
use rusb::{Context, Device, DeviceDescriptor, DeviceHandle, Direction, TransferType, UsbContext};
use std::{io, time::Duration};

use crate::error::Error;

#[derive(Debug, Clone, Copy)]
struct Endpoint {
    iface: u8,
    setting: u8,
    address: u8,
}

pub struct UsbTransport {
    handle: DeviceHandle<Context>,
    endpoint_out: Endpoint,
    timeout: Duration,
}

impl UsbTransport {
    /// Open the first device matching `vid`/`pid`, and `serial` when given.
    pub fn open(vid: u16, pid: u16, serial: Option<&str>) -> Result<Self, Error> {
        let context = Context::new()?;
        let (device, device_desc, mut handle) = Self::open_device(&context, vid, pid, serial)?;

        let endpoint_out = match Self::find_endpoint(&device, &device_desc, Direction::Out) {
            Some(endpoint) => endpoint,
            None => return Err(Error::MissingEndpoint),
        };

        handle.set_auto_detach_kernel_driver(true).ok();
        let has_kernel_driver = matches!(handle.kernel_driver_active(endpoint_out.iface), Ok(true));
        info!("Kernel driver support is {}", has_kernel_driver);
        handle.claim_interface(endpoint_out.iface)?;
        handle.set_alternate_setting(endpoint_out.iface, endpoint_out.setting)?;

        Ok(UsbTransport {
            handle,
            endpoint_out,
            timeout: Duration::from_secs(10),
        })
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn open_device(
        context: &Context,
        vid: u16,
        pid: u16,
        serial: Option<&str>,
    ) -> Result<(Device<Context>, DeviceDescriptor, DeviceHandle<Context>), Error> {
        let devices = context.devices()?;

        for device in devices.iter() {
            let device_desc = match device.device_descriptor() {
                Ok(d) => d,
                Err(err) => {
                    debug!("{:?}", err);
                    continue;
                }
            };

            if device_desc.vendor_id() != vid || device_desc.product_id() != pid {
                continue;
            }

            let handle = match device.open() {
                Ok(handle) => handle,
                Err(err) => {
                    debug!("Failed to open device: {:?}", err);
                    continue;
                }
            };

            let wanted = match serial {
                Some(wanted) => wanted,
                None => return Ok((device, device_desc, handle)),
            };

            let timeout = Duration::from_secs(1);
            let languages = handle.read_languages(timeout)?;
            let language = match languages.first() {
                Some(language) => *language,
                None => continue,
            };
            match handle.read_serial_number_string(language, &device_desc, timeout) {
                Ok(s) if s == wanted => return Ok((device, device_desc, handle)),
                Ok(_) => continue,
                Err(err) => {
                    debug!("Failed to read serial number string: {:?}", err);
                    continue;
                }
            }
        }
        debug!("No device {:04x}:{:04x} with serial {:?}", vid, pid, serial);
        Err(Error::DeviceOffline)
    }

    /// First bulk endpoint facing `direction` in any configuration.
    ///
    /// USB models of these printers expose a vendor interface with one bulk
    /// OUT pipe carrying the same frames as the BLE write characteristic.
    fn find_endpoint(
        device: &Device<Context>,
        device_desc: &DeviceDescriptor,
        direction: Direction,
    ) -> Option<Endpoint> {
        for n in 0..device_desc.num_configurations() {
            let config_desc = match device.config_descriptor(n) {
                Ok(c) => c,
                Err(_) => continue,
            };
            for interface in config_desc.interfaces() {
                for interface_desc in interface.descriptors() {
                    for endpoint_desc in interface_desc.endpoint_descriptors() {
                        if endpoint_desc.direction() == direction
                            && endpoint_desc.transfer_type() == TransferType::Bulk
                        {
                            return Some(Endpoint {
                                iface: interface_desc.interface_number(),
                                setting: interface_desc.setting_number(),
                                address: endpoint_desc.address(),
                            });
                        }
                    }
                }
            }
        }
        None
    }
}

impl io::Write for UsbTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.handle
            .write_bulk(self.endpoint_out.address, buf, self.timeout)
            .map_err(|e| match e {
                rusb::Error::Timeout => io::Error::new(io::ErrorKind::TimedOut, e),
                rusb::Error::NoDevice => io::Error::new(io::ErrorKind::NotConnected, e),
                e => io::Error::new(io::ErrorKind::Other, e),
            })
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        self.handle.release_interface(self.endpoint_out.iface).ok();
    }
}
