use log::{debug, info};
use rusb::{Context, Device, DeviceDescriptor, DeviceHandle, Direction, TransferType, UsbContext};
use std::time::{Duration, Instant};

use super::{ChunkBuffer, Transport};
use crate::error::TransportError;

const WRITE_TIMEOUT: Duration = Duration::from_secs(10);
const READ_PACKET: usize = 64;

#[derive(Debug, Clone, Copy)]
struct Endpoint {
    iface: u8,
    setting: u8,
    address: u8,
}

/// Printer attached over USB bulk endpoints.
pub struct UsbTransport {
    handle: DeviceHandle<Context>,
    endpoint_out: Endpoint,
    endpoint_in: Endpoint,
    buffer: ChunkBuffer,
}

impl UsbTransport {
    /// Open the first device matching `vid`/`pid`, and `serial` when given.
    pub fn open(vid: u16, pid: u16, serial: Option<String>) -> Result<Self, TransportError> {
        let context = Context::new()?;
        let (device, device_desc, handle) =
            match Self::open_device(&context, vid, pid, serial.as_deref()) {
                Ok(found) => found,
                Err(err) => {
                    debug!("{:?}", err);
                    return Err(TransportError::DeviceOffline);
                }
            };
        handle.reset()?;

        let endpoint_in =
            Self::find_endpoint(&device, &device_desc, Direction::In, TransferType::Bulk)
                .ok_or(TransportError::MissingEndpoint)?;
        let endpoint_out =
            Self::find_endpoint(&device, &device_desc, Direction::Out, TransferType::Bulk)
                .ok_or(TransportError::MissingEndpoint)?;

        // some firmwares bind a kernel printer driver to the interface
        handle.set_auto_detach_kernel_driver(true)?;
        let has_kernel_driver = matches!(handle.kernel_driver_active(endpoint_out.iface), Ok(true));
        info!("Kernel driver support is {}", has_kernel_driver);
        handle.claim_interface(endpoint_out.iface)?;
        handle.set_alternate_setting(endpoint_out.iface, endpoint_out.setting)?;

        Ok(UsbTransport {
            handle,
            endpoint_out,
            endpoint_in,
            buffer: ChunkBuffer::default(),
        })
    }

    fn open_device(
        context: &Context,
        vid: u16,
        pid: u16,
        serial: Option<&str>,
    ) -> Result<(Device<Context>, DeviceDescriptor, DeviceHandle<Context>), TransportError> {
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
            let language = match handle.read_languages(timeout)?.first() {
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
        debug!("No device match {:04x}:{:04x} serial {:?}", vid, pid, serial);
        Err(TransportError::DeviceOffline)
    }

    fn find_endpoint(
        device: &Device<Context>,
        device_desc: &DeviceDescriptor,
        direction: Direction,
        transfer_type: TransferType,
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
                            && endpoint_desc.transfer_type() == transfer_type
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

impl Transport for UsbTransport {
    fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        let n = self
            .handle
            .write_bulk(self.endpoint_out.address, buf, WRITE_TIMEOUT)?;
        if n != buf.len() {
            debug!(
                "write error: bytes wrote {} != bytes supplied {}, possibly timeout ?",
                n,
                buf.len()
            );
            return Err(TransportError::WriteFailure {
                written: n,
                expected: buf.len(),
            });
        }
        Ok(())
    }

    fn read_until(
        &mut self,
        delimiter: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut packet = [0u8; READ_PACKET];

        loop {
            if let Some(chunk) = self.buffer.take_chunk(delimiter) {
                return Ok(chunk);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            // libusb treats a zero timeout as "wait forever"
            if remaining < Duration::from_millis(1) {
                return Err(TransportError::ReadTimeout(timeout));
            }
            match self
                .handle
                .read_bulk(self.endpoint_in.address, &mut packet, remaining)
            {
                Ok(n) => self.buffer.extend(&packet[..n]),
                Err(rusb::Error::Timeout) => return Err(TransportError::ReadTimeout(timeout)),
                Err(rusb::Error::NoDevice) | Err(rusb::Error::Pipe) => {
                    return Err(TransportError::ChannelClosed)
                }
                Err(err) => return Err(TransportError::Usb(err)),
            }
        }
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        if let Err(err) = self.handle.release_interface(self.endpoint_out.iface) {
            debug!("Failed to release interface: {:?}", err);
        }
    }
}
