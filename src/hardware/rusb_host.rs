use crate::hardware::usb_interface::{
    BulkIn, DeviceDescription, Direction, EndpointDescription, InterfaceDescription, TransferKind,
    TransportError, TransportResult, UsbHost,
};
use rusb::{Context, Device, DeviceHandle, UsbContext};
use std::time::Duration;
use tracing::{debug, warn};

/// libusb treats a zero timeout as "wait forever"
const NO_TIMEOUT: Duration = Duration::ZERO;

impl From<rusb::Error> for TransportError {
    fn from(e: rusb::Error) -> Self {
        match e {
            rusb::Error::Pipe => TransportError::Stall,
            rusb::Error::NoDevice => TransportError::NoDevice,
            rusb::Error::Busy => TransportError::Busy,
            rusb::Error::Access => TransportError::Access,
            rusb::Error::Timeout => TransportError::Timeout,
            other => TransportError::Io(other.to_string()),
        }
    }
}

/// USB host backed by libusb
pub struct RusbHost {
    context: Context,
}

impl RusbHost {
    pub fn new() -> TransportResult<Self> {
        let context = Context::new()?;
        debug!("libusb {} initialised", libusb_version());
        Ok(Self { context })
    }
}

fn libusb_version() -> String {
    let v = rusb::version();
    format!("{}.{}.{}", v.major(), v.minor(), v.micro())
}

fn direction(d: rusb::Direction) -> Direction {
    match d {
        rusb::Direction::In => Direction::In,
        rusb::Direction::Out => Direction::Out,
    }
}

fn transfer_kind(t: rusb::TransferType) -> TransferKind {
    match t {
        rusb::TransferType::Control => TransferKind::Control,
        rusb::TransferType::Isochronous => TransferKind::Isochronous,
        rusb::TransferType::Bulk => TransferKind::Bulk,
        rusb::TransferType::Interrupt => TransferKind::Interrupt,
    }
}

impl UsbHost for RusbHost {
    type Device = Device<Context>;
    type Handle = RusbHandle;

    fn devices(&mut self) -> TransportResult<Vec<Self::Device>> {
        Ok(self.context.devices()?.iter().collect())
    }

    fn describe(&mut self, device: &Self::Device) -> TransportResult<DeviceDescription> {
        let desc = device.device_descriptor()?;
        let config = device.active_config_descriptor()?;

        let interfaces = config
            .interfaces()
            .flat_map(|iface| iface.descriptors())
            .map(|alt| InterfaceDescription {
                number: alt.interface_number(),
                class: alt.class_code(),
                subclass: alt.sub_class_code(),
                endpoints: alt
                    .endpoint_descriptors()
                    .map(|ep| EndpointDescription {
                        address: ep.address(),
                        direction: direction(ep.direction()),
                        transfer: transfer_kind(ep.transfer_type()),
                    })
                    .collect(),
            })
            .collect();

        Ok(DeviceDescription {
            bus: device.bus_number(),
            address: device.address(),
            vendor_id: desc.vendor_id(),
            product_id: desc.product_id(),
            interfaces,
        })
    }

    fn open(&mut self, device: &Self::Device, interface: u8) -> TransportResult<Self::Handle> {
        let handle = device.open()?;

        // Not available on every platform; claiming still works without it
        // when no kernel driver is bound.
        if let Err(e) = handle.set_auto_detach_kernel_driver(true) {
            debug!("Kernel driver auto-detach unavailable: {}", e);
        }

        handle.claim_interface(interface)?;
        Ok(RusbHandle {
            handle,
            interface,
            claimed: true,
        })
    }
}

/// Opened libusb device with one claimed interface
pub struct RusbHandle {
    handle: DeviceHandle<Context>,
    interface: u8,
    claimed: bool,
}

impl BulkIn for RusbHandle {
    fn read_bulk(&mut self, endpoint: u8, buf: &mut [u8]) -> TransportResult<usize> {
        Ok(self.handle.read_bulk(endpoint, buf, NO_TIMEOUT)?)
    }

    fn release(&mut self) -> TransportResult<()> {
        if !self.claimed {
            return Ok(());
        }
        self.claimed = false;
        self.handle.release_interface(self.interface)?;
        Ok(())
    }
}

impl Drop for RusbHandle {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            match e {
                // Expected once the device has been unplugged
                TransportError::NoDevice => {}
                other => warn!("Failed to release interface {}: {}", self.interface, other),
            }
        }
    }
}
