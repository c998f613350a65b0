use thiserror::Error;

/// USB interface class code for vendor-specific interfaces
pub const VENDOR_SPECIFIC_CLASS: u8 = 0xFF;

/// Result type for USB transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Failures reported by the USB host layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Endpoint halted; the transfer can simply be retried
    #[error("endpoint stalled")]
    Stall,
    #[error("device disconnected")]
    NoDevice,
    #[error("resource busy")]
    Busy,
    #[error("access denied")]
    Access,
    #[error("transfer timed out")]
    Timeout,
    #[error("usb error: {0}")]
    Io(String),
}

impl TransportError {
    /// Whether the error is the transient stall condition
    pub fn is_stall(&self) -> bool {
        matches!(self, TransportError::Stall)
    }
}

/// Which devices the session manager should attach to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFilter {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Subclass of the vendor-specific interface carrying the samples
    pub subclass: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescription {
    pub address: u8,
    pub direction: Direction,
    pub transfer: TransferKind,
}

/// One alternate setting of an interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDescription {
    pub number: u8,
    pub class: u8,
    pub subclass: u8,
    pub endpoints: Vec<EndpointDescription>,
}

/// Descriptor summary of an attached device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescription {
    pub bus: u8,
    pub address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub interfaces: Vec<InterfaceDescription>,
}

/// Interface and endpoint to stream from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamTarget {
    pub interface: u8,
    pub endpoint: u8,
}

impl DeviceDescription {
    /// Locate the sample stream on this device, if it is the one we want.
    ///
    /// The device must match the filter's vendor and product IDs and expose a
    /// vendor-specific interface with the filter's subclass. The first IN bulk
    /// endpoint of that interface is used.
    pub fn find_target(&self, filter: &DeviceFilter) -> Option<StreamTarget> {
        if self.vendor_id != filter.vendor_id || self.product_id != filter.product_id {
            return None;
        }

        self.interfaces
            .iter()
            .filter(|i| i.class == VENDOR_SPECIFIC_CLASS && i.subclass == filter.subclass)
            .find_map(|i| {
                i.endpoints
                    .iter()
                    .find(|e| e.direction == Direction::In && e.transfer == TransferKind::Bulk)
                    .map(|e| StreamTarget {
                        interface: i.number,
                        endpoint: e.address,
                    })
            })
    }
}

/// Access to the USB host stack.
///
/// Implemented by the libusb backend and by a scripted mock for tests.
pub trait UsbHost: Send {
    /// Opaque reference to an attached device
    type Device;
    /// An opened device with its interface claimed
    type Handle: BulkIn;

    /// Enumerate attached devices
    fn devices(&mut self) -> TransportResult<Vec<Self::Device>>;

    /// Read the device and configuration descriptors
    fn describe(&mut self, device: &Self::Device) -> TransportResult<DeviceDescription>;

    /// Open the device and claim `interface`
    fn open(&mut self, device: &Self::Device, interface: u8) -> TransportResult<Self::Handle>;
}

/// Inbound bulk transfers on a claimed interface
pub trait BulkIn: Send {
    /// Blocking bulk read. Returns the number of bytes received.
    fn read_bulk(&mut self, endpoint: u8, buf: &mut [u8]) -> TransportResult<usize>;

    /// Release the claimed interface. The device is closed when the handle
    /// is dropped.
    fn release(&mut self) -> TransportResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk_in(address: u8) -> EndpointDescription {
        EndpointDescription {
            address,
            direction: Direction::In,
            transfer: TransferKind::Bulk,
        }
    }

    fn interface(number: u8, class: u8, subclass: u8, endpoints: Vec<EndpointDescription>) -> InterfaceDescription {
        InterfaceDescription {
            number,
            class,
            subclass,
            endpoints,
        }
    }

    fn device(interfaces: Vec<InterfaceDescription>) -> DeviceDescription {
        DeviceDescription {
            bus: 1,
            address: 4,
            vendor_id: 0x6666,
            product_id: 0x1234,
            interfaces,
        }
    }

    const FILTER: DeviceFilter = DeviceFilter {
        vendor_id: 0x6666,
        product_id: 0x1234,
        subclass: 0x42,
    };

    #[test]
    fn test_find_target_matches() {
        let dev = device(vec![
            interface(0, 0x02, 0x02, vec![bulk_in(0x81)]),
            interface(1, 0xFF, 0x42, vec![
                EndpointDescription { address: 0x02, direction: Direction::Out, transfer: TransferKind::Bulk },
                EndpointDescription { address: 0x83, direction: Direction::In, transfer: TransferKind::Interrupt },
                bulk_in(0x84),
                bulk_in(0x85),
            ]),
        ]);

        assert_eq!(
            dev.find_target(&FILTER),
            Some(StreamTarget { interface: 1, endpoint: 0x84 })
        );
    }

    #[test]
    fn test_find_target_wrong_ids() {
        let mut dev = device(vec![interface(0, 0xFF, 0x42, vec![bulk_in(0x81)])]);
        dev.product_id = 0x9999;
        assert_eq!(dev.find_target(&FILTER), None);

        dev.product_id = FILTER.product_id;
        dev.vendor_id = 0x0001;
        assert_eq!(dev.find_target(&FILTER), None);
    }

    #[test]
    fn test_find_target_requires_vendor_class_and_subclass() {
        let dev = device(vec![
            interface(0, 0x0A, 0x42, vec![bulk_in(0x81)]),
            interface(1, 0xFF, 0x43, vec![bulk_in(0x82)]),
        ]);
        assert_eq!(dev.find_target(&FILTER), None);
    }

    #[test]
    fn test_find_target_skips_interface_without_bulk_in() {
        let dev = device(vec![
            interface(0, 0xFF, 0x42, vec![]),
            interface(2, 0xFF, 0x42, vec![bulk_in(0x86)]),
        ]);
        assert_eq!(
            dev.find_target(&FILTER),
            Some(StreamTarget { interface: 2, endpoint: 0x86 })
        );
    }

    #[test]
    fn test_stall_classification() {
        assert!(TransportError::Stall.is_stall());
        assert!(!TransportError::NoDevice.is_stall());
        assert!(!TransportError::Io("x".into()).is_stall());
    }
}
