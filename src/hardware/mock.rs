use crate::hardware::usb_interface::{
    BulkIn, DeviceDescription, Direction, EndpointDescription, InterfaceDescription, TransferKind,
    TransportError, TransportResult, UsbHost,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Scripted USB host for testing without hardware
///
/// Devices can be plugged and unplugged while a session is running, and each
/// device replays a queue of transfer results. Queued bytes longer than the
/// read buffer are handed out over several reads, the way back-to-back
/// packets are. Once the queue is empty the device behaves as if it had been
/// unplugged.
#[derive(Clone, Default)]
pub struct MockUsbHost {
    bus: Arc<Mutex<MockBus>>,
}

#[derive(Default)]
struct MockBus {
    devices: Vec<MockDevice>,
    next_id: usize,
    open_failures: usize,
    opened: usize,
    released: usize,
    /// Interface number passed to the last successful open
    claimed_interface: Option<u8>,
}

struct MockDevice {
    id: usize,
    description: DeviceDescription,
    transfers: VecDeque<TransportResult<Vec<u8>>>,
}

impl MockUsbHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A device exposing one vendor-specific interface with a bulk IN endpoint
    pub fn scope_device(vendor_id: u16, product_id: u16, subclass: u8) -> DeviceDescription {
        DeviceDescription {
            bus: 1,
            address: 7,
            vendor_id,
            product_id,
            interfaces: vec![InterfaceDescription {
                number: 0,
                class: 0xFF,
                subclass,
                endpoints: vec![
                    EndpointDescription {
                        address: 0x01,
                        direction: Direction::Out,
                        transfer: TransferKind::Bulk,
                    },
                    EndpointDescription {
                        address: 0x81,
                        direction: Direction::In,
                        transfer: TransferKind::Bulk,
                    },
                ],
            }],
        }
    }

    /// Attach a device and return its id
    pub fn plug(&self, description: DeviceDescription) -> usize {
        let mut bus = self.bus.lock().unwrap();
        let id = bus.next_id;
        bus.next_id += 1;
        bus.devices.push(MockDevice {
            id,
            description,
            transfers: VecDeque::new(),
        });
        id
    }

    pub fn unplug(&self, id: usize) {
        let mut bus = self.bus.lock().unwrap();
        bus.devices.retain(|d| d.id != id);
    }

    /// Queue a successful transfer carrying `bytes`
    pub fn queue_frame(&self, id: usize, bytes: Vec<u8>) {
        self.queue(id, Ok(bytes));
    }

    /// Queue a failing transfer
    pub fn queue_error(&self, id: usize, error: TransportError) {
        self.queue(id, Err(error));
    }

    fn queue(&self, id: usize, transfer: TransportResult<Vec<u8>>) {
        let mut bus = self.bus.lock().unwrap();
        if let Some(dev) = bus.devices.iter_mut().find(|d| d.id == id) {
            dev.transfers.push_back(transfer);
        }
    }

    /// Make the next `count` open attempts fail
    pub fn fail_next_opens(&self, count: usize) {
        self.bus.lock().unwrap().open_failures = count;
    }

    pub fn opened_count(&self) -> usize {
        self.bus.lock().unwrap().opened
    }

    pub fn claimed_interface(&self) -> Option<u8> {
        self.bus.lock().unwrap().claimed_interface
    }

    pub fn released_count(&self) -> usize {
        self.bus.lock().unwrap().released
    }

    pub fn pending_transfers(&self, id: usize) -> usize {
        let bus = self.bus.lock().unwrap();
        bus.devices
            .iter()
            .find(|d| d.id == id)
            .map_or(0, |d| d.transfers.len())
    }
}

impl UsbHost for MockUsbHost {
    type Device = usize;
    type Handle = MockHandle;

    fn devices(&mut self) -> TransportResult<Vec<usize>> {
        let bus = self.bus.lock().unwrap();
        Ok(bus.devices.iter().map(|d| d.id).collect())
    }

    fn describe(&mut self, device: &usize) -> TransportResult<DeviceDescription> {
        let bus = self.bus.lock().unwrap();
        bus.devices
            .iter()
            .find(|d| d.id == *device)
            .map(|d| d.description.clone())
            .ok_or(TransportError::NoDevice)
    }

    fn open(&mut self, device: &usize, interface: u8) -> TransportResult<MockHandle> {
        let mut bus = self.bus.lock().unwrap();
        if bus.open_failures > 0 {
            bus.open_failures -= 1;
            return Err(TransportError::Access);
        }
        if !bus.devices.iter().any(|d| d.id == *device) {
            return Err(TransportError::NoDevice);
        }
        bus.opened += 1;
        bus.claimed_interface = Some(interface);
        Ok(MockHandle {
            bus: self.bus.clone(),
            device: *device,
            claimed: true,
        })
    }
}

pub struct MockHandle {
    bus: Arc<Mutex<MockBus>>,
    device: usize,
    claimed: bool,
}

impl BulkIn for MockHandle {
    fn read_bulk(&mut self, _endpoint: u8, buf: &mut [u8]) -> TransportResult<usize> {
        let mut bus = self.bus.lock().unwrap();
        let dev = bus
            .devices
            .iter_mut()
            .find(|d| d.id == self.device)
            .ok_or(TransportError::NoDevice)?;

        match dev.transfers.pop_front() {
            Some(Ok(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    dev.transfers.push_front(Ok(bytes.split_off(n)));
                }
                Ok(n)
            }
            Some(Err(e)) => Err(e),
            None => Err(TransportError::NoDevice),
        }
    }

    fn release(&mut self) -> TransportResult<()> {
        if self.claimed {
            self.claimed = false;
            self.bus.lock().unwrap().released += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_plug_and_describe() {
        let mut host = MockUsbHost::new();
        assert!(host.devices().unwrap().is_empty());

        let id = host.plug(MockUsbHost::scope_device(1, 2, 3));
        assert_eq!(host.devices().unwrap(), vec![id]);
        assert_eq!(host.describe(&id).unwrap().vendor_id, 1);

        host.unplug(id);
        assert!(host.devices().unwrap().is_empty());
        assert_eq!(host.describe(&id), Err(TransportError::NoDevice));
    }

    #[test]
    fn test_mock_transfers_replay_in_order() {
        let mut host = MockUsbHost::new();
        let id = host.plug(MockUsbHost::scope_device(1, 2, 3));
        host.queue_frame(id, vec![1, 2, 3]);
        host.queue_error(id, TransportError::Stall);

        let mut handle = host.open(&id, 0).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(handle.read_bulk(0x81, &mut buf), Ok(3));
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(handle.read_bulk(0x81, &mut buf), Err(TransportError::Stall));
        assert_eq!(handle.read_bulk(0x81, &mut buf), Err(TransportError::NoDevice));
    }

    #[test]
    fn test_mock_splits_long_transfers() {
        let mut host = MockUsbHost::new();
        let id = host.plug(MockUsbHost::scope_device(1, 2, 3));
        host.queue_frame(id, (0..10).collect());

        let mut handle = host.open(&id, 0).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(handle.read_bulk(0x81, &mut buf), Ok(4));
        assert_eq!(buf, [0, 1, 2, 3]);
        assert_eq!(handle.read_bulk(0x81, &mut buf), Ok(4));
        assert_eq!(buf, [4, 5, 6, 7]);
        assert_eq!(handle.read_bulk(0x81, &mut buf), Ok(2));
        assert_eq!(&buf[..2], &[8, 9]);
        assert_eq!(host.pending_transfers(id), 0);
    }

    #[test]
    fn test_mock_open_failures_and_release() {
        let mut host = MockUsbHost::new();
        let id = host.plug(MockUsbHost::scope_device(1, 2, 3));
        host.fail_next_opens(1);

        assert!(host.open(&id, 0).is_err());
        let mut handle = host.open(&id, 0).unwrap();
        assert_eq!(host.opened_count(), 1);
        assert_eq!(host.claimed_interface(), Some(0));

        handle.release().unwrap();
        handle.release().unwrap();
        assert_eq!(host.released_count(), 1);
    }
}
