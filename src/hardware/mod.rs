pub mod usb_interface;
pub mod rusb_host;
pub mod session;
#[cfg(test)]
pub mod mock;

pub use usb_interface::DeviceFilter;
pub use rusb_host::RusbHost;
pub use session::{spawn_session, ConnectionStatus, SessionStats};
