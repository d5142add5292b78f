pub mod bootstrap;
pub mod ssid;

pub use bootstrap::{BootstrapState, BootstrapStatus, WifiBootstrapManager};
pub use ssid::SsidGenerator;
