//! Upstream data sources
//!
//! - [`device`]: the box's own REST API (channel summaries and details)
//! - [`xmltv`]: streaming reader over downloaded XMLTV listing files

pub mod device;
pub mod xmltv;

pub use device::DeviceClient;
pub use xmltv::{read_channels, XmltvChannelReader};
