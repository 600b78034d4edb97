mod config;
#[cfg(any(test, feature = "testing"))]
mod loopback;
mod media;
#[cfg(any(test, feature = "testing"))]
mod memory_relay;
mod negotiator;
mod peer;
mod relay_client;
mod sync_channel;
mod transport;
#[cfg(feature = "webrtc")]
mod webrtc_transport;

pub use config::*;
#[cfg(any(test, feature = "testing"))]
pub use loopback::*;
pub use media::*;
#[cfg(any(test, feature = "testing"))]
pub use memory_relay::*;
pub use negotiator::*;
pub use peer::*;
pub use relay_client::*;
pub use sync_channel::*;
pub use transport::*;
#[cfg(feature = "webrtc")]
pub use webrtc_transport::*;

pub extern crate sketchpair_system;
