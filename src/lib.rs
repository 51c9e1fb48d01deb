pub mod correlation;
pub mod gateway;
pub mod peer;
pub mod protocol;
pub mod registry;

mod link;
mod queue;
mod receiver;
mod sender;

pub use gateway::{Gateway, GatewayBuilder, GatewayError, HandshakeEvent};
pub use peer::{PeerError, PeerServer};
pub use protocol::{Request, Response, STATUS_OK};
pub use registry::{ClientState, ClientToken};
pub use sender::DEFAULT_POLL_INTERVAL;
