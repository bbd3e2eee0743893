mod clock;
mod transport;

pub use clock::{Clock, SystemClock};
pub use transport::{GatewayTransport, InboundHandler};
