mod envelope;
mod request;

pub use envelope::{Envelope, Method, SignedEnvelope, WireError};
pub use request::{GatewayResponse, OutboundRequest};
