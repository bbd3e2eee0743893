pub mod config;
pub mod errors;
pub mod models;
pub mod ratelimit;
pub mod traits;

pub use config::{ConnectorConfig, RateLimiterConfig};
pub use errors::{ConnectorError, ConnectorResult, RateLimitLayer};
pub use models::{
    Envelope, GatewayResponse, Method, OutboundRequest, SignedEnvelope, WireError,
};
pub use ratelimit::RateLimiter;
pub use traits::{Clock, GatewayTransport, InboundHandler, SystemClock};
