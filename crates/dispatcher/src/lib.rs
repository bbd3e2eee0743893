//! 出站调度与入站关联层
//!
//! 本crate组合核心组件完成一次出站调用的全流程：
//! 准入控制、信封构造、槽位登记、网关选择、签名发送与限时等待，
//! 以及把网关的异步回复安全地多路分解回正确的等待方。

pub mod dispatcher;
pub mod inbound;
pub mod metrics;
pub mod registry;
pub mod selector;

pub use dispatcher::GatewayDispatcher;
pub use metrics::{DispatchMetrics, MetricsSnapshot};
pub use registry::ResponseRegistry;
pub use selector::{GatewayCycle, RoundRobinSelector};
