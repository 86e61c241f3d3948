mod handle;
mod stack_task;
mod tunnel_control;

pub use handle::GtpuHandle;
pub use stack_task::{NodeEndpoint, StackCall, StackTask};
pub use tunnel_control::TunnelControl;
