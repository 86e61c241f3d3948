//! enb-gtpu - GTP-U tunnel management and handover data forwarding for an eNB user plane

mod control;
mod data;
mod endpoint;
mod error;
mod interfaces;
mod node;
pub mod tunnels;

pub use control::{GtpuHandle, NodeEndpoint, StackCall, StackTask, TunnelControl};
pub use data::*;
pub use endpoint::{GtpuCounters, GtpuEndpoint, counter_indices, create_gtpu_socket};
pub use error::GtpuError;
pub use interfaces::{DatagramSink, DeliveredSdu, PdcpInterface};
pub use node::GtpuNode;
pub use tunnels::TunnelManager;
