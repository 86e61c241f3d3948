use crate::GtpuEndpoint;
use std::net::SocketAddr;

/// The endpoint as owned by the stack-processing task of a running node.
pub type NodeEndpoint<P> = GtpuEndpoint<std::net::UdpSocket, P>;

/// A unit of work run against the endpoint on the stack-processing task.
pub type StackCall<P> = Box<dyn FnOnce(&mut NodeEndpoint<P>) + Send>;

/// Everything the stack-processing task does arrives as one of these, in order.
pub enum StackTask<P> {
    Datagram { bytes: Vec<u8>, peer: SocketAddr },
    Tick,
    Call(StackCall<P>),
    Shutdown,
}
