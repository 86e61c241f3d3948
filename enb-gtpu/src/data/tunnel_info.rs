use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    /// SDUs are delivered to PDCP as they arrive.
    PdcpActive,
    /// SDUs are held until the tunnel is activated.
    Buffering,
    /// SDUs are re-encapsulated and sent to the peer of another tunnel.
    ForwardTo,
    /// Carries traffic forwarded from another tunnel.
    ForwardedFrom,
    /// SDUs are dropped.
    Inactive,
}

impl std::fmt::Display for TunnelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TunnelState::PdcpActive => "pdcp_active",
            TunnelState::Buffering => "buffering",
            TunnelState::ForwardTo => "forward_to",
            TunnelState::ForwardedFrom => "forwarded_from",
            TunnelState::Inactive => "inactive",
        };
        write!(f, "{s}")
    }
}

/// Snapshot of a tunnel, for callers that cannot borrow from the tunnel manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelInfo {
    pub teid_in: u32,
    pub teid_out: u32,
    pub rnti: u16,
    pub eps_bearer_id: u8,
    pub remote_addr: SocketAddr,
    pub state: TunnelState,
    pub fwd_teid: Option<u32>,
    pub buffered_sdus: usize,
    pub dropped_sdus: u64,
}

impl std::fmt::Display for TunnelInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(rnti={:#x},eps_bearer_id={},teid_in={:#x},teid_out={:#x},{})",
            self.rnti, self.eps_bearer_id, self.teid_in, self.teid_out, self.state
        )
    }
}
