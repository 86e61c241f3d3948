/// Lifecycle events queued by the tunnel manager for the control plane to consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelEvent {
    /// The tunnel went to pdcp_active and its buffer was flushed to PDCP.
    Activated { teid: u32, flushed: usize },

    /// The tunnel was destroyed.  Any SDUs still in its buffer were discarded.
    Removed {
        teid: u32,
        rnti: u16,
        eps_bearer_id: u8,
        discarded_sdus: usize,
    },
}
