use super::{RxTimer, SduBuffer};
use crate::{TunnelInfo, TunnelState};
use std::net::SocketAddr;

/// One GTP-U tunnel endpoint, owned by the tunnel manager.  Links to other tunnels are
/// held as TEIDs and resolved through the manager on each use.
#[derive(Debug)]
pub struct Tunnel {
    pub(super) teid_in: u32,
    pub(super) teid_out: u32,
    pub(super) rnti: u16,
    pub(super) eps_bearer_id: u8,
    pub(super) remote_addr: SocketAddr,
    pub(super) state: TunnelState,

    // Set iff state is forward_to.  Never equal to teid_in.
    pub(super) fwd_teid: Option<u32>,

    // Priority pair links.  The preferred tunnel knows its standby and vice versa.
    pub(super) standby_teid: Option<u32>,
    pub(super) preferred_teid: Option<u32>,

    pub(super) rx_timer: RxTimer,
    pub(super) buffer: SduBuffer,
}

impl Tunnel {
    pub fn teid_in(&self) -> u32 {
        self.teid_in
    }
    pub fn teid_out(&self) -> u32 {
        self.teid_out
    }
    pub fn rnti(&self) -> u16 {
        self.rnti
    }
    pub fn eps_bearer_id(&self) -> u8 {
        self.eps_bearer_id
    }
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
    pub fn state(&self) -> TunnelState {
        self.state
    }
    pub fn fwd_teid(&self) -> Option<u32> {
        self.fwd_teid
    }
    pub fn standby_teid(&self) -> Option<u32> {
        self.standby_teid
    }
    pub fn preferred_teid(&self) -> Option<u32> {
        self.preferred_teid
    }
    pub fn rx_timer(&self) -> &RxTimer {
        &self.rx_timer
    }
    pub fn buffered_sdus(&self) -> usize {
        self.buffer.len()
    }
    pub fn dropped_sdus(&self) -> u64 {
        self.buffer.dropped()
    }

    // Leaving forward_to also ends the liveness watch on the forwarding source.  Returns
    // the TEID of the tunnel that was being forwarded to.
    pub(super) fn stop_forwarding(&mut self) -> Option<u32> {
        let fwd_teid = self.fwd_teid.take();
        if fwd_teid.is_some() {
            self.rx_timer.stop();
        }
        fwd_teid
    }

    // A preferred tunnel without a standby has nothing to switch over to, so its liveness
    // watch ends unless it is forwarding.
    pub(super) fn unpair_standby(&mut self) {
        self.standby_teid = None;
        if self.state != TunnelState::ForwardTo {
            self.rx_timer.stop();
        }
    }

    pub fn info(&self) -> TunnelInfo {
        TunnelInfo {
            teid_in: self.teid_in,
            teid_out: self.teid_out,
            rnti: self.rnti,
            eps_bearer_id: self.eps_bearer_id,
            remote_addr: self.remote_addr,
            state: self.state,
            fwd_teid: self.fwd_teid,
            buffered_sdus: self.buffer.len(),
            dropped_sdus: self.buffer.dropped(),
        }
    }
}

impl std::fmt::Display for Tunnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(rnti={:#x},eps_bearer_id={},teid_in={:#x},teid_out={:#x},{})",
            self.rnti, self.eps_bearer_id, self.teid_in, self.teid_out, self.state
        )
    }
}
