use super::sdu_buffer::PushOutcome;
use super::{BearerTeid, BufferedSdu, RntiIndex, RxTimer, SduBuffer, Tunnel, TunnelPool};
use crate::{
    BufferOverflowPolicy, Config, GtpuError, PdcpInterface, TunnelEvent, TunnelState,
};
use slog::{Logger, debug, info, warn};
use std::net::SocketAddr;

/// Owns every tunnel of the node and implements the tunnel state machine.
///
/// All methods run to completion on the single stack-processing task, so a `&Tunnel`
/// handed out here is only valid until the next call that takes `&mut self`.
pub struct TunnelManager<P> {
    pool: TunnelPool,
    rnti_index: RntiIndex,
    pdcp: P,

    // Logical clock in milliseconds, advanced by the stack's tick.
    now_msec: u64,
    // TEIDs whose rx timer may be running.
    timed_teids: Vec<u32>,

    indirect_tunnel_timeout_msec: u64,
    buffer_capacity: usize,
    buffer_overflow_policy: BufferOverflowPolicy,

    events: Vec<TunnelEvent>,
    logger: Logger,
}

impl<P: PdcpInterface> TunnelManager<P> {
    pub fn new(config: &Config, pdcp: P, logger: &Logger) -> Self {
        TunnelManager {
            pool: TunnelPool::new(config.tunnel_pool_size()),
            rnti_index: RntiIndex::default(),
            pdcp,
            now_msec: 0,
            timed_teids: vec![],
            indirect_tunnel_timeout_msec: config.indirect_tunnel_timeout_msec,
            buffer_capacity: config.buffer_capacity,
            buffer_overflow_policy: config.buffer_overflow_policy,
            events: vec![],
            logger: logger.clone(),
        }
    }

    pub fn pdcp(&self) -> &P {
        &self.pdcp
    }

    pub fn pdcp_mut(&mut self) -> &mut P {
        &mut self.pdcp
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.len() == 0
    }

    pub fn now_msec(&self) -> u64 {
        self.now_msec
    }

    /// Take the lifecycle events queued since the last call.
    pub fn drain_events(&mut self) -> Vec<TunnelEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn add_tunnel(
        &mut self,
        rnti: u16,
        eps_bearer_id: u8,
        teid_out: u32,
        remote_addr: SocketAddr,
    ) -> Result<&Tunnel, GtpuError> {
        if !self.rnti_index.has_room(rnti) {
            warn!(self.logger, "Too many tunnels for rnti={:#x}", rnti);
            return Err(GtpuError::PoolExhausted {
                rnti,
                reason: "per-UE tunnel limit reached",
            });
        }
        let Some(teid_in) = self.pool.allocate_teid() else {
            warn!(
                self.logger,
                "Tunnel pool of {} exhausted, rejecting rnti={:#x}",
                self.pool.capacity(),
                rnti
            );
            return Err(GtpuError::PoolExhausted {
                rnti,
                reason: "tunnel pool exhausted",
            });
        };

        let tunnel = Tunnel {
            teid_in,
            teid_out,
            rnti,
            eps_bearer_id,
            remote_addr,
            state: TunnelState::PdcpActive,
            fwd_teid: None,
            standby_teid: None,
            preferred_teid: None,
            rx_timer: RxTimer::default(),
            buffer: SduBuffer::new(self.buffer_capacity, self.buffer_overflow_policy),
        };
        info!(self.logger, "Added tunnel {} to {}", tunnel, remote_addr);
        self.pool.insert(tunnel);
        self.rnti_index.add(rnti, eps_bearer_id, teid_in);

        self.pool
            .get(teid_in)
            .ok_or(GtpuError::UnknownTeid(teid_in))
    }

    pub fn find_tunnel(&self, teid: u32) -> Option<&Tunnel> {
        self.pool.get(teid)
    }

    pub fn find_rnti_tunnels(&self, rnti: u16) -> &[BearerTeid] {
        self.rnti_index.tunnels(rnti)
    }

    pub fn find_rnti_bearer_tunnels(&self, rnti: u16, eps_bearer_id: u8) -> &[BearerTeid] {
        self.rnti_index.bearer_tunnels(rnti, eps_bearer_id)
    }

    /// Go to pdcp_active, delivering anything buffered to PDCP in arrival order.
    pub fn activate_tunnel(&mut self, teid: u32) -> Result<(), GtpuError> {
        let tunnel = self.tunnel_mut(teid)?;
        tunnel.state = TunnelState::PdcpActive;
        let severed = tunnel.stop_forwarding();
        let (rnti, eps_bearer_id) = (tunnel.rnti, tunnel.eps_bearer_id);
        let sdus = tunnel.buffer.drain();

        let flushed = sdus.len();
        let mut lost = 0;
        for BufferedSdu { pdcp_sn, sdu } in sdus {
            if self
                .pdcp
                .deliver_sdu(rnti, eps_bearer_id, sdu, pdcp_sn)
                .is_err()
            {
                lost += 1;
            }
        }
        if lost > 0 {
            warn!(
                self.logger,
                "PDCP rejected {} of {} SDUs flushed from TEID {:#x}", lost, flushed, teid
            );
        }
        info!(
            self.logger,
            "Activated TEID {:#x} of rnti={:#x}, flushed {} SDUs", teid, rnti, flushed
        );
        self.events.push(TunnelEvent::Activated { teid, flushed });
        self.release_forwarding_target(severed);
        Ok(())
    }

    /// Go to buffering.  SDUs are queued until the tunnel is activated.
    pub fn suspend_tunnel(&mut self, teid: u32) -> Result<(), GtpuError> {
        let tunnel = self.tunnel_mut(teid)?;
        tunnel.state = TunnelState::Buffering;
        let severed = tunnel.stop_forwarding();
        debug!(self.logger, "Suspended TEID {:#x}", teid);
        self.release_forwarding_target(severed);
        Ok(())
    }

    /// Go to inactive.  SDUs are dropped until the tunnel is activated or suspended.
    pub fn deactivate_tunnel(&mut self, teid: u32) -> Result<(), GtpuError> {
        let tunnel = self.tunnel_mut(teid)?;
        tunnel.state = TunnelState::Inactive;
        let severed = tunnel.stop_forwarding();
        debug!(self.logger, "Deactivated TEID {:#x}", teid);
        self.release_forwarding_target(severed);
        Ok(())
    }

    /// Make `preferred_teid` the live path of a bearer and hold traffic on `standby_teid`
    /// until the preferred tunnel goes away, at which point the standby is activated and
    /// flushed.  The preferred tunnel gets a liveness timer so that this happens even if
    /// no End Marker arrives.
    ///
    /// Both tunnels must belong to the same bearer.  A tunnel can be in one pair at a time:
    /// an earlier standby of `preferred_teid` is activated, and an earlier preferred tunnel
    /// of `standby_teid` loses its standby.
    pub fn set_tunnel_priority(
        &mut self,
        preferred_teid: u32,
        standby_teid: u32,
    ) -> Result<(), GtpuError> {
        if preferred_teid == standby_teid {
            return Err(GtpuError::InvalidForwarding {
                teid: preferred_teid,
            });
        }
        let preferred = self.tunnel_mut(preferred_teid)?;
        let bearer = (preferred.rnti, preferred.eps_bearer_id);
        let standby = self.tunnel_mut(standby_teid)?;
        if (standby.rnti, standby.eps_bearer_id) != bearer {
            warn!(
                self.logger,
                "TEIDs {:#x} and {:#x} belong to different bearers, not pairing",
                preferred_teid,
                standby_teid
            );
            return Err(GtpuError::InvalidForwarding {
                teid: preferred_teid,
            });
        }
        self.leave_pair(preferred_teid, standby_teid)?;
        self.leave_pair(standby_teid, preferred_teid)?;
        self.activate_tunnel(preferred_teid)?;

        let now = self.now_msec;
        let timeout = self.indirect_tunnel_timeout_msec;
        let preferred = self.tunnel_mut(preferred_teid)?;
        preferred.standby_teid = Some(standby_teid);
        preferred.rx_timer.start(timeout, now);
        self.arm(preferred_teid);

        let standby = self.tunnel_mut(standby_teid)?;
        standby.state = TunnelState::Buffering;
        let severed = standby.stop_forwarding();
        standby.preferred_teid = Some(preferred_teid);

        info!(
            self.logger,
            "TEID {:#x} has priority over TEID {:#x}", preferred_teid, standby_teid
        );
        self.release_forwarding_target(severed);
        Ok(())
    }

    // Take a tunnel out of any priority pair it is in with a tunnel other than `partner`.
    // A standby left without its preferred tunnel is activated.
    fn leave_pair(&mut self, teid: u32, partner: u32) -> Result<(), GtpuError> {
        let tunnel = self.tunnel_mut(teid)?;
        let old_preferred = tunnel.preferred_teid.take().filter(|t| *t != partner);
        let old_standby = tunnel.standby_teid.filter(|t| *t != partner);
        if tunnel.standby_teid.is_some() {
            tunnel.unpair_standby();
        }

        if let Some(old_preferred) = old_preferred {
            if let Some(tunnel) = self.pool.get_mut(old_preferred) {
                tunnel.unpair_standby();
            }
        }
        if let Some(old_standby) = old_standby {
            if let Some(tunnel) = self.pool.get_mut(old_standby) {
                tunnel.preferred_teid = None;
                debug!(
                    self.logger,
                    "TEID {:#x} is no longer standby of TEID {:#x}", old_standby, teid
                );
                self.activate_tunnel(old_standby)?;
            }
        }
        Ok(())
    }

    /// Liveness signal: the tunnel has just delivered an SDU to PDCP.
    pub fn handle_rx_pdcp_sdu(&mut self, teid: u32) {
        let now = self.now_msec;
        if let Some(tunnel) = self.pool.get_mut(teid) {
            tunnel.rx_timer.restart(now);
        }
    }

    /// Liveness signal: the tunnel has just forwarded an SDU onwards.
    pub fn handle_forwarded_sdu(&mut self, teid: u32) {
        self.handle_rx_pdcp_sdu(teid)
    }

    /// Queue an SDU on a tunnel.  Returns the SDU evicted to make room for it, if any.
    pub fn buffer_pdcp_sdu(
        &mut self,
        teid: u32,
        pdcp_sn: Option<u16>,
        sdu: Vec<u8>,
    ) -> Result<Option<BufferedSdu>, GtpuError> {
        let tunnel = self.tunnel_mut(teid)?;
        match tunnel.buffer.push(BufferedSdu { pdcp_sn, sdu }) {
            PushOutcome::Queued => Ok(None),
            PushOutcome::EvictedOldest(evicted) => {
                let dropped = tunnel.buffer.dropped();
                debug!(
                    self.logger,
                    "Buffer of TEID {:#x} full, evicted oldest SDU ({} dropped)", teid, dropped
                );
                Ok(Some(evicted))
            }
            PushOutcome::Rejected(_) => Err(GtpuError::BufferOverflow {
                teid,
                dropped: tunnel.buffer.dropped(),
            }),
        }
    }

    /// Send everything arriving on `rx_teid` to the peer of `tx_teid`.
    pub fn setup_forwarding(&mut self, rx_teid: u32, tx_teid: u32) -> Result<(), GtpuError> {
        if rx_teid == tx_teid {
            return Err(GtpuError::InvalidForwarding { teid: rx_teid });
        }
        self.tunnel_mut(rx_teid)?;
        let tx_tunnel = self
            .pool
            .get_mut(tx_teid)
            .ok_or(GtpuError::InvalidForwarding { teid: rx_teid })?;
        tx_tunnel.state = TunnelState::ForwardedFrom;
        let tx_severed = tx_tunnel.stop_forwarding();

        let now = self.now_msec;
        let timeout = self.indirect_tunnel_timeout_msec;
        let rx_tunnel = self.tunnel_mut(rx_teid)?;
        rx_tunnel.state = TunnelState::ForwardTo;
        let rx_severed = rx_tunnel.fwd_teid.replace(tx_teid).filter(|t| *t != tx_teid);
        rx_tunnel.rx_timer.start(timeout, now);
        self.arm(rx_teid);

        info!(
            self.logger,
            "Forwarding TEID {:#x} to TEID {:#x}", rx_teid, tx_teid
        );
        self.release_forwarding_target(tx_severed);
        self.release_forwarding_target(rx_severed);
        Ok(())
    }

    /// Destroy a tunnel.  Returns false if there was no such tunnel.
    pub fn remove_tunnel(&mut self, teid: u32) -> bool {
        let Some(mut tunnel) = self.pool.remove(teid) else {
            return false;
        };
        self.rnti_index.remove(tunnel.rnti, teid);
        info!(self.logger, "Removed tunnel {}", tunnel);

        // Sever links from surviving tunnels.  A tunnel that was forwarding here goes back
        // to local delivery.
        for other in self.pool.iter_mut() {
            if other.fwd_teid == Some(teid) {
                other.fwd_teid = None;
                other.state = TunnelState::PdcpActive;
                other.rx_timer.stop();
            }
            if other.standby_teid == Some(teid) {
                other.unpair_standby();
            }
            if other.preferred_teid == Some(teid) {
                other.preferred_teid = None;
            }
        }

        let discarded_sdus = tunnel.buffer.len();
        if discarded_sdus > 0 {
            warn!(
                self.logger,
                "Discarded {} buffered SDUs of TEID {:#x}", discarded_sdus, teid
            );
        }
        self.events.push(TunnelEvent::Removed {
            teid,
            rnti: tunnel.rnti,
            eps_bearer_id: tunnel.eps_bearer_id,
            discarded_sdus,
        });

        self.release_forwarding_target(tunnel.fwd_teid.take());

        // The standby of a priority pair takes over from its preferred tunnel.
        if let Some(standby_teid) = tunnel.standby_teid {
            if self.pool.get(standby_teid).is_some() {
                let _ = self.activate_tunnel(standby_teid);
            }
        }
        true
    }

    /// Remove every tunnel of one bearer.
    pub fn remove_bearer(&mut self, rnti: u16, eps_bearer_id: u8) -> bool {
        let teids: Vec<u32> = self
            .find_rnti_bearer_tunnels(rnti, eps_bearer_id)
            .iter()
            .map(|t| t.teid)
            .collect();
        self.remove_tunnels(teids)
    }

    /// Remove every tunnel of a UE (UE context release).
    pub fn remove_rnti(&mut self, rnti: u16) -> bool {
        let teids: Vec<u32> = self
            .find_rnti_tunnels(rnti)
            .iter()
            .map(|t| t.teid)
            .collect();
        if !teids.is_empty() {
            info!(self.logger, "Removing all tunnels of rnti={:#x}", rnti);
        }
        self.remove_tunnels(teids)
    }

    // Buffered data of a group of tunnels that is going away together is discarded rather
    // than flushed by standby promotion.
    fn remove_tunnels(&mut self, teids: Vec<u32>) -> bool {
        if teids.is_empty() {
            return false;
        }
        for teid in teids.iter() {
            if let Some(tunnel) = self.pool.get_mut(*teid) {
                if tunnel.standby_teid.is_some_and(|s| teids.contains(&s)) {
                    tunnel.standby_teid = None;
                }
            }
        }
        for teid in teids {
            self.remove_tunnel(teid);
        }
        true
    }

    /// Move a UE's tunnels from one RNTI to another, leaving TEIDs and state untouched.
    pub fn update_rnti(&mut self, old_rnti: u16, new_rnti: u16) -> bool {
        if !self.rnti_index.rekey(old_rnti, new_rnti) {
            warn!(
                self.logger,
                "Cannot move tunnels from rnti={:#x} to rnti={:#x}", old_rnti, new_rnti
            );
            return false;
        }
        for bearer_teid in self.rnti_index.tunnels(new_rnti) {
            if let Some(tunnel) = self.pool.get_mut(bearer_teid.teid) {
                tunnel.rnti = new_rnti;
            }
        }
        info!(
            self.logger,
            "Moved tunnels from rnti={:#x} to rnti={:#x}", old_rnti, new_rnti
        );
        true
    }

    /// Advance the logical clock.  Returns the TEIDs whose rx timer has expired; those
    /// timers are stopped.
    pub fn advance_clock(&mut self, elapsed_msec: u64) -> Vec<u32> {
        self.now_msec += elapsed_msec;
        let now = self.now_msec;
        let pool = &mut self.pool;
        let mut expired = vec![];
        self.timed_teids.retain(|teid| match pool.get_mut(*teid) {
            Some(tunnel) if tunnel.rx_timer.has_expired(now) => {
                tunnel.rx_timer.stop();
                expired.push(*teid);
                false
            }
            Some(tunnel) => tunnel.rx_timer.is_running(),
            None => false,
        });
        expired
    }

    // A forwarding tunnel exists only to carry its source's traffic, so it goes once no
    // tunnel forwards to it any more.
    fn release_forwarding_target(&mut self, fwd_teid: Option<u32>) {
        let Some(fwd_teid) = fwd_teid else {
            return;
        };
        let orphaned = self
            .pool
            .get(fwd_teid)
            .is_some_and(|t| t.state == TunnelState::ForwardedFrom)
            && !self.pool.iter().any(|t| t.fwd_teid == Some(fwd_teid));
        if orphaned {
            debug!(
                self.logger,
                "Nothing forwards to TEID {:#x} any more, removing it", fwd_teid
            );
            self.remove_tunnel(fwd_teid);
        }
    }

    fn arm(&mut self, teid: u32) {
        if !self.timed_teids.contains(&teid) {
            self.timed_teids.push(teid);
        }
    }

    fn tunnel_mut(&mut self, teid: u32) -> Result<&mut Tunnel, GtpuError> {
        self.pool.get_mut(teid).ok_or_else(|| {
            warn!(self.logger, "Unknown TEID {:#x}", teid);
            GtpuError::UnknownTeid(teid)
        })
    }
}
