use super::counters::{GtpuCounters, counter_indices::*};
use crate::tunnels::TunnelManager;
use crate::{DatagramSink, GtpuError, PdcpInterface, TunnelState};
use atomic_counter::AtomicCounter;
use gtpu::{GtpuHeader, MessageType, RECOVERY_IE};
use slog::{Logger, debug, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

/// The UDP-facing side of the eNB user plane.  Decodes inbound GTP-U, drives the tunnel
/// manager, and encodes everything that goes back out.
pub struct GtpuEndpoint<S, P> {
    manager: TunnelManager<P>,
    socket: S,
    counters: Arc<GtpuCounters>,
    logger: Logger,
}

impl<S: DatagramSink, P: PdcpInterface> GtpuEndpoint<S, P> {
    pub fn new(
        manager: TunnelManager<P>,
        socket: S,
        counters: Arc<GtpuCounters>,
        logger: &Logger,
    ) -> Self {
        GtpuEndpoint {
            manager,
            socket,
            counters,
            logger: logger.clone(),
        }
    }

    pub fn manager(&self) -> &TunnelManager<P> {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut TunnelManager<P> {
        &mut self.manager
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    pub fn counters(&self) -> &GtpuCounters {
        &self.counters
    }

    pub fn handle_rx_packet(&mut self, packet: &[u8], peer: SocketAddr) {
        self.counters[RX_PKTS].inc();
        self.counters[RX_BYTES].add(packet.len());

        let (header, payload) = match GtpuHeader::decode(packet).map_err(GtpuError::from) {
            Ok(x) => x,
            Err(e) => {
                self.counters[DROP_MALFORMED].inc();
                debug!(
                    self.logger,
                    "Dropped GTP-U packet from {}: {}", peer, e;
                    "head" => hex::encode(&packet[..packet.len().min(16)])
                );
                return;
            }
        };

        match header.message_type {
            MessageType::GPdu => self.handle_gpdu(&header, payload),
            MessageType::EndMarker => {
                self.counters[END_MARKERS_RX].inc();
                if self.manager.find_tunnel(header.teid).is_some() {
                    self.handle_end_marker(header.teid);
                } else {
                    self.counters[DROP_UNKNOWN_TEID].inc();
                    debug!(
                        self.logger,
                        "End Marker for unknown TEID {:#x} from {}", header.teid, peer
                    );
                }
            }
            MessageType::EchoRequest => {
                debug!(self.logger, "Echo Request from {}", peer);
                let response = GtpuHeader::echo_response(header.seq_number);
                self.transmit(&response, &RECOVERY_IE, peer);
            }
            MessageType::EchoResponse => {
                debug!(self.logger, "Echo Response from {}", peer);
            }
            other => {
                self.counters[DROP_UNHANDLED_TYPE].inc();
                debug!(
                    self.logger,
                    "Unhandled GTP-U message type {:?} from {} for TEID {:#x}",
                    other,
                    peer,
                    header.teid
                );
            }
        }
    }

    fn handle_gpdu(&mut self, header: &GtpuHeader, payload: &[u8]) {
        let teid = header.teid;
        let Some(tunnel) = self.manager.find_tunnel(teid) else {
            self.counters[DROP_UNKNOWN_TEID].inc();
            debug!(self.logger, "G-PDU for unknown TEID {:#x}", teid);
            return;
        };
        let pdcp_sn = header.pdcp_sn();

        match tunnel.state() {
            TunnelState::PdcpActive => {
                let (rnti, eps_bearer_id) = (tunnel.rnti(), tunnel.eps_bearer_id());
                let result = self.manager.pdcp_mut().deliver_sdu(
                    rnti,
                    eps_bearer_id,
                    payload.to_vec(),
                    pdcp_sn,
                );
                self.manager.handle_rx_pdcp_sdu(teid);
                match result {
                    Ok(()) => {
                        self.counters[DELIVERED].inc();
                    }
                    Err(e) => {
                        self.counters[DROP_PDCP_REJECTED].inc();
                        debug!(self.logger, "Dropped G-PDU on TEID {:#x}: {}", teid, e);
                    }
                }
            }
            TunnelState::Buffering => {
                match self
                    .manager
                    .buffer_pdcp_sdu(teid, pdcp_sn, payload.to_vec())
                {
                    Ok(None) => {
                        self.counters[BUFFERED].inc();
                    }
                    Ok(Some(_evicted)) => {
                        self.counters[BUFFERED].inc();
                        self.counters[DROP_BUFFER_FULL].inc();
                    }
                    Err(e) => {
                        self.counters[DROP_BUFFER_FULL].inc();
                        debug!(self.logger, "Dropped G-PDU: {}", e);
                    }
                }
            }
            TunnelState::ForwardTo => {
                let Some(fwd_teid) = tunnel.fwd_teid() else {
                    self.counters[DROP_NOT_ACTIVE].inc();
                    return;
                };
                if self.send_pdu_to_tunnel(fwd_teid, pdcp_sn, payload) {
                    self.manager.handle_forwarded_sdu(teid);
                    self.counters[FORWARDED].inc();
                }
            }
            TunnelState::ForwardedFrom | TunnelState::Inactive => {
                self.counters[DROP_NOT_ACTIVE].inc();
                debug!(
                    self.logger,
                    "Dropped G-PDU on TEID {:#x} in state {}",
                    teid,
                    tunnel.state()
                );
            }
        }
    }

    /// The old path of a handover has delivered its last packet.
    pub fn handle_end_marker(&mut self, teid: u32) {
        let Some(tunnel) = self.manager.find_tunnel(teid) else {
            return;
        };
        info!(
            self.logger,
            "Received End Marker for rnti={:#x} on TEID {:#x}",
            tunnel.rnti(),
            teid
        );
        if tunnel.state() == TunnelState::ForwardTo || tunnel.standby_teid().is_some() {
            self.switch_over(teid);
        } else {
            debug!(
                self.logger,
                "TEID {:#x} is neither forwarding nor preferred, ignoring End Marker", teid
            );
        }
    }

    // Retire a tunnel whose path is finished.  A forwarding tunnel first passes the End
    // Marker on, so that the target can switch over in turn.  Removing a preferred tunnel
    // activates its standby.
    fn switch_over(&mut self, teid: u32) {
        if let Some(fwd_teid) = self
            .manager
            .find_tunnel(teid)
            .filter(|t| t.state() == TunnelState::ForwardTo)
            .and_then(|t| t.fwd_teid())
        {
            self.send_end_marker(fwd_teid);
        }
        self.manager.remove_tunnel(teid);
    }

    /// Send an End Marker to the peer of a tunnel.  Returns false if there is no such tunnel
    /// or the send failed.
    pub fn send_end_marker(&mut self, teid: u32) -> bool {
        let Some(tunnel) = self.manager.find_tunnel(teid) else {
            warn!(self.logger, "No tunnel {:#x} to send End Marker on", teid);
            return false;
        };
        let header = GtpuHeader::end_marker(tunnel.teid_out());
        let remote_addr = tunnel.remote_addr();
        info!(
            self.logger,
            "Sending End Marker to {} for TEID {:#x}", remote_addr, teid
        );
        let sent = self.transmit(&header, &[], remote_addr);
        if sent {
            self.counters[END_MARKERS_TX].inc();
        }
        sent
    }

    /// Advance the tunnel timers.  Each tunnel that has gone quiet is switched over exactly
    /// as if it had received an End Marker.
    pub fn tick(&mut self, elapsed_msec: u64) {
        for teid in self.manager.advance_clock(elapsed_msec) {
            self.counters[TIMEOUTS].inc();
            info!(
                self.logger,
                "TEID {:#x} timed out without End Marker, switching over", teid
            );
            self.switch_over(teid);
        }
    }

    /// Send an uplink SDU from PDCP to the core network.
    pub fn write_pdu(&mut self, rnti: u16, eps_bearer_id: u8, sdu: &[u8]) -> bool {
        let manager = &self.manager;
        let Some(teid) = manager
            .find_rnti_bearer_tunnels(rnti, eps_bearer_id)
            .iter()
            .map(|t| t.teid)
            .find(|teid| {
                manager
                    .find_tunnel(*teid)
                    .is_some_and(|t| t.state() != TunnelState::ForwardedFrom)
            })
        else {
            debug!(
                self.logger,
                "No uplink tunnel for rnti={:#x} eps_bearer_id={}", rnti, eps_bearer_id
            );
            return false;
        };
        self.send_pdu_to_tunnel(teid, None, sdu)
    }

    /// Send an SDU held by PDCP to the handover target over the bearer's forwarding tunnel.
    pub fn forward_pdcp_sdu(
        &mut self,
        rnti: u16,
        eps_bearer_id: u8,
        pdcp_sn: u16,
        sdu: &[u8],
    ) -> bool {
        let manager = &self.manager;
        let Some(teid) = manager
            .find_rnti_bearer_tunnels(rnti, eps_bearer_id)
            .iter()
            .map(|t| t.teid)
            .find(|teid| {
                manager
                    .find_tunnel(*teid)
                    .is_some_and(|t| t.state() == TunnelState::ForwardedFrom)
            })
        else {
            debug!(
                self.logger,
                "No forwarding tunnel for rnti={:#x} eps_bearer_id={}", rnti, eps_bearer_id
            );
            return false;
        };
        let sent = self.send_pdu_to_tunnel(teid, Some(pdcp_sn), sdu);
        if sent {
            self.counters[FORWARDED].inc();
        }
        sent
    }

    fn send_pdu_to_tunnel(&mut self, teid: u32, pdcp_sn: Option<u16>, payload: &[u8]) -> bool {
        let Some(tunnel) = self.manager.find_tunnel(teid) else {
            self.counters[DROP_UNKNOWN_TEID].inc();
            return false;
        };
        let header = GtpuHeader::gpdu(tunnel.teid_out()).with_pdcp_sn(pdcp_sn);
        let remote_addr = tunnel.remote_addr();
        self.transmit(&header, payload, remote_addr)
    }

    fn transmit(&mut self, header: &GtpuHeader, payload: &[u8], addr: SocketAddr) -> bool {
        let datagram = match header.encode(payload) {
            Ok(datagram) => datagram,
            Err(e) => {
                self.counters[DROP_TX_FAILURE].inc();
                warn!(self.logger, "Failed to encode {:?}: {}", header.message_type, e);
                return false;
            }
        };
        if let Err(e) = self.socket.send_to(&datagram, addr) {
            self.counters[DROP_TX_FAILURE].inc();
            warn!(self.logger, "Failed to send to {}: {}", addr, e);
            return false;
        }
        self.counters[TX_PKTS].inc();
        true
    }
}
