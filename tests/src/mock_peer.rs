use anyhow::{Result, ensure};
use async_net::UdpSocket;
use async_std::future;
use gtpu::{GtpuHeader, MessageType};
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::MutableIpv4Packet;
use pnet_packet::udp::MutableUdpPacket;
use slog::{Logger, info};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

const TEST_UDP_PORT: u16 = 23215;

/// A GTP-U peer of the node under test: the core network's S-GW, or another eNB.
pub struct MockPeer {
    gtpu_socket: UdpSocket,
    logger: Logger,
}

impl MockPeer {
    pub async fn new(name: &str, logger: &Logger) -> Result<Self> {
        let gtpu_socket = UdpSocket::bind("127.0.0.1:0").await?;
        info!(logger, "{name} serving GTP-U on {}", gtpu_socket.local_addr()?);
        Ok(MockPeer {
            gtpu_socket,
            logger: logger.clone(),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        // The socket is bound, so it has an address.
        self.gtpu_socket.local_addr().unwrap()
    }

    pub async fn send_gpdu(
        &self,
        to: SocketAddr,
        teid: u32,
        pdcp_sn: Option<u16>,
        payload: &[u8],
    ) -> Result<()> {
        let packet = GtpuHeader::gpdu(teid)
            .with_pdcp_sn(pdcp_sn)
            .encode(payload)?;
        info!(
            self.logger,
            "Send G-PDU with TEID {:#x}, pdcp_sn {:?}, {} bytes",
            teid,
            pdcp_sn,
            payload.len()
        );
        self.gtpu_socket.send_to(&packet, to).await?;
        Ok(())
    }

    pub async fn send_end_marker(&self, to: SocketAddr, teid: u32) -> Result<()> {
        let packet = GtpuHeader::end_marker(teid).encode(&[])?;
        info!(self.logger, "Send End Marker with TEID {:#x}", teid);
        self.gtpu_socket.send_to(&packet, to).await?;
        Ok(())
    }

    pub async fn send_echo_request(&self, to: SocketAddr, seq_number: u16) -> Result<()> {
        let mut header = GtpuHeader::new(MessageType::EchoRequest, 0);
        header.seq_number = Some(seq_number);
        self.gtpu_socket.send_to(&header.encode(&[])?, to).await?;
        Ok(())
    }

    /// Wait up to a second for a GTP-U message.
    pub async fn recv_gtpu(&self) -> Result<(GtpuHeader, Vec<u8>)> {
        let mut buf = vec![0u8; 2000];
        let future_result = self.gtpu_socket.recv_from(&mut buf);
        let (bytes_received, _source_address) =
            future::timeout(Duration::from_secs(1), future_result).await??;
        let (header, payload) = GtpuHeader::decode(&buf[..bytes_received])?;
        info!(
            self.logger,
            "Received {:?} with TEID {:#x}", header.message_type, header.teid
        );
        let payload = payload.to_vec();
        Ok((header, payload))
    }

    pub async fn recv_gpdu(&self, teid: u32) -> Result<(Option<u16>, Vec<u8>)> {
        let (header, payload) = self.recv_gtpu().await?;
        ensure!(
            header.message_type == MessageType::GPdu,
            "Expected G-PDU, got {:?}",
            header.message_type
        );
        ensure!(header.teid == teid, "Expected TEID {teid:#x}, got {:#x}", header.teid);
        Ok((header.pdcp_sn(), payload))
    }
}

/// Build a small IPv4/UDP packet to use as a user-plane SDU.
pub fn build_ipv4_udp_packet(src: Ipv4Addr, dst: Ipv4Addr, data: &[u8]) -> Vec<u8> {
    const IPV4_HEADER_LEN: usize = 20;
    const UDP_HEADER_LEN: usize = 8;
    let udp_len = UDP_HEADER_LEN + data.len();
    let mut packet = vec![0u8; IPV4_HEADER_LEN + udp_len];

    let mut ipv4_packet = MutableIpv4Packet::new(&mut packet).unwrap();
    ipv4_packet.set_version(4);
    ipv4_packet.set_header_length(5);
    ipv4_packet.set_total_length((IPV4_HEADER_LEN + udp_len) as u16);
    ipv4_packet.set_ttl(64);
    ipv4_packet.set_next_level_protocol(IpNextHeaderProtocols::Udp);
    ipv4_packet.set_source(src);
    ipv4_packet.set_destination(dst);
    let checksum = pnet_packet::ipv4::checksum(&ipv4_packet.to_immutable());
    ipv4_packet.set_checksum(checksum);

    let mut udp_packet = MutableUdpPacket::new(&mut packet[IPV4_HEADER_LEN..]).unwrap();
    udp_packet.set_source(TEST_UDP_PORT);
    udp_packet.set_destination(TEST_UDP_PORT);
    udp_packet.set_length(udp_len as u16);
    udp_packet.set_payload(data);
    let checksum = pnet_packet::udp::ipv4_checksum(&udp_packet.to_immutable(), &src, &dst);
    udp_packet.set_checksum(checksum);

    packet
}
