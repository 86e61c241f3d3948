//! interfaces - the collaborators of the GTP-U endpoint
use crate::GtpuError;
use std::io::ErrorKind;
use std::net::SocketAddr;

// How often a send that would block is retried before the datagram is given up.
const SEND_RETRIES: usize = 64;

/// PDCP as seen from GTP-U: the consumer of downlink SDUs.
pub trait PdcpInterface {
    /// Hand over one SDU.  An error means PDCP did not take it and it is lost.
    fn deliver_sdu(
        &mut self,
        rnti: u16,
        eps_bearer_id: u8,
        sdu: Vec<u8>,
        pdcp_sn: Option<u16>,
    ) -> Result<(), GtpuError>;
}

/// Where the endpoint writes outgoing GTP-U datagrams.
pub trait DatagramSink {
    fn send_to(&mut self, datagram: &[u8], addr: SocketAddr) -> std::io::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredSdu {
    pub rnti: u16,
    pub eps_bearer_id: u8,
    pub sdu: Vec<u8>,
    pub pdcp_sn: Option<u16>,
}

impl PdcpInterface for Vec<DeliveredSdu> {
    fn deliver_sdu(
        &mut self,
        rnti: u16,
        eps_bearer_id: u8,
        sdu: Vec<u8>,
        pdcp_sn: Option<u16>,
    ) -> Result<(), GtpuError> {
        self.push(DeliveredSdu {
            rnti,
            eps_bearer_id,
            sdu,
            pdcp_sn,
        });
        Ok(())
    }
}

// Lets a PDCP running in another task receive SDUs over a channel.  The stack task must
// not wait, so a full or closed channel loses the SDU.
impl PdcpInterface for async_channel::Sender<DeliveredSdu> {
    fn deliver_sdu(
        &mut self,
        rnti: u16,
        eps_bearer_id: u8,
        sdu: Vec<u8>,
        pdcp_sn: Option<u16>,
    ) -> Result<(), GtpuError> {
        self.try_send(DeliveredSdu {
            rnti,
            eps_bearer_id,
            sdu,
            pdcp_sn,
        })
        .map_err(|e| GtpuError::PdcpUnavailable {
            rnti,
            eps_bearer_id,
            reason: if e.is_full() {
                "queue full"
            } else {
                "queue closed"
            },
        })
    }
}

// The node's transmit socket shares its file description with the async receive socket,
// which is non-blocking, so a full send buffer shows up as WouldBlock.
impl DatagramSink for std::net::UdpSocket {
    fn send_to(&mut self, datagram: &[u8], addr: SocketAddr) -> std::io::Result<()> {
        send_retrying(|| std::net::UdpSocket::send_to(self, datagram, addr))
    }
}

fn send_retrying(mut send: impl FnMut() -> std::io::Result<usize>) -> std::io::Result<()> {
    let mut retries = 0;
    loop {
        match send() {
            Err(e)
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted)
                    && retries < SEND_RETRIES =>
            {
                retries += 1;
                std::thread::yield_now();
            }
            result => return result.map(|_| ()),
        }
    }
}

impl DatagramSink for Vec<(Vec<u8>, SocketAddr)> {
    fn send_to(&mut self, datagram: &[u8], addr: SocketAddr) -> std::io::Result<()> {
        self.push((datagram.to_vec(), addr));
        Ok(())
    }
}
