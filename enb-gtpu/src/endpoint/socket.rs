use super::counters::{GtpuCounters, counter_indices::*};
use crate::control::StackTask;
use anyhow::{Context, Result};
use async_channel::Sender;
use async_std::net::UdpSocket;
use async_std::task::{self, JoinHandle};
use atomic_counter::AtomicCounter;
use slog::{Logger, info, warn};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use stop_token::StopToken;
use stop_token::prelude::*;

// The largest UDP payload.  The receive buffer has one byte more, so that filling it
// means the datagram was truncated.
const MAX_DATAGRAM_LEN: usize = 65535;

/// Open the GTP-U UDP socket.  Port 0 binds an ephemeral port.
pub fn create_gtpu_socket(
    local_ip: IpAddr,
    port: u16,
    logger: &Logger,
) -> Result<std::net::UdpSocket> {
    let transport_address = SocketAddr::new(local_ip, port);
    let domain = match local_ip {
        IpAddr::V4(_) => Domain::IPV4,
        IpAddr::V6(_) => Domain::IPV6,
    };

    let gtpu_socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    gtpu_socket.set_reuse_port(true)?;
    gtpu_socket
        .bind(&transport_address.into())
        .context(format!("Failed to bind {}", transport_address))?;
    let gtpu_socket: std::net::UdpSocket = gtpu_socket.into();
    info!(logger, "Serving GTP-U on {}", gtpu_socket.local_addr()?);
    Ok(gtpu_socket)
}

/// Reads datagrams off the socket and queues them for the stack-processing task.
pub struct ReceivePipeline<P> {
    socket: UdpSocket,
    sender: Sender<StackTask<P>>,
    counters: Arc<GtpuCounters>,
}

impl<P: 'static> ReceivePipeline<P> {
    pub fn new(
        socket: UdpSocket,
        sender: Sender<StackTask<P>>,
        counters: Arc<GtpuCounters>,
    ) -> Self {
        ReceivePipeline {
            socket,
            sender,
            counters,
        }
    }

    pub fn run(self, stop_token: StopToken, logger: Logger) -> JoinHandle<()> {
        task::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_LEN + 1];
            loop {
                match self
                    .socket
                    .recv_from(&mut buf)
                    .timeout_at(stop_token.clone())
                    .await
                {
                    Err(_) => break,
                    Ok(Err(e)) => {
                        warn!(logger, "Exiting GTP-U receive pipeline with error {e}");
                        break;
                    }
                    Ok(Ok((bytes_read, peer))) => {
                        if bytes_read == buf.len() {
                            self.counters[DROP_MALFORMED].inc();
                            continue;
                        }
                        let bytes = buf[..bytes_read].to_vec();
                        if self
                            .sender
                            .send(StackTask::Datagram { bytes, peer })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                }
            }
            info!(logger, "GTP-U receive pipeline stopped");
        })
    }
}
