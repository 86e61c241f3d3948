use anyhow::{Result, bail};
use async_channel::{Receiver, Sender};
use async_std::future;
use enb_gtpu::{Config, DeliveredSdu, GtpuHandle, GtpuNode, TunnelControl, TunnelInfo};
use slog::{Drain, Logger, o};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

pub type TestPdcp = Sender<DeliveredSdu>;

/// A GTP-U node on the loopback interface whose PDCP output is readable by the test.
pub struct TestNode {
    pub node: GtpuNode<TestPdcp>,
    pub handle: GtpuHandle<TestPdcp>,
    pdcp: Receiver<DeliveredSdu>,
}

pub async fn init() -> Result<(TestNode, Logger)> {
    init_with(test_config()).await
}

pub async fn init_with(config: Config) -> Result<(TestNode, Logger)> {
    exit_on_panic();
    let logger = init_logging();
    let node = start_node(config, &logger).await?;
    Ok((node, logger))
}

pub fn test_config() -> Config {
    Config {
        local_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        gtpu_port: 0,
        ..Config::default()
    }
}

fn exit_on_panic() {
    let orig_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        orig_hook(panic_info);
        std::process::exit(1);
    }));
}

fn init_logging() -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::CompactFormat::new(decorator).build();
    let drain = std::sync::Mutex::new(drain).fuse();
    let drain = slog_envlogger::new(drain);
    slog::Logger::root(drain, o!())
}

async fn start_node(config: Config, logger: &Logger) -> Result<TestNode> {
    let (pdcp_sender, pdcp) = async_channel::unbounded();
    let node = GtpuNode::start(config, pdcp_sender, logger.new(o!("enb" => 1))).await?;
    let handle = node.handle();
    Ok(TestNode { node, handle, pdcp })
}

impl TestNode {
    pub fn addr(&self) -> SocketAddr {
        self.node.local_addr()
    }

    /// Wait up to a second for PDCP to be handed an SDU.
    pub async fn recv_sdu(&self) -> Result<DeliveredSdu> {
        Ok(future::timeout(Duration::from_secs(1), self.pdcp.recv()).await??)
    }

    pub fn no_sdu_pending(&self) -> bool {
        self.pdcp.try_recv().is_err()
    }

    pub async fn tunnel(&self, teid: u32) -> Result<Option<TunnelInfo>> {
        self.handle.tunnel_info(teid).await
    }

    /// Poll until the tunnel holds `count` buffered SDUs.
    pub async fn wait_for_buffered(&self, teid: u32, count: usize) -> Result<()> {
        for _ in 0..200 {
            match self.tunnel(teid).await? {
                Some(info) if info.buffered_sdus == count => return Ok(()),
                Some(_) => async_std::task::sleep(Duration::from_millis(5)).await,
                None => bail!("Tunnel {teid:#x} has gone"),
            }
        }
        bail!("Tunnel {teid:#x} never buffered {count} SDUs")
    }

    pub async fn shutdown(self) {
        self.node.graceful_shutdown().await
    }
}
