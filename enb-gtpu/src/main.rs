//! main - runs a standalone eNB GTP-U user plane

use anyhow::Result;
use async_std::channel::Sender;
use async_std::prelude::*;
use clap::Parser;
use enb_gtpu::{Config, GtpuError, GtpuNode, PdcpInterface, TunnelControl, load_config_file};
use signal_hook::consts::signal::*;
use signal_hook_async_std::Signals;
use slog::{Drain, Logger, debug, info, o, warn};
use std::net::IpAddr;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file.  Without one, built-in defaults are used.
    #[arg(long)]
    config: Option<String>,

    /// Local IP address on which to bind the GTP-U socket.  Defaults to
    /// the address of the first network interface.
    #[arg(long)]
    local_ip: Option<IpAddr>,

    /// GTP-U UDP port.
    #[arg(long)]
    gtpu_port: Option<u16>,

    /// How long an indirect (forwarding) tunnel may stay silent before the
    /// switch-over to the direct path happens without an End Marker.
    #[arg(long)]
    indirect_tunnel_timeout_msec: Option<u64>,
}

// Stands in for the PDCP layer when running without a radio stack.
struct LoggingPdcp {
    logger: Logger,
}

impl PdcpInterface for LoggingPdcp {
    fn deliver_sdu(
        &mut self,
        rnti: u16,
        eps_bearer_id: u8,
        sdu: Vec<u8>,
        pdcp_sn: Option<u16>,
    ) -> Result<(), GtpuError> {
        debug!(
            self.logger,
            "SDU for rnti={:#x} eps_bearer_id={} pdcp_sn={:?} len={}",
            rnti,
            eps_bearer_id,
            pdcp_sn,
            sdu.len()
        );
        Ok(())
    }
}

#[async_std::main]
async fn main() -> Result<()> {
    exit_on_panic();
    let logger = init_logging();

    let args = Args::parse();
    let config = build_config(args, &logger)?;
    let static_tunnels = config.tunnels.clone();

    let pdcp = LoggingPdcp {
        logger: logger.new(o!("pdcp" => 1)),
    };
    let node = GtpuNode::start(config, pdcp, logger.clone()).await?;

    let handle = node.handle();
    for t in static_tunnels {
        match handle
            .add_tunnel(t.rnti, t.eps_bearer_id, t.teid_out, t.remote_addr)
            .await
        {
            Ok(teid) => info!(
                &logger,
                "Static tunnel rnti={:#x} eps_bearer_id={} has local TEID {:#x}",
                t.rnti,
                t.eps_bearer_id,
                teid
            ),
            Err(e) => warn!(&logger, "Failed to add static tunnel {:?} - {e}", t),
        }
    }

    wait_for_signal().await?;
    node.graceful_shutdown().await;

    Ok(())
}

fn build_config(args: Args, logger: &Logger) -> Result<Config> {
    let mut config = match &args.config {
        Some(filename) => load_config_file(filename, logger)?,
        None => Config {
            local_ip: local_ip_address::local_ip()?,
            ..Config::default()
        },
    };
    if let Some(local_ip) = args.local_ip {
        config.local_ip = local_ip;
    }
    if let Some(gtpu_port) = args.gtpu_port {
        config.gtpu_port = gtpu_port;
    }
    if let Some(timeout) = args.indirect_tunnel_timeout_msec {
        config.indirect_tunnel_timeout_msec = timeout;
    }
    config.validate()?;
    Ok(config)
}

fn init_logging() -> Logger {
    // Use info level logging by default
    if std::env::var("RUST_LOG").is_err() {
        unsafe { std::env::set_var("RUST_LOG", "info") }
    }
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let drain = slog_envlogger::new(drain);
    slog::Logger::root(drain, o!())
}

fn exit_on_panic() {
    let orig_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        orig_hook(panic_info);
        std::process::exit(1);
    }));
}

async fn wait_for_signal() -> Result<i32> {
    let signals = Signals::new([SIGTERM, SIGINT, SIGQUIT])?;
    let handle = signals.handle();
    let (sig_sender, sig_receiver) = async_std::channel::unbounded();
    let signals_task = async_std::task::spawn(handle_signals(signals, sig_sender));
    let signal = sig_receiver.recv().await;
    handle.close();
    signals_task.await;
    Ok(signal?)
}

async fn handle_signals(signals: Signals, sig_sender: Sender<i32>) {
    let mut signals = signals.fuse();
    while let Some(signal) = signals.next().await {
        if matches!(signal, SIGTERM | SIGINT | SIGQUIT) {
            let _ = sig_sender.send(signal).await;
        }
    }
}
