use anyhow::{Result, ensure};
use serde::Deserialize;
use slog::{Logger, error, info};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::tunnels::MAX_TUNNELS_PER_UE;

// The pool slot of a tunnel is carried in the low 16 bits of its TEID.
const MAX_POOL_SLOTS: usize = 1 << 16;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    // Address on which the GTP-U socket is bound.
    pub local_ip: IpAddr,

    // GTP-U UDP port.  0 means an ephemeral port (used by tests).
    pub gtpu_port: u16,

    // Number of UEs the tunnel pool is sized for.  Each UE may own up to 10 tunnels.
    pub max_users: usize,

    // How long the indirect tunnel of a priority pair, or the source of a forwarding
    // chain, may go without traffic before it is switched over as if an End Marker had arrived.
    pub indirect_tunnel_timeout_msec: u64,

    // Period of the cooperative clock that drives the tunnel timers.
    pub tick_interval_msec: u64,

    // Maximum number of SDUs held by a tunnel in the buffering state.
    pub buffer_capacity: usize,

    // What to do with an SDU that arrives when the buffer is full.
    pub buffer_overflow_policy: BufferOverflowPolicy,

    // Tunnels created at startup by the standalone daemon.
    #[serde(rename = "tunnel")]
    pub tunnels: Vec<StaticTunnel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferOverflowPolicy {
    /// Evict the oldest buffered SDU to make room for the new one.
    #[default]
    DropOldest,
    /// Keep the buffer as it is and drop the new SDU.
    RejectNew,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticTunnel {
    pub rnti: u16,
    pub eps_bearer_id: u8,
    pub teid_out: u32,
    pub remote_addr: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            local_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            gtpu_port: gtpu::GTPU_PORT,
            max_users: 64,
            indirect_tunnel_timeout_msec: 500,
            tick_interval_msec: 1,
            buffer_capacity: 512,
            buffer_overflow_policy: BufferOverflowPolicy::DropOldest,
            tunnels: vec![],
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.local_ip.is_unspecified(),
            "Unspecified local IP {} not allowed - this must be an address that GTP-U peers can send to",
            self.local_ip
        );
        ensure!(self.max_users > 0, "max_users must be at least 1");
        ensure!(
            self.max_users * MAX_TUNNELS_PER_UE <= MAX_POOL_SLOTS,
            "max_users must be at most {}",
            MAX_POOL_SLOTS / MAX_TUNNELS_PER_UE
        );
        ensure!(self.buffer_capacity > 0, "buffer_capacity must be at least 1");
        ensure!(
            self.tick_interval_msec > 0,
            "tick_interval_msec must be at least 1"
        );
        Ok(())
    }

    pub fn tunnel_pool_size(&self) -> usize {
        self.max_users * MAX_TUNNELS_PER_UE
    }
}

/// Load the node configuration from a TOML file.  Missing fields take their default values.
pub fn load_config_file(filename: &str, logger: &Logger) -> Result<Config> {
    let path = std::env::current_dir()?;
    let contents = fs::read_to_string(filename).inspect_err(|e| {
        error!(
            logger,
            "Failed to load config file {filename} (current directory {}) with error code {e}",
            path.display()
        )
    })?;
    let config: Config = toml::from_str(&contents)?;
    info!(
        logger,
        "Loaded config from {filename} with {} static tunnels",
        config.tunnels.len()
    );
    Ok(config)
}
