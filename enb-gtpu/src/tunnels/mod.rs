mod rnti_index;
mod rx_timer;
mod sdu_buffer;
mod tunnel;
mod tunnel_manager;
mod tunnel_pool;

pub use rnti_index::{BearerTeid, MAX_TUNNELS_PER_UE, RntiIndex};
pub use rx_timer::RxTimer;
pub use sdu_buffer::{BufferedSdu, SduBuffer};
pub use tunnel::Tunnel;
pub use tunnel_manager::TunnelManager;
use tunnel_pool::TunnelPool;
