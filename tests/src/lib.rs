mod mock_peer;
pub mod framework;

pub use mock_peer::{MockPeer, build_ipv4_udp_packet};
