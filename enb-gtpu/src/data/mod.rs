mod config;
mod tunnel_event;
mod tunnel_info;

pub use config::*;
pub use tunnel_event::*;
pub use tunnel_info::*;
