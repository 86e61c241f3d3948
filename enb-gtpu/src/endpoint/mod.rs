mod counters;
mod gtpu_endpoint;
mod socket;

pub use counters::{GtpuCounters, counter_indices, dump_stats};
pub use gtpu_endpoint::GtpuEndpoint;
pub use socket::{ReceivePipeline, create_gtpu_socket};
