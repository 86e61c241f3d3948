use atomic_counter::{AtomicCounter, RelaxedCounter};
use derive_deref::Deref;
use slog::{Logger, info, warn};
use std::sync::Arc;
use stop_token::StopToken;
use stop_token::prelude::*;

pub mod counter_indices {
    pub const RX_PKTS: usize = 0;
    pub const RX_BYTES: usize = 1;
    pub const TX_PKTS: usize = 2;
    pub const DELIVERED: usize = 3;
    pub const BUFFERED: usize = 4;
    pub const FORWARDED: usize = 5;
    pub const END_MARKERS_RX: usize = 6;
    pub const END_MARKERS_TX: usize = 7;
    pub const TIMEOUTS: usize = 8;
    // Everything from here on is a drop counter and gets a warning when it moves.
    pub const DROP_MALFORMED: usize = 9;
    pub const DROP_UNKNOWN_TEID: usize = 10;
    pub const DROP_NOT_ACTIVE: usize = 11;
    pub const DROP_BUFFER_FULL: usize = 12;
    pub const DROP_UNHANDLED_TYPE: usize = 13;
    pub const DROP_TX_FAILURE: usize = 14;
    pub const DROP_PDCP_REJECTED: usize = 15;
    pub const NUM_COUNTERS: usize = 16;
}
use counter_indices::*;

/// Packet counters of a GTP-U endpoint, shared with the stats task.
#[derive(Deref)]
pub struct GtpuCounters([RelaxedCounter; NUM_COUNTERS]);

impl Default for GtpuCounters {
    fn default() -> Self {
        GtpuCounters(std::array::from_fn(|_| RelaxedCounter::new(0)))
    }
}

impl GtpuCounters {
    pub fn snapshot(&self) -> [usize; NUM_COUNTERS] {
        std::array::from_fn(|idx| self[idx].get())
    }
}

/// Log the counters every 5 seconds if there has been any traffic, and warn about new drops.
pub async fn dump_stats(logger: Logger, counters: Arc<GtpuCounters>, stop_token: StopToken) {
    let mut last = [0usize; NUM_COUNTERS];
    const FIRST_WARN_IDX: usize = DROP_MALFORMED;

    loop {
        if async_std::task::sleep(std::time::Duration::new(5, 0))
            .timeout_at(stop_token.clone())
            .await
            .is_err()
        {
            break;
        }
        let now = counters.snapshot();

        if now[RX_PKTS] != last[RX_PKTS] || now[TX_PKTS] != last[TX_PKTS] {
            info!(
                &logger,
                "RX pkts={} bytes={} TX pkts={} delivered={} buffered={} forwarded={} end_markers rx={} tx={} timeouts={}",
                now[RX_PKTS],
                now[RX_BYTES],
                now[TX_PKTS],
                now[DELIVERED],
                now[BUFFERED],
                now[FORWARDED],
                now[END_MARKERS_RX],
                now[END_MARKERS_TX],
                now[TIMEOUTS]
            );
        }

        if (FIRST_WARN_IDX..NUM_COUNTERS).any(|idx| now[idx] != last[idx]) {
            warn!(
                &logger,
                "DROPS malformed={} unknown_teid={} not_active={} buffer_full={} msg_type={} tx_failure={} pdcp_rejected={}",
                now[DROP_MALFORMED],
                now[DROP_UNKNOWN_TEID],
                now[DROP_NOT_ACTIVE],
                now[DROP_BUFFER_FULL],
                now[DROP_UNHANDLED_TYPE],
                now[DROP_TX_FAILURE],
                now[DROP_PDCP_REJECTED]
            );
        }
        last = now;
    }
}
