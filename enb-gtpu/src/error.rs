use gtpu::HeaderError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GtpuError {
    #[error("Malformed GTP-U header - {0}")]
    MalformedHeader(#[from] HeaderError),

    #[error("Unknown TEID {0:#x}")]
    UnknownTeid(u32),

    #[error("No tunnel available for rnti={rnti:#x} - {reason}")]
    PoolExhausted { rnti: u16, reason: &'static str },

    #[error("Buffer of TEID {teid:#x} is full, {dropped} SDUs dropped so far")]
    BufferOverflow { teid: u32, dropped: u64 },

    #[error("TEID {teid:#x} cannot be linked to itself, to a missing tunnel or to another bearer")]
    InvalidForwarding { teid: u32 },

    #[error("PDCP did not accept SDU for rnti={rnti:#x} eps_bearer_id={eps_bearer_id} - {reason}")]
    PdcpUnavailable {
        rnti: u16,
        eps_bearer_id: u8,
        reason: &'static str,
    },
}
