use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("GTP-U datagram too short: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Unsupported GTP version {0}")]
    UnsupportedVersion(u8),

    #[error("Protocol type is GTP' rather than GTP")]
    UnsupportedProtocolType,

    #[error("Length field {declared} exceeds the {available} bytes following the header")]
    LengthMismatch { declared: usize, available: usize },

    #[error("Bad length for extension header type {ext_type:#x}")]
    BadExtensionLength { ext_type: u8 },

    #[error("Payload of {0} bytes does not fit the 16 bit length field")]
    PayloadTooLong(usize),
}
