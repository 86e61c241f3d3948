//! lib - encode and decode GTP-U v1 headers (TS29.281)

mod error;
mod header;

pub use error::HeaderError;
pub use header::*;
