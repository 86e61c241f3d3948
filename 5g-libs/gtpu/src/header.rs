#![allow(clippy::unusual_byte_groupings)]
use crate::HeaderError;

pub const GTPU_PORT: u16 = 2152; // TS29.281
pub const GTPU_BASE_HEADER_LEN: usize = 8;
pub const GTPU_OPTIONAL_FIELDS_LEN: usize = 4;

// Flags octet, TS29.281, 5.1.
const GTPU_VERSION_1: u8 = 1;
const FLAGS_V1_PT: u8 = 0b001_1_0_0_0_0; // version=1, PT=1, R, E=0, S=0, PN=0
const FLAG_PT: u8 = 0b000_1_0_0_0_0;
const FLAG_E: u8 = 0b000_0_0_1_0_0;
const FLAG_S: u8 = 0b000_0_0_0_1_0;
const FLAG_PN: u8 = 0b000_0_0_0_0_1;

// Next extension header types, TS29.281, figure 5.2.1-3.
pub const EXT_HEADER_NONE: u8 = 0x00;
pub const EXT_HEADER_PDCP_PDU_NUMBER: u8 = 0xc0;

// Recovery IE carried in Echo Response (TS29.281, 8.2), restart counter always 0.
pub const RECOVERY_IE: [u8; 2] = [14, 0];

/// GTP-U message types, TS29.281, table 6.1-1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    EchoRequest,
    EchoResponse,
    ErrorIndication,
    SupportedExtensionHeadersNotification,
    EndMarker,
    GPdu,
    Other(u8),
}

impl From<u8> for MessageType {
    fn from(value: u8) -> Self {
        match value {
            1 => MessageType::EchoRequest,
            2 => MessageType::EchoResponse,
            26 => MessageType::ErrorIndication,
            31 => MessageType::SupportedExtensionHeadersNotification,
            254 => MessageType::EndMarker,
            255 => MessageType::GPdu,
            x => MessageType::Other(x),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(m: MessageType) -> Self {
        match m {
            MessageType::EchoRequest => 1,
            MessageType::EchoResponse => 2,
            MessageType::ErrorIndication => 26,
            MessageType::SupportedExtensionHeadersNotification => 31,
            MessageType::EndMarker => 254,
            MessageType::GPdu => 255,
            MessageType::Other(x) => x,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionHeader {
    /// PDCP PDU Number, TS29.281, 5.2.2.2.
    PdcpPduNumber(u16),

    /// An extension header we carry but do not interpret.  The content excludes the
    /// length octet and the next-type octet, so is always 2 bytes short of a multiple of 4.
    Other { ext_type: u8, content: Vec<u8> },
}

impl ExtensionHeader {
    pub fn ext_type(&self) -> u8 {
        match self {
            ExtensionHeader::PdcpPduNumber(_) => EXT_HEADER_PDCP_PDU_NUMBER,
            ExtensionHeader::Other { ext_type, .. } => *ext_type,
        }
    }

    // Length in 4-octet units, as written in the first octet of the extension header.
    fn units(&self) -> usize {
        match self {
            ExtensionHeader::PdcpPduNumber(_) => 1,
            ExtensionHeader::Other { content, .. } => (content.len() + 2).div_ceil(4),
        }
    }

    fn encode(&self, next_ext_type: u8, buf: &mut Vec<u8>) -> Result<(), HeaderError> {
        let units = self.units();
        let length = u8::try_from(units).map_err(|_| HeaderError::BadExtensionLength {
            ext_type: self.ext_type(),
        })?;
        let start = buf.len();
        buf.push(length);
        match self {
            ExtensionHeader::PdcpPduNumber(sn) => buf.extend_from_slice(&sn.to_be_bytes()),
            ExtensionHeader::Other { content, .. } => buf.extend_from_slice(content),
        }
        // Pad to a multiple of four bytes, leaving room for the next-type octet.
        buf.resize(start + units * 4 - 1, 0);
        buf.push(next_ext_type);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GtpuHeader {
    pub message_type: MessageType,
    pub teid: u32,
    pub seq_number: Option<u16>,
    pub n_pdu_number: Option<u8>,
    pub extensions: Vec<ExtensionHeader>,
}

impl GtpuHeader {
    pub fn new(message_type: MessageType, teid: u32) -> Self {
        GtpuHeader {
            message_type,
            teid,
            seq_number: None,
            n_pdu_number: None,
            extensions: vec![],
        }
    }

    pub fn gpdu(teid: u32) -> Self {
        Self::new(MessageType::GPdu, teid)
    }

    pub fn end_marker(teid: u32) -> Self {
        Self::new(MessageType::EndMarker, teid)
    }

    /// Echo Response to an Echo Request with the given sequence number.  TEID is 0 (TS29.281, 7.2.2).
    pub fn echo_response(seq_number: Option<u16>) -> Self {
        GtpuHeader {
            seq_number: Some(seq_number.unwrap_or(0)),
            ..Self::new(MessageType::EchoResponse, 0)
        }
    }

    pub fn with_pdcp_sn(mut self, pdcp_sn: Option<u16>) -> Self {
        self.extensions
            .retain(|e| !matches!(e, ExtensionHeader::PdcpPduNumber(_)));
        if let Some(sn) = pdcp_sn {
            self.extensions.push(ExtensionHeader::PdcpPduNumber(sn));
        }
        self
    }

    pub fn pdcp_sn(&self) -> Option<u16> {
        self.extensions.iter().find_map(|e| match e {
            ExtensionHeader::PdcpPduNumber(sn) => Some(*sn),
            _ => None,
        })
    }

    fn flags(&self) -> u8 {
        let mut flags = FLAGS_V1_PT;
        if !self.extensions.is_empty() {
            flags |= FLAG_E;
        }
        if self.seq_number.is_some() {
            flags |= FLAG_S;
        }
        if self.n_pdu_number.is_some() {
            flags |= FLAG_PN;
        }
        flags
    }

    fn has_optional_fields(&self) -> bool {
        self.flags() & (FLAG_E | FLAG_S | FLAG_PN) != 0
    }

    /// Total header length including the optional fields and extension headers.
    pub fn header_len(&self) -> usize {
        let mut len = GTPU_BASE_HEADER_LEN;
        if self.has_optional_fields() {
            len += GTPU_OPTIONAL_FIELDS_LEN;
        }
        len + self.extensions.iter().map(|e| e.units() * 4).sum::<usize>()
    }

    /// Build a complete GTP-U message from this header and a payload.
    pub fn encode(&self, payload: &[u8]) -> Result<Vec<u8>, HeaderError> {
        let header_len = self.header_len();
        let length = header_len - GTPU_BASE_HEADER_LEN + payload.len();
        let length = u16::try_from(length).map_err(|_| HeaderError::PayloadTooLong(length))?;

        let mut buf = Vec::with_capacity(header_len + payload.len());

        // ---- GTP header, TS29.281, 5.1 ----
        buf.push(self.flags());
        buf.push(self.message_type.into());
        buf.extend_from_slice(&length.to_be_bytes());
        buf.extend_from_slice(&self.teid.to_be_bytes());

        // If any of E, S, PN is set, all three optional fields are present.
        if self.has_optional_fields() {
            buf.extend_from_slice(&self.seq_number.unwrap_or(0).to_be_bytes());
            buf.push(self.n_pdu_number.unwrap_or(0));
            buf.push(
                self.extensions
                    .first()
                    .map_or(EXT_HEADER_NONE, ExtensionHeader::ext_type),
            );
        }

        for (idx, ext) in self.extensions.iter().enumerate() {
            let next = self
                .extensions
                .get(idx + 1)
                .map_or(EXT_HEADER_NONE, ExtensionHeader::ext_type);
            ext.encode(next, &mut buf)?;
        }

        debug_assert_eq!(buf.len(), header_len);
        buf.extend_from_slice(payload);
        Ok(buf)
    }

    /// Parse a GTP-U message, returning the header and a view of the payload.
    /// Bytes beyond the length given in the header are ignored.
    pub fn decode(buf: &[u8]) -> Result<(GtpuHeader, &[u8]), HeaderError> {
        if buf.len() < GTPU_BASE_HEADER_LEN {
            return Err(HeaderError::Truncated {
                needed: GTPU_BASE_HEADER_LEN,
                available: buf.len(),
            });
        }

        let flags = buf[0];
        let version = flags >> 5;
        if version != GTPU_VERSION_1 {
            return Err(HeaderError::UnsupportedVersion(version));
        }
        if flags & FLAG_PT == 0 {
            return Err(HeaderError::UnsupportedProtocolType);
        }

        let message_type = MessageType::from(buf[1]);
        let declared = u16::from_be_bytes([buf[2], buf[3]]) as usize;
        let teid = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);

        let available = buf.len() - GTPU_BASE_HEADER_LEN;
        if declared > available {
            return Err(HeaderError::LengthMismatch {
                declared,
                available,
            });
        }
        let body = &buf[GTPU_BASE_HEADER_LEN..GTPU_BASE_HEADER_LEN + declared];

        let mut header = GtpuHeader::new(message_type, teid);
        let mut offset = 0;

        if flags & (FLAG_E | FLAG_S | FLAG_PN) != 0 {
            if body.len() < GTPU_OPTIONAL_FIELDS_LEN {
                return Err(HeaderError::Truncated {
                    needed: GTPU_BASE_HEADER_LEN + GTPU_OPTIONAL_FIELDS_LEN,
                    available: GTPU_BASE_HEADER_LEN + body.len(),
                });
            }
            if flags & FLAG_S != 0 {
                header.seq_number = Some(u16::from_be_bytes([body[0], body[1]]));
            }
            if flags & FLAG_PN != 0 {
                header.n_pdu_number = Some(body[2]);
            }
            // The next-type octet only means something when E is set.
            let mut next_ext_type = if flags & FLAG_E != 0 {
                body[3]
            } else {
                EXT_HEADER_NONE
            };
            offset = GTPU_OPTIONAL_FIELDS_LEN;

            while next_ext_type != EXT_HEADER_NONE {
                let ext_type = next_ext_type;
                let units = *body
                    .get(offset)
                    .ok_or(HeaderError::BadExtensionLength { ext_type })?
                    as usize;
                let end = offset + units * 4;
                if units == 0 || end > body.len() {
                    return Err(HeaderError::BadExtensionLength { ext_type });
                }
                let content = &body[offset + 1..end - 1];
                header.extensions.push(match ext_type {
                    EXT_HEADER_PDCP_PDU_NUMBER if units == 1 => {
                        ExtensionHeader::PdcpPduNumber(u16::from_be_bytes([content[0], content[1]]))
                    }
                    _ => ExtensionHeader::Other {
                        ext_type,
                        content: content.to_vec(),
                    },
                });
                next_ext_type = body[end - 1];
                offset = end;
            }
        }

        Ok((header, &body[offset..]))
    }
}
