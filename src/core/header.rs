//! # Packet Header Codec
//!
//! Binary codec for the fixed-format packet header and the appended-ack
//! trailer.
//!
//! ## Wire Format
//! ```text
//! [Flags(1)] [Sequence(4 BE)] [ExtraLen(1)] [Extra(N)] [MessageId(1..4)] [Body...]
//! ```
//!
//! The message id width depends on its frequency class, probed by counting
//! leading `0xFF` bytes: three mean Fixed (1 id byte follows), exactly two
//! mean Low (2-byte big-endian id), exactly one means Medium (1 id byte),
//! anything else is High (the byte itself is the id). The probe runs in that
//! order; reordering it misclassifies ids.
//!
//! When the ack-appended flag is set, the datagram tail carries
//! `[count x u32 BE][count:u8]` - the count in the final byte so the trailer
//! is self-delimiting when the body length is unknown.
//!
//! ## Security
//! - Truncation anywhere mid-field is an error, never a panic
//! - Reserved flag bits round-trip unchanged

use crate::error::{constants, Result, WireError};

/// Body is zero-run coded and must be expanded before dispatch.
pub const FLAG_ZEROCODED: u8 = 0x80;
/// Sender expects an acknowledgement for this sequence number.
pub const FLAG_RELIABLE: u8 = 0x40;
/// This datagram is a retransmission of an earlier one.
pub const FLAG_RESENT: u8 = 0x20;
/// The datagram tail carries an appended-ack trailer.
pub const FLAG_ACK_APPENDED: u8 = 0x10;

/// Low four flag bits are reserved; they are preserved verbatim.
const RESERVED_FLAG_MASK: u8 = 0x0F;

/// Bytes before the extra field: flags, sequence, extra length.
pub const MIN_HEADER_LEN: usize = 6;

/// The extra field length is carried in one byte.
pub const MAX_EXTRA_LEN: usize = 255;

/// The ack trailer count is carried in one byte.
pub const MAX_APPENDED_ACKS: usize = 255;

/// Frequency class of a message id, selecting its encoded width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frequency {
    /// One id byte, any value except `0xFF`.
    High,
    /// `0xFF` marker then one id byte.
    Medium,
    /// `0xFF 0xFF` marker then a big-endian `u16` id.
    Low,
    /// `0xFF 0xFF 0xFF` marker then one id byte; decoded as `0xFFFFFF00 | byte`.
    Fixed,
}

impl Frequency {
    /// Get human-readable name
    pub fn name(self) -> &'static str {
        match self {
            Frequency::High => "High",
            Frequency::Medium => "Medium",
            Frequency::Low => "Low",
            Frequency::Fixed => "Fixed",
        }
    }

    /// Whether `id` is representable in this class without colliding with a
    /// longer `0xFF` prefix. A High or Medium id of `0xFF`, or a Low id whose
    /// high byte is `0xFF`, would be re-probed as the next class on decode.
    pub fn id_in_range(self, id: u32) -> bool {
        match self {
            Frequency::High | Frequency::Medium => id < 0xFF,
            Frequency::Low => id <= 0xFFFF && (id >> 8) != 0xFF,
            Frequency::Fixed => id >= 0xFFFF_FF00,
        }
    }

    /// Largest id representable in this class.
    pub fn max_id(self) -> u32 {
        match self {
            Frequency::High | Frequency::Medium => 0xFE,
            Frequency::Low => 0xFEFF,
            Frequency::Fixed => u32::MAX,
        }
    }
}

/// Decoded packet header. Built fresh per decode; immutable thereafter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    pub zerocoded: bool,
    pub reliable: bool,
    pub resent: bool,
    pub ack_appended: bool,
    /// Reserved low flag bits, carried through unchanged.
    pub reserved_flags: u8,
    pub sequence: u32,
    /// Opaque bytes between the sequence and the message id; never interpreted.
    pub extra: Vec<u8>,
    pub frequency: Frequency,
    pub id: u32,
}

impl PacketHeader {
    /// Plain header for an outbound packet: flags clear, no extra bytes.
    pub fn new(frequency: Frequency, id: u32, sequence: u32) -> Self {
        Self {
            zerocoded: false,
            reliable: false,
            resent: false,
            ack_appended: false,
            reserved_flags: 0,
            sequence,
            extra: Vec::new(),
            frequency,
            id,
        }
    }

    /// Decode a header from the front of a datagram.
    ///
    /// Returns the header and the number of bytes it occupied.
    ///
    /// # Errors
    /// Returns `WireError::TruncatedHeader` if the input ends mid-field,
    /// including an id probe that finds fewer bytes than its class requires.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < MIN_HEADER_LEN {
            return Err(WireError::TruncatedHeader);
        }

        let flags = bytes[0];
        let sequence = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        let extra_len = bytes[5] as usize;

        let id_offset = MIN_HEADER_LEN + extra_len;
        if bytes.len() < id_offset {
            return Err(WireError::TruncatedHeader);
        }
        let extra = bytes[MIN_HEADER_LEN..id_offset].to_vec();

        // Probe order matters: 3 leading 0xFF bytes, then 2, then 1.
        let (frequency, id, id_len) = match &bytes[id_offset..] {
            [0xFF, 0xFF, 0xFF, b, ..] => (Frequency::Fixed, 0xFFFF_FF00 | u32::from(*b), 4),
            [0xFF, 0xFF] | [0xFF, 0xFF, _] => return Err(WireError::TruncatedHeader),
            [0xFF, 0xFF, hi, lo, ..] => {
                (Frequency::Low, u32::from(u16::from_be_bytes([*hi, *lo])), 4)
            }
            [0xFF, b, ..] => (Frequency::Medium, u32::from(*b), 2),
            [0xFF] | [] => return Err(WireError::TruncatedHeader),
            [b, ..] => (Frequency::High, u32::from(*b), 1),
        };

        let header = Self {
            zerocoded: flags & FLAG_ZEROCODED != 0,
            reliable: flags & FLAG_RELIABLE != 0,
            resent: flags & FLAG_RESENT != 0,
            ack_appended: flags & FLAG_ACK_APPENDED != 0,
            reserved_flags: flags & RESERVED_FLAG_MASK,
            sequence,
            extra,
            frequency,
            id,
        };

        Ok((header, id_offset + id_len))
    }

    /// Encode the header into its wire representation.
    ///
    /// # Errors
    /// Returns `WireError::FieldTooLong` if the extra field exceeds 255 bytes
    /// and `WireError::IdOutOfRange` if the id is not representable in its
    /// frequency class.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.extra.len() > MAX_EXTRA_LEN {
            return Err(WireError::FieldTooLong { max: MAX_EXTRA_LEN });
        }
        if !self.frequency.id_in_range(self.id) {
            return Err(WireError::IdOutOfRange {
                id: self.id,
                max: self.frequency.max_id(),
            });
        }

        let mut out = Vec::with_capacity(MIN_HEADER_LEN + self.extra.len() + 4);
        out.push(self.flags_byte());
        out.extend_from_slice(&self.sequence.to_be_bytes());
        out.push(self.extra.len() as u8);
        out.extend_from_slice(&self.extra);

        match self.frequency {
            Frequency::High => out.push(self.id as u8),
            Frequency::Medium => {
                out.push(0xFF);
                out.push(self.id as u8);
            }
            Frequency::Low => {
                out.push(0xFF);
                out.push(0xFF);
                out.extend_from_slice(&(self.id as u16).to_be_bytes());
            }
            Frequency::Fixed => {
                out.extend_from_slice(&[0xFF, 0xFF, 0xFF]);
                out.push(self.id as u8);
            }
        }

        Ok(out)
    }

    /// Compose the flags byte, preserving reserved bits.
    pub fn flags_byte(&self) -> u8 {
        let mut flags = self.reserved_flags & RESERVED_FLAG_MASK;
        if self.zerocoded {
            flags |= FLAG_ZEROCODED;
        }
        if self.reliable {
            flags |= FLAG_RELIABLE;
        }
        if self.resent {
            flags |= FLAG_RESENT;
        }
        if self.ack_appended {
            flags |= FLAG_ACK_APPENDED;
        }
        flags
    }
}

/// Force the resent bit on an already-encoded datagram.
///
/// Retransmission reuses the stored payload byte-for-byte; only this one
/// flag bit changes.
pub fn set_resent_flag(datagram: &mut [u8]) {
    if let Some(flags) = datagram.first_mut() {
        *flags |= FLAG_RESENT;
    }
}

/// Encode an ack list into trailer bytes: each ack as a big-endian `u32`,
/// then the count in the final byte.
///
/// # Errors
/// Returns `WireError::FieldTooLong` for more than 255 acks; callers split
/// larger queues across packets.
pub fn encode_acks(acks: &[u32]) -> Result<Vec<u8>> {
    if acks.len() > MAX_APPENDED_ACKS {
        return Err(WireError::FieldTooLong {
            max: MAX_APPENDED_ACKS,
        });
    }

    let mut out = Vec::with_capacity(acks.len() * 4 + 1);
    for ack in acks {
        out.extend_from_slice(&ack.to_be_bytes());
    }
    out.push(acks.len() as u8);
    Ok(out)
}

/// Decode trailer bytes produced by [`encode_acks`].
///
/// The caller locates the trailer boundary (the count is the final byte);
/// this function validates that the slice matches its count exactly.
pub fn decode_acks(trailer: &[u8]) -> Result<Vec<u32>> {
    let count = *trailer
        .last()
        .ok_or_else(|| WireError::CorruptPacket(constants::ERR_ACK_TRAILER_TRUNCATED.into()))?
        as usize;

    if trailer.len() != count * 4 + 1 {
        return Err(WireError::CorruptPacket(
            constants::ERR_ACK_TRAILER_SHORT.into(),
        ));
    }

    Ok(trailer[..count * 4]
        .chunks_exact(4)
        .map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
