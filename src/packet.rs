//! Wire-format definitions for protocol segments.
//!
//! Every datagram exchanged between sender and receiver is a [`Segment`].
//! This module is responsible for:
//! - Defining the on-wire binary layout (kind, sequence, length, checksum).
//! - Serialising a [`Segment`] into a byte buffer ready for transmission.
//! - Parsing a raw byte slice back into a [`Segment`], rejecting truncated,
//!   inconsistent, or corrupted input.
//!
//! No I/O happens here — this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                             Kind                              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Payload Length                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           Checksum            |       Reserved (zero)         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Payload ...                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 16 bytes.

use thiserror::Error;

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 16;

/// Largest datagram either endpoint ever puts on the wire.
pub const MAX_DATAGRAM: usize = 1472;

/// Largest payload that keeps header + payload within [`MAX_DATAGRAM`].
pub const MAX_PAYLOAD: usize = MAX_DATAGRAM - HEADER_LEN;

// Byte offsets of each field within the serialised header.
const OFF_KIND: usize = 0;
const OFF_SEQ: usize = 4;
const OFF_LENGTH: usize = 8;
const OFF_CHECKSUM: usize = 12;
const OFF_RESERVED: usize = 14;

/// Segment type carried in the `kind` header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    /// Opens the logical connection. Always sequence 0.
    Connect,
    /// Closes the logical connection after the last DATA segment.
    Close,
    /// Carries one chunk of the byte stream.
    Data,
    /// Cumulative acknowledgement: the next sequence number expected.
    Ack,
}

impl SegmentKind {
    fn to_wire(self) -> u32 {
        match self {
            SegmentKind::Connect => 0,
            SegmentKind::Close => 1,
            SegmentKind::Data => 2,
            SegmentKind::Ack => 3,
        }
    }

    fn from_wire(raw: u32) -> Result<Self, PacketError> {
        match raw {
            0 => Ok(SegmentKind::Connect),
            1 => Ok(SegmentKind::Close),
            2 => Ok(SegmentKind::Data),
            3 => Ok(SegmentKind::Ack),
            other => Err(PacketError::UnknownKind(other)),
        }
    }
}

impl std::fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SegmentKind::Connect => "CONNECT",
            SegmentKind::Close => "CLOSE",
            SegmentKind::Data => "DATA",
            SegmentKind::Ack => "ACK",
        };
        f.write_str(name)
    }
}

/// Fixed-size segment header.
///
/// Fields are in host byte order; [`Segment::encode`] converts to big-endian
/// on the wire and [`Header::parse`] converts back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub kind: SegmentKind,
    /// Per-direction segment counter. CONNECT always uses 0.
    pub seq: u32,
    /// Number of payload bytes that follow the header.
    pub length: u16,
    /// Internet checksum over the header (this field zeroed) and payload.
    pub checksum: u16,
}

impl Header {
    /// Write this header into the first [`HEADER_LEN`] bytes of `buf`.
    fn write_to(&self, buf: &mut [u8]) {
        buf[OFF_KIND..OFF_KIND + 4].copy_from_slice(&self.kind.to_wire().to_be_bytes());
        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.seq.to_be_bytes());
        buf[OFF_LENGTH..OFF_LENGTH + 4].copy_from_slice(&u32::from(self.length).to_be_bytes());
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&self.checksum.to_be_bytes());
        buf[OFF_RESERVED..OFF_RESERVED + 2].copy_from_slice(&0u16.to_be_bytes());
    }

    /// Split `buf` into its header and the bytes that follow it.
    ///
    /// Only the header itself is validated here; whether `length` agrees with
    /// the remaining bytes and whether the checksum holds is checked by
    /// [`Segment::decode`].
    pub fn parse(buf: &[u8]) -> Result<(Header, &[u8]), PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::BufferTooShort);
        }

        let kind = SegmentKind::from_wire(read_u32(buf, OFF_KIND))?;
        let seq = read_u32(buf, OFF_SEQ);
        let declared = read_u32(buf, OFF_LENGTH);
        let checksum = read_u16(buf, OFF_CHECKSUM);
        if read_u16(buf, OFF_RESERVED) != 0 {
            return Err(PacketError::ReservedNonZero);
        }

        let rest = &buf[HEADER_LEN..];
        let length = u16::try_from(declared).map_err(|_| PacketError::LengthMismatch {
            declared,
            actual: rest.len(),
        })?;

        Ok((
            Header {
                kind,
                seq,
                length,
                checksum,
            },
            rest,
        ))
    }
}

/// A complete protocol datagram: header + payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Segment {
    /// Build a segment with `length` and `checksum` computed from `payload`.
    ///
    /// # Panics
    ///
    /// Panics if `payload` is longer than `u16::MAX`; callers fragment input
    /// to at most [`MAX_PAYLOAD`] bytes.
    pub fn new(kind: SegmentKind, seq: u32, payload: Vec<u8>) -> Self {
        let length = u16::try_from(payload.len()).expect("payload exceeds u16 length field");
        let mut header = Header {
            kind,
            seq,
            length,
            checksum: 0,
        };
        header.checksum = checksum(&header, &payload);
        Self { header, payload }
    }

    pub fn connect() -> Self {
        Self::new(SegmentKind::Connect, 0, Vec::new())
    }

    pub fn close(seq: u32) -> Self {
        Self::new(SegmentKind::Close, seq, Vec::new())
    }

    pub fn data(seq: u32, payload: Vec<u8>) -> Self {
        Self::new(SegmentKind::Data, seq, payload)
    }

    pub fn ack(seq: u32) -> Self {
        Self::new(SegmentKind::Ack, seq, Vec::new())
    }

    pub fn kind(&self) -> SegmentKind {
        self.header.kind
    }

    pub fn seq(&self) -> u32 {
        self.header.seq
    }

    /// Serialise this segment into a newly allocated byte vector.
    ///
    /// The header is written exactly as stored, so a segment whose checksum
    /// was tampered with stays tampered on the wire.
    pub fn encode(&self) -> Vec<u8> {
        debug_assert_eq!(usize::from(self.header.length), self.payload.len());
        let mut buf = vec![0u8; HEADER_LEN + self.payload.len()];
        self.header.write_to(&mut buf);
        buf[HEADER_LEN..].copy_from_slice(&self.payload);
        buf
    }

    /// Parse and validate a [`Segment`] from a raw datagram.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than [`HEADER_LEN`] or the header is malformed,
    /// - the `length` field disagrees with the bytes after the header, or
    /// - the checksum does not verify.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        let (header, rest) = Header::parse(buf)?;
        if usize::from(header.length) != rest.len() {
            return Err(PacketError::LengthMismatch {
                declared: u32::from(header.length),
                actual: rest.len(),
            });
        }

        let segment = Segment {
            header,
            payload: rest.to_vec(),
        };
        if !segment.verify() {
            return Err(PacketError::ChecksumFailed);
        }
        Ok(segment)
    }

    /// `true` when the stored checksum matches one recomputed over the
    /// header (checksum zeroed) and payload.
    pub fn verify(&self) -> bool {
        usize::from(self.header.length) == self.payload.len()
            && checksum(&self.header, &self.payload) == self.header.checksum
    }
}

/// Errors that can arise when parsing a raw datagram.
///
/// None of these ever reach the byte stream: the receiving side drops the
/// datagram exactly as if it had been lost.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("buffer too short to contain a header")]
    BufferTooShort,
    #[error("length field claims {declared} bytes but {actual} follow the header")]
    LengthMismatch { declared: u32, actual: usize },
    #[error("unknown segment kind {0}")]
    UnknownKind(u32),
    #[error("reserved header bytes are not zero")]
    ReservedNonZero,
    #[error("checksum verification failed")]
    ChecksumFailed,
}

/// Compute the checksum for `header` + `payload`.
///
/// The header's own `checksum` field is treated as zero regardless of its
/// stored value, so this can be used both to fill it in and to verify it.
pub fn checksum(header: &Header, payload: &[u8]) -> u16 {
    let mut bytes = [0u8; HEADER_LEN];
    Header {
        checksum: 0,
        ..*header
    }
    .write_to(&mut bytes);

    // HEADER_LEN is even, so the payload starts on a 16-bit word boundary.
    let sum = ones_complement_sum(ones_complement_sum(0, &bytes), payload);
    !fold(sum)
}

/// Add consecutive 16-bit big-endian words of `data` onto `sum`.
///
/// An odd trailing byte is padded with a zero byte on the right (RFC 1071).
fn ones_complement_sum(mut sum: u32, data: &[u8]) -> u32 {
    let mut words = data.chunks_exact(2);
    for word in &mut words {
        sum = fold(sum + u32::from(u16::from_be_bytes([word[0], word[1]]))).into();
    }
    if let [last] = words.remainder() {
        sum = fold(sum + (u32::from(*last) << 8)).into();
    }
    sum
}

/// Fold a 32-bit accumulator into 16 bits with end-around carry.
fn fold(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    sum as u16
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

fn read_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_be_bytes([buf[off], buf[off + 1]])
}
