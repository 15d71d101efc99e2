//! Wire-format definitions for RDT segments.
//!
//! This module is responsible for:
//! - Defining the on-wire binary layout (ports, sequence numbers, flags).
//! - Building headers and finalising their checksum.
//! - Reading a header back out of a raw byte slice.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! The layout is the fixed 20-byte TCP header.  All multi-byte integers are
//! **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |          Source Port          |       Destination Port        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Acknowledgment Number                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  Offset | Rsvd|     Flags     |            Window             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           Checksum            |         Urgent Pointer        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Payload ...                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The checksum covers an IPv4 pseudo-header (source address, destination
//! address, zero, protocol 6, segment length) followed by the segment.

use std::net::Ipv4Addr;

use thiserror::Error;

/// Bit-flag constants for the low bits of the offset/flags word.
pub mod flags {
    /// Sender has no more data to send.
    pub const FIN: u16 = 1 << 0;
    /// Synchronise sequence numbers (handshake initiation).
    pub const SYN: u16 = 1 << 1;
    /// Reset the connection.  Never emitted by this crate.
    pub const RST: u16 = 1 << 2;
    /// Acknowledgement field is valid.
    pub const ACK: u16 = 1 << 4;
}

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 20;

/// Default maximum segment size (payload bytes per segment).
pub const MSS: usize = 1460;

/// Largest payload whose segment length still fits the pseudo-header's
/// 16-bit length field.
pub const MAX_MSS: usize = u16::MAX as usize - HEADER_LEN;

/// Header length in 32-bit words, stored in the top nibble of the flags word.
const DATA_OFFSET: u16 = (HEADER_LEN / 4) as u16;

/// IP protocol number carried in the checksum pseudo-header.
const PROTO_TCP: u16 = 6;

const OFF_SRC_PORT: usize = 0;
const OFF_DST_PORT: usize = 2;
const OFF_SEQ: usize = 4;
const OFF_ACK: usize = 8;
const OFF_FLAGS: usize = 12;
const OFF_WINDOW: usize = 14;
const OFF_CHECKSUM: usize = 16;
const OFF_URG: usize = 18;

/// Decoded header fields.
///
/// `flags` is the raw 16-bit word including the data offset nibble; test
/// individual bits with the [`flags`] constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: u16,
    pub window: u16,
    pub checksum: u16,
    pub urg_ptr: u16,
}

impl Header {
    /// Length of the encoded header in bytes, taken from the data offset.
    pub fn header_len(&self) -> usize {
        4 * usize::from(self.flags >> 12)
    }

    /// `true` when every bit in `mask` is set.
    pub fn has(&self, mask: u16) -> bool {
        self.flags & mask == mask
    }
}

/// Errors that can arise when reading a header from a raw segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeaderError {
    /// Buffer shorter than the fixed header size.
    #[error("segment of {0} bytes is too short to contain a header")]
    TooShort(usize),
    /// The data offset points outside the segment or inside the fixed header.
    #[error("data offset of {offset} bytes is invalid for a {len}-byte segment")]
    BadDataOffset { offset: usize, len: usize },
}

/// Build a header with a zero checksum.
///
/// The advertised window is fixed at eight segments; it is informational only.
pub fn make_header(src_port: u16, dst_port: u16, seq: u32, ack: u32, flag_bits: u16) -> Vec<u8> {
    let window = u16::try_from(8 * MSS).unwrap_or(u16::MAX);
    let mut buf = vec![0u8; HEADER_LEN];
    buf[OFF_SRC_PORT..OFF_SRC_PORT + 2].copy_from_slice(&src_port.to_be_bytes());
    buf[OFF_DST_PORT..OFF_DST_PORT + 2].copy_from_slice(&dst_port.to_be_bytes());
    buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&seq.to_be_bytes());
    buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&ack.to_be_bytes());
    buf[OFF_FLAGS..OFF_FLAGS + 2].copy_from_slice(&((DATA_OFFSET << 12) | flag_bits).to_be_bytes());
    buf[OFF_WINDOW..OFF_WINDOW + 2].copy_from_slice(&window.to_be_bytes());
    buf
}

/// Parse the fixed header from the front of `segment`.
///
/// The checksum is returned as stored; use [`calc_checksum`] to verify it.
pub fn read_header(segment: &[u8]) -> Result<Header, HeaderError> {
    if segment.len() < HEADER_LEN {
        return Err(HeaderError::TooShort(segment.len()));
    }
    let word = |off: usize| u16::from_be_bytes([segment[off], segment[off + 1]]);
    let long = |off: usize| {
        u32::from_be_bytes([segment[off], segment[off + 1], segment[off + 2], segment[off + 3]])
    };

    let header = Header {
        src_port: word(OFF_SRC_PORT),
        dst_port: word(OFF_DST_PORT),
        seq: long(OFF_SEQ),
        ack: long(OFF_ACK),
        flags: word(OFF_FLAGS),
        window: word(OFF_WINDOW),
        checksum: word(OFF_CHECKSUM),
        urg_ptr: word(OFF_URG),
    };

    let offset = header.header_len();
    if offset < HEADER_LEN || offset > segment.len() {
        return Err(HeaderError::BadDataOffset {
            offset,
            len: segment.len(),
        });
    }
    Ok(header)
}

/// Payload bytes of `segment`, i.e. everything past the encoded header.
pub fn payload<'a>(segment: &'a [u8], header: &Header) -> &'a [u8] {
    &segment[header.header_len()..]
}

/// Compute the Internet checksum (RFC 1071) of `segment` plus the IPv4
/// pseudo-header for `src_addr` → `dst_addr`.
///
/// Over a segment whose checksum field is already filled in correctly the
/// result is `0`.
pub fn calc_checksum(segment: &[u8], src_addr: Ipv4Addr, dst_addr: Ipv4Addr) -> u16 {
    let mut sum: u64 = 0;

    let mut pseudo = [0u8; 12];
    pseudo[0..4].copy_from_slice(&src_addr.octets());
    pseudo[4..8].copy_from_slice(&dst_addr.octets());
    pseudo[8..10].copy_from_slice(&PROTO_TCP.to_be_bytes());
    // Segment lengths beyond u16 cannot travel in one datagram anyway.
    pseudo[10..12].copy_from_slice(&(segment.len() as u16).to_be_bytes());

    for chunk in pseudo.chunks(2).chain(segment.chunks(2)) {
        // Odd trailing byte: pad with a zero byte on the right.
        let hi = u64::from(chunk[0]) << 8;
        let lo = chunk.get(1).copied().map_or(0, u64::from);
        sum += hi | lo;
    }

    // Fold into 16 bits.
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }

    !(sum as u16)
}

/// Return a copy of `segment` with its checksum field filled in.
pub fn fix_checksum(segment: &[u8], src_addr: Ipv4Addr, dst_addr: Ipv4Addr) -> Vec<u8> {
    let mut seg = segment.to_vec();
    seg[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&[0, 0]);
    let csum = calc_checksum(&seg, src_addr, dst_addr);
    seg[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&csum.to_be_bytes());
    seg
}
