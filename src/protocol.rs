//! Remote serial protocol framing.
//!
//! A well-formed frame is `$<body>#HH` where `HH` is the two-digit lowercase
//! hex of the 8-bit sum of the body bytes. Three byte sequences occur outside
//! framing: `+` (ack), `-` (nack) and `0x03` (interrupt). See
//! [Debugging with GDB, Appendix E](https://sourceware.org/gdb/onlinedocs/gdb/Remote-Protocol.html).

use crate::error::Error;
use bytes::BytesMut;
use log::warn;
use std::fmt::Write as _;

pub const ACK: u8 = b'+';
pub const NACK: u8 = b'-';
pub const PACKET_START: u8 = b'$';
pub const PACKET_END: u8 = b'#';
pub const INTERRUPT: u8 = 0x03;

/// Default ceiling for buffered bytes without a frame terminator.
///
/// Four times the PacketSize advertised to the client; a well-behaved peer
/// never comes near it.
pub const RECEIVE_BUFFER_LIMIT: usize = 4096;

/// One parsed frame, split into the command token and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Single character for most commands, the full prefix up to the first
    /// `:`/`.`/`;` for `q` and `v` commands.
    pub cmd: String,
    /// Remainder of the body with escapes resolved.
    pub data: String,
    /// Checksum as transmitted on the wire.
    pub checksum: u8,
}

impl Packet {
    /// The synthetic command for the out-of-band interrupt byte.
    pub fn interrupt() -> Self {
        Packet {
            cmd: "\x03".to_string(),
            data: String::new(),
            checksum: 0,
        }
    }
}

/// Incremental frame extractor over a byte stream.
#[derive(Debug)]
pub struct Receiver {
    buf: BytesMut,
    limit: usize,
}

impl Default for Receiver {
    fn default() -> Self {
        Receiver::new(RECEIVE_BUFFER_LIMIT)
    }
}

impl Receiver {
    pub fn new(limit: usize) -> Self {
        Receiver {
            buf: BytesMut::new(),
            limit,
        }
    }

    /// Append newly received bytes to the buffer.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Extract the next complete frame.
    ///
    /// `None` means more bytes are needed. An `Err` is a frame that failed
    /// parsing or checksum verification; the caller must nack it. The
    /// offending bytes are consumed either way so scanning continues.
    pub fn next_packet(&mut self) -> Option<Result<Packet, Error>> {
        // A lone interrupt byte arrives without framing or checksum.
        if self.buf.len() == 1 && self.buf[0] == INTERRUPT {
            self.buf.clear();
            return Some(Ok(Packet::interrupt()));
        }

        let end = match self.buf.iter().position(|&b| b == PACKET_END) {
            Some(end) => end,
            None => {
                if self.buf.len() > self.limit {
                    warn!(
                        "dropping {} buffered bytes without a frame terminator",
                        self.buf.len()
                    );
                    self.buf.clear();
                }
                return None;
            }
        };
        if self.buf.len() < end + 3 {
            // Checksum digits not arrived yet.
            return None;
        }

        let frame = self.buf.split_to(end + 3);
        Some(parse_packet(&frame))
    }
}

fn parse_packet(frame: &[u8]) -> Result<Packet, Error> {
    let mut idx = 0;

    // Debugger clients open the conversation with stray acks before the
    // packet start, sometimes more than one.
    while frame.get(idx) == Some(&ACK) {
        idx += 1;
    }
    match frame.get(idx) {
        Some(&INTERRUPT) => return Ok(Packet::interrupt()),
        Some(&PACKET_START) => idx += 1,
        _ => return Err(Error::MalformedFrame("missing packet start")),
    }

    let mut cmd = String::new();
    let mut data = String::new();
    let mut computed = 0u8;
    let mut in_cmd = true;

    while idx < frame.len() {
        let mut byte = frame[idx];
        idx += 1;
        if byte == PACKET_END {
            break;
        }

        computed = computed.wrapping_add(byte);
        if byte == b'}' {
            // Escape: the next wire byte xor 0x20 is the logical byte, and it
            // is the resolved byte that joins the running sum.
            let Some(&escaped) = frame.get(idx) else {
                return Err(Error::MalformedFrame("dangling escape"));
            };
            idx += 1;
            byte = escaped ^ 0x20;
            computed = computed.wrapping_add(byte);
        }

        if in_cmd && matches!(byte, b':' | b'.' | b';') {
            // The delimiter itself belongs to neither part.
            in_cmd = false;
            continue;
        }
        if in_cmd {
            cmd.push(byte as char);
            // Only `q` and `v` commands have multi-character tokens.
            if cmd.len() == 1 && byte != b'q' && byte != b'v' {
                in_cmd = false;
            }
        } else {
            data.push(byte as char);
        }
    }

    let digits = frame
        .get(idx..idx + 2)
        .ok_or(Error::MalformedFrame("truncated checksum"))?;
    let transmitted = u8::from_str_radix(std::str::from_utf8(digits)?, 16)
        .map_err(|_| Error::MalformedFrame("checksum digits are not hex"))?;
    if transmitted != computed {
        return Err(Error::ChecksumMismatch {
            computed,
            transmitted,
        });
    }

    Ok(Packet {
        cmd,
        data,
        checksum: transmitted,
    })
}

/// Wrap a reply body in `$...#HH` framing.
///
/// Replies produced by the stub contain no reserved bytes, so outbound bodies
/// go on the wire literally.
pub fn encode_packet(body: &str) -> String {
    let checksum = body.bytes().fold(0u8, |sum, b| sum.wrapping_add(b));
    format!("${body}#{checksum:02x}")
}

/// Wrap a body in framing, escaping `$`, `#` and `}` the way clients do.
///
/// The checksum follows the receiver's discipline: an escaped byte
/// contributes its `}` marker plus the resolved byte.
pub fn encode_packet_escaped(body: &str) -> String {
    let mut wire = String::with_capacity(body.len());
    let mut checksum = 0u8;
    for byte in body.bytes() {
        if matches!(byte, b'$' | b'#' | b'}') {
            wire.push('}');
            wire.push((byte ^ 0x20) as char);
            checksum = checksum.wrapping_add(b'}').wrapping_add(byte);
        } else {
            wire.push(byte as char);
            checksum = checksum.wrapping_add(byte);
        }
    }
    let mut packet = String::with_capacity(wire.len() + 4);
    let _ = write!(packet, "${wire}#{checksum:02x}");
    packet
}
