//! DNS wire codec: UDP<->TCP framing, transaction ID rewriting, TTL flooring.
//!
//! This module only understands the subset of RFC 1035 the relay core
//! touches: the 12-byte header, the single question in the question
//! section, and RR TTLs in the answer/authority/additional sections. It
//! does not decode RDATA, names into labels, or anything else a full
//! resolver would need.

use crate::error::CodecError;

const HEADER_LEN: usize = 12;
const TTL_FLOOR_SECS: u32 = 300;

/// Header fields the relay core reads off an incoming UDP query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedQuery {
    pub id: u16,
    pub qtype: u16,
}

/// Header fields the relay core reads off a response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedResponse {
    pub id: u16,
}

/// Parse the header and sole question of a plaintext UDP DNS message.
///
/// Fails with [`CodecError::MalformedMessage`] if the header or question
/// section is truncated, the message is a response (QR=1) rather than a
/// query, or it carries anything other than exactly one question.
pub fn parse_udp(buf: &[u8]) -> Result<ParsedQuery, CodecError> {
    if buf.len() < HEADER_LEN {
        return Err(CodecError::MalformedMessage);
    }
    let id = u16::from_be_bytes([buf[0], buf[1]]);
    let qr = buf[2] & 0x80 != 0;
    if qr {
        return Err(CodecError::MalformedMessage);
    }
    let qdcount = u16::from_be_bytes([buf[4], buf[5]]);
    if qdcount != 1 {
        return Err(CodecError::MalformedMessage);
    }

    let mut pos = HEADER_LEN;
    pos = skip_name(buf, pos).ok_or(CodecError::MalformedMessage)?;
    if pos + 4 > buf.len() {
        return Err(CodecError::MalformedMessage);
    }
    let qtype = u16::from_be_bytes([buf[pos], buf[pos + 1]]);

    Ok(ParsedQuery { id, qtype })
}

/// Build the TCP-framed form of a UDP query: a 2-byte big-endian length
/// prefix followed by the payload with its transaction ID replaced by
/// `new_id`. Question bytes are copied verbatim.
pub fn udp_to_tls(buf: &[u8], new_id: u16) -> Result<Vec<u8>, CodecError> {
    if buf.len() < HEADER_LEN {
        return Err(CodecError::MalformedMessage);
    }
    let len: u16 = buf
        .len()
        .try_into()
        .map_err(|_| CodecError::MalformedMessage)?;

    let mut frame = Vec::with_capacity(2 + buf.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(buf);
    frame[2] = (new_id >> 8) as u8;
    frame[3] = (new_id & 0xFF) as u8;
    Ok(frame)
}

/// Strip the 2-byte length prefix off a TCP-framed DNS message, validating
/// that the declared length matches the actual payload length.
///
/// Fails with [`CodecError::ShortFrame`] if the frame is incomplete or the
/// declared length disagrees with the payload.
pub fn parse_tls(frame: &[u8]) -> Result<ParsedResponse, CodecError> {
    if frame.len() < 2 + HEADER_LEN {
        return Err(CodecError::ShortFrame);
    }
    let declared = u16::from_be_bytes([frame[0], frame[1]]) as usize;
    if declared != frame.len() - 2 {
        return Err(CodecError::ShortFrame);
    }
    let id = u16::from_be_bytes([frame[2], frame[3]]);
    Ok(ParsedResponse { id })
}

/// Restore the client's original transaction ID and floor every RR TTL in
/// the answer/authority/additional sections to [`TTL_FLOOR_SECS`].
///
/// `response` is the plaintext DNS message (no TCP length prefix). Names,
/// including compressed ones, are walked rather than matched with a regex;
/// only TTL fields are mutated.
pub fn rewrite(response: &[u8], client_id: u16) -> Result<Vec<u8>, CodecError> {
    if response.len() < HEADER_LEN {
        return Err(CodecError::MalformedMessage);
    }
    let mut out = response.to_vec();
    out[0] = (client_id >> 8) as u8;
    out[1] = (client_id & 0xFF) as u8;

    let qdcount = u16::from_be_bytes([out[4], out[5]]) as usize;
    let ancount = u16::from_be_bytes([out[6], out[7]]) as usize;
    let nscount = u16::from_be_bytes([out[8], out[9]]) as usize;
    let arcount = u16::from_be_bytes([out[10], out[11]]) as usize;

    let mut pos = HEADER_LEN;
    for _ in 0..qdcount {
        pos = skip_name(&out, pos).ok_or(CodecError::MalformedMessage)?;
        pos += 4; // QTYPE + QCLASS
        if pos > out.len() {
            return Err(CodecError::MalformedMessage);
        }
    }

    for _ in 0..(ancount + nscount + arcount) {
        pos = skip_name(&out, pos).ok_or(CodecError::MalformedMessage)?;
        // name, TYPE(2), CLASS(2), TTL(4), RDLENGTH(2), RDATA(var)
        if pos + 10 > out.len() {
            return Err(CodecError::MalformedMessage);
        }
        let ttl_at = pos + 4;
        out[ttl_at..ttl_at + 4].copy_from_slice(&TTL_FLOOR_SECS.to_be_bytes());

        let rdlength = u16::from_be_bytes([out[pos + 8], out[pos + 9]]) as usize;
        pos += 10 + rdlength;
        if pos > out.len() {
            return Err(CodecError::MalformedMessage);
        }
    }

    Ok(out)
}

/// Advance `pos` past a (possibly compressed) domain name, returning the
/// offset of the byte following it. Does not follow compression pointers
/// recursively; a pointer always terminates the name in the wire format.
fn skip_name(buf: &[u8], mut pos: usize) -> Option<usize> {
    loop {
        let label_len = *buf.get(pos)? as usize;
        if label_len == 0 {
            return Some(pos + 1);
        }
        if label_len & 0xC0 == 0xC0 {
            // compression pointer: 2 bytes, name ends here
            if pos + 1 >= buf.len() {
                return None;
            }
            return Some(pos + 2);
        }
        pos += 1 + label_len;
        if pos > buf.len() {
            return None;
        }
    }
}
