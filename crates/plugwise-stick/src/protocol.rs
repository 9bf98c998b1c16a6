//! Plugwise frame codec.
//!
//! The Stick speaks an ASCII-hex framed protocol over a CR-delimited
//! serial line. Every frame is:
//!
//! ```text
//! \x05\x05\x03\x03 <code:4> [<mac:16>] [<params>] <checksum:4> \r
//! ```
//!
//! - `code`: four uppercase hex characters identifying the command or
//!   response (e.g. `0023` info request, `0024` info response, `0000`
//!   generic ack).
//! - `mac`: the target Circle's 16-hex-character address, present on all
//!   addressed commands.
//! - `params`: zero or more hex characters of command payload.
//! - `checksum`: CRC-16 over `code + mac + params`, rendered as exactly
//!   four left-zero-padded uppercase hex digits.
//!
//! # Inbound resync
//!
//! The Stick occasionally prefixes lines with framing bytes or line noise.
//! [`decode_line`] discards leading characters outside the `'0'..='Y'`
//! printable range before reading the response code, which also strips the
//! `\x05\x05\x03\x03` header. Trailing characters beyond a response's
//! declared field schema (the checksum) are ignored; inbound checksums are
//! not verified.

use bytes::{BufMut, BytesMut};
use crc::{CRC_16_XMODEM, Crc};

use plugwise_core::error::{Error, Result};
use plugwise_core::types::CircleMac;

use crate::commands;

/// Frame header preceding every command and response.
pub const FRAME_START: &[u8] = b"\x05\x05\x03\x03";

/// Frame terminator.
pub const FRAME_END: u8 = b'\r';

/// First character of the valid printable range; anything below is
/// resync-discarded from the front of an inbound line.
const RESYNC_LO: u8 = b'0';

/// Last character of the valid printable range.
const RESYNC_HI: u8 = b'Y';

/// CRC-16/XMODEM, matching frames captured from Circle hardware.
static FRAME_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Result of decoding one inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedLine {
    /// A complete frame whose response code has a registered field schema.
    Frame {
        /// The four-character response code.
        code: String,
        /// The fixed-width fields following the code, split per the
        /// response schema. Field 0 is always the ack id; field 1 the
        /// device address on data frames, the ack subcode on acks.
        fields: Vec<String>,
    },

    /// A syntactically plausible line whose response code is not in the
    /// command registry. The caller logs and drops it.
    Unrecognized {
        /// The unknown four-character code.
        code: String,
    },
}

/// Compute the frame checksum over `payload`, rendered as exactly four
/// left-zero-padded uppercase hex digits.
pub fn checksum(payload: &str) -> String {
    format!("{:04X}", FRAME_CRC.checksum(payload.as_bytes()))
}

/// Encode a command frame ready for transmission.
///
/// Concatenates the request code, the target address (if any), and the
/// parameter string; appends the checksum over that concatenation; and
/// wraps the result in the frame header and CR terminator.
///
/// # Example
///
/// ```
/// use plugwise_stick::protocol::encode_frame;
///
/// let frame = encode_frame("0023", None, "");
/// assert!(frame.starts_with(b"\x05\x05\x03\x03"));
/// assert_eq!(frame.last(), Some(&b'\r'));
/// // 4 header bytes + 4 code + 4 checksum + CR
/// assert_eq!(frame.len(), 13);
/// ```
pub fn encode_frame(request_code: &str, mac: Option<&CircleMac>, params: &str) -> Vec<u8> {
    let mut body = String::with_capacity(request_code.len() + 16 + params.len());
    body.push_str(request_code);
    if let Some(mac) = mac {
        body.push_str(mac.as_str());
    }
    body.push_str(params);

    let crc = checksum(&body);

    let mut buf = BytesMut::with_capacity(FRAME_START.len() + body.len() + crc.len() + 1);
    buf.put_slice(FRAME_START);
    buf.put_slice(body.as_bytes());
    buf.put_slice(crc.as_bytes());
    buf.put_u8(FRAME_END);
    buf.to_vec()
}

/// Decode one inbound line into a response code and its fields.
///
/// Leading bytes outside the valid printable range are discarded
/// (defensive resync against transport noise and the frame header). The
/// first four remaining characters are the response code; the rest is
/// split into the fixed-width fields declared by the matching response
/// schema. A line too short for its schema is a protocol error; an
/// unknown code decodes to [`DecodedLine::Unrecognized`].
pub fn decode_line(raw: &str) -> Result<DecodedLine> {
    let bytes = raw.as_bytes();
    let start = bytes
        .iter()
        .position(|&b| (RESYNC_LO..=RESYNC_HI).contains(&b))
        .unwrap_or(bytes.len());
    let line = &raw[start..];

    let code = line
        .get(..4)
        .ok_or_else(|| Error::Protocol(format!("short frame: {raw:?}")))?;
    let widths = match commands::response_schema(code) {
        Some(widths) => widths,
        None => {
            return Ok(DecodedLine::Unrecognized {
                code: code.to_string(),
            });
        }
    };

    let mut fields = Vec::with_capacity(widths.len());
    let mut cursor = 4;
    for &width in widths {
        let end = cursor + width;
        let field = line.get(cursor..end).ok_or_else(|| {
            Error::Protocol(format!(
                "truncated {code} frame: expected {end} chars, got {}",
                line.len()
            ))
        })?;
        fields.push(field.to_string());
        cursor = end;
    }

    Ok(DecodedLine::Frame {
        code: code.to_string(),
        fields,
    })
}

/// Drain one CR/LF-terminated line from `buf`, skipping empty lines.
///
/// Returns `None` when no complete line is buffered yet; incomplete data
/// is left in place for the next read cycle.
pub fn next_line(buf: &mut Vec<u8>) -> Option<String> {
    loop {
        let pos = buf.iter().position(|&b| b == b'\r' || b == b'\n')?;
        let line: Vec<u8> = buf.drain(..=pos).collect();
        let line = &line[..line.len() - 1];
        if !line.is_empty() {
            return Some(String::from_utf8_lossy(line).into_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac() -> CircleMac {
        "000D6F0000B1B64B".parse().unwrap()
    }

    // ---------------------------------------------------------------
    // Checksum
    // ---------------------------------------------------------------

    #[test]
    fn checksum_is_four_uppercase_hex_chars() {
        // Sweep a few payloads; every checksum must render as exactly
        // four zero-padded uppercase hex digits.
        for payload in ["", "0023", "0017000D6F0000B1B64B01", "A", "ZZZZ"] {
            let crc = checksum(payload);
            assert_eq!(crc.len(), 4, "payload {payload:?}");
            assert!(
                crc.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()),
                "payload {payload:?} -> {crc}"
            );
        }
    }

    #[test]
    fn checksum_zero_pads() {
        // CRC-16/XMODEM of the empty string is 0x0000.
        assert_eq!(checksum(""), "0000");
    }

    #[test]
    fn checksum_known_vector() {
        // CRC-16/XMODEM check value: "123456789" -> 0x31C3.
        assert_eq!(checksum("123456789"), "31C3");
    }

    // ---------------------------------------------------------------
    // Frame encoding
    // ---------------------------------------------------------------

    #[test]
    fn encode_bare_command() {
        let frame = encode_frame("000A", None, "");
        let expected = format!("\x05\x05\x03\x03000A{}\r", checksum("000A"));
        assert_eq!(frame, expected.as_bytes());
    }

    #[test]
    fn encode_addressed_command() {
        let frame = encode_frame("0023", Some(&mac()), "");
        let body = "0023000D6F0000B1B64B";
        let expected = format!("\x05\x05\x03\x03{body}{}\r", checksum(body));
        assert_eq!(frame, expected.as_bytes());
    }

    #[test]
    fn encode_command_with_params() {
        let frame = encode_frame("0017", Some(&mac()), "01");
        let body = "0017000D6F0000B1B64B01";
        let expected = format!("\x05\x05\x03\x03{body}{}\r", checksum(body));
        assert_eq!(frame, expected.as_bytes());
    }

    // ---------------------------------------------------------------
    // Line decoding
    // ---------------------------------------------------------------

    #[test]
    fn decode_ack_line() {
        let line = "\x05\x05\x03\x03000000C100C1";
        match decode_line(line).unwrap() {
            DecodedLine::Frame { code, fields } => {
                assert_eq!(code, "0000");
                assert_eq!(fields, vec!["00C1".to_string(), "00C1".to_string()]);
            }
            other => panic!("expected Frame, got {other:?}"),
        }
    }

    #[test]
    fn decode_strips_leading_noise() {
        // Framing bytes and control noise before the code must be
        // discarded; the '0' of the code is the first valid character.
        let line = "\x05\x05\x03\x03\x1b\x07000012340123";
        match decode_line(line).unwrap() {
            DecodedLine::Frame { code, fields } => {
                assert_eq!(code, "0000");
                assert_eq!(fields[0], "1234");
                assert_eq!(fields[1], "0123");
            }
            other => panic!("expected Frame, got {other:?}"),
        }
    }

    #[test]
    fn decode_ignores_trailing_checksum() {
        // The four checksum chars fall beyond the ack schema.
        let with_crc = "000012AB00C1FFFF";
        let without_crc = "000012AB00C1";
        assert_eq!(decode_line(with_crc).unwrap(), decode_line(without_crc).unwrap());
    }

    #[test]
    fn decode_unknown_code() {
        match decode_line("9999ABCD").unwrap() {
            DecodedLine::Unrecognized { code } => assert_eq!(code, "9999"),
            other => panic!("expected Unrecognized, got {other:?}"),
        }
    }

    #[test]
    fn decode_short_line_is_protocol_error() {
        assert!(matches!(decode_line("00"), Err(Error::Protocol(_))));
        assert!(matches!(decode_line("\x05\x05\x03\x03"), Err(Error::Protocol(_))));
    }

    #[test]
    fn decode_truncated_frame_is_protocol_error() {
        // An ack line missing its subcode field.
        assert!(matches!(decode_line("000012A"), Err(Error::Protocol(_))));
    }

    #[test]
    fn decode_recovers_encoded_frame() {
        // decode(encode(...)) round trip: the header and checksum wash
        // out, leaving the code and payload unchanged. Uses the ack
        // shape, whose schema matches an outbound payload exactly.
        let frame = encode_frame("0000", None, "7AE100C1");
        let line = std::str::from_utf8(&frame).unwrap();
        match decode_line(line.trim_end_matches('\r')).unwrap() {
            DecodedLine::Frame { code, fields } => {
                assert_eq!(code, "0000");
                assert_eq!(fields, vec!["7AE1".to_string(), "00C1".to_string()]);
            }
            other => panic!("expected Frame, got {other:?}"),
        }
    }

    #[test]
    fn encode_decode_preserves_address_and_params() {
        // Request codes have no response schema, so a decoded request
        // reports its code as unrecognized -- but the line itself must
        // carry the address and params verbatim between the code and the
        // checksum.
        let frame = encode_frame("0017", Some(&mac()), "01");
        let line = std::str::from_utf8(&frame).unwrap();
        let line = line.trim_end_matches('\r');
        let body = line.trim_start_matches(|c: char| !('0'..='Y').contains(&c));
        assert_eq!(&body[..4], "0017");
        assert_eq!(&body[4..20], mac().as_str());
        assert_eq!(&body[20..22], "01");
        assert_eq!(&body[22..], checksum("0017000D6F0000B1B64B01"));
    }

    // ---------------------------------------------------------------
    // Line buffering
    // ---------------------------------------------------------------

    #[test]
    fn next_line_drains_complete_lines() {
        let mut buf = b"000012AB00C1\r\n0024ABCD\r".to_vec();
        assert_eq!(next_line(&mut buf).unwrap(), "000012AB00C1");
        assert_eq!(next_line(&mut buf).unwrap(), "0024ABCD");
        assert_eq!(next_line(&mut buf), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn next_line_keeps_incomplete_tail() {
        let mut buf = b"000012AB00C1\r0024AB".to_vec();
        assert_eq!(next_line(&mut buf).unwrap(), "000012AB00C1");
        assert_eq!(next_line(&mut buf), None);
        assert_eq!(buf, b"0024AB");
    }

    #[test]
    fn next_line_skips_blank_lines() {
        let mut buf = b"\r\n\r\n000012AB00C1\r\n".to_vec();
        assert_eq!(next_line(&mut buf).unwrap(), "000012AB00C1");
        assert_eq!(next_line(&mut buf), None);
    }
}
