//! Numeric text grammar used for offsets, lengths and masks.
//!
//! Accepts decimal (`-14`), hex (`0x0e`, `x0e`) and binary (`b1110`). Offsets may also be given
//! by one of the well-known header [`SYMBOLS`] (untagged Ethernet, IPv4 without options).

use crate::ValueError;

/// Well-known header offsets, in bytes from the start of an Ethernet frame.
pub const SYMBOLS: &[(&str, i32)] = &[
    ("eth.dst", 0),
    ("eth.src", 6),
    ("eth.type", 12),
    ("arp.htype", 14),
    ("arp.ptype", 16),
    ("arp.op", 20),
    ("arp.sha", 22),
    ("arp.spa", 28),
    ("arp.tha", 32),
    ("arp.tpa", 38),
    ("ip.vhl", 14),
    ("ip.tos", 15),
    ("ip.len", 16),
    ("ip.id", 18),
    ("ip.frag", 20),
    ("ip.ttl", 22),
    ("ip.proto", 23),
    ("ip.sum", 24),
    ("ip.src", 26),
    ("ip.dst", 30),
    ("ip6.flow", 14),
    ("ip6.plen", 18),
    ("ip6.next", 20),
    ("ip6.hlim", 21),
    ("ip6.src", 22),
    ("ip6.dst", 38),
    ("icmp.type", 34),
    ("icmp.code", 35),
    ("icmp.sum", 36),
    ("udp.sport", 34),
    ("udp.dport", 36),
    ("udp.len", 38),
    ("udp.sum", 40),
    ("udp.data", 42),
    ("tcp.sport", 34),
    ("tcp.dport", 36),
    ("tcp.seq", 38),
    ("tcp.ack", 42),
    ("tcp.off", 46),
    ("tcp.flags", 47),
    ("tcp.win", 48),
    ("tcp.sum", 50),
    ("tcp.urp", 52),
    ("tcp.data", 54),
];

/// Looks up a symbolic offset.
pub fn symbol(name: &str) -> Option<i32> {
    SYMBOLS.iter().find(|(sym, _)| *sym == name).map(|(_, offset)| *offset)
}

/// Parses a signed integer in any of the accepted radixes.
pub fn parse_int(text: &str) -> Result<i64, ValueError> {
    let malformed = || ValueError::Malformed(text.to_string());

    let (negative, body) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let (radix, digits) = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix('x')) {
        (16, hex)
    } else if let Some(bin) = body.strip_prefix("0b").or_else(|| body.strip_prefix('b')) {
        (2, bin)
    } else {
        (10, body)
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(malformed());
    }

    let magnitude = u64::from_str_radix(digits, radix)
        .map_err(|_| ValueError::overflow(text, std::mem::size_of::<i64>()))?;

    if negative {
        if magnitude > i64::MAX as u64 + 1 {
            return Err(ValueError::overflow(text, std::mem::size_of::<i64>()));
        }
        Ok((magnitude as i64).wrapping_neg())
    } else {
        i64::try_from(magnitude).map_err(|_| ValueError::overflow(text, std::mem::size_of::<i64>()))
    }
}

/// Parses a field offset: a signed 32-bit integer or a [`symbol`].
pub fn parse_offset(text: &str) -> Result<i32, ValueError> {
    if let Some(offset) = symbol(text) {
        return Ok(offset);
    }

    let value = parse_int(text)?;
    i32::try_from(value).map_err(|_| ValueError::overflow(text, std::mem::size_of::<i32>()))
}

/// Parses a field length.
pub fn parse_len(text: &str) -> Result<u16, ValueError> {
    let value = parse_int(text)?;
    u16::try_from(value).map_err(|_| ValueError::overflow(text, std::mem::size_of::<u16>()))
}

/// Parses a trailing-byte mask.
pub fn parse_mask(text: &str) -> Result<u8, ValueError> {
    let value = parse_int(text)?;
    u8::try_from(value).map_err(|_| ValueError::overflow(text, std::mem::size_of::<u8>()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radixes() {
        assert_eq!(parse_int("42").unwrap(), 42);
        assert_eq!(parse_int("-14").unwrap(), -14);
        assert_eq!(parse_int("0x0e").unwrap(), 14);
        assert_eq!(parse_int("x0E").unwrap(), 14);
        assert_eq!(parse_int("b1110").unwrap(), 14);
        assert_eq!(parse_int("-0x10").unwrap(), -16);
        assert_eq!(parse_int("-9223372036854775808").unwrap(), i64::MIN);

        assert!(matches!(parse_int("0x"), Err(ValueError::Malformed(_))));
        assert!(matches!(parse_int("12a"), Err(ValueError::Malformed(_))));
        assert!(matches!(parse_int("b102"), Err(ValueError::Malformed(_))));
        assert!(matches!(parse_int("9223372036854775808"), Err(ValueError::Overflow { .. })));
    }

    #[test]
    fn offsets_and_symbols() {
        assert_eq!(parse_offset("udp.sport").unwrap(), 34);
        assert_eq!(parse_offset("tcp.flags").unwrap(), 47);
        assert_eq!(parse_offset("-4").unwrap(), -4);
        assert!(parse_offset("udp.nope").is_err());
        assert!(parse_offset("0x100000000").is_err());
    }

    #[test]
    fn lengths_and_masks() {
        assert_eq!(parse_len("6").unwrap(), 6);
        assert_eq!(parse_mask("0xf0").unwrap(), 0xf0);
        assert!(matches!(parse_len("-1"), Err(ValueError::Overflow { .. })));
        assert!(matches!(parse_mask("256"), Err(ValueError::Overflow { .. })));
    }
}
