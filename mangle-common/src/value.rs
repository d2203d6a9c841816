//! Conversion between user text and fixed-length big-endian byte buffers.
//!
//! The accepted forms, tried in this order:
//! - `"..."`: quoted ASCII, must be exactly as long as the target.
//! - IPv4 (`10.0.0.1`), MAC (`0a:00:27:00:00:00` or dash separated) and IPv6 (`fe80::1`).
//! - Integers: decimal (`-12`, `300`), hex (`0x1f`, `x1f`) and binary (`b1010`, `0b1010`).
//! - A bare hex-digit sequence containing at least one letter (`deadbeef`).
//! - Anything else is taken as raw ASCII, which again must match the target length.
//!
//! Numbers and addresses are right-aligned: they are zero padded on the left and fail with
//! [`ValueError::Overflow`] when their significant bytes don't fit.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::ValueError;

/// Parses `text` into exactly `out_len` bytes.
pub fn parse(text: &str, out_len: usize) -> Result<Vec<u8>, ValueError> {
    // Nothing to fit, any literal is acceptable.
    if out_len == 0 {
        return Ok(Vec::new());
    }

    if let Some(ascii) = unquote(text) {
        return ascii_exact(text, ascii, out_len);
    }

    if let Ok(addr) = text.parse::<Ipv4Addr>() {
        return fit_unsigned(text, &addr.octets(), out_len);
    }

    if let Some(mac) = parse_mac(text) {
        return fit_unsigned(text, &mac, out_len);
    }

    if text.contains(':') {
        if let Ok(addr) = text.parse::<Ipv6Addr>() {
            return fit_unsigned(text, &addr.octets(), out_len);
        }
    }

    if let Some(bytes) = parse_integer(text, out_len)? {
        return Ok(bytes);
    }

    if text.bytes().all(|c| c.is_ascii_hexdigit()) &&
        text.bytes().any(|c| c.is_ascii_alphabetic())
    {
        if let Some(digits) = hex_digits(text) {
            return fit_unsigned(text, &digits, out_len);
        }
    }

    ascii_exact(text, text, out_len)
}

/// Renders bytes as a lowercase, `0x` prefixed hex string. Empty input renders as `""`.
pub fn render(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }

    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }

    out
}

/// Decodes the output of [`render`] back into bytes.
pub fn decode_rendered(text: &str) -> Option<Vec<u8>> {
    if text.is_empty() {
        return Some(Vec::new());
    }

    let digits = text.strip_prefix("0x")?;
    if digits.len() % 2 != 0 {
        return None;
    }

    hex_digits(digits)
}

const HEX: &[u8; 16] = b"0123456789abcdef";

fn unquote(text: &str) -> Option<&str> {
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        Some(&text[1..text.len() - 1])
    } else {
        None
    }
}

fn ascii_exact(text: &str, ascii: &str, out_len: usize) -> Result<Vec<u8>, ValueError> {
    if ascii.len() != out_len {
        return Err(ValueError::LengthMismatch {
            text: text.to_string(),
            expected: out_len,
            actual: ascii.len(),
        });
    }

    Ok(ascii.as_bytes().to_vec())
}

fn parse_mac(text: &str) -> Option<[u8; 6]> {
    let sep = if text.contains(':') { ':' } else { '-' };
    let mut out = [0u8; 6];
    let mut groups = text.split(sep);

    for byte in out.iter_mut() {
        let group = groups.next()?;
        if group.is_empty() || group.len() > 2 {
            return None;
        }
        *byte = u8::from_str_radix(group, 16).ok()?;
    }

    if groups.next().is_some() {
        return None;
    }

    Some(out)
}

/// Parses the integer forms. Returns `Ok(None)` if `text` isn't an integer at all.
fn parse_integer(text: &str, out_len: usize) -> Result<Option<Vec<u8>>, ValueError> {
    let (negative, body) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    if body.is_empty() {
        return Ok(None);
    }

    let magnitude = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix('x')) {
        match hex_digits(hex) {
            Some(digits) if !hex.is_empty() => digits,
            _ => return Ok(None),
        }
    } else if let Some(bin) = body.strip_prefix("0b").or_else(|| body.strip_prefix('b')) {
        match binary_digits(bin) {
            Some(digits) => digits,
            None => return Ok(None),
        }
    } else if body.bytes().all(|c| c.is_ascii_digit()) {
        decimal_digits(body).ok_or_else(|| ValueError::overflow(text, out_len))?
    } else {
        return Ok(None);
    };

    if negative {
        fit_negative(text, &magnitude, out_len).map(Some)
    } else {
        fit_unsigned(text, &magnitude, out_len).map(Some)
    }
}

/// Hex digits to big-endian bytes. An odd digit count gets an implicit leading zero nibble.
fn hex_digits(digits: &str) -> Option<Vec<u8>> {
    let nibbles = digits
        .bytes()
        .map(|c| (c as char).to_digit(16).map(|d| d as u8))
        .collect::<Option<Vec<u8>>>()?;

    let mut out = Vec::with_capacity(nibbles.len() / 2 + 1);
    let mut iter = nibbles.iter();
    if nibbles.len() % 2 == 1 {
        out.push(*iter.next()?);
    }
    while let (Some(hi), Some(lo)) = (iter.next(), iter.next()) {
        out.push(hi << 4 | lo);
    }

    Some(out)
}

fn binary_digits(digits: &str) -> Option<Vec<u8>> {
    if digits.is_empty() || !digits.bytes().all(|c| c == b'0' || c == b'1') {
        return None;
    }

    let mut out = vec![0u8; (digits.len() + 7) / 8];
    let total = out.len() * 8;
    let pad = total - digits.len();
    for (i, c) in digits.bytes().enumerate() {
        if c == b'1' {
            let bit = pad + i;
            out[bit / 8] |= 0x80 >> (bit % 8);
        }
    }

    Some(out)
}

fn decimal_digits(digits: &str) -> Option<Vec<u8>> {
    let value = digits.parse::<u128>().ok()?;
    Some(value.to_be_bytes().to_vec())
}

fn significant(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

fn fit_unsigned(text: &str, bytes: &[u8], out_len: usize) -> Result<Vec<u8>, ValueError> {
    let sig = significant(bytes);
    if sig.len() > out_len {
        return Err(ValueError::overflow(text, out_len));
    }

    let mut out = vec![0u8; out_len];
    out[out_len - sig.len()..].copy_from_slice(sig);
    Ok(out)
}

/// Two's complement of `magnitude` in `out_len` bytes, failing if it is below the signed minimum.
fn fit_negative(text: &str, magnitude: &[u8], out_len: usize) -> Result<Vec<u8>, ValueError> {
    let sig = significant(magnitude);
    if sig.is_empty() {
        return Ok(vec![0u8; out_len]);
    }

    // The smallest representable value is -(0x80 00 .. 00) with out_len bytes.
    let fits = match sig.len().cmp(&out_len) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Equal => sig[0] < 0x80 || (sig[0] == 0x80 && sig[1..].iter().all(|b| *b == 0)),
        std::cmp::Ordering::Greater => false,
    };
    if !fits {
        return Err(ValueError::overflow(text, out_len));
    }

    let mut out = vec![0u8; out_len];
    out[out_len - sig.len()..].copy_from_slice(sig);

    // Negate: invert and add one.
    let mut carry = true;
    for byte in out.iter_mut().rev() {
        *byte = !*byte;
        if carry {
            let (sum, overflow) = byte.overflowing_add(1);
            *byte = sum;
            carry = overflow;
        }
    }

    Ok(out)
}
