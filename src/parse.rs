//! Allocation-free dotted-quad parsing.

use std::net::Ipv4Addr;

use thiserror::Error;

/// Why a line is not a dotted-quad address. Positions are byte offsets
/// within the line.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty line")]
    Empty,

    #[error("invalid byte {byte:#04x} at position {position}")]
    InvalidByte { byte: u8, position: usize },

    #[error("octet exceeds 255 at position {position}")]
    OctetOverflow { position: usize },

    #[error("empty octet at position {position}")]
    EmptyOctet { position: usize },

    #[error("fourth dot at position {position}")]
    TooManyDots { position: usize },

    #[error("expected 3 dots, found {dots}")]
    WrongDotCount { dots: u8 },
}

/// Packs four octets into a key, most significant first.
#[inline]
pub const fn key_from_octets(a: u8, b: u8, c: u8, d: u8) -> u32 {
    (a as u32) << 24 | (b as u32) << 16 | (c as u32) << 8 | d as u32
}

/// Address form of a key, for diagnostics.
#[inline]
pub fn key_to_addr(key: u32) -> Ipv4Addr {
    Ipv4Addr::from(key)
}

/// Key of an address, the inverse of [`key_to_addr`].
#[inline]
pub fn addr_to_key(addr: Ipv4Addr) -> u32 {
    u32::from(addr)
}

/// Parses `a.b.c.d` into `a << 24 | b << 16 | c << 8 | d`.
///
/// Single left-to-right pass over the borrowed bytes. Each group needs at
/// least one digit; leading zeros are accepted (`010` is 10). No whitespace
/// is trimmed.
pub fn parse_ipv4(line: &[u8]) -> Result<u32, ParseError> {
    if line.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut value = 0u32;
    let mut octet = 0u32;
    let mut has_digit = false;
    let mut dots = 0u8;

    for (position, &byte) in line.iter().enumerate() {
        match byte {
            b'0'..=b'9' => {
                octet = octet * 10 + (byte - b'0') as u32;
                if octet > 255 {
                    return Err(ParseError::OctetOverflow { position });
                }
                has_digit = true;
            }
            b'.' => {
                if !has_digit {
                    return Err(ParseError::EmptyOctet { position });
                }
                dots += 1;
                if dots > 3 {
                    return Err(ParseError::TooManyDots { position });
                }
                value = value << 8 | octet;
                octet = 0;
                has_digit = false;
            }
            _ => return Err(ParseError::InvalidByte { byte, position }),
        }
    }

    if dots != 3 {
        return Err(ParseError::WrongDotCount { dots });
    }
    if !has_digit {
        return Err(ParseError::EmptyOctet {
            position: line.len(),
        });
    }
    Ok(value << 8 | octet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::str::FromStr;

    /// Reference conversion built on `str::split`, slow but obviously right.
    fn ip_to_index_str(ip: &str) -> Option<u32> {
        let parts: Vec<&str> = ip.split('.').collect();
        if parts.len() != 4 {
            return None;
        }
        let octets: Vec<u8> = parts.iter().filter_map(|s| s.parse().ok()).collect();
        if octets.len() == 4 {
            Some(key_from_octets(octets[0], octets[1], octets[2], octets[3]))
        } else {
            None
        }
    }

    #[test]
    fn parses_edges() {
        assert_eq!(parse_ipv4(b"0.0.0.0"), Ok(0));
        assert_eq!(parse_ipv4(b"255.255.255.255"), Ok(u32::MAX));
        assert_eq!(parse_ipv4(b"1.2.3.4"), Ok(0x0102_0304));
        assert_eq!(parse_ipv4(b"192.168.0.1"), Ok(0xc0a8_0001));
        assert_eq!(parse_ipv4(b"10.0.0.255"), Ok(0x0a00_00ff));
    }

    #[test]
    fn accepts_leading_zeros() {
        assert_eq!(parse_ipv4(b"001.002.003.004"), Ok(0x0102_0304));
        assert_eq!(parse_ipv4(b"0255.0.0.0"), Ok(0xff00_0000));
    }

    #[test]
    fn rejects_octet_overflow() {
        assert_eq!(
            parse_ipv4(b"256.1.1.1"),
            Err(ParseError::OctetOverflow { position: 2 })
        );
        assert_eq!(
            parse_ipv4(b"1.1.1.1000"),
            Err(ParseError::OctetOverflow { position: 9 })
        );
        assert_eq!(
            parse_ipv4(b"1.300.1.1"),
            Err(ParseError::OctetOverflow { position: 4 })
        );
    }

    #[test]
    fn rejects_invalid_bytes() {
        assert_eq!(
            parse_ipv4(b"not.an.ip"),
            Err(ParseError::InvalidByte {
                byte: b'n',
                position: 0
            })
        );
        assert_eq!(
            parse_ipv4(b"1.2.3.4\r"),
            Err(ParseError::InvalidByte {
                byte: b'\r',
                position: 7
            })
        );
        assert_eq!(
            parse_ipv4(b" 1.2.3.4"),
            Err(ParseError::InvalidByte {
                byte: b' ',
                position: 0
            })
        );
        assert_eq!(
            parse_ipv4(b"1.2.-3.4"),
            Err(ParseError::InvalidByte {
                byte: b'-',
                position: 4
            })
        );
    }

    #[test]
    fn rejects_wrong_dot_count() {
        assert_eq!(parse_ipv4(b"1"), Err(ParseError::WrongDotCount { dots: 0 }));
        assert_eq!(
            parse_ipv4(b"1.2.3"),
            Err(ParseError::WrongDotCount { dots: 2 })
        );
        assert_eq!(
            parse_ipv4(b"1.2.3.4.5"),
            Err(ParseError::TooManyDots { position: 7 })
        );
    }

    #[test]
    fn rejects_empty_groups() {
        assert_eq!(parse_ipv4(b""), Err(ParseError::Empty));
        assert_eq!(
            parse_ipv4(b".1.2.3"),
            Err(ParseError::EmptyOctet { position: 0 })
        );
        assert_eq!(
            parse_ipv4(b"1..2.3"),
            Err(ParseError::EmptyOctet { position: 2 })
        );
        assert_eq!(
            parse_ipv4(b"1.2.3."),
            Err(ParseError::EmptyOctet { position: 6 })
        );
        assert_eq!(
            parse_ipv4(b"..."),
            Err(ParseError::EmptyOctet { position: 0 })
        );
    }

    #[test]
    fn parse_fuzzy_test() {
        let mut rng = rand::thread_rng();
        for _ in 0..100_000 {
            let ip = format!(
                "{}.{}.{}.{}",
                rng.gen::<u8>(),
                rng.gen::<u8>(),
                rng.gen::<u8>(),
                rng.gen::<u8>()
            );
            let expected = ip_to_index_str(&ip).unwrap();
            assert_eq!(parse_ipv4(ip.as_bytes()), Ok(expected), "parsing {ip:?}");
        }
    }

    #[test]
    fn matches_std_parser() {
        let mut rng = rand::thread_rng();
        for _ in 0..100_000 {
            let addr = key_to_addr(rng.gen());
            let text = addr.to_string();
            let expected = Ipv4Addr::from_str(&text).map(u32::from).unwrap();
            assert_eq!(parse_ipv4(text.as_bytes()), Ok(expected), "parsing {text:?}");
            assert_eq!(addr_to_key(addr), expected);
        }
    }

    #[test]
    fn key_addr_conversions() {
        assert_eq!(key_to_addr(0x0102_0304), Ipv4Addr::new(1, 2, 3, 4));
        assert_eq!(addr_to_key(Ipv4Addr::BROADCAST), u32::MAX);
        assert_eq!(
            key_to_addr(parse_ipv4(b"192.168.0.1").unwrap()).to_string(),
            "192.168.0.1"
        );
        assert_eq!(key_from_octets(10, 0, 0, 1), addr_to_key(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn overflow_fuzzy_test() {
        let mut rng = rand::thread_rng();
        for _ in 0..10_000 {
            let mut octets: [u32; 4] = rng.gen::<[u8; 4]>().map(u32::from);
            octets[rng.gen_range(0..4)] = rng.gen_range(256..1000);
            let ip = format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3]);
            assert!(
                matches!(
                    parse_ipv4(ip.as_bytes()),
                    Err(ParseError::OctetOverflow { .. })
                ),
                "{ip:?} accepted"
            );
        }
    }
}
