use lazy_static::lazy_static;
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt::Display;
use std::fmt::Error as FmtError;
use std::fmt::Formatter;
use std::fmt::Write;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::error::{Error, Result};

/// IP protocol version of an address.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Copy, Clone, Hash)]
pub enum Version {
    V4,
    V6,
}

impl Version {
    /// Width of the address in bits (32 or 128).
    pub fn max_prefix_len(self) -> u8 {
        match self {
            Version::V4 => 32,
            Version::V6 => 128,
        }
    }

    /// Number of octets in the address (4 or 16).
    pub fn octet_count(self) -> usize {
        match self {
            Version::V4 => 4,
            Version::V6 => 16,
        }
    }

    /// All ones over the address width, as the low bits of a `u128`.
    pub(crate) fn span_mask(self) -> u128 {
        match self {
            Version::V4 => u128::from(u32::MAX),
            Version::V6 => u128::MAX,
        }
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter) -> std::result::Result<(), FmtError> {
        match self {
            Version::V4 => write!(f, "IPv4"),
            Version::V6 => write!(f, "IPv6"),
        }
    }
}

/// A single IPv4 or IPv6 address.
///
/// Thin wrapper around [`std::net::IpAddr`] adding the textual notations
/// (hex, binary, decimal integer) and the byte-wise arithmetic the network
/// and range types are built on. Values are immutable; `next`/`prev` return
/// new addresses.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Copy, Clone, Hash)]
pub struct Ip(IpAddr);

impl Ip {
    /// Parse any supported notation: `0x` + 8/32 hex digits, `0b` + 32/128
    /// binary digits, an unsigned decimal integer (taken as IPv4), or a
    /// standard dotted-quad / colon-hex literal.
    pub fn parse(s: &str) -> Result<Self> {
        if let Some(hex) = s.strip_prefix("0x") {
            return Self::parse_hex(hex);
        }
        if let Some(bin) = s.strip_prefix("0b") {
            return Self::parse_bin(bin);
        }
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            let value = s
                .parse::<u128>()
                .map_err(|_| Error::invalid_format("integer IP", s))?;
            return Self::parse_int(value, Version::V4)
                .map_err(|_| Error::invalid_format("integer IP", s));
        }
        match IpAddr::from_str(s) {
            Ok(addr) => Ok(Ip(addr)),
            Err(_) => Err(Error::invalid_format("IP address", s)),
        }
    }

    /// Parse exactly 8 (IPv4) or 32 (IPv6) hex digits, without the `0x`.
    pub fn parse_hex(s: &str) -> Result<Self> {
        lazy_static! {
            static ref RE: Regex =
                Regex::new(r"^([0-9a-fA-F]{8}|[0-9a-fA-F]{32})$").expect("Not possible");
        }
        if !RE.is_match(s) {
            return Err(Error::invalid_format("hexadecimal IP", s));
        }
        if s.len() == 8 {
            let bits = u32::from_str_radix(s, 16).map_err(|_| Error::invalid_format("hexadecimal IP", s))?;
            Ok(Ip(IpAddr::V4(Ipv4Addr::from(bits))))
        } else {
            let bits = u128::from_str_radix(s, 16).map_err(|_| Error::invalid_format("hexadecimal IP", s))?;
            Ok(Ip(IpAddr::V6(Ipv6Addr::from(bits))))
        }
    }

    /// Parse exactly 32 (IPv4) or 128 (IPv6) binary digits, without the `0b`.
    pub fn parse_bin(s: &str) -> Result<Self> {
        lazy_static! {
            static ref RE: Regex = Regex::new(r"^([01]{32}|[01]{128})$").expect("Not possible");
        }
        if !RE.is_match(s) {
            return Err(Error::invalid_format("binary IP", s));
        }
        if s.len() == 32 {
            let bits = u32::from_str_radix(s, 2).map_err(|_| Error::invalid_format("binary IP", s))?;
            Ok(Ip(IpAddr::V4(Ipv4Addr::from(bits))))
        } else {
            let bits = u128::from_str_radix(s, 2).map_err(|_| Error::invalid_format("binary IP", s))?;
            Ok(Ip(IpAddr::V6(Ipv6Addr::from(bits))))
        }
    }

    /// Build an address of the given version from its big-endian unsigned
    /// integer value. IPv4 values must fit in 32 bits.
    pub fn parse_int(value: u128, version: Version) -> Result<Self> {
        if version == Version::V4 && value > u128::from(u32::MAX) {
            return Err(Error::invalid_format("integer IP", &value.to_string()));
        }
        Ok(Self::from_bits(version, value))
    }

    /// Build an address from 4 or 16 raw big-endian bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match bytes.len() {
            4 => {
                let mut octets = [0u8; 4];
                octets.copy_from_slice(bytes);
                Ok(Ip(IpAddr::V4(Ipv4Addr::from(octets))))
            }
            16 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(bytes);
                Ok(Ip(IpAddr::V6(Ipv6Addr::from(octets))))
            }
            _ => Err(Error::InvalidFormat {
                kind: "raw address",
                text: format!("{} bytes", bytes.len()),
            }),
        }
    }

    // Infallible within-width constructor for internal arithmetic.
    pub(crate) fn from_bits(version: Version, bits: u128) -> Self {
        debug_assert!(bits <= version.span_mask());
        match version {
            Version::V4 => Ip(IpAddr::V4(Ipv4Addr::from(bits as u32))),
            Version::V6 => Ip(IpAddr::V6(Ipv6Addr::from(bits))),
        }
    }

    pub fn version(&self) -> Version {
        match self.0 {
            IpAddr::V4(_) => Version::V4,
            IpAddr::V6(_) => Version::V6,
        }
    }

    pub fn max_prefix_len(&self) -> u8 {
        self.version().max_prefix_len()
    }

    pub fn octet_count(&self) -> usize {
        self.version().octet_count()
    }

    /// Big-endian bytes, 4 for IPv4 and 16 for IPv6.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self.0 {
            IpAddr::V4(a) => a.octets().to_vec(),
            IpAddr::V6(a) => a.octets().to_vec(),
        }
    }

    /// Zero-padded lowercase hex, 8 or 32 digits.
    pub fn to_hex(&self) -> String {
        self.to_bytes().iter().fold(String::new(), |mut s, b| {
            let _ = write!(s, "{:02x}", b);
            s
        })
    }

    /// Zero-padded binary, 32 or 128 digits.
    pub fn to_bin_string(&self) -> String {
        self.to_bytes().iter().fold(String::new(), |mut s, b| {
            let _ = write!(s, "{:08b}", b);
            s
        })
    }

    /// The address read as a big-endian unsigned integer.
    pub fn to_u128(&self) -> u128 {
        match self.0 {
            IpAddr::V4(a) => u128::from(u32::from(a)),
            IpAddr::V6(a) => u128::from(a),
        }
    }

    /// The address `n` steps forward, carrying across all octets. Stepping
    /// past the top of the address space fails with [`Error::Overflow`].
    pub fn next(&self, n: u128) -> Result<Self> {
        let bits = self.to_u128().checked_add(n).ok_or(Error::Overflow)?;
        if bits > self.version().span_mask() {
            return Err(Error::Overflow);
        }
        Ok(Self::from_bits(self.version(), bits))
    }

    /// The address `n` steps backward. Stepping past the bottom of the
    /// address space fails with [`Error::Overflow`].
    pub fn prev(&self, n: u128) -> Result<Self> {
        let bits = self.to_u128().checked_sub(n).ok_or(Error::Overflow)?;
        Ok(Self::from_bits(self.version(), bits))
    }
}

impl FromStr for Ip {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Ip::parse(s)
    }
}

impl Display for Ip {
    fn fmt(&self, f: &mut Formatter) -> std::result::Result<(), FmtError> {
        write!(f, "{}", self.0)
    }
}

impl From<IpAddr> for Ip {
    fn from(addr: IpAddr) -> Self {
        Ip(addr)
    }
}

impl From<Ipv4Addr> for Ip {
    fn from(addr: Ipv4Addr) -> Self {
        Ip(IpAddr::V4(addr))
    }
}

impl From<Ipv6Addr> for Ip {
    fn from(addr: Ipv6Addr) -> Self {
        Ip(IpAddr::V6(addr))
    }
}

impl From<Ip> for IpAddr {
    fn from(ip: Ip) -> Self {
        ip.0
    }
}

impl Serialize for Ip {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Ip {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Ip, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ip::parse(&s).map_err(de::Error::custom)
    }
}

/// Lazy in-order walk over an inclusive span of addresses.
///
/// Independent per consumer: two iterators over the same span never
/// interfere, and a fresh one can be started at any time.
#[derive(Debug, Clone)]
pub struct IpIter {
    version: Version,
    next: Option<u128>,
    last: u128,
}

impl IpIter {
    pub(crate) fn span(version: Version, first: u128, last: u128) -> Self {
        IpIter {
            version,
            next: Some(first),
            last,
        }
    }
}

impl Iterator for IpIter {
    type Item = Ip;

    fn next(&mut self) -> Option<Ip> {
        let current = self.next?;
        self.next = if current < self.last {
            Some(current + 1)
        } else {
            None
        };
        Some(Ip::from_bits(self.version, current))
    }
}
