use lazy_static::lazy_static;
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt::Display;
use std::fmt::Error as FmtError;
use std::fmt::Formatter;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::ip::{Ip, IpIter, Version};
use crate::network::Network;

/// An arbitrary inclusive interval of addresses, not necessarily
/// CIDR-aligned. Invariant: `first <= last`, same version.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Copy, Clone, Hash)]
pub struct Range {
    first: Ip,
    last: Ip,
}

/// One item of a containment query: a single address or a block of them.
///
/// Closed over the two cases so point containment and interval containment
/// are resolved by pattern match rather than runtime type inspection.
#[derive(Eq, PartialEq, Debug, Copy, Clone)]
pub enum Selector {
    Ip(Ip),
    Block(Range),
}

impl Range {
    pub fn new(first: Ip, last: Ip) -> Result<Self> {
        if first.version() != last.version() {
            return Err(Error::VersionMismatch);
        }
        if first > last {
            return Err(Error::Order("first IP is greater than last"));
        }
        Ok(Range { first, last })
    }

    // Interval already known to be ordered and version-consistent.
    pub(crate) fn span(first: Ip, last: Ip) -> Self {
        debug_assert!(first.version() == last.version() && first <= last);
        Range { first, last }
    }

    /// Parse one of four notations, tried in order: `"first-last"`,
    /// `"addr/prefix"` (spanning network to broadcast), the IPv4-only
    /// wildcard-octet form `"a.b.*.*"` (each `*` octet spans 0–255), or a
    /// bare address (a single-address range).
    pub fn parse(s: &str) -> Result<Self> {
        if let Some((first, last)) = s.split_once('-') {
            return Range::new(Ip::parse(first)?, Ip::parse(last)?);
        }
        if s.contains('/') {
            let network = Network::parse(s)?;
            return Ok(Range::span(network.first_ip(), network.last_ip()));
        }
        if s.contains('*') {
            return Self::parse_wildcard(s);
        }
        let ip = Ip::parse(s).map_err(|_| Error::invalid_format("range", s))?;
        Ok(Range::span(ip, ip))
    }

    fn parse_wildcard(s: &str) -> Result<Self> {
        lazy_static! {
            static ref RE: Regex =
                Regex::new(r"^([0-9]{1,3}|\*)(\.([0-9]{1,3}|\*)){3}$").expect("Not possible");
        }
        if !RE.is_match(s) {
            return Err(Error::invalid_format("range", s));
        }
        let first = Ip::parse(&s.replace('*', "0")).map_err(|_| Error::invalid_format("range", s))?;
        let last = Ip::parse(&s.replace('*', "255")).map_err(|_| Error::invalid_format("range", s))?;
        Ok(Range::span(first, last))
    }

    pub fn first_ip(&self) -> Ip {
        self.first
    }

    pub fn last_ip(&self) -> Ip {
        self.last
    }

    pub fn version(&self) -> Version {
        self.first.version()
    }

    /// A copy with a new lower endpoint. Fails if `ip` would sit above the
    /// current upper endpoint.
    pub fn with_first_ip(&self, ip: Ip) -> Result<Self> {
        if ip.version() != self.last.version() {
            return Err(Error::VersionMismatch);
        }
        if ip > self.last {
            return Err(Error::Order("first IP is greater than last"));
        }
        Ok(Range::span(ip, self.last))
    }

    /// A copy with a new upper endpoint. Fails if `ip` would sit below the
    /// current lower endpoint.
    pub fn with_last_ip(&self, ip: Ip) -> Result<Self> {
        if ip.version() != self.first.version() {
            return Err(Error::VersionMismatch);
        }
        if ip < self.first {
            return Err(Error::Order("last IP is less than first"));
        }
        Ok(Range::span(self.first, ip))
    }

    /// Point containment for an address, full enclosure for a block.
    pub fn contains<T: Into<Selector>>(&self, item: T) -> bool {
        match item.into() {
            Selector::Ip(ip) => {
                self.version() == ip.version() && self.first <= ip && ip <= self.last
            }
            Selector::Block(other) => {
                self.version() == other.version()
                    && self.first <= other.first
                    && other.last <= self.last
            }
        }
    }

    /// True iff the two ranges share at least one address.
    pub fn overlaps(&self, other: &Range) -> bool {
        self.version() == other.version() && self.first <= other.last && other.first <= self.last
    }

    /// True iff at least one item matches: addresses by point containment,
    /// blocks by overlap. The enclosure test is reserved for
    /// [`Range::contains_all`]; the asymmetry is deliberate.
    pub fn contains_any(&self, items: &[Selector]) -> bool {
        items.iter().any(|item| match item {
            Selector::Ip(ip) => self.contains(*ip),
            Selector::Block(other) => self.overlaps(other),
        })
    }

    /// True iff every item matches: addresses by point containment, blocks
    /// by full enclosure.
    pub fn contains_all(&self, items: &[Selector]) -> bool {
        items.iter().all(|item| match item {
            Selector::Ip(ip) => self.contains(*ip),
            Selector::Block(other) => self.contains(*other),
        })
    }

    /// The minimal ordered list of CIDR blocks whose union is exactly this
    /// range.
    ///
    /// Greedy: at each position take the largest power-of-two block that is
    /// aligned there (a block of 2^k addresses may start at A only when
    /// A mod 2^k == 0) and does not run past the upper endpoint.
    pub fn networks(&self) -> Vec<Network> {
        let version = self.version();
        let width = u32::from(version.max_prefix_len());
        let last = self.last.to_u128();

        let mut networks = Vec::new();
        let mut current = self.first.to_u128();
        loop {
            let align = if current == 0 {
                width
            } else {
                current.trailing_zeros().min(width)
            };
            // largest k with 2^k - 1 <= last - current
            let gap = last - current;
            let fit = if gap == u128::MAX {
                width
            } else {
                127 - (gap + 1).leading_zeros()
            };
            let k = align.min(fit);

            networks.push(Network::block(
                Ip::from_bits(version, current),
                (width - k) as u8,
            ));

            if k >= 128 {
                break; // single block covering the whole space
            }
            match current.checked_add(1u128 << k) {
                Some(next) if next <= last => current = next,
                _ => break,
            }
        }
        networks
    }

    /// Number of addresses in the range. Saturates at `u128::MAX` for the
    /// full IPv6 space.
    pub fn count(&self) -> u128 {
        (self.last.to_u128() - self.first.to_u128())
            .checked_add(1)
            .unwrap_or(u128::MAX)
    }

    /// Every address from first to last in order, lazily. Restartable;
    /// separate iterators never interfere.
    pub fn iter(&self) -> IpIter {
        IpIter::span(self.version(), self.first.to_u128(), self.last.to_u128())
    }
}

impl From<Ip> for Selector {
    fn from(ip: Ip) -> Self {
        Selector::Ip(ip)
    }
}

impl From<Range> for Selector {
    fn from(range: Range) -> Self {
        Selector::Block(range)
    }
}

impl From<&Range> for Selector {
    fn from(range: &Range) -> Self {
        Selector::Block(*range)
    }
}

impl From<Network> for Selector {
    fn from(network: Network) -> Self {
        Selector::Block(Range::span(network.first_ip(), network.last_ip()))
    }
}

impl From<&Network> for Selector {
    fn from(network: &Network) -> Self {
        Selector::Block(Range::span(network.first_ip(), network.last_ip()))
    }
}

impl From<Network> for Range {
    fn from(network: Network) -> Self {
        Range::span(network.first_ip(), network.last_ip())
    }
}

impl FromStr for Range {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Range::parse(s)
    }
}

impl Display for Range {
    fn fmt(&self, f: &mut Formatter) -> std::result::Result<(), FmtError> {
        write!(f, "{}-{}", self.first, self.last)
    }
}

impl<'a> IntoIterator for &'a Range {
    type Item = Ip;
    type IntoIter = IpIter;

    fn into_iter(self) -> IpIter {
        self.iter()
    }
}

impl Serialize for Range {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Range {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Range, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Range::parse(&s).map_err(de::Error::custom)
    }
}
