use lazy_static::lazy_static;
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::fmt::Display;
use std::fmt::Error as FmtError;
use std::fmt::Formatter;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::ip::{Ip, IpIter, Version};
use crate::range::Range;

/// A CIDR block: an address plus a netmask of the same version.
///
/// The address is not required to be aligned; [`Network::network`] computes
/// the aligned form on demand. Values are immutable and every operation
/// returns new blocks.
#[derive(Eq, PartialEq, Debug, Copy, Clone, Hash)]
pub struct Network {
    ip: Ip,
    netmask: Ip,
}

impl Network {
    /// Pair an address with a netmask. The netmask must be of the same
    /// version and a contiguous run of ones followed by zeros.
    pub fn new(ip: Ip, netmask: Ip) -> Result<Self> {
        if ip.version() != netmask.version() {
            return Err(Error::VersionMismatch);
        }
        // valid iff the host part (inverted mask) is of the form 2^k - 1
        let host = !netmask.to_u128() & netmask.version().span_mask();
        if host & host.wrapping_add(1) != 0 {
            return Err(Error::InvalidNetmask);
        }
        Ok(Network { ip, netmask })
    }

    /// Pair an address with the netmask derived from a prefix length.
    pub fn with_prefix_len(ip: Ip, prefix_len: u8) -> Result<Self> {
        let netmask = prefix_to_netmask(prefix_len, ip.version())?;
        Ok(Network { ip, netmask })
    }

    // Aligned-block constructor for internal arithmetic; the caller
    // guarantees `prefix_len` is within the version's width.
    pub(crate) fn block(ip: Ip, prefix_len: u8) -> Self {
        debug_assert!(prefix_len <= ip.max_prefix_len());
        let version = ip.version();
        Network {
            ip,
            netmask: Ip::from_bits(version, netmask_bits(prefix_len, version)),
        }
    }

    /// Parse `"addr/prefix"`, `"addr netmask"` (space-separated) or a bare
    /// address (prefix = the version's maximum, a single host).
    pub fn parse(s: &str) -> Result<Self> {
        lazy_static! {
            static ref CIDR: Regex = Regex::new(r"^(.+?)/(\d+)$").expect("Not possible");
        }
        if let Some(caps) = CIDR.captures(s) {
            let ip = Ip::parse(&caps[1])?;
            let prefix_len = caps[2]
                .parse::<u8>()
                .map_err(|_| Error::invalid_format("network", s))?;
            return Network::with_prefix_len(ip, prefix_len);
        }
        if let Some((addr, mask)) = split_pair(s) {
            return Network::new(Ip::parse(addr)?, Ip::parse(mask)?);
        }
        let ip = Ip::parse(s).map_err(|_| Error::invalid_format("network", s))?;
        Ok(Network::block(ip, ip.max_prefix_len()))
    }

    /// The (possibly unaligned) address this block was built from.
    pub fn ip(&self) -> Ip {
        self.ip
    }

    pub fn netmask(&self) -> Ip {
        self.netmask
    }

    pub fn version(&self) -> Version {
        self.ip.version()
    }

    pub fn max_prefix_len(&self) -> u8 {
        self.ip.max_prefix_len()
    }

    /// Count of leading one-bits in the netmask.
    pub fn prefix_len(&self) -> u8 {
        netmask_to_prefix(self.netmask)
    }

    /// The network (aligned) address: address AND netmask.
    pub fn network(&self) -> Ip {
        Ip::from_bits(self.version(), self.ip.to_u128() & self.netmask.to_u128())
    }

    /// The wildcard mask: bitwise complement of the netmask.
    pub fn wildcard(&self) -> Ip {
        let version = self.version();
        Ip::from_bits(version, !self.netmask.to_u128() & version.span_mask())
    }

    /// The highest address of the block: network OR wildcard.
    pub fn broadcast(&self) -> Ip {
        Ip::from_bits(
            self.version(),
            self.network().to_u128() | self.wildcard().to_u128(),
        )
    }

    pub fn first_ip(&self) -> Ip {
        self.network()
    }

    pub fn last_ip(&self) -> Ip {
        self.broadcast()
    }

    /// Canonical CIDR form, `"<network-address>/<prefix>"`.
    pub fn to_cidr(&self) -> String {
        format!("{}/{}", self.network(), self.prefix_len())
    }

    /// Number of addresses in the block, 2^(width − prefix). Saturates at
    /// `u128::MAX` for the full IPv6 space (`::/0`).
    pub fn block_size(&self) -> u128 {
        let host_len = u32::from(self.max_prefix_len() - self.prefix_len());
        1u128.checked_shl(host_len).unwrap_or(u128::MAX)
    }

    /// The usable host range. IPv4 blocks larger than two addresses lose
    /// the network and broadcast addresses; `/31`, `/32` and all IPv6
    /// blocks span the whole block.
    pub fn hosts(&self) -> Range {
        let first = self.network();
        let last = self.broadcast();
        if self.version() == Version::V4 && self.block_size() > 2 {
            let version = self.version();
            Range::span(
                Ip::from_bits(version, first.to_u128() + 1),
                Ip::from_bits(version, last.to_u128() - 1),
            )
        } else {
            Range::span(first, last)
        }
    }

    /// True iff `ip` lies within this block's span.
    pub fn contains(&self, ip: &Ip) -> bool {
        self.version() == ip.version() && self.first_ip() <= *ip && *ip <= self.last_ip()
    }

    /// The minimal set of CIDR blocks covering this block's span minus
    /// `exclude`'s span, sorted by address. Fails with [`Error::OutOfRange`]
    /// when the spans do not overlap at all; excluding the block itself
    /// yields an empty list.
    ///
    /// Works by repeated bisection: at each prefix level the half not
    /// holding the excluded block is emitted and the other half descended
    /// into, until the excluded block's own prefix level is reached.
    pub fn exclude(&self, exclude: &Network) -> Result<Vec<Network>> {
        if self.version() != exclude.version() {
            return Err(Error::VersionMismatch);
        }
        let target = exclude.first_ip();
        if target > self.last_ip() || exclude.last_ip() < self.first_ip() {
            return Err(Error::OutOfRange);
        }

        let mut networks = Vec::new();
        let max = self.max_prefix_len();
        let mut prefix_len = self.prefix_len() + 1;
        if prefix_len > max {
            return Ok(networks);
        }

        let mut lower = Network::block(self.network(), prefix_len);
        let mut upper = Network::block(lower.last_ip().next(1)?, prefix_len);

        while prefix_len <= exclude.prefix_len() {
            let (matched, unmatched) = if lower.contains(&target) {
                (lower, upper)
            } else {
                (upper, lower)
            };
            networks.push(unmatched);

            prefix_len += 1;
            if prefix_len > max {
                break;
            }
            lower = Network::block(matched.network(), prefix_len);
            upper = Network::block(lower.last_ip().next(1)?, prefix_len);
        }

        networks.sort();
        Ok(networks)
    }

    /// Split into the ordered list of `prefix_len`-sized blocks tiling this
    /// block's span. The new prefix must be strictly longer than the
    /// current one and at most the version's width.
    pub fn subnets(&self, prefix_len: u8) -> Result<Vec<Network>> {
        let max = self.max_prefix_len();
        if prefix_len <= self.prefix_len() || prefix_len > max {
            return Err(Error::InvalidPrefixLength(u32::from(prefix_len)));
        }

        let step = 1u128 << u32::from(max - prefix_len);
        let last = self.last_ip().to_u128();

        let mut networks = Vec::new();
        let mut bits = self.network().to_u128();
        loop {
            networks.push(Network::block(Ip::from_bits(self.version(), bits), prefix_len));
            match bits.checked_add(step) {
                Some(next) if next <= last => bits = next,
                _ => break,
            }
        }
        Ok(networks)
    }

    /// Every address of the block in order, lazily. Restartable; separate
    /// iterators never interfere.
    pub fn iter(&self) -> IpIter {
        IpIter::span(
            self.version(),
            self.first_ip().to_u128(),
            self.last_ip().to_u128(),
        )
    }

    /// Same as [`Network::block_size`].
    pub fn count(&self) -> u128 {
        self.block_size()
    }
}

// Space-separated "address netmask" pair; a single interior space only.
fn split_pair(s: &str) -> Option<(&str, &str)> {
    let mut parts = s.splitn(2, ' ');
    let addr = parts.next()?;
    let mask = parts.next()?;
    if addr.is_empty() || mask.is_empty() || mask.contains(' ') {
        return None;
    }
    Some((addr, mask))
}

// Netmask bits for a prefix length already known to fit the width.
fn netmask_bits(prefix_len: u8, version: Version) -> u128 {
    if prefix_len == 0 {
        return 0;
    }
    let width = version.max_prefix_len();
    let ones = u128::MAX >> (128 - u32::from(prefix_len));
    ones << u32::from(width - prefix_len)
}

/// The netmask whose leading ones count is `prefix_len`, as an address of
/// the given version.
pub fn prefix_to_netmask(prefix_len: u8, version: Version) -> Result<Ip> {
    if prefix_len > version.max_prefix_len() {
        return Err(Error::InvalidPrefixLength(u32::from(prefix_len)));
    }
    Ok(Ip::from_bits(version, netmask_bits(prefix_len, version)))
}

/// Count of leading one-bits. Assumes the mask already satisfies the
/// contiguity invariant and does not re-validate it.
pub fn netmask_to_prefix(netmask: Ip) -> u8 {
    netmask.to_u128().count_ones() as u8
}

impl Ord for Network {
    fn cmp(&self, other: &Self) -> Ordering {
        self.network()
            .cmp(&other.network())
            .then_with(|| self.prefix_len().cmp(&other.prefix_len()))
            .then_with(|| self.ip.cmp(&other.ip))
    }
}

impl PartialOrd for Network {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Network {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Network::parse(s)
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut Formatter) -> std::result::Result<(), FmtError> {
        write!(f, "{}/{}", self.network(), self.prefix_len())
    }
}

impl<'a> IntoIterator for &'a Network {
    type Item = Ip;
    type IntoIter = IpIter;

    fn into_iter(self) -> IpIter {
        self.iter()
    }
}

impl Serialize for Network {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Network {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Network, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Network::parse(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn net(s: &str) -> Network {
        Network::parse(s).unwrap()
    }

    #[test]
    fn parse_forms() {
        assert_eq!("192.168.1.0/24", net("192.168.1.0/24").to_string());
        assert_eq!("192.168.1.0/24", net("192.168.1.0 255.255.255.0").to_string());
        assert_eq!("192.168.1.1/32", net("192.168.1.1").to_string());
        assert_eq!("2001:db8::/64", net("2001:db8::/64").to_string());
        assert_eq!("2001:db8::1/128", net("2001:db8::1").to_string());
        // unaligned address canonicalizes in the CIDR form
        assert_eq!("192.168.1.0/24", net("192.168.1.77/24").to_string());

        assert!(Network::parse("192.168.1.0/33").is_err());
        assert!(Network::parse("192.168.1.0/").is_err());
        assert!(Network::parse("192.168.1.0 255.0.255.0").is_err());
        assert!(Network::parse("a b c").is_err());
        assert!(Network::parse("").is_err());
    }

    #[test]
    fn constructor_invariants() {
        let ip = Ip::parse("192.168.1.0").unwrap();
        assert_eq!(
            Err(Error::VersionMismatch),
            Network::new(ip, Ip::parse("ffff::").unwrap())
        );
        assert_eq!(
            Err(Error::InvalidNetmask),
            Network::new(ip, Ip::parse("255.0.255.0").unwrap())
        );
        assert_eq!(
            Err(Error::InvalidPrefixLength(33)),
            Network::with_prefix_len(ip, 33)
        );
        // non-contiguous in the low bits only
        assert_eq!(
            Err(Error::InvalidNetmask),
            Network::new(ip, Ip::parse("255.255.255.253").unwrap())
        );
    }

    #[test]
    fn netmask_prefix_round_trip() {
        for p in 0..=32u8 {
            let mask = prefix_to_netmask(p, Version::V4).unwrap();
            assert_eq!(p, netmask_to_prefix(mask));
        }
        for p in 0..=128u8 {
            let mask = prefix_to_netmask(p, Version::V6).unwrap();
            assert_eq!(p, netmask_to_prefix(mask));
        }
        assert_eq!(
            "255.255.255.0",
            prefix_to_netmask(24, Version::V4).unwrap().to_string()
        );
        assert_eq!(
            Err(Error::InvalidPrefixLength(129)),
            prefix_to_netmask(129, Version::V6)
        );
    }

    #[test]
    fn derived_addresses() {
        let n = net("192.168.1.77/24");
        assert_eq!("192.168.1.0", n.network().to_string());
        assert_eq!("192.168.1.255", n.broadcast().to_string());
        assert_eq!("0.0.0.255", n.wildcard().to_string());
        assert_eq!("255.255.255.0", n.netmask().to_string());
        assert_eq!("192.168.1.77", n.ip().to_string());
        assert_eq!(24, n.prefix_len());
        assert_eq!(256, n.block_size());
        assert_eq!(n.network(), n.first_ip());
        assert_eq!(n.broadcast(), n.last_ip());

        let n6 = net("2001:db8::/64");
        assert_eq!("2001:db8::", n6.network().to_string());
        assert_eq!(
            "2001:db8::ffff:ffff:ffff:ffff",
            n6.broadcast().to_string()
        );
        assert_eq!(1u128 << 64, n6.block_size());
        // the one saturating case: the whole IPv6 space
        assert_eq!(u128::MAX, net("::/0").block_size());
    }

    #[test]
    fn usable_hosts() {
        let hosts = net("192.168.1.0/24").hosts();
        assert_eq!("192.168.1.1", hosts.first_ip().to_string());
        assert_eq!("192.168.1.254", hosts.last_ip().to_string());
        assert_eq!(254, hosts.count());

        let p2p = net("192.168.1.0/31").hosts();
        assert_eq!("192.168.1.0", p2p.first_ip().to_string());
        assert_eq!("192.168.1.1", p2p.last_ip().to_string());
        assert_eq!(2, p2p.count());

        let single = net("192.168.1.1/32").hosts();
        assert_eq!(1, single.count());

        // no broadcast convention in IPv6
        let v6 = net("2001:db8::/126").hosts();
        assert_eq!("2001:db8::", v6.first_ip().to_string());
        assert_eq!("2001:db8::3", v6.last_ip().to_string());
    }

    #[test]
    fn exclude_splits_minimally() {
        let result = net("192.168.1.0/24").exclude(&net("192.168.1.64/26")).unwrap();
        let strings: Vec<String> = result.iter().map(|n| n.to_string()).collect();
        assert_eq!(vec!["192.168.1.0/26", "192.168.1.128/25"], strings);

        // excluded /32 splits all the way down
        let result = net("192.168.1.0/30").exclude(&net("192.168.1.2/32")).unwrap();
        let strings: Vec<String> = result.iter().map(|n| n.to_string()).collect();
        assert_eq!(vec!["192.168.1.0/31", "192.168.1.3/32"], strings);

        // excluding the block itself leaves nothing
        assert!(net("192.168.1.0/24").exclude(&net("192.168.1.0/24")).unwrap().is_empty());

        assert_eq!(
            Err(Error::OutOfRange),
            net("192.168.1.0/24").exclude(&net("10.0.0.0/8"))
        );
        assert_eq!(
            Err(Error::VersionMismatch),
            net("192.168.1.0/24").exclude(&net("2001:db8::/64"))
        );
    }

    #[test]
    fn exclude_blocks_are_disjoint_and_complementary() {
        let outer = net("10.0.0.0/20");
        let inner = net("10.0.5.64/28");
        let rest = outer.exclude(&inner).unwrap();

        let total: u128 = rest.iter().map(|n| n.block_size()).sum();
        assert_eq!(outer.block_size() - inner.block_size(), total);

        for (i, a) in rest.iter().enumerate() {
            assert!(!a.contains(&inner.first_ip()));
            assert!(!a.contains(&inner.last_ip()));
            for b in &rest[i + 1..] {
                assert!(a.last_ip() < b.first_ip() || b.last_ip() < a.first_ip());
            }
        }
    }

    #[test]
    fn subnets_tile_the_block() {
        let result = net("192.168.1.0/24").subnets(26).unwrap();
        let strings: Vec<String> = result.iter().map(|n| n.to_string()).collect();
        assert_eq!(
            vec![
                "192.168.1.0/26",
                "192.168.1.64/26",
                "192.168.1.128/26",
                "192.168.1.192/26"
            ],
            strings
        );

        assert_eq!(
            Err(Error::InvalidPrefixLength(24)),
            net("192.168.1.0/24").subnets(24)
        );
        assert_eq!(
            Err(Error::InvalidPrefixLength(33)),
            net("192.168.1.0/24").subnets(33)
        );

        let v6 = net("2001:db8::/64").subnets(66).unwrap();
        assert_eq!(4, v6.len());
        assert_eq!("2001:db8:0:0:4000::/66", v6[1].to_string());
    }

    #[test]
    fn iteration_is_ordered_and_restartable() {
        let n = net("192.0.2.8/30");
        let first: Vec<String> = n.iter().map(|ip| ip.to_string()).collect();
        assert_eq!(vec!["192.0.2.8", "192.0.2.9", "192.0.2.10", "192.0.2.11"], first);
        // a second pass starts from scratch
        let second: Vec<String> = (&n).into_iter().map(|ip| ip.to_string()).collect();
        assert_eq!(first, second);
        assert_eq!(4, n.count());
    }

    #[test]
    fn serde_cidr_string() {
        let n = net("192.168.1.0/24");
        assert_eq!("\"192.168.1.0/24\"", serde_json::to_string(&n).unwrap());
        assert_eq!(n, serde_json::from_str::<Network>("\"192.168.1.0/24\"").unwrap());
        assert!(serde_json::from_str::<Network>("\"192.168.1.0/99\"").is_err());
    }

    #[quickcheck]
    fn netmask_round_trip(p: u8) -> bool {
        let p = p % 33;
        netmask_to_prefix(prefix_to_netmask(p, Version::V4).unwrap()) == p
    }

    #[quickcheck]
    fn cidr_string_round_trip(bits: u32, p: u8) -> bool {
        let p = p % 33;
        let n = Network::with_prefix_len(
            Ip::parse_int(u128::from(bits), Version::V4).unwrap(),
            p,
        )
        .unwrap();
        n.network() == Network::parse(&n.to_string()).unwrap().network()
            && n.prefix_len() == Network::parse(&n.to_string()).unwrap().prefix_len()
    }

    #[quickcheck]
    fn network_contains_its_span(bits: u32, p: u8) -> bool {
        let p = p % 33;
        let n = Network::with_prefix_len(
            Ip::parse_int(u128::from(bits), Version::V4).unwrap(),
            p,
        )
        .unwrap();
        n.contains(&n.first_ip()) && n.contains(&n.last_ip()) && n.contains(&n.ip())
    }
}
