//! IP address, CIDR network and address range arithmetic.
//!
//! Three layered value types, each depending only on the one below:
//!
//! * [`Ip`]: one IPv4 or IPv6 address. Parses dotted/colon notation plus
//!   hex, binary, integer and raw-byte forms, steps forward/backward, and
//!   converts losslessly between representations.
//! * [`Network`]: a CIDR block (address + netmask). Derives the network,
//!   broadcast, wildcard and host-range addresses, splits into subnets and
//!   excludes sub-blocks.
//! * [`Range`]: an arbitrary inclusive interval of addresses. Parses four
//!   notations, answers containment queries and decomposes into the minimal
//!   list of CIDR blocks.
//!
//! All types are immutable values: every operation returns a new instance,
//! so shared reads across threads need no coordination. The crate performs
//! no I/O.
//!
//! ```
//! use ipblock::{Network, Range};
//!
//! let net = Network::parse("192.168.1.0/24").unwrap();
//! assert_eq!("192.168.1.255", net.broadcast().to_string());
//!
//! let blocks = Range::parse("192.168.1.208-192.168.1.255").unwrap().networks();
//! let blocks: Vec<String> = blocks.iter().map(|n| n.to_string()).collect();
//! assert_eq!(vec!["192.168.1.208/28", "192.168.1.224/27"], blocks);
//! ```

mod error;
mod ip;
mod network;
mod range;

pub use error::{Error, Result};
pub use ip::{Ip, IpIter, Version};
pub use network::{netmask_to_prefix, prefix_to_netmask, Network};
pub use range::{Range, Selector};
