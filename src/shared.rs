use std::fmt;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

pub type ASN = u32;
pub type Prefix = IpNetwork;

/// RPKI validity of a (prefix, origin) pair.
///
/// The discriminants are a total order that other components rely on
/// (lower is better). Never renumber them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum ROAValidity {
    Valid = 0,
    Unknown = 1,
    InvalidByLength = 2,
    InvalidByOrigin = 3,
    InvalidByAll = 4,
}

impl ROAValidity {
    pub const ALL: [ROAValidity; 5] = [
        ROAValidity::Valid,
        ROAValidity::Unknown,
        ROAValidity::InvalidByLength,
        ROAValidity::InvalidByOrigin,
        ROAValidity::InvalidByAll,
    ];

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn is_invalid(self) -> bool {
        matches!(
            self,
            ROAValidity::InvalidByLength | ROAValidity::InvalidByOrigin | ROAValidity::InvalidByAll
        )
    }
}

impl TryFrom<u8> for ROAValidity {
    type Error = AnalysisError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        ROAValidity::ALL
            .get(value as usize)
            .copied()
            .ok_or(AnalysisError::UndefinedValidity(value))
    }
}

impl From<ROAValidity> for u8 {
    fn from(validity: ROAValidity) -> u8 {
        validity.ordinal()
    }
}

impl fmt::Display for ROAValidity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ROAValidity::Valid => "VALID",
            ROAValidity::Unknown => "UNKNOWN",
            ROAValidity::InvalidByLength => "INVALID_BY_LENGTH",
            ROAValidity::InvalidByOrigin => "INVALID_BY_ORIGIN",
            ROAValidity::InvalidByAll => "INVALID_BY_ALL",
        };
        write!(f, "{}", s)
    }
}

/// Route origin validation policy a vantage AS may adopt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Policy {
    /// Drops announcements with an unauthorized origin.
    Asn,
    /// Drops announcements longer than the authorized max length.
    Length,
    /// Drops every invalid announcement.
    Rov,
}

const ASN_BLOCK_SET: &[ROAValidity] = &[ROAValidity::InvalidByOrigin, ROAValidity::InvalidByAll];
const LENGTH_BLOCK_SET: &[ROAValidity] = &[ROAValidity::InvalidByLength, ROAValidity::InvalidByAll];
const ROV_BLOCK_SET: &[ROAValidity] = &[
    ROAValidity::InvalidByLength,
    ROAValidity::InvalidByOrigin,
    ROAValidity::InvalidByAll,
];

impl Policy {
    pub const ALL: [Policy; 3] = [Policy::Asn, Policy::Length, Policy::Rov];

    /// Validity states this policy refuses to install.
    pub fn block_set(self) -> &'static [ROAValidity] {
        match self {
            Policy::Asn => ASN_BLOCK_SET,
            Policy::Length => LENGTH_BLOCK_SET,
            Policy::Rov => ROV_BLOCK_SET,
        }
    }

    pub fn blocks(self, validity: ROAValidity) -> bool {
        self.block_set().contains(&validity)
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Policy::Asn => "ASN",
            Policy::Length => "LENGTH",
            Policy::Rov => "ROV",
        };
        write!(f, "{}", s)
    }
}

/// A (prefix, origin) pair, the unit that validity and hijack relations key on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrefixOrigin {
    pub prefix: Prefix,
    pub origin: ASN,
}

impl PrefixOrigin {
    pub fn new(prefix: Prefix, origin: ASN) -> Self {
        PrefixOrigin {
            prefix: normalize_prefix(prefix),
            origin,
        }
    }
}

impl fmt::Display for PrefixOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} AS{}", self.prefix, self.origin)
    }
}

/// Clears host bits so `10.1.1.1/8` and `10.0.0.0/8` compare equal.
pub fn normalize_prefix(prefix: Prefix) -> Prefix {
    truncate_prefix(prefix, prefix.prefix())
}

/// Returns the covering prefix of length `len` (or `prefix` itself when it is
/// already shorter).
pub fn truncate_prefix(prefix: Prefix, len: u8) -> Prefix {
    let len = len.min(prefix.prefix());
    match prefix {
        IpNetwork::V4(net) => {
            let bits = u32::from(net.ip());
            let mask = if len == 0 { 0 } else { u32::MAX << (32 - len as u32) };
            // len <= 32 so construction cannot fail
            match ipnetwork::Ipv4Network::new((bits & mask).into(), len) {
                Ok(n) => IpNetwork::V4(n),
                Err(_) => prefix,
            }
        }
        IpNetwork::V6(net) => {
            let bits = u128::from(net.ip());
            let mask = if len == 0 { 0 } else { u128::MAX << (128 - len as u32) };
            match ipnetwork::Ipv6Network::new((bits & mask).into(), len) {
                Ok(n) => IpNetwork::V6(n),
                Err(_) => prefix,
            }
        }
    }
}

/// True when `inner` equals `outer` or is a more specific prefix inside it.
pub fn prefix_contains(outer: &Prefix, inner: &Prefix) -> bool {
    match (outer, inner) {
        (IpNetwork::V4(o), IpNetwork::V4(i)) => o.prefix() <= i.prefix() && o.contains(i.network()),
        (IpNetwork::V6(o), IpNetwork::V6(i)) => o.prefix() <= i.prefix() && o.contains(i.network()),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommonASNs;

impl CommonASNs {
    pub const ATTACKER: u32 = 666;
    pub const VICTIM: u32 = 777;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_validity_ordinals_are_fixed() {
        let ordinals: Vec<u8> = ROAValidity::ALL.iter().map(|v| v.ordinal()).collect();
        assert_eq!(ordinals, vec![0, 1, 2, 3, 4]);
        assert!(ROAValidity::Valid < ROAValidity::InvalidByAll);
    }

    #[test]
    fn test_foreign_ordinal_rejected() {
        assert!(matches!(
            ROAValidity::try_from(5),
            Err(AnalysisError::UndefinedValidity(5))
        ));
        assert_eq!(ROAValidity::try_from(3).unwrap(), ROAValidity::InvalidByOrigin);
    }

    #[test]
    fn test_policy_block_sets() {
        assert!(Policy::Asn.blocks(ROAValidity::InvalidByOrigin));
        assert!(!Policy::Asn.blocks(ROAValidity::InvalidByLength));
        assert!(Policy::Length.blocks(ROAValidity::InvalidByLength));
        assert!(!Policy::Length.blocks(ROAValidity::InvalidByOrigin));
        for policy in Policy::ALL {
            assert!(policy.blocks(ROAValidity::InvalidByAll));
            assert!(!policy.blocks(ROAValidity::Valid));
            assert!(!policy.blocks(ROAValidity::Unknown));
        }
    }

    #[test]
    fn test_policy_serde_names() {
        assert_eq!(serde_json::to_string(&Policy::Length).unwrap(), "\"LENGTH\"");
        let p: Policy = serde_json::from_str("\"ROV\"").unwrap();
        assert_eq!(p, Policy::Rov);
    }

    #[test]
    fn test_truncate_and_contains() {
        let p = IpNetwork::from_str("10.1.2.0/24").unwrap();
        assert_eq!(truncate_prefix(p, 8), IpNetwork::from_str("10.0.0.0/8").unwrap());
        assert_eq!(truncate_prefix(p, 30), p);
        assert_eq!(
            normalize_prefix(IpNetwork::from_str("10.1.1.1/16").unwrap()),
            IpNetwork::from_str("10.1.0.0/16").unwrap()
        );
        assert!(prefix_contains(&IpNetwork::from_str("10.0.0.0/8").unwrap(), &p));
        assert!(prefix_contains(&p, &p));
        assert!(!prefix_contains(&p, &IpNetwork::from_str("10.0.0.0/8").unwrap()));
    }

    #[test]
    fn test_prefix_origin_clears_host_bits() {
        let pair = PrefixOrigin::new(IpNetwork::from_str("8.8.8.1/24").unwrap(), 15169);
        assert_eq!(pair.prefix, IpNetwork::from_str("8.8.8.0/24").unwrap());
        assert_eq!(pair, PrefixOrigin::new(IpNetwork::from_str("8.8.8.0/24").unwrap(), 15169));
    }
}
