//! Object identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Error returned when a dotted-decimal OID cannot be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid OID {0:?}")]
pub struct InvalidOid(pub String);

/// An SNMP object identifier, e.g. `1.3.6.1.2.1.2.2.1.10.1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid(Vec<u32>);

impl Oid {
    /// Build an OID from its arcs. At least two arcs are required and the
    /// first one must be 0, 1 or 2; the second must be below 40 unless the
    /// first is 2.
    pub fn from_arcs(arcs: Vec<u32>) -> Option<Self> {
        if arcs.len() < 2 || arcs[0] > 2 || (arcs[0] < 2 && arcs[1] >= 40) {
            return None;
        }
        Some(Self(arcs))
    }

    /// BER content octets (without tag and length).
    pub(crate) fn encode_ber(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() + 4);
        let first = u64::from(self.0[0]) * 40 + u64::from(self.0[1]);
        push_base128(&mut out, first);
        for arc in &self.0[2..] {
            push_base128(&mut out, u64::from(*arc));
        }
        out
    }

    /// Decode BER content octets.
    pub(crate) fn decode_ber(content: &[u8]) -> Option<Self> {
        let mut subids = Vec::new();
        let mut acc: u64 = 0;
        let mut in_progress = false;

        for &b in content {
            acc = (acc << 7) | u64::from(b & 0x7f);
            if acc > u64::from(u32::MAX) + 80 {
                return None;
            }
            in_progress = b & 0x80 != 0;
            if !in_progress {
                subids.push(acc);
                acc = 0;
            }
        }

        if in_progress || subids.is_empty() {
            return None;
        }

        let first = subids[0];
        let (a, b) = match first {
            0..=39 => (0, first),
            40..=79 => (1, first - 40),
            _ => (2, first - 80),
        };

        let mut arcs = Vec::with_capacity(subids.len() + 1);
        arcs.push(a as u32);
        arcs.push(u32::try_from(b).ok()?);
        for s in &subids[1..] {
            arcs.push(u32::try_from(*s).ok()?);
        }
        Some(Self(arcs))
    }
}

fn push_base128(out: &mut Vec<u8>, mut value: u64) {
    let mut tmp = [0u8; 10];
    let mut i = tmp.len();
    loop {
        i -= 1;
        tmp[i] = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    let last = tmp.len() - 1;
    for (idx, b) in tmp.iter().enumerate().skip(i) {
        out.push(if idx == last { *b } else { *b | 0x80 });
    }
}

impl FromStr for Oid {
    type Err = InvalidOid;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let body = trimmed.strip_prefix('.').unwrap_or(trimmed);
        let arcs = body
            .split('.')
            .map(|part| part.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| InvalidOid(s.to_string()))?;

        Self::from_arcs(arcs).ok_or_else(|| InvalidOid(s.to_string()))
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for arc in &self.0 {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{}", arc)?;
            first = false;
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for Oid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let oid: Oid = "1.3.6.1.2.1.2.2.1.10.1".parse().unwrap();
        assert_eq!(
            Some(oid.clone()),
            Oid::from_arcs(vec![1, 3, 6, 1, 2, 1, 2, 2, 1, 10, 1])
        );
        assert_eq!(oid.to_string(), "1.3.6.1.2.1.2.2.1.10.1");

        // Leading dot as printed by net-snmp tools
        let dotted: Oid = ".1.3.6.1.2.1.1.3.0".parse().unwrap();
        assert_eq!(dotted.to_string(), "1.3.6.1.2.1.1.3.0");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Oid>().is_err());
        assert!("1".parse::<Oid>().is_err());
        assert!("1.3.six".parse::<Oid>().is_err());
        assert!("3.1.2".parse::<Oid>().is_err());
        assert!("1.40.1".parse::<Oid>().is_err());
    }

    #[test]
    fn test_ber_encoding() {
        // ifInOctets.1 as encoded by common agents
        let oid: Oid = "1.3.6.1.2.1.2.2.1.10.1".parse().unwrap();
        assert_eq!(
            oid.encode_ber(),
            vec![0x2b, 0x06, 0x01, 0x02, 0x01, 0x02, 0x02, 0x01, 0x0a, 0x01]
        );

        // Multi-byte arc: 1.3.6.1.4.1.2021 (UCD-SNMP enterprise)
        let oid: Oid = "1.3.6.1.4.1.2021".parse().unwrap();
        assert_eq!(
            oid.encode_ber(),
            vec![0x2b, 0x06, 0x01, 0x04, 0x01, 0x8f, 0x65]
        );
        assert_eq!(Oid::decode_ber(&oid.encode_ber()), Some(oid));
    }

    #[test]
    fn test_ber_decode_truncated() {
        // Continuation bit set on the final byte
        assert_eq!(Oid::decode_ber(&[0x2b, 0x86]), None);
        assert_eq!(Oid::decode_ber(&[]), None);
    }
}
