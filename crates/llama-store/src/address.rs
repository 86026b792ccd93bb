//! Content addresses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::StoreError;

/// Length of a content address in bytes.
pub const ADDRESS_LEN: usize = 32;

/// BLAKE3 digest of a payload.
///
/// Equal payloads always produce equal addresses. Displays (and serializes)
/// as 64 lowercase hex characters.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ContentAddress([u8; ADDRESS_LEN]);

impl ContentAddress {
    /// Hash a payload.
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Full hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 12 hex characters. For logs only, never a lookup key.
    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }

    /// Parse from a 64-character hex string.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        let mut bytes = [0u8; ADDRESS_LEN];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| StoreError::InvalidAddress(format!("{s:?}: {e}")))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentAddress({})", self.short())
    }
}

impl FromStr for ContentAddress {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ContentAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        assert_eq!(ContentAddress::of(b"hello"), ContentAddress::of(b"hello"));
        assert_ne!(ContentAddress::of(b"hello"), ContentAddress::of(b"hellp"));
    }

    #[test]
    fn test_hex_parse() {
        let addr = ContentAddress::of(b"payload");
        let hex = addr.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(hex.parse::<ContentAddress>().unwrap(), addr);
        assert!(ContentAddress::parse("not-hex").is_err());
        assert!(ContentAddress::parse("abcd").is_err());
    }

    #[test]
    fn test_serializes_as_hex_string() {
        let addr = ContentAddress::of(b"");
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", addr.to_hex()));
    }
}
