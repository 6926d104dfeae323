//! Protocol types.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::ValidationError;

/// Seconds since the Unix epoch, as reported by the ledger.
pub type UnixTime = u64;

/// Round identifier assigned by the contract (0 means "no round")
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundId(u64);

impl RoundId {
    pub const NONE: RoundId = RoundId(0);

    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    /// The contract never assigns id 0 to a real round.
    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for RoundId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ledger amount in wei
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_wei(wei: u128) -> Self {
        Self(wei)
    }

    pub const fn wei(&self) -> u128 {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Decimal strings keep full u128 precision for JSON consumers.
impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        self.0.to_string().serialize(s)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse::<u128>().map(Amount).map_err(serde::de::Error::custom)
    }
}

/// 20-byte participant / contract address
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address([u8; 20]);

impl Address {
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Create a random address (demo participants and tests)
    pub fn random() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 20];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }
}

impl FromStr for Address {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits)
            .map_err(|_| ValidationError::MalformedAddress(s.to_string()))?;
        let bytes: [u8; 20] = bytes
            .try_into()
            .map_err(|_| ValidationError::MalformedAddress(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

/// Always lowercase, so it can be used in storage keys.
impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        self.to_string().serialize(s)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Round as observed on the ledger. Read-only to this crate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    /// The question participants try to coordinate on
    pub theme: String,
    pub entry_fee: Amount,
    pub commit_deadline: UnixTime,
    pub reveal_deadline: UnixTime,
    pub total_pot: Amount,
    pub player_count: u64,
    pub settled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_parse_and_display() {
        let addr: Address = "0xAbCdEf0123456789abcdef0123456789ABCDEF01".parse().unwrap();
        assert_eq!(addr.to_string(), "0xabcdef0123456789abcdef0123456789abcdef01");

        let bare: Address = "abcdef0123456789abcdef0123456789abcdef01".parse().unwrap();
        assert_eq!(addr, bare);
    }

    #[test]
    fn test_address_rejects_wrong_length() {
        let result = "0x1234".parse::<Address>();
        assert!(matches!(result, Err(ValidationError::MalformedAddress(_))));
    }

    #[test]
    fn test_round_id_none() {
        assert!(RoundId::NONE.is_none());
        assert!(!RoundId::new(1).is_none());
    }

    #[test]
    fn test_amount_serializes_as_string() {
        let json = serde_json::to_string(&Amount::from_wei(u128::MAX)).unwrap();
        assert_eq!(json, format!("\"{}\"", u128::MAX));
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back.wei(), u128::MAX);
    }
}
