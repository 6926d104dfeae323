//! Random salt for the commit-reveal scheme.

use crate::protocol::ValidationError;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 32-byte secret mixed into a commitment.
///
/// Must be kept until reveal: without it the committed answer can never be
/// proven and the entry fee is forfeit.
#[derive(Clone, PartialEq, Eq)]
pub struct Salt([u8; 32]);

impl Salt {
    /// Create a new random salt from the OS-seeded CSPRNG
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the underlying bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse `0x` + 64 hex characters. The prefix is optional.
    pub fn from_hex(s: &str) -> Result<Self, ValidationError> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.len() != 64 {
            return Err(ValidationError::MalformedSalt(s.to_string()));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|_| ValidationError::MalformedSalt(s.to_string()))?;
        Ok(Self(bytes))
    }

    /// Fixed-length `0x`-prefixed lowercase hex
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl FromStr for Salt {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Salt({})", hex::encode(&self.0[..8]))
    }
}

impl Serialize for Salt {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        self.to_hex().serialize(s)
    }
}

impl<'de> Deserialize<'de> for Salt {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_salts_differ() {
        assert_ne!(Salt::random(), Salt::random());
    }

    #[test]
    fn test_hex_is_fixed_length_with_prefix() {
        let hex = Salt::random().to_hex();
        assert!(hex.starts_with("0x"));
        assert_eq!(hex.len(), 66);
    }

    #[test]
    fn test_hex_roundtrip() {
        let salt = Salt::random();
        assert_eq!(Salt::from_hex(&salt.to_hex()).unwrap(), salt);
    }

    #[test]
    fn test_prefix_is_optional() {
        let hex = "11".repeat(32);
        assert_eq!(
            Salt::from_hex(&hex).unwrap(),
            Salt::from_hex(&format!("0x{}", hex)).unwrap()
        );
    }

    #[test]
    fn test_malformed_salt_is_rejected() {
        let bad_inputs = vec![
            String::new(),
            "0x".to_string(),
            "0x1234".to_string(),
            "zz".repeat(32),
            "11".repeat(33),
        ];
        for bad in &bad_inputs {
            assert!(
                matches!(Salt::from_hex(bad), Err(ValidationError::MalformedSalt(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_debug_does_not_print_whole_salt() {
        let salt = Salt::from_bytes([0xab; 32]);
        assert_eq!(format!("{:?}", salt), "Salt(abababababababab)");
    }
}
