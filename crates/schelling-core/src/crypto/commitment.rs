//! Commitment digest for the commit-reveal scheme.

use super::Salt;
use crate::protocol::ValidationError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;

/// keccak256 of arbitrary bytes
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Commitment = keccak256(answer || salt)
///
/// Identical to the contract's `keccak256(abi.encodePacked(answer, salt))`:
/// the answer's UTF-8 bytes followed by the 32 salt bytes, no length prefix.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommitDigest([u8; 32]);

impl CommitDigest {
    /// Derive the digest for an answer exactly as typed (no normalisation)
    pub fn compute(answer: &str, salt: &Salt) -> Self {
        let mut hasher = Keccak256::new();
        hasher.update(answer.as_bytes());
        hasher.update(salt.as_bytes());
        Self(hasher.finalize().into())
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the underlying bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Verify that the given answer and salt produce this digest
    pub fn verify(&self, answer: &str, salt: &Salt) -> bool {
        *self == Self::compute(answer, salt)
    }
}

/// Verify untyped form input against an expected digest.
///
/// A salt that does not parse is a validation error, not a mismatch.
pub fn verify_encoded(
    answer: &str,
    salt_hex: &str,
    expected: &CommitDigest,
) -> Result<bool, ValidationError> {
    let salt = Salt::from_hex(salt_hex)?;
    Ok(expected.verify(answer, &salt))
}

impl fmt::Debug for CommitDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitDigest({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for CommitDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for CommitDigest {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        self.to_string().serialize(s)
    }
}

impl<'de> Deserialize<'de> for CommitDigest {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        let digits = s.strip_prefix("0x").unwrap_or(&s);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(digits, &mut bytes).map_err(serde::de::Error::custom)?;
        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commitment_verification() {
        let salt = Salt::random();
        let digest = CommitDigest::compute("blue", &salt);

        assert!(digest.verify("blue", &salt));
    }

    #[test]
    fn test_matches_packed_keccak_vector() {
        // keccak256(abi.encodePacked("blue", bytes32(0x1111...11)))
        let salt = Salt::from_bytes([0x11; 32]);
        let digest = CommitDigest::compute("blue", &salt);

        assert_eq!(
            digest.to_string(),
            "0xe32c8bf1421e7744138c438e0e2917309b046aa78029d35c2e992494e0603ed0"
        );
    }

    #[test]
    fn test_empty_answer_hashes_salt_only() {
        let salt = Salt::from_bytes([0u8; 32]);
        let digest = CommitDigest::compute("", &salt);

        assert_eq!(
            hex::encode(digest.as_bytes()),
            "290decd9548b62a8d60345a988386fc84ba6bc95484008f6362f93160ef3e563"
        );
    }

    #[test]
    fn test_distinct_inputs_distinct_digests() {
        let salt_a = Salt::from_bytes([1u8; 32]);
        let salt_b = Salt::from_bytes([2u8; 32]);
        let fixtures = [
            ("blue", &salt_a),
            ("blue", &salt_b),
            ("Blue", &salt_a),
            (" blue", &salt_a),
            ("blue ", &salt_a),
            ("", &salt_a),
            ("7", &salt_a),
        ];

        let digests: Vec<CommitDigest> = fixtures
            .iter()
            .map(|(answer, salt)| CommitDigest::compute(answer, salt))
            .collect();
        for (i, a) in digests.iter().enumerate() {
            for b in &digests[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_wrong_answer_fails_verification() {
        let salt = Salt::random();
        let digest = CommitDigest::compute("blue", &salt);

        assert!(!digest.verify("red", &salt));
        assert!(!digest.verify("blue ", &salt));
    }

    #[test]
    fn test_wrong_salt_fails_verification() {
        let digest = CommitDigest::compute("blue", &Salt::random());

        assert!(!digest.verify("blue", &Salt::random()));
    }

    #[test]
    fn test_verify_encoded_reports_malformed_salt() {
        let salt = Salt::random();
        let digest = CommitDigest::compute("blue", &salt);

        assert_eq!(verify_encoded("blue", &salt.to_hex(), &digest), Ok(true));
        assert_eq!(verify_encoded("red", &salt.to_hex(), &digest), Ok(false));
        assert!(matches!(
            verify_encoded("blue", "0xnothex", &digest),
            Err(ValidationError::MalformedSalt(_))
        ));
    }
}
