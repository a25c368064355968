//! Domain types: coupon codes, claims, administrators.
//!
//! Identifiers are 16 random bytes, rendered as 32 hex characters on the
//! wire. They are opaque: nothing is derived from their contents.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::InvalidId;

/// A 16-byte opaque identifier for a coupon code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodeId(pub [u8; 16]);

/// A 16-byte opaque identifier for a claim record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClaimId(pub [u8; 16]);

macro_rules! impl_id {
    ($name:ident) => {
        impl $name {
            /// Generate a fresh random identifier.
            pub fn generate() -> Self {
                use rand::RngCore;
                let mut bytes = [0u8; 16];
                rand::rngs::OsRng.fill_bytes(&mut bytes);
                Self(bytes)
            }

            /// Create an identifier from a byte array.
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(bytes)
            }

            /// Return the underlying bytes.
            pub fn as_bytes(&self) -> &[u8; 16] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for byte in &self.0 {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }

        impl FromStr for $name {
            type Err = InvalidId;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = hex::decode(s).map_err(|_| InvalidId(s.to_string()))?;
                let array: [u8; 16] =
                    bytes.try_into().map_err(|_| InvalidId(s.to_string()))?;
                Ok(Self(array))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(|_| D::Error::custom("invalid id"))
            }
        }
    };
}

impl_id!(CodeId);
impl_id!(ClaimId);

/// Lifecycle state of a coupon code.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CodeStatus {
    /// In the pool, eligible for allocation.
    Available,
    /// Handed out to a requester (or parked by an admin).
    Claimed,
}

impl fmt::Display for CodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeStatus::Available => write!(f, "available"),
            CodeStatus::Claimed => write!(f, "claimed"),
        }
    }
}

/// A single-use discount code in the inventory.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Code {
    pub id: CodeId,
    /// Human-redeemable code string, unique across the inventory.
    pub value: String,
    pub status: CodeStatus,
    /// Requester address that claimed this code. Present iff `status` is
    /// `Claimed`; cleared when an admin reverts the code to `Available`.
    pub claimed_by: Option<String>,
    /// Store-assigned creation sequence. Allocation order is ascending
    /// `seq` (oldest first).
    pub seq: u64,
    pub created_at: DateTime<Utc>,
}

/// Durable record of one successful claim. Never mutated; deleted only
/// as a cascade of the referenced code's deletion.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Claim {
    pub id: ClaimId,
    /// Reference, not ownership: the code may be deleted later, leaving a
    /// dangling but still-displayable reference.
    pub code_id: CodeId,
    pub network_address: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Input for recording a claim; the store assigns the id.
#[derive(Clone, Debug)]
pub struct NewClaim {
    pub code_id: CodeId,
    pub network_address: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
}

/// An administrator account. Secrets are stored as salted argon2 hashes
/// and never compared in plaintext.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Administrator {
    pub username: String,
    pub credential_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn code_id_display_roundtrip() {
        let id = CodeId::generate();
        let s = id.to_string();
        assert_eq!(s.len(), 32);
        assert_eq!(s.parse::<CodeId>().unwrap(), id);
    }

    #[test]
    fn code_id_rejects_bad_hex() {
        assert!("not-hex".parse::<CodeId>().is_err());
        assert!("abcd".parse::<CodeId>().is_err());
        // 33 hex chars: wrong length even though valid hex prefix.
        assert!("0123456789abcdef0123456789abcdef0".parse::<CodeId>().is_err());
    }

    #[test]
    fn status_display() {
        assert_eq!(CodeStatus::Available.to_string(), "available");
        assert_eq!(CodeStatus::Claimed.to_string(), "claimed");
    }

    #[test]
    fn id_serde_as_hex_string() {
        let id = ClaimId::from_bytes([0xab; 16]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: ClaimId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    proptest! {
        #[test]
        fn any_id_bytes_roundtrip(bytes in proptest::array::uniform16(any::<u8>())) {
            let id = CodeId::from_bytes(bytes);
            prop_assert_eq!(id.to_string().parse::<CodeId>().unwrap(), id);
        }
    }
}
