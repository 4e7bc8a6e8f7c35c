//! MAC algorithm and key-derivation-strategy registries
//!
//! Pure lookup tables mapping wire identifiers to primitive parameters.
//! Both short codes (`HS256`) and long names (`HMAC-SHA-256`) are
//! accepted on the wire; the short code is the canonical encoding.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// MAC primitive family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MacFamily {
    Hmac,
    Kmac,
}

impl MacFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hmac => "HMAC",
            Self::Kmac => "KMAC",
        }
    }
}

impl fmt::Display for MacFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Supported MAC algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MacAlgorithm {
    HmacMd5,
    HmacGost256,
    HmacGost512,
    HmacSha224,
    HmacSha256,
    HmacSha384,
    HmacSha512,
    Kmac128,
    Kmac256,
}

impl MacAlgorithm {
    pub fn family(&self) -> MacFamily {
        match self {
            Self::Kmac128 | Self::Kmac256 => MacFamily::Kmac,
            _ => MacFamily::Hmac,
        }
    }

    /// Underlying hash identifier
    pub fn hash(&self) -> &'static str {
        match self {
            Self::HmacMd5 => "MD5",
            Self::HmacGost256 => "md_gost12_256",
            Self::HmacGost512 => "md_gost12_512",
            Self::HmacSha224 => "SHA224",
            Self::HmacSha256 => "SHA256",
            Self::HmacSha384 => "SHA384",
            Self::HmacSha512 => "SHA512",
            Self::Kmac128 => "128",
            Self::Kmac256 => "256",
        }
    }

    /// Canonical short code used in tokens and key names
    pub fn code(&self) -> &'static str {
        match self {
            Self::HmacMd5 => "HMD5",
            Self::HmacGost256 => "HG256",
            Self::HmacGost512 => "HG512",
            Self::HmacSha224 => "HS224",
            Self::HmacSha256 => "HS256",
            Self::HmacSha384 => "HS384",
            Self::HmacSha512 => "HS512",
            Self::Kmac128 => "KMAC-128",
            Self::Kmac256 => "KMAC-256",
        }
    }
}

impl FromStr for MacAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HMAC-MD5" | "HMD5" => Ok(Self::HmacMd5),
            "HMAC-GOST3411-256" | "HG256" => Ok(Self::HmacGost256),
            "HMAC-GOST3411-512" | "HG512" => Ok(Self::HmacGost512),
            "HMAC-SHA-224" | "HS224" => Ok(Self::HmacSha224),
            "HMAC-SHA-256" | "HS256" => Ok(Self::HmacSha256),
            "HMAC-SHA-384" | "HS384" => Ok(Self::HmacSha384),
            "HMAC-SHA-512" | "HS512" => Ok(Self::HmacSha512),
            "KMAC-128" => Ok(Self::Kmac128),
            "KMAC-256" => Ok(Self::Kmac256),
            other => Err(Error::InvalidInput(format!("Unknown hash type: {other}"))),
        }
    }
}

impl fmt::Display for MacAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Key derivation strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyDerivationStrategy {
    Hkdf256,
    Hkdf512,
}

impl KeyDerivationStrategy {
    /// Derivation function identifier
    pub fn kdf(&self) -> &'static str {
        "HKDF"
    }

    /// KDF hash identifier
    pub fn kdf_hash(&self) -> &'static str {
        match self {
            Self::Hkdf256 => "SHA-256",
            Self::Hkdf512 => "SHA-512",
        }
    }

    /// Canonical wire code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Hkdf256 => "HKDF256",
            Self::Hkdf512 => "HKDF512",
        }
    }
}

impl FromStr for KeyDerivationStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HKDF256" => Ok(Self::Hkdf256),
            "HKDF512" => Ok(Self::Hkdf512),
            other => Err(Error::InvalidInput(format!("Unknown KDS: {other}"))),
        }
    }
}

impl fmt::Display for KeyDerivationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_and_long_forms_parse_to_same_algorithm() {
        assert_eq!(
            "HS256".parse::<MacAlgorithm>().unwrap(),
            "HMAC-SHA-256".parse::<MacAlgorithm>().unwrap()
        );
        assert_eq!(
            "HMD5".parse::<MacAlgorithm>().unwrap(),
            "HMAC-MD5".parse::<MacAlgorithm>().unwrap()
        );
    }

    #[test]
    fn families_and_hashes() {
        let hs256: MacAlgorithm = "HS256".parse().unwrap();
        assert_eq!(hs256.family(), MacFamily::Hmac);
        assert_eq!(hs256.hash(), "SHA256");

        let kmac: MacAlgorithm = "KMAC-256".parse().unwrap();
        assert_eq!(kmac.family(), MacFamily::Kmac);
        assert_eq!(kmac.hash(), "256");
    }

    #[test]
    fn unknown_identifiers_are_rejected() {
        assert!("HS999".parse::<MacAlgorithm>().is_err());
        assert!("PBKDF2".parse::<KeyDerivationStrategy>().is_err());
    }

    #[test]
    fn kds_parameters() {
        let kds: KeyDerivationStrategy = "HKDF256".parse().unwrap();
        assert_eq!(kds.kdf(), "HKDF");
        assert_eq!(kds.kdf_hash(), "SHA-256");
        assert_eq!(kds.to_string(), "HKDF256");

        let kds: KeyDerivationStrategy = "HKDF512".parse().unwrap();
        assert_eq!(kds.kdf_hash(), "SHA-512");
    }

    #[test]
    fn display_round_trips() {
        for code in ["HMD5", "HG256", "HG512", "HS224", "HS256", "HS384", "HS512", "KMAC-128", "KMAC-256"] {
            let algo: MacAlgorithm = code.parse().unwrap();
            assert_eq!(algo.to_string(), code);
        }
    }
}
