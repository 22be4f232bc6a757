//! Development account addresses.
//!
//! An address is a 20-byte account identifier rendered as `0x` followed by
//! 40 lowercase hex digits. Addresses identify the simulated logged-in user;
//! they carry no cryptographic meaning in this tool.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of hex digits after the `0x` prefix.
const HEX_DIGITS: usize = 40;

/// Error returned when a string is not a well-formed address.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid address: expected 0x followed by {HEX_DIGITS} lowercase hex digits")]
pub struct AddressParseError;

/// A checked development account address (`0x` + 40 lowercase hex digits).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Generates a random address from 20 random bytes.
    #[must_use]
    pub fn random() -> Self {
        let raw: [u8; 20] = rand::random();
        let mut s = String::with_capacity(2 + HEX_DIGITS);
        s.push_str("0x");
        for b in raw {
            use std::fmt::Write;
            let _ = write!(s, "{b:02x}");
        }
        Self(s)
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix("0x").ok_or(AddressParseError)?;
        if hex.len() != HEX_DIGITS {
            return Err(AddressParseError);
        }
        if !hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(AddressParseError);
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for Address {
    type Error = AddressParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_address() {
        let s = "0x1111111111111111111111111111111111111111";
        let addr: Address = s.parse().unwrap();
        assert_eq!(addr.as_str(), s);
    }

    #[test]
    fn rejects_missing_prefix() {
        assert!("1111111111111111111111111111111111111111"
            .parse::<Address>()
            .is_err());
    }

    #[test]
    fn rejects_wrong_length() {
        assert!("0x1111".parse::<Address>().is_err());
        assert!("0x111111111111111111111111111111111111111111"
            .parse::<Address>()
            .is_err());
    }

    #[test]
    fn rejects_uppercase_hex() {
        assert!("0x1111111111111111111111111111111111111FFF"
            .parse::<Address>()
            .is_err());
    }

    #[test]
    fn random_addresses_are_well_formed_and_distinct() {
        let a = Address::random();
        let b = Address::random();
        assert!(a.as_str().parse::<Address>().is_ok());
        assert_ne!(a, b);
    }
}
