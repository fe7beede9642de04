use serde::{Deserialize, Serialize};
use std::fmt;

/// A hex value failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid hex value '{value}': {reason}")]
pub struct InvalidHex {
    pub value: String,
    pub reason: &'static str,
}

fn check_hex(value: &str) -> Result<&str, InvalidHex> {
    let digits = value.strip_prefix("0x").ok_or_else(|| InvalidHex {
        value: value.to_string(),
        reason: "missing 0x prefix",
    })?;
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(InvalidHex {
            value: value.to_string(),
            reason: "contains non-hex characters",
        });
    }
    if digits.len() % 2 != 0 {
        return Err(InvalidHex {
            value: value.to_string(),
            reason: "odd number of hex digits",
        });
    }
    Ok(digits)
}

/// A `0x`-prefixed 20-byte account address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Address {
    type Error = InvalidHex;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let digits = check_hex(&value)?;
        if digits.len() != 40 {
            return Err(InvalidHex {
                value,
                reason: "address must be 20 bytes",
            });
        }
        Ok(Self(value.to_lowercase()))
    }
}

impl std::str::FromStr for Address {
    type Err = InvalidHex;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_string())
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Arbitrary `0x`-prefixed hex data with an even number of digits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexData(String);

impl HexData {
    /// Hex digits without the `0x` prefix.
    pub fn digits(&self) -> &str {
        &self.0[2..]
    }
}

impl TryFrom<String> for HexData {
    type Error = InvalidHex;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        check_hex(&value)?;
        Ok(Self(value.to_lowercase()))
    }
}

impl From<HexData> for String {
    fn from(data: HexData) -> Self {
        data.0
    }
}

/// The account a deployment is sent from.
///
/// In configuration files an integer selects a node-managed account by index
/// (`from = 0` is the node's first account) and a string names an explicit
/// address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identity {
    Account(usize),
    Address(Address),
}

impl Default for Identity {
    fn default() -> Self {
        Identity::Account(0)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Account(index) => write!(f, "account #{}", index),
            Identity::Address(address) => write!(f, "{}", address),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "0x90F8bf6A479f320ead074411a4B0e7944Ea8c9C1";

    #[test]
    fn address_is_normalized_to_lowercase() {
        let addr: Address = ADDR.parse().unwrap();
        assert_eq!(addr.as_str(), ADDR.to_lowercase());
    }

    #[test]
    fn address_rejects_wrong_length() {
        let err = "0x1234".parse::<Address>().unwrap_err();
        assert_eq!(err.reason, "address must be 20 bytes");
    }

    #[test]
    fn address_rejects_missing_prefix() {
        let err = ADDR[2..].parse::<Address>().unwrap_err();
        assert_eq!(err.reason, "missing 0x prefix");
    }

    #[test]
    fn hex_data_rejects_odd_digits() {
        let err = HexData::try_from("0xabc".to_string()).unwrap_err();
        assert_eq!(err.reason, "odd number of hex digits");
    }

    #[test]
    fn identity_deserializes_from_index_or_address() {
        let index: Identity = serde_json::from_str("2").unwrap();
        assert_eq!(index, Identity::Account(2));

        let addr: Identity = serde_json::from_str(&format!("\"{}\"", ADDR)).unwrap();
        assert!(matches!(addr, Identity::Address(_)));
    }

    #[test]
    fn identity_rejects_malformed_address() {
        assert!(serde_json::from_str::<Identity>("\"0xnothex\"").is_err());
    }

    #[test]
    fn identity_display() {
        assert_eq!(Identity::default().to_string(), "account #0");
    }
}
