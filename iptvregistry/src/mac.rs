//! Hardware address parsing and normalization
//!
//! A MAC address is accepted as six groups of two hexadecimal digits separated
//! uniformly by `:` or by `-`, in any case. The canonical form, used as the
//! storage key, is uppercase and colon separated (`AA:BB:CC:DD:EE:FF`).

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

static MAC_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}$|^(?:[0-9A-Fa-f]{2}-){5}[0-9A-Fa-f]{2}$")
        .expect("MAC address pattern is valid")
});

/// A validated MAC address in canonical form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress(String);

impl MacAddress {
    /// Validates `input` and returns it in canonical form
    ///
    /// ```
    /// use iptvregistry::MacAddress;
    ///
    /// let mac = MacAddress::parse("aa-bb-cc-dd-ee-ff").unwrap();
    /// assert_eq!(mac.as_str(), "AA:BB:CC:DD:EE:FF");
    /// assert!(MacAddress::parse("AABBCCDDEEFF").is_err());
    /// ```
    pub fn parse(input: &str) -> Result<Self, RegistryError> {
        if !MAC_PATTERN.is_match(input) {
            return Err(RegistryError::InvalidIdentifier(input.to_string()));
        }
        Ok(Self(input.to_ascii_uppercase().replace('-', ":")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Normalizes an identifier used for a lookup or a delete
///
/// Well-formed addresses get their canonical form. Anything else is only
/// uppercased, so it can never match a stored key.
pub fn lookup_key(identifier: &str) -> String {
    match MacAddress::parse(identifier) {
        Ok(mac) => mac.0,
        Err(_) => identifier.to_uppercase(),
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MacAddress {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MacAddress {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.0
    }
}

impl AsRef<str> for MacAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
