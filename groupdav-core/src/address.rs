//! Calendar user addresses.
//!
//! ORGANIZER and ATTENDEE values are usually `mailto:` URIs, but servers also
//! see principal URLs and `urn:uuid:` identifiers. `Address` is the validated
//! email form; `CalAddress` keeps whatever the iCalendar data carried.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DavError, DavResult};

/// A validated, lower-cased email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parse a bare email or a `mailto:` URI (scheme is case-insensitive).
    pub fn parse(value: &str) -> DavResult<Self> {
        let value = value.trim();
        let email = match value.get(..7) {
            Some(scheme) if scheme.eq_ignore_ascii_case("mailto:") => &value[7..],
            _ => value,
        };

        let (local, domain) = email
            .split_once('@')
            .ok_or_else(|| DavError::Parse(format!("Not an email address: '{}'", value)))?;

        if local.is_empty() || domain.is_empty() || domain.contains('@') || email.contains(' ') {
            return Err(DavError::Parse(format!(
                "Not an email address: '{}'",
                value
            )));
        }

        Ok(Address(email.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_mailto(&self) -> String {
        format!("mailto:{}", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Address {
    type Error = DavError;

    fn try_from(value: String) -> DavResult<Self> {
        Address::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

/// A calendar user address as found in ORGANIZER/ATTENDEE values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalAddress {
    Mailto(Address),
    /// Principal URL, `urn:uuid:` or anything else the directory may resolve.
    Other(String),
}

impl CalAddress {
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        let is_mailto = trimmed
            .get(..7)
            .is_some_and(|s| s.eq_ignore_ascii_case("mailto:"));

        if is_mailto {
            if let Ok(address) = Address::parse(trimmed) {
                return CalAddress::Mailto(address);
            }
        }
        CalAddress::Other(trimmed.to_string())
    }

    pub fn email(&self) -> Option<&Address> {
        match self {
            CalAddress::Mailto(address) => Some(address),
            CalAddress::Other(_) => None,
        }
    }

    /// The iCalendar property value.
    pub fn to_ics_value(&self) -> String {
        match self {
            CalAddress::Mailto(address) => address.to_mailto(),
            CalAddress::Other(uri) => uri.clone(),
        }
    }

    /// Whether this address denotes the given email.
    pub fn is(&self, address: &Address) -> bool {
        self.email() == Some(address)
    }
}

impl fmt::Display for CalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalAddress::Mailto(address) => write!(f, "{}", address),
            CalAddress::Other(uri) => write!(f, "{}", uri),
        }
    }
}
