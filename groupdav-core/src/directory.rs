//! Principal directory.
//!
//! Maps calendar owners and calendar user addresses to principals and emails.
//! Real deployments back this with their user database; `StaticDirectory` is
//! the in-memory implementation.

use std::collections::HashMap;

use crate::address::{Address, CalAddress};

pub trait Directory: Send + Sync {
    /// Email of the principal owning a calendar.
    fn owner_email(&self, owner_principal: &str) -> Option<Address>;

    /// Principal URI a calendar user address belongs to.
    fn principal_for(&self, address: &CalAddress) -> Option<String>;

    fn email_for_principal(&self, principal: &str) -> Option<Address>;

    /// Email a message to `address` should go to.
    fn resolve_email(&self, address: &CalAddress) -> Option<Address> {
        match address {
            CalAddress::Mailto(email) => Some(email.clone()),
            CalAddress::Other(_) => self
                .principal_for(address)
                .and_then(|principal| self.email_for_principal(&principal)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    principals: HashMap<String, Vec<Address>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a principal. The first address is its primary email.
    pub fn with_principal(mut self, principal: &str, addresses: &[Address]) -> Self {
        self.principals
            .insert(principal.to_string(), addresses.to_vec());
        self
    }
}

impl Directory for StaticDirectory {
    fn owner_email(&self, owner_principal: &str) -> Option<Address> {
        self.email_for_principal(owner_principal)
    }

    fn principal_for(&self, address: &CalAddress) -> Option<String> {
        match address {
            CalAddress::Mailto(email) => self
                .principals
                .iter()
                .find(|(_, addresses)| addresses.contains(email))
                .map(|(principal, _)| principal.clone()),
            CalAddress::Other(uri) => {
                let uri = uri.trim_end_matches('/');
                self.principals
                    .keys()
                    .find(|p| p.trim_end_matches('/') == uri)
                    .cloned()
            }
        }
    }

    fn email_for_principal(&self, principal: &str) -> Option<Address> {
        self.principals
            .get(principal)
            .and_then(|addresses| addresses.first().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> StaticDirectory {
        StaticDirectory::new().with_principal(
            "principals/users/alice",
            &[
                Address::parse("alice@example.com").unwrap(),
                Address::parse("a.smith@example.org").unwrap(),
            ],
        )
    }

    #[test]
    fn test_alias_address_resolves_to_principal() {
        let dir = directory();
        let alias = CalAddress::parse("mailto:A.Smith@example.org");
        assert_eq!(
            dir.principal_for(&alias).as_deref(),
            Some("principals/users/alice")
        );
    }

    #[test]
    fn test_principal_uri_resolves_to_primary_email() {
        let dir = directory();
        let uri = CalAddress::parse("principals/users/alice/");
        assert_eq!(
            dir.resolve_email(&uri).map(|a| a.to_string()),
            Some("alice@example.com".to_string())
        );
        assert!(dir.resolve_email(&CalAddress::parse("urn:uuid:42")).is_none());
    }

    #[test]
    fn test_owner_email() {
        let dir = directory();
        assert_eq!(
            dir.owner_email("principals/users/alice").unwrap().as_str(),
            "alice@example.com"
        );
        assert!(dir.owner_email("principals/users/nobody").is_none());
    }
}
