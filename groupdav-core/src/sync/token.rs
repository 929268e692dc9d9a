//! Sync token wire format.

use crate::error::{DavError, DavResult};

/// Parse a client-supplied token: a bare integer or a URL ending in
/// `/sync/<n>` (trailing slash allowed). Empty means "no token".
pub fn parse_sync_token(value: &str) -> DavResult<Option<u64>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }

    let invalid = || DavError::InvalidSyncToken(value.to_string());

    let number = if value.bytes().all(|b| b.is_ascii_digit()) {
        value
    } else {
        let path = value.trim_end_matches('/');
        let (prefix, number) = path.rsplit_once('/').ok_or_else(invalid)?;
        if !value.contains("://") || !prefix.ends_with("/sync") {
            return Err(invalid());
        }
        number
    };

    number.parse::<u64>().map(Some).map_err(|_| invalid())
}

/// Render a token for clients.
pub fn format_sync_token(prefix: &str, token: u64) -> String {
    format!("{}{}", prefix, token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepted_forms() {
        assert_eq!(parse_sync_token("42").unwrap(), Some(42));
        assert_eq!(
            parse_sync_token("http://sabre.io/ns/sync/42").unwrap(),
            Some(42)
        );
        assert_eq!(
            parse_sync_token("https://dav.example.com/sync/7/").unwrap(),
            Some(7)
        );
        assert_eq!(parse_sync_token("").unwrap(), None);
        assert_eq!(parse_sync_token("  ").unwrap(), None);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in [
            "abc",
            "-3",
            "http://sabre.io/ns/sync/",
            "http://sabre.io/ns/other/4",
            "/sync/4",
            "http://sabre.io/ns/sync/4x",
        ] {
            assert!(
                matches!(parse_sync_token(bad), Err(DavError::InvalidSyncToken(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_format_round_trips() {
        let token = format_sync_token("http://sabre.io/ns/sync/", 17);
        assert_eq!(token, "http://sabre.io/ns/sync/17");
        assert_eq!(parse_sync_token(&token).unwrap(), Some(17));
    }
}
