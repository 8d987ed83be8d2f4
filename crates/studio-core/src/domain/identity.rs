//! Best-effort client identity used to bucket requests.
//!
//! Not authenticated and not a security boundary: clients behind the same
//! proxy share a counter, and unidentified clients share the sentinel.

use std::fmt;

use super::RouteGroup;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Shared identity for requests carrying no address information.
    pub const UNKNOWN: &'static str = "unknown";

    /// Longest accepted address. Covers any IPv6 literal with a zone id.
    pub const MAX_LEN: usize = 64;

    /// Derive an identity from request metadata.
    ///
    /// Takes the first non-empty entry of the `X-Forwarded-For` chain, then
    /// `X-Real-IP`, then the socket peer address, then [`Self::UNKNOWN`].
    /// Values longer than [`Self::MAX_LEN`] bytes are skipped like empty ones.
    pub fn from_headers(
        forwarded_for: Option<&str>,
        real_ip: Option<&str>,
        peer_addr: Option<&str>,
    ) -> Self {
        let first_forwarded = forwarded_for
            .and_then(|chain| chain.split(',').next())
            .and_then(usable);

        let candidate = first_forwarded
            .or_else(|| real_ip.and_then(usable))
            .or_else(|| peer_addr.and_then(usable));

        match candidate {
            Some(addr) => Self(addr.to_string()),
            None => Self::unknown(),
        }
    }

    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn usable(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty() && value.len() <= ClientIdentity::MAX_LEN).then_some(value)
}

impl From<&str> for ClientIdentity {
    fn from(value: &str) -> Self {
        Self::from_headers(None, None, Some(value))
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Composite key of a fixed-window counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey {
    pub group: RouteGroup,
    pub client: ClientIdentity,
}

impl WindowKey {
    pub fn new(group: RouteGroup, client: ClientIdentity) -> Self {
        Self { group, client }
    }
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_forwarded_entry_wins() {
        let id = ClientIdentity::from_headers(
            Some(" 1.2.3.4 , 10.0.0.1, 10.0.0.2"),
            Some("9.9.9.9"),
            Some("127.0.0.1"),
        );
        assert_eq!(id.as_str(), "1.2.3.4");
    }

    #[test]
    fn test_falls_back_through_sources() {
        let id = ClientIdentity::from_headers(Some(" , 10.0.0.1"), Some("9.9.9.9"), None);
        assert_eq!(id.as_str(), "9.9.9.9");

        let id = ClientIdentity::from_headers(None, Some("  "), Some("127.0.0.1"));
        assert_eq!(id.as_str(), "127.0.0.1");
    }

    #[test]
    fn test_sentinel_when_nothing_usable() {
        let id = ClientIdentity::from_headers(Some(""), None, Some(" "));
        assert_eq!(id.as_str(), ClientIdentity::UNKNOWN);
        assert!(!ClientIdentity::from("").as_str().is_empty());
    }

    #[test]
    fn test_oversized_values_are_skipped() {
        let junk = "a".repeat(4096);
        let id = ClientIdentity::from_headers(Some(&junk), None, Some("127.0.0.1"));
        assert_eq!(id.as_str(), "127.0.0.1");

        let id = ClientIdentity::from_headers(Some(&junk), Some(&junk), None);
        assert_eq!(id.as_str(), ClientIdentity::UNKNOWN);

        let longest_v6 = "ffff:ffff:ffff:ffff:ffff:ffff:255.255.255.255%eth0";
        let id = ClientIdentity::from_headers(Some(longest_v6), None, None);
        assert_eq!(id.as_str(), longest_v6);
    }

    #[test]
    fn test_window_key_display() {
        let key = WindowKey::new(RouteGroup::ApiRead, ClientIdentity::from("1.2.3.4"));
        assert_eq!(key.to_string(), "api-read:1.2.3.4");
    }
}
