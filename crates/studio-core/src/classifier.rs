//! Route classifier - maps a request path to its route group.
//!
//! Rules are checked in order and the first match wins. Paths that match no
//! rule get no policy at all (default-allow).

use crate::domain::{RequestKind, RouteGroup};

/// A single classification rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    prefix: String,
    kind: Option<RequestKind>,
    group: RouteGroup,
}

impl RouteRule {
    pub fn new(prefix: impl Into<String>, group: RouteGroup) -> Self {
        Self {
            prefix: prefix.into().trim_end_matches('/').to_string(),
            kind: None,
            group,
        }
    }

    /// Restrict the rule to reads or writes.
    pub fn for_kind(mut self, kind: RequestKind) -> Self {
        self.kind = Some(kind);
        self
    }

    fn matches(&self, path: &str, kind: RequestKind) -> bool {
        if self.kind.is_some_and(|k| k != kind) {
            return false;
        }
        // An empty prefix is the root rule and matches every path.
        if self.prefix.is_empty() {
            return true;
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouteClassifier {
    rules: Vec<RouteRule>,
}

impl Default for RouteClassifier {
    fn default() -> Self {
        Self::new(vec![
            RouteRule::new("/auth", RouteGroup::Auth),
            RouteRule::new("/login", RouteGroup::Auth),
            RouteRule::new("/signup", RouteGroup::Auth),
            RouteRule::new("/api/auth", RouteGroup::Auth),
            RouteRule::new("/api/public", RouteGroup::Public),
            RouteRule::new("/portal", RouteGroup::Public),
            RouteRule::new("/api", RouteGroup::ApiWrite).for_kind(RequestKind::Write),
            RouteRule::new("/api", RouteGroup::ApiRead).for_kind(RequestKind::Read),
        ])
    }
}

impl RouteClassifier {
    pub fn new(rules: Vec<RouteRule>) -> Self {
        Self { rules }
    }

    pub fn classify(&self, path: &str, kind: RequestKind) -> Option<RouteGroup> {
        let path = normalize(path);
        self.rules
            .iter()
            .find(|rule| rule.matches(path, kind))
            .map(|rule| rule.group)
    }
}

/// Strip query and fragment; an empty path is the root.
fn normalize(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    match &path[..end] {
        "" => "/",
        p => p,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules() {
        let c = RouteClassifier::default();
        assert_eq!(c.classify("/login", RequestKind::Write), Some(RouteGroup::Auth));
        assert_eq!(c.classify("/auth/callback", RequestKind::Read), Some(RouteGroup::Auth));
        assert_eq!(c.classify("/api/auth/otp", RequestKind::Write), Some(RouteGroup::Auth));
        assert_eq!(c.classify("/portal/abc", RequestKind::Read), Some(RouteGroup::Public));
        assert_eq!(c.classify("/api/public/quote/9", RequestKind::Write), Some(RouteGroup::Public));
        assert_eq!(c.classify("/api/projects", RequestKind::Write), Some(RouteGroup::ApiWrite));
        assert_eq!(c.classify("/api/projects", RequestKind::Read), Some(RouteGroup::ApiRead));
    }

    #[test]
    fn test_unmatched_paths_get_no_policy() {
        let c = RouteClassifier::default();
        assert_eq!(c.classify("/", RequestKind::Read), None);
        assert_eq!(c.classify("/dashboard/clients", RequestKind::Write), None);
        assert_eq!(c.classify("/_edge/health", RequestKind::Read), None);
    }

    #[test]
    fn test_prefix_respects_segment_boundary() {
        let c = RouteClassifier::default();
        assert_eq!(c.classify("/apix", RequestKind::Read), None);
        assert_eq!(c.classify("/login-help", RequestKind::Read), None);
        assert_eq!(c.classify("/api", RequestKind::Read), Some(RouteGroup::ApiRead));
    }

    #[test]
    fn test_query_and_fragment_are_ignored() {
        let c = RouteClassifier::default();
        assert_eq!(c.classify("/login?next=/api", RequestKind::Read), Some(RouteGroup::Auth));
        assert_eq!(c.classify("/apix?x=/api", RequestKind::Read), None);
        assert_eq!(c.classify("?q", RequestKind::Read), None);
    }

    #[test]
    fn test_first_match_wins() {
        let c = RouteClassifier::new(vec![
            RouteRule::new("/api/", RouteGroup::Public),
            RouteRule::new("/api", RouteGroup::ApiRead),
        ]);
        assert_eq!(c.classify("/api/x", RequestKind::Read), Some(RouteGroup::Public));
    }
}
