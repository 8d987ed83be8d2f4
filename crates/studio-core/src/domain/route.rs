//! Route groups and the fixed-window policy attached to each.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Policy bucket an inbound path is classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteGroup {
    Auth,
    ApiWrite,
    ApiRead,
    Public,
}

impl RouteGroup {
    pub const ALL: [RouteGroup; 4] = [
        RouteGroup::Auth,
        RouteGroup::ApiWrite,
        RouteGroup::ApiRead,
        RouteGroup::Public,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteGroup::Auth => "auth",
            RouteGroup::ApiWrite => "api-write",
            RouteGroup::ApiRead => "api-read",
            RouteGroup::Public => "public",
        }
    }

    /// Prefix used for this group's environment variables, e.g. `RATE_LIMIT_API_WRITE`.
    pub fn env_prefix(&self) -> String {
        format!(
            "RATE_LIMIT_{}",
            self.as_str().replace('-', "_").to_uppercase()
        )
    }
}

impl fmt::Display for RouteGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a request can change server state. Derived from the HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Read,
    Write,
}

impl RequestKind {
    /// GET, HEAD and OPTIONS are reads; every other method is a write.
    pub fn from_method(method: &str) -> Self {
        if ["GET", "HEAD", "OPTIONS"]
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method))
        {
            RequestKind::Read
        } else {
            RequestKind::Write
        }
    }
}

/// Fixed-window policy: at most `max_requests` per `window_ms` per client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePolicy {
    window_ms: u64,
    max_requests: u32,
}

impl RoutePolicy {
    pub fn new(window_ms: u64, max_requests: u32) -> Result<Self, DomainError> {
        if window_ms == 0 {
            return Err(DomainError::Validation(
                "window_ms must be positive".to_string(),
            ));
        }
        if max_requests == 0 {
            return Err(DomainError::Validation(
                "max_requests must be positive".to_string(),
            ));
        }
        Ok(Self {
            window_ms,
            max_requests,
        })
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }
}

/// Total mapping from route group to policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    auth: RoutePolicy,
    api_write: RoutePolicy,
    api_read: RoutePolicy,
    public: RoutePolicy,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self {
            auth: RoutePolicy {
                window_ms: 60_000,
                max_requests: 5,
            },
            api_write: RoutePolicy {
                window_ms: 60_000,
                max_requests: 30,
            },
            api_read: RoutePolicy {
                window_ms: 60_000,
                max_requests: 120,
            },
            public: RoutePolicy {
                window_ms: 60_000,
                max_requests: 60,
            },
        }
    }
}

impl PolicyTable {
    pub fn get(&self, group: RouteGroup) -> RoutePolicy {
        match group {
            RouteGroup::Auth => self.auth,
            RouteGroup::ApiWrite => self.api_write,
            RouteGroup::ApiRead => self.api_read,
            RouteGroup::Public => self.public,
        }
    }

    pub fn set(&mut self, group: RouteGroup, policy: RoutePolicy) {
        match group {
            RouteGroup::Auth => self.auth = policy,
            RouteGroup::ApiWrite => self.api_write = policy,
            RouteGroup::ApiRead => self.api_read = policy,
            RouteGroup::Public => self.public = policy,
        }
    }

    pub fn with(mut self, group: RouteGroup, policy: RoutePolicy) -> Self {
        self.set(group, policy);
        self
    }
}
