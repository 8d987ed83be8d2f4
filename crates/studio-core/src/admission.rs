//! Admission controller - classifies a request and consults the window store.

use std::sync::Arc;

use crate::classifier::RouteClassifier;
use crate::domain::{ClientIdentity, PolicyTable, RequestKind, RouteGroup, WindowKey};
use crate::ports::{Clock, RateLimitResult, RateLimiter};

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// No policy applies, or the store could not be consulted.
    Unmetered,
    /// A policy applied; `result` says whether the request was admitted.
    Metered {
        group: RouteGroup,
        result: RateLimitResult,
    },
}

/// Decides admit/deny for inbound requests.
///
/// The window store and clock are injected so tests and deployments can swap
/// them; the controller itself holds no counter state.
pub struct AdmissionController {
    limiter: Arc<dyn RateLimiter>,
    clock: Arc<dyn Clock>,
    classifier: RouteClassifier,
    policies: PolicyTable,
}

impl AdmissionController {
    pub fn new(
        limiter: Arc<dyn RateLimiter>,
        clock: Arc<dyn Clock>,
        classifier: RouteClassifier,
        policies: PolicyTable,
    ) -> Self {
        Self {
            limiter,
            clock,
            classifier,
            policies,
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn backend(&self) -> &'static str {
        self.limiter.backend()
    }

    /// Check a request. Never fails: store errors admit the request.
    pub async fn check(
        &self,
        path: &str,
        kind: RequestKind,
        client: &ClientIdentity,
    ) -> Admission {
        let Some(group) = self.classifier.classify(path, kind) else {
            return Admission::Unmetered;
        };

        let policy = self.policies.get(group);
        let key = WindowKey::new(group, client.clone());
        let now_ms = self.clock.now_ms();

        match self.limiter.check(&key, &policy, now_ms).await {
            Ok(result) => {
                if result.allowed {
                    tracing::debug!(
                        group = %group,
                        client = %client,
                        remaining = result.remaining,
                        "Request admitted"
                    );
                } else {
                    tracing::warn!(
                        group = %group,
                        client = %client,
                        reset_at_ms = result.reset_at_ms,
                        "Rate limit exceeded"
                    );
                }
                Admission::Metered { group, result }
            }
            Err(e) => {
                tracing::warn!(
                    group = %group,
                    backend = self.limiter.backend(),
                    error = %e,
                    "Rate limiter unavailable, failing open"
                );
                Admission::Unmetered
            }
        }
    }
}
