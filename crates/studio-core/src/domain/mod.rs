//! Domain types - route groups, policies, client identities and window entries.

mod identity;
mod route;
mod window;

pub use identity::{ClientIdentity, WindowKey};
pub use route::{PolicyTable, RequestKind, RouteGroup, RoutePolicy};
pub use window::RateWindowEntry;
