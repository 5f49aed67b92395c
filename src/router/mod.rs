//! Routing decisions and hot reload
//!
//! The [`Router`] holds the active rule list behind an `ArcSwap` and picks an
//! outbound for each connection described by a [`RouteContext`].
//!
//! # Architecture
//!
//! ```text
//! RouteContext -> Router::pick_route
//!                   |-- load snapshot (once per call)
//!                   |-- pass 1: rules in order, first match wins
//!                   |-- IPIfNonMatch miss: attach DNS, pass 2
//!                   +-- matched rule -> static tag or Balancer -> Route
//! ```
//!
//! Writers (`reload_rules`, `add_rule`, `remove_rule`) are serialized by a
//! mutex, build the new list off to the side and publish it with one pointer
//! swap. Readers never wait on them.

mod context;
mod engine;
mod route;

use tokio_util::sync::CancellationToken;

pub use context::{MatchContext, RouteContext};
pub use engine::Router;
pub use route::{Decision, Route};

/// Host of the router: supplies the process lifetime
///
/// Background work started at init (balancer probing) stops when the
/// returned token is cancelled.
pub trait Dispatcher: Send + Sync {
    /// Token cancelled when the process shuts down
    fn lifetime(&self) -> CancellationToken;
}

/// Minimal [`Dispatcher`] owning a cancellation token
#[derive(Debug, Clone, Default)]
pub struct ProcessLifetime {
    token: CancellationToken,
}

impl ProcessLifetime {
    /// Create a new, live lifetime
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal shutdown to everything holding the token
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Check whether shutdown was signalled
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Dispatcher for ProcessLifetime {
    fn lifetime(&self) -> CancellationToken {
        self.token.clone()
    }
}
