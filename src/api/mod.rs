// ============================================================================
// API: request dispatch over a declarative route tree
// ============================================================================
//
// An `ApiNode` tree maps path segments (literal, `[param]`, `[...rest]`) to
// per-method handlers, middleware and named context providers. The
// `Dispatcher` navigates the tree for each request, composes the middleware
// chain of the terminal node and runs it against a `Response` sink.
//
// Context fields are resolved lazily: a handler reading a field that is not
// computed yet fails with `ApiError::NotReady`, the composer resolves the
// field and invokes the handler again.
//
// ============================================================================

pub mod api_map;
pub mod compose;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod guard;
pub mod handler;
pub mod methods;
pub mod navigate;
pub mod request;
pub mod response;
pub mod structures;

pub use api_map::{ApiNode, handle_with_api_map};
pub use compose::{Composed, Middleware, compose};
pub use context::{Context, is_truthy};
pub use dispatcher::Dispatcher;
pub use error::{ApiError, ErrorResponse, Result};
pub use guard::{Check, require_context, role_context};
pub use handler::{Handler, Provider};
pub use methods::{Methods, not_found};
pub use navigate::{Navigation, Param, PathMap, escape_segment, navigate};
pub use request::{QueryValue, Request};
pub use response::{Body, Response, ResponseState};
pub use structures::hash_list;

use std::time::Duration;

/// Limits applied while resolving context fields
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiConfig {
    /// Handler invocations allowed per stage before giving up
    pub max_context_passes: usize,
    /// Upper bound for one provider computation
    pub provider_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            max_context_passes: 8,
            provider_timeout: Duration::from_secs(30),
        }
    }
}

impl ApiConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_context_passes(mut self, passes: usize) -> Self {
        self.max_context_passes = passes.max(1);
        self
    }

    pub fn provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }
}
