use std::sync::Arc;

use nocturne_api::{AuthContext, AuthHandler, AuthRequest, AuthResult};
use tracing::{Instrument, debug, info_span, trace, warn};

/// How a request's credentials resolved.
#[derive(Debug, Clone)]
pub enum Resolution {
    Authenticated(AuthContext),
    /// No handler recognised a credential.
    Anonymous,
    /// A handler found its credential and refused it.
    Rejected { handler: String, reason: String },
}

impl Resolution {
    #[must_use]
    pub fn context(&self) -> Option<&AuthContext> {
        match self {
            Resolution::Authenticated(ctx) => Some(ctx),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_context(self) -> Option<AuthContext> {
        match self {
            Resolution::Authenticated(ctx) => Some(ctx),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Resolution::Rejected { .. })
    }
}

/// Ordered list of credential handlers, fixed at construction.
///
/// Handlers run by ascending priority; equal priorities keep registration
/// order. The first `Success` or `Failure` ends the walk.
#[derive(Clone, Default)]
pub struct HandlerChain {
    handlers: Vec<Arc<dyn AuthHandler>>,
}

impl HandlerChain {
    #[must_use]
    pub fn new(mut handlers: Vec<Arc<dyn AuthHandler>>) -> Self {
        // Stable sort: registration order breaks ties.
        handlers.sort_by_key(|h| h.priority());
        Self { handlers }
    }

    /// `(name, priority)` of each handler, in run order.
    #[must_use]
    pub fn registrations(&self) -> Vec<(String, i32)> {
        self.handlers
            .iter()
            .map(|h| (h.name().to_string(), h.priority()))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Resolved identity, or `None` for anonymous and rejected requests alike.
    pub async fn resolve(&self, request: &mut AuthRequest) -> Option<AuthContext> {
        self.resolve_outcome(request).await.into_context()
    }

    pub async fn resolve_outcome(&self, request: &mut AuthRequest) -> Resolution {
        for handler in &self.handlers {
            let span = info_span!(
                "auth_handler",
                handler = handler.name(),
                priority = handler.priority()
            );
            let result = handler.authenticate(request).instrument(span).await;

            match result {
                AuthResult::Success(ctx) => {
                    debug!(
                        handler = handler.name(),
                        auth_type = %ctx.auth_type(),
                        "request authenticated"
                    );
                    return Resolution::Authenticated(ctx);
                }
                AuthResult::Failure(reason) => {
                    warn!(handler = handler.name(), %reason, "credential rejected");
                    return Resolution::Rejected {
                        handler: handler.name().to_string(),
                        reason,
                    };
                }
                AuthResult::Skip => {
                    trace!(handler = handler.name(), "handler skipped");
                }
            }
        }

        Resolution::Anonymous
    }
}

impl std::fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.registrations()).finish()
    }
}
