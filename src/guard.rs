use std::sync::Arc;

use axum::extract::{Extension, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use tracing::debug;

use crate::models::Identity;
use crate::session::{ENTRY_ROUTE, is_auth_route};
use crate::state::ClientSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect(&'static str),
}

/// Signed-out visitors may only see the entry route and the auth routes.
pub fn guard(identity: Option<&Identity>, path: &str) -> GuardDecision {
    if identity.is_some() || path == ENTRY_ROUTE || is_auth_route(path) {
        GuardDecision::Allow
    } else {
        GuardDecision::Redirect(ENTRY_ROUTE)
    }
}

/// Sends signed-out requests for protected paths to the entry route. The
/// redirect carries no body. Must run inside the client session middleware.
pub async fn route_guard_middleware(
    Extension(client): Extension<Arc<ClientSession>>,
    request: Request,
    next: Next,
) -> Response {
    let identity = client.session.current_identity();

    match guard(identity.as_ref(), request.uri().path()) {
        GuardDecision::Allow => next.run(request).await,
        GuardDecision::Redirect(to) => {
            debug!(path = request.uri().path(), "not signed in, redirecting");
            Redirect::to(to).into_response()
        }
    }
}
