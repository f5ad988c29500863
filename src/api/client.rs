use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use uuid::Uuid;

use crate::session::SessionStore;
use crate::state::{AppState, ClientSession};

pub const SESSION_COOKIE: &str = "taskify_sid";
pub const REFRESH_COOKIE: &str = "taskify_refresh";

fn cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

/// Attaches the browser's [`ClientSession`] to the request. An unknown
/// browser gets a fresh one, restored from the cached refresh token; it is
/// only registered, and given a cookie, once it is signed in or mid sign-in.
/// A registered session that no longer holds either is dropped. The refresh
/// cookie follows every token rotation.
pub async fn client_session_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let known = match jar
        .get(SESSION_COOKIE)
        .and_then(|c| Uuid::parse_str(c.value()).ok())
    {
        Some(id) => state.clients.get(id).await.map(|client| (id, client)),
        None => None,
    };
    let cached_refresh = jar.get(REFRESH_COOKIE).map(|c| c.value().to_string());

    let (registered, client) = match known {
        Some((id, client)) => (Some(id), client),
        None => {
            let session =
                SessionStore::restore(state.provider.clone(), cached_refresh.as_deref()).await;
            (None, Arc::new(ClientSession::new(session, state.store.clone())))
        }
    };

    let response = {
        let _turn = client.take_turn().await;
        request.extensions_mut().insert(client.clone());
        next.run(request).await
    };

    let jar = match (registered, client.holds_state().await) {
        (None, true) => {
            let id = state.clients.insert(client.clone()).await;
            jar.add(cookie(SESSION_COOKIE, id.to_string()))
        }
        (Some(id), false) => {
            state.clients.remove(id).await;
            jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
        }
        (None, false) if jar.get(SESSION_COOKIE).is_some() => {
            jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
        }
        _ => jar,
    };

    let jar = match client.session.refresh_token() {
        Some(token) if cached_refresh.as_deref() != Some(token.as_str()) => {
            jar.add(cookie(REFRESH_COOKIE, token))
        }
        None if cached_refresh.is_some() => jar.remove(Cookie::build(REFRESH_COOKIE).path("/")),
        _ => jar,
    };

    (jar, response).into_response()
}
