use augustus_shared::{TOKEN_COOKIE, routes};
use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;

/// Send cookie-less visits to `/app/...` pages to sign-in, remembering where they were going.
/// Presence is all that is checked; the backend decides whether the token is any good.
pub async fn guard_app_routes(jar: CookieJar, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    if !routes::requires_session(&path) {
        return next.run(req).await;
    }

    let has_token = jar
        .get(TOKEN_COOKIE)
        .is_some_and(|cookie| !cookie.value().is_empty());
    if has_token {
        return next.run(req).await;
    }

    debug!(%path, "no session cookie; redirecting to sign-in");
    Redirect::temporary(&routes::sign_in_route(Some(&path))).into_response()
}
