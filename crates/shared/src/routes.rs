// crates/shared/src/routes.rs
// Paths served by the gateway and called by the client.

pub const SESSION: &str = "/api/auth/session";
pub const LOGIN: &str = "/api/auth/login";
pub const SIGNUP: &str = "/api/auth/signup";
pub const LOGOUT: &str = "/api/auth/logout";
pub const ME: &str = "/api/auth/me";
pub const VIDEO_CHAT: &str = "/api/v2/chat/video";
pub const GENERAL_CHAT: &str = "/api/v2/chat/general";
pub const HEALTH: &str = "/api/health";

pub const SIGN_IN_PAGE: &str = "/auth/sign-in";
pub const DEFAULT_APP_PAGE: &str = "/app/query";
pub const PROTECTED_PREFIX: &str = "/app/";

pub fn conversation_messages(conversation_id: &str) -> String {
    format!("/api/chat/conversations/{}/messages", conversation_id)
}

/// `/auth/sign-in`, carrying `next` when given.
pub fn sign_in_route(next: Option<&str>) -> String {
    match next {
        Some(path) if !path.is_empty() => {
            format!("{}?next={}", SIGN_IN_PAGE, urlencoding::encode(path))
        }
        _ => SIGN_IN_PAGE.to_string(),
    }
}

/// Where to go after signing in. Only local absolute paths are honoured.
pub fn post_sign_in_target(next: Option<&str>) -> String {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path.to_string(),
        _ => DEFAULT_APP_PAGE.to_string(),
    }
}

/// Page paths that need a session cookie. API and asset paths never do.
pub fn requires_session(path: &str) -> bool {
    let exempt = ["/_next", "/favicon", "/api"];
    if exempt.iter().any(|prefix| path.starts_with(prefix)) {
        return false;
    }
    path.starts_with(PROTECTED_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_parameter_only_accepts_local_paths() {
        assert_eq!(post_sign_in_target(Some("/app/history")), "/app/history");
        assert_eq!(post_sign_in_target(Some("//evil.example")), "/app/query");
        assert_eq!(post_sign_in_target(Some("https://evil.example")), "/app/query");
        assert_eq!(post_sign_in_target(None), "/app/query");
    }

    #[test]
    fn sign_in_route_encodes_next() {
        assert_eq!(sign_in_route(None), "/auth/sign-in");
        assert_eq!(sign_in_route(Some("/app/query")), "/auth/sign-in?next=%2Fapp%2Fquery");
    }

    #[test]
    fn only_app_pages_are_guarded() {
        assert!(requires_session("/app/query"));
        assert!(requires_session("/app/history/42"));
        assert!(!requires_session("/api/auth/session"));
        assert!(!requires_session("/_next/static/chunk.js"));
        assert!(!requires_session("/favicon.ico"));
        assert!(!requires_session("/auth/sign-in"));
        assert!(!requires_session("/"));
    }
}
