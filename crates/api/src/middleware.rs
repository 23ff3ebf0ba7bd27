use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use campus_auth::JwtValidator;
use campus_infra::store::SessionStore;

use crate::app::errors;
use crate::context::PrincipalContext;

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
    pub sessions: Arc<dyn SessionStore>,
}

/// Bearer token → verified claims → live session → `PrincipalContext`.
///
/// A token with a valid signature is still rejected once its session has been
/// revoked (logout) or has expired.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(token) = extract_bearer(req.headers()) else {
        return unauthorized("missing bearer token");
    };

    let now = Utc::now();
    let claims = match state.jwt.validate(token, now) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(error = %e, "rejected token");
            return unauthorized("invalid or expired token");
        }
    };

    match state.sessions.session_active(claims.sid, now).await {
        Ok(true) => {}
        Ok(false) => return unauthorized("session is no longer active"),
        Err(e) => return errors::store_error_to_response(e),
    }

    req.extensions_mut().insert(PrincipalContext::new(
        claims.sub,
        claims.sid,
        claims.roles,
    ));

    next.run(req).await
}

fn unauthorized(message: &'static str) -> Response {
    errors::json_error(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let token = header.to_str().ok()?.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_prefix_is_required() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer tok.en"));
        assert_eq!(extract_bearer(&headers), Some("tok.en"));
    }
}
