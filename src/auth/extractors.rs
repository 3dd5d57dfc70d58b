use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::CookieJar;

use super::{claims::Session, services::{AuthError, AuthService}};

/// Name of the session cookie.
pub const AUTH_COOKIE: &str = "auth-token";

/// Returns the session token if the cookie is present and non-empty.
pub fn session_token(jar: &CookieJar) -> Option<&str> {
    jar.get(AUTH_COOKIE)
        .map(|c| c.value())
        .filter(|v| !v.is_empty())
}

/// Reads the session cookie and fully verifies it.
pub struct AuthUser(pub Session);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AuthService: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = session_token(&jar).ok_or(AuthError::Unauthorized)?;
        let user = AuthService::from_ref(state).verify_session(token)?;
        Ok(AuthUser(user))
    }
}
