use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;
use tracing::{info, instrument};

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, MeResponse, MessageResponse, RegisterRequest},
        extractors::{AuthUser, AUTH_COOKIE},
        services::AuthError,
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/auth/me", get(get_me))
}

fn session_cookie(state: &AppState, value: String, max_age: Duration) -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.secure_cookies())
        .max_age(max_age)
        .into()
}

#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<AuthResponse>), AuthError> {
    let Json(payload) = payload?;
    let outcome = state.auth.register(payload).await?;

    let cookie = session_cookie(&state, outcome.token, state.auth.keys().ttl());
    Ok((
        jar.add(cookie),
        Json(AuthResponse {
            success: true,
            message: "Registration successful",
            user: outcome.user,
        }),
    ))
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<AuthResponse>), AuthError> {
    let Json(payload) = payload?;
    let outcome = state.auth.login(payload).await?;

    let cookie = session_cookie(&state, outcome.token, state.auth.keys().ttl());
    Ok((
        jar.add(cookie),
        Json(AuthResponse {
            success: true,
            message: "Login successful",
            user: outcome.user,
        }),
    ))
}

/// Clears the client's cookie. An already-issued token stays valid until it expires.
#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    let cleared = session_cookie(&state, String::new(), Duration::ZERO);
    info!("session cookie cleared");
    (
        jar.add(cleared),
        Json(MessageResponse {
            success: true,
            message: "Logout successful",
        }),
    )
}

#[instrument(skip_all)]
pub async fn get_me(AuthUser(user): AuthUser) -> Json<MeResponse> {
    Json(MeResponse {
        success: true,
        user,
    })
}
